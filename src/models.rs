//! Modelos de dominio: filas del dataset, grafo molecular y depiction.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::toolkit::elements;

/// Una fila del dataset: la notación SMILES y el resto de columnas.
/// Inmutable una vez cargada.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetRow {
    pub structure_notation: String,
    pub label_fields: IndexMap<String, Value>,
}

/// Orden de enlace en forma Kekulé.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Quadruple,
}

impl BondOrder {
    /// Contribución del enlace a la valencia de cada extremo.
    pub fn valence(self) -> u8 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
        }
    }
}

/// Marca direccional de SMILES (`/` = Up, `\` = Down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondDirection {
    Up,
    Down,
}

/// `@` (antihorario) o `@@` (horario), vistos desde el primer vecino.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chirality {
    CounterClockwise,
    Clockwise,
}

impl Chirality {
    pub fn inverted(self) -> Self {
        match self {
            Chirality::CounterClockwise => Chirality::Clockwise,
            Chirality::Clockwise => Chirality::CounterClockwise,
        }
    }
}

/// Vecino de un centro quiral en el orden en que aparece en el SMILES.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Neighbor {
    Atom(usize),
    Hydrogen,
    /// Par libre de un centro con tres vecinos (sulfóxidos, fosfinas); ocupa
    /// el lugar que tendría un hidrógeno implícito.
    LonePair,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StereoTag {
    pub chirality: Chirality,
    pub neighbors: Vec<Neighbor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub index: usize,
    pub atomic_number: u8,
    pub isotope: Option<u16>,
    pub formal_charge: i8,
    /// Hidrógenos totales (explícitos entre corchetes o implícitos).
    pub hydrogens: u8,
    pub aromatic: bool,
    /// El átomo se escribió entre corchetes: su número de H es fijo.
    pub bracket: bool,
    /// Número de mapeo (la etiqueta de índice 1-based que se dibuja `C:3`).
    pub map_number: Option<u32>,
    /// Carga parcial calculada.
    pub charge_value: Option<f64>,
    /// Etiqueta libre que se dibuja junto al átomo.
    pub note: Option<String>,
    pub stereo: Option<StereoTag>,
}

impl Atom {
    pub fn new(index: usize, atomic_number: u8) -> Self {
        Self {
            index,
            atomic_number,
            isotope: None,
            formal_charge: 0,
            hydrogens: 0,
            aromatic: false,
            bracket: false,
            map_number: None,
            charge_value: None,
            note: None,
            stereo: None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        elements::symbol(self.atomic_number)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bond {
    pub index: usize,
    pub begin: usize,
    pub end: usize,
    pub order: BondOrder,
    pub aromatic: bool,
    pub in_ring: bool,
    /// Tamaño del anillo más pequeño que contiene el enlace.
    pub ring_size: Option<usize>,
    /// Marca `/` o `\` junto con el átomo desde el que se escribió.
    pub direction: Option<(usize, BondDirection)>,
    pub note: Option<String>,
}

/// Grafo molecular efímero, propiedad exclusiva de una invocación del
/// pipeline.
///
/// Los índices de átomo son contiguos desde 0 y cada enlace referencia dos
/// átomos válidos y distintos; la API sólo permite añadir, nunca borrar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MolecularGraph {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    adjacency: Vec<Vec<(usize, usize)>>,
    rings: Vec<Vec<usize>>,
}

impl MolecularGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Añade un átomo y devuelve su índice.
    pub fn add_atom(&mut self, atomic_number: u8) -> usize {
        let index = self.atoms.len();
        self.atoms.push(Atom::new(index, atomic_number));
        self.adjacency.push(Vec::new());
        index
    }

    /// Añade un enlace entre dos átomos existentes. Devuelve `None`
    /// si los índices no son válidos, son iguales o el enlace ya existe.
    pub fn add_bond(&mut self, begin: usize, end: usize, order: BondOrder) -> Option<usize> {
        if begin == end
            || begin >= self.atoms.len()
            || end >= self.atoms.len()
            || self.bond_between(begin, end).is_some()
        {
            return None;
        }
        let index = self.bonds.len();
        self.bonds.push(Bond {
            index,
            begin,
            end,
            order,
            aromatic: false,
            in_ring: false,
            ring_size: None,
            direction: None,
            note: None,
        });
        self.adjacency[begin].push((index, end));
        self.adjacency[end].push((index, begin));
        Some(index)
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atoms_mut(&mut self) -> &mut [Atom] {
        &mut self.atoms
    }

    pub fn atom(&self, index: usize) -> &Atom {
        &self.atoms[index]
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn bonds_mut(&mut self) -> impl Iterator<Item = &mut Bond> {
        self.bonds.iter_mut()
    }

    pub fn bond(&self, index: usize) -> &Bond {
        &self.bonds[index]
    }

    pub fn bond_mut(&mut self, index: usize) -> &mut Bond {
        &mut self.bonds[index]
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Pares `(índice de enlace, átomo vecino)` en orden de creación.
    pub fn neighbors(&self, atom: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.adjacency[atom].iter().copied()
    }

    pub fn degree(&self, atom: usize) -> usize {
        self.adjacency[atom].len()
    }

    pub fn bond_between(&self, a: usize, b: usize) -> Option<usize> {
        self.adjacency
            .get(a)?
            .iter()
            .find(|(_, other)| *other == b)
            .map(|(bond, _)| *bond)
    }

    /// Suma de órdenes de enlace más hidrógenos.
    pub fn total_valence(&self, atom: usize) -> u32 {
        let bonds: u32 = self
            .neighbors(atom)
            .map(|(bond, _)| self.bonds[bond].order.valence() as u32)
            .sum();
        bonds + self.atoms[atom].hydrogens as u32
    }

    /// Anillos percibidos (ciclos en orden de recorrido).
    pub fn rings(&self) -> &[Vec<usize>] {
        &self.rings
    }

    pub fn set_rings(&mut self, rings: Vec<Vec<usize>>) {
        self.rings = rings;
    }

    pub fn atom_in_ring(&self, atom: usize) -> bool {
        self.neighbors(atom).any(|(bond, _)| self.bonds[bond].in_ring)
    }
}

/// Imagen rasterizada (PNG) lista para mostrarse, más su pie de imagen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Depiction {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub caption: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_bond_rejects_self_loops_duplicates_and_unknown_atoms() {
        let mut graph = MolecularGraph::new();
        let a = graph.add_atom(6);
        let b = graph.add_atom(8);
        assert_eq!(graph.add_bond(a, b, BondOrder::Double), Some(0));
        assert_eq!(graph.add_bond(b, a, BondOrder::Single), None);
        assert_eq!(graph.add_bond(a, a, BondOrder::Single), None);
        assert_eq!(graph.add_bond(a, 7, BondOrder::Single), None);
        assert_eq!(graph.bond_between(b, a), Some(0));
        assert_eq!(graph.total_valence(a), 2);
    }

    #[test]
    fn atom_indices_are_contiguous() {
        let mut graph = MolecularGraph::new();
        for z in [6, 7, 8] {
            graph.add_atom(z);
        }
        let indices: Vec<usize> = graph.atoms().iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(graph.atom(1).symbol(), "N");
    }
}
