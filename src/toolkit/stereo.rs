//! Descriptores CIP: R/S para centros tetraédricos y E/Z para dobles enlaces.
//!
//! La prioridad de cada sustituyente se obtiene explorando su dígrafo
//! jerárquico nivel a nivel (números atómicos ordenados de mayor a menor,
//! con átomos duplicados para enlaces múltiples y cierres de anillo). Sólo
//! se aplica la regla 1; los empates no reciben etiqueta.

use std::cmp::Reverse;

use tracing::debug;

use crate::models::{BondDirection, BondOrder, Chirality, MolecularGraph, Neighbor};
use crate::toolkit::elements::HYDROGEN;
use crate::toolkit::error::AnnotationError;

const MAX_DEPTH: usize = 10;
const MAX_NODES: usize = 2_000;
/// Los dobles enlaces en anillos más pequeños no admiten E/Z.
const MIN_STEREO_RING: usize = 8;

/// Clave comparable de una rama: niveles → grupos por padre → Z.
type BranchKey = Vec<Vec<Vec<u8>>>;

#[derive(Debug, Clone, Copy)]
struct Node {
    atom: usize,
    parent: Option<usize>,
    /// Duplicados e hidrógenos implícitos no se expanden.
    terminal: bool,
}

fn hydrogen_key() -> BranchKey {
    vec![vec![vec![HYDROGEN]]]
}

/// El par libre queda por debajo de cualquier átomo, hidrógeno incluido.
fn lone_pair_key() -> BranchKey {
    Vec::new()
}

/// Clave de prioridad del sustituyente `start` visto desde `center`.
fn branch_key(graph: &MolecularGraph, center: usize, start: usize) -> BranchKey {
    let mut arena = vec![Node {
        atom: start,
        parent: None,
        terminal: false,
    }];
    let mut levels = vec![vec![vec![graph.atom(start).atomic_number]]];
    let mut frontier = vec![0usize];

    let is_ancestor = |arena: &[Node], node: usize, atom: usize| {
        if atom == center {
            return true;
        }
        let mut current = Some(node);
        while let Some(index) = current {
            if arena[index].atom == atom {
                return true;
            }
            current = arena[index].parent;
        }
        false
    };

    for _ in 0..MAX_DEPTH {
        let mut groups = Vec::with_capacity(frontier.len());
        let mut next = Vec::new();
        for &node in &frontier {
            let atom = arena[node].atom;
            let came_from = arena[node].parent.map_or(center, |p| arena[p].atom);

            // (z, átomo, terminal)
            let mut children: Vec<(u8, usize, bool)> = Vec::new();
            for (bond, other) in graph.neighbors(atom) {
                let z = graph.atom(other).atomic_number;
                let extra = graph.bond(bond).order.valence().saturating_sub(1) as usize;
                if other != came_from {
                    let closes = is_ancestor(&arena, node, other);
                    children.push((z, other, closes));
                }
                children.extend(std::iter::repeat((z, other, true)).take(extra));
            }
            for _ in 0..graph.atom(atom).hydrogens {
                children.push((HYDROGEN, atom, true));
            }
            children.sort_by_key(|&(z, _, terminal)| (Reverse(z), terminal));

            groups.push(children.iter().map(|&(z, _, _)| z).collect::<Vec<_>>());
            for (_, child, terminal) in children {
                arena.push(Node {
                    atom: child,
                    parent: Some(node),
                    terminal,
                });
                if !arena[arena.len() - 1].terminal {
                    next.push(arena.len() - 1);
                }
            }
        }
        if groups.iter().all(Vec::is_empty) {
            break;
        }
        levels.push(groups);
        if next.is_empty() || arena.len() > MAX_NODES {
            break;
        }
        frontier = next;
    }
    levels
}

/// Paridad de la permutación: `true` si es impar.
fn is_odd_permutation(permutation: &[usize]) -> bool {
    let mut inversions = 0;
    for i in 0..permutation.len() {
        for j in i + 1..permutation.len() {
            if permutation[i] > permutation[j] {
                inversions += 1;
            }
        }
    }
    inversions % 2 == 1
}

/// Descriptor R/S de un átomo con marca `@`/`@@`, si las cuatro ramas
/// (contando un posible par libre) tienen prioridades distintas.
fn tetrahedral_label(
    graph: &MolecularGraph,
    center: usize,
) -> Result<Option<&'static str>, AnnotationError> {
    let Some(tag) = graph.atom(center).stereo.as_ref() else {
        return Ok(None);
    };
    let heavy = tag
        .neighbors
        .iter()
        .filter(|n| matches!(n, Neighbor::Atom(_)))
        .count();
    let consistent = heavy == graph.degree(center)
        && tag.neighbors.iter().all(|n| match n {
            Neighbor::Atom(other) => graph.bond_between(center, *other).is_some(),
            Neighbor::Hydrogen | Neighbor::LonePair => true,
        });
    if !consistent {
        return Err(AnnotationError::Stereo(format!(
            "chiral atom #{center} has a neighbor list that does not match its bonds"
        )));
    }
    if tag.neighbors.len() != 4 {
        return Ok(None);
    }

    let keys: Vec<BranchKey> = tag
        .neighbors
        .iter()
        .map(|n| match n {
            Neighbor::Atom(other) => branch_key(graph, center, *other),
            Neighbor::Hydrogen => hydrogen_key(),
            Neighbor::LonePair => lone_pair_key(),
        })
        .collect();

    let mut ranked: Vec<usize> = (0..4).collect();
    ranked.sort_by(|&a, &b| keys[b].cmp(&keys[a]));
    if ranked.windows(2).any(|w| keys[w[0]] == keys[w[1]]) {
        return Ok(None);
    }

    // Mirando desde el de menor prioridad, con el resto en orden p1, p2, p3.
    let order = [ranked[3], ranked[0], ranked[1], ranked[2]];
    let mut chirality = tag.chirality;
    if is_odd_permutation(&order) {
        chirality = chirality.inverted();
    }
    Ok(Some(match chirality {
        Chirality::CounterClockwise => "(R)",
        Chirality::Clockwise => "(S)",
    }))
}

/// Lado de un doble enlace: si el sustituyente de mayor prioridad queda
/// "arriba" según las marcas `/` y `\`.
fn high_priority_above(
    graph: &MolecularGraph,
    atom: usize,
    partner: usize,
) -> Option<bool> {
    let substituents: Vec<(usize, usize)> = graph
        .neighbors(atom)
        .filter(|&(_, other)| other != partner)
        .collect();
    let &(bond, marked) = substituents
        .iter()
        .find(|(bond, _)| graph.bond(*bond).direction.is_some())?;
    let (from, direction) = graph.bond(bond).direction?;
    let above = (direction == BondDirection::Up) != (from == marked);

    let marked_key = branch_key(graph, atom, marked);
    let other_key = match substituents.iter().find(|(_, other)| *other != marked) {
        Some(&(_, other)) => Some(branch_key(graph, atom, other)),
        None if graph.atom(atom).hydrogens > 0 => Some(hydrogen_key()),
        None => None,
    };
    match other_key {
        None => Some(above),
        Some(key) if key == marked_key => None,
        Some(key) if key > marked_key => Some(!above),
        Some(_) => Some(above),
    }
}

fn double_bond_label(graph: &MolecularGraph, bond: usize) -> Option<&'static str> {
    let entry = graph.bond(bond);
    if entry.order != BondOrder::Double {
        return None;
    }
    if entry.ring_size.is_some_and(|size| size < MIN_STEREO_RING) {
        return None;
    }
    let begin = high_priority_above(graph, entry.begin, entry.end)?;
    let end = high_priority_above(graph, entry.end, entry.begin)?;
    Some(if begin == end { "(Z)" } else { "(E)" })
}

/// Escribe los descriptores R/S en las notas de átomo y E/Z en las de enlace.
pub fn annotate(graph: &mut MolecularGraph) -> Result<(), AnnotationError> {
    let mut atom_labels = Vec::new();
    for atom in 0..graph.atom_count() {
        if let Some(label) = tetrahedral_label(graph, atom)? {
            atom_labels.push((atom, label));
        }
    }
    let bond_labels: Vec<(usize, &'static str)> = (0..graph.bond_count())
        .filter_map(|bond| double_bond_label(graph, bond).map(|label| (bond, label)))
        .collect();

    debug!(
        centers = atom_labels.len(),
        double_bonds = bond_labels.len(),
        "stereo descriptors assigned"
    );
    for (atom, label) in atom_labels {
        graph.atoms_mut()[atom].note = Some(label.to_string());
    }
    for (bond, label) in bond_labels {
        graph.bond_mut(bond).note = Some(label.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::sanitize::sanitize;
    use crate::toolkit::smiles::parse_smiles;

    fn annotated(smiles: &str) -> MolecularGraph {
        let mut graph = sanitize(parse_smiles(smiles).unwrap()).unwrap();
        annotate(&mut graph).unwrap();
        graph
    }

    #[test]
    fn alanine_enantiomers() {
        let l = annotated("N[C@@H](C)C(=O)O");
        assert_eq!(l.atom(1).note.as_deref(), Some("(S)"));
        let d = annotated("N[C@H](C)C(=O)O");
        assert_eq!(d.atom(1).note.as_deref(), Some("(R)"));
    }

    #[test]
    fn writing_order_does_not_change_the_descriptor() {
        let a = annotated("C[C@H](N)C(=O)O");
        let b = annotated("OC(=O)[C@@H](N)C");
        assert_eq!(a.atom(1).note, b.atom(3).note);
        assert!(a.atom(1).note.is_some());
    }

    #[test]
    fn sulfoxides_use_the_lone_pair_as_lowest_priority() {
        let r = annotated("C[S@@](=O)c1ccccc1");
        assert_eq!(r.atom(1).note.as_deref(), Some("(R)"));
        let s = annotated("C[S@](=O)c1ccccc1");
        assert_eq!(s.atom(1).note.as_deref(), Some("(S)"));
        let reordered = annotated("O=[S@@](C)c1ccccc1");
        assert!(reordered.atom(1).note.is_some());
    }

    #[test]
    fn phosphines_get_a_descriptor() {
        let graph = annotated("C[P@](CC)c1ccccc1");
        assert!(graph.atom(1).note.is_some());
    }

    #[test]
    fn tied_branches_get_no_descriptor() {
        let graph = annotated("C[C@H](C)O");
        assert_eq!(graph.atom(1).note, None);
    }

    #[test]
    fn difluoroethene_isomers() {
        assert_eq!(annotated("F/C=C/F").bond(1).note.as_deref(), Some("(E)"));
        assert_eq!(annotated("F/C=C\\F").bond(1).note.as_deref(), Some("(Z)"));
        assert_eq!(annotated("F\\C=C\\F").bond(1).note.as_deref(), Some("(E)"));
    }

    #[test]
    fn priorities_decide_between_cis_and_trans() {
        let graph = annotated("C/C(F)=C/C");
        assert_eq!(graph.bond(2).note.as_deref(), Some("(Z)"));
    }

    #[test]
    fn molecules_without_stereo_marks_stay_unlabelled() {
        for smiles in ["CCO", "CC=CC", "C1=CCCCC1", "c1ccccc1"] {
            let graph = annotated(smiles);
            assert!(graph.atoms().iter().all(|a| a.note.is_none()), "{smiles}");
            assert!(graph.bonds().iter().all(|b| b.note.is_none()), "{smiles}");
        }
    }

    #[test]
    fn branch_keys_rank_by_atomic_number_first() {
        let graph = sanitize(parse_smiles("OC(Cl)CC").unwrap()).unwrap();
        let oxygen = branch_key(&graph, 1, 0);
        let chlorine = branch_key(&graph, 1, 2);
        let ethyl = branch_key(&graph, 1, 3);
        assert!(chlorine > oxygen);
        assert!(oxygen > ethyl);
    }

    #[test]
    fn permutation_parity() {
        assert!(!is_odd_permutation(&[0, 1, 2, 3]));
        assert!(is_odd_permutation(&[1, 0, 2, 3]));
        assert!(!is_odd_permutation(&[1, 0, 3, 2]));
    }
}
