//! Cargas parciales de Gasteiger-Marsili (PEOE).
//!
//! Electronegatividad orbital `χ = a + b·q + c·q²`; en cada iteración la
//! carga fluye entre átomos enlazados proporcionalmente a `Δχ` dividido por
//! la electronegatividad del catión del donante, con un amortiguamiento que
//! se reduce a la mitad en cada paso. Los hidrógenos implícitos participan
//! como vecinos con una carga compartida por átomo pesado.

use tracing::debug;

use crate::models::{BondOrder, MolecularGraph};
use crate::toolkit::elements::{self, HYDROGEN};
use crate::toolkit::error::AnnotationError;

const ITERATIONS: usize = 12;
const DAMPING: f64 = 0.5;
/// Electronegatividad del catión de hidrógeno.
const HYDROGEN_CATION: f64 = 20.02;
const MAX_FINAL_STEP: f64 = 1e-2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hybridization {
    Sp,
    Sp2,
    Sp3,
}

impl Hybridization {
    pub fn label(self) -> &'static str {
        match self {
            Hybridization::Sp => "sp",
            Hybridization::Sp2 => "sp2",
            Hybridization::Sp3 => "sp3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Parameters {
    a: f64,
    b: f64,
    c: f64,
}

impl Parameters {
    const fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    fn electronegativity(&self, charge: f64) -> f64 {
        self.a + charge * (self.b + self.c * charge)
    }

    fn cation(&self, atomic_number: u8) -> f64 {
        if atomic_number == HYDROGEN {
            HYDROGEN_CATION
        } else {
            self.a + self.b + self.c
        }
    }
}

const HYDROGEN_PARAMETERS: Parameters = Parameters::new(7.17, 6.24, -0.56);

fn lookup(atomic_number: u8, hybridization: Hybridization) -> Option<Parameters> {
    use Hybridization::*;
    let parameters = match (atomic_number, hybridization) {
        (1, _) => HYDROGEN_PARAMETERS,
        (5, _) => Parameters::new(5.98, 6.82, 1.605),
        (6, Sp3) => Parameters::new(7.98, 9.18, 1.88),
        (6, Sp2) => Parameters::new(8.79, 9.32, 1.51),
        (6, Sp) => Parameters::new(10.39, 9.45, 0.73),
        (7, Sp3) => Parameters::new(11.54, 10.82, 1.36),
        (7, Sp2) => Parameters::new(12.87, 11.15, 0.85),
        (7, Sp) => Parameters::new(17.68, 12.70, -0.27),
        (8, Sp3) => Parameters::new(14.18, 12.92, 1.39),
        (8, Sp2) => Parameters::new(17.07, 13.79, 0.47),
        (9, _) => Parameters::new(14.66, 13.85, 2.31),
        (14, _) => Parameters::new(7.30, 6.567, 0.657),
        (15, Sp3) => Parameters::new(8.90, 8.24, 0.96),
        (16, Sp3) => Parameters::new(10.14, 9.13, 1.38),
        (16, Sp2) => Parameters::new(10.88, 9.49, 1.33),
        (17, _) => Parameters::new(11.00, 9.69, 1.35),
        (35, _) => Parameters::new(10.08, 8.47, 1.16),
        (53, _) => Parameters::new(9.90, 7.96, 0.96),
        _ => return None,
    };
    Some(parameters)
}

/// Parámetros para la hibridación exacta, o en su defecto sp2 y luego sp3.
fn parameters_for(atomic_number: u8, hybridization: Hybridization) -> Option<Parameters> {
    lookup(atomic_number, hybridization)
        .or_else(|| lookup(atomic_number, Hybridization::Sp2))
        .or_else(|| lookup(atomic_number, Hybridization::Sp3))
}

/// Hibridación aproximada a partir de los enlaces del grafo kekulizado.
pub fn hybridization(graph: &MolecularGraph, atom: usize) -> Hybridization {
    let mut doubles = 0;
    let mut unsaturated = false;
    for (bond, _) in graph.neighbors(atom) {
        let bond = graph.bond(bond);
        match bond.order {
            BondOrder::Triple | BondOrder::Quadruple => return Hybridization::Sp,
            BondOrder::Double => doubles += 1,
            BondOrder::Single => {}
        }
        unsaturated |= bond.aromatic;
    }
    if doubles >= 2 {
        return Hybridization::Sp;
    }
    if doubles == 1 || unsaturated || graph.atom(atom).aromatic {
        return Hybridization::Sp2;
    }

    // Heteroátomos con par libre conjugado (amidas, fenoles, pirroles).
    let z = graph.atom(atom).atomic_number;
    if z == elements::NITROGEN || z == elements::OXYGEN {
        let conjugated = graph.neighbors(atom).any(|(_, other)| {
            graph.atom(other).aromatic
                || graph.neighbors(other).any(|(bond, _)| {
                    let bond = graph.bond(bond);
                    bond.aromatic || bond.order == BondOrder::Double
                })
        });
        if conjugated {
            return Hybridization::Sp2;
        }
    }
    Hybridization::Sp3
}

/// Cargas resultantes: una por átomo pesado y la de cada uno de sus
/// hidrógenos implícitos. Los átomos sin parámetros (metales, contraiones)
/// quedan en `None` y no intercambian carga con sus vecinos.
#[derive(Debug, Clone, PartialEq)]
pub struct GasteigerCharges {
    pub atoms: Vec<Option<f64>>,
    pub hydrogens: Vec<f64>,
}

pub fn compute_charges(graph: &MolecularGraph) -> Result<GasteigerCharges, AnnotationError> {
    let n = graph.atom_count();
    let parameters: Vec<Option<Parameters>> = graph
        .atoms()
        .iter()
        .map(|atom| {
            let hybridization = hybridization(graph, atom.index);
            let found = parameters_for(atom.atomic_number, hybridization);
            if found.is_none() {
                debug!(
                    atom = atom.index,
                    symbol = atom.symbol(),
                    hybridization = hybridization.label(),
                    "Átomo sin parámetros de Gasteiger"
                );
            }
            found
        })
        .collect();

    let hydrogen_counts: Vec<f64> = graph.atoms().iter().map(|a| a.hydrogens as f64).collect();
    let mut charges: Vec<f64> = graph.atoms().iter().map(|a| a.formal_charge as f64).collect();
    let mut hydrogen_charges = vec![0.0; n];
    let mut damp = DAMPING;
    let mut residual = 0.0f64;

    for _ in 0..ITERATIONS {
        let chi: Vec<Option<f64>> = (0..n)
            .map(|i| parameters[i].map(|p| p.electronegativity(charges[i])))
            .collect();
        let chi_h: Vec<f64> = hydrogen_charges
            .iter()
            .map(|&q| HYDROGEN_PARAMETERS.electronegativity(q))
            .collect();

        residual = 0.0;
        let mut next = charges.clone();
        let mut next_h = hydrogen_charges.clone();
        for i in 0..n {
            let (Some(params_i), Some(chi_i)) = (parameters[i], chi[i]) else {
                continue;
            };
            let cation_i = params_i.cation(graph.atom(i).atomic_number);
            let mut dq = 0.0;
            for (_, j) in graph.neighbors(i) {
                let (Some(params_j), Some(chi_j)) = (parameters[j], chi[j]) else {
                    continue;
                };
                let cation_j = params_j.cation(graph.atom(j).atomic_number);
                dq += transfer(chi_j - chi_i, cation_i, cation_j);
            }
            if hydrogen_counts[i] > 0.0 {
                dq += hydrogen_counts[i] * transfer(chi_h[i] - chi_i, cation_i, HYDROGEN_CATION);
                let dh = transfer(chi_i - chi_h[i], HYDROGEN_CATION, cation_i);
                next_h[i] += damp * dh;
                residual = residual.max((damp * dh).abs());
            }
            next[i] += damp * dq;
            residual = residual.max((damp * dq).abs());
        }
        charges = next;
        hydrogen_charges = next_h;
        damp *= DAMPING;
    }

    let atoms: Vec<Option<f64>> = charges
        .into_iter()
        .zip(&parameters)
        .map(|(q, params)| params.map(|_| q))
        .collect();
    let finite = atoms.iter().flatten().chain(&hydrogen_charges).all(|q| q.is_finite());
    if !finite || !residual.is_finite() || residual > MAX_FINAL_STEP {
        return Err(AnnotationError::NotConverged { residual });
    }
    Ok(GasteigerCharges {
        atoms,
        hydrogens: hydrogen_charges,
    })
}

/// Carga que recibe el átomo propio dado `dx = χ(vecino) − χ(propio)`.
/// El denominador es la electronegatividad del catión del donante.
fn transfer(dx: f64, own_cation: f64, neighbor_cation: f64) -> f64 {
    if dx >= 0.0 {
        dx / own_cation
    } else {
        dx / neighbor_cation
    }
}

/// Calcula las cargas y las deja como valor y etiqueta de cada átomo que
/// tenga parámetros.
pub fn annotate(graph: &mut MolecularGraph) -> Result<(), AnnotationError> {
    let charges = compute_charges(graph)?;
    for (atom, charge) in graph.atoms_mut().iter_mut().zip(charges.atoms) {
        atom.charge_value = charge;
        atom.note = charge.map(|q| format!("{q:.2}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::sanitize::sanitize;
    use crate::toolkit::smiles::parse_smiles;

    fn molecule(smiles: &str) -> MolecularGraph {
        sanitize(parse_smiles(smiles).unwrap()).unwrap()
    }

    fn total(graph: &MolecularGraph, charges: &GasteigerCharges) -> f64 {
        graph
            .atoms()
            .iter()
            .map(|a| {
                charges.atoms[a.index].unwrap_or(0.0) + a.hydrogens as f64 * charges.hydrogens[a.index]
            })
            .sum()
    }

    #[test]
    fn ethanol_oxygen_is_negative_and_its_carbon_positive() {
        let graph = molecule("CCO");
        let charges = compute_charges(&graph).unwrap();
        assert!(charges.atoms[2].unwrap() < -0.2, "{:?}", charges.atoms);
        assert!(charges.atoms[1].unwrap() > 0.0, "{:?}", charges.atoms);
        assert!(charges.hydrogens[2] > 0.1);
    }

    #[test]
    fn charge_is_conserved() {
        for smiles in ["CCO", "c1ccncc1", "CC(=O)[O-]", "C[N+](C)(C)C", "FC(F)(F)Cl"] {
            let graph = molecule(smiles);
            let charges = compute_charges(&graph).unwrap();
            let formal: i32 = graph.atoms().iter().map(|a| a.formal_charge as i32).sum();
            assert!(
                (total(&graph, &charges) - formal as f64).abs() < 1e-9,
                "{smiles}"
            );
        }
    }

    #[test]
    fn symmetric_atoms_get_equal_charges() {
        let graph = molecule("c1ccccc1");
        let charges = compute_charges(&graph).unwrap();
        let first = charges.atoms[0].unwrap();
        for q in charges.atoms.iter().flatten() {
            assert!((q - first).abs() < 1e-12);
        }
    }

    #[test]
    fn hybridization_follows_bonding() {
        let graph = molecule("C=CC#N");
        assert_eq!(hybridization(&graph, 0), Hybridization::Sp2);
        assert_eq!(hybridization(&graph, 2), Hybridization::Sp);
        assert_eq!(hybridization(&graph, 3), Hybridization::Sp);
        let amide = molecule("CC(=O)N");
        assert_eq!(hybridization(&amide, 3), Hybridization::Sp2);
        assert_eq!(hybridization(&amide, 0), Hybridization::Sp3);
    }

    #[test]
    fn annotate_writes_two_decimal_notes() {
        let mut graph = molecule("CO");
        annotate(&mut graph).unwrap();
        for atom in graph.atoms() {
            let note = atom.note.as_deref().unwrap();
            let value = atom.charge_value.unwrap();
            assert_eq!(note, format!("{value:.2}"));
            assert_eq!(note.split('.').nth(1).map(str::len), Some(2));
        }
    }

    #[test]
    fn counter_ions_without_parameters_are_left_unlabelled() {
        let mut graph = molecule("[Na+].[O-]C(=O)c1ccccc1");
        let charges = compute_charges(&graph).unwrap();
        assert_eq!(charges.atoms[0], None);
        assert!(charges.atoms[1].unwrap() < -0.3, "{:?}", charges.atoms);
        assert!(charges.atoms[1..].iter().all(Option::is_some));

        annotate(&mut graph).unwrap();
        assert_eq!(graph.atom(0).note, None);
        assert_eq!(graph.atom(0).charge_value, None);
        assert!(graph.atoms()[1..].iter().all(|a| a.note.is_some()));
    }

    #[test]
    fn metal_bonds_do_not_carry_charge() {
        let graph = molecule("Cl[Pt](Cl)(Cl)(Cl)(N)N");
        let charges = compute_charges(&graph).unwrap();
        assert_eq!(charges.atoms[1], None);
        // Cada cloro queda aislado: conserva su carga formal (cero).
        assert_eq!(charges.atoms[0], Some(0.0));
        assert!(charges.atoms[5].unwrap() < 0.0);
    }
}
