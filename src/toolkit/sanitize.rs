//! Sanitización química del grafo recién parseado.
//!
//! Orden de las etapas:
//! 1. percepción de anillos;
//! 2. los enlaces implícitos entre átomos aromáticos fuera de anillo pasan a
//!    ser simples;
//! 3. todo átomo aromático debe estar en un anillo;
//! 4. kekulización de los sistemas aromáticos;
//! 5. comprobación de valencias e hidrógenos implícitos.

use crate::models::{BondOrder, MolecularGraph};
use crate::toolkit::elements;
use crate::toolkit::error::ParseFailure;
use crate::toolkit::smiles::ParsedSmiles;
use crate::toolkit::topology;

/// Límite de pasos del emparejamiento; evita explosiones combinatorias en
/// sistemas patológicos.
const MATCHING_BUDGET: usize = 200_000;

pub fn sanitize(parsed: ParsedSmiles) -> Result<MolecularGraph, ParseFailure> {
    let ParsedSmiles {
        mut graph,
        implicit_aromatic_bonds,
    } = parsed;

    topology::perceive_rings(&mut graph);

    for index in implicit_aromatic_bonds {
        let bond = graph.bond_mut(index);
        if !bond.in_ring {
            bond.aromatic = false;
        }
    }
    for bond in graph.bonds_mut() {
        if bond.aromatic && !bond.in_ring {
            bond.aromatic = false;
        }
    }

    if let Some(atom) = graph
        .atoms()
        .iter()
        .find(|atom| atom.aromatic && !graph.atom_in_ring(atom.index))
    {
        return Err(ParseFailure::NonRingAromatic { atom: atom.index });
    }

    kekulize(&mut graph)?;
    assign_hydrogens(&mut graph)?;
    Ok(graph)
}

/// Contribución actual a la valencia contando cada enlace aromático como 1.
fn current_valence(graph: &MolecularGraph, atom: usize) -> u32 {
    let bonds: u32 = graph
        .neighbors(atom)
        .map(|(bond, _)| graph.bond(bond).order.valence() as u32)
        .sum();
    let hydrogens = if graph.atom(atom).bracket {
        graph.atom(atom).hydrogens as u32
    } else {
        0
    };
    bonds + hydrogens
}

/// Un átomo aromático necesita un doble enlace si su menor valencia
/// permitida supera la actual.
fn needs_double_bond(graph: &MolecularGraph, atom: usize) -> bool {
    let entry = graph.atom(atom);
    if !entry.aromatic {
        return false;
    }
    let allowed = elements::allowed_valences(entry.atomic_number, entry.formal_charge);
    let current = current_valence(graph, atom);
    allowed
        .iter()
        .map(|&v| v as u32)
        .find(|&v| v >= current)
        .is_some_and(|target| target > current)
}

/// Asigna dobles enlaces alternos en los anillos aromáticos buscando un
/// emparejamiento perfecto entre los átomos que lo necesitan.
fn kekulize(graph: &mut MolecularGraph) -> Result<(), ParseFailure> {
    let candidates: Vec<bool> = (0..graph.atom_count())
        .map(|atom| needs_double_bond(graph, atom))
        .collect();
    if !candidates.iter().any(|&c| c) {
        return Ok(());
    }

    let options: Vec<Vec<(usize, usize)>> = (0..graph.atom_count())
        .map(|atom| {
            if !candidates[atom] {
                return Vec::new();
            }
            graph
                .neighbors(atom)
                .filter(|&(bond, other)| graph.bond(bond).aromatic && candidates[other])
                .collect()
        })
        .collect();

    let mut partner: Vec<Option<usize>> = vec![None; graph.atom_count()];
    let mut chosen: Vec<usize> = Vec::new();
    let mut budget = MATCHING_BUDGET;
    if !match_atoms(&candidates, &options, &mut partner, &mut chosen, &mut budget) {
        let atoms = (0..graph.atom_count())
            .filter(|&atom| candidates[atom] && partner[atom].is_none())
            .collect::<Vec<_>>();
        let atoms = if atoms.is_empty() {
            (0..graph.atom_count()).filter(|&a| candidates[a]).collect()
        } else {
            atoms
        };
        return Err(ParseFailure::Kekulize { atoms });
    }

    for bond in chosen {
        graph.bond_mut(bond).order = BondOrder::Double;
    }
    Ok(())
}

/// Backtracking que empareja primero el átomo con menos opciones libres.
fn match_atoms(
    candidates: &[bool],
    options: &[Vec<(usize, usize)>],
    partner: &mut [Option<usize>],
    chosen: &mut Vec<usize>,
    budget: &mut usize,
) -> bool {
    if *budget == 0 {
        return false;
    }
    *budget -= 1;

    let free = |atom: usize, partner: &[Option<usize>]| {
        options[atom]
            .iter()
            .filter(|(_, other)| partner[*other].is_none())
            .count()
    };
    let next = (0..candidates.len())
        .filter(|&atom| candidates[atom] && partner[atom].is_none())
        .min_by_key(|&atom| free(atom, partner));
    let Some(atom) = next else {
        return true;
    };

    for &(bond, other) in &options[atom] {
        if partner[other].is_some() {
            continue;
        }
        partner[atom] = Some(other);
        partner[other] = Some(atom);
        chosen.push(bond);
        if match_atoms(candidates, options, partner, chosen, budget) {
            return true;
        }
        chosen.pop();
        partner[atom] = None;
        partner[other] = None;
    }
    false
}

/// Comprueba valencias y completa los hidrógenos implícitos de los átomos
/// escritos sin corchetes.
fn assign_hydrogens(graph: &mut MolecularGraph) -> Result<(), ParseFailure> {
    for atom in 0..graph.atom_count() {
        let entry = graph.atom(atom);
        let allowed = elements::allowed_valences(entry.atomic_number, entry.formal_charge);
        if allowed.is_empty() {
            continue;
        }
        let valence = graph.total_valence(atom);
        let too_high = || ParseFailure::Valence {
            atom,
            symbol: entry.symbol(),
            valence,
        };

        if entry.bracket {
            let max = allowed.iter().copied().max().unwrap_or(0) as u32;
            if valence > max {
                return Err(too_high());
            }
            continue;
        }

        let target = allowed
            .iter()
            .map(|&v| v as u32)
            .find(|&v| v >= valence)
            .ok_or_else(too_high)?;
        let implicit = (target - valence) as u8;
        graph.atoms_mut()[atom].hydrogens += implicit;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::smiles::parse_smiles;

    fn sanitized(smiles: &str) -> Result<MolecularGraph, ParseFailure> {
        sanitize(parse_smiles(smiles).unwrap())
    }

    fn double_bonds(graph: &MolecularGraph) -> usize {
        graph
            .bonds()
            .iter()
            .filter(|b| b.order == BondOrder::Double)
            .count()
    }

    #[test]
    fn benzene_gets_three_alternating_double_bonds() {
        let graph = sanitized("c1ccccc1").unwrap();
        assert_eq!(double_bonds(&graph), 3);
        for atom in 0..6 {
            let doubles = graph
                .neighbors(atom)
                .filter(|(b, _)| graph.bond(*b).order == BondOrder::Double)
                .count();
            assert_eq!(doubles, 1);
            assert_eq!(graph.atom(atom).hydrogens, 1);
        }
    }

    #[test]
    fn heteroaromatics_kekulize() {
        assert_eq!(double_bonds(&sanitized("n1ccccc1").unwrap()), 3);
        assert_eq!(double_bonds(&sanitized("c1cc[nH]c1").unwrap()), 2);
        assert_eq!(double_bonds(&sanitized("c1ccsc1").unwrap()), 2);
        assert_eq!(double_bonds(&sanitized("c1ccoc1").unwrap()), 2);
        assert_eq!(double_bonds(&sanitized("c1ccc2ccccc2c1").unwrap()), 5);
        assert_eq!(double_bonds(&sanitized("O=c1cc[nH]cc1").unwrap()), 3);
    }

    #[test]
    fn impossible_aromatic_systems_fail() {
        assert!(matches!(
            sanitized("c1cccc1"),
            Err(ParseFailure::Kekulize { .. })
        ));
        assert!(matches!(
            sanitized("n1cccc1"),
            Err(ParseFailure::Kekulize { .. })
        ));
    }

    #[test]
    fn aromatic_atoms_outside_rings_are_rejected() {
        assert!(matches!(
            sanitized("cc"),
            Err(ParseFailure::NonRingAromatic { atom: 0 })
        ));
    }

    #[test]
    fn biaryl_link_is_single() {
        let graph = sanitized("c1ccccc1c1ccccc1").unwrap();
        let link = graph.bond_between(5, 6).unwrap();
        assert!(!graph.bond(link).aromatic);
        assert_eq!(graph.bond(link).order, BondOrder::Single);
    }

    #[test]
    fn implicit_hydrogens_fill_the_lowest_valence() {
        let graph = sanitized("CC(=O)O").unwrap();
        let hydrogens: Vec<u8> = graph.atoms().iter().map(|a| a.hydrogens).collect();
        assert_eq!(hydrogens, vec![3, 0, 0, 1]);

        let graph = sanitized("CS(=O)(=O)C").unwrap();
        assert_eq!(graph.atom(1).hydrogens, 0);
        let graph = sanitized("[NH4+].[Cl-]").unwrap();
        assert_eq!(graph.atom(0).hydrogens, 4);
    }

    #[test]
    fn overvalent_atoms_fail() {
        assert!(matches!(
            sanitized("C(C)(C)(C)(C)C"),
            Err(ParseFailure::Valence { atom: 0, valence: 5, .. })
        ));
        assert!(matches!(
            sanitized("[CH5]"),
            Err(ParseFailure::Valence { .. })
        ));
        assert!(matches!(sanitized("FF(F)"), Err(ParseFailure::Valence { .. })));
    }

    #[test]
    fn metals_are_not_valence_checked() {
        let graph = sanitized("Cl[Pt](Cl)(Cl)(Cl)(N)N").unwrap();
        assert_eq!(graph.atom(1).hydrogens, 0);
        assert_eq!(graph.atom(5).hydrogens, 2);
    }
}
