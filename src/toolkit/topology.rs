//! Percepción de anillos, fragmentos y distancias topológicas.
//!
//! Se apoya en `petgraph` sobre un esqueleto sin pesos del grafo molecular.

use std::collections::HashSet;

use petgraph::algo::{astar, dijkstra};
use petgraph::graph::{EdgeReference, NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeFiltered;

use crate::models::MolecularGraph;

/// Esqueleto del grafo: un nodo por átomo, cada arista pesa su índice de enlace.
pub fn skeleton(graph: &MolecularGraph) -> UnGraph<(), usize> {
    let mut skeleton = UnGraph::with_capacity(graph.atom_count(), graph.bond_count());
    for _ in graph.atoms() {
        skeleton.add_node(());
    }
    for bond in graph.bonds() {
        skeleton.add_edge(NodeIndex::new(bond.begin), NodeIndex::new(bond.end), bond.index);
    }
    skeleton
}

/// Marca los enlaces de anillo, su anillo mínimo y guarda los ciclos
/// distintos encontrados.
///
/// Para cada enlace se busca el camino más corto entre sus extremos que no
/// lo use; si existe, enlace y camino forman el anillo más pequeño que lo
/// contiene.
pub fn perceive_rings(graph: &mut MolecularGraph) {
    let skeleton = skeleton(graph);
    let mut rings = Vec::new();
    let mut seen = HashSet::new();
    let mut ring_bonds = Vec::new();

    for bond in graph.bonds() {
        let excluded = bond.index;
        let filtered = EdgeFiltered::from_fn(&skeleton, |edge: EdgeReference<'_, usize>| {
            *edge.weight() != excluded
        });
        let target = NodeIndex::new(bond.end);
        let path = astar(
            &filtered,
            NodeIndex::new(bond.begin),
            |node| node == target,
            |_| 1usize,
            |_| 0usize,
        );
        if let Some((_, nodes)) = path {
            let cycle: Vec<usize> = nodes.iter().map(|node| node.index()).collect();
            ring_bonds.push((bond.index, cycle.len()));
            let mut key = cycle.clone();
            key.sort_unstable();
            if seen.insert(key) {
                rings.push(cycle);
            }
        }
    }

    for (index, size) in ring_bonds {
        let bond = graph.bond_mut(index);
        bond.in_ring = true;
        bond.ring_size = Some(size);
    }
    graph.set_rings(rings);
}

/// Componentes conexas, cada una con sus átomos en orden creciente y
/// ordenadas por su primer átomo.
pub fn fragments(graph: &MolecularGraph) -> Vec<Vec<usize>> {
    let mut sets = UnionFind::new(graph.atom_count());
    for bond in graph.bonds() {
        sets.union(bond.begin, bond.end);
    }
    let labels = sets.into_labeling();
    let mut fragments: Vec<Vec<usize>> = Vec::new();
    let mut root_slot = vec![usize::MAX; graph.atom_count()];
    for (atom, root) in labels.into_iter().enumerate() {
        if root_slot[root] == usize::MAX {
            root_slot[root] = fragments.len();
            fragments.push(Vec::new());
        }
        fragments[root_slot[root]].push(atom);
    }
    fragments
}

/// Distancias topológicas (número de enlaces) desde `source` a cada átomo
/// alcanzable. Los no alcanzables quedan en `None`.
pub fn topological_distances(
    skeleton: &UnGraph<(), usize>,
    source: usize,
) -> Vec<Option<usize>> {
    let reached = dijkstra(skeleton, NodeIndex::new(source), None, |_| 1usize);
    let mut distances = vec![None; skeleton.node_count()];
    for (node, distance) in reached {
        distances[node.index()] = Some(distance);
    }
    distances
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::smiles::parse_smiles;

    fn graph(smiles: &str) -> MolecularGraph {
        let mut graph = parse_smiles(smiles).unwrap().graph;
        perceive_rings(&mut graph);
        graph
    }

    #[test]
    fn chains_have_no_rings() {
        let graph = graph("CCCO");
        assert!(graph.bonds().iter().all(|b| !b.in_ring));
        assert!(graph.rings().is_empty());
    }

    #[test]
    fn fused_rings_are_found_once_each() {
        let graph = graph("c1ccc2ccccc2c1");
        assert_eq!(graph.rings().len(), 2);
        assert!(graph.rings().iter().all(|ring| ring.len() == 6));
        assert!(graph.bonds().iter().all(|b| b.in_ring && b.ring_size == Some(6)));
    }

    #[test]
    fn substituents_stay_outside_the_ring() {
        let graph = graph("C1CC1O");
        let exocyclic = graph.bond_between(2, 3).unwrap();
        assert!(!graph.bond(exocyclic).in_ring);
        assert_eq!(graph.bond(0).ring_size, Some(3));
        assert!(graph.atom_in_ring(0));
        assert!(!graph.atom_in_ring(3));
    }

    #[test]
    fn fragments_follow_dot_separated_components() {
        let graph = graph("CC.O.[Na+]");
        assert_eq!(fragments(&graph), vec![vec![0, 1], vec![2], vec![3]]);
    }

    #[test]
    fn distances_count_bonds() {
        let graph = graph("CCCC.O");
        let distances = topological_distances(&skeleton(&graph), 0);
        assert_eq!(distances, vec![Some(0), Some(1), Some(2), Some(3), None]);
    }
}
