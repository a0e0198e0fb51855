//! Anotaciones que se dibujan sobre la molécula según el modo elegido.

use crate::lookup::RenderMode;
use crate::models::MolecularGraph;
use crate::toolkit::{AnnotationError, Toolkit};

/// Numera los átomos 1..=N como números de mapeo. No falla nunca.
pub fn annotate_indices(mut graph: MolecularGraph) -> MolecularGraph {
    for atom in graph.atoms_mut() {
        atom.map_number = Some(atom.index as u32 + 1);
    }
    graph
}

pub fn annotate_charges(
    toolkit: &dyn Toolkit,
    mut graph: MolecularGraph,
) -> Result<MolecularGraph, AnnotationError> {
    toolkit.annotate_charges(&mut graph)?;
    Ok(graph)
}

pub fn annotate_stereo(
    toolkit: &dyn Toolkit,
    mut graph: MolecularGraph,
) -> Result<MolecularGraph, AnnotationError> {
    toolkit.annotate_stereo(&mut graph)?;
    Ok(graph)
}

/// Aplica la anotación que corresponde a cada modo de visualización.
pub fn annotate_for_mode(
    toolkit: &dyn Toolkit,
    graph: MolecularGraph,
    mode: RenderMode,
) -> Result<MolecularGraph, AnnotationError> {
    match mode {
        RenderMode::Plain => Ok(annotate_indices(graph)),
        RenderMode::Charges => annotate_charges(toolkit, graph),
        RenderMode::Stereo => annotate_stereo(toolkit, graph),
        RenderMode::Highlight => Ok(graph),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::NativeToolkit;
    use std::collections::HashSet;

    #[test]
    fn indices_are_distinct_and_one_based() {
        let graph = NativeToolkit.parse("CC(=O)Nc1ccc(O)cc1").unwrap();
        let n = graph.atom_count();
        let labelled = annotate_indices(graph);
        let labels: HashSet<u32> = labelled.atoms().iter().filter_map(|a| a.map_number).collect();
        assert_eq!(labels.len(), n);
        assert!(labels.iter().all(|&l| (1..=n as u32).contains(&l)));
    }

    #[test]
    fn highlight_mode_leaves_the_graph_untouched() {
        let graph = NativeToolkit.parse("CCO").unwrap();
        let same = annotate_for_mode(&NativeToolkit, graph.clone(), RenderMode::Highlight).unwrap();
        assert_eq!(graph, same);
    }

    #[test]
    fn stereo_mode_labels_only_stereocenters() {
        let graph = NativeToolkit.parse("N[C@@H](C)C(=O)O").unwrap();
        let labelled = annotate_for_mode(&NativeToolkit, graph, RenderMode::Stereo).unwrap();
        let notes: Vec<_> = labelled.atoms().iter().filter_map(|a| a.note.as_deref()).collect();
        assert_eq!(notes, vec!["(S)"]);
    }

    #[test]
    fn charge_mode_labels_every_atom() {
        let graph = NativeToolkit.parse("CCO").unwrap();
        let labelled = annotate_for_mode(&NativeToolkit, graph, RenderMode::Charges).unwrap();
        assert!(labelled.atoms().iter().all(|a| a.note.is_some()));
    }
}
