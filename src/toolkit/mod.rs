//! Toolkit químico nativo: parser SMILES, sanitización, cargas de
//! Gasteiger, descriptores estereoquímicos, layout 2D y rasterizado.
//!
//! El resto de la aplicación sólo lo ve a través del trait [`Toolkit`], de
//! modo que el controlador puede probarse con una implementación falsa.

pub mod elements;
pub mod error;
pub mod gasteiger;
pub mod layout;
pub mod raster;
pub mod sanitize;
pub mod smiles;
pub mod stereo;
pub mod topology;

use image::Rgba;
use tracing::debug;

use crate::models::{Depiction, MolecularGraph};
pub use error::{AnnotationError, ParseFailure, RenderError};

/// Átomos y enlaces resaltados con un color translúcido.
#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub atoms: Vec<usize>,
    pub bonds: Vec<usize>,
    pub color: Rgba<u8>,
    /// Ancho de la banda de los enlaces en múltiplos del trazo normal.
    pub bond_width_multiplier: f64,
}

impl Highlight {
    /// Resalta todo el grafo.
    pub fn everything(graph: &MolecularGraph, color: Rgba<u8>, bond_width_multiplier: f64) -> Self {
        Self {
            atoms: (0..graph.atom_count()).collect(),
            bonds: (0..graph.bond_count()).collect(),
            color,
            bond_width_multiplier,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub show_atom_indices: bool,
    /// Dibuja las notas de átomos y enlaces (cargas, R/S, E/Z).
    pub show_property_labels: bool,
    pub highlight: Option<Highlight>,
    pub caption: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 300,
            height: 300,
            show_atom_indices: false,
            show_property_labels: false,
            highlight: None,
            caption: String::new(),
        }
    }
}

/// Capacidades químicas que necesita el controlador de búsqueda.
pub trait Toolkit: Send + Sync {
    fn parse(&self, notation: &str) -> Result<MolecularGraph, ParseFailure>;
    fn annotate_charges(&self, graph: &mut MolecularGraph) -> Result<(), AnnotationError>;
    fn annotate_stereo(&self, graph: &mut MolecularGraph) -> Result<(), AnnotationError>;
    fn render(
        &self,
        graph: &MolecularGraph,
        options: &RenderOptions,
    ) -> Result<Depiction, RenderError>;
}

/// Implementación en Rust puro del [`Toolkit`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeToolkit;

impl Toolkit for NativeToolkit {
    fn parse(&self, notation: &str) -> Result<MolecularGraph, ParseFailure> {
        let parsed = smiles::parse_smiles(notation.trim())?;
        let graph = sanitize::sanitize(parsed)?;
        debug!(
            atoms = graph.atom_count(),
            bonds = graph.bond_count(),
            rings = graph.rings().len(),
            "SMILES parsed"
        );
        Ok(graph)
    }

    fn annotate_charges(&self, graph: &mut MolecularGraph) -> Result<(), AnnotationError> {
        gasteiger::annotate(graph)
    }

    fn annotate_stereo(&self, graph: &mut MolecularGraph) -> Result<(), AnnotationError> {
        stereo::annotate(graph)
    }

    fn render(
        &self,
        graph: &MolecularGraph,
        options: &RenderOptions,
    ) -> Result<Depiction, RenderError> {
        raster::render(graph, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_whitespace_and_sanitizes() {
        let graph = NativeToolkit.parse("  c1ccccc1O \n").unwrap();
        assert_eq!(graph.atom_count(), 7);
        assert_eq!(graph.atom(6).hydrogens, 1);
    }

    #[test]
    fn empty_notation_parses_but_cannot_be_rendered() {
        let graph = NativeToolkit.parse("   ").unwrap();
        assert!(graph.is_empty());
        assert_eq!(
            NativeToolkit.render(&graph, &RenderOptions::default()),
            Err(RenderError::EmptyGraph)
        );
    }

    #[test]
    fn full_pipeline_produces_a_png() {
        let toolkit = NativeToolkit;
        let mut graph = toolkit.parse("N[C@@H](Cc1ccccc1)C(=O)O").unwrap();
        toolkit.annotate_charges(&mut graph).unwrap();
        let highlight = Highlight::everything(&graph, Rgba([0, 0, 255, 26]), 20.0);
        assert_eq!(highlight.atoms.len(), graph.atom_count());
        let options = RenderOptions {
            show_property_labels: true,
            highlight: Some(highlight),
            ..RenderOptions::default()
        };
        let depiction = toolkit.render(&graph, &options).unwrap();
        assert_eq!(&depiction.png[1..4], b"PNG");
    }
}
