//! Errores del toolkit químico.
//!
//! Cada etapa del pipeline tiene su propio tipo: el parser devuelve
//! [`ParseFailure`], los anotadores [`AnnotationError`] y el renderizador
//! [`RenderError`]. Ninguno de ellos debe tumbar la sesión: el controlador
//! los convierte en mensajes para el usuario.

use thiserror::Error;

/// Errores de sintaxis SMILES.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("unknown element symbol '{0}'")]
    UnknownElement(String),
    #[error("expected an atom")]
    ExpectedAtom,
    #[error("expected a closing bracket")]
    ExpectedClosingBracket,
    #[error("unbalanced parenthesis")]
    UnbalancedParenthesis,
    #[error("empty branch")]
    EmptyBranch,
    #[error("bond symbol not followed by an atom")]
    DanglingBond,
    #[error("ring bond {0} was never closed")]
    UnclosedRing(u32),
    #[error("ring bond {0} closes on its own atom")]
    RingBondToSelf(u32),
    #[error("ring bond {0} has conflicting bond symbols")]
    ConflictingRingBond(u32),
    #[error("duplicate bond between the same two atoms")]
    DuplicateBond,
    #[error("invalid number")]
    InvalidNumber,
}

/// La notación no describe una estructura químicamente válida.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("SMILES syntax error at byte {position}: {kind}")]
    Syntax { position: usize, kind: SyntaxError },

    #[error("explicit valence for atom #{atom} {symbol}, {valence}, is greater than permitted")]
    Valence {
        atom: usize,
        symbol: &'static str,
        valence: u32,
    },

    #[error("can't kekulize mol; unkekulized atoms: {atoms:?}")]
    Kekulize { atoms: Vec<usize> },

    #[error("non-ring atom {atom} marked aromatic")]
    NonRingAromatic { atom: usize },
}

impl ParseFailure {
    pub(crate) fn syntax(position: usize, kind: SyntaxError) -> Self {
        ParseFailure::Syntax { position, kind }
    }
}

/// Falló el cálculo de una anotación.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnnotationError {
    /// La iteración de cargas produjo valores no finitos o no se estabilizó.
    #[error("Gasteiger charges did not converge (last update {residual:e})")]
    NotConverged { residual: f64 },

    #[error("stereo perception failed: {0}")]
    Stereo(String),
}

impl AnnotationError {
    /// El error procede del cálculo de cargas parciales.
    pub fn is_charge_failure(&self) -> bool {
        matches!(self, AnnotationError::NotConverged { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("cannot depict an empty molecular graph")]
    EmptyGraph,
    #[error("invalid depiction size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("failed to encode PNG: {0}")]
    Encode(String),
}
