//! Controlador de búsqueda: índice → fila → SMILES → grafo → anotación →
//! imagen, o un mensaje de error para el usuario.
//!
//! Los cuatro botones del panel son el mismo pipeline parametrizado por
//! [`RenderMode`]. [`LookupSession`] guarda el texto del índice y el estado
//! de la máquina `Idle → IndexEntered → Validating → {Rendering | Error} →
//! Idle` para una sesión del panel.

use std::{
    fmt,
    num::IntErrorKind,
    str::FromStr,
    sync::Arc,
};

use image::Rgba;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::annotate;
use crate::dataset::Dataset;
use crate::models::{Depiction, MolecularGraph};
use crate::toolkit::{AnnotationError, Highlight, ParseFailure, RenderError, RenderOptions, Toolkit};

/// Azul transparente `(0, 0, 255, 0.1)`.
const HIGHLIGHT_COLOR: Rgba<u8> = Rgba([0, 0, 255, 26]);
const HIGHLIGHT_BOND_WIDTH_MULTIPLIER: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    Plain,
    Charges,
    Stereo,
    Highlight,
}

impl RenderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderMode::Plain => "plain",
            RenderMode::Charges => "charges",
            RenderMode::Stereo => "stereo",
            RenderMode::Highlight => "highlight",
        }
    }

    pub fn caption(self) -> &'static str {
        match self {
            RenderMode::Plain => "Molecular structure of selected index",
            RenderMode::Charges => "Molecule with Gasteiger Charges as annotations",
            RenderMode::Stereo => "Molecule with Stereo Annotations",
            RenderMode::Highlight => "Molecule with Highlighted Atoms and Bonds",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tamaño en píxeles de una imagen, escrito como `ANCHOxALTO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepictionSize {
    pub width: u32,
    pub height: u32,
}

impl DepictionSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl FromStr for DepictionSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .trim()
            .split_once(|c| c == 'x' || c == 'X')
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .ok()
                .filter(|&n| n > 0)
                .ok_or_else(|| format!("invalid dimension '{v}' in '{s}'"))
        };
        Ok(Self::new(parse(width)?, parse(height)?))
    }
}

/// Tamaño de imagen para cada modo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepictionSizes {
    pub plain: DepictionSize,
    pub charges: DepictionSize,
    pub stereo: DepictionSize,
    pub highlight: DepictionSize,
}

impl Default for DepictionSizes {
    fn default() -> Self {
        Self {
            plain: DepictionSize::new(300, 300),
            charges: DepictionSize::new(300, 300),
            stereo: DepictionSize::new(250, 250),
            highlight: DepictionSize::new(350, 300),
        }
    }
}

impl DepictionSizes {
    pub fn for_mode(&self, mode: RenderMode) -> DepictionSize {
        match mode {
            RenderMode::Plain => self.plain,
            RenderMode::Charges => self.charges,
            RenderMode::Stereo => self.stereo,
            RenderMode::Highlight => self.highlight,
        }
    }
}

/// Fallos de una acción del panel. El `Display` de cada variante es el
/// mensaje que ve el usuario.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    #[error("Please enter a valid integer index.")]
    InputFormat { text: String },

    #[error("{}", out_of_range_message(.row_count))]
    IndexOutOfRange { requested: String, row_count: usize },

    #[error("Unable to generate molecular structure for the given SMILES.")]
    Parse(#[source] ParseFailure),

    #[error("{}", annotation_message(.0))]
    Annotation(#[source] AnnotationError),

    #[error("Unable to generate molecular structure for the given SMILES.")]
    Render(#[source] RenderError),
}

impl LookupError {
    /// Error atribuible al texto introducido (no a la molécula).
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            LookupError::InputFormat { .. } | LookupError::IndexOutOfRange { .. }
        )
    }
}

fn out_of_range_message(row_count: &usize) -> String {
    match *row_count {
        0 => "Index out of range: the dataset is empty.".to_string(),
        n => format!(
            "Index out of range: please enter a value between 0 and {}.",
            n - 1
        ),
    }
}

fn annotation_message(err: &AnnotationError) -> &'static str {
    if err.is_charge_failure() {
        "Unable to compute Gasteiger charges for this molecule."
    } else {
        "Unable to assign stereo annotations for this molecule."
    }
}

/// Convierte el texto del índice en una posición válida del dataset.
pub fn parse_index(text: &str, row_count: usize) -> Result<usize, LookupError> {
    let trimmed = text.trim();
    let out_of_range = || LookupError::IndexOutOfRange {
        requested: trimmed.to_string(),
        row_count,
    };
    let value = trimmed.parse::<i64>().map_err(|err| match err.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => out_of_range(),
        _ => LookupError::InputFormat {
            text: trimmed.to_string(),
        },
    })?;
    usize::try_from(value)
        .ok()
        .filter(|&index| index < row_count)
        .ok_or_else(out_of_range)
}

/// Pipeline de búsqueda compartido por todas las sesiones. Sólo guarda
/// referencias de lectura: cada llamada crea su propio grafo e imagen.
#[derive(Clone)]
pub struct LookupController {
    dataset: Arc<Dataset>,
    toolkit: Arc<dyn Toolkit>,
    sizes: DepictionSizes,
}

impl LookupController {
    pub fn new(dataset: Arc<Dataset>, toolkit: Arc<dyn Toolkit>, sizes: DepictionSizes) -> Self {
        Self {
            dataset,
            toolkit,
            sizes,
        }
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    /// Opciones de dibujo de cada modo.
    pub fn render_options(&self, mode: RenderMode, graph: &MolecularGraph) -> RenderOptions {
        let size = self.sizes.for_mode(mode);
        let mut options = RenderOptions {
            width: size.width,
            height: size.height,
            caption: mode.caption().to_string(),
            ..RenderOptions::default()
        };
        match mode {
            RenderMode::Plain => {}
            RenderMode::Charges | RenderMode::Stereo => options.show_property_labels = true,
            RenderMode::Highlight => {
                options.highlight = Some(Highlight::everything(
                    graph,
                    HIGHLIGHT_COLOR,
                    HIGHLIGHT_BOND_WIDTH_MULTIPLIER,
                ))
            }
        }
        options
    }

    /// Ejecuta una acción completa para el texto de índice dado.
    pub fn run(&self, index_text: &str, mode: RenderMode) -> Result<Depiction, LookupError> {
        let span = info_span!(
            "lookup",
            request_id = %Uuid::new_v4(),
            mode = mode.as_str(),
            index = %index_text.trim()
        );
        let _guard = span.enter();

        let result = self.pipeline(index_text, mode);
        match &result {
            Ok(depiction) => info!(
                bytes = depiction.png.len(),
                width = depiction.width,
                height = depiction.height,
                "Molécula dibujada"
            ),
            Err(err) if err.is_input_error() => info!(error = %err, "Índice rechazado"),
            Err(err) => warn!(error = %err, cause = ?err, "No se pudo dibujar la molécula"),
        }
        result
    }

    fn pipeline(&self, index_text: &str, mode: RenderMode) -> Result<Depiction, LookupError> {
        let index = parse_index(index_text, self.dataset.row_count())?;
        let row = self
            .dataset
            .get_row(index)
            .map_err(|e| LookupError::IndexOutOfRange {
                requested: e.index.to_string(),
                row_count: e.row_count,
            })?;

        let graph = self
            .toolkit
            .parse(&row.structure_notation)
            .map_err(LookupError::Parse)?;
        let graph = annotate::annotate_for_mode(self.toolkit.as_ref(), graph, mode)
            .map_err(LookupError::Annotation)?;
        let options = self.render_options(mode, &graph);
        self.toolkit
            .render(&graph, &options)
            .map_err(LookupError::Render)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupState {
    Idle,
    IndexEntered,
    Validating,
    Rendering,
    Error(String),
}

/// Resultado visible de una acción: la imagen o el mensaje de error.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Rendered(Depiction),
    Failed(LookupError),
}

impl From<ActionOutcome> for Result<Depiction, LookupError> {
    fn from(outcome: ActionOutcome) -> Self {
        match outcome {
            ActionOutcome::Rendered(depiction) => Ok(depiction),
            ActionOutcome::Failed(err) => Err(err),
        }
    }
}

/// Estado de una sesión del panel.
#[derive(Debug, Clone)]
pub struct LookupSession {
    index_text: String,
    state: LookupState,
    trace: Vec<LookupState>,
}

impl Default for LookupSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LookupSession {
    pub fn new() -> Self {
        Self {
            index_text: String::new(),
            state: LookupState::Idle,
            trace: Vec::new(),
        }
    }

    pub fn state(&self) -> &LookupState {
        &self.state
    }

    /// Estados recorridos durante la última acción.
    pub fn trace(&self) -> &[LookupState] {
        &self.trace
    }

    pub fn enter_index(&mut self, text: impl Into<String>) {
        self.index_text = text.into();
        self.state = LookupState::IndexEntered;
    }

    /// Dispara uno de los cuatro botones con el índice actual.
    pub fn trigger(&mut self, controller: &LookupController, mode: RenderMode) -> ActionOutcome {
        self.trace.clear();
        self.transition(LookupState::Validating);
        let outcome = match controller.run(&self.index_text, mode) {
            Ok(depiction) => {
                self.transition(LookupState::Rendering);
                ActionOutcome::Rendered(depiction)
            }
            Err(err) => {
                self.transition(LookupState::Error(err.to_string()));
                ActionOutcome::Failed(err)
            }
        };
        self.transition(LookupState::Idle);
        outcome
    }

    fn transition(&mut self, next: LookupState) {
        self.trace.push(next.clone());
        self.state = next;
    }
}
