//! Carga del dataset de moléculas (CSV con una columna SMILES y columnas de
//! etiquetas) y acceso por índice.
//!
//! El fichero se lee una única vez al arrancar; después el dataset es de
//! sólo lectura y se comparte como `Arc<Dataset>`.

use std::{
    fmt,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Number, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::DatasetRow;

#[derive(Debug, Error)]
pub enum DataLoadError {
    #[error("cannot read dataset {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed dataset {}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },

    #[error("dataset {} has no column '{column}'", path.display())]
    MissingColumn { path: PathBuf, column: String },
}

/// Índice fuera de `[0, row_count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("index {index} is out of range for a dataset of {row_count} rows")]
pub struct IndexOutOfRange {
    pub index: usize,
    pub row_count: usize,
}

/// Resumen del dataset cargado, tal y como lo expone `/api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub row_count: usize,
    pub columns: Vec<String>,
    pub structure_column: String,
    pub source_path: String,
    pub loaded_at: DateTime<Utc>,
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} filas, {} columnas ({}), estructura en '{}'",
            self.row_count,
            self.columns.len(),
            self.columns.join(", "),
            self.structure_column
        )
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    rows: Vec<DatasetRow>,
    columns: Vec<String>,
    structure_column: String,
    source: PathBuf,
    loaded_at: DateTime<Utc>,
}

impl Dataset {
    /// Lee el CSV de `path`. La columna `structure_column` pasa a ser la
    /// notación de cada fila; el resto, sus etiquetas.
    pub fn load(path: impl AsRef<Path>, structure_column: &str) -> Result<Self, DataLoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DataLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::from_reader(file, path, structure_column)?;
        info!(
            path = %path.display(),
            rows = dataset.row_count(),
            "Dataset cargado: {}",
            dataset.summary()
        );
        Ok(dataset)
    }

    /// Igual que [`Dataset::load`] pero desde cualquier lector; `source` sólo
    /// se usa para mensajes y para el resumen.
    pub fn from_reader<R: Read>(
        reader: R,
        source: impl AsRef<Path>,
        structure_column: &str,
    ) -> Result<Self, DataLoadError> {
        let source = source.as_ref().to_path_buf();
        let malformed = |err: csv::Error| classify(&source, err);

        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);
        let columns: Vec<String> = csv
            .headers()
            .map_err(malformed)?
            .iter()
            .map(str::to_string)
            .collect();
        let structure_index = columns
            .iter()
            .position(|c| c == structure_column)
            .ok_or_else(|| DataLoadError::MissingColumn {
                path: source.clone(),
                column: structure_column.to_string(),
            })?;

        let mut rows = Vec::new();
        for record in csv.records() {
            let record = record.map_err(malformed)?;
            let mut label_fields = IndexMap::with_capacity(columns.len().saturating_sub(1));
            let mut structure_notation = String::new();
            for (position, (column, cell)) in columns.iter().zip(record.iter()).enumerate() {
                if position == structure_index {
                    structure_notation = cell.trim().to_string();
                } else {
                    label_fields.insert(column.clone(), typed_value(cell));
                }
            }
            if structure_notation.is_empty() {
                warn!(row = rows.len(), "Fila sin notación SMILES");
            }
            rows.push(DatasetRow {
                structure_notation,
                label_fields,
            });
        }

        Ok(Self {
            rows,
            columns,
            structure_column: structure_column.to_string(),
            source,
            loaded_at: Utc::now(),
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn get_row(&self, index: usize) -> Result<&DatasetRow, IndexOutOfRange> {
        self.rows.get(index).ok_or(IndexOutOfRange {
            index,
            row_count: self.rows.len(),
        })
    }

    /// Columnas en el orden de la cabecera del fichero.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Ventana de filas `[offset, offset + limit)` recortada al tamaño real.
    pub fn page(&self, offset: usize, limit: usize) -> &[DatasetRow] {
        let start = offset.min(self.rows.len());
        let end = start.saturating_add(limit).min(self.rows.len());
        &self.rows[start..end]
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            row_count: self.row_count(),
            columns: self.columns.clone(),
            structure_column: self.structure_column.clone(),
            source_path: self.source.display().to_string(),
            loaded_at: self.loaded_at,
        }
    }
}

fn classify(source: &Path, err: csv::Error) -> DataLoadError {
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(source_err) => DataLoadError::Io {
            path: source.to_path_buf(),
            source: source_err,
        },
        _ => DataLoadError::Malformed {
            path: source.to_path_buf(),
            message,
        },
    }
}

/// Entero, real o texto; las celdas vacías son `null`.
fn typed_value(cell: &str) -> Value {
    let cell = cell.trim();
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(integer) = cell.parse::<i64>() {
        return Value::from(integer);
    }
    if let Some(number) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }
    Value::String(cell.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    const SAMPLE: &str = "smiles,activity,HIV_active\n\
                          CCO,CI,0\n\
                          c1ccccc1,CM,1\n\
                          N[C@@H](C)C(=O)O,,0.5\n";

    fn sample() -> Dataset {
        Dataset::from_reader(Cursor::new(SAMPLE), "memory.csv", "smiles").unwrap()
    }

    #[test]
    fn rows_keep_notation_and_typed_labels() {
        let dataset = sample();
        assert_eq!(dataset.row_count(), 3);
        assert_eq!(dataset.columns(), ["smiles", "activity", "HIV_active"]);
        let row = dataset.get_row(1).unwrap();
        assert_eq!(row.structure_notation, "c1ccccc1");
        assert_eq!(row.label_fields["activity"], json!("CM"));
        assert_eq!(row.label_fields["HIV_active"], json!(1));
        let last = dataset.get_row(2).unwrap();
        assert_eq!(last.label_fields["activity"], Value::Null);
        assert_eq!(last.label_fields["HIV_active"], json!(0.5));
        assert!(!last.label_fields.contains_key("smiles"));
    }

    #[test]
    fn out_of_range_rows_are_reported() {
        assert_eq!(
            sample().get_row(3),
            Err(IndexOutOfRange {
                index: 3,
                row_count: 3
            })
        );
    }

    #[test]
    fn pages_are_clamped() {
        let dataset = sample();
        assert_eq!(dataset.page(0, 2).len(), 2);
        assert_eq!(dataset.page(2, 10).len(), 1);
        assert!(dataset.page(10, 10).is_empty());
        assert!(dataset.page(1, usize::MAX).len() == 2);
    }

    #[test]
    fn missing_structure_column_fails() {
        let err = Dataset::from_reader(Cursor::new("name,value\nx,1\n"), "x.csv", "smiles")
            .unwrap_err();
        assert!(matches!(err, DataLoadError::MissingColumn { ref column, .. } if column == "smiles"));
    }

    #[test]
    fn ragged_rows_are_malformed() {
        let err = Dataset::from_reader(Cursor::new("smiles,label\nCC,1\nCCC\n"), "x.csv", "smiles")
            .unwrap_err();
        assert!(matches!(err, DataLoadError::Malformed { .. }), "{err}");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = std::env::temp_dir().join(format!("missing-{}.csv", uuid::Uuid::new_v4()));
        assert!(matches!(
            Dataset::load(&path, "smiles"),
            Err(DataLoadError::Io { .. })
        ));
    }

    #[test]
    fn loads_from_disk() {
        let path = std::env::temp_dir().join(format!("dataset-{}.csv", uuid::Uuid::new_v4()));
        std::fs::write(&path, SAMPLE).unwrap();
        let dataset = Dataset::load(&path, "smiles").unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(dataset.row_count(), 3);
        assert_eq!(dataset.summary().source_path, path.display().to_string());
        assert_eq!(dataset.summary().row_count, 3);
    }
}
