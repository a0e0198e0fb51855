//! Carga y gestión de configuración de la aplicación (dataset, servidor,
//! enlaces externos y tamaños de imagen).

use std::{env, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::lookup::{DepictionSize, DepictionSizes};

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub dataset_path: PathBuf,
    pub structure_column: String,
    pub server_addr: String,
    pub frontend_dir: PathBuf,
    pub open_browser: bool,

    pub dataset_source_url: Url,
    pub visualization_url: Url,

    pub depiction_sizes: DepictionSizes,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que [`AppConfig::from_env`] pero leyendo de cualquier fuente.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let dataset_path = PathBuf::from(var("DATASET_PATH", "data/raw/HIV.csv"));
        let structure_column = var("STRUCTURE_COLUMN", "smiles");
        let server_addr = var("SERVER_ADDR", "127.0.0.1:8501");
        let frontend_dir = PathBuf::from(var("FRONTEND_DIR", "frontend"));
        let open_browser = parse_flag(&var("OPEN_BROWSER", "false"))
            .context("OPEN_BROWSER debe ser true/false")?;

        let dataset_source_url = Url::parse(&var(
            "DATASET_SOURCE_URL",
            "https://moleculenet.org/datasets-1",
        ))
        .context("DATASET_SOURCE_URL no es una URL válida")?;
        let visualization_url = Url::parse(&var("VISUALIZATION_URL", "http://localhost:8501/"))
            .context("VISUALIZATION_URL no es una URL válida")?;

        let defaults = DepictionSizes::default();
        let size = |key: &str, default: DepictionSize| -> Result<DepictionSize> {
            match lookup(key).filter(|v| !v.trim().is_empty()) {
                Some(value) => value
                    .parse::<DepictionSize>()
                    .map_err(|e: String| anyhow!(e))
                    .with_context(|| format!("{key} tiene un tamaño inválido")),
                None => Ok(default),
            }
        };
        let depiction_sizes = DepictionSizes {
            plain: size("DEPICTION_SIZE_PLAIN", defaults.plain)?,
            charges: size("DEPICTION_SIZE_CHARGES", defaults.charges)?,
            stereo: size("DEPICTION_SIZE_STEREO", defaults.stereo)?,
            highlight: size("DEPICTION_SIZE_HIGHLIGHT", defaults.highlight)?,
        };

        Ok(Self {
            dataset_path,
            structure_column,
            server_addr,
            frontend_dir,
            open_browser,
            dataset_source_url,
            visualization_url,
            depiction_sizes,
        })
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("valor booleano no reconocido: {other}")),
    }
}
