use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{config::AppConfig, dataset::DatasetSummary, lookup::LookupController};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub controller: LookupController,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, controller: LookupController) -> Self {
        Self {
            config: Arc::new(config),
            controller,
            started_at: Utc::now(),
        }
    }

    pub fn status(&self) -> Status {
        Status {
            message: "Servidor listo.".to_string(),
            dataset: self.controller.dataset().summary(),
            dataset_source_url: self.config.dataset_source_url.to_string(),
            visualization_url: self.config.visualization_url.to_string(),
            started_at: self.started_at,
        }
    }
}

/// Respuesta de `/api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub message: String,
    pub dataset: DatasetSummary,
    pub dataset_source_url: String,
    pub visualization_url: String,
    pub started_at: DateTime<Utc>,
}
