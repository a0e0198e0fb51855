use axum::{
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::{
    app_state::{AppState, Status},
    lookup::{LookupError, LookupSession, RenderMode},
    models::Depiction,
};

/// Máximo de filas por página de `/api/dataset`.
const MAX_PAGE: usize = 500;
const DEFAULT_PAGE: usize = 50;

type ApiError = (StatusCode, Json<Value>);

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct LookupPayload {
    index: String,
    #[serde(default = "default_mode")]
    mode: RenderMode,
}

#[derive(Deserialize)]
pub struct ImageQuery {
    #[serde(default = "default_mode")]
    mode: RenderMode,
}

fn default_mode() -> RenderMode {
    RenderMode::Plain
}

#[derive(Serialize)]
pub struct LookupResponse {
    caption: String,
    width: u32,
    height: u32,
    /// PNG en línea como `data:` URL.
    image: String,
}

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

#[derive(Serialize)]
pub struct DatasetRowView {
    index: usize,
    smiles: String,
    labels: IndexMap<String, Value>,
}

#[derive(Serialize)]
pub struct DatasetPage {
    total: usize,
    offset: usize,
    columns: Vec<String>,
    rows: Vec<DatasetRowView>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/lookup", post(lookup_handler))
        .route("/api/molecule/:index/image.png", get(image_handler))
        .route("/api/dataset", get(dataset_handler))
        .route("/api/status", get(status_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn lookup_handler(
    State(state): State<AppState>,
    Json(payload): Json<LookupPayload>,
) -> Result<Json<LookupResponse>, ApiError> {
    let depiction = run_lookup(&state, payload.index, payload.mode).await?;
    Ok(Json(LookupResponse {
        caption: depiction.caption,
        width: depiction.width,
        height: depiction.height,
        image: format!("data:image/png;base64,{}", STANDARD.encode(&depiction.png)),
    }))
}

#[axum::debug_handler]
async fn image_handler(
    State(state): State<AppState>,
    Path(index): Path<String>,
    Query(query): Query<ImageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let depiction = run_lookup(&state, index, query.mode).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], depiction.png))
}

#[axum::debug_handler]
async fn dataset_handler(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Json<DatasetPage> {
    let dataset = state.controller.dataset();
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);
    let rows = dataset
        .page(query.offset, limit)
        .iter()
        .enumerate()
        .map(|(i, row)| DatasetRowView {
            index: query.offset + i,
            smiles: row.structure_notation.clone(),
            labels: row.label_fields.clone(),
        })
        .collect();
    Json(DatasetPage {
        total: dataset.row_count(),
        offset: query.offset.min(dataset.row_count()),
        columns: dataset.columns().to_vec(),
        rows,
    })
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status())
}

// --- Utilidades ---

/// Cada petición es una sesión nueva del panel: se introduce el índice y se
/// pulsa el botón del modo. Corre fuera del runtime async porque el layout
/// y el rasterizado son trabajo de CPU.
async fn run_lookup(
    state: &AppState,
    index: String,
    mode: RenderMode,
) -> Result<Depiction, ApiError> {
    let controller = state.controller.clone();
    let result: Result<Depiction, LookupError> = tokio::task::spawn_blocking(move || {
        let mut session = LookupSession::new();
        session.enter_index(index);
        let outcome = session.trigger(&controller, mode);
        debug!(
            mode = %mode,
            state = ?session.state(),
            trace = ?session.trace(),
            "Sesión de consulta cerrada"
        );
        outcome.into()
    })
    .await
    .map_err(|e| {
        error!("La tarea de dibujo terminó de forma inesperada: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Internal error while rendering the molecule."})),
        )
    })?;
    result.map_err(|err| lookup_error_response(&err))
}

fn lookup_error_response(err: &LookupError) -> ApiError {
    let status = if err.is_input_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(json!({ "error": err.to_string() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dataset::Dataset,
        lookup::LookupController,
        toolkit::NativeToolkit,
    };
    use axum::{
        body::{to_bytes, Body},
        http::Request,
        response::Response,
    };
    use std::{io::Cursor, sync::Arc};
    use tokio_test::assert_ok;
    use tower::ServiceExt;

    const CSV: &str = "smiles,activity,HIV_active\n\
                       CCO,CI,0\n\
                       c1ccccc1,CI,0\n\
                       C1CC(,CI,0\n\
                       [Na+].[O-]C(=O)c1ccccc1,CI,0\n";

    fn app() -> Router {
        let dataset = Dataset::from_reader(Cursor::new(CSV), "test.csv", "smiles").unwrap();
        let config = AppConfig::from_lookup(|_| None).unwrap();
        let controller = LookupController::new(
            Arc::new(dataset),
            Arc::new(NativeToolkit),
            config.depiction_sizes,
        );
        create_router(AppState::new(config, controller))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = assert_ok!(to_bytes(response.into_body(), usize::MAX).await);
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn lookup_returns_an_inline_png() {
        let response = app()
            .oneshot(post_json("/api/lookup", json!({"index": "0", "mode": "plain"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["caption"], "Molecular structure of selected index");
        assert_eq!(body["width"], 300);
        assert!(body["image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn non_integer_index_is_a_bad_request() {
        let response = app()
            .oneshot(post_json("/api/lookup", json!({"index": "abc", "mode": "charges"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["error"],
            "Please enter a valid integer index."
        );
    }

    #[tokio::test]
    async fn malformed_smiles_is_unprocessable() {
        let response = app()
            .oneshot(post_json("/api/lookup", json!({"index": "2", "mode": "highlight"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            json_body(response).await["error"],
            "Unable to generate molecular structure for the given SMILES."
        );
    }

    #[tokio::test]
    async fn charges_of_a_salt_still_render() {
        let response = app()
            .oneshot(post_json("/api/lookup", json!({"index": "3", "mode": "charges"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["caption"], "Molecule with Gasteiger Charges as annotations");
    }

    #[tokio::test]
    async fn image_endpoint_serves_raw_png() {
        let response = app()
            .oneshot(get("/api/molecule/1/image.png?mode=stereo"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[1..4], b"PNG");

        let response = app()
            .oneshot(get("/api/molecule/-1/image.png"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dataset_pages_are_clamped() {
        let response = app()
            .oneshot(get("/api/dataset?offset=1&limit=10"))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["total"], 4);
        assert_eq!(body["columns"], json!(["smiles", "activity", "HIV_active"]));
        assert_eq!(body["rows"].as_array().unwrap().len(), 3);
        assert_eq!(body["rows"][0]["index"], 1);
        assert_eq!(body["rows"][0]["smiles"], "c1ccccc1");
        assert_eq!(body["rows"][0]["labels"]["HIV_active"], 0);
    }

    #[tokio::test]
    async fn status_reports_the_dataset() {
        let response = app().oneshot(get("/api/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["dataset"]["row_count"], 4);
        assert_eq!(body["dataset_source_url"], "https://moleculenet.org/datasets-1");
    }
}
