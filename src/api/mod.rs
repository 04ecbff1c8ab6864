use axum::{
    Router,
    extract::Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::core::{
    ProjectionError, ProjectionResult, Scenario, ScenarioComparison, WithdrawalOrder,
    compare_scenarios,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliWithdrawalOrder {
    TaxEfficient,
    ProRata,
}

impl From<CliWithdrawalOrder> for WithdrawalOrder {
    fn from(value: CliWithdrawalOrder) -> Self {
        match value {
            CliWithdrawalOrder::TaxEfficient => WithdrawalOrder::TaxEfficient,
            CliWithdrawalOrder::ProRata => WithdrawalOrder::ProRata,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid scenario JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("comparison needs at least one scenario")]
    NoScenarios,

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidJson(_) | ApiError::NoScenarios => StatusCode::BAD_REQUEST,
            ApiError::Projection(ProjectionError::Configuration(_)) => StatusCode::BAD_REQUEST,
            ApiError::Projection(ProjectionError::Ledger(_)) | ApiError::Io { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        error_response(status, &self.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub scenarios: Vec<Scenario>,
}

#[derive(Debug, Serialize)]
pub struct CompareResponse {
    pub comparisons: Vec<ScenarioComparison>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn scenario_from_json(json: &str) -> Result<Scenario, ApiError> {
    Ok(serde_json::from_str(json)?)
}

pub fn load_scenario(path: &Path) -> Result<Scenario, ApiError> {
    let json = std::fs::read_to_string(path).map_err(|source| ApiError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    scenario_from_json(&json)
}

pub fn project_scenario(scenario: &Scenario) -> Result<ProjectionResult, ApiError> {
    let result = scenario.project()?;
    tracing::info!(
        scenario = %scenario.name,
        years = result.records.len(),
        final_assets = result.summary.final_assets,
        "projection complete"
    );
    Ok(result)
}

pub fn compare(request: &CompareRequest) -> Result<CompareResponse, ApiError> {
    if request.scenarios.is_empty() {
        return Err(ApiError::NoScenarios);
    }
    Ok(CompareResponse {
        comparisons: compare_scenarios(&request.scenarios)?,
    })
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/project", post(project_handler))
        .route("/api/compare", post(compare_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "retirement forecast API listening");

    axum::serve(listener, router()).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_handler(Json(scenario): Json<Scenario>) -> Response {
    match project_scenario(&scenario) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(err) => err.into_response(),
    }
}

async fn compare_handler(Json(request): Json<CompareRequest>) -> Response {
    match compare(&request) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => err.into_response(),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
