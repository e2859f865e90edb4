use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use premium_common::ContractType;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::{no_cache_headers, ApiError};
use crate::providers::{ProviderChain, RowRequest};

#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<ProviderChain>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PremiumsQuery {
    pub symbols: Option<String>,
    #[serde(rename = "type")]
    pub contract_type: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/premiums", get(get_premiums))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

async fn get_premiums(
    State(state): State<AppState>,
    Query(params): Query<PremiumsQuery>,
) -> Result<Response, ApiError> {
    info!("GET /api/premiums");

    let contract_type = match params.contract_type.as_deref() {
        Some(raw) if !raw.trim().is_empty() => raw
            .parse::<ContractType>()
            .map_err(ApiError::BadRequest)?,
        _ => ContractType::Call,
    };
    let request = RowRequest::new(params.symbols.as_deref(), contract_type);

    let records = state.chain.fetch(&request).await.map_err(|failure| {
        error!("Error generating premiums: {:#}", failure.0);
        ApiError::GeneratorFailed(format!("{:#}", failure.0))
    })?;

    Ok((no_cache_headers(), Json(records)).into_response())
}
