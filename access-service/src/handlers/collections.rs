use axum::{
    extract::{Path, RawQuery, State},
    Json,
};
use query_engine::{parse_query_string, Record};
use service_core::error::AppError;

use crate::AppState;

/// GET /api/:collection?<query>
#[tracing::instrument(skip(state, query))]
pub async fn list_records(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<Record>>, AppError> {
    let schema = state.collections.schema(&collection).await?;
    let query = parse_query_string(query.as_deref().unwrap_or_default(), &schema)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.to_string())))?;

    let records = state.collections.read(&collection, &query).await?;
    tracing::debug!(returned = records.len(), "Collection read");

    Ok(Json(records))
}
