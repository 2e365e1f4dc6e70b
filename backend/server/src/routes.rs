use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde_json::{Map, Value, json};

use crate::{
    error::AppError,
    extract::{AppJson, AppPath},
    state::AppState,
    store::{Collections, Document, Records},
};

/// A collection of records keyed by an integer field.
pub trait RecordCollection: Send + Sync + 'static {
    const NAME: &'static str;

    fn records(collections: &Collections) -> &Records;
}

/// A dataset replaced wholesale on every write.
pub trait Dataset: Send + Sync + 'static {
    const NAME: &'static str;

    fn document(collections: &Collections) -> &Document;
}

pub struct Gold;
pub struct Animal;
pub struct Crops;
pub struct Kcc;
pub struct KccAh;

impl RecordCollection for Gold {
    const NAME: &'static str = "gold";

    fn records(collections: &Collections) -> &Records {
        &collections.gold
    }
}

impl RecordCollection for Animal {
    const NAME: &'static str = "animal";

    fn records(collections: &Collections) -> &Records {
        &collections.animal
    }
}

impl RecordCollection for Crops {
    const NAME: &'static str = "crop";

    fn records(collections: &Collections) -> &Records {
        &collections.crops
    }
}

impl Dataset for Kcc {
    const NAME: &'static str = "KCC";

    fn document(collections: &Collections) -> &Document {
        &collections.kcc
    }
}

impl Dataset for KccAh {
    const NAME: &'static str = "KCC-AH";

    fn document(collections: &Collections) -> &Document {
        &collections.kcc_ah
    }
}

fn not_found<C: RecordCollection>(state: &AppState) -> String {
    format!("{} not found", C::records(&state.collections).label())
}

pub async fn list_records<C: RecordCollection>(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Value>>, AppError> {
    let records = C::records(&state.collections)
        .list()
        .await
        .map_err(|e| AppError::store(&format!("Failed to read {} data", C::NAME), e))?;

    Ok(Json(records))
}

pub async fn create_record<C: RecordCollection>(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<Map<String, Value>>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let record = C::records(&state.collections)
        .create(body)
        .await
        .map_err(|e| AppError::store(&format!("Failed to save {} data", C::NAME), e))?;

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn replace_record<C: RecordCollection>(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<i64>,
    AppJson(body): AppJson<Map<String, Value>>,
) -> Result<Json<Value>, AppError> {
    let record = C::records(&state.collections)
        .replace(id, body)
        .await
        .map_err(|e| {
            AppError::from_store(
                e,
                &format!("Failed to update {} data", C::NAME),
                &not_found::<C>(&state),
            )
        })?;

    Ok(Json(record))
}

pub async fn delete_record<C: RecordCollection>(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    let records = C::records(&state.collections);
    records.delete(id).await.map_err(|e| {
        AppError::from_store(
            e,
            &format!("Failed to delete {} data", C::NAME),
            &not_found::<C>(&state),
        )
    })?;

    Ok(Json(json!({
        "message": format!("{} deleted successfully", records.label())
    })))
}

pub async fn get_dataset<D: Dataset>(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let value = D::document(&state.collections)
        .read()
        .await
        .map_err(|e| AppError::store(&format!("Failed to read {} data", D::NAME), e))?;

    Ok(Json(value))
}

/// Replaces the dataset with the request body as-is.
pub async fn save_dataset<D: Dataset>(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    D::document(&state.collections)
        .write(&body)
        .await
        .map_err(|e| AppError::store(&format!("Failed to save {} data", D::NAME), e))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": format!("{} data saved successfully", D::NAME) })),
    ))
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
