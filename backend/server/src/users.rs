//! # User Profiles
//!
//! Thin layer over [`ProfileStore`]. Each handler pulls the identifier out of the request,
//! runs one service call and maps the outcome.
//!
//! ## Loan Types
//! - `KCC`: Kisan Credit Card, crop loans
//! - `KCCAH`: Kisan Credit Card for animal husbandry
//!
//! Scoped lookups refuse a profile registered under the other loan type.
use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::{
    database::{LoanType, Profile, ProfileStore},
    error::AppError,
    extract::{AppJson, AppPath, AppQuery},
    state::AppState,
};

const USER_NOT_FOUND: &str = "User not found";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitUserData {
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub aadhaar_number: Option<String>,
    #[serde(default)]
    pub user_data: Value,
    pub loan_type: Option<String>,
    #[serde(default)]
    pub is_update: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "loanType", alias = "loan_type")]
    pub loan_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileList {
    pub users: Vec<Profile>,
    pub total: usize,
}

fn required_user_id(user_id: Option<String>) -> Result<String, AppError> {
    user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("userId is required".to_string()))
}

/// Stores known loan types under their canonical tag, anything else verbatim.
fn normalize_loan_type(loan_type: Option<String>) -> Option<String> {
    loan_type.map(|raw| match raw.parse::<LoanType>() {
        Ok(loan_type) => loan_type.tag().to_string(),
        Err(_) => raw,
    })
}

pub async fn fetch_payload(store: &dyn ProfileStore, user_id: &str) -> Result<Value, AppError> {
    store
        .find(user_id)
        .await
        .map_err(|e| AppError::database("Failed to fetch user data", e))?
        .map(|profile| profile.user_data)
        .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))
}

/// Updates `profile` when `is_update` is set and the row exists, inserts it otherwise.
pub async fn upsert(
    store: &dyn ProfileStore,
    profile: &Profile,
    is_update: bool,
) -> Result<(), AppError> {
    if !is_update {
        return store
            .insert(profile)
            .await
            .map_err(|e| AppError::database("Failed to save user data", e));
    }

    let existing = store
        .find(&profile.user_id)
        .await
        .map_err(|e| AppError::database("Failed to check existing user", e))?;
    if existing.is_none() {
        return Err(AppError::NotFound(USER_NOT_FOUND.to_string()));
    }

    store
        .update(profile)
        .await
        .map_err(|e| AppError::database("Failed to update user data", e))?;

    Ok(())
}

pub async fn list(
    store: &dyn ProfileStore,
    loan_type: Option<&str>,
) -> Result<ProfileList, AppError> {
    let users = store
        .list(loan_type)
        .await
        .map_err(|e| AppError::database("Failed to fetch users", e))?;

    Ok(ProfileList {
        total: users.len(),
        users,
    })
}

pub async fn fetch_scoped(
    store: &dyn ProfileStore,
    user_id: &str,
    expected: LoanType,
) -> Result<Profile, AppError> {
    let profile = store
        .find(user_id)
        .await
        .map_err(|e| AppError::database("Failed to fetch user data", e))?
        .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))?;

    if !expected.matches(profile.loan_type.as_deref()) {
        return Err(AppError::DomainMismatch(format!(
            "User is not registered for a {expected} loan"
        )));
    }

    Ok(profile)
}

pub async fn submit_user_data_handler(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<SubmitUserData>,
) -> Result<Json<Value>, AppError> {
    let profile = Profile {
        user_id: required_user_id(payload.user_id)?,
        name: payload.name,
        aadhaar_number: payload.aadhaar_number,
        user_data: payload.user_data,
        loan_type: normalize_loan_type(payload.loan_type),
    };

    upsert(state.profiles.as_ref(), &profile, payload.is_update).await?;

    let message = if payload.is_update {
        "User data updated successfully"
    } else {
        "User data saved successfully"
    };
    info!("{message} for {}", profile.user_id);

    Ok(Json(json!({ "message": message, "data": profile })))
}

pub async fn get_user_by_id_handler(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<UserIdRequest>,
) -> Result<Json<Value>, AppError> {
    let user_id = required_user_id(payload.user_id)?;
    let user_data = fetch_payload(state.profiles.as_ref(), &user_id).await?;

    Ok(Json(json!({ "userData": user_data })))
}

fn filter_or(query: ListQuery, default: Option<LoanType>) -> Option<String> {
    let given = query
        .loan_type
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    normalize_loan_type(given).or_else(|| default.map(|l| l.tag().to_string()))
}

pub async fn get_all_users_handler(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<ListQuery>,
) -> Result<Json<ProfileList>, AppError> {
    let filter = filter_or(query, None);

    Ok(Json(list(state.profiles.as_ref(), filter.as_deref()).await?))
}

pub async fn get_all_users_ah_handler(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<ListQuery>,
) -> Result<Json<ProfileList>, AppError> {
    let filter = filter_or(query, Some(LoanType::KccAh));

    Ok(Json(list(state.profiles.as_ref(), filter.as_deref()).await?))
}

pub async fn kcc_user_handler(
    State(state): State<Arc<AppState>>,
    AppPath(user_id): AppPath<String>,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(
        fetch_scoped(state.profiles.as_ref(), &user_id, LoanType::Kcc).await?,
    ))
}

pub async fn kcc_ah_user_handler(
    State(state): State<Arc<AppState>>,
    AppPath(user_id): AppPath<String>,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(
        fetch_scoped(state.profiles.as_ref(), &user_id, LoanType::KccAh).await?,
    ))
}
