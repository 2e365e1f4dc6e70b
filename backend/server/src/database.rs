//! # Profile Database
//!
//! User profiles live in an external Postgres table owned by another team. This service
//! only filters, inserts and updates rows.
//!
//! ## Schema
//!
//! Table `user_profiles`:
//! - `"किसान_आईडी"` (**text**): farmer identifier, the lookup key
//! - `name` (**text**)
//! - `aadhaar_number` (**text**)
//! - `user_data` (**jsonb**): serialized profile form
//! - `loan_type` (**text**): `KCC` or `KCCAH`
//!
//! ## Notes
//! - The identifier column is non-ASCII and must stay double quoted. It only ever appears
//!   in the SQL constants below; every value is a bound parameter
//! - Loan type filters compare on [`loan_type_key`], so `KCC-AH`, `kcc_ah` and `KCCAH`
//!   select the same rows
//!
//! ## Wire Shape
//! [`Profile`] serializes with snake_case keys, and `user_id` carries the identifier
//! column. Request bodies stay camelCase (`userId`, `loanType`) because that is what the
//! frontend form posts; see [`crate::users`]. Both shapes are part of the public API.
use std::{fmt, str::FromStr, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{
    PgPool, Row,
    postgres::{PgPoolOptions, PgRow},
};
use thiserror::Error;
use tokio::sync::Mutex;

pub const PROFILE_ID_COLUMN: &str = "किसान_आईडी";

const SELECT_BY_ID: &str = r#"SELECT "किसान_आईडी", name, aadhaar_number, user_data, loan_type
FROM user_profiles
WHERE "किसान_आईडी" = $1
LIMIT 1"#;

const SELECT_ALL: &str = r#"SELECT "किसान_आईडी", name, aadhaar_number, user_data, loan_type
FROM user_profiles"#;

const SELECT_BY_LOAN_TYPE: &str = r#"SELECT "किसान_आईडी", name, aadhaar_number, user_data, loan_type
FROM user_profiles
WHERE REPLACE(REPLACE(LOWER(TRIM(loan_type)), '-', ''), '_', '') = $1"#;

const INSERT: &str = r#"INSERT INTO user_profiles
    ("किसान_आईडी", name, aadhaar_number, user_data, loan_type)
VALUES ($1, $2, $3, $4, $5)"#;

const UPDATE: &str = r#"UPDATE user_profiles
SET name = $2, aadhaar_number = $3, user_data = $4, loan_type = $5
WHERE "किसान_आईडी" = $1"#;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Comparison form of a loan type tag: trimmed, lowercased, without `-` or `_`.
pub fn loan_type_key(tag: &str) -> String {
    tag.trim().to_lowercase().replace(['-', '_'], "")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanType {
    Kcc,
    KccAh,
}

impl LoanType {
    /// Value stored in the `loan_type` column.
    pub fn tag(self) -> &'static str {
        match self {
            LoanType::Kcc => "KCC",
            LoanType::KccAh => "KCCAH",
        }
    }

    pub fn matches(self, tag: Option<&str>) -> bool {
        tag.is_some_and(|tag| tag.parse::<LoanType>() == Ok(self))
    }
}

impl fmt::Display for LoanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for LoanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match loan_type_key(s).as_str() {
            "kcc" => Ok(LoanType::Kcc),
            "kccah" => Ok(LoanType::KccAh),
            other => Err(format!("unknown loan type {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub name: Option<String>,
    pub aadhaar_number: Option<String>,
    pub user_data: Value,
    pub loan_type: Option<String>,
}

impl Profile {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get(PROFILE_ID_COLUMN)?,
            name: row.try_get("name")?,
            aadhaar_number: row.try_get("aadhaar_number")?,
            user_data: row
                .try_get::<Option<Value>, _>("user_data")?
                .unwrap_or(Value::Null),
            loan_type: row.try_get("loan_type")?,
        })
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find(&self, user_id: &str) -> Result<Option<Profile>, DatabaseError>;

    async fn insert(&self, profile: &Profile) -> Result<(), DatabaseError>;

    /// Updates the row keyed by `profile.user_id`, returning how many rows changed.
    async fn update(&self, profile: &Profile) -> Result<u64, DatabaseError>;

    /// All rows, or only those whose [`loan_type_key`] equals that of `loan_type`.
    async fn list(&self, loan_type: Option<&str>) -> Result<Vec<Profile>, DatabaseError>;
}

pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    /// Builds a lazily connecting pool, nothing is dialed until the first query.
    pub fn connect_lazy(database_url: &str) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(database_url)?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn find(&self, user_id: &str) -> Result<Option<Profile>, DatabaseError> {
        let row = sqlx::query(SELECT_BY_ID)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Profile::from_row).transpose()?)
    }

    async fn insert(&self, profile: &Profile) -> Result<(), DatabaseError> {
        sqlx::query(INSERT)
            .bind(&profile.user_id)
            .bind(&profile.name)
            .bind(&profile.aadhaar_number)
            .bind(&profile.user_data)
            .bind(&profile.loan_type)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update(&self, profile: &Profile) -> Result<u64, DatabaseError> {
        let result = sqlx::query(UPDATE)
            .bind(&profile.user_id)
            .bind(&profile.name)
            .bind(&profile.aadhaar_number)
            .bind(&profile.user_data)
            .bind(&profile.loan_type)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list(&self, loan_type: Option<&str>) -> Result<Vec<Profile>, DatabaseError> {
        let rows = match loan_type {
            Some(loan_type) => {
                sqlx::query(SELECT_BY_LOAN_TYPE)
                    .bind(loan_type_key(loan_type))
                    .fetch_all(&self.pool)
                    .await?
            }
            None => sqlx::query(SELECT_ALL).fetch_all(&self.pool).await?,
        };

        rows.iter()
            .map(Profile::from_row)
            .collect::<Result<_, _>>()
            .map_err(DatabaseError::from)
    }
}

/// In-process stand-in for the profile table, rows kept in insertion order.
#[derive(Default)]
pub struct MemoryProfileStore {
    rows: Mutex<Vec<Profile>>,
}

impl MemoryProfileStore {
    pub fn with_rows(rows: Vec<Profile>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn find(&self, user_id: &str) -> Result<Option<Profile>, DatabaseError> {
        let rows = self.rows.lock().await;

        Ok(rows.iter().find(|row| row.user_id == user_id).cloned())
    }

    async fn insert(&self, profile: &Profile) -> Result<(), DatabaseError> {
        self.rows.lock().await.push(profile.clone());

        Ok(())
    }

    async fn update(&self, profile: &Profile) -> Result<u64, DatabaseError> {
        let mut rows = self.rows.lock().await;
        let mut changed = 0;

        for row in rows.iter_mut().filter(|row| row.user_id == profile.user_id) {
            *row = profile.clone();
            changed += 1;
        }

        Ok(changed)
    }

    async fn list(&self, loan_type: Option<&str>) -> Result<Vec<Profile>, DatabaseError> {
        let rows = self.rows.lock().await;
        let wanted = loan_type.map(loan_type_key);

        Ok(rows
            .iter()
            .filter(|row| match &wanted {
                Some(wanted) => row
                    .loan_type
                    .as_deref()
                    .is_some_and(|tag| loan_type_key(tag) == *wanted),
                None => true,
            })
            .cloned()
            .collect())
    }
}
