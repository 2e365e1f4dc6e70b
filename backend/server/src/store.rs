//! # Flat Collections
//!
//! File-backed JSON documents, one file per collection.
//!
//! ## Layout
//!
//! - `gold.json`, `animal.json`, `crops.json`: arrays of records, each with an integer
//!   identifying field (`id`, or `crop_code` for crops)
//! - `kccdata.json`, `kccahdata.json`: any JSON value, replaced wholesale on every write
//!
//! ## Implementation
//!
//! - [`Document`] is the only primitive: read the whole file, write the whole file
//! - [`Records`] layers create/replace/delete on top of a [`Document`]
//! - Each document owns a mutex held across read-modify-write, so two requests in this
//!   process never interleave on the same file
//! - Writes go to a sibling temp file which is then renamed over the original, readers
//!   see either the old or the new content
//! - New ids are `max(existing) + 1`, or `1` for an empty collection. Deleting the highest
//!   record frees its id for the next create
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::{fs, sync::Mutex};
use tracing::info;

pub const GOLD_FILE: &str = "gold.json";
pub const ANIMAL_FILE: &str = "animal.json";
pub const CROPS_FILE: &str = "crops.json";
pub const KCC_FILE: &str = "kccdata.json";
pub const KCC_AH_FILE: &str = "kccahdata.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("invalid JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("document is not an array of records")]
    NotArray,

    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("record not found")]
    NotFound,

    #[error("no id left above the current maximum")]
    IdsExhausted,
}

pub struct Document {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the file holding `[]` if it does not exist yet.
    pub async fn ensure(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;

        match fs::metadata(&self.path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Creating empty collection at {}", self.path.display());
                self.write_unlocked(&Value::Array(Vec::new())).await
            }
            Err(e) => Err(StoreError::Read(e)),
        }
    }

    pub async fn read(&self) -> Result<Value, StoreError> {
        let _guard = self.lock.lock().await;
        self.read_unlocked().await
    }

    /// Replaces the whole document with `value`.
    pub async fn write(&self, value: &Value) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.write_unlocked(value).await
    }

    async fn read_unlocked(&self) -> Result<Value, StoreError> {
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(StoreError::Read)?;

        serde_json::from_str(&content).map_err(StoreError::Parse)
    }

    async fn write_unlocked(&self, value: &Value) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(value).map_err(StoreError::Encode)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");

        fs::write(&tmp, json).await.map_err(StoreError::Write)?;
        fs::rename(&tmp, &self.path).await.map_err(StoreError::Write)
    }

    async fn read_records(&self, missing_is_empty: bool) -> Result<Vec<Value>, StoreError> {
        match self.read_unlocked().await {
            Ok(Value::Array(records)) => Ok(records),
            Ok(_) => Err(StoreError::NotArray),
            Err(StoreError::Read(e)) if missing_is_empty && e.kind() == ErrorKind::NotFound => {
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

/// A [`Document`] holding an array of records keyed by an integer field.
pub struct Records {
    document: Document,
    key: &'static str,
    label: &'static str,
}

impl Records {
    pub fn new(document: Document, key: &'static str, label: &'static str) -> Self {
        Self {
            document,
            key,
            label,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Human name of one record, e.g. "Gold record".
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub async fn list(&self) -> Result<Vec<Value>, StoreError> {
        let _guard = self.document.lock.lock().await;
        self.document.read_records(false).await
    }

    /// Appends `record` stamped with the next id and returns it.
    pub async fn create(&self, mut record: Map<String, Value>) -> Result<Value, StoreError> {
        let _guard = self.document.lock.lock().await;
        let mut records = self.document.read_records(true).await?;

        let next = next_id(&records, self.key)?;
        record.insert(self.key.to_string(), Value::from(next));

        let record = Value::Object(record);
        records.push(record.clone());
        self.document.write_unlocked(&Value::Array(records)).await?;

        info!("{} {next} created", self.label);
        Ok(record)
    }

    /// Overwrites the record whose key equals `id`. The stored key is always `id`,
    /// whatever the body carried.
    pub async fn replace(
        &self,
        id: i64,
        mut record: Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let _guard = self.document.lock.lock().await;
        let mut records = self.document.read_records(false).await?;

        let position = position_of(&records, self.key, id).ok_or(StoreError::NotFound)?;

        record.insert(self.key.to_string(), Value::from(id));
        let record = Value::Object(record);
        records[position] = record.clone();
        self.document.write_unlocked(&Value::Array(records)).await?;

        info!("{} {id} replaced", self.label);
        Ok(record)
    }

    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let _guard = self.document.lock.lock().await;
        let mut records = self.document.read_records(false).await?;

        let position = position_of(&records, self.key, id).ok_or(StoreError::NotFound)?;

        records.remove(position);
        self.document.write_unlocked(&Value::Array(records)).await?;

        info!("{} {id} deleted", self.label);
        Ok(())
    }
}

/// Integer value of `key`, accepting integral floats such as `3.0`.
fn key_of(record: &Value, key: &str) -> Option<i64> {
    let value = record.get(key)?;
    if let Some(id) = value.as_i64() {
        return Some(id);
    }

    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
        .map(|f| f as i64)
}

fn next_id(records: &[Value], key: &str) -> Result<i64, StoreError> {
    records
        .iter()
        .filter_map(|record| key_of(record, key))
        .max()
        .unwrap_or(0)
        .checked_add(1)
        .ok_or(StoreError::IdsExhausted)
}

fn position_of(records: &[Value], key: &str, id: i64) -> Option<usize> {
    records
        .iter()
        .position(|record| key_of(record, key) == Some(id))
}

/// Every collection the service persists, rooted at one data directory.
pub struct Collections {
    pub gold: Records,
    pub animal: Records,
    pub crops: Records,
    pub kcc: Document,
    pub kcc_ah: Document,
}

impl Collections {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            gold: Records::new(Document::new(data_dir.join(GOLD_FILE)), "id", "Gold record"),
            animal: Records::new(
                Document::new(data_dir.join(ANIMAL_FILE)),
                "id",
                "Animal record",
            ),
            crops: Records::new(
                Document::new(data_dir.join(CROPS_FILE)),
                "crop_code",
                "Crop record",
            ),
            kcc: Document::new(data_dir.join(KCC_FILE)),
            kcc_ah: Document::new(data_dir.join(KCC_AH_FILE)),
        }
    }

    /// Creates the data directory and any missing collection file.
    pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir).await.map_err(StoreError::Write)?;

        let collections = Self::new(data_dir);
        for document in collections.documents() {
            document.ensure().await?;
        }

        Ok(collections)
    }

    fn documents(&self) -> [&Document; 5] {
        [
            self.gold.document(),
            self.animal.document(),
            self.crops.document(),
            &self.kcc,
            &self.kcc_ah,
        ]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_sequential_creates_number_from_one() {
        let dir = tempdir().unwrap();
        let collections = Collections::open(dir.path()).await.unwrap();

        for n in 1..=5 {
            let created = collections
                .gold
                .create(object(json!({ "amount": n * 10 })))
                .await
                .unwrap();
            assert_eq!(created["id"], json!(n));
        }

        let listed = collections.gold.list().await.unwrap();
        let ids: Vec<i64> = listed.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_create_uses_max_plus_one() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CROPS_FILE);
        std::fs::write(&path, r#"[{"crop_code": 7}, {"crop_code": 3}, {"name": "no code"}]"#)
            .unwrap();

        let crops = Records::new(Document::new(&path), "crop_code", "Crop record");
        let created = crops.create(object(json!({ "name": "wheat" }))).await.unwrap();

        assert_eq!(created, json!({ "name": "wheat", "crop_code": 8 }));
    }

    #[tokio::test]
    async fn test_create_after_max_id_fails_without_writing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(GOLD_FILE);
        let seeded = format!(r#"[{{"id": {}}}]"#, i64::MAX);
        std::fs::write(&path, &seeded).unwrap();

        let gold = Records::new(Document::new(&path), "id", "Gold record");
        let created = gold.create(object(json!({ "amount": 1 }))).await;

        assert!(matches!(created, Err(StoreError::IdsExhausted)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), seeded);
    }

    #[tokio::test]
    async fn test_integral_float_ids_are_addressable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(ANIMAL_FILE);
        std::fs::write(&path, r#"[{"id": 3.0, "breed": "gir"}, {"id": 1.5}]"#).unwrap();
        let animal = Records::new(Document::new(&path), "id", "Animal record");

        let created = animal.create(object(json!({ "breed": "ongole" }))).await.unwrap();
        assert_eq!(created["id"], json!(4));

        let replaced = animal.replace(3, object(json!({ "breed": "kankrej" }))).await.unwrap();
        assert_eq!(replaced, json!({ "id": 3, "breed": "kankrej" }));

        animal.delete(3).await.unwrap();
        assert_eq!(animal.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_on_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let animal = Records::new(
            Document::new(dir.path().join(ANIMAL_FILE)),
            "id",
            "Animal record",
        );

        let created = animal.create(object(json!({ "breed": "gir" }))).await.unwrap();
        assert_eq!(created["id"], json!(1));
    }

    #[tokio::test]
    async fn test_replace_stamps_path_id() {
        let dir = tempdir().unwrap();
        let collections = Collections::open(dir.path()).await.unwrap();
        collections.animal.create(object(json!({ "breed": "gir" }))).await.unwrap();
        collections.animal.create(object(json!({ "breed": "sahiwal" }))).await.unwrap();

        let replaced = collections
            .animal
            .replace(2, object(json!({ "id": 99, "breed": "tharparkar" })))
            .await
            .unwrap();
        assert_eq!(replaced, json!({ "id": 2, "breed": "tharparkar" }));

        let listed = collections.animal.list().await.unwrap();
        assert_eq!(listed[1], json!({ "id": 2, "breed": "tharparkar" }));
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_id_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let collections = Collections::open(dir.path()).await.unwrap();
        collections.gold.create(object(json!({ "amount": 5 }))).await.unwrap();
        let before = std::fs::read(collections.gold.document().path()).unwrap();

        let replaced = collections.gold.replace(42, object(json!({}))).await;
        assert!(matches!(replaced, Err(StoreError::NotFound)));

        let deleted = collections.gold.delete(42).await;
        assert!(matches!(deleted, Err(StoreError::NotFound)));

        let after = std::fs::read(collections.gold.document().path()).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_delete_removes_only_first_match() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(GOLD_FILE);
        std::fs::write(&path, r#"[{"id": 1, "n": "a"}, {"id": 1, "n": "b"}, {"id": 2}]"#).unwrap();

        let gold = Records::new(Document::new(&path), "id", "Gold record");
        gold.delete(1).await.unwrap();

        assert_eq!(
            gold.list().await.unwrap(),
            vec![json!({ "id": 1, "n": "b" }), json!({ "id": 2 })]
        );
    }

    #[tokio::test]
    async fn test_document_write_replaces_everything() {
        let dir = tempdir().unwrap();
        let collections = Collections::open(dir.path()).await.unwrap();

        collections
            .kcc
            .write(&json!([{ "farmer": "a" }, { "farmer": "b" }]))
            .await
            .unwrap();
        let payload = json!({ "season": "rabi", "rows": [1, 2, 3] });
        collections.kcc.write(&payload).await.unwrap();

        assert_eq!(collections.kcc.read().await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_open_creates_empty_collections() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("data");
        let collections = Collections::open(&root).await.unwrap();

        assert!(collections.crops.list().await.unwrap().is_empty());
        assert_eq!(collections.kcc_ah.read().await.unwrap(), json!([]));
        assert!(root.join(KCC_AH_FILE).exists());
    }

    #[tokio::test]
    async fn test_open_keeps_existing_content() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(GOLD_FILE), r#"[{"id": 4}]"#).unwrap();

        let collections = Collections::open(dir.path()).await.unwrap();
        assert_eq!(collections.gold.list().await.unwrap(), vec![json!({ "id": 4 })]);
    }

    #[tokio::test]
    async fn test_unparsable_file_is_read_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(GOLD_FILE);
        std::fs::write(&path, "not json").unwrap();
        let gold = Records::new(Document::new(&path), "id", "Gold record");

        assert!(matches!(gold.list().await, Err(StoreError::Parse(_))));
        assert!(matches!(gold.create(Map::new()).await, Err(StoreError::Parse(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error_for_list() {
        let dir = tempdir().unwrap();
        let gold = Records::new(Document::new(dir.path().join(GOLD_FILE)), "id", "Gold record");

        assert!(matches!(gold.list().await, Err(StoreError::Read(_))));
        assert!(matches!(gold.delete(1).await, Err(StoreError::Read(_))));
    }

    #[tokio::test]
    async fn test_concurrent_creates_get_distinct_ids() {
        let dir = tempdir().unwrap();
        let collections = std::sync::Arc::new(Collections::open(dir.path()).await.unwrap());

        let mut handles = Vec::new();
        for n in 0..20 {
            let collections = collections.clone();
            handles.push(tokio::spawn(async move {
                collections.gold.create(object(json!({ "n": n }))).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut ids: Vec<i64> = collections
            .gold
            .list()
            .await
            .unwrap()
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());
    }
}
