//! Prescription history operations: list, export snapshot, bulk wipe, and
//! the user-settings record.
//!
//! These sit beside the pipeline rather than inside it — they operate on
//! what previous runs persisted.

use crate::error::MediScanError;
use crate::record::{PrescriptionRecord, Settings};
use crate::store::{BlobStore, KvStore};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// KV key holding the user-settings record.
pub const SETTINGS_KEY: &str = "settings";

/// List every persisted prescription record, newest storage order.
///
/// Entries that fail to decode are skipped with a warning rather than
/// failing the whole listing — one corrupt record must not hide the rest.
pub async fn list_prescriptions(
    kv: &dyn KvStore,
) -> Result<Vec<PrescriptionRecord>, MediScanError> {
    let entries = kv
        .list("prescription:*", true)
        .await
        .map_err(|e| MediScanError::Store(e.to_string()))?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let value = entry.value?;
            match serde_json::from_str::<PrescriptionRecord>(&value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(key = %entry.key, error = %e, "Skipping unreadable record");
                    None
                }
            }
        })
        .collect())
}

/// Load the user settings, falling back to defaults when absent or unreadable.
pub async fn load_settings(kv: &dyn KvStore) -> Result<Settings, MediScanError> {
    let json = kv
        .get(SETTINGS_KEY)
        .await
        .map_err(|e| MediScanError::Store(e.to_string()))?;
    Ok(json
        .and_then(|j| serde_json::from_str(&j).ok())
        .unwrap_or_default())
}

/// Persist the user settings.
pub async fn save_settings(kv: &dyn KvStore, settings: &Settings) -> Result<(), MediScanError> {
    let json = serde_json::to_string(settings)
        .map_err(|e| MediScanError::Internal(format!("Settings serialization failed: {e}")))?;
    kv.set(SETTINGS_KEY, &json)
        .await
        .map_err(|e| MediScanError::Store(e.to_string()))
}

/// The downloadable prescription-history snapshot.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSnapshot {
    pub user: String,
    pub export_date: DateTime<Utc>,
    pub prescriptions: Vec<PrescriptionRecord>,
    pub settings: Settings,
}

/// File name the snapshot is offered under.
pub fn export_file_name(user: &str, date: NaiveDate) -> String {
    format!("mediscan-data-{user}-{date}.json")
}

/// Build the export snapshot for `user`, stamped `now`.
///
/// Returns the suggested file name and the indented JSON document.
pub async fn export_snapshot_at(
    kv: &dyn KvStore,
    user: &str,
    now: DateTime<Utc>,
) -> Result<(String, String), MediScanError> {
    let snapshot = ExportSnapshot {
        user: user.to_string(),
        export_date: now,
        prescriptions: list_prescriptions(kv).await?,
        settings: load_settings(kv).await?,
    };
    let json = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| MediScanError::Internal(format!("Snapshot serialization failed: {e}")))?;
    Ok((export_file_name(user, now.date_naive()), json))
}

/// Build the export snapshot stamped with the current time.
pub async fn export_snapshot(
    kv: &dyn KvStore,
    user: &str,
) -> Result<(String, String), MediScanError> {
    export_snapshot_at(kv, user, Utc::now()).await
}

/// Delete every stored blob, then flush the key-value store.
///
/// Returns the number of blobs removed. Irreversible; callers confirm with
/// the user before invoking.
pub async fn wipe(blobs: &dyn BlobStore, kv: &dyn KvStore) -> Result<usize, MediScanError> {
    let files = blobs
        .list_dir("")
        .await
        .map_err(|e| MediScanError::Store(e.to_string()))?;

    for path in &files {
        blobs
            .delete(path)
            .await
            .map_err(|e| MediScanError::Store(e.to_string()))?;
    }

    kv.flush()
        .await
        .map_err(|e| MediScanError::Store(e.to_string()))?;

    info!(deleted_files = files.len(), "Wiped all application data");
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Feedback, RecordId};
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn sample_record(id: &str) -> PrescriptionRecord {
        PrescriptionRecord {
            id: RecordId::from_string(id),
            prescription_path: format!("/files/{id}.pdf"),
            image_path: format!("/files/{id}.png"),
            patient_name: Some("Alice Johnson".into()),
            doctor_name: Some("Dr. Smith".into()),
            symptoms: None,
            feedback: Feedback::default(),
            ai_response: String::new(),
        }
    }

    async fn seed(store: &MemoryStore, records: &[PrescriptionRecord]) {
        for r in records {
            let json = serde_json::to_string(r).unwrap();
            crate::store::KvStore::set(store, &r.id.kv_key(), &json)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn list_returns_only_prescription_keys() {
        let store = MemoryStore::new();
        seed(&store, &[sample_record("a"), sample_record("b")]).await;
        crate::store::KvStore::set(&store, SETTINGS_KEY, "{}")
            .await
            .unwrap();

        let records = list_prescriptions(&store).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn list_skips_unreadable_entries() {
        let store = MemoryStore::new();
        seed(&store, &[sample_record("a")]).await;
        crate::store::KvStore::set(&store, "prescription:broken", "not json")
            .await
            .unwrap();

        let records = list_prescriptions(&store).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn settings_default_then_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(load_settings(&store).await.unwrap(), Settings::default());

        let custom = Settings {
            dark_mode: true,
            language: "French".into(),
            notifications: false,
        };
        save_settings(&store, &custom).await.unwrap();
        assert_eq!(load_settings(&store).await.unwrap(), custom);
    }

    #[tokio::test]
    async fn export_snapshot_shape_and_name() {
        let store = MemoryStore::new();
        seed(&store, &[sample_record("a")]).await;

        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 0).unwrap();
        let (name, json) = export_snapshot_at(&store, "alice", now).await.unwrap();
        assert_eq!(name, "mediscan-data-alice-2024-03-15.json");

        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["user"], "alice");
        assert!(v["exportDate"].as_str().unwrap().starts_with("2024-03-15T12:30:00"));
        assert_eq!(v["prescriptions"].as_array().unwrap().len(), 1);
        assert!(v["settings"].is_object());

        // Indented output, not a single line.
        assert!(json.lines().count() > 5);
    }

    #[tokio::test]
    async fn wipe_removes_blobs_and_flushes_kv() {
        let store = MemoryStore::new();
        seed(&store, &[sample_record("a")]).await;
        crate::store::BlobStore::upload(&store, "rx.pdf", b"bytes")
            .await
            .unwrap();
        crate::store::BlobStore::upload(&store, "rx.png", b"png")
            .await
            .unwrap();

        let deleted = wipe(&store, &store).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.file_count().await, 0);
        assert_eq!(store.kv_len().await, 0);
    }
}
