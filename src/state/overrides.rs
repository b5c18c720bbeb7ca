/// Locally persisted status overrides
///
/// An `Override` is a sparse patch over a `DamageRecord`. The whole table of
/// patches is stored as one JSON document, keyed by record id, and is
/// rewritten in full on every save. Patches are never removed; deleting a
/// record only sets its tombstone.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::data::{DamageRecord, DamageSize, DamageStatus};
use super::storage::LocalStorage;
use crate::error::StorageError;

/// Storage key of the override table
pub const OVERRIDES_KEY: &str = "damagesStatusOverrides";

/// Partial-field patch for one record. `None` means "not overridden".
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Override {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<DamageSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DamageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patrol_team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporary_repair: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_text: Option<String>,
    /// Tombstone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

/// Overwrite `target` when `patch` carries a value
fn take<T: Clone>(target: &mut Option<T>, patch: &Option<T>) {
    if patch.is_some() {
        target.clone_from(patch);
    }
}

/// Replace `target` with the patched value when present
fn apply<T: Clone>(target: &mut T, patch: &Option<T>) {
    if let Some(value) = patch {
        target.clone_from(value);
    }
}

impl Override {
    /// Patch that only sets the tombstone
    pub fn tombstone() -> Self {
        Self {
            deleted: Some(true),
            ..Self::default()
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.deleted == Some(true)
    }

    /// Effective record: `base` with every present field replaced.
    /// The id is never patched.
    pub fn apply_to(&self, base: &DamageRecord) -> DamageRecord {
        let mut record = base.clone();
        apply(&mut record.damage_type, &self.damage_type);
        take(&mut record.lat, &self.lat);
        take(&mut record.lng, &self.lng);
        apply(&mut record.gps, &self.gps);
        take(&mut record.size, &self.size);
        apply(&mut record.inspection_time, &self.inspection_time);
        apply(&mut record.status, &self.status);
        apply(&mut record.response_date, &self.response_date);
        apply(&mut record.response_details, &self.response_details);
        apply(&mut record.response_notes, &self.response_notes);
        apply(&mut record.vehicle, &self.vehicle);
        apply(&mut record.patrol_team, &self.patrol_team);
        apply(&mut record.weather, &self.weather);
        apply(&mut record.inspection_section, &self.inspection_section);
        apply(&mut record.temporary_repair, &self.temporary_repair);
        take(&mut record.image, &self.image);
        take(&mut record.voice, &self.voice);
        apply(&mut record.voice_text, &self.voice_text);
        record
    }
}

/// Full patch table, record id → patch
pub type OverrideTable = BTreeMap<String, Override>;

/// The table as stored, entries not yet decoded
type StoredTable = BTreeMap<String, Value>;

/// Read/write access to the override table in local storage.
pub struct OverrideStore<'a, S: LocalStorage + ?Sized> {
    storage: &'a S,
}

impl<'a, S: LocalStorage + ?Sized> OverrideStore<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    /// The whole table. Missing or unparsable content reads as empty;
    /// a single malformed entry is skipped without hiding the others.
    pub fn get(&self) -> OverrideTable {
        let stored = match self.read_stored() {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "failed to read override table, treating as empty");
                return OverrideTable::new();
            }
        };
        stored
            .into_iter()
            .filter_map(|(id, entry)| match serde_json::from_value::<Override>(entry) {
                Ok(patch) => Some((id, patch)),
                Err(err) => {
                    warn!(id = %id, error = %err, "skipping malformed override entry");
                    None
                }
            })
            .collect()
    }

    /// Merge `patch` into the entry for `id` and persist the whole table
    /// in one write. Fields present in `patch` win, all other stored
    /// fields and entries are written back untouched. Nothing is written
    /// if the table could not be read.
    pub fn set(&self, id: &str, patch: &Override) -> Result<(), StorageError> {
        debug!(id, ?patch, "saving override");
        let mut table = self.read_stored()?;

        let entry = table
            .entry(id.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            warn!(id, "replacing non-object override entry");
            *entry = Value::Object(Map::new());
        }
        if let (Value::Object(target), Value::Object(fields)) = (entry, serde_json::to_value(patch)?) {
            target.extend(fields);
        }

        let encoded = serde_json::to_string(&table)?;
        self.storage.set_item(OVERRIDES_KEY, &encoded)
    }

    fn read_stored(&self) -> Result<StoredTable, StorageError> {
        let Some(raw) = self.storage.read_item(OVERRIDES_KEY)? else {
            return Ok(StoredTable::new());
        };
        match serde_json::from_str(&raw) {
            Ok(table) => Ok(table),
            Err(err) => {
                warn!(error = %err, "override table is corrupt, treating as empty");
                Ok(StoredTable::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::fixtures::record;
    use crate::state::storage::{FlakyStorage, MemoryStorage};

    #[test]
    fn test_missing_and_corrupt_read_as_empty() {
        let storage = MemoryStorage::new();
        let store = OverrideStore::new(&storage);
        assert!(store.get().is_empty());

        storage.set_item(OVERRIDES_KEY, "{not json").unwrap();
        assert!(store.get().is_empty());
    }

    #[test]
    fn test_set_merges_fields() {
        let storage = MemoryStorage::new();
        let store = OverrideStore::new(&storage);

        store
            .set(
                "a",
                &Override {
                    status: Some(DamageStatus::InProgress),
                    response_details: Some("cone placed".into()),
                    ..Override::default()
                },
            )
            .unwrap();
        store
            .set(
                "a",
                &Override {
                    status: Some(DamageStatus::Completed),
                    ..Override::default()
                },
            )
            .unwrap();

        let table = store.get();
        let patch = &table["a"];
        assert_eq!(patch.status, Some(DamageStatus::Completed));
        assert_eq!(patch.response_details.as_deref(), Some("cone placed"));
    }

    #[test]
    fn test_repeated_write_is_idempotent() {
        let storage = MemoryStorage::new();
        let store = OverrideStore::new(&storage);
        let patch = Override {
            response_notes: Some("check again".into()),
            ..Override::default()
        };

        store.set("a", &patch).unwrap();
        let once = storage.get_item(OVERRIDES_KEY);
        store.set("a", &patch).unwrap();
        assert_eq!(storage.get_item(OVERRIDES_KEY), once);
    }

    #[test]
    fn test_stored_shape_is_sparse_camel_case() {
        let storage = MemoryStorage::new();
        let store = OverrideStore::new(&storage);
        store
            .set(
                "a",
                &Override {
                    response_date: Some("2025-01-10".into()),
                    ..Override::default()
                },
            )
            .unwrap();
        assert_eq!(
            storage.get_item(OVERRIDES_KEY).as_deref(),
            Some(r#"{"a":{"responseDate":"2025-01-10"}}"#)
        );
    }

    #[test]
    fn test_reads_legacy_table_with_unknown_keys() {
        let storage = MemoryStorage::new();
        storage
            .set_item(
                OVERRIDES_KEY,
                r#"{"7":{"status":"cancelled","deleted":true,"extra":1}}"#,
            )
            .unwrap();
        let table = OverrideStore::new(&storage).get();
        assert!(table["7"].is_tombstone());
        assert_eq!(table["7"].status, Some(DamageStatus::Cancelled));
    }

    #[test]
    fn test_malformed_entry_does_not_hide_or_drop_others() {
        let storage = MemoryStorage::new();
        storage
            .set_item(
                OVERRIDES_KEY,
                r#"{"a":{"deleted":true},"b":{"status":"archived"}}"#,
            )
            .unwrap();
        let store = OverrideStore::new(&storage);

        let table = store.get();
        assert_eq!(table.len(), 1);
        assert!(table["a"].is_tombstone());

        store
            .set(
                "c",
                &Override {
                    response_notes: Some("x".into()),
                    ..Override::default()
                },
            )
            .unwrap();

        let table = store.get();
        assert!(table["a"].is_tombstone());
        assert_eq!(table["c"].response_notes.as_deref(), Some("x"));
        let raw: Value = serde_json::from_str(&storage.get_item(OVERRIDES_KEY).unwrap()).unwrap();
        assert_eq!(raw["b"]["status"], "archived");
    }

    #[test]
    fn test_set_keeps_unknown_fields_of_patched_entry() {
        let storage = MemoryStorage::new();
        storage
            .set_item(OVERRIDES_KEY, r#"{"a":{"status":"archived","deleted":true}}"#)
            .unwrap();
        OverrideStore::new(&storage)
            .set(
                "a",
                &Override {
                    status: Some(DamageStatus::Completed),
                    ..Override::default()
                },
            )
            .unwrap();

        let table = OverrideStore::new(&storage).get();
        assert!(table["a"].is_tombstone());
        assert_eq!(table["a"].status, Some(DamageStatus::Completed));
    }

    #[test]
    fn test_set_refuses_to_write_after_failed_read() {
        let storage = FlakyStorage::default();
        let store = OverrideStore::new(&storage);
        store.set("a", &Override::tombstone()).unwrap();
        let before = storage.inner.get_item(OVERRIDES_KEY);

        storage.fail_reads.set(true);
        let patch = Override {
            response_notes: Some("x".into()),
            ..Override::default()
        };
        assert!(store.set("b", &patch).is_err());
        assert!(store.get().is_empty());

        storage.fail_reads.set(false);
        assert_eq!(storage.inner.get_item(OVERRIDES_KEY), before);
        assert!(store.get()["a"].is_tombstone());
    }

    #[test]
    fn test_apply_keeps_absent_fields() {
        let base = record("a", "Potholes", "2025-08-05 09:30");
        let patch = Override {
            weather: Some("雨".into()),
            response_date: Some(String::new()),
            ..Override::default()
        };
        let merged = patch.apply_to(&base);
        assert_eq!(merged.weather, "雨");
        assert_eq!(merged.id, base.id);
        assert_eq!(merged.damage_type, base.damage_type);
        assert_eq!(merged.inspection_time, base.inspection_time);
    }
}
