/// Cross-page handoff and layout preferences
///
/// Moving between pages passes the full effective record through local
/// storage as a JSON snapshot, the same channel a fresh process would read.
use tracing::warn;

use super::data::DamageRecord;
use super::storage::LocalStorage;
use crate::error::{HandoffError, StorageError};

pub const SELECTED_KEY: &str = "selectedDamage";
pub const SIDEBAR_KEY: &str = "sidebarCollapsed";

/// Store `record` as the current selection snapshot
pub fn store_selected<S: LocalStorage + ?Sized>(
    storage: &S,
    record: &DamageRecord,
) -> Result<(), StorageError> {
    let encoded = serde_json::to_string(record)?;
    storage.set_item(SELECTED_KEY, &encoded)
}

/// Invalidate the selection snapshot; later reads see no selection
pub fn clear_selected<S: LocalStorage + ?Sized>(storage: &S) -> Result<(), StorageError> {
    storage.set_item(SELECTED_KEY, "null")
}

/// Read the selection snapshot. Absent, `null` and unparsable content all
/// count as no selection.
pub fn load_selected<S: LocalStorage + ?Sized>(storage: &S) -> Result<DamageRecord, HandoffError> {
    let raw = storage
        .get_item(SELECTED_KEY)
        .ok_or(HandoffError::MissingSelection)?;
    match serde_json::from_str::<Option<DamageRecord>>(&raw) {
        Ok(Some(record)) => Ok(record),
        Ok(None) => Err(HandoffError::MissingSelection),
        Err(err) => {
            warn!(error = %err, "selected damage snapshot is corrupt");
            Err(HandoffError::MissingSelection)
        }
    }
}

pub fn sidebar_collapsed<S: LocalStorage + ?Sized>(storage: &S) -> bool {
    storage.get_item(SIDEBAR_KEY).as_deref() == Some("1")
}

pub fn set_sidebar_collapsed<S: LocalStorage + ?Sized>(
    storage: &S,
    collapsed: bool,
) -> Result<(), StorageError> {
    storage.set_item(SIDEBAR_KEY, if collapsed { "1" } else { "0" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::fixtures::record;
    use crate::state::storage::MemoryStorage;

    #[test]
    fn test_snapshot_round_trip() {
        let storage = MemoryStorage::new();
        let mut selected = record("a", "Potholes", "2025-08-05 09:30");
        selected.response_notes = "要補修".into();
        store_selected(&storage, &selected).unwrap();

        assert_eq!(load_selected(&storage), Ok(selected));
    }

    #[test]
    fn test_missing_null_and_corrupt_snapshots() {
        let storage = MemoryStorage::new();
        assert_eq!(load_selected(&storage), Err(HandoffError::MissingSelection));

        storage.set_item(SELECTED_KEY, "null").unwrap();
        assert_eq!(load_selected(&storage), Err(HandoffError::MissingSelection));

        storage.set_item(SELECTED_KEY, "{\"id\":").unwrap();
        assert_eq!(load_selected(&storage), Err(HandoffError::MissingSelection));
    }

    #[test]
    fn test_reads_snapshot_written_by_web_client() {
        let storage = MemoryStorage::new();
        storage
            .set_item(
                SELECTED_KEY,
                r#"{"id":"fallback-2","type":"ポットホール","lat":35.597,"lng":139.347,
                    "severity":"大","status":"in-progress","inspectionTime":"2025-08-12 14:00"}"#,
            )
            .unwrap();
        let restored = load_selected(&storage).unwrap();
        assert_eq!(restored.id, "fallback-2");
        assert_eq!(restored.status, crate::state::data::DamageStatus::InProgress);
        assert_eq!(restored.size, None);
    }

    #[test]
    fn test_sidebar_preference() {
        let storage = MemoryStorage::new();
        assert!(!sidebar_collapsed(&storage));
        set_sidebar_collapsed(&storage, true).unwrap();
        assert!(sidebar_collapsed(&storage));
        assert_eq!(storage.get_item(SIDEBAR_KEY).as_deref(), Some("1"));
        set_sidebar_collapsed(&storage, false).unwrap();
        assert!(!sidebar_collapsed(&storage));
    }
}
