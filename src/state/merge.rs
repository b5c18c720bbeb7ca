use super::data::DamageRecord;
use super::overrides::OverrideTable;

/// Combine base records with their overrides.
///
/// Base order is preserved. Records whose effective tombstone is set are
/// dropped. Overrides keyed by ids absent from `base` are ignored.
pub fn merge(base: &[DamageRecord], overrides: &OverrideTable) -> Vec<DamageRecord> {
    base.iter()
        .filter_map(|record| match overrides.get(&record.id) {
            None => Some(record.clone()),
            Some(patch) if patch.is_tombstone() => None,
            Some(patch) => Some(patch.apply_to(record)),
        })
        .collect()
}
