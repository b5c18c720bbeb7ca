/// Filter facets and the persisted filter selection
///
/// Options are derived from the merged dataset once per data load. The
/// user's selection is stored per dimension as a plain string and is reset
/// to "all" whenever the stored value is no longer an available option.
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

use super::data::{DamageRecord, DamageSize, DamageStatus};
use super::storage::LocalStorage;
use crate::error::StorageError;

/// Stored literal for "every value"
pub const ALL_SENTINEL: &str = "全て";

pub const MONTH_KEY: &str = "filterMonth";
pub const SIZE_KEY: &str = "filterSeverity";
pub const TYPE_KEY: &str = "filterType";
pub const STATUS_KEY: &str = "filterStatus";

/// A value that can be stored as a filter selection
pub trait FacetValue: Sized {
    fn encode(&self) -> String;
    fn decode(stored: &str) -> Option<Self>;
}

/// `YYYY-MM` month bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey(pub String);

impl fmt::Display for MonthKey {
    /// "2025-08" renders as "2025年8月"
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.split_once('-') {
            Some((year, month)) => match month.parse::<u32>() {
                Ok(month) => write!(f, "{year}年{month}月"),
                Err(_) => f.write_str(&self.0),
            },
            None => f.write_str(&self.0),
        }
    }
}

impl FacetValue for MonthKey {
    fn encode(&self) -> String {
        self.0.clone()
    }

    fn decode(stored: &str) -> Option<Self> {
        Some(MonthKey(stored.to_string()))
    }
}

/// Size facet option; `Unknown` matches records without a size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeOption {
    Known(DamageSize),
    Unknown,
}

impl fmt::Display for SizeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeOption::Known(size) => fmt::Display::fmt(size, f),
            SizeOption::Unknown => f.write_str("サイズ不明"),
        }
    }
}

impl FacetValue for SizeOption {
    fn encode(&self) -> String {
        match self {
            SizeOption::Known(size) => size.as_str().to_string(),
            SizeOption::Unknown => "unknown".to_string(),
        }
    }

    fn decode(stored: &str) -> Option<Self> {
        match stored {
            // "null" is what older builds wrote for the unknown option
            "unknown" | "null" => Some(SizeOption::Unknown),
            other => DamageSize::parse(other).map(SizeOption::Known),
        }
    }
}

impl FacetValue for String {
    fn encode(&self) -> String {
        self.clone()
    }

    fn decode(stored: &str) -> Option<Self> {
        Some(stored.to_string())
    }
}

impl FacetValue for DamageStatus {
    fn encode(&self) -> String {
        self.as_str().to_string()
    }

    fn decode(stored: &str) -> Option<Self> {
        DamageStatus::parse(stored)
    }
}

/// Selection on one dimension
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FacetChoice<T> {
    #[default]
    All,
    Only(T),
}

impl<T: fmt::Display> fmt::Display for FacetChoice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacetChoice::All => f.write_str(ALL_SENTINEL),
            FacetChoice::Only(value) => fmt::Display::fmt(value, f),
        }
    }
}

impl<T: FacetValue> FacetChoice<T> {
    pub fn to_stored(&self) -> String {
        match self {
            FacetChoice::All => ALL_SENTINEL.to_string(),
            FacetChoice::Only(value) => value.encode(),
        }
    }

    fn from_stored(stored: &str) -> Option<Self> {
        if stored == ALL_SENTINEL {
            Some(FacetChoice::All)
        } else {
            T::decode(stored).map(FacetChoice::Only)
        }
    }
}

impl<T> FacetChoice<T> {
    /// "all" passes everything, including records without a value
    fn accepts(&self, test: impl FnOnce(&T) -> bool) -> bool {
        match self {
            FacetChoice::All => true,
            FacetChoice::Only(value) => test(value),
        }
    }
}

/// "All" followed by every option, in facet order
fn with_all<T: Clone>(options: &[T]) -> Vec<FacetChoice<T>> {
    std::iter::once(FacetChoice::All)
        .chain(options.iter().cloned().map(FacetChoice::Only))
        .collect()
}

/// Option lists for the four filter dimensions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacetOptions {
    /// Most recent first
    pub months: Vec<MonthKey>,
    /// large, medium, small, then unknown when any record lacks a size
    pub sizes: Vec<SizeOption>,
    /// First-seen order across the dataset
    pub types: Vec<String>,
}

impl FacetOptions {
    pub fn build(records: &[DamageRecord]) -> Self {
        let mut months: Vec<MonthKey> = records
            .iter()
            .map(|r| MonthKey(r.month_key()))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        months.sort_by(|a, b| b.cmp(a));

        let mut sizes: Vec<SizeOption> = records
            .iter()
            .filter_map(|r| r.size)
            .collect::<HashSet<_>>()
            .into_iter()
            .map(SizeOption::Known)
            .collect();
        sizes.sort_by_key(|option| match option {
            SizeOption::Known(size) => size.rank(),
            SizeOption::Unknown => u8::MAX,
        });
        if records.iter().any(|r| r.size.is_none()) {
            sizes.push(SizeOption::Unknown);
        }

        let mut seen = HashSet::new();
        let types = records
            .iter()
            .filter(|r| seen.insert(r.damage_type.as_str()))
            .map(|r| r.damage_type.clone())
            .collect();

        Self {
            months,
            sizes,
            types,
        }
    }

    /// Status options do not depend on the data
    pub fn statuses(&self) -> &'static [DamageStatus] {
        &DamageStatus::ALL
    }

    pub fn month_choices(&self) -> Vec<FacetChoice<MonthKey>> {
        with_all(&self.months)
    }

    pub fn size_choices(&self) -> Vec<FacetChoice<SizeOption>> {
        with_all(&self.sizes)
    }

    pub fn type_choices(&self) -> Vec<FacetChoice<String>> {
        with_all(&self.types)
    }

    pub fn status_choices(&self) -> Vec<FacetChoice<DamageStatus>> {
        with_all(self.statuses())
    }
}

/// Current selection on all four dimensions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterState {
    pub month: FacetChoice<MonthKey>,
    pub size: FacetChoice<SizeOption>,
    pub damage_type: FacetChoice<String>,
    pub status: FacetChoice<DamageStatus>,
}

impl FilterState {
    /// True when the record passes every dimension
    pub fn matches(&self, record: &DamageRecord) -> bool {
        self.month.accepts(|m| record.month_key() == m.0)
            && self.size.accepts(|s| match s {
                SizeOption::Unknown => record.size.is_none(),
                SizeOption::Known(size) => record.size == Some(*size),
            })
            && self.damage_type.accepts(|t| &record.damage_type == t)
            && self.status.accepts(|s| record.status == *s)
    }

    /// Restore the persisted selection against the current options.
    /// Values that are missing or no longer offered become "all", and the
    /// reset is written back.
    pub fn restore<S: LocalStorage + ?Sized>(storage: &S, options: &FacetOptions) -> Self {
        Self {
            month: restore_choice(storage, MONTH_KEY, &options.months),
            size: restore_choice(storage, SIZE_KEY, &options.sizes),
            damage_type: restore_choice(storage, TYPE_KEY, &options.types),
            status: restore_choice(storage, STATUS_KEY, options.statuses()),
        }
    }

    /// Write all four selections
    pub fn persist<S: LocalStorage + ?Sized>(&self, storage: &S) -> Result<(), StorageError> {
        storage.set_item(MONTH_KEY, &self.month.to_stored())?;
        storage.set_item(SIZE_KEY, &self.size.to_stored())?;
        storage.set_item(TYPE_KEY, &self.damage_type.to_stored())?;
        storage.set_item(STATUS_KEY, &self.status.to_stored())?;
        Ok(())
    }
}

/// A failed write-back is only logged; the reset still applies in memory.
fn restore_choice<S, T>(storage: &S, key: &str, options: &[T]) -> FacetChoice<T>
where
    S: LocalStorage + ?Sized,
    T: FacetValue + PartialEq,
{
    let restored = storage
        .get_item(key)
        .and_then(|stored| FacetChoice::<T>::from_stored(&stored))
        .filter(|choice| match choice {
            FacetChoice::All => true,
            FacetChoice::Only(value) => options.contains(value),
        });

    match restored {
        Some(choice) => choice,
        None => {
            debug!(key, "stored filter unavailable, resetting to all");
            if let Err(err) = storage.set_item(key, ALL_SENTINEL) {
                warn!(key, error = %err, "failed to persist filter reset");
            }
            FacetChoice::All
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::fixtures::record;
    use crate::state::storage::{FlakyStorage, MemoryStorage};

    fn sample() -> Vec<DamageRecord> {
        let mut a = record("a", "Potholes", "2025-08-05 09:30");
        a.size = Some(DamageSize::Small);
        let mut b = record("b", "Alligator Crack", "2025-09-03 10:15");
        b.size = Some(DamageSize::Large);
        let c = record("c", "Potholes", "2025-08-12 14:00");
        let mut d = record("d", "Longitudinal Crack", "2024-12-30 08:00");
        d.size = Some(DamageSize::Medium);
        vec![a, b, c, d]
    }

    #[test]
    fn test_month_options_descending() {
        let options = FacetOptions::build(&sample());
        let months: Vec<&str> = options.months.iter().map(|m| m.0.as_str()).collect();
        assert_eq!(months, vec!["2025-09", "2025-08", "2024-12"]);
    }

    #[test]
    fn test_size_options_ranked_with_unknown_last() {
        let options = FacetOptions::build(&sample());
        assert_eq!(
            options.sizes,
            vec![
                SizeOption::Known(DamageSize::Large),
                SizeOption::Known(DamageSize::Medium),
                SizeOption::Known(DamageSize::Small),
                SizeOption::Unknown,
            ]
        );

        let sized: Vec<DamageRecord> = sample().into_iter().filter(|r| r.size.is_some()).collect();
        assert!(!FacetOptions::build(&sized).sizes.contains(&SizeOption::Unknown));
    }

    #[test]
    fn test_type_options_keep_first_seen_order() {
        let options = FacetOptions::build(&sample());
        assert_eq!(
            options.types,
            vec!["Potholes", "Alligator Crack", "Longitudinal Crack"]
        );
    }

    #[test]
    fn test_status_options_fixed() {
        let options = FacetOptions::build(&[]);
        assert_eq!(options.statuses(), &DamageStatus::ALL);
        assert_eq!(options.status_choices().len(), 5);
        assert!(options.months.is_empty());
    }

    #[test]
    fn test_all_matches_records_without_values() {
        let mut unlocated = record("x", "Potholes", "");
        unlocated.size = None;
        assert!(FilterState::default().matches(&unlocated));
    }

    #[test]
    fn test_all_is_superset_on_every_dimension() {
        let records = sample();
        let options = FacetOptions::build(&records);
        let count = |filters: &FilterState| records.iter().filter(|r| filters.matches(r)).count();
        let base = FilterState::default();
        let everything = count(&base);

        for month in &options.months {
            let f = FilterState {
                month: FacetChoice::Only(month.clone()),
                ..base.clone()
            };
            assert!(count(&f) <= everything);
        }
        for size in &options.sizes {
            let f = FilterState {
                size: FacetChoice::Only(*size),
                ..base.clone()
            };
            assert!(count(&f) <= everything);
        }
        for t in &options.types {
            let f = FilterState {
                damage_type: FacetChoice::Only(t.clone()),
                ..base.clone()
            };
            assert!(count(&f) <= everything);
        }
        for s in options.statuses() {
            let f = FilterState {
                status: FacetChoice::Only(*s),
                ..base.clone()
            };
            assert!(count(&f) <= everything);
        }
    }

    #[test]
    fn test_unknown_size_matches_absent_only() {
        let filters = FilterState {
            size: FacetChoice::Only(SizeOption::Unknown),
            ..FilterState::default()
        };
        let ids: Vec<String> = sample()
            .into_iter()
            .filter(|r| filters.matches(r))
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn test_stale_month_restores_to_all() {
        let storage = MemoryStorage::new();
        storage.set_item(MONTH_KEY, "2024-03").unwrap();
        let records = vec![
            record("a", "Potholes", "2025-08-01 10:00"),
            record("b", "Potholes", "2025-09-01 10:00"),
        ];
        let options = FacetOptions::build(&records);

        let restored = FilterState::restore(&storage, &options);
        assert_eq!(restored.month, FacetChoice::All);
        assert_eq!(storage.get_item(MONTH_KEY).as_deref(), Some(ALL_SENTINEL));
    }

    #[test]
    fn test_valid_values_restore() {
        let storage = MemoryStorage::new();
        storage.set_item(MONTH_KEY, "2025-08").unwrap();
        storage.set_item(SIZE_KEY, "null").unwrap();
        storage.set_item(TYPE_KEY, "Potholes").unwrap();
        storage.set_item(STATUS_KEY, "in-progress").unwrap();

        let restored = FilterState::restore(&storage, &FacetOptions::build(&sample()));
        assert_eq!(restored.month, FacetChoice::Only(MonthKey("2025-08".into())));
        assert_eq!(restored.size, FacetChoice::Only(SizeOption::Unknown));
        assert_eq!(restored.damage_type, FacetChoice::Only("Potholes".to_string()));
        assert_eq!(restored.status, FacetChoice::Only(DamageStatus::InProgress));
        // untouched keys keep their stored literal
        assert_eq!(storage.get_item(SIZE_KEY).as_deref(), Some("null"));
    }

    #[test]
    fn test_bad_status_and_missing_keys_reset() {
        let storage = MemoryStorage::new();
        storage.set_item(STATUS_KEY, "archived").unwrap();
        let restored = FilterState::restore(&storage, &FacetOptions::build(&sample()));
        assert_eq!(restored, FilterState::default());
        for key in [MONTH_KEY, SIZE_KEY, TYPE_KEY, STATUS_KEY] {
            assert_eq!(storage.get_item(key).as_deref(), Some(ALL_SENTINEL));
        }
    }

    #[test]
    fn test_failed_reset_write_keeps_valid_choices() {
        let storage = FlakyStorage::default();
        storage.inner.set_item(TYPE_KEY, "Potholes").unwrap();
        storage.inner.set_item(MONTH_KEY, "2024-03").unwrap();
        storage.fail_writes.set(true);

        let restored = FilterState::restore(&storage, &FacetOptions::build(&sample()));
        assert_eq!(restored.damage_type, FacetChoice::Only("Potholes".to_string()));
        assert_eq!(restored.month, FacetChoice::All);
        assert_eq!(storage.inner.get_item(MONTH_KEY).as_deref(), Some("2024-03"));
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(MonthKey("2025-08".into()).to_string(), "2025年8月");
        assert_eq!(FacetChoice::<MonthKey>::All.to_string(), "全て");
        assert_eq!(SizeOption::Known(DamageSize::Medium).to_string(), "中");
        assert_eq!(SizeOption::Unknown.to_string(), "サイズ不明");
    }
}
