/// Page-level application state shared by the map and list views
///
/// `ViewSync` owns the base records, the facet options, the active filters
/// and the current selection. Every path that can observe an override write
/// goes through `refresh`, which re-reads the override table, re-merges and
/// re-filters. Facet options are only rebuilt by `load`.
use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use super::data::{type_label, DamageRecord, DamageSize, DamageStatus};
use super::facets::{FacetOptions, FilterState};
use super::handoff;
use super::merge::merge;
use super::overrides::{Override, OverrideStore};
use super::storage::LocalStorage;
use crate::error::StorageError;

/// Records passing every active filter, in dataset order
pub fn apply_filters(dataset: &[DamageRecord], filters: &FilterState) -> Vec<DamageRecord> {
    dataset
        .iter()
        .filter(|record| filters.matches(record))
        .cloned()
        .collect()
}

/// Edits made in the status panel
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEdit {
    pub status: DamageStatus,
    pub response_date: String,
    pub response_details: String,
    pub response_notes: String,
}

impl StatusEdit {
    /// Draft prefilled from the effective record
    pub fn from_record(record: &DamageRecord) -> Self {
        Self {
            status: record.status,
            response_date: record.response_date.clone(),
            response_details: record.response_details.clone(),
            response_notes: record.notes_or_voice_text().to_string(),
        }
    }

    /// Completed work needs a date (today when left blank); any other
    /// status clears it.
    pub fn into_override(self, today: NaiveDate) -> Override {
        let response_date = match self.status {
            DamageStatus::Completed if self.response_date.trim().is_empty() => {
                today.format("%Y-%m-%d").to_string()
            }
            DamageStatus::Completed => self.response_date,
            _ => String::new(),
        };
        Override {
            status: Some(self.status),
            response_date: Some(response_date),
            response_details: Some(self.response_details),
            response_notes: Some(self.response_notes),
            ..Override::default()
        }
    }
}

/// A plottable record
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub size: Option<DamageSize>,
    pub selected: bool,
}

/// One line of the result list
#[derive(Debug, Clone, PartialEq)]
pub struct ListRow {
    pub id: String,
    pub label: String,
    pub selected: bool,
}

/// Everything the map and list views render after a recomputation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewModel {
    pub markers: Vec<Marker>,
    pub rows: Vec<ListRow>,
    pub count: usize,
}

pub fn size_label(size: Option<DamageSize>) -> String {
    match size {
        Some(size) => size.to_string(),
        None => "サイズ不明".to_string(),
    }
}

pub struct ViewSync<S: LocalStorage> {
    storage: S,
    base: Vec<DamageRecord>,
    merged: Vec<DamageRecord>,
    visible: Vec<DamageRecord>,
    facets: FacetOptions,
    filters: FilterState,
    selected: Option<DamageRecord>,
    loaded: bool,
}

impl<S: LocalStorage> ViewSync<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            base: Vec::new(),
            merged: Vec::new(),
            visible: Vec::new(),
            facets: FacetOptions::default(),
            filters: FilterState::default(),
            selected: None,
            loaded: false,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Replace the base records: rebuild facets, restore the persisted
    /// filters and the handed-off selection.
    pub fn load(&mut self, records: Vec<DamageRecord>) {
        self.base = records;
        self.merged = merge(&self.base, &OverrideStore::new(&self.storage).get());
        self.facets = FacetOptions::build(&self.merged);
        self.filters = FilterState::restore(&self.storage, &self.facets);
        self.loaded = true;

        let located = self.merged.iter().filter(|r| r.coordinates().is_some()).count();
        info!(
            total = self.merged.len(),
            with_location = located,
            without_location = self.merged.len() - located,
            "damage data ready"
        );

        self.selected = handoff::load_selected(&self.storage)
            .ok()
            .and_then(|snapshot| self.merged.iter().find(|r| r.id == snapshot.id).cloned());
        self.refresh();
    }

    /// Re-merge with the current override table and re-filter
    pub fn refresh(&mut self) {
        self.merged = merge(&self.base, &OverrideStore::new(&self.storage).get());
        self.visible = apply_filters(&self.merged, &self.filters);

        // a hidden selection stays addressable; only refresh its contents
        if let Some(current) = self.selected.as_mut() {
            if let Some(latest) = self.merged.iter().find(|r| r.id == current.id) {
                *current = latest.clone();
            }
        }
        debug!(
            merged = self.merged.len(),
            visible = self.visible.len(),
            "view recomputed"
        );
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn facets(&self) -> &FacetOptions {
        &self.facets
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    /// Every non-deleted effective record
    pub fn merged(&self) -> &[DamageRecord] {
        &self.merged
    }

    pub fn visible(&self) -> &[DamageRecord] {
        &self.visible
    }

    pub fn selected(&self) -> Option<&DamageRecord> {
        self.selected.as_ref()
    }

    /// Apply a new filter selection. The selection is kept even if the
    /// new filters hide it.
    pub fn set_filters(&mut self, filters: FilterState) -> Result<(), StorageError> {
        self.filters = filters;
        self.refresh();
        self.filters.persist(&self.storage)
    }

    /// Back to "all" on every dimension, clearing the selection
    pub fn reset_filters(&mut self) -> Result<(), StorageError> {
        self.selected = None;
        self.set_filters(FilterState::default())
    }

    /// Focus the effective record with `id`
    pub fn select(&mut self, id: &str) -> Option<&DamageRecord> {
        let record = self.merged.iter().find(|r| r.id == id)?.clone();
        self.selected = Some(record);
        self.selected.as_ref()
    }

    pub fn close(&mut self) {
        self.selected = None;
    }

    /// Persist the status panel edits for the selected record
    pub fn save_status(&mut self, edit: StatusEdit, today: NaiveDate) -> Result<(), StorageError> {
        let Some(id) = self.selected_id() else {
            return Ok(());
        };
        let result = OverrideStore::new(&self.storage).set(&id, &edit.into_override(today));
        self.refresh();
        result
    }

    /// Persist only the notes of the selected record
    pub fn save_notes(&mut self, notes: &str) -> Result<(), StorageError> {
        let Some(id) = self.selected_id() else {
            return Ok(());
        };
        let patch = Override {
            response_notes: Some(notes.to_string()),
            ..Override::default()
        };
        let result = OverrideStore::new(&self.storage).set(&id, &patch);
        self.refresh();
        result
    }

    /// Tombstone the selected record and drop the selection
    pub fn delete_current(&mut self) -> Result<(), StorageError> {
        let Some(id) = self.selected_id() else {
            return Ok(());
        };
        let result = OverrideStore::new(&self.storage).set(&id, &Override::tombstone());
        match &result {
            Ok(()) => {
                info!(id = %id, "damage marked as deleted");
                self.drop_handoff_of(&id);
            }
            Err(err) => error!(id = %id, error = %err, "failed to mark damage as deleted"),
        }
        self.selected = None;
        self.refresh();
        result
    }

    /// A deleted record must not reach the report page through a stale snapshot
    fn drop_handoff_of(&self, id: &str) {
        let handed_off = handoff::load_selected(&self.storage).is_ok_and(|record| record.id == id);
        if handed_off {
            if let Err(err) = handoff::clear_selected(&self.storage) {
                warn!(id, error = %err, "failed to clear selected damage snapshot");
            }
        }
    }

    /// Write the selected effective record for the next page to pick up
    pub fn hand_off_selected(&self) -> Result<bool, StorageError> {
        match self.selected.as_ref() {
            Some(record) => handoff::store_selected(&self.storage, record).map(|()| true),
            None => Ok(false),
        }
    }

    /// Markers and list rows for the current visible set
    pub fn view_model(&self) -> ViewModel {
        let selected_id = self.selected.as_ref().map(|r| r.id.as_str());
        let is_selected = |record: &DamageRecord| Some(record.id.as_str()) == selected_id;

        let markers = self
            .visible
            .iter()
            .filter_map(|record| {
                let (lat, lng) = record.coordinates()?;
                Some(Marker {
                    id: record.id.clone(),
                    lat,
                    lng,
                    size: record.size,
                    selected: is_selected(record),
                })
            })
            .collect();

        let rows = self
            .visible
            .iter()
            .map(|record| ListRow {
                id: record.id.clone(),
                label: format!(
                    "{} / {} / {} / {}",
                    type_label(&record.damage_type),
                    size_label(record.size),
                    record.inspection_time,
                    record.status
                ),
                selected: is_selected(record),
            })
            .collect();

        ViewModel {
            markers,
            rows,
            count: self.visible.len(),
        }
    }

    fn selected_id(&self) -> Option<String> {
        self.selected.as_ref().map(|r| r.id.clone())
    }
}
