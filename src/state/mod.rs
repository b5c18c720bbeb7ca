/// State management module
///
/// This module handles all application state, including:
/// - Local key/value persistence (storage.rs)
/// - The canonical damage record (data.rs)
/// - Loading and normalizing records from the API (source.rs)
/// - Locally persisted status overrides (overrides.rs)
/// - Merging base records with overrides (merge.rs)
/// - Filter facets and persisted filter selection (facets.rs)
/// - Selection handoff between pages and layout preferences (handoff.rs)
/// - The page-level view state shared by map and list (view.rs)

pub mod data;
pub mod facets;
pub mod handoff;
pub mod merge;
pub mod overrides;
pub mod source;
pub mod storage;
pub mod view;
