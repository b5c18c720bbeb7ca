/// Shared data structures for the application state
///
/// These types represent the canonical damage record that flows from the
/// damage source through the merge engine to the views. Nothing downstream
/// of `source.rs` sees raw API field names.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder for administrative fields the API does not provide
pub const NO_DATA: &str = "データなし";
/// Placeholder for the temporary repair field
pub const NO_REPAIR: &str = "なし";
/// Damage type used when the source supplies none
pub const UNKNOWN_TYPE: &str = "不明";

/// Japanese label for a damage type code. Unmapped codes are shown as-is.
pub fn type_label(code: &str) -> &str {
    match code {
        "Longitudinal Crack" => "縦状亀裂",
        "Transverse Crack" => "横状亀裂",
        "Alligator Crack" => "網状亀裂",
        "Potholes" => "ポットホール",
        "" => UNKNOWN_TYPE,
        other => other,
    }
}

/// Ordinal damage size bucket
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DamageSize {
    Large,
    Medium,
    Small,
}

impl DamageSize {
    /// Fixed facet rank: large first
    pub fn rank(self) -> u8 {
        match self {
            DamageSize::Large => 1,
            DamageSize::Medium => 2,
            DamageSize::Small => 3,
        }
    }

    /// Bucket a detector confidence score.
    ///
    /// Only used when the source supplies no explicit size. Absent
    /// confidence counts as small.
    pub fn from_confidence(confidence: Option<f64>) -> Self {
        match confidence {
            Some(c) if c >= 0.8 => DamageSize::Large,
            Some(c) if c >= 0.5 => DamageSize::Medium,
            _ => DamageSize::Small,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DamageSize::Large => "large",
            DamageSize::Medium => "medium",
            DamageSize::Small => "small",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "large" => Some(DamageSize::Large),
            "medium" => Some(DamageSize::Medium),
            "small" => Some(DamageSize::Small),
            _ => None,
        }
    }
}

impl fmt::Display for DamageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DamageSize::Large => "大",
            DamageSize::Medium => "中",
            DamageSize::Small => "小",
        };
        f.write_str(label)
    }
}

/// Repair workflow state
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DamageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl DamageStatus {
    pub const ALL: [DamageStatus; 4] = [
        DamageStatus::Pending,
        DamageStatus::InProgress,
        DamageStatus::Completed,
        DamageStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DamageStatus::Pending => "pending",
            DamageStatus::InProgress => "in-progress",
            DamageStatus::Completed => "completed",
            DamageStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for DamageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DamageStatus::Pending => "未対応",
            DamageStatus::InProgress => "対応中",
            DamageStatus::Completed => "対応完了",
            DamageStatus::Cancelled => "対応不要",
        };
        f.write_str(label)
    }
}

/// A single road damage record after normalization
///
/// Serialized in camelCase; this is also the shape of the
/// `selectedDamage` snapshot handed between pages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DamageRecord {
    /// Stable identifier, primary key for overrides
    pub id: String,
    /// Damage category code (e.g. "Potholes")
    #[serde(rename = "type")]
    pub damage_type: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// "lat,lng" display string
    #[serde(default)]
    pub gps: String,
    /// None means "size unknown"
    #[serde(default)]
    pub size: Option<DamageSize>,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// "YYYY-MM-DD HH:MM"
    #[serde(default)]
    pub inspection_time: String,
    #[serde(default)]
    pub status: DamageStatus,
    #[serde(default)]
    pub response_date: String,
    #[serde(default)]
    pub response_details: String,
    #[serde(default)]
    pub response_notes: String,
    #[serde(default)]
    pub vehicle: String,
    #[serde(default)]
    pub patrol_team: String,
    #[serde(default)]
    pub weather: String,
    #[serde(default)]
    pub inspection_section: String,
    #[serde(default)]
    pub temporary_repair: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub voice_text: String,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub speed_kmh: Option<f64>,
    #[serde(default)]
    pub bbox: Option<serde_json::Value>,
}

impl DamageRecord {
    /// `YYYY-MM` bucket used by the month facet
    pub fn month_key(&self) -> String {
        self.inspection_time.chars().take(7).collect()
    }

    /// Both coordinates, when the record can be plotted
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }

    /// Notes shown in the status panel: user notes, else the voice memo
    pub fn notes_or_voice_text(&self) -> &str {
        if self.response_notes.is_empty() {
            &self.voice_text
        } else {
            &self.response_notes
        }
    }
}
