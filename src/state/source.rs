/// Damage source: remote fetch, normalization and fallback data
///
/// `DamageSource::load` is the single boundary between the API's raw record
/// shape and the canonical `DamageRecord`. It never fails: any fetch error is
/// logged and replaced by the built-in fallback set.
use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use std::future::Future;
use tracing::{error, info, warn};

use super::data::{DamageRecord, DamageSize, DamageStatus, NO_DATA, NO_REPAIR, UNKNOWN_TYPE};
use crate::config::ViewerConfig;
use crate::error::SourceError;

/// Body of `GET /damages`
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ApiResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Vec<RawDamage>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Damage record exactly as the API serves it
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawDamage {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub captured_at: Option<String>,
    #[serde(default)]
    pub damage_type: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub location: RawLocation,
    #[serde(default)]
    pub speed_kmh: Option<f64>,
    #[serde(default)]
    pub voice_memo: Option<String>,
    #[serde(default)]
    pub bbox: Option<serde_json::Value>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub images: Option<RawImages>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawLocation {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawImages {
    #[serde(default)]
    pub original: Option<String>,
    #[serde(default)]
    pub annotated: Option<String>,
}

/// Ids arrive as strings or numbers depending on the table
fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "unsupported id value: {other}"
        ))),
    }
}

/// Format an API timestamp as local `YYYY-MM-DD HH:MM`.
///
/// Timestamps without an offset are taken as local already. Unparsable
/// input is passed through unchanged.
pub fn format_inspection_time(captured_at: Option<&str>) -> String {
    let Some(raw) = captured_at.map(str::trim).filter(|s| !s.is_empty()) else {
        return String::new();
    };

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return with_offset
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string();
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return naive.format("%Y-%m-%d %H:%M").to_string();
        }
    }

    raw.to_string()
}

/// Convert one raw API entry into the canonical record
pub fn normalize(raw: RawDamage, api_base: &str) -> DamageRecord {
    let lat = raw.location.latitude;
    let lng = raw.location.longitude;
    let gps = match (lat, lng) {
        (Some(lat), Some(lng)) => format!("{lat},{lng}"),
        _ => String::new(),
    };
    let size = match raw.size.as_deref() {
        Some(explicit) => DamageSize::parse(explicit),
        None => Some(DamageSize::from_confidence(raw.confidence)),
    };
    let image = raw
        .images
        .and_then(|images| images.annotated)
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| format!("{api_base}/images/{}/annotated", raw.id));
    let damage_type = raw
        .damage_type
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_TYPE.to_string());

    DamageRecord {
        inspection_time: format_inspection_time(raw.captured_at.as_deref()),
        id: raw.id,
        damage_type,
        lat,
        lng,
        gps,
        size,
        confidence: raw.confidence,
        status: DamageStatus::Pending,
        response_date: String::new(),
        response_details: String::new(),
        response_notes: String::new(),
        vehicle: NO_DATA.to_string(),
        patrol_team: NO_DATA.to_string(),
        weather: NO_DATA.to_string(),
        inspection_section: NO_DATA.to_string(),
        temporary_repair: NO_REPAIR.to_string(),
        image: Some(image),
        voice: None,
        voice_text: raw.voice_memo.unwrap_or_default(),
        altitude: raw.location.altitude,
        speed_kmh: raw.speed_kmh,
        bbox: raw.bbox,
    }
}

/// Remote end of the damage source
pub trait DamageApi {
    fn fetch_damages(&self) -> impl Future<Output = Result<ApiResponse, SourceError>> + Send;
}

/// `reqwest` client for the damage API
#[derive(Debug, Clone)]
pub struct HttpDamageApi {
    client: reqwest::Client,
    url: String,
}

impl HttpDamageApi {
    pub fn new(config: &ViewerConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self {
            client,
            url: config.damages_url(),
        })
    }
}

impl DamageApi for HttpDamageApi {
    async fn fetch_damages(&self) -> Result<ApiResponse, SourceError> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Status(response.status().as_u16()));
        }
        Ok(response.json::<ApiResponse>().await?)
    }
}

/// Supplies the base record set for one page load
#[derive(Debug, Clone)]
pub struct DamageSource<A> {
    api: Option<A>,
    api_base: String,
}

impl<A: DamageApi> DamageSource<A> {
    pub fn new(api: A, api_base: impl Into<String>) -> Self {
        Self {
            api: Some(api),
            api_base: api_base.into(),
        }
    }

    /// Source with no remote end; always yields the fallback set
    pub fn offline(api_base: impl Into<String>) -> Self {
        Self {
            api: None,
            api_base: api_base.into(),
        }
    }

    /// Fetch and normalize, or fall back. Never fails.
    pub async fn load(self) -> Vec<DamageRecord> {
        let Some(api) = self.api.as_ref() else {
            warn!("no damage API configured, using fallback data");
            return fallback_damages();
        };

        match api.fetch_damages().await {
            Ok(body) if body.success => {
                let records: Vec<DamageRecord> = body
                    .data
                    .into_iter()
                    .map(|raw| normalize(raw, &self.api_base))
                    .collect();
                info!(count = records.len(), "loaded damages from API");
                records
            }
            Ok(body) => {
                let err = SourceError::Rejected(body.error.unwrap_or_default());
                error!(error = %err, "failed to load damages from API, using fallback data");
                fallback_damages()
            }
            Err(err) => {
                error!(error = %err, "failed to load damages from API, using fallback data");
                fallback_damages()
            }
        }
    }
}

/// Built-in sample records used when the API is unavailable
pub fn fallback_damages() -> Vec<DamageRecord> {
    struct Sample {
        id: &'static str,
        damage_type: &'static str,
        vehicle: &'static str,
        lat: f64,
        lng: f64,
        voice: &'static str,
        voice_text: &'static str,
        image: &'static str,
        inspection_time: &'static str,
        patrol_team: &'static str,
        weather: &'static str,
        inspection_section: &'static str,
        temporary_repair: &'static str,
    }

    let samples = [
        Sample {
            id: "fallback-1",
            damage_type: "縦状亀裂",
            vehicle: "A号車",
            lat: 35.5720,
            lng: 139.3680,
            voice: "https://www2.cs.uic.edu/~i101/SoundFiles/StarWars60.wav",
            voice_text: "今すぐ補修が必要。通学路で通行量が多い。",
            image: "assets/images/hibiware1.jpg",
            inspection_time: "2025-08-05 09:30",
            patrol_team: "田中・佐藤",
            weather: "晴れ",
            inspection_section: "○○区間",
            temporary_repair: "応急パッチ済",
        },
        Sample {
            id: "fallback-2",
            damage_type: "ポットホール",
            vehicle: "B号車",
            lat: 35.5970,
            lng: 139.3470,
            voice: "",
            voice_text: "穴が深く危険。",
            image: "assets/images/pottoho-ru1.jpg",
            inspection_time: "2025-08-12 14:00",
            patrol_team: "鈴木・高橋",
            weather: "雨",
            inspection_section: "△△区間",
            temporary_repair: "注意喚起表示設置",
        },
        Sample {
            id: "fallback-3",
            damage_type: "横状亀裂",
            vehicle: "C号車",
            lat: 35.5610,
            lng: 139.3930,
            voice: "",
            voice_text: "通行には影響なし。",
            image: "assets/images/wadatibore1.jpg",
            inspection_time: "2025-09-03 10:15",
            patrol_team: "佐藤・小林",
            weather: "曇り",
            inspection_section: "□□区間",
            temporary_repair: "特になし",
        },
    ];

    samples
        .into_iter()
        .map(|s| DamageRecord {
            id: s.id.to_string(),
            damage_type: s.damage_type.to_string(),
            lat: Some(s.lat),
            lng: Some(s.lng),
            gps: format!("{:.4},{:.4}", s.lat, s.lng),
            size: None,
            confidence: None,
            inspection_time: s.inspection_time.to_string(),
            status: DamageStatus::Pending,
            response_date: String::new(),
            response_details: String::new(),
            response_notes: String::new(),
            vehicle: s.vehicle.to_string(),
            patrol_team: s.patrol_team.to_string(),
            weather: s.weather.to_string(),
            inspection_section: s.inspection_section.to_string(),
            temporary_repair: s.temporary_repair.to_string(),
            image: Some(s.image.to_string()),
            voice: Some(s.voice.to_string()).filter(|v| !v.is_empty()),
            voice_text: s.voice_text.to_string(),
            altitude: None,
            speed_kmh: None,
            bbox: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const API_BASE: &str = "http://localhost:3000/api";

    enum StubApi {
        Body(&'static str),
        Down,
    }

    impl DamageApi for StubApi {
        async fn fetch_damages(&self) -> Result<ApiResponse, SourceError> {
            match self {
                StubApi::Body(json) => serde_json::from_str(json)
                    .map_err(|e| SourceError::Rejected(e.to_string())),
                StubApi::Down => Err(SourceError::Status(503)),
            }
        }
    }

    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn raw(id: &str, confidence: Option<f64>, size: Option<&str>) -> RawDamage {
        RawDamage {
            id: id.to_string(),
            confidence,
            size: size.map(str::to_string),
            ..RawDamage::default()
        }
    }

    #[test]
    fn test_size_derived_only_when_absent() {
        let sizes: Vec<Option<DamageSize>> = [Some(0.9), Some(0.6), Some(0.3), None]
            .into_iter()
            .map(|c| normalize(raw("x", c, None), API_BASE).size)
            .collect();
        assert_eq!(
            sizes,
            vec![
                Some(DamageSize::Large),
                Some(DamageSize::Medium),
                Some(DamageSize::Small),
                Some(DamageSize::Small)
            ]
        );

        let explicit = normalize(raw("y", Some(0.95), Some("small")), API_BASE);
        assert_eq!(explicit.size, Some(DamageSize::Small));
    }

    #[test]
    fn test_normalize_fills_placeholders() {
        let record = normalize(raw("42", None, None), API_BASE);
        assert_eq!(record.damage_type, UNKNOWN_TYPE);
        assert_eq!(record.vehicle, NO_DATA);
        assert_eq!(record.temporary_repair, NO_REPAIR);
        assert_eq!(record.status, DamageStatus::Pending);
        assert_eq!(record.inspection_time, "");
        assert_eq!(record.coordinates(), None);
        assert_eq!(
            record.image.as_deref(),
            Some("http://localhost:3000/api/images/42/annotated")
        );
    }

    #[test]
    fn test_format_inspection_time() {
        assert_eq!(format_inspection_time(None), "");
        assert_eq!(
            format_inspection_time(Some("2025-08-05T09:30:12.5")),
            "2025-08-05 09:30"
        );
        assert_eq!(format_inspection_time(Some("yesterday")), "yesterday");
    }

    #[test]
    fn test_load_normalizes_success_body() {
        let api = StubApi::Body(
            r#"{"success":true,"data":[{"id":7,"captured_at":"2025-09-01T08:00:00",
                "damage_type":"Potholes","confidence":0.85,
                "location":{"latitude":35.0,"longitude":139.0,"altitude":12.0},
                "images":{"annotated":"https://cdn/images_annotated/7_annotated.jpg"}}]}"#,
        );
        let records = block_on(DamageSource::new(api, API_BASE).load());
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, "7");
        assert_eq!(record.size, Some(DamageSize::Large));
        assert_eq!(record.gps, "35,139");
        assert_eq!(record.inspection_time, "2025-09-01 08:00");
        assert_eq!(
            record.image.as_deref(),
            Some("https://cdn/images_annotated/7_annotated.jpg")
        );
    }

    #[test]
    fn test_load_falls_back_on_failure() {
        let down = block_on(DamageSource::new(StubApi::Down, API_BASE).load());
        assert_eq!(down, fallback_damages());

        let rejected = StubApi::Body(r#"{"success":false,"error":"Internal server error"}"#);
        let records = block_on(DamageSource::new(rejected, API_BASE).load());
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, "fallback-1");

        let offline = block_on(DamageSource::<StubApi>::offline(API_BASE).load());
        assert_eq!(offline.len(), 3);
    }

    #[test]
    fn test_success_with_empty_data_is_not_fallback() {
        let api = StubApi::Body(r#"{"success":true,"data":[]}"#);
        assert!(block_on(DamageSource::new(api, API_BASE).load()).is_empty());
    }
}
