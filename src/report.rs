/// Inspection report sheet
///
/// Built from the record handed off by the search page. The sheet is shown
/// on the report page and can be exported as plain text.
use chrono::NaiveDate;
use std::path::PathBuf;

use crate::state::data::{type_label, DamageRecord};
use crate::state::view::size_label;

/// One labelled line of the report
#[derive(Debug, Clone, PartialEq)]
pub struct ReportField {
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSheet {
    pub fields: Vec<ReportField>,
    pub voice_text: String,
    pub image: Option<String>,
    pub report_date: NaiveDate,
    inspection_time: String,
}

impl ReportSheet {
    pub fn from_record(record: &DamageRecord, report_date: NaiveDate) -> Self {
        let field = |label, value: &str| ReportField {
            label,
            value: value.to_string(),
        };
        let gps = if record.coordinates().is_some() {
            record.gps.as_str()
        } else {
            "位置データなし"
        };

        Self {
            fields: vec![
                field("損傷種別", type_label(&record.damage_type)),
                field("大きさ", &size_label(record.size)),
                field("点検日時", &record.inspection_time),
                field("位置情報", gps),
                field("点検班", &record.patrol_team),
                field("車両", &record.vehicle),
                field("天候", &record.weather),
                field("対応状況", &record.status.to_string()),
                field("対応日", &record.response_date),
            ],
            voice_text: record.voice_text.clone(),
            image: record.image.clone(),
            report_date,
            inspection_time: record.inspection_time.clone(),
        }
    }

    /// `road_damage_report_<time>.txt`, with ':' and whitespace replaced
    pub fn file_name(&self) -> String {
        let safe: String = self
            .inspection_time
            .chars()
            .map(|c| if c == ':' || c.is_whitespace() { '_' } else { c })
            .collect();
        format!("road_damage_report_{safe}.txt")
    }

    pub fn to_text(&self) -> String {
        let mut out = String::from("道路損傷報告書\n");
        out.push_str(&format!("作成日: {}\n\n", self.report_date.format("%Y/%m/%d")));
        for field in &self.fields {
            out.push_str(&format!("{}: {}\n", field.label, field.value));
        }
        out.push_str(&format!("\n音声メモ:\n{}\n", self.voice_text));
        if let Some(image) = &self.image {
            out.push_str(&format!("\n画像: {image}\n"));
        }
        out
    }
}

/// Write the text report to `path`
pub async fn export(sheet: ReportSheet, path: PathBuf) -> Result<PathBuf, String> {
    tokio::fs::write(&path, sheet.to_text())
        .await
        .map_err(|err| format!("failed to write {}: {err}", path.display()))?;
    Ok(path)
}
