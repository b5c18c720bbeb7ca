/// Widget builders for the filter bar, result list, detail panel and report
use iced::widget::image::Handle;
use iced::widget::text::IntoFragment;
use iced::widget::{
    button, column, container, pick_list, row, scrollable, text, text_input, Column, Image,
};
use iced::{Element, Length};
use std::fmt;

use crate::media::ImageVariant;
use crate::report::ReportSheet;
use crate::state::data::{type_label, DamageRecord, DamageStatus};
use crate::state::facets::{FacetChoice, FacetOptions, FilterState};
use crate::state::view::{size_label, StatusEdit, ViewModel};
use crate::Message;

/// Type facet choice shown with its display label
#[derive(Debug, Clone, PartialEq)]
struct TypeChoice(FacetChoice<String>);

impl fmt::Display for TypeChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            FacetChoice::All => fmt::Display::fmt(&self.0, f),
            FacetChoice::Only(code) => f.write_str(type_label(code)),
        }
    }
}

/// Photo for the detail or report panel, keyed by the location it was
/// requested from so late results for an old selection are dropped.
#[derive(Debug, Clone, Default)]
pub enum ImageSlot {
    #[default]
    Empty,
    Loading(String),
    Ready { location: String, handle: Handle },
    Failed(String),
}

impl ImageSlot {
    pub fn location(&self) -> Option<&str> {
        match self {
            ImageSlot::Empty => None,
            ImageSlot::Loading(location)
            | ImageSlot::Ready { location, .. }
            | ImageSlot::Failed(location) => Some(location),
        }
    }

    /// Settle a pending load. Returns false for stale results.
    pub fn resolve(&mut self, location: &str, bytes: Option<Vec<u8>>) -> bool {
        if !matches!(self, ImageSlot::Loading(pending) if pending == location) {
            return false;
        }
        *self = match bytes {
            Some(bytes) => ImageSlot::Ready {
                location: location.to_string(),
                handle: Handle::from_bytes(bytes),
            },
            None => ImageSlot::Failed(location.to_string()),
        };
        true
    }
}

pub fn filter_bar<'a>(facets: &FacetOptions, filters: &FilterState) -> Element<'a, Message> {
    let types: Vec<TypeChoice> = facets.type_choices().into_iter().map(TypeChoice).collect();

    row![
        column![
            text("点検月").size(12),
            pick_list(
                facets.month_choices(),
                Some(filters.month.clone()),
                Message::MonthFilterChanged
            ),
        ]
        .spacing(4),
        column![
            text("大きさ").size(12),
            pick_list(
                facets.size_choices(),
                Some(filters.size.clone()),
                Message::SizeFilterChanged
            ),
        ]
        .spacing(4),
        column![
            text("損傷種別").size(12),
            pick_list(
                types,
                Some(TypeChoice(filters.damage_type.clone())),
                |choice: TypeChoice| Message::TypeFilterChanged(choice.0)
            ),
        ]
        .spacing(4),
        column![
            text("対応状況").size(12),
            pick_list(
                facets.status_choices(),
                Some(filters.status.clone()),
                Message::StatusFilterChanged
            ),
        ]
        .spacing(4),
        button("リセット").on_press(Message::ResetFilters).padding(8),
    ]
    .spacing(12)
    .align_y(iced::Alignment::End)
    .into()
}

/// `type / size / time / status` rows with the visible count
pub fn result_list(model: &ViewModel) -> Element<'_, Message> {
    let rows = model.rows.iter().fold(Column::new().spacing(4), |col, row| {
        let style = if row.selected {
            button::primary
        } else {
            button::secondary
        };
        col.push(
            button(text(&row.label).size(14))
                .on_press(Message::SelectDamage(row.id.clone()))
                .style(style)
                .width(Length::Fill),
        )
    });

    column![
        text(format!("検索結果 ({}件)", model.count)).size(16),
        scrollable(rows).height(Length::Fill),
    ]
    .spacing(8)
    .into()
}

fn detail_line<'a>(label: &'a str, value: impl IntoFragment<'a>) -> Element<'a, Message> {
    row![
        text(label).size(13).width(Length::Fixed(90.0)),
        text(value).size(13),
    ]
    .spacing(8)
    .into()
}

fn image_panel(slot: &ImageSlot, variant: ImageVariant) -> Element<'_, Message> {
    let picture: Element<'_, Message> = match slot {
        ImageSlot::Empty => text("画像なし").into(),
        ImageSlot::Loading(_) => text("画像を読み込み中...").into(),
        ImageSlot::Ready { handle, .. } => Image::new(handle.clone()).width(Length::Fill).into(),
        ImageSlot::Failed(_) => text("画像を読み込めませんでした").into(),
    };

    column![
        picture,
        button(text(variant.toggle_label()).size(13))
            .on_press_maybe((!matches!(slot, ImageSlot::Empty)).then_some(Message::ToggleImageVariant))
            .style(button::secondary),
    ]
    .spacing(6)
    .into()
}

/// Selected record details, photo, and the status editor
pub fn detail_panel<'a>(
    record: &'a DamageRecord,
    draft: &'a StatusEdit,
    slot: &'a ImageSlot,
    variant: ImageVariant,
) -> Element<'a, Message> {
    let statuses = DamageStatus::ALL.iter().fold(row![].spacing(4), |r, status| {
        let style = if *status == draft.status {
            button::primary
        } else {
            button::secondary
        };
        r.push(
            button(text(status.to_string()).size(13))
                .on_press(Message::StatusPicked(*status))
                .style(style),
        )
    });

    // only completed work carries a response date
    let mut response_date = text_input("YYYY-MM-DD", &draft.response_date);
    if draft.status == DamageStatus::Completed {
        response_date = response_date.on_input(Message::ResponseDateChanged);
    }

    let content = column![
        row![
            text(type_label(&record.damage_type)).size(20).width(Length::Fill),
            button("閉じる").on_press(Message::ClosePanel).style(button::text),
        ],
        detail_line("大きさ", size_label(record.size)),
        detail_line("点検日時", &record.inspection_time),
        detail_line("位置情報", &record.gps),
        detail_line("点検区間", &record.inspection_section),
        detail_line("応急処置", &record.temporary_repair),
        detail_line("点検班", &record.patrol_team),
        detail_line("車両", &record.vehicle),
        detail_line("天候", &record.weather),
        image_panel(slot, variant),
        text("対応状況").size(14),
        statuses,
        text("対応日").size(13),
        response_date,
        text("対応内容").size(13),
        text_input("対応内容", &draft.response_details).on_input(Message::ResponseDetailsChanged),
        text("メモ").size(13),
        text_input("メモ", &draft.response_notes).on_input(Message::ResponseNotesChanged),
        row![
            button("保存").on_press(Message::SaveStatus).style(button::primary),
            button("メモを保存").on_press(Message::SaveNotes).style(button::secondary),
        ]
        .spacing(8),
        row![
            button("地図で表示").on_press(Message::ShowOnMap).style(button::secondary),
            button("報告書").on_press(Message::OpenReport).style(button::secondary),
            button("削除").on_press(Message::DeleteRequested).style(button::danger),
        ]
        .spacing(8),
    ]
    .spacing(8);

    container(scrollable(content.padding(12)))
        .width(Length::Fixed(380.0))
        .height(Length::Fill)
        .into()
}

/// Printable report sheet with its export action
pub fn report_page<'a>(sheet: &'a ReportSheet, slot: &'a ImageSlot) -> Element<'a, Message> {
    let fields = sheet.fields.iter().fold(Column::new().spacing(6), |col, field| {
        col.push(detail_line(field.label, &field.value))
    });

    let picture: Element<'a, Message> = match slot {
        ImageSlot::Ready { handle, .. } => Image::new(handle.clone()).width(Length::Fill).into(),
        ImageSlot::Failed(_) => text("画像を読み込めませんでした").into(),
        ImageSlot::Loading(_) => text("画像を読み込み中...").into(),
        ImageSlot::Empty => text("画像なし").into(),
    };

    let content = column![
        text("道路損傷報告書").size(28),
        text(format!("作成日: {}", sheet.report_date.format("%Y/%m/%d"))).size(14),
        fields,
        text("音声メモ").size(16),
        text(&sheet.voice_text).size(14),
        picture,
        row![
            button("テキストで保存").on_press(Message::ExportReport).style(button::primary),
            button("検索に戻る")
                .on_press(Message::PageSelected(crate::Page::Search))
                .style(button::secondary),
        ]
        .spacing(8),
    ]
    .spacing(12)
    .padding(24)
    .max_width(720);

    container(scrollable(content))
        .width(Length::Fill)
        .center_x(Length::Fill)
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_choice_uses_display_label() {
        assert_eq!(TypeChoice(FacetChoice::All).to_string(), "全て");
        assert_eq!(
            TypeChoice(FacetChoice::Only("Potholes".into())).to_string(),
            "ポットホール"
        );
    }

    #[test]
    fn test_image_slot_drops_stale_results() {
        let mut slot = ImageSlot::Loading("b.jpg".into());
        assert!(!slot.resolve("a.jpg", Some(vec![1, 2, 3])));
        assert_eq!(slot.location(), Some("b.jpg"));

        assert!(slot.resolve("b.jpg", None));
        assert!(matches!(slot, ImageSlot::Failed(ref l) if l == "b.jpg"));
        // already settled
        assert!(!slot.resolve("b.jpg", Some(vec![1])));
    }
}
