use chrono::Local;
use iced::widget::{button, canvas, column, container, row, text};
use iced::{Element, Length, Task, Theme};
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod media;
mod report;
mod state;
mod ui;

use config::ViewerConfig;
use error::HandoffError;
use media::ImageVariant;
use report::ReportSheet;
use state::data::{DamageRecord, DamageStatus};
use state::facets::{FacetChoice, FilterState, MonthKey, SizeOption};
use state::handoff;
use state::source::{DamageSource, HttpDamageApi};
use state::storage::{LocalStorage, MemoryStorage, SqliteStorage};
use state::view::{StatusEdit, ViewModel, ViewSync};
use ui::map::{DamageMap, MapViewport};
use ui::panels::{self, ImageSlot};

/// Top-level pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Map,
    Search,
    Report,
}

/// Main application state
struct DamageViewer {
    config: ViewerConfig,
    /// Records, filters, selection and the local store behind them
    view: ViewSync<Box<dyn LocalStorage>>,
    /// Markers and rows derived from `view`, rebuilt after every change
    model: ViewModel,
    page: Page,
    viewport: MapViewport,
    /// Unsaved status panel edits for the selected record
    draft: Option<StatusEdit>,
    image: ImageSlot,
    image_variant: ImageVariant,
    sidebar_collapsed: bool,
    report: Option<ReportSheet>,
    /// Status line shown at the bottom of the window
    status: String,
}

/// Application messages (events)
#[derive(Debug, Clone)]
pub enum Message {
    DamagesLoaded(Vec<DamageRecord>),
    PageSelected(Page),

    MonthFilterChanged(FacetChoice<MonthKey>),
    SizeFilterChanged(FacetChoice<SizeOption>),
    TypeFilterChanged(FacetChoice<String>),
    StatusFilterChanged(FacetChoice<DamageStatus>),
    ResetFilters,

    SelectDamage(String),
    ClosePanel,
    StatusPicked(DamageStatus),
    ResponseDateChanged(String),
    ResponseDetailsChanged(String),
    ResponseNotesChanged(String),
    SaveStatus,
    SaveNotes,
    DeleteRequested,
    ShowOnMap,
    OpenReport,

    ToggleSidebar,
    MapPanned(cgmath::Vector2<f32>),
    MapZoomed(f32),

    ImageLoaded(String, Option<Vec<u8>>),
    ToggleImageVariant,

    ExportReport,
    ReportExported(Result<PathBuf, String>),
}

impl DamageViewer {
    fn new() -> (Self, Task<Message>) {
        let config = ViewerConfig::from_env();

        // without a writable store the viewer still works, it just forgets
        let storage: Box<dyn LocalStorage> =
            match config.storage_path().and_then(|path| SqliteStorage::open(&path)) {
                Ok(storage) => Box::new(storage),
                Err(err) => {
                    warn!(error = %err, "local storage unavailable, settings will not persist");
                    Box::new(MemoryStorage::new())
                }
            };
        let sidebar_collapsed = handoff::sidebar_collapsed(&storage);

        let source = match HttpDamageApi::new(&config) {
            Ok(api) => DamageSource::new(api, config.api_base.clone()),
            Err(err) => {
                error!(error = %err, "failed to build HTTP client");
                DamageSource::offline(config.api_base.clone())
            }
        };
        info!(url = %config.damages_url(), "loading damage data");

        let viewer = DamageViewer {
            viewport: MapViewport::new(config.map_center, config.map_zoom),
            config,
            view: ViewSync::new(storage),
            model: ViewModel::default(),
            page: Page::Map,
            draft: None,
            image: ImageSlot::Empty,
            image_variant: ImageVariant::default(),
            sidebar_collapsed,
            report: None,
            status: "損傷データを読み込み中...".to_string(),
        };

        (viewer, Task::perform(source.load(), Message::DamagesLoaded))
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::DamagesLoaded(records) => {
                self.view.load(records);
                self.status = format!("{}件の損傷データを読み込みました", self.view.merged().len());
                self.sync_model();
                self.on_selection_changed()
            }

            Message::PageSelected(page) => self.navigate(page),

            Message::MonthFilterChanged(month) => self.change_filters(|f| f.month = month),
            Message::SizeFilterChanged(size) => self.change_filters(|f| f.size = size),
            Message::TypeFilterChanged(damage_type) => {
                self.change_filters(|f| f.damage_type = damage_type)
            }
            Message::StatusFilterChanged(status) => self.change_filters(|f| f.status = status),
            Message::ResetFilters => {
                if let Err(err) = self.view.reset_filters() {
                    self.report_storage_error("フィルタの保存に失敗しました", &err);
                }
                self.viewport = MapViewport::new(self.config.map_center, self.config.map_zoom);
                self.sync_model();
                self.on_selection_changed()
            }

            Message::SelectDamage(id) => {
                if self.view.select(&id).is_none() {
                    warn!(id = %id, "selected damage no longer exists");
                    return Task::none();
                }
                self.sync_model();
                self.on_selection_changed()
            }
            Message::ClosePanel => {
                self.view.close();
                self.sync_model();
                self.on_selection_changed()
            }

            Message::StatusPicked(status) => {
                if let Some(draft) = self.draft.as_mut() {
                    draft.status = status;
                }
                Task::none()
            }
            Message::ResponseDateChanged(value) => {
                if let Some(draft) = self.draft.as_mut() {
                    draft.response_date = value;
                }
                Task::none()
            }
            Message::ResponseDetailsChanged(value) => {
                if let Some(draft) = self.draft.as_mut() {
                    draft.response_details = value;
                }
                Task::none()
            }
            Message::ResponseNotesChanged(value) => {
                if let Some(draft) = self.draft.as_mut() {
                    draft.response_notes = value;
                }
                Task::none()
            }

            Message::SaveStatus => {
                let Some(draft) = self.draft.clone() else {
                    return Task::none();
                };
                match self.view.save_status(draft, Local::now().date_naive()) {
                    Ok(()) => self.status = "対応状況を保存しました".to_string(),
                    Err(err) => self.report_storage_error("対応状況の保存に失敗しました", &err),
                }
                self.draft = self.view.selected().map(StatusEdit::from_record);
                self.sync_model();
                Task::none()
            }
            Message::SaveNotes => {
                let Some(notes) = self.draft.as_ref().map(|d| d.response_notes.clone()) else {
                    return Task::none();
                };
                match self.view.save_notes(&notes) {
                    Ok(()) => {
                        self.status = "メモを保存しました".to_string();
                        MessageDialog::new()
                            .set_level(MessageLevel::Info)
                            .set_title("メモ")
                            .set_description("メモを保存しました")
                            .set_buttons(MessageButtons::Ok)
                            .show();
                    }
                    Err(err) => self.report_storage_error("メモの保存に失敗しました", &err),
                }
                self.sync_model();
                Task::none()
            }
            Message::DeleteRequested => {
                if self.view.selected().is_none() {
                    return Task::none();
                }
                let answer = MessageDialog::new()
                    .set_level(MessageLevel::Warning)
                    .set_title("削除の確認")
                    .set_description("この損傷データを削除しますか？")
                    .set_buttons(MessageButtons::YesNo)
                    .show();
                if answer != MessageDialogResult::Yes {
                    return Task::none();
                }
                match self.view.delete_current() {
                    Ok(()) => self.status = "損傷データを削除しました".to_string(),
                    Err(err) => self.report_storage_error("削除に失敗しました", &err),
                }
                self.sync_model();
                self.on_selection_changed()
            }
            Message::ShowOnMap => {
                if let Some((lat, lng)) = self.view.selected().and_then(|r| r.coordinates()) {
                    self.viewport.focus(lat, lng);
                }
                self.navigate(Page::Map)
            }
            Message::OpenReport => self.navigate(Page::Report),

            Message::ToggleSidebar => {
                self.sidebar_collapsed = !self.sidebar_collapsed;
                if let Err(err) =
                    handoff::set_sidebar_collapsed(self.view.storage(), self.sidebar_collapsed)
                {
                    warn!(error = %err, "failed to persist sidebar state");
                }
                Task::none()
            }
            Message::MapPanned(delta) => {
                self.viewport.pan_by(delta);
                Task::none()
            }
            Message::MapZoomed(delta) => {
                self.viewport.zoom_by(delta);
                Task::none()
            }

            Message::ImageLoaded(location, bytes) => {
                self.image.resolve(&location, bytes);
                Task::none()
            }
            Message::ToggleImageVariant => {
                self.image_variant = self.image_variant.toggled();
                let image = self.view.selected().and_then(|r| r.image.clone());
                self.load_image(image)
            }

            Message::ExportReport => {
                let Some(sheet) = self.report.clone() else {
                    return Task::none();
                };
                let target = FileDialog::new()
                    .set_title("報告書を保存")
                    .set_file_name(sheet.file_name())
                    .add_filter("テキスト", &["txt"])
                    .save_file();
                match target {
                    Some(path) => Task::perform(report::export(sheet, path), Message::ReportExported),
                    None => Task::none(),
                }
            }
            Message::ReportExported(result) => {
                match result {
                    Ok(path) => {
                        info!(path = %path.display(), "report exported");
                        self.status = format!("報告書を保存しました: {}", path.display());
                    }
                    Err(err) => {
                        error!(error = %err, "report export failed");
                        self.status = "報告書の保存に失敗しました".to_string();
                    }
                }
                Task::none()
            }
        }
    }

    fn sync_model(&mut self) {
        self.model = self.view.view_model();
    }

    fn change_filters(&mut self, edit: impl FnOnce(&mut FilterState)) -> Task<Message> {
        let mut filters = self.view.filters().clone();
        edit(&mut filters);
        if let Err(err) = self.view.set_filters(filters) {
            self.report_storage_error("フィルタの保存に失敗しました", &err);
        }
        self.sync_model();
        Task::none()
    }

    /// Reset the editor and photo for whatever is selected now
    fn on_selection_changed(&mut self) -> Task<Message> {
        let selected = self.view.selected().cloned();
        self.draft = selected.as_ref().map(StatusEdit::from_record);
        self.image_variant = ImageVariant::default();
        if let Some((lat, lng)) = selected.as_ref().and_then(|r| r.coordinates()) {
            self.viewport.focus(lat, lng);
        }
        self.load_image(selected.and_then(|r| r.image))
    }

    fn load_image(&mut self, image: Option<String>) -> Task<Message> {
        let Some(image) = image else {
            self.image = ImageSlot::Empty;
            return Task::none();
        };
        let location = media::variant_url(&image, self.image_variant);
        if self.image.location() == Some(location.as_str())
            && !matches!(self.image, ImageSlot::Failed(_))
        {
            return Task::none();
        }
        self.image = ImageSlot::Loading(location.clone());
        Task::perform(media::load_image_or_placeholder(location.clone()), move |bytes| {
            Message::ImageLoaded(location.clone(), bytes)
        })
    }

    /// Switch pages, handing the selection over through local storage
    fn navigate(&mut self, page: Page) -> Task<Message> {
        if let Err(err) = self.view.hand_off_selected() {
            warn!(error = %err, "failed to store selected damage");
        }

        if page != Page::Report {
            self.page = page;
            self.report = None;
            self.image_variant = ImageVariant::default();
            let image = self.view.selected().and_then(|r| r.image.clone());
            return self.load_image(image);
        }

        match handoff::load_selected(self.view.storage()) {
            Ok(record) => {
                let sheet = ReportSheet::from_record(&record, Local::now().date_naive());
                let image = sheet.image.clone();
                self.report = Some(sheet);
                self.page = Page::Report;
                self.image_variant = ImageVariant::Annotated;
                self.load_image(image)
            }
            Err(HandoffError::MissingSelection) => {
                MessageDialog::new()
                    .set_level(MessageLevel::Warning)
                    .set_title("報告書")
                    .set_description("損傷データが選択されていません。検索ページから選択してください。")
                    .set_buttons(MessageButtons::Ok)
                    .show();
                self.page = Page::Search;
                self.report = None;
                Task::none()
            }
        }
    }

    fn report_storage_error(&mut self, context: &str, err: &error::StorageError) {
        error!(error = %err, "{context}");
        self.status = format!("{context}: {err}");
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let nav = row![
            self.nav_button("地図", Page::Map),
            self.nav_button("検索", Page::Search),
            self.nav_button("報告書", Page::Report),
        ]
        .spacing(8);

        let body: Element<Message> = match self.page {
            Page::Map => self.map_page(),
            Page::Search => self.search_page(),
            Page::Report => match &self.report {
                Some(sheet) => panels::report_page(sheet, &self.image),
                None => text("報告書を表示できません").into(),
            },
        };

        column![
            nav,
            container(body).width(Length::Fill).height(Length::Fill),
            text(&self.status).size(13),
        ]
        .spacing(12)
        .padding(16)
        .into()
    }

    fn nav_button(&self, label: &'static str, page: Page) -> Element<'_, Message> {
        let style = if self.page == page {
            button::primary
        } else {
            button::secondary
        };
        button(label)
            .on_press(Message::PageSelected(page))
            .style(style)
            .padding(8)
            .into()
    }

    fn detail(&self) -> Option<Element<'_, Message>> {
        let record = self.view.selected()?;
        let draft = self.draft.as_ref()?;
        Some(panels::detail_panel(record, draft, &self.image, self.image_variant))
    }

    fn map_page(&self) -> Element<'_, Message> {
        let map = canvas(DamageMap {
            markers: &self.model.markers,
            viewport: self.viewport,
        })
        .width(Length::Fill)
        .height(Length::Fill);

        let toggle = button(if self.sidebar_collapsed {
            "一覧を表示"
        } else {
            "一覧を隠す"
        })
        .on_press(Message::ToggleSidebar)
        .style(button::secondary);

        let mut content = row![].spacing(12);
        if !self.sidebar_collapsed {
            content = content.push(
                container(panels::result_list(&self.model))
                    .width(Length::Fixed(320.0))
                    .height(Length::Fill),
            );
        }
        content = content.push(map);
        if let Some(detail) = self.detail() {
            content = content.push(detail);
        }

        column![
            row![panels::filter_bar(self.view.facets(), self.view.filters()), toggle]
                .spacing(12)
                .align_y(iced::Alignment::End),
            content,
        ]
        .spacing(12)
        .into()
    }

    fn search_page(&self) -> Element<'_, Message> {
        if !self.view.is_loaded() {
            return text("読み込み中...").into();
        }

        let results: Element<Message> = if self.view.visible().is_empty() {
            text("条件に一致する損傷データはありません").into()
        } else {
            panels::result_list(&self.model)
        };
        let mut content = row![container(results).width(Length::Fill)].spacing(12);
        if let Some(detail) = self.detail() {
            content = content.push(detail);
        }

        column![
            panels::filter_bar(self.view.facets(), self.view.filters()),
            content,
        ]
        .spacing(12)
        .into()
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn main() -> iced::Result {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    iced::application(
        "道路損傷ビューア",
        DamageViewer::update,
        DamageViewer::view,
    )
    .theme(DamageViewer::theme)
    .centered()
    .run_with(DamageViewer::new)
}
