use iced::widget::{
    button, checkbox, column, container, row, scrollable, text, text_input, tooltip, Column, Space,
};
use iced::{Alignment, Background, Border, Color, Element, Length, Shadow, Subscription, Task, Theme, Vector};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::autostart::{AutostartEntry, AutostartRegistry, EntryDraft, EntrySource, RegistryError};
use crate::impact::{self, RankedEntry};
use crate::sampler::{ProcessSample, Sampler};
use crate::search::{self, ENTRY_FIELDS, SAMPLE_FIELDS};
use crate::settings::ConfigStore;
use crate::theme::{build_palette, Palette};
use crate::worker::{self, SampleSequencer, MAX_LIVE_WORKERS, SAMPLE_TIMEOUT};

/// Rows rendered in the process pane; the rest are still searchable.
const MAX_PROCESS_ROWS: usize = 400;

// ─── MESSAGE & ENUMS ───────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Message {
    Tick,
    Sampled(u64, Arc<[ProcessSample]>),
    Refresh,
    SearchChanged(String),
    Select(PathBuf),
    ToggleEntry(PathBuf, bool),
    NewEntry,
    EditSelected,
    DeleteSelected,
    FormChanged(FormField, String),
    SubmitForm,
    CancelForm,
    CycleTheme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Name,
    Command,
    Comment,
    Icon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FormMode {
    Create,
    Edit(PathBuf),
}

#[derive(Debug, Clone)]
struct EntryForm {
    mode: FormMode,
    draft: EntryDraft,
}

// ─── APP STATE ──────────────────────────────────────────────────

pub struct SimplyToast {
    config: ConfigStore,
    pal: Palette,
    registry: AutostartRegistry,
    sampler: Sampler,
    sequencer: SampleSequencer,
    workers: Arc<Semaphore>,
    /// Scan order, as returned by the registry.
    entries: Vec<AutostartEntry>,
    /// Latest accepted sample, highest usage first.
    samples: Arc<[ProcessSample]>,
    ranked: Vec<RankedEntry>,
    search: String,
    selected: Option<PathBuf>,
    form: Option<EntryForm>,
    status_message: Option<String>,
    last_update: Option<String>,
}

impl SimplyToast {
    pub fn new() -> (Self, Task<Message>) {
        let config = ConfigStore::open_default();
        let sampler = Sampler::new(config.settings().process_source.table());
        let registry = AutostartRegistry::from_environment();
        info!(
            "watching {} with the {:?} process table (settings in {})",
            registry.user_dir().display(),
            config.settings().process_source,
            config.path().display()
        );

        let mut app = Self {
            pal: build_palette(config.theme()),
            config,
            registry,
            sampler,
            sequencer: SampleSequencer::default(),
            workers: Arc::new(Semaphore::new(MAX_LIVE_WORKERS)),
            entries: Vec::new(),
            samples: Arc::from(Vec::new()),
            ranked: Vec::new(),
            search: String::new(),
            selected: None,
            form: None,
            status_message: None,
            last_update: None,
        };
        app.rescan();
        let first_sample = app.request_sample();
        (app, first_sample)
    }

    pub fn title(&self) -> String {
        String::from("SimplyToast")
    }

    pub fn theme(&self) -> Theme {
        self.config.theme().iced_theme()
    }

    pub fn subscription(&self) -> Subscription<Message> {
        iced::time::every(Duration::from_secs(self.config.settings().refresh_interval_secs))
            .map(|_| Message::Tick)
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Tick => return self.request_sample(),
            Message::Sampled(ticket, samples) => {
                if self.sequencer.accept(ticket) {
                    self.samples = samples;
                    self.recombine();
                    self.last_update = Some(chrono::Local::now().format("%H:%M:%S").to_string());
                }
            }
            Message::Refresh => {
                self.search.clear();
                self.status_message = None;
                self.rescan();
                return self.request_sample();
            }
            Message::SearchChanged(query) => self.search = query,
            Message::Select(path) => self.selected = Some(path),
            Message::ToggleEntry(path, enabled) => {
                if let Some(entry) = self.entry_at(&path).cloned() {
                    match self.registry.set_enabled(&entry, enabled) {
                        Ok(_) => self.status_message = None,
                        Err(e) => self.show_error(e),
                    }
                    self.rescan();
                }
            }
            Message::NewEntry => {
                self.form = Some(EntryForm {
                    mode: FormMode::Create,
                    draft: EntryDraft::default(),
                });
            }
            Message::EditSelected => match self.selected_entry() {
                Some(entry) if entry.is_editable() => {
                    self.form = Some(EntryForm {
                        mode: FormMode::Edit(entry.path.clone()),
                        draft: EntryDraft::from_entry(entry),
                    });
                }
                Some(entry) if entry.source == EntrySource::System => {
                    self.show_error(RegistryError::NotPermitted(entry.path.clone()));
                }
                Some(_) => {
                    self.status_message = Some("This entry has no command to edit".into());
                }
                None => {}
            },
            Message::DeleteSelected => {
                if let Some(entry) = self.selected_entry().cloned() {
                    match self.registry.delete(&entry) {
                        Ok(()) => {
                            self.selected = None;
                            self.status_message = Some(format!("Deleted {}", entry.name));
                        }
                        Err(e) => self.show_error(e),
                    }
                    self.rescan();
                }
            }
            Message::FormChanged(field, value) => {
                if let Some(form) = &mut self.form {
                    let slot = match field {
                        FormField::Name => &mut form.draft.name,
                        FormField::Command => &mut form.draft.command,
                        FormField::Comment => &mut form.draft.comment,
                        FormField::Icon => &mut form.draft.icon,
                    };
                    *slot = value;
                }
            }
            Message::SubmitForm => self.submit_form(),
            Message::CancelForm => self.form = None,
            Message::CycleTheme => {
                if let Err(e) = self.config.cycle_theme() {
                    warn!("{e}");
                    self.status_message = Some(e.to_string());
                }
                self.pal = build_palette(self.config.theme());
            }
        }
        Task::none()
    }

    /// Ticks and refreshes both land here; nothing starts while every
    /// worker slot is held by a snapshot that has not returned.
    fn request_sample(&mut self) -> Task<Message> {
        let Ok(permit) = self.workers.clone().try_acquire_owned() else {
            debug!("{MAX_LIVE_WORKERS} sampling workers still running, skipping");
            return Task::none();
        };
        let ticket = self.sequencer.issue();
        Task::perform(
            worker::sample_bounded(self.sampler.clone(), permit, SAMPLE_TIMEOUT),
            move |samples| Message::Sampled(ticket, samples),
        )
    }

    fn rescan(&mut self) {
        self.entries = self.registry.load_all();
        if let Some(path) = &self.selected {
            if !self.entries.iter().any(|e| &e.path == path) {
                self.selected = None;
            }
        }
        self.recombine();
    }

    fn recombine(&mut self) {
        self.ranked = impact::correlate(
            &self.entries,
            &self.samples,
            self.config.settings().collision_policy,
        );
    }

    fn entry_at(&self, path: &Path) -> Option<&AutostartEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    fn selected_entry(&self) -> Option<&AutostartEntry> {
        self.selected.as_deref().and_then(|p| self.entry_at(p))
    }

    fn submit_form(&mut self) {
        let Some(form) = self.form.clone() else { return };
        let result = match &form.mode {
            FormMode::Create => self.registry.create(&form.draft),
            FormMode::Edit(path) => match self.entry_at(path).cloned() {
                Some(entry) => self.registry.edit(&entry, &form.draft),
                None => {
                    self.form = None;
                    self.status_message = Some("The entry no longer exists".into());
                    self.rescan();
                    return;
                }
            },
        };
        match result {
            Ok(entry) => {
                self.status_message = Some(format!("Saved {}", entry.name));
                self.selected = Some(entry.path);
                self.form = None;
                self.rescan();
            }
            // Keep the form open so the input can be corrected.
            Err(e) => self.show_error(e),
        }
    }

    fn show_error(&mut self, e: RegistryError) {
        warn!("{e}");
        self.status_message = Some(if e.is_transient() {
            format!("{e} (will retry on refresh)")
        } else {
            e.to_string()
        });
    }

    // ─── MAIN VIEW ──────────────────────────────────────────────

    pub fn view(&self) -> Element<'_, Message> {
        let p = &self.pal;
        let selected = self.selected_entry();
        let can_edit = selected.is_some_and(|e| e.is_editable());
        let can_delete = selected.is_some_and(|e| e.source == EntrySource::User);

        let toolbar = row![
            text("SimplyToast").size(15).color(p.accent),
            Space::with_width(12),
            text_input("Search…", &self.search)
                .on_input(Message::SearchChanged)
                .width(240),
            Space::with_width(8),
            toolbar_button("New", Some(Message::NewEntry)),
            toolbar_button("Edit", can_edit.then_some(Message::EditSelected)),
            toolbar_button("Delete", can_delete.then_some(Message::DeleteSelected)),
            toolbar_button("Refresh", Some(Message::Refresh)),
            Space::with_width(Length::Fill),
            text(self.last_update.as_deref().map(|t| format!("updated {t}")).unwrap_or_default())
                .size(11)
                .color(p.label),
            Space::with_width(8),
            toolbar_button(format!("Theme: {}", self.config.theme().name()), Some(Message::CycleTheme)),
        ]
        .spacing(6)
        .align_y(Alignment::Center)
        .padding([6, 12]);

        let status: Element<Message> = match &self.status_message {
            Some(msg) => container(text(msg.clone()).size(11).color(p.yellow))
                .padding([2, 12])
                .into(),
            None => Space::new(0, 0).into(),
        };

        let mut body = Column::new().spacing(8).padding(8);
        if let Some(form) = &self.form {
            body = body.push(self.view_form(form));
        }
        body = body.push(
            row![self.view_startup(), self.view_processes()]
                .spacing(8)
                .height(Length::Fill),
        );

        let header_bg = p.header_bg;
        let bg = p.bg;
        container(column![
            container(column![toolbar, status])
                .width(Length::Fill)
                .style(move |_: &Theme| container::Style {
                    background: Some(Background::Color(header_bg)),
                    ..Default::default()
                }),
            body,
        ])
        .width(Length::Fill)
        .height(Length::Fill)
        .style(move |_: &Theme| container::Style {
            background: Some(Background::Color(bg)),
            ..Default::default()
        })
        .into()
    }

    // ─── STARTUP APPS ───────────────────────────────────────────

    fn view_startup(&self) -> Element<'_, Message> {
        let p = &self.pal;
        let visible = search::filter(&self.ranked, &self.search, ENTRY_FIELDS);

        let header = row![
            text("On").size(11).color(p.accent).width(40),
            text("App").size(11).color(p.accent).width(Length::Fill),
            text("Source").size(11).color(p.accent).width(60),
            text("Impact %").size(11).color(p.accent).width(70),
        ]
        .spacing(4)
        .padding([4, 10]);

        let rows: Vec<Element<Message>> = if self.ranked.is_empty() {
            vec![text("(empty)").size(11).color(p.label).into()]
        } else {
            visible
                .iter()
                .enumerate()
                .map(|(i, r)| self.startup_row(r, i))
                .collect()
        };

        panel(
            column![
                section_title(format!("Startup Apps ({})", visible.len()), p),
                header,
                scrollable(Column::with_children(rows)).height(Length::Fill),
            ]
            .into(),
            p,
        )
    }

    fn startup_row(&self, ranked: &RankedEntry, idx: usize) -> Element<'_, Message> {
        let p = &self.pal;
        let entry = &ranked.entry;
        let is_selected = self.selected.as_deref() == Some(entry.path.as_path());

        let toggle = checkbox("", entry.enabled);
        let toggle = if entry.source == EntrySource::User {
            let path = entry.path.clone();
            toggle.on_toggle(move |on| Message::ToggleEntry(path.clone(), on))
        } else {
            toggle
        };

        let name_color = if entry.enabled { p.text } else { p.label };
        let name = button(text(entry.name.clone()).size(12).color(name_color))
            .on_press(Message::Select(entry.path.clone()))
            .style(button::text)
            .padding([1, 2]);
        let name = tooltip(
            name,
            container(text(entry.display_comment().to_string()).size(10).color(p.text))
                .padding(6)
                .style(tooltip_style(p)),
            tooltip::Position::Bottom,
        );

        let source_color = match entry.source {
            EntrySource::User => p.green,
            EntrySource::System => p.label,
        };

        let bg = if is_selected {
            p.selected
        } else if idx % 2 == 0 {
            p.panel_bg
        } else {
            p.bg
        };

        container(
            row![
                container(toggle).width(40),
                container(name).width(Length::Fill),
                text(entry.source.label()).size(11).color(source_color).width(60),
                text(format!("{:.2}", ranked.percent)).size(11).color(p.accent).width(70),
            ]
            .spacing(4)
            .align_y(Alignment::Center),
        )
        .padding([2, 10])
        .style(move |_: &Theme| container::Style {
            background: Some(Background::Color(bg)),
            ..Default::default()
        })
        .into()
    }

    // ─── BACKGROUND APPS ────────────────────────────────────────

    fn view_processes(&self) -> Element<'_, Message> {
        let p = &self.pal;
        let visible = search::filter(&self.samples[..], &self.search, SAMPLE_FIELDS);

        let header = row![
            text("PID").size(11).color(p.accent).width(60),
            text("App").size(11).color(p.accent).width(140),
            text("CPU%").size(11).color(p.accent).width(55),
            text("MEM%").size(11).color(p.accent).width(55),
            text("Command").size(11).color(p.accent).width(Length::Fill),
        ]
        .spacing(4)
        .padding([4, 10]);

        let rows: Vec<Element<Message>> = visible
            .iter()
            .take(MAX_PROCESS_ROWS)
            .enumerate()
            .map(|(i, s)| process_row(s, if i % 2 == 0 { p.panel_bg } else { p.bg }, p))
            .collect();

        panel(
            column![
                section_title(format!("Background Apps ({})", visible.len()), p),
                header,
                scrollable(Column::with_children(rows)).height(Length::Fill),
            ]
            .into(),
            p,
        )
    }

    // ─── ENTRY FORM ─────────────────────────────────────────────

    fn view_form<'a>(&'a self, form: &'a EntryForm) -> Element<'a, Message> {
        let p = &self.pal;
        let title = match form.mode {
            FormMode::Create => "New Autostart Entry",
            FormMode::Edit(_) => "Edit Autostart Entry",
        };
        let field = |label: &'static str, value: &'a str, which: FormField| -> Element<'a, Message> {
            row![
                text(label).size(11).color(p.label).width(140),
                text_input(label, value)
                    .on_input(move |v| Message::FormChanged(which, v))
                    .on_submit(Message::SubmitForm)
                    .width(Length::Fill),
            ]
            .spacing(8)
            .align_y(Alignment::Center)
            .into()
        };

        panel(
            column![
                section_title(title, p),
                field("Name", &form.draft.name, FormField::Name),
                field("Command", &form.draft.command, FormField::Command),
                field("Comment", &form.draft.comment, FormField::Comment),
                field("Icon (name or path)", &form.draft.icon, FormField::Icon),
                row![
                    Space::with_width(Length::Fill),
                    toolbar_button("Cancel", Some(Message::CancelForm)),
                    toolbar_button(
                        match form.mode {
                            FormMode::Create => "Create",
                            FormMode::Edit(_) => "Save",
                        },
                        Some(Message::SubmitForm),
                    ),
                ]
                .spacing(6),
            ]
            .spacing(6)
            .into(),
            p,
        )
    }
}

// ─── HELPERS ────────────────────────────────────────────────────

fn process_row<'a>(sample: &ProcessSample, bg: Color, p: &Palette) -> Element<'a, Message> {
    let cpu_color = if sample.cpu_percent >= 50.0 {
        p.red
    } else if sample.cpu_percent >= 10.0 {
        p.yellow
    } else {
        p.text
    };
    container(
        row![
            text(sample.pid.to_string()).size(11).color(p.label).width(60),
            text(sample.command.clone()).size(11).color(p.text).width(140),
            text(format!("{:.1}", sample.cpu_percent)).size(11).color(cpu_color).width(55),
            text(format!("{:.1}", sample.mem_percent)).size(11).color(p.accent).width(55),
            text(truncate(&sample.args, 80)).size(10).color(p.label).width(Length::Fill),
        ]
        .spacing(4)
        .align_y(Alignment::Center),
    )
    .padding([2, 10])
    .style(move |_: &Theme| container::Style {
        background: Some(Background::Color(bg)),
        ..Default::default()
    })
    .into()
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars).collect();
    out.push('\u{2026}');
    out
}

fn toolbar_button(label: impl ToString, on_press: Option<Message>) -> Element<'static, Message> {
    button(text(label.to_string()).size(12))
        .on_press_maybe(on_press)
        .style(button::secondary)
        .padding([3, 10])
        .into()
}

fn section_title(label: impl ToString, p: &Palette) -> Element<'static, Message> {
    text(label.to_string()).size(13).color(p.accent).into()
}

fn tooltip_style(p: &Palette) -> impl Fn(&Theme) -> container::Style {
    let bg = p.panel_bg;
    let border_c = p.accent;
    let text_c = p.text;
    move |_: &Theme| container::Style {
        background: Some(Background::Color(bg)),
        border: Border {
            color: border_c,
            width: 1.0,
            radius: 4.0.into(),
        },
        text_color: Some(text_c),
        shadow: Shadow::default(),
    }
}

fn panel<'a>(content: Element<'a, Message>, p: &Palette) -> Element<'a, Message> {
    let panel_bg = p.panel_bg;
    let border_c = p.border;
    container(content)
        .width(Length::Fill)
        .height(Length::Fill)
        .padding(10)
        .style(move |_: &Theme| container::Style {
            background: Some(Background::Color(panel_bg)),
            border: Border {
                color: border_c,
                width: 1.0,
                radius: 8.0.into(),
            },
            shadow: Shadow {
                color: Color::from_rgba(0.0, 0.0, 0.0, 0.15),
                offset: Vector::new(0.0, 2.0),
                blur_radius: 8.0,
            },
            ..Default::default()
        })
        .into()
}
