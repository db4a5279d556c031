use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::desktop_entry::{self, DesktopEntry, EntryFields};

/// Icon shown when an entry does not name one.
pub const FALLBACK_ICON: &str = "application-x-executable";
/// Presentation default for an empty comment.
pub const NO_DESCRIPTION: &str = "No description available";

const SYSTEM_AUTOSTART_DIR: &str = "/etc/xdg/autostart";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntrySource {
    User,
    System,
}

impl EntrySource {
    pub fn label(&self) -> &'static str {
        match self {
            EntrySource::User => "user",
            EntrySource::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutostartEntry {
    pub path: PathBuf,
    pub source: EntrySource,
    pub name: String,
    /// May be empty for third-party files without `Exec=`.
    pub command: String,
    pub comment: String,
    /// Never empty: normalised to [`FALLBACK_ICON`].
    pub icon: String,
    pub enabled: bool,
}

impl AutostartEntry {
    /// Fail-soft value used when a file cannot be read.
    fn fallback(path: &Path, source: EntrySource) -> Self {
        Self {
            path: path.to_path_buf(),
            source,
            name: file_stem(path),
            command: String::new(),
            comment: String::new(),
            icon: FALLBACK_ICON.to_string(),
            enabled: true,
        }
    }

    pub fn display_comment(&self) -> &str {
        if self.comment.is_empty() {
            NO_DESCRIPTION
        } else {
            &self.comment
        }
    }

    /// Editing needs a known command to pre-fill the form.
    pub fn is_editable(&self) -> bool {
        self.source == EntrySource::User && !self.command.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{} is a system entry and cannot be changed", .0.display())]
    NotPermitted(PathBuf),
    #[error("an autostart entry named {} already exists", .0.display())]
    NameConflict(PathBuf),
    #[error("{0} must not be empty")]
    MissingField(&'static str),
    #[error("'{0}' cannot be used as an entry file name")]
    InvalidName(String),
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RegistryError {
    /// I/O failures may clear up on the next refresh; policy outcomes will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistryError::Io { .. })
    }

    fn io(path: &Path, source: io::Error) -> Self {
        RegistryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The user-editable fields of an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryDraft {
    pub name: String,
    pub command: String,
    pub comment: String,
    pub icon: String,
}

impl EntryDraft {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        comment: impl Into<String>,
        icon: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            comment: comment.into(),
            icon: icon.into(),
        }
    }

    /// Pre-fill from an existing entry; the fallback icon is shown as empty.
    pub fn from_entry(entry: &AutostartEntry) -> Self {
        let icon = if entry.icon == FALLBACK_ICON {
            String::new()
        } else {
            entry.icon.clone()
        };
        Self::new(&entry.name, &entry.command, &entry.comment, icon)
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::MissingField("name"));
        }
        if self.command.trim().is_empty() {
            return Err(RegistryError::MissingField("command"));
        }
        Ok(())
    }

    fn render(&self, hidden: bool) -> String {
        let icon = self.icon.trim();
        desktop_entry::render(&EntryFields {
            name: &self.name,
            command: &self.command,
            comment: &self.comment,
            icon: if icon == FALLBACK_ICON { "" } else { icon },
            hidden,
        })
    }
}

/// Autostart entries found in a user-writable directory and a read-only
/// system directory.
#[derive(Debug, Clone)]
pub struct AutostartRegistry {
    user_dir: PathBuf,
    system_dir: PathBuf,
}

impl AutostartRegistry {
    pub fn new(user_dir: impl Into<PathBuf>, system_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_dir: user_dir.into(),
            system_dir: system_dir.into(),
        }
    }

    /// `~/.config/autostart` and `/etc/xdg/autostart`.
    pub fn from_environment() -> Self {
        let user_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("autostart");
        Self::new(user_dir, SYSTEM_AUTOSTART_DIR)
    }

    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    /// User files first, then system files; each directory in file-name
    /// order. A missing directory contributes nothing.
    pub fn scan(&self) -> Vec<(PathBuf, EntrySource)> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for (dir, source) in [
            (&self.user_dir, EntrySource::User),
            (&self.system_dir, EntrySource::System),
        ] {
            for path in list_entry_files(dir) {
                if seen.insert(path.clone()) {
                    found.push((path, source));
                }
            }
        }
        found
    }

    /// Scan and parse everything.
    pub fn load_all(&self) -> Vec<AutostartEntry> {
        self.scan()
            .into_iter()
            .map(|(path, source)| Self::parse(&path, source))
            .collect()
    }

    /// Never fails: unreadable files become a default entry named after the
    /// file stem.
    pub fn parse(path: &Path, source: EntrySource) -> AutostartEntry {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!("unreadable autostart file {}: {e}", path.display());
                return AutostartEntry::fallback(path, source);
            }
        };

        let parsed = DesktopEntry::parse(&content);
        if parsed.is_empty() {
            debug!("{} has no [Desktop Entry] keys", path.display());
        }
        let mut entry = AutostartEntry::fallback(path, source);
        if let Some(name) = parsed.get(desktop_entry::KEY_NAME).filter(|n| !n.is_empty()) {
            entry.name = name.to_string();
        }
        if let Some(command) = parsed.get(desktop_entry::KEY_EXEC) {
            entry.command = command.to_string();
        }
        if let Some(comment) = parsed.get(desktop_entry::KEY_COMMENT) {
            entry.comment = comment.to_string();
        }
        if let Some(icon) = parsed.get(desktop_entry::KEY_ICON).filter(|i| !i.is_empty()) {
            entry.icon = icon.to_string();
        }
        if let Some(hidden) = parsed.get(desktop_entry::KEY_HIDDEN) {
            entry.enabled = !desktop_entry::hidden_disables(hidden);
        }
        entry
    }

    /// Write a new enabled entry into the user directory. An existing file
    /// with the derived name is never overwritten.
    pub fn create(&self, draft: &EntryDraft) -> Result<AutostartEntry, RegistryError> {
        draft.validate()?;
        let path = self.user_dir.join(entry_file_name(&draft.name)?);

        fs::create_dir_all(&self.user_dir).map_err(|e| RegistryError::io(&self.user_dir, e))?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(RegistryError::NameConflict(path));
            }
            Err(e) => return Err(RegistryError::io(&path, e)),
        };
        file.write_all(draft.render(false).as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| RegistryError::io(&path, e))?;

        info!("created autostart entry {}", path.display());
        Ok(Self::parse(&path, EntrySource::User))
    }

    /// Flip the `Hidden` flag, keeping every other line as it was.
    pub fn set_enabled(
        &self,
        entry: &AutostartEntry,
        enabled: bool,
    ) -> Result<AutostartEntry, RegistryError> {
        self.ensure_writable(entry)?;
        let content =
            fs::read_to_string(&entry.path).map_err(|e| RegistryError::io(&entry.path, e))?;
        let updated = desktop_entry::with_hidden(&content, !enabled);
        if updated != content {
            write_file(&entry.path, &updated)?;
            info!(
                "{} autostart entry {}",
                if enabled { "enabled" } else { "disabled" },
                entry.path.display()
            );
        }
        Ok(Self::parse(&entry.path, entry.source))
    }

    /// Replace the file with the draft's fields. Keys outside the set this
    /// application writes are dropped.
    pub fn edit(
        &self,
        entry: &AutostartEntry,
        draft: &EntryDraft,
    ) -> Result<AutostartEntry, RegistryError> {
        self.ensure_writable(entry)?;
        draft.validate()?;
        write_file(&entry.path, &draft.render(!entry.enabled))?;
        info!("rewrote autostart entry {}", entry.path.display());
        Ok(Self::parse(&entry.path, entry.source))
    }

    /// Removing a file that is already gone succeeds.
    pub fn delete(&self, entry: &AutostartEntry) -> Result<(), RegistryError> {
        self.ensure_writable(entry)?;
        match fs::remove_file(&entry.path) {
            Ok(()) => {
                info!("deleted autostart entry {}", entry.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("autostart entry {} already gone", entry.path.display());
                Ok(())
            }
            Err(e) => Err(RegistryError::io(&entry.path, e)),
        }
    }

    /// Only user entries that live directly in the user directory may change,
    /// whatever the caller claims about the entry.
    fn ensure_writable(&self, entry: &AutostartEntry) -> Result<(), RegistryError> {
        let in_user_dir = entry.path.parent() == Some(self.user_dir.as_path());
        if entry.source == EntrySource::User && in_user_dir {
            Ok(())
        } else {
            Err(RegistryError::NotPermitted(entry.path.clone()))
        }
    }
}

/// `"My App"` → `My_App.desktop`.
fn entry_file_name(name: &str) -> Result<String, RegistryError> {
    let stem = name.trim().replace(' ', "_");
    if stem.is_empty() || stem == "." || stem == ".." || stem.contains(['/', '\0']) {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(format!("{stem}.{}", desktop_entry::EXTENSION))
}

fn list_entry_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(read) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = read
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(desktop_entry::EXTENSION))
        .collect();
    paths.sort();
    paths
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn write_file(path: &Path, content: &str) -> Result<(), RegistryError> {
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| RegistryError::io(path, e))?;
    file.write_all(content.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|e| RegistryError::io(path, e))
}
