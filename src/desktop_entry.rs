//! Line-oriented reader and writer for freedesktop `[Desktop Entry]` files.
//!
//! Only the main group is interpreted. Lines in other groups (for example
//! `[Desktop Action new-window]`) are carried through rewrites untouched.

pub const HEADER: &str = "[Desktop Entry]";
pub const EXTENSION: &str = "desktop";
pub const AUTOSTART_MARKER: &str = "X-GNOME-Autostart-enabled";

pub const KEY_NAME: &str = "Name";
pub const KEY_EXEC: &str = "Exec";
pub const KEY_COMMENT: &str = "Comment";
pub const KEY_ICON: &str = "Icon";
pub const KEY_HIDDEN: &str = "Hidden";

/// Key/value pairs of the `[Desktop Entry]` group, in file order.
#[derive(Debug, Default, Clone)]
pub struct DesktopEntry {
    values: Vec<(String, String)>,
}

impl DesktopEntry {
    /// Keys before any group header are treated as part of the main group,
    /// which keeps header-less third-party files readable.
    pub fn parse(content: &str) -> Self {
        let mut values = Vec::new();
        let mut in_main = true;
        for raw in content.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(group) = group_header(line) {
                in_main = group == HEADER;
                continue;
            }
            if !in_main {
                continue;
            }
            if let Some((key, value)) = split_key(line) {
                values.push((key.to_string(), value.to_string()));
            }
        }
        Self { values }
    }

    /// Last value recorded for `key`. Localised keys (`Name[de]`) never match.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// `Hidden=` disables an entry when its value mentions "true" in any case.
pub fn hidden_disables(value: &str) -> bool {
    value.to_ascii_lowercase().contains("true")
}

/// Rewrite every `Hidden=` line of the main group, or add one at the end of
/// that group when none exists. All other lines keep their text and order;
/// line endings come out as `\n`.
pub fn with_hidden(content: &str, hidden: bool) -> String {
    let replacement = format!("{KEY_HIDDEN}={hidden}");
    let mut out = String::with_capacity(content.len() + replacement.len() + 1);
    let mut in_main = true;
    let mut found = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(group) = group_header(trimmed) {
            if in_main && !found && group != HEADER && !out.is_empty() {
                push_line(&mut out, &replacement);
                found = true;
            }
            in_main = group == HEADER;
            push_line(&mut out, line);
            continue;
        }
        if in_main && key_of(trimmed) == Some(KEY_HIDDEN) {
            push_line(&mut out, &replacement);
            found = true;
        } else {
            push_line(&mut out, line);
        }
    }

    if !found {
        push_line(&mut out, &replacement);
    }
    out
}

/// The fields this application writes when it owns the whole file.
#[derive(Debug, Clone, Copy)]
pub struct EntryFields<'a> {
    pub name: &'a str,
    pub command: &'a str,
    pub comment: &'a str,
    pub icon: &'a str,
    pub hidden: bool,
}

/// Render a complete file. Empty comment and icon are omitted.
pub fn render(fields: &EntryFields<'_>) -> String {
    let mut out = String::new();
    push_line(&mut out, HEADER);
    push_line(&mut out, "Type=Application");
    push_line(&mut out, &format!("{KEY_NAME}={}", one_line(fields.name)));
    push_line(&mut out, &format!("{KEY_EXEC}={}", one_line(fields.command)));
    if !fields.comment.trim().is_empty() {
        push_line(&mut out, &format!("{KEY_COMMENT}={}", one_line(fields.comment)));
    }
    if !fields.icon.trim().is_empty() {
        push_line(&mut out, &format!("{KEY_ICON}={}", one_line(fields.icon)));
    }
    push_line(&mut out, &format!("{KEY_HIDDEN}={}", fields.hidden));
    push_line(&mut out, &format!("{AUTOSTART_MARKER}=true"));
    out
}

fn group_header(line: &str) -> Option<&str> {
    (line.starts_with('[') && line.ends_with(']')).then_some(line)
}

fn split_key(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}

fn key_of(line: &str) -> Option<&str> {
    split_key(line).map(|(k, _)| k)
}

fn one_line(value: &str) -> String {
    value.trim().replace(['\n', '\r'], " ")
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}
