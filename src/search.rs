use std::borrow::Cow;

use crate::impact::RankedEntry;
use crate::sampler::ProcessSample;

/// A record whose fields can be matched against search text.
pub trait Searchable {
    type Field: Copy;

    fn field_text(&self, field: Self::Field) -> Cow<'_, str>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryField {
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleField {
    Pid,
    Command,
    Args,
}

/// The ranked autostart list is searched by name.
pub const ENTRY_FIELDS: &[EntryField] = &[EntryField::Name];
/// The live process list is searched by pid, command and arguments.
pub const SAMPLE_FIELDS: &[SampleField] = &[SampleField::Pid, SampleField::Command, SampleField::Args];

impl Searchable for RankedEntry {
    type Field = EntryField;

    fn field_text(&self, field: EntryField) -> Cow<'_, str> {
        match field {
            EntryField::Name => Cow::Borrowed(&self.entry.name),
        }
    }
}

impl Searchable for ProcessSample {
    type Field = SampleField;

    fn field_text(&self, field: SampleField) -> Cow<'_, str> {
        match field {
            SampleField::Pid => Cow::Owned(self.pid.to_string()),
            SampleField::Command => Cow::Borrowed(&self.command),
            SampleField::Args => Cow::Borrowed(&self.args),
        }
    }
}

/// Items where at least one of `fields` contains `query`, ignoring case, in
/// their original order. An empty query keeps everything.
pub fn filter<'a, T: Searchable>(items: &'a [T], query: &str, fields: &[T::Field]) -> Vec<&'a T> {
    if query.is_empty() {
        return items.iter().collect();
    }
    let needle = query.to_lowercase();
    items
        .iter()
        .filter(|item| {
            fields
                .iter()
                .any(|&f| item.field_text(f).to_lowercase().contains(&needle))
        })
        .collect()
}
