//! Bounded field extraction for semi-structured registry text
//!
//! Registry responses often hold several network sections back to back. A
//! [`FieldTable`] describes how to pull named fields out of one of them: one
//! regex per field with a `val` capture group, a field kind that decides the
//! post-processing, and a datetime policy. [`parse_fields`] runs the table
//! inside a [`Bounds`] window so values never bleed across sections.
//!
//! Patterns run in dot-matches-newline mode. Where a value must stop before
//! the next unindented line, the pattern ends with a `(?P<stop>\n\S)` group;
//! the logical end of the match is the start of that group and the next
//! search resumes there.
//!
//! # Examples
//!
//! ```
//! use ipwhois_parse::{parse_fields, Bounds, FieldKind, FieldTable};
//!
//! let table = FieldTable::new(
//!     &[
//!         ("name", r"(NetName):[^\S\n]+(?P<val>.+?)\n", FieldKind::Text),
//!         ("country", r"(Country):[^\S\n]+(?P<val>.+?)\n", FieldKind::Country),
//!     ],
//!     None,
//!     true,
//! )
//! .unwrap();
//!
//! let fields = parse_fields("NetName: GOOGLE\nCountry: us\n", &table, Bounds::all(), None);
//! assert_eq!(fields.text("name"), Some("GOOGLE"));
//! assert_eq!(fields.text("country"), Some("US"));
//! ```

use chrono::{Duration, NaiveDate, NaiveDateTime};
use ipwhois_core::utils::unique_everseen;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// How a field's matches are turned into a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Unique values joined by newlines
    Text,
    /// Unique values as a list; never cut short by non-contiguous matches
    List,
    /// First value, upper-cased
    Country,
    /// First value, normalized to `YYYY-MM-DDTHH:MM:SS`
    Timestamp,
}

/// One field pattern
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub regex: Regex,
    pub kind: FieldKind,
}

/// Datetime formats for `Timestamp` fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatePolicy {
    /// Primary strftime format
    pub format: &'static str,
    /// Plain date format tried when the primary fails; no offset applied
    pub fallback: Option<&'static str>,
    /// Hours subtracted from primary-format values (source timezone offset)
    pub hour_offset: i64,
}

impl DatePolicy {
    pub const fn new(format: &'static str) -> Self {
        Self {
            format,
            fallback: None,
            hour_offset: 0,
        }
    }

    pub const fn with_fallback(mut self, fallback: &'static str) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub const fn with_hour_offset(mut self, hours: i64) -> Self {
        self.hour_offset = hours;
        self
    }

    /// Normalize a registry timestamp, or `None` if no format fits
    pub fn normalize(&self, raw: &str) -> Option<String> {
        if let Some(dt) = parse_datetime(raw, self.format) {
            let shifted = dt - Duration::hours(self.hour_offset);
            return Some(iso(shifted));
        }

        self.fallback
            .and_then(|format| parse_datetime(raw, format))
            .map(iso)
    }
}

fn parse_datetime(raw: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, format).ok().or_else(|| {
        NaiveDate::parse_from_str(raw, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

fn iso(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// A compiled set of field patterns
#[derive(Debug, Clone)]
pub struct FieldTable {
    pub fields: Vec<FieldSpec>,
    pub dates: Option<DatePolicy>,
    /// Stop accumulating a non-list field at its first non-adjacent match
    pub contiguous: bool,
}

impl FieldTable {
    /// Compile `(name, pattern, kind)` entries in dot-matches-newline mode
    pub fn new(
        entries: &[(&'static str, &str, FieldKind)],
        dates: Option<DatePolicy>,
        contiguous: bool,
    ) -> Result<Self, regex::Error> {
        let fields = entries
            .iter()
            .map(|&(name, pattern, kind)| {
                Ok(FieldSpec {
                    name,
                    regex: Regex::new(&format!("(?s){}", pattern))?,
                    kind,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            fields,
            dates,
            contiguous,
        })
    }

    /// Field names in table order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }
}

/// Search window `[from, to)` in byte offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub from: usize,
    pub to: Option<usize>,
}

impl Bounds {
    /// The whole text
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(from: usize, to: Option<usize>) -> Self {
        Self { from, to }
    }
}

/// Byte span of a section header match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub start: usize,
    pub end: usize,
}

impl Section {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn from_match(m: &regex::Match<'_>) -> Self {
        Self::new(m.start(), m.end())
    }
}

/// Window for section `index`: from its header's end to the next header's start
pub fn section_bounds(sections: &[Section], index: usize) -> Bounds {
    Bounds {
        from: sections.get(index).map(|s| s.end).unwrap_or(0),
        to: sections.get(index + 1).map(|s| s.start),
    }
}

/// An extracted value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

/// Fields found by [`parse_fields`]; absent fields had no non-empty match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldMap(pub BTreeMap<&'static str, FieldValue>);

impl FieldMap {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    /// Text value of a field
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Owned text value of a field
    pub fn string(&self, name: &str) -> Option<String> {
        self.text(name).map(str::to_string)
    }

    /// List value of a field
    pub fn list(&self, name: &str) -> Option<Vec<String>> {
        match self.0.get(name) {
            Some(FieldValue::List(v)) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn floor_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Raw `val` captures for one field inside a window
///
/// Applies the contiguity rule when `contiguous` is set: a match that does not
/// begin right after the previous match's logical end stops the scan.
pub fn field_values(text: &str, regex: &Regex, bounds: Bounds, contiguous: bool) -> Vec<String> {
    let end = floor_boundary(text, bounds.to.unwrap_or(text.len()));
    let haystack = &text[..end];
    let mut pos = floor_boundary(haystack, bounds.from);

    let mut values = Vec::new();
    let mut previous_end: Option<usize> = None;

    while pos <= haystack.len() {
        let Some(caps) = regex.captures_at(haystack, pos) else {
            break;
        };
        let Some(whole) = caps.get(0) else {
            break;
        };
        let logical_end = caps.name("stop").map(|s| s.start()).unwrap_or(whole.end());

        if contiguous {
            if let Some(prev) = previous_end {
                if whole.start() == 0 || prev != whole.start() - 1 {
                    break;
                }
            }
        }

        match caps.name("val") {
            Some(val) => values.push(val.as_str().trim().to_string()),
            None => debug!("pattern matched without a val group"),
        }
        previous_end = Some(logical_end);

        pos = if logical_end > whole.start() {
            logical_end
        } else {
            ceil_boundary(haystack, whole.end().max(pos + 1))
        };
    }

    values
}

/// Extract every table field (or the `field_list` subset) inside `bounds`
pub fn parse_fields(
    text: &str,
    table: &FieldTable,
    bounds: Bounds,
    field_list: Option<&[&str]>,
) -> FieldMap {
    let mut found = BTreeMap::new();

    let selected = table
        .fields
        .iter()
        .filter(|f| field_list.map(|list| list.contains(&f.name)).unwrap_or(true));

    for field in selected {
        let contiguous = table.contiguous && field.kind != FieldKind::List;
        let values: Vec<String> = field_values(text, &field.regex, bounds, contiguous)
            .into_iter()
            .filter(|v| !v.is_empty())
            .collect();
        if values.is_empty() {
            continue;
        }

        let value = match field.kind {
            FieldKind::Country => FieldValue::Text(values[0].to_uppercase()),
            FieldKind::Timestamp => match &table.dates {
                Some(policy) => match policy.normalize(&values[0]) {
                    Some(normalized) => FieldValue::Text(normalized),
                    None => {
                        warn!(
                            field = field.name,
                            value = %values[0],
                            format = policy.format,
                            "datetime did not match any format, keeping raw value"
                        );
                        FieldValue::Text(values[0].clone())
                    }
                },
                None => FieldValue::Text(unique_everseen(values).join("\n").trim().to_string()),
            },
            FieldKind::List => FieldValue::List(unique_everseen(values)),
            FieldKind::Text => FieldValue::Text(unique_everseen(values).join("\n").trim().to_string()),
        };

        found.insert(field.name, value);
    }

    FieldMap(found)
}
