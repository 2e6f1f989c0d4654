//! RIS loading.
//!
//! An entry runs from `TY  - <type>` to `ER  - `. Lines without a tag
//! continue the previous field (wrapped abstracts). Unknown tags are ignored.

use std::sync::LazyLock;

use regex::Regex;

use super::bibtex::{collapse_whitespace, normalize_year, preview};
use crate::record::{BibliographicRecord, Identifiers};
use crate::resolver::utils::{compile_static_regex, normalize_doi};

/// `XX  - value`; some exporters emit a single space before the dash.
static TAG_LINE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"^([A-Z][A-Z0-9])\s{1,2}-(?:\s(.*))?$"));

/// Batch parse result for RIS input.
#[derive(Debug, Clone, Default)]
pub struct RisParseResult {
    /// Records built from complete entries, in input order.
    pub records: Vec<BibliographicRecord>,
    /// Actionable parse/skip messages.
    pub skipped: Vec<String>,
    /// Entries opened with `TY`.
    pub total_found: usize,
}

#[derive(Debug, Default)]
struct Entry {
    fields: Vec<(String, String)>,
}

impl Entry {
    fn first(&self, tags: &[&str]) -> Option<String> {
        tags.iter().find_map(|tag| {
            self.fields
                .iter()
                .find(|(name, value)| name == tag && !value.is_empty())
                .map(|(_, value)| collapse_whitespace(value))
        })
    }

    fn all(&self, tags: &[&str]) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(name, value)| tags.contains(&name.as_str()) && !value.trim().is_empty())
            .map(|(_, value)| collapse_whitespace(value))
            .collect()
    }
}

/// Parses RIS entries from input text.
#[tracing::instrument(skip(input), fields(input_len = input.len()))]
#[must_use]
pub fn parse_ris(input: &str) -> RisParseResult {
    let mut result = RisParseResult::default();
    let mut current: Option<Entry> = None;

    for (index, raw_line) in input.lines().enumerate() {
        let line = raw_line.trim_end().trim_start_matches('\u{feff}');
        if line.trim().is_empty() {
            continue;
        }
        let line_no = index + 1;

        let Some(caps) = TAG_LINE.captures(line) else {
            match current.as_mut().and_then(|entry| entry.fields.last_mut()) {
                Some((_, value)) => {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                None => result.skipped.push(format!(
                    "What: stray RIS text on line {line_no} `{}`. Why: it is not inside an entry. Fix: start entries with `TY  - JOUR`.",
                    preview(line.trim())
                )),
            }
            continue;
        };
        let tag = &caps[1];
        let value = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();

        match tag {
            "TY" => {
                if current.is_some() {
                    result.skipped.push(format!(
                        "What: RIS entry before line {line_no} was never closed. Why: a new `TY` began before `ER`. Fix: end each entry with `ER  - `."
                    ));
                }
                result.total_found += 1;
                current = Some(Entry::default());
            }
            "ER" => match current.take() {
                Some(entry) => match build_record(&entry) {
                    Some(record) => result.records.push(record),
                    None => result.skipped.push(format!(
                        "What: RIS entry ending on line {line_no} has no usable fields. Why: no title, DOI or URL. Fix: add `TI`, `DO` or `UR`."
                    )),
                },
                None => result.skipped.push(format!(
                    "What: `ER` on line {line_no} closes nothing. Why: no open entry. Fix: remove it or add the missing `TY` line."
                )),
            },
            _ => match current.as_mut() {
                Some(entry) => entry.fields.push((tag.to_string(), value)),
                None => result.skipped.push(format!(
                    "What: RIS tag `{tag}` on line {line_no} is outside an entry. Why: fields must follow `TY`. Fix: start the entry with `TY  - JOUR`."
                )),
            },
        }
    }

    if current.is_some() {
        result.skipped.push(
            "What: last RIS entry was never closed. Why: the file ends before `ER`. Fix: end each entry with `ER  - `."
                .to_string(),
        );
    }
    result
}

fn build_record(entry: &Entry) -> Option<BibliographicRecord> {
    let record = BibliographicRecord {
        title: entry.first(&["TI", "T1", "CT", "BT"]).unwrap_or_default(),
        authors: entry.all(&["AU", "A1"]),
        identifiers: Identifiers {
            doi: entry
                .first(&["DO"])
                .map(|doi| normalize_doi(&doi))
                .filter(|doi| !doi.is_empty()),
            pmid: None,
            preprint_id: None,
            landing_url: entry.first(&["UR", "L2"]),
        },
        abstract_text: entry.first(&["AB", "N2"]),
        year: entry
            .first(&["PY", "Y1", "DA"])
            .and_then(|value| normalize_year(&value)),
        citation_key: entry.first(&["ID"]),
    };
    (record.title().is_some() || record.best_identifier().is_some()).then_some(record)
}
