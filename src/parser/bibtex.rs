//! BibTeX loading for supported entry types.
//!
//! Entries are segmented by brace depth, so one malformed entry (unbalanced
//! braces, missing `=`) is reported and skipped without swallowing the
//! entries after it.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::record::{BibliographicRecord, Identifiers};
use crate::resolver::utils::{compile_static_regex, normalize_doi};

static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"\b(?:18|19|20)\d{2}\b"));
static AUTHOR_SPLIT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)\s+and\s+"));
static WHITESPACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"\s+"));

const SUPPORTED_TYPES: [&str; 6] = [
    "article",
    "inproceedings",
    "book",
    "misc",
    "phdthesis",
    "techreport",
];
const IGNORED_BLOCK_TYPES: [&str; 3] = ["comment", "preamble", "string"];

/// Batch parse result for BibTeX input.
#[derive(Debug, Clone, Default)]
pub struct BibtexParseResult {
    /// Records built from supported entries, in input order.
    pub records: Vec<BibliographicRecord>,
    /// Actionable parse/skip messages.
    pub skipped: Vec<String>,
    /// Total candidate `@...{...}` segments discovered.
    pub total_found: usize,
}

/// Parses BibTeX entries from input text.
#[tracing::instrument(skip(input), fields(input_len = input.len()))]
#[must_use]
pub fn parse_bibtex(input: &str) -> BibtexParseResult {
    let mut result = BibtexParseResult::default();
    let segments = segment_entries(input);
    result.total_found = segments.len();

    for raw_entry in &segments {
        match parse_entry(raw_entry) {
            EntryOutcome::Parsed(record) => result.records.push(*record),
            EntryOutcome::Ignore => {}
            EntryOutcome::Skip(message) => result.skipped.push(message),
        }
    }
    result
}

#[derive(Debug)]
enum EntryOutcome {
    Parsed(Box<BibliographicRecord>),
    Ignore,
    Skip(String),
}

fn segment_entries(input: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut entries = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        if chars[i].1 != '@' {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < chars.len() && chars[j].1.is_ascii_alphabetic() {
            j += 1;
        }
        while j < chars.len() && chars[j].1.is_whitespace() {
            j += 1;
        }
        if j >= chars.len() || chars[j].1 != '{' {
            i += 1;
            continue;
        }

        let start = chars[i].0;
        match closing_brace(&chars, j) {
            Some(end_index) => {
                let end_exclusive = chars
                    .get(end_index + 1)
                    .map_or(input.len(), |(offset, _)| *offset);
                entries.push(input[start..end_exclusive].trim().to_string());
                i = end_index + 1;
            }
            None => {
                // Unclosed entry: cut at the next `@` that starts a line.
                let recovery = (i + 1..chars.len()).find(|&k| {
                    chars[k].1 == '@' && matches!(chars[k - 1].1, '\n' | '\r')
                });
                if let Some(recovery) = recovery {
                    entries.push(input[start..chars[recovery].0].trim().to_string());
                    i = recovery;
                } else {
                    entries.push(input[start..].trim().to_string());
                    break;
                }
            }
        }
    }

    entries
}

/// Index of the brace closing the one at `open`, honoring quotes and escapes.
fn closing_brace(chars: &[(usize, char)], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escape = false;

    for (k, (_, ch)) in chars.iter().enumerate().skip(open) {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' => escape = true,
            '"' if depth == 1 => in_quotes = !in_quotes,
            _ if in_quotes => {}
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(k);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_entry(raw_entry: &str) -> EntryOutcome {
    let trimmed = raw_entry.trim();
    let Some(after_at) = trimmed.strip_prefix('@') else {
        return EntryOutcome::Skip(
            "What: malformed BibTeX entry. Why: missing '@type{...}' prefix. Fix: start entries with @article{key, ...}."
                .to_string(),
        );
    };
    let Some(brace_pos) = after_at.find('{') else {
        return EntryOutcome::Skip(format!(
            "What: malformed BibTeX entry `{}`. Why: missing opening '{{' after entry type. Fix: use `@type{{key, field = value}}`.",
            preview(trimmed)
        ));
    };

    let entry_type = after_at[..brace_pos].trim().to_ascii_lowercase();
    if IGNORED_BLOCK_TYPES.contains(&entry_type.as_str()) {
        return EntryOutcome::Ignore;
    }
    if !SUPPORTED_TYPES.contains(&entry_type.as_str()) {
        return EntryOutcome::Skip(format!(
            "What: unsupported BibTeX entry type `@{entry_type}`. Why: only @{} are loaded. Fix: change the entry type or supply the record as JSON.",
            SUPPORTED_TYPES.join("/@")
        ));
    }

    if !trimmed.ends_with('}') {
        return EntryOutcome::Skip(format!(
            "What: malformed BibTeX entry `{}`. Why: unbalanced braces (entry never closed). Fix: ensure each '{{' has a matching '}}'.",
            preview(trimmed)
        ));
    }
    let body = &after_at[brace_pos + 1..after_at.len() - 1];
    let Some((key_raw, fields_raw)) = body.split_once(',') else {
        return EntryOutcome::Skip(format!(
            "What: malformed BibTeX entry `{}`. Why: missing citation key or field list. Fix: use `@{entry_type}{{key, field = value}}`.",
            preview(trimmed)
        ));
    };

    let key = key_raw.trim();
    if key.is_empty() {
        return EntryOutcome::Skip(format!(
            "What: malformed BibTeX entry `{}`. Why: empty citation key. Fix: provide a non-empty key before the first comma.",
            preview(trimmed)
        ));
    }

    let fields = match parse_fields(fields_raw) {
        Ok(fields) => fields,
        Err(reason) => {
            return EntryOutcome::Skip(format!(
                "What: malformed BibTeX field assignment in `{}`. Why: {reason}. Fix: use `field = {{value}}` or `field = \"value\"` with commas between fields.",
                preview(trimmed)
            ));
        }
    };

    EntryOutcome::Parsed(Box::new(build_record(key, &fields)))
}

fn build_record(key: &str, fields: &HashMap<String, String>) -> BibliographicRecord {
    let field = |name: &str| {
        fields
            .get(name)
            .map(|value| collapse_whitespace(value))
            .filter(|value| !value.is_empty())
    };

    let preprint_id = field("eprint").or_else(|| field("arxivid"));
    BibliographicRecord {
        title: field("title").map(|t| strip_braces(&t)).unwrap_or_default(),
        authors: field("author").map(|a| split_authors(&a)).unwrap_or_default(),
        identifiers: Identifiers {
            doi: field("doi")
                .map(|doi| normalize_doi(&doi))
                .filter(|doi| !doi.is_empty()),
            pmid: field("pmid"),
            preprint_id,
            landing_url: field("url"),
        },
        abstract_text: field("abstract").map(|a| strip_braces(&a)),
        year: field("year").and_then(|value| normalize_year(&value)),
        citation_key: Some(key.to_string()),
    }
}

fn parse_fields(input: &str) -> Result<HashMap<String, String>, String> {
    let mut pairs = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            current.push(ch);
            escape = false;
            continue;
        }
        if ch == '\\' {
            current.push(ch);
            escape = true;
            continue;
        }
        if ch == '"' && depth == 0 {
            in_quotes = !in_quotes;
            current.push(ch);
            continue;
        }
        if !in_quotes {
            if ch == '{' {
                depth += 1;
            } else if ch == '}' {
                if depth == 0 {
                    return Err("closing brace without matching opening brace".to_string());
                }
                depth -= 1;
            } else if ch == ',' && depth == 0 {
                let segment = current.trim();
                if !segment.is_empty() {
                    pairs.push(segment.to_string());
                }
                current.clear();
                continue;
            }
        }
        current.push(ch);
    }

    if in_quotes {
        return Err("unterminated quoted value".to_string());
    }
    if depth != 0 {
        return Err("unbalanced braces in field values".to_string());
    }
    let tail = current.trim();
    if !tail.is_empty() {
        pairs.push(tail.to_string());
    }

    let mut fields = HashMap::new();
    for pair in pairs {
        let Some((name, value_raw)) = pair.split_once('=') else {
            return Err(format!("missing '=' in field segment `{}`", preview(&pair)));
        };
        let field_name = name.trim().to_ascii_lowercase();
        if field_name.is_empty() {
            return Err("empty field name".to_string());
        }
        let value = strip_bibtex_value(value_raw)
            .ok_or_else(|| format!("invalid value in field `{field_name}`"))?;
        // First value wins.
        fields.entry(field_name).or_insert(value);
    }

    Ok(fields)
}

fn strip_bibtex_value(value: &str) -> Option<String> {
    let trimmed = value.trim().trim_end_matches(',').trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(inner) = trimmed.strip_prefix('{').and_then(|v| v.strip_suffix('}')) {
        return Some(inner.trim().to_string());
    }
    if let Some(inner) = trimmed.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        return Some(inner.replace("\\\"", "\"").trim().to_string());
    }
    Some(trimmed.to_string())
}

/// Removes case-protection braces (`{DNA}` in titles).
fn strip_braces(value: &str) -> String {
    value.replace(['{', '}'], "")
}

pub(super) fn collapse_whitespace(value: &str) -> String {
    WHITESPACE_PATTERN.replace_all(value.trim(), " ").into_owned()
}

fn split_authors(value: &str) -> Vec<String> {
    AUTHOR_SPLIT_PATTERN
        .split(value)
        .map(|author| strip_braces(author.trim()))
        .filter(|author| !author.is_empty())
        .collect()
}

pub(super) fn normalize_year(value: &str) -> Option<u16> {
    YEAR_PATTERN
        .find(value)
        .and_then(|m| m.as_str().parse::<u16>().ok())
}

pub(super) fn preview(input: &str) -> String {
    const MAX: usize = 80;
    if input.chars().count() <= MAX {
        return input.to_string();
    }
    let shortened: String = input.chars().take(MAX).collect();
    format!("{shortened}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bibtex_supported_entry_types() {
        let input = r"
@article{a1, title={A}, author={Smith, J.}, year={2024}}
@book{b1, title={B}, author={Jones, K.}, year={2023}}
@inproceedings{c1, title={C}, author={Lee, M.}, year={2022}}
@misc{d1, title={D}}
@phdthesis{e1, title={E}}
@techreport{f1, title={F}}
";
        let result = parse_bibtex(input);
        assert_eq!(result.records.len(), 6);
        assert!(result.skipped.is_empty());
        assert_eq!(result.records[3].citation_key.as_deref(), Some("d1"));
    }

    #[test]
    fn test_parse_bibtex_maps_identifier_fields() {
        let input = r"@article{k,
  title = {Deep {DNA} Models},
  author = {Smith, J. and Doe, R.},
  year = {2024},
  doi = {https://doi.org/10.1234/Example},
  pmid = {123456},
  eprint = {2101.00001},
  url = {https://pub.example/a/1},
  abstract = {We study
              things.}
}";
        let result = parse_bibtex(input);
        let record = &result.records[0];
        assert_eq!(record.title, "Deep DNA Models");
        assert_eq!(record.authors, vec!["Smith, J.", "Doe, R."]);
        assert_eq!(record.year, Some(2024));
        assert_eq!(record.identifiers.doi.as_deref(), Some("10.1234/Example"));
        assert_eq!(record.identifiers.pmid.as_deref(), Some("123456"));
        assert_eq!(record.identifiers.preprint_id.as_deref(), Some("2101.00001"));
        assert_eq!(
            record.identifiers.landing_url.as_deref(),
            Some("https://pub.example/a/1")
        );
        assert_eq!(record.abstract_text.as_deref(), Some("We study things."));
    }

    #[test]
    fn test_parse_bibtex_arxivid_field_is_preprint_fallback() {
        let result = parse_bibtex("@misc{k, title={T}, arxivid={1905.12345}}");
        assert_eq!(
            result.records[0].identifiers.preprint_id.as_deref(),
            Some("1905.12345")
        );
    }

    #[test]
    fn test_parse_bibtex_quoted_and_bare_values() {
        let input = r#"@article{k, title="Quoted", year = 2024, doi="10.1234/example",}"#;
        let result = parse_bibtex(input);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].title, "Quoted");
        assert_eq!(result.records[0].year, Some(2024));
    }

    #[test]
    fn test_parse_bibtex_ignores_comment_preamble_string() {
        let input = r#"
@comment{this is ignored}
@preamble{"\newcommand{\noop}{}"}
@string{foo = "bar"}
@article{k, title={A}, author={Smith, J.}, year={2024}}
"#;
        let result = parse_bibtex(input);
        assert_eq!(result.records.len(), 1);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn test_parse_bibtex_unsupported_type_is_skipped_with_message() {
        let result = parse_bibtex("@online{k, title={A}}");
        assert!(result.records.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert!(result.skipped[0].contains("unsupported BibTeX entry type `@online`"));
    }

    #[test]
    fn test_parse_bibtex_malformed_unbalanced_does_not_swallow_next_entry() {
        let input = r"
@article{bad, title={Broken}, year={2024}
@article{ok, title={Good}, doi={10.1234/good}}
";
        let result = parse_bibtex(input);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].citation_key.as_deref(), Some("ok"));
        assert!(result.skipped[0].contains("What:"));
        assert!(result.skipped[0].contains("Fix:"));
    }

    #[test]
    fn test_parse_bibtex_missing_equals_is_reported() {
        let result = parse_bibtex("@article{bad, title {Missing equals}, year={2024}}");
        assert!(result.records.is_empty());
        assert!(result.skipped[0].contains("missing '='"));
    }

    #[test]
    fn test_parse_bibtex_duplicate_field_first_value_wins() {
        let result = parse_bibtex("@article{k, title={First}, title={Second}}");
        assert_eq!(result.records[0].title, "First");
    }
}
