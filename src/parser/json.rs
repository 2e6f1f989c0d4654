//! JSON record loading: an array of record objects.

use serde_json::Value;

use crate::record::BibliographicRecord;

/// Records decoded from a JSON array, plus per-element skip messages.
#[derive(Debug, Clone, Default)]
pub struct JsonParseResult {
    /// Decoded records, in input order.
    pub records: Vec<BibliographicRecord>,
    /// Elements that were not record objects.
    pub skipped: Vec<String>,
}

/// Decodes `input` as an array of records.
///
/// Elements are decoded one at a time so a single bad element is reported
/// instead of rejecting the file.
///
/// # Errors
///
/// Returns the decode error when `input` is not a JSON array.
#[tracing::instrument(skip(input), fields(input_len = input.len()))]
pub fn parse_json_records(input: &str) -> Result<JsonParseResult, serde_json::Error> {
    let elements: Vec<Value> = serde_json::from_str(input)?;
    let mut result = JsonParseResult::default();
    for (index, element) in elements.into_iter().enumerate() {
        match serde_json::from_value::<BibliographicRecord>(element) {
            Ok(record) => result.records.push(record),
            Err(error) => result
                .skipped
                .push(format!("What: record #{} rejected. Why: {error}.", index + 1)),
        }
    }
    Ok(result)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_records_with_aliases() {
        let input = r#"[
            {"title": "A", "authors": ["Ada"], "identifiers": {"doi": "10.1/a"}},
            {"title": "B", "identifiers": {"arxiv_id": "2101.00001", "url": "https://x.test/b"}, "abstract": "text", "year": 2021}
        ]"#;
        let result = parse_json_records(input).unwrap();
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].doi(), Some("10.1/a"));
        let second = &result.records[1];
        assert_eq!(second.identifiers.preprint_id.as_deref(), Some("2101.00001"));
        assert_eq!(second.landing_url(), Some("https://x.test/b"));
        assert_eq!(second.abstract_text.as_deref(), Some("text"));
        assert_eq!(second.year, Some(2021));
    }

    #[test]
    fn test_bad_element_is_skipped() {
        let result = parse_json_records(r#"[{"title": "ok"}, 42]"#).unwrap();
        assert_eq!(result.records.len(), 1);
        assert!(result.skipped[0].starts_with("What: record #2 rejected"));
    }

    #[test]
    fn test_non_array_is_an_error() {
        assert!(parse_json_records(r#"{"title": "x"}"#).is_err());
    }
}
