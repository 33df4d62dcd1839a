//! JSON repair: turn a raw model reply into validated [`AnalysisResult`]s.
//!
//! Even with a prompt that says "JSON only", chat models regularly wrap the
//! array in ```` ```json ```` fences, add a sentence of commentary, leave a
//! trailing comma after the last record, or stop one `}` short. The passes
//! here fix exactly those quirks and nothing more:
//!
//! 1. Strip markdown fence markers
//! 2. Slice from the first `[` to the last `]`
//! 3. Drop trailing commas before `]` / `}`
//! 4. Close the array and any unclosed records
//! 5. Parse strictly into `Vec<AnalysisResult>`
//!
//! ## Limits
//!
//! This is a heuristic, not a JSON healer. It does not fix unescaped quotes
//! or truncated strings, and braces, brackets, or `, ]` sequences inside
//! string values are counted and rewritten like structural ones.

use crate::error::AnalysisError;
use crate::model::AnalysisResult;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Extract, repair and parse the analysis array from a model reply.
pub fn extract(raw: &str) -> Result<Vec<AnalysisResult>, AnalysisError> {
    let candidate = locate_array(raw)?;
    let repaired = repair_json(&candidate);
    debug!("Repaired analysis JSON: {}", repaired);
    parse_records(&repaired)
}

// ── Pass 1: Strip fences ─────────────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)```(?:json)?\s*").unwrap());

fn strip_code_fences(input: &str) -> String {
    RE_FENCE.replace_all(input, "").to_string()
}

// ── Pass 2: Locate the array ─────────────────────────────────────────────────

/// Return the fence-free text between the first `[` and the last `]`, inclusive.
pub fn locate_array(raw: &str) -> Result<String, AnalysisError> {
    let content = strip_code_fences(raw.trim());
    match (content.find('['), content.rfind(']')) {
        (Some(start), Some(end)) if end > start => Ok(content[start..=end].to_string()),
        _ => Err(AnalysisError::Extraction(format!(
            "No JSON array found in AI response: {}",
            preview(&content)
        ))),
    }
}

fn preview(s: &str) -> String {
    const MAX: usize = 200;
    match s.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}\u{2026}", &s[..cut]),
        None => s.to_string(),
    }
}

// ── Passes 3–4: Repair ───────────────────────────────────────────────────────

static RE_COMMA_BEFORE_BRACKET: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\]").unwrap());
static RE_COMMA_BEFORE_BRACE: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\}").unwrap());

/// Best-effort repair of a candidate JSON array.
///
/// Removes trailing commas, makes sure the text ends with `]`, and adds the
/// `}`s needed to balance `{`. When `[`/`]` already balance, the missing
/// braces go before the final `]` (a record lost its closing brace); when
/// the final `]` closed an inner list, they are appended followed by one `]`.
pub fn repair_json(candidate: &str) -> String {
    let s = RE_COMMA_BEFORE_BRACKET.replace_all(candidate, "]");
    let s = RE_COMMA_BEFORE_BRACE.replace_all(&s, "}");

    let mut json = s.trim().to_string();
    if !json.ends_with(']') {
        json.push(']');
    }

    let open = json.matches('{').count();
    let close = json.matches('}').count();
    if close >= open {
        return json;
    }
    let braces = "}".repeat(open - close);

    if json.matches('[').count() > json.matches(']').count() {
        json.push_str(&braces);
        json.push(']');
    } else {
        json.pop();
        json.push_str(&braces);
        json.push(']');
    }
    json
}

// ── Pass 5: Parse ────────────────────────────────────────────────────────────

fn parse_records(json: &str) -> Result<Vec<AnalysisResult>, AnalysisError> {
    serde_json::from_str(json).map_err(|e| AnalysisError::Parse {
        message: e.to_string(),
        json: json.to_string(),
    })
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str =
        r#"[{"Topic":"Algebra","Total_Marks":10,"Important_Subtopics":["Linear Equations"]}]"#;

    fn algebra() -> Vec<AnalysisResult> {
        vec![AnalysisResult {
            topic: "Algebra".into(),
            total_marks: 10,
            important_subtopics: vec!["Linear Equations".into()],
        }]
    }

    #[test]
    fn test_well_formed_reply() {
        assert_eq!(extract(WELL_FORMED).unwrap(), algebra());
    }

    #[test]
    fn test_json_fences_are_stripped() {
        let fenced = format!("```json\n{WELL_FORMED}\n```");
        assert_eq!(extract(&fenced).unwrap(), extract(WELL_FORMED).unwrap());
    }

    #[test]
    fn test_plain_fences_are_stripped() {
        let fenced = format!("```\n{WELL_FORMED}\n```\n");
        assert_eq!(extract(&fenced).unwrap(), algebra());
    }

    #[test]
    fn test_uppercase_fence_tag() {
        let fenced = format!("```JSON\n{WELL_FORMED}```");
        assert_eq!(extract(&fenced).unwrap(), algebra());
    }

    #[test]
    fn test_commentary_around_array() {
        let raw = format!("Here is the analysis you asked for:\n{WELL_FORMED}\nHope this helps!");
        assert_eq!(extract(&raw).unwrap(), algebra());
    }

    #[test]
    fn test_trailing_comma_before_bracket() {
        let raw =
            r#"[{"Topic":"Algebra","Total_Marks":10,"Important_Subtopics":["Linear Equations"]}, ]"#;
        assert_eq!(extract(raw).unwrap(), algebra());
    }

    #[test]
    fn test_trailing_comma_inside_record() {
        let raw =
            r#"[{"Topic":"Algebra","Total_Marks":10,"Important_Subtopics":["Linear Equations",],}]"#;
        assert_eq!(extract(raw).unwrap(), algebra());
    }

    #[test]
    fn test_missing_closing_brace() {
        let raw =
            r#"[{"Topic":"Algebra","Total_Marks":10,"Important_Subtopics":["Linear Equations"]]"#;
        assert_eq!(extract(raw).unwrap(), algebra());
    }

    #[test]
    fn test_truncated_after_inner_list() {
        let raw =
            r#"[{"Topic":"Algebra","Total_Marks":10,"Important_Subtopics":["Linear Equations"]"#;
        assert_eq!(repair_json(&locate_array(raw).unwrap()), WELL_FORMED);
        assert_eq!(extract(raw).unwrap(), algebra());
    }

    #[test]
    fn test_repair_leaves_valid_json_alone() {
        assert_eq!(repair_json(WELL_FORMED), WELL_FORMED);
    }

    #[test]
    fn test_multiple_records_keep_order() {
        let raw = r#"[
            {"Topic":"Algebra","Total_Marks":10,"Important_Subtopics":["Linear Equations","Quadratics"]},
            {"Topic":"Geometry","Total_Marks":5,"Important_Subtopics":[]},
        ]"#;
        let parsed = extract(raw).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].important_subtopics, vec!["Linear Equations", "Quadratics"]);
        assert_eq!(parsed[1].topic, "Geometry");
    }

    #[test]
    fn test_empty_array() {
        assert!(extract("[]").unwrap().is_empty());
    }

    #[test]
    fn test_no_array_is_extraction_error() {
        let err = extract("I could not find any topics.").unwrap_err();
        assert!(matches!(err, AnalysisError::Extraction(_)), "got: {err:?}");
    }

    #[test]
    fn test_reversed_brackets_is_extraction_error() {
        let err = extract("] nothing here [").unwrap_err();
        assert!(matches!(err, AnalysisError::Extraction(_)), "got: {err:?}");
    }

    #[test]
    fn test_unknown_field_is_parse_error_with_json() {
        let raw = r#"[{"Topic":"Algebra","Total_Marks":10,"Important_Subtopics":[],"Reason":"x"}]"#;
        match extract(raw).unwrap_err() {
            AnalysisError::Parse { json, .. } => assert!(json.contains("Reason")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_numeric_marks_is_parse_error() {
        let raw = r#"[{"Topic":"Algebra","Total_Marks":"ten","Important_Subtopics":[]}]"#;
        assert!(matches!(
            extract(raw).unwrap_err(),
            AnalysisError::Parse { .. }
        ));
    }

    fn marks_of(value: &str) -> i64 {
        let raw = format!(
            r#"[{{"Topic":"Algebra","Total_Marks":{value},"Important_Subtopics":[]}}]"#
        );
        extract(&raw).unwrap()[0].total_marks
    }

    #[test]
    fn test_whole_float_marks() {
        assert_eq!(marks_of("10.0"), 10);
    }

    #[test]
    fn test_half_marks_are_truncated() {
        assert_eq!(marks_of("7.5"), 7);
    }

    #[test]
    fn test_numeric_string_marks() {
        assert_eq!(marks_of(r#""10""#), 10);
        assert_eq!(marks_of(r#"" 4.5 ""#), 4);
    }

    #[test]
    fn test_null_marks_count_as_zero() {
        assert_eq!(marks_of("null"), 0);
    }

    #[test]
    fn test_structured_marks_is_parse_error() {
        let raw = r#"[{"Topic":"Algebra","Total_Marks":[10],"Important_Subtopics":[]}]"#;
        assert!(matches!(
            extract(raw).unwrap_err(),
            AnalysisError::Parse { .. }
        ));
    }

    #[test]
    fn test_preview_truncates_long_text() {
        let long = "x".repeat(500);
        let p = preview(&long);
        assert!(p.ends_with('\u{2026}'));
        assert_eq!(p.chars().count(), 201);
    }
}
