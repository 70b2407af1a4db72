// Recovers a JSON object from free-text model output.
//
// Strategies run in order and each one is a standalone function:
//   1. strip code fences, parse as-is
//   2. parse the first complete value starting at the first `{`
//   3. close an unterminated string, drop dangling commas, append missing closers
//   4. cut back to the last fully-closed record followed by a comma and re-close
// A partially typed structure is never returned as success.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::MalformedExtractionError;

/// Characters kept from each end of the raw text for diagnostics.
const DIAGNOSTIC_EXCERPT_CHARS: usize = 200;

/// Upper bound on truncation points tried by strategy 4.
const MAX_TRUNCATION_ATTEMPTS: usize = 64;

/// `"nome": "..."` or `"name": "..."`, escapes allowed inside the value.
static SUBJECT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:nome|name)"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("static regex")
});

/// Recover a JSON object from raw model output.
pub fn recover_json_object(raw: &str) -> Result<Value, MalformedExtractionError> {
    let unfenced = strip_code_fences(raw);
    if let Some(value) = parse_object(unfenced) {
        return Ok(value);
    }

    if let Some(from_brace) = from_first_brace(unfenced) {
        if let Some(value) = parse_leading_object(from_brace) {
            tracing::debug!("JSON recovered after discarding surrounding prose");
            return Ok(value);
        }

        if let Some(value) = repair_structure(from_brace).and_then(|t| parse_object(&t)) {
            tracing::debug!("JSON recovered by structural repair");
            return Ok(value);
        }

        if let Some(value) = truncate_to_last_record(from_brace) {
            tracing::debug!("JSON recovered by truncating to the last complete record");
            return Ok(value);
        }
    }

    Err(malformed(raw))
}

/// Strategy 1 input: remove a surrounding ```` ``` ```` / ```` ```json ```` fence.
/// An unclosed opening fence (truncated output) keeps everything after it.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = trimmed[start + 3..].trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    match after.find("```") {
        Some(end) => after[..end].trim(),
        None => after.trim(),
    }
}

/// Parse `text` as a whole; only objects count.
pub fn parse_object(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(Value::is_object)
}

/// Slice from the first `{`, dropping any preamble.
pub fn from_first_brace(text: &str) -> Option<&str> {
    text.find('{').map(|i| &text[i..])
}

/// Strategy 2: parse the first complete value and ignore whatever trails it.
pub fn parse_leading_object(text: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()
        .and_then(Result::ok)
        .filter(Value::is_object)
}

/// Strategy 3: close what the text left open. Returns `None` when the text
/// has a closer that does not match its opener.
pub fn repair_structure(text: &str) -> Option<String> {
    let scan = scan_structure(text)?;
    let mut repaired = text.to_string();

    if scan.in_string {
        if scan.escaped {
            repaired.pop();
        }
        repaired.push('"');
    }

    strip_dangling_commas(&mut repaired);
    repaired.extend(scan.open.iter().rev());
    Some(repaired)
}

/// Strategy 4: cut after the last `}` that is followed by a comma (a closed
/// record inside a list) and re-close the enclosing structures. Earlier cut
/// points are tried when the latest one does not parse.
pub fn truncate_to_last_record(text: &str) -> Option<Value> {
    record_boundaries(text)
        .into_iter()
        .rev()
        .take(MAX_TRUNCATION_ATTEMPTS)
        .find_map(|cut| {
            let prefix = &text[..cut];
            let scan = scan_structure(prefix)?;
            if scan.in_string {
                return None;
            }
            let mut candidate = prefix.to_string();
            candidate.extend(scan.open.iter().rev());
            parse_object(&candidate)
        })
}

/// Best-effort list of subject names found in unparseable output.
pub fn partial_subject_names(text: &str) -> Vec<String> {
    SUBJECT_NAME
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn malformed(raw: &str) -> MalformedExtractionError {
    let partial_subjects = partial_subject_names(raw);
    tracing::warn!(
        raw_len = raw.len(),
        partial_subjects = partial_subjects.len(),
        "Model output could not be recovered as JSON"
    );
    MalformedExtractionError {
        head: head_chars(raw, DIAGNOSTIC_EXCERPT_CHARS),
        tail: tail_chars(raw, DIAGNOSTIC_EXCERPT_CHARS),
        partial_subjects,
    }
}

/// Bracket state at the end of a text.
struct StructureScan {
    /// Expected closers, outermost first.
    open: Vec<char>,
    in_string: bool,
    escaped: bool,
}

fn scan_structure(text: &str) -> Option<StructureScan> {
    let mut open = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                if open.pop() != Some(c) {
                    return None;
                }
            }
            _ => {}
        }
    }

    Some(StructureScan {
        open,
        in_string,
        escaped,
    })
}

/// Byte offsets just past each `}` that is followed (after whitespace) by `,`.
fn record_boundaries(text: &str) -> Vec<usize> {
    let mut cuts = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut pending: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if let Some(cut) = pending {
            if c == ',' {
                cuts.push(cut);
                pending = None;
                continue;
            }
            if !c.is_whitespace() {
                pending = None;
            }
        }
        match c {
            '"' => in_string = true,
            '}' => pending = Some(i + c.len_utf8()),
            _ => {}
        }
    }

    cuts
}

fn strip_dangling_commas(text: &mut String) {
    loop {
        let trimmed_len = text.trim_end().len();
        text.truncate(trimmed_len);
        if text.ends_with(',') {
            text.pop();
        } else {
            break;
        }
    }
}

fn head_chars(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

fn tail_chars(text: &str, n: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUNCATED: &str =
        r#"{"disciplinas":[{"nome":"MATEMATICA","notas":[9,8,null]},{"nome":"FISICA","no"#;

    fn subject_names(value: &Value) -> Vec<String> {
        value["disciplinas"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["nome"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn plain_object_parses_directly() {
        let v = recover_json_object(r#"{"aluno": "ANA", "disciplinas": []}"#).unwrap();
        assert_eq!(v["aluno"], "ANA");
    }

    #[test]
    fn fenced_with_language_tag() {
        let raw = "```json\n{\"disciplinas\": [{\"nome\": \"ARTE\"}]}\n```";
        assert_eq!(strip_code_fences(raw), "{\"disciplinas\": [{\"nome\": \"ARTE\"}]}");
        let v = recover_json_object(raw).unwrap();
        assert_eq!(subject_names(&v), vec!["ARTE"]);
    }

    #[test]
    fn fenced_without_language_tag() {
        let raw = "```\n{\"ano\": 2024}\n```";
        assert_eq!(strip_code_fences(raw), "{\"ano\": 2024}");
    }

    #[test]
    fn unclosed_fence_keeps_remainder() {
        let raw = "```json\n{\"ano\": 2024";
        assert_eq!(strip_code_fences(raw), "{\"ano\": 2024");
        assert_eq!(recover_json_object(raw).unwrap()["ano"], 2024);
    }

    #[test]
    fn preamble_and_trailing_prose_are_discarded() {
        let raw = "Aqui está o JSON extraído:\n{\"turma\": \"7A\"}\nEspero ter ajudado!";
        assert!(parse_object(raw).is_none());
        let from = from_first_brace(raw).unwrap();
        assert_eq!(parse_leading_object(from).unwrap()["turma"], "7A");
        assert_eq!(recover_json_object(raw).unwrap()["turma"], "7A");
    }

    #[test]
    fn leading_array_is_not_an_object() {
        assert!(parse_leading_object("[1, 2]").is_none());
        assert!(parse_object("[1, 2]").is_none());
    }

    #[test]
    fn repair_closes_open_brackets_innermost_first() {
        let repaired = repair_structure(r#"{"disciplinas":[{"nome":"A","notas":[9,8"#).unwrap();
        assert_eq!(repaired, r#"{"disciplinas":[{"nome":"A","notas":[9,8]}]}"#);
    }

    #[test]
    fn repair_closes_unterminated_string() {
        let repaired = repair_structure(r#"{"aluno":"ANA SOU"#).unwrap();
        assert_eq!(repaired, r#"{"aluno":"ANA SOU"}"#);
    }

    #[test]
    fn repair_drops_dangling_commas() {
        let repaired = repair_structure("{\"notas\":[9,8, ,\n").unwrap();
        assert_eq!(repaired, "{\"notas\":[9,8]}");
    }

    #[test]
    fn repair_ignores_brackets_inside_strings() {
        let repaired = repair_structure(r#"{"nome":"HISTÓRIA {I}","notas":["#).unwrap();
        assert_eq!(repaired, r#"{"nome":"HISTÓRIA {I}","notas":[]}"#);
    }

    #[test]
    fn repair_rejects_mismatched_closer() {
        assert!(repair_structure(r#"{"notas":[9,8}"#).is_none());
    }

    #[test]
    fn truncation_keeps_last_complete_record() {
        let v = truncate_to_last_record(TRUNCATED).unwrap();
        assert_eq!(subject_names(&v), vec!["MATEMATICA"]);
    }

    #[test]
    fn truncated_document_recovers_complete_subjects() {
        let v = recover_json_object(TRUNCATED).unwrap();
        assert_eq!(subject_names(&v), vec!["MATEMATICA"]);
        assert_eq!(v["disciplinas"][0]["notas"], serde_json::json!([9, 8, null]));
    }

    #[test]
    fn truncation_falls_back_to_earlier_boundary() {
        // The second record is missing a comma, so only the first cut parses.
        let raw = r#"{"disciplinas":[{"nome":"A"},{"nome":"B" "faltas":{"x":1},"no"#;
        let v = truncate_to_last_record(raw).unwrap();
        assert_eq!(subject_names(&v), vec!["A"]);
    }

    #[test]
    fn record_boundaries_skip_braces_in_strings() {
        let text = r#"{"a":[{"n":"},"},{"n":"x"},"#;
        let cuts = record_boundaries(text);
        assert_eq!(cuts.len(), 2);
        assert_eq!(&text[..cuts[0]], r#"{"a":[{"n":"},"}"#);
    }

    #[test]
    fn unrecoverable_text_reports_diagnostics() {
        let raw = r#"Não consegui ler o boletim. "nome": "MATEMÁTICA", "nome": "FÍSICA I" ..."#;
        let err = recover_json_object(raw).unwrap_err();
        assert_eq!(err.partial_subjects, vec!["MATEMÁTICA", "FÍSICA I"]);
        assert!(err.head.starts_with("Não consegui"));
        assert!(err.tail.ends_with("..."));
    }

    #[test]
    fn partial_names_accept_alias_key_and_escapes() {
        let text = r#"{"name": "ARTE", "nome" : "LÍNGUA \"PORTUGUESA\"", "nota": "x"#;
        assert_eq!(
            partial_subject_names(text),
            vec!["ARTE".to_string(), r#"LÍNGUA \"PORTUGUESA\""#.to_string()]
        );
        assert!(partial_subject_names("sem nomes").is_empty());
    }

    #[test]
    fn excerpts_are_bounded_and_char_safe() {
        let raw = "é".repeat(500);
        let err = recover_json_object(&raw).unwrap_err();
        assert_eq!(err.head.chars().count(), DIAGNOSTIC_EXCERPT_CHARS);
        assert_eq!(err.tail.chars().count(), DIAGNOSTIC_EXCERPT_CHARS);
    }

    #[test]
    fn empty_output_is_malformed() {
        let err = recover_json_object("   ").unwrap_err();
        assert!(err.partial_subjects.is_empty());
    }
}
