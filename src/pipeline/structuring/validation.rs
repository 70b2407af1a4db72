// Post-parse sanitization of model-extracted report cards.
// Applied between recover_json_object() and grade computation.
// Untrusted input: wrong types, missing fields and duplicate subjects degrade
// gracefully. Only a non-object root is an error.

use std::collections::HashMap;

use chrono::Datelike;
use serde_json::{Map, Value};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use super::InvalidReportCardError;
use crate::models::{ReportCard, SanitizedSubject, GRADE_SLOTS};
use crate::pipeline::grading::{normalize, GradeField};

/// Upper bound for a plausible absence count.
const MAX_ABSENCES: f64 = 200.0;

/// Earliest accepted school year.
const MIN_YEAR: i32 = 1900;

const NAME_KEYS: &[&str] = &["nome", "name"];
const ABSENCE_KEYS: &[&str] = &["faltas"];
const GRADE_KEYS: &[&str] = &["notas"];
const BONUS_KEYS: &[&str] = &["pontos_extras", "pontosExtras"];
const PROVISIONAL_KEYS: &[&str] = &["media_provisoria", "mediaProvisoria"];
const PARTIAL_KEYS: &[&str] = &["media_parcial", "mediaParcial"];

/// Sanitize a recovered JSON value into a report card.
///
/// Subjects without a usable name are skipped. Duplicates (same name once
/// accents, case and spacing are ignored) collapse to the record with more
/// grades; on a tie the first one wins and keeps its position.
pub fn sanitize_report_card(
    raw: &Value,
) -> Result<ReportCard<SanitizedSubject>, InvalidReportCardError> {
    let obj = raw.as_object().ok_or_else(|| {
        InvalidReportCardError(format!("expected a JSON object, got {}", json_kind(raw)))
    })?;

    let subjects = match obj.get("disciplinas") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => sanitize_subjects(items),
        Some(other) => {
            tracing::warn!(
                kind = json_kind(other),
                "Subject list is not an array, treating as empty"
            );
            Vec::new()
        }
    };

    Ok(ReportCard {
        student_name: header_string(obj.get("aluno"), false),
        registration_id: header_string(obj.get("matricula"), true),
        class_code: header_string(obj.get("turma"), false),
        year: obj.get("ano").and_then(school_year),
        term: header_string(obj.get("bimestre"), false),
        subjects,
    })
}

/// Sanitize and deduplicate a list of raw subject records.
pub fn sanitize_subjects(items: &[Value]) -> Vec<SanitizedSubject> {
    let mut kept: Vec<SanitizedSubject> = Vec::with_capacity(items.len());
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;
    let mut replaced = 0usize;

    for item in items {
        let Some(subject) = sanitize_subject(item) else {
            skipped += 1;
            continue;
        };

        let identity = subject_identity(&subject.name);
        match slots.get(&identity) {
            Some(&idx) => {
                if subject.grade_count() > kept[idx].grade_count() {
                    kept[idx] = subject;
                }
                replaced += 1;
            }
            None => {
                slots.insert(identity, kept.len());
                kept.push(subject);
            }
        }
    }

    if skipped > 0 || replaced > 0 {
        tracing::debug!(
            kept = kept.len(),
            skipped,
            duplicates = replaced,
            "Subject list sanitized"
        );
    }

    kept
}

/// Sanitize one raw subject record. `None` when it has no usable name.
pub fn sanitize_subject(raw: &Value) -> Option<SanitizedSubject> {
    let obj = raw.as_object()?;

    let name = field(obj, NAME_KEYS)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())?
        .to_string();

    Some(SanitizedSubject {
        name,
        absences: field(obj, ABSENCE_KEYS).map(absences).unwrap_or(0),
        grades: grades(field(obj, GRADE_KEYS)),
        bonus_points: field(obj, BONUS_KEYS)
            .and_then(as_number)
            .and_then(|v| normalize(v, GradeField::BonusPoints))
            .unwrap_or(0.0),
        provisional_average: field(obj, PROVISIONAL_KEYS)
            .and_then(as_number)
            .and_then(|v| normalize(v, GradeField::ProvisionalAverage)),
        partial_average: field(obj, PARTIAL_KEYS)
            .and_then(as_number)
            .and_then(|v| normalize(v, GradeField::PartialAverage)),
    })
}

/// Identity used for duplicate detection: accents stripped, lowercased,
/// inner whitespace collapsed.
pub fn subject_identity(name: &str) -> String {
    let folded: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First present, non-null value among `keys`.
fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

/// Numbers, or numeric strings with `.` or `,` as decimal separator.
fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+')) {
                return None;
            }
            s.replace(',', ".").parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn absences(value: &Value) -> u32 {
    let total = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(as_number)
            .filter(|n| *n >= 0.0)
            .sum(),
        other => as_number(other).unwrap_or(0.0),
    };
    total.clamp(0.0, MAX_ABSENCES) as u32
}

fn grades(value: Option<&Value>) -> [Option<f64>; GRADE_SLOTS] {
    let mut out = [None; GRADE_SLOTS];
    if let Some(Value::Array(items)) = value {
        for (slot, item) in out.iter_mut().zip(items.iter()) {
            *slot = as_number(item).and_then(|v| normalize(v, GradeField::Grade));
        }
    }
    out
}

fn header_string(value: Option<&Value>, allow_number: bool) -> Option<String> {
    match value? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) if allow_number => Some(n.to_string()),
        _ => None,
    }
}

fn school_year(value: &Value) -> Option<i32> {
    let year = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => {
                let f = n.as_f64()?;
                if f.fract() != 0.0 {
                    return None;
                }
                f as i64
            }
        },
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    let latest = i64::from(chrono::Local::now().year()) + 1;
    (i64::from(MIN_YEAR)..=latest)
        .contains(&year)
        .then_some(year as i32)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_object_root_is_rejected() {
        let err = sanitize_report_card(&json!([1, 2])).unwrap_err();
        assert!(err.0.contains("array"));
        assert!(sanitize_report_card(&json!("boletim")).is_err());
    }

    #[test]
    fn non_array_subjects_become_empty() {
        let card = sanitize_report_card(&json!({"aluno": "ANA", "disciplinas": "nenhuma"})).unwrap();
        assert!(card.subjects.is_empty());
        assert_eq!(card.student_name.as_deref(), Some("ANA"));
    }

    #[test]
    fn missing_subjects_become_empty() {
        let card = sanitize_report_card(&json!({})).unwrap();
        assert!(card.subjects.is_empty());
        assert!(card.student_name.is_none());
    }

    #[test]
    fn nameless_subjects_are_skipped() {
        let card = sanitize_report_card(&json!({"disciplinas": [
            {"nome": "  ", "notas": [9]},
            {"notas": [8]},
            {"nome": 42},
            "ARTE",
            {"nome": "ARTE", "notas": [10]}
        ]}))
        .unwrap();
        assert_eq!(card.subjects.len(), 1);
        assert_eq!(card.subjects[0].name, "ARTE");
    }

    #[test]
    fn duplicates_keep_the_record_with_more_grades() {
        let card = sanitize_report_card(&json!({"disciplinas": [
            {"nome": "Física I", "notas": [7.0, null, null]},
            {"nome": "HISTÓRIA", "notas": [9.0]},
            {"nome": "física i", "notas": [6.0, 8.0, 9.0]}
        ]}))
        .unwrap();
        assert_eq!(card.subjects.len(), 2);
        assert_eq!(card.subjects[0].name, "física i");
        assert_eq!(card.subjects[0].grades, [Some(6.0), Some(8.0), Some(9.0)]);
        assert_eq!(card.subjects[1].name, "HISTÓRIA");
    }

    #[test]
    fn duplicate_tie_keeps_first() {
        let subjects = sanitize_subjects(&[
            json!({"nome": "Química", "notas": [7.0]}),
            json!({"nome": "QUIMICA", "notas": [2.0]}),
        ]);
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].name, "Química");
        assert_eq!(subjects[0].grades[0], Some(7.0));
    }

    #[test]
    fn identity_ignores_accents_case_and_spacing() {
        assert_eq!(subject_identity("  Língua   Portuguesa "), "lingua portuguesa");
        assert_eq!(subject_identity("EDUCAÇÃO FÍSICA"), subject_identity("educacao fisica"));
    }

    #[test]
    fn absences_from_list_and_scalar() {
        let list = sanitize_subject(&json!({"nome": "A", "faltas": [2, -1, "x", 3]})).unwrap();
        assert_eq!(list.absences, 5);
        let big = sanitize_subject(&json!({"nome": "A", "faltas": 999})).unwrap();
        assert_eq!(big.absences, 200);
        let neg = sanitize_subject(&json!({"nome": "A", "faltas": -4})).unwrap();
        assert_eq!(neg.absences, 0);
        let frac = sanitize_subject(&json!({"nome": "A", "faltas": 3.9})).unwrap();
        assert_eq!(frac.absences, 3);
        let junk = sanitize_subject(&json!({"nome": "A", "faltas": {"total": 2}})).unwrap();
        assert_eq!(junk.absences, 0);
    }

    #[test]
    fn grades_are_truncated_normalized_and_padded() {
        let s = sanitize_subject(&json!({"nome": "A", "notas": [95, "8,5", "-", 7, 6]})).unwrap();
        assert_eq!(s.grades, [Some(9.5), Some(8.5), None]);

        let short = sanitize_subject(&json!({"nome": "A", "notas": [105]})).unwrap();
        assert_eq!(short.grades, [None, None, None]);

        let scalar = sanitize_subject(&json!({"nome": "A", "notas": 9})).unwrap();
        assert_eq!(scalar.grades, [None, None, None]);
    }

    #[test]
    fn bonus_defaults_and_clamps() {
        let missing = sanitize_subject(&json!({"nome": "A"})).unwrap();
        assert_eq!(missing.bonus_points, 0.0);
        let high = sanitize_subject(&json!({"nome": "A", "pontos_extras": 12})).unwrap();
        assert_eq!(high.bonus_points, 10.0);
        let alias = sanitize_subject(&json!({"nome": "A", "pontosExtras": "0,5"})).unwrap();
        assert_eq!(alias.bonus_points, 0.5);
    }

    #[test]
    fn rejected_averages_are_dropped() {
        let s = sanitize_subject(&json!({
            "nome": "A",
            "media_provisoria": 250,
            "mediaParcial": 87
        }))
        .unwrap();
        assert_eq!(s.provisional_average, None);
        assert_eq!(s.partial_average, Some(8.7));
    }

    #[test]
    fn header_fields_are_cleaned() {
        let card = sanitize_report_card(&json!({
            "aluno": "  ANA SOUZA ",
            "matricula": 2024001,
            "turma": "",
            "ano": "2024",
            "bimestre": "1º Bimestre"
        }))
        .unwrap();
        assert_eq!(card.student_name.as_deref(), Some("ANA SOUZA"));
        assert_eq!(card.registration_id.as_deref(), Some("2024001"));
        assert!(card.class_code.is_none());
        assert_eq!(card.year, Some(2024));
        assert_eq!(card.term.as_deref(), Some("1º Bimestre"));
    }

    #[test]
    fn implausible_years_are_dropped() {
        for ano in [json!(1800), json!(9999), json!(2024.5), json!("vinte")] {
            let card = sanitize_report_card(&json!({"ano": ano})).unwrap();
            assert!(card.year.is_none());
        }
    }

    #[test]
    fn sanitizing_twice_changes_nothing() {
        let raw = json!({
            "aluno": "ANA",
            "matricula": "123",
            "ano": 2024,
            "disciplinas": [
                {"nome": "Matemática", "faltas": [1, 2], "notas": [95, 7.333], "pontos_extras": 0.755},
                {"nome": "matematica", "notas": [8]},
                {"nome": "ARTE", "notas": [10, 9.5, null], "media_parcial": 97.5}
            ]
        });
        let once = sanitize_report_card(&raw).unwrap();
        let twice = sanitize_report_card(&serde_json::to_value(&once).unwrap()).unwrap();
        assert_eq!(once, twice);
    }
}
