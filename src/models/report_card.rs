use serde::{Deserialize, Serialize};

use super::enums::SubjectStatus;

/// Assessment slots per subject and term (1ª, 2ª and 3ª AV).
pub const GRADE_SLOTS: usize = 3;

/// One student's report card for one term.
///
/// Generic over the subject record so the same header travels through
/// sanitization (`SanitizedSubject`) and computation (`ComputedSubject`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportCard<S> {
    #[serde(rename = "aluno", default)]
    pub student_name: Option<String>,
    #[serde(rename = "matricula", default)]
    pub registration_id: Option<String>,
    #[serde(rename = "turma", default)]
    pub class_code: Option<String>,
    #[serde(rename = "ano", default)]
    pub year: Option<i32>,
    #[serde(rename = "bimestre", default)]
    pub term: Option<String>,
    #[serde(rename = "disciplinas", default = "Vec::new")]
    pub subjects: Vec<S>,
}

impl<S> ReportCard<S> {
    /// Replace every subject record, keeping the header.
    pub fn map_subjects<T>(self, f: impl FnMut(S) -> T) -> ReportCard<T> {
        ReportCard {
            student_name: self.student_name,
            registration_id: self.registration_id,
            class_code: self.class_code,
            year: self.year,
            term: self.term,
            subjects: self.subjects.into_iter().map(f).collect(),
        }
    }
}

/// A subject record after validation: bounded, on the 0–10 scale, exactly
/// three grade slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizedSubject {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "faltas")]
    pub absences: u32,
    #[serde(rename = "notas")]
    pub grades: [Option<f64>; GRADE_SLOTS],
    #[serde(rename = "pontos_extras")]
    pub bonus_points: f64,
    #[serde(rename = "media_provisoria", default, skip_serializing_if = "Option::is_none")]
    pub provisional_average: Option<f64>,
    #[serde(rename = "media_parcial", default, skip_serializing_if = "Option::is_none")]
    pub partial_average: Option<f64>,
}

impl SanitizedSubject {
    /// Grades that were actually recorded, in slot order.
    pub fn recorded_grades(&self) -> impl Iterator<Item = f64> + '_ {
        self.grades.iter().flatten().copied()
    }

    pub fn grade_count(&self) -> usize {
        self.grades.iter().filter(|g| g.is_some()).count()
    }
}

/// A sanitized subject with averages, status and the grade still needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedSubject {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "faltas")]
    pub absences: u32,
    #[serde(rename = "notas")]
    pub grades: [Option<f64>; GRADE_SLOTS],
    #[serde(rename = "pontos_extras")]
    pub bonus_points: f64,
    #[serde(rename = "media_provisoria")]
    pub provisional_average: f64,
    #[serde(rename = "media_parcial")]
    pub partial_average: f64,
    #[serde(rename = "qtd_notas")]
    pub grade_count: usize,
    #[serde(rename = "nota_necessaria")]
    pub required_future_grade: Option<f64>,
    pub status: SubjectStatus,
    #[serde(rename = "media_minima")]
    pub minimum_passing_grade: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> SanitizedSubject {
        SanitizedSubject {
            name: "MATEMÁTICA".into(),
            absences: 2,
            grades: [Some(9.0), None, Some(7.5)],
            bonus_points: 0.5,
            provisional_average: None,
            partial_average: Some(8.75),
        }
    }

    #[test]
    fn grade_count_ignores_empty_slots() {
        let s = subject();
        assert_eq!(s.grade_count(), 2);
        assert_eq!(s.recorded_grades().collect::<Vec<_>>(), vec![9.0, 7.5]);
    }

    #[test]
    fn sanitized_subject_uses_portuguese_keys() {
        let json = serde_json::to_value(subject()).unwrap();
        assert_eq!(json["nome"], "MATEMÁTICA");
        assert_eq!(json["faltas"], 2);
        assert_eq!(json["notas"], serde_json::json!([9.0, null, 7.5]));
        assert_eq!(json["pontos_extras"], 0.5);
        assert_eq!(json["media_parcial"], 8.75);
        assert!(json.get("media_provisoria").is_none());
    }

    #[test]
    fn map_subjects_keeps_header() {
        let card = ReportCard {
            student_name: Some("ANA SOUZA".into()),
            registration_id: Some("2024001".into()),
            class_code: Some("7A".into()),
            year: Some(2024),
            term: Some("1º Bimestre".into()),
            subjects: vec![subject()],
        };
        let names = card.clone().map_subjects(|s| s.name);
        assert_eq!(names.student_name.as_deref(), Some("ANA SOUZA"));
        assert_eq!(names.year, Some(2024));
        assert_eq!(names.subjects, vec!["MATEMÁTICA".to_string()]);
    }

    #[test]
    fn missing_subject_list_deserializes_empty() {
        let card: ReportCard<SanitizedSubject> =
            serde_json::from_str(r#"{"aluno": "ANA"}"#).unwrap();
        assert!(card.subjects.is_empty());
    }
}
