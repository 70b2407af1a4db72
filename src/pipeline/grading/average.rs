// Per-subject averages, status classification and required future grade.
// Total over any SanitizedSubject; never fails.

use super::normalize::{round2, MAX_GRADE};
use crate::models::{ComputedSubject, SanitizedSubject, SubjectStatus, GRADE_SLOTS};

/// Passing threshold used when the caller does not supply one.
pub const DEFAULT_MINIMUM_PASSING_GRADE: f64 = 7.0;

/// A partial average at or above this fraction of the threshold is recoverable.
const AT_RISK_FACTOR: f64 = 0.6;

/// Compute averages, status and required future grade for one subject.
///
/// Stored averages (as printed on the report card) win over recomputed ones.
/// The status compares the unrounded partial average against the threshold;
/// only the output values are rounded.
pub fn compute_subject(subject: SanitizedSubject, minimum_passing_grade: f64) -> ComputedSubject {
    let grade_count = subject.grade_count();
    let grades_sum: f64 = subject.recorded_grades().sum();
    let bonus = subject.bonus_points;

    let provisional_average = subject.provisional_average.unwrap_or(if grade_count > 0 {
        grades_sum / grade_count as f64
    } else {
        0.0
    });

    let partial_average = subject
        .partial_average
        .unwrap_or_else(|| (provisional_average + bonus).min(MAX_GRADE));

    let all_recorded = grade_count >= GRADE_SLOTS && subject.grades.iter().all(Option::is_some);

    let mut required_future_grade = None;
    if !all_recorded && grade_count > 0 {
        let missing = (GRADE_SLOTS - grade_count) as f64;
        let current_sum = grades_sum + bonus;
        let target_total = minimum_passing_grade * GRADE_SLOTS as f64;
        let needed = (target_total - current_sum) / missing;
        if needed > 0.0 && needed <= MAX_GRADE {
            required_future_grade = Some(round2(needed));
        }
    }

    let status = if grade_count == 0 {
        required_future_grade = Some(minimum_passing_grade);
        SubjectStatus::NoGrades
    } else if partial_average >= minimum_passing_grade {
        SubjectStatus::Passing
    } else if partial_average >= minimum_passing_grade * AT_RISK_FACTOR {
        SubjectStatus::AtRisk
    } else {
        SubjectStatus::Failing
    };

    ComputedSubject {
        name: subject.name,
        absences: subject.absences,
        grades: subject.grades,
        bonus_points: bonus,
        provisional_average: round2(provisional_average),
        partial_average: round2(partial_average),
        grade_count,
        required_future_grade,
        status,
        minimum_passing_grade,
    }
}

/// Compute every subject against the same threshold, preserving order.
pub fn compute_subjects(
    subjects: Vec<SanitizedSubject>,
    minimum_passing_grade: f64,
) -> Vec<ComputedSubject> {
    subjects
        .into_iter()
        .map(|s| compute_subject(s, minimum_passing_grade))
        .collect()
}
