// Converts grades that may come on a 0–100 scale onto the canonical 0–10 scale.
// Values above 10 are assumed to be ×10-scaled (e.g. 95 → 9.5). This is a
// source-data-quality assumption: a genuine 10.5 typo also becomes 1.05.

/// Upper bound of the canonical grade scale.
pub const MAX_GRADE: f64 = 10.0;

/// Upper bound accepted as a ×10-scaled grade.
const MAX_SCALED_GRADE: f64 = 100.0;

/// Which field a raw number belongs to. Bonus points follow a clamping rule;
/// every other field follows the scale-detection rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeField {
    Grade,
    ProvisionalAverage,
    PartialAverage,
    BonusPoints,
}

/// Round half away from zero to 2 decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Normalize a raw value for `field`. `None` means the value is outside
/// every accepted domain and must be treated as missing.
pub fn normalize(value: f64, field: GradeField) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    match field {
        GradeField::BonusPoints => Some(round2(value.clamp(0.0, MAX_GRADE))),
        GradeField::Grade | GradeField::ProvisionalAverage | GradeField::PartialAverage => {
            normalize_scaled(value)
        }
    }
}

/// Single-grade rule shortcut.
pub fn normalize_grade(value: f64) -> Option<f64> {
    normalize(value, GradeField::Grade)
}

fn normalize_scaled(value: f64) -> Option<f64> {
    if (0.0..=MAX_GRADE).contains(&value) {
        return Some(round2(value));
    }
    if value > MAX_GRADE && value <= MAX_SCALED_GRADE {
        let scaled = value / 10.0;
        return (scaled <= MAX_GRADE).then(|| round2(scaled));
    }
    None
}
