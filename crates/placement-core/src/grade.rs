use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{OverallStatus, SubjectStatus};
use crate::PlacementError;

const MAX_GRADE_POINT: u8 = 10;

/// One row of the boundary table: a percentage at or above `min_percent`
/// earns `letter` and `grade_point`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradeBand {
    pub min_percent: f64,
    pub letter: String,
    pub grade_point: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Grade {
    pub letter: String,
    pub grade_point: u8,
}

/// Boundary table evaluated top-down, first match wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradingScale {
    pub bands: Vec<GradeBand>,
    pub fail_letter: String,
    pub pass_percent: f64,
}

impl GradingScale {
    #[must_use]
    pub fn standard() -> Self {
        let band = |min_percent: f64, letter: &str, grade_point: u8| GradeBand {
            min_percent,
            letter: letter.to_string(),
            grade_point,
        };

        Self {
            bands: vec![
                band(90.0, "A+", 10),
                band(80.0, "A", 9),
                band(70.0, "B+", 8),
                band(60.0, "B", 7),
                band(50.0, "C+", 6),
                band(40.0, "C", 5),
            ],
            fail_letter: "F".to_string(),
            pass_percent: 40.0,
        }
    }

    /// Validates band ordering and numeric bounds.
    ///
    /// # Errors
    /// Returns [`PlacementError::Configuration`] when bands are empty, not
    /// strictly descending, out of range, or award more points to a lower band.
    pub fn validate(&self) -> Result<(), PlacementError> {
        if self.bands.is_empty() {
            return Err(PlacementError::Configuration(
                "grading scale MUST define at least one band".to_string(),
            ));
        }

        if self.fail_letter.trim().is_empty() {
            return Err(PlacementError::Configuration(
                "fail_letter MUST be provided".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.pass_percent) {
            return Err(PlacementError::Configuration(
                "pass_percent MUST be in [0, 100]".to_string(),
            ));
        }

        let mut previous: Option<&GradeBand> = None;
        for band in &self.bands {
            if band.letter.trim().is_empty() {
                return Err(PlacementError::Configuration(
                    "band letter MUST be provided".to_string(),
                ));
            }

            if !(band.min_percent > 0.0 && band.min_percent <= 100.0) {
                return Err(PlacementError::Configuration(format!(
                    "band {} min_percent MUST be in (0, 100]",
                    band.letter
                )));
            }

            if band.grade_point > MAX_GRADE_POINT {
                return Err(PlacementError::Configuration(format!(
                    "band {} grade_point MUST be <= {MAX_GRADE_POINT}",
                    band.letter
                )));
            }

            if let Some(prev) = previous {
                if band.min_percent >= prev.min_percent {
                    return Err(PlacementError::Configuration(
                        "band min_percent MUST be strictly descending".to_string(),
                    ));
                }
                if band.grade_point > prev.grade_point {
                    return Err(PlacementError::Configuration(
                        "band grade_point MUST NOT increase down the table".to_string(),
                    ));
                }
            }

            if self.bands.iter().filter(|b| b.letter == band.letter).count() > 1 {
                return Err(PlacementError::Configuration(format!(
                    "band letter {} is defined more than once",
                    band.letter
                )));
            }

            previous = Some(band);
        }

        if self.bands.iter().any(|band| band.letter == self.fail_letter) {
            return Err(PlacementError::Configuration(
                "fail_letter MUST differ from every band letter".to_string(),
            ));
        }

        Ok(())
    }

    /// Decodes and validates a scale from JSON.
    ///
    /// # Errors
    /// Returns [`PlacementError::Configuration`] when decoding fails or the
    /// decoded scale violates [`GradingScale::validate`].
    pub fn from_json(value: &Value) -> Result<Self, PlacementError> {
        let scale: Self = serde_json::from_value(value.clone()).map_err(|err| {
            PlacementError::Configuration(format!("invalid grading scale JSON payload: {err}"))
        })?;
        scale.validate()?;
        Ok(scale)
    }

    #[must_use]
    pub fn grade(&self, mark: f64, max_marks: f64) -> Grade {
        let percent = percent_of(mark, max_marks);
        self.bands
            .iter()
            .find(|band| percent >= band.min_percent)
            .map_or_else(
                || Grade {
                    letter: self.fail_letter.clone(),
                    grade_point: 0,
                },
                |band| Grade {
                    letter: band.letter.clone(),
                    grade_point: band.grade_point,
                },
            )
    }

    #[must_use]
    pub fn status(&self, mark: f64, max_marks: f64) -> SubjectStatus {
        if percent_of(mark, max_marks) >= self.pass_percent {
            SubjectStatus::Pass
        } else {
            SubjectStatus::Fail
        }
    }
}

/// Normalizes `mark` to a 0-100 scale.
#[must_use]
pub fn percent_of(mark: f64, max_marks: f64) -> f64 {
    if max_marks <= 0.0 {
        return 0.0;
    }
    // Multiply first so whole-number marks land exactly on band edges.
    mark * 100.0 / max_marks
}

/// Credit-weighted grade-point average over `(grade_point, credits)` pairs,
/// rounded to two places. Zero when no credits are present.
#[must_use]
pub fn sgpa<I>(entries: I) -> f64
where
    I: IntoIterator<Item = (u8, u32)>,
{
    let mut weighted = 0.0;
    let mut credits_total = 0.0;
    for (grade_point, credits) in entries {
        weighted += f64::from(grade_point) * f64::from(credits);
        credits_total += f64::from(credits);
    }

    if credits_total <= 0.0 {
        return 0.0;
    }
    round2(weighted / credits_total)
}

#[must_use]
pub fn overall_status<I>(statuses: I) -> OverallStatus
where
    I: IntoIterator<Item = SubjectStatus>,
{
    if statuses
        .into_iter()
        .any(|status| status == SubjectStatus::Fail)
    {
        OverallStatus::Atkt
    } else {
        OverallStatus::Pass
    }
}

#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn letter(mark: f64) -> String {
        GradingScale::standard().grade(mark, 100.0).letter
    }

    #[test]
    fn band_edges_are_exact() {
        assert_eq!(letter(89.0), "A");
        assert_eq!(letter(90.0), "A+");
        assert_eq!(letter(39.0), "F");
        assert_eq!(letter(40.0), "C");
        assert_eq!(letter(100.0), "A+");
        assert_eq!(letter(0.0), "F");

        let scale = GradingScale::standard();
        assert_eq!(scale.status(39.0, 100.0), SubjectStatus::Fail);
        assert_eq!(scale.status(40.0, 100.0), SubjectStatus::Pass);
    }

    #[test]
    fn marks_are_normalized_against_max() {
        let scale = GradingScale::standard();
        assert_eq!(scale.grade(45.0, 50.0).letter, "A+");
        assert_eq!(scale.grade(19.0, 50.0).letter, "F");
        assert_eq!(scale.status(20.0, 50.0), SubjectStatus::Pass);
    }

    #[test]
    fn sgpa_is_credit_weighted_and_rounded() {
        let scale = GradingScale::standard();
        let first = scale.grade(87.0, 100.0);
        let second = scale.grade(65.0, 100.0);
        assert_eq!(first.grade_point, 9);
        assert_eq!(second.grade_point, 7);

        // (9 * 4 + 7 * 3) / 7 = 57 / 7
        let value = sgpa([(first.grade_point, 4), (second.grade_point, 3)]);
        assert_eq!(value, 8.14);
    }

    #[test]
    fn sgpa_of_nothing_is_zero() {
        assert_eq!(sgpa(Vec::new()), 0.0);
    }

    #[test]
    fn one_failure_means_atkt() {
        let mut statuses = vec![SubjectStatus::Pass; 5];
        assert_eq!(overall_status(statuses.clone()), OverallStatus::Pass);
        statuses.push(SubjectStatus::Fail);
        assert_eq!(overall_status(statuses), OverallStatus::Atkt);
    }

    #[test]
    fn validate_rejects_ascending_bands() {
        let mut scale = GradingScale::standard();
        scale.bands.swap(0, 1);
        assert!(scale.validate().is_err());
    }

    #[test]
    fn from_json_round_trips_standard_scale() {
        let value = match serde_json::to_value(GradingScale::standard()) {
            Ok(value) => value,
            Err(err) => panic!("serialize failed: {err}"),
        };
        let decoded = match GradingScale::from_json(&value) {
            Ok(value) => value,
            Err(err) => panic!("decode failed: {err}"),
        };
        assert_eq!(decoded, GradingScale::standard());

        let broken = json!({"bands": [], "fail_letter": "F", "pass_percent": 40.0});
        assert!(matches!(
            GradingScale::from_json(&broken),
            Err(PlacementError::Configuration(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_grade_point_is_monotonic(a in 0.0f64..=100.0, b in 0.0f64..=100.0) {
            let scale = GradingScale::standard();
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(scale.grade(low, 100.0).grade_point <= scale.grade(high, 100.0).grade_point);
        }

        #[test]
        fn prop_sgpa_stays_within_point_range(entries in prop::collection::vec((0u8..=10, 1u32..=6), 0..12)) {
            let value = sgpa(entries);
            prop_assert!((0.0..=10.0).contains(&value));
        }
    }
}
