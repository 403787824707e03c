use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::grade::{overall_status, sgpa, GradingScale};
use crate::package::Package;
use crate::PlacementError;

/// Reference data for one subject. Configured once, read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectDefinition {
    pub code: String,
    pub name: String,
    pub credits: u32,
    pub max_marks: f64,
}

impl SubjectDefinition {
    /// # Errors
    /// Returns [`PlacementError::Validation`] for a blank code or name,
    /// zero credits, or a non-positive maximum mark.
    pub fn validate(&self) -> Result<(), PlacementError> {
        if self.code.trim().is_empty() {
            return Err(PlacementError::Validation(
                "subject code MUST be provided".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(PlacementError::Validation(format!(
                "subject {} MUST have a name",
                self.code
            )));
        }
        if self.credits == 0 {
            return Err(PlacementError::Validation(format!(
                "subject {} credits MUST be >= 1",
                self.code
            )));
        }
        if !(self.max_marks.is_finite() && self.max_marks > 0.0) {
            return Err(PlacementError::Validation(format!(
                "subject {} max marks MUST be > 0",
                self.code
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum SubjectStatus {
    Pass,
    Fail,
}

impl SubjectStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "Pass",
            Self::Fail => "Fail",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum OverallStatus {
    #[default]
    Pass,
    #[serde(rename = "ATKT")]
    Atkt,
}

impl OverallStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "Pass",
            Self::Atkt => "ATKT",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pass" => Some(Self::Pass),
            "ATKT" => Some(Self::Atkt),
            _ => None,
        }
    }
}

/// A graded mark. Grade, grade point and status are derived from the mark
/// and only ever produced together by [`Marksheet::grade`].
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    mark: f64,
    grade: String,
    grade_point: u8,
    status: SubjectStatus,
}

impl SubjectResult {
    #[must_use]
    pub fn mark(&self) -> f64 {
        self.mark
    }

    #[must_use]
    pub fn grade(&self) -> &str {
        &self.grade
    }

    #[must_use]
    pub fn grade_point(&self) -> u8 {
        self.grade_point
    }

    #[must_use]
    pub fn status(&self) -> SubjectStatus {
        self.status
    }
}

/// Per-subject results with the SGPA and overall status derived from them.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Marksheet {
    subjects: BTreeMap<String, SubjectResult>,
    sgpa: f64,
    overall_status: OverallStatus,
}

impl Marksheet {
    /// Grades every mark against its subject definition.
    ///
    /// # Errors
    /// Returns [`PlacementError::Validation`] when a mark references an
    /// unknown subject or lies outside `[0, max_marks]`. Nothing is graded
    /// unless every mark is valid.
    pub fn grade(
        marks: &BTreeMap<String, f64>,
        subjects: &[SubjectDefinition],
        scale: &GradingScale,
    ) -> Result<Self, PlacementError> {
        let mut graded = BTreeMap::new();
        let mut weights = Vec::with_capacity(marks.len());

        for (code, mark) in marks {
            let Some(subject) = subjects.iter().find(|subject| &subject.code == code) else {
                return Err(PlacementError::Validation(format!(
                    "unknown subject code {code}"
                )));
            };

            if !(mark.is_finite() && (0.0..=subject.max_marks).contains(mark)) {
                return Err(PlacementError::Validation(format!(
                    "mark for {code} must be between 0 and {} (got {mark})",
                    subject.max_marks
                )));
            }

            let grade = scale.grade(*mark, subject.max_marks);
            weights.push((grade.grade_point, subject.credits));
            graded.insert(
                code.clone(),
                SubjectResult {
                    mark: *mark,
                    grade: grade.letter,
                    grade_point: grade.grade_point,
                    status: scale.status(*mark, subject.max_marks),
                },
            );
        }

        let overall_status = overall_status(graded.values().map(SubjectResult::status));
        Ok(Self {
            subjects: graded,
            sgpa: sgpa(weights),
            overall_status,
        })
    }

    /// Returns a regraded copy with one mark replaced or added.
    ///
    /// # Errors
    /// Same conditions as [`Marksheet::grade`].
    pub fn with_mark(
        &self,
        code: &str,
        mark: f64,
        subjects: &[SubjectDefinition],
        scale: &GradingScale,
    ) -> Result<Self, PlacementError> {
        let mut marks = self.marks();
        marks.insert(code.to_string(), mark);
        Self::grade(&marks, subjects, scale)
    }

    #[must_use]
    pub fn marks(&self) -> BTreeMap<String, f64> {
        self.subjects
            .iter()
            .map(|(code, result)| (code.clone(), result.mark))
            .collect()
    }

    #[must_use]
    pub fn subjects(&self) -> &BTreeMap<String, SubjectResult> {
        &self.subjects
    }

    #[must_use]
    pub fn subject(&self, code: &str) -> Option<&SubjectResult> {
        self.subjects.get(code)
    }

    #[must_use]
    pub fn sgpa(&self) -> f64 {
        self.sgpa
    }

    #[must_use]
    pub fn overall_status(&self) -> OverallStatus {
        self.overall_status
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum PlacementStatus {
    Placed,
    #[default]
    #[serde(rename = "Not Placed")]
    NotPlaced,
    #[serde(rename = "In Process")]
    InProcess,
    #[serde(rename = "Higher Studies")]
    HigherStudies,
}

impl PlacementStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Placed => "Placed",
            Self::NotPlaced => "Not Placed",
            Self::InProcess => "In Process",
            Self::HigherStudies => "Higher Studies",
        }
    }

    /// Accepts the display form and common spreadsheet spellings.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value
            .trim()
            .to_ascii_lowercase()
            .replace(['-', '_'], " ");
        match normalized.split_whitespace().collect::<Vec<_>>().join(" ").as_str() {
            "placed" => Some(Self::Placed),
            "not placed" | "unplaced" => Some(Self::NotPlaced),
            "in process" | "in progress" | "pending" => Some(Self::InProcess),
            "higher studies" => Some(Self::HigherStudies),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRecord {
    pub status: PlacementStatus,
    pub company: Option<String>,
    pub package: Option<Package>,
    pub joining_date: Option<String>,
}

/// One student, keyed by roll number. Marks change only through the merger
/// or [`crate::apply_mark_edit`], both of which regrade the whole marksheet.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentResult {
    pub roll_number: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub branch: String,
    pub semester: u8,
    pub cgpa: f64,
    pub attendance: f64,
    #[serde(flatten)]
    pub marksheet: Marksheet,
    pub placement: PlacementRecord,
    pub skills: Vec<String>,
    pub projects: Vec<String>,
    pub internships: Vec<String>,
    pub certifications: Vec<String>,
}

/// Company reference data used to annotate analytics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompanyReference {
    pub name: String,
    pub tier: String,
}
