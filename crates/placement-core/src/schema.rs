use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::SubjectDefinition;
use crate::PlacementError;

pub const MARKS_FIXED_HEADERS: [&str; 2] = ["Roll Number", "Student Name"];

pub const ROSTER_REQUIRED_HEADERS: [&str; 8] = [
    "Name",
    "Roll Number",
    "Email",
    "CGPA",
    "Semester",
    "Branch",
    "Phone",
    "Address",
];

pub const ROSTER_OPTIONAL_HEADERS: [&str; 9] = [
    "Placement Status",
    "Company",
    "Package",
    "Joining Date",
    "Skills",
    "Projects",
    "Internships",
    "Certifications",
    "Attendance",
];

pub const REQUEST_REQUIRED_HEADERS: [&str; 8] = [
    "Type",
    "Student Name",
    "Roll Number",
    "Email",
    "Phone",
    "CGPA",
    "Semester",
    "Description",
];

pub const REQUEST_OPTIONAL_HEADERS: [&str; 2] = ["Documents", "Urgency"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Marks,
    Roster,
    Requests,
}

impl BatchKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Marks => "marks",
            Self::Roster => "roster",
            Self::Requests => "requests",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "marks" => Some(Self::Marks),
            "roster" => Some(Self::Roster),
            "requests" => Some(Self::Requests),
            _ => None,
        }
    }
}

/// Headers a batch of `kind` must carry. Marks batches need one column per
/// configured subject, named by subject code.
#[must_use]
pub fn required_headers(kind: BatchKind, subjects: &[SubjectDefinition]) -> Vec<String> {
    match kind {
        BatchKind::Marks => MARKS_FIXED_HEADERS
            .iter()
            .map(|header| (*header).to_string())
            .chain(subjects.iter().map(|subject| subject.code.clone()))
            .collect(),
        BatchKind::Roster => ROSTER_REQUIRED_HEADERS
            .iter()
            .map(|header| (*header).to_string())
            .collect(),
        BatchKind::Requests => REQUEST_REQUIRED_HEADERS
            .iter()
            .map(|header| (*header).to_string())
            .collect(),
    }
}

#[must_use]
pub fn optional_headers(kind: BatchKind) -> &'static [&'static str] {
    match kind {
        BatchKind::Marks => &[],
        BatchKind::Roster => &ROSTER_OPTIONAL_HEADERS,
        BatchKind::Requests => &REQUEST_OPTIONAL_HEADERS,
    }
}

/// Header name to column index, matched case-insensitively with whitespace
/// collapsed. The first occurrence of a repeated header wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    index: HashMap<String, usize>,
}

impl HeaderMap {
    #[must_use]
    pub fn from_headers(headers: &[String]) -> Self {
        let mut index = HashMap::new();
        for (position, header) in headers.iter().enumerate() {
            index.entry(normalize(header)).or_insert(position);
        }
        Self { index }
    }

    #[must_use]
    pub fn position(&self, header: &str) -> Option<usize> {
        self.index.get(&normalize(header)).copied()
    }

    #[must_use]
    pub fn contains(&self, header: &str) -> bool {
        self.position(header).is_some()
    }

    /// Trimmed cell for `header`, or `""` when the column or cell is absent.
    #[must_use]
    pub fn field<'a>(&self, row: &'a [String], header: &str) -> &'a str {
        self.position(header)
            .and_then(|position| row.get(position))
            .map_or("", |value| value.trim())
    }
}

/// Checks `required - present` and returns the column mapping.
///
/// # Errors
/// Returns [`PlacementError::Schema`] naming every missing column.
pub fn validate_headers(
    headers: &[String],
    required: &[String],
) -> Result<HeaderMap, PlacementError> {
    let map = HeaderMap::from_headers(headers);
    let missing = required
        .iter()
        .filter(|header| !map.contains(header))
        .map(String::as_str)
        .collect::<Vec<_>>();

    if !missing.is_empty() {
        return Err(PlacementError::Schema(format!(
            "missing required headers: {}",
            missing.join(", ")
        )));
    }

    Ok(map)
}

fn normalize(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
