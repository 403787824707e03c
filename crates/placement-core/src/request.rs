use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

use crate::model::StudentResult;
use crate::{PlacementError, StudentSet};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RequestType {
    Registration,
    #[serde(rename = "Profile Update")]
    ProfileUpdate,
    #[serde(rename = "Document Verification")]
    DocumentVerification,
    #[serde(rename = "Placement Drive")]
    PlacementDrive,
    Other,
}

impl RequestType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "Registration",
            Self::ProfileUpdate => "Profile Update",
            Self::DocumentVerification => "Document Verification",
            Self::PlacementDrive => "Placement Drive",
            Self::Other => "Other",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match normalize(value).as_str() {
            "registration" | "enrollment" | "enrolment" => Some(Self::Registration),
            "profile update" => Some(Self::ProfileUpdate),
            "document verification" => Some(Self::DocumentVerification),
            "placement drive" | "drive registration" => Some(Self::PlacementDrive),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

impl Urgency {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match normalize(value).as_str() {
            "low" => Some(Self::Low),
            "medium" | "normal" => Some(Self::Medium),
            "high" | "urgent" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pending" => Some(Self::Pending),
            "Approved" => Some(Self::Approved),
            "Rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: Ulid,
    pub request_type: RequestType,
    pub student_name: String,
    pub roll_number: String,
    pub email: String,
    pub phone: String,
    pub cgpa: f64,
    pub semester: u8,
    pub description: String,
    pub documents: Vec<String>,
    pub urgency: Urgency,
    pub status: RequestStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
}

impl ApprovalRequest {
    /// Duplicate key: same roll number and type while still pending.
    #[must_use]
    pub fn blocks(&self, roll_number: &str, request_type: RequestType) -> bool {
        self.status == RequestStatus::Pending
            && self.request_type == request_type
            && self.roll_number == roll_number
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    pub request: ApprovalRequest,
    /// Student record created or updated by an approval, if any.
    pub student: Option<StudentResult>,
}

/// Approves or rejects a pending request.
///
/// Approving a registration for an unknown roll number enrolls the student;
/// approving a profile update applies the request's contact and academic
/// fields to the existing record.
///
/// # Errors
/// Returns [`PlacementError::NotFound`] for an unknown request id (or a
/// profile update for an unknown student) and [`PlacementError::Validation`]
/// when the request is no longer pending.
pub fn decide_request(
    requests: &[ApprovalRequest],
    students: &StudentSet,
    id: Ulid,
    decision: Decision,
) -> Result<DecisionOutcome, PlacementError> {
    let Some(found) = requests.iter().find(|request| request.id == id) else {
        return Err(PlacementError::NotFound(format!("approval request {id}")));
    };

    if found.status != RequestStatus::Pending {
        return Err(PlacementError::Validation(format!(
            "request {id} is already {}",
            found.status.as_str()
        )));
    }

    let mut request = found.clone();
    if decision == Decision::Reject {
        request.status = RequestStatus::Rejected;
        return Ok(DecisionOutcome {
            request,
            student: None,
        });
    }
    request.status = RequestStatus::Approved;

    let student = match request.request_type {
        RequestType::Registration if !students.contains_key(&request.roll_number) => {
            Some(StudentResult {
                roll_number: request.roll_number.clone(),
                name: request.student_name.clone(),
                email: request.email.clone(),
                phone: request.phone.clone(),
                semester: request.semester,
                cgpa: request.cgpa,
                ..StudentResult::default()
            })
        }
        RequestType::ProfileUpdate => {
            let Some(existing) = students.get(&request.roll_number) else {
                return Err(PlacementError::NotFound(format!(
                    "student {} for profile update {id}",
                    request.roll_number
                )));
            };
            let mut updated = existing.clone();
            updated.name.clone_from(&request.student_name);
            updated.email.clone_from(&request.email);
            updated.phone.clone_from(&request.phone);
            updated.semester = request.semester;
            updated.cgpa = request.cgpa;
            Some(updated)
        }
        _ => None,
    };

    Ok(DecisionOutcome { request, student })
}

fn normalize(value: &str) -> String {
    value
        .trim()
        .to_ascii_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
