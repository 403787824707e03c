//! Academic-results ingestion, grading, and placement analytics.
//!
//! Everything in this crate is a pure function over an explicitly passed
//! [`RecordSnapshot`]. Persistence is delegated to a [`RecordStore`]
//! implementation supplied by the host (see `placement-store-sqlite`).

use std::collections::BTreeMap;

use time::{OffsetDateTime, UtcOffset};

mod analytics;
mod grade;
mod ingest;
mod model;
mod package;
mod request;
mod schema;
mod template;

pub use analytics::{
    aggregate, AggregateStatistics, BranchStats, CompanyStats, PackageBucket, PACKAGE_BUCKETS,
};
pub use grade::{overall_status, percent_of, round2, sgpa, Grade, GradeBand, GradingScale};
pub use ingest::{
    apply_mark_edit, ingest, ingest_into, merge_marks, merge_requests, merge_roster, parse_batch,
    Batch, BatchRow, Ingestion, IngestionReport, MergeOutcome, RowOutcome,
};
pub use model::{
    CompanyReference, Marksheet, OverallStatus, PlacementRecord, PlacementStatus, StudentResult,
    SubjectDefinition, SubjectResult, SubjectStatus,
};
pub use package::{Package, PackageUnit};
pub use request::{
    decide_request, ApprovalRequest, Decision, DecisionOutcome, RequestStatus, RequestType,
    Urgency,
};
pub use schema::{
    optional_headers, required_headers, validate_headers, BatchKind, HeaderMap,
    MARKS_FIXED_HEADERS, REQUEST_OPTIONAL_HEADERS, REQUEST_REQUIRED_HEADERS,
    ROSTER_OPTIONAL_HEADERS, ROSTER_REQUIRED_HEADERS,
};
pub use template::template;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum PlacementError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Store(String),
}

/// Students keyed by roll number.
pub type StudentSet = BTreeMap<String, StudentResult>;

/// Everything the merger and aggregator need, read in one pass from a store.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSnapshot {
    pub subjects: Vec<SubjectDefinition>,
    pub scale: GradingScale,
    pub students: StudentSet,
    pub requests: Vec<ApprovalRequest>,
    pub companies: Vec<CompanyReference>,
}

impl Default for RecordSnapshot {
    fn default() -> Self {
        Self {
            subjects: Vec::new(),
            scale: GradingScale::standard(),
            students: StudentSet::new(),
            requests: Vec::new(),
            companies: Vec::new(),
        }
    }
}

impl RecordSnapshot {
    /// Upserts every record of `batch` into this snapshot.
    pub fn apply(&mut self, batch: &WriteBatch) {
        for student in &batch.students {
            self.students
                .insert(student.roll_number.clone(), student.clone());
        }

        for request in &batch.requests {
            match self.requests.iter_mut().find(|item| item.id == request.id) {
                Some(existing) => *existing = request.clone(),
                None => self.requests.push(request.clone()),
            }
        }
    }
}

/// Records changed by one operation, written to the store as a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub students: Vec<StudentResult>,
    pub requests: Vec<ApprovalRequest>,
}

impl WriteBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.students.is_empty() && self.requests.is_empty()
    }
}

/// Read-all / write-batch persistence seam.
///
/// Callers must serialize writers: two ingestions against the same store are
/// not coordinated by this trait.
pub trait RecordStore {
    /// Loads the full record collection.
    ///
    /// # Errors
    /// Returns [`PlacementError::Store`] when the backing store cannot be read.
    fn read_all(&self) -> Result<RecordSnapshot, PlacementError>;

    /// Upserts every record in `batch` atomically.
    ///
    /// # Errors
    /// Returns [`PlacementError::Store`] when the write fails; no record of the
    /// batch is persisted in that case.
    fn write_batch(&mut self, batch: &WriteBatch) -> Result<(), PlacementError>;
}

impl RecordStore for RecordSnapshot {
    fn read_all(&self) -> Result<RecordSnapshot, PlacementError> {
        Ok(self.clone())
    }

    fn write_batch(&mut self, batch: &WriteBatch) -> Result<(), PlacementError> {
        self.apply(batch);
        Ok(())
    }
}

/// Parses an RFC3339 timestamp and requires UTC (`Z`) offset.
///
/// # Errors
/// Returns [`PlacementError::Validation`] when parsing fails or the
/// timestamp is not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, PlacementError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| PlacementError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(PlacementError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`PlacementError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, PlacementError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| {
            PlacementError::Validation(format!("failed to format RFC3339 timestamp: {err}"))
        })
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    #[test]
    fn snapshot_store_upserts_by_key() {
        let mut store = RecordSnapshot::default();
        let mut student = StudentResult {
            roll_number: "CS01".to_string(),
            name: "Asha".to_string(),
            ..StudentResult::default()
        };
        must_ok(store.write_batch(&WriteBatch {
            students: vec![student.clone()],
            requests: Vec::new(),
        }));

        student.branch = "Computer Science".to_string();
        must_ok(store.write_batch(&WriteBatch {
            students: vec![student],
            requests: Vec::new(),
        }));

        let snapshot = must_ok(store.read_all());
        assert_eq!(snapshot.students.len(), 1);
        assert_eq!(snapshot.students["CS01"].branch, "Computer Science");
    }

    #[test]
    fn rfc3339_requires_utc() {
        assert!(parse_rfc3339_utc("2026-02-07T12:00:00+02:00").is_err());
        let parsed = must_ok(parse_rfc3339_utc("2026-02-07T12:00:00Z"));
        assert_eq!(must_ok(format_rfc3339(parsed)), "2026-02-07T12:00:00Z");
    }
}
