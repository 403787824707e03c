use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::grade::GradingScale;
use crate::model::{Marksheet, PlacementRecord, PlacementStatus, StudentResult, SubjectDefinition};
use crate::package::Package;
use crate::request::{ApprovalRequest, RequestStatus, RequestType, Urgency};
use crate::schema::{required_headers, validate_headers, BatchKind, HeaderMap};
use crate::{PlacementError, RecordSnapshot, RecordStore, StudentSet, WriteBatch};

const CGPA_RANGE: std::ops::RangeInclusive<f64> = 0.0..=10.0;
const ATTENDANCE_RANGE: std::ops::RangeInclusive<f64> = 0.0..=100.0;
const SEMESTER_RANGE: std::ops::RangeInclusive<u8> = 1..=8;

/// Outcome of one batch. Built once from the row outcomes and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestionReport {
    pub success: bool,
    pub processed: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl IngestionReport {
    /// A batch rejected before any row was looked at.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            processed: 0,
            errors: vec![message.into()],
            warnings: Vec::new(),
        }
    }

    /// Folds per-row outcomes, in file order, into a report.
    #[must_use]
    pub fn from_outcomes<T>(outcomes: &[RowOutcome<T>]) -> Self {
        let mut processed = 0;
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for outcome in outcomes {
            match outcome {
                RowOutcome::Accepted {
                    line,
                    warnings: row_warnings,
                    ..
                } => {
                    processed += 1;
                    warnings.extend(row_warnings.iter().map(|w| format!("Row {line}: {w}")));
                }
                RowOutcome::Rejected {
                    line,
                    errors: row_errors,
                } => {
                    errors.extend(row_errors.iter().map(|e| format!("Row {line}: {e}")));
                }
                RowOutcome::Skipped { line, reason } => {
                    warnings.push(format!("Row {line}: {reason}"));
                }
            }
        }

        Self {
            success: errors.is_empty(),
            processed,
            errors,
            warnings,
        }
    }
}

/// What happened to one data row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome<T> {
    /// Applied, possibly with caveats.
    Accepted {
        line: usize,
        record: T,
        warnings: Vec<String>,
    },
    /// Not applied; every reason is an error.
    Rejected { line: usize, errors: Vec<String> },
    /// Not applied, and not an error (duplicate key, unknown student).
    Skipped { line: usize, reason: String },
}

impl<T> RowOutcome<T> {
    #[must_use]
    pub fn line(&self) -> usize {
        match self {
            Self::Accepted { line, .. }
            | Self::Rejected { line, .. }
            | Self::Skipped { line, .. } => *line,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Rejected { .. } => "rejected",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// Updated record collection, the records this batch changed, and the report.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome<C, T> {
    pub records: C,
    pub accepted: Vec<T>,
    pub report: IngestionReport,
}

impl<C, T: Clone> MergeOutcome<C, T> {
    fn fold(records: C, outcomes: &[RowOutcome<T>]) -> Self {
        let accepted = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                RowOutcome::Accepted { record, .. } => Some(record.clone()),
                _ => None,
            })
            .collect();
        Self {
            records,
            accepted,
            report: IngestionReport::from_outcomes(outcomes),
        }
    }
}

/// One data row with its 1-based line number in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRow {
    pub line: usize,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub headers: Vec<String>,
    pub rows: Vec<BatchRow>,
}

/// Splits comma-delimited text into a header row and data rows.
///
/// # Errors
/// Returns [`PlacementError::Schema`] when the text has no header row or is
/// not readable as CSV.
pub fn parse_batch(text: &str) -> Result<Batch, PlacementError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|err| PlacementError::Schema(format!("unreadable header row: {err}")))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    if headers.iter().all(String::is_empty) {
        return Err(PlacementError::Schema(
            "batch has no header row".to_string(),
        ));
    }

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|err| {
            PlacementError::Schema(format!("unreadable row {}: {err}", index + 2))
        })?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record
            .position()
            .and_then(|position| usize::try_from(position.line()).ok())
            .unwrap_or(index + 2);
        rows.push(BatchRow {
            line,
            fields: record.iter().map(str::to_string).collect(),
        });
    }

    Ok(Batch { headers, rows })
}

/// Applies a marks batch. Rows are processed strictly in order; a row either
/// regrades the student's whole marksheet or changes nothing.
///
/// A row is a duplicate when any mark it carries is already recorded for that
/// student. Blank cells for subjects the student already has a mark for are
/// left alone, so a subject added after the first upload is filled by a batch
/// carrying only that column's marks. Existing marks change only through
/// [`apply_mark_edit`].
#[must_use]
pub fn merge_marks(
    header: &HeaderMap,
    rows: &[BatchRow],
    students: &StudentSet,
    subjects: &[SubjectDefinition],
    scale: &GradingScale,
) -> MergeOutcome<StudentSet, StudentResult> {
    let mut working = students.clone();
    let mut seen = BTreeSet::new();
    let mut outcomes = Vec::with_capacity(rows.len());

    for row in rows {
        let outcome = marks_row(header, row, &working, &seen, subjects, scale);
        if let RowOutcome::Accepted { record, .. } = &outcome {
            seen.insert(record.roll_number.clone());
            working.insert(record.roll_number.clone(), record.clone());
        }
        debug!(line = row.line, outcome = outcome.label(), "marks row");
        outcomes.push(outcome);
    }

    MergeOutcome::fold(working, &outcomes)
}

fn marks_row(
    header: &HeaderMap,
    row: &BatchRow,
    working: &StudentSet,
    seen: &BTreeSet<String>,
    subjects: &[SubjectDefinition],
    scale: &GradingScale,
) -> RowOutcome<StudentResult> {
    let line = row.line;
    let roll_number = header.field(&row.fields, "Roll Number");
    let name = header.field(&row.fields, "Student Name");

    let missing = blank_fields(&[("Roll Number", roll_number), ("Student Name", name)]);
    if !missing.is_empty() {
        return RowOutcome::Rejected {
            line,
            errors: vec![format!("missing required field(s): {}", missing.join(", "))],
        };
    }

    let Some(existing) = working.get(roll_number) else {
        return RowOutcome::Skipped {
            line,
            reason: format!("student not found (roll number {roll_number})"),
        };
    };

    if seen.contains(roll_number) {
        return RowOutcome::Skipped {
            line,
            reason: format!("duplicate roll number {roll_number} earlier in this batch"),
        };
    }

    let recorded = |code: &str| existing.marksheet.subject(code).is_some();
    let carried = subjects
        .iter()
        .filter(|subject| !header.field(&row.fields, &subject.code).is_empty())
        .collect::<Vec<_>>();

    let already_marked = carried
        .iter()
        .filter(|subject| recorded(&subject.code))
        .map(|subject| subject.code.as_str())
        .collect::<Vec<_>>();
    if !already_marked.is_empty() {
        return RowOutcome::Skipped {
            line,
            reason: format!(
                "duplicate marks for roll number {roll_number}: already recorded for {}",
                already_marked.join(", ")
            ),
        };
    }

    let mut marks = existing.marksheet.marks();
    let mut errors = Vec::new();
    for subject in subjects {
        let raw = header.field(&row.fields, &subject.code);
        // A blank cell leaves an already recorded mark in place.
        if raw.is_empty() && recorded(&subject.code) {
            continue;
        }
        match parse_mark(raw, subject) {
            Ok(mark) => {
                marks.insert(subject.code.clone(), mark);
            }
            Err(reason) => errors.push(reason),
        }
    }
    if !errors.is_empty() {
        return RowOutcome::Rejected { line, errors };
    }
    if carried.is_empty() {
        return RowOutcome::Skipped {
            line,
            reason: format!("no new marks for roll number {roll_number}"),
        };
    }

    let marksheet = match Marksheet::grade(&marks, subjects, scale) {
        Ok(value) => value,
        Err(err) => {
            return RowOutcome::Rejected {
                line,
                errors: vec![err.to_string()],
            }
        }
    };

    let mut warnings = Vec::new();
    if !existing.name.is_empty() && !existing.name.eq_ignore_ascii_case(name) {
        warnings.push(format!(
            "name '{name}' does not match '{}' on record for roll number {roll_number}",
            existing.name
        ));
    }

    let mut record = existing.clone();
    record.marksheet = marksheet;
    RowOutcome::Accepted {
        line,
        record,
        warnings,
    }
}

fn parse_mark(raw: &str, subject: &SubjectDefinition) -> Result<f64, String> {
    if raw.is_empty() {
        return Err(format!("mark for {} is blank", subject.code));
    }
    let Ok(mark) = raw.parse::<f64>() else {
        return Err(format!("mark for {} is not a number ('{raw}')", subject.code));
    };
    if !(mark.is_finite() && (0.0..=subject.max_marks).contains(&mark)) {
        return Err(format!(
            "mark for {} must be between 0 and {} (got {raw})",
            subject.code, subject.max_marks
        ));
    }
    Ok(mark)
}

/// Applies a roster batch, synthesizing one student per accepted row.
/// Existing roll numbers are never overwritten.
#[must_use]
pub fn merge_roster(
    header: &HeaderMap,
    rows: &[BatchRow],
    students: &StudentSet,
) -> MergeOutcome<StudentSet, StudentResult> {
    let mut working = students.clone();
    let mut outcomes = Vec::with_capacity(rows.len());

    for row in rows {
        let outcome = roster_row(header, row, students, &working);
        if let RowOutcome::Accepted { record, .. } = &outcome {
            working.insert(record.roll_number.clone(), record.clone());
        }
        debug!(line = row.line, outcome = outcome.label(), "roster row");
        outcomes.push(outcome);
    }

    MergeOutcome::fold(working, &outcomes)
}

fn roster_row(
    header: &HeaderMap,
    row: &BatchRow,
    existing: &StudentSet,
    working: &StudentSet,
) -> RowOutcome<StudentResult> {
    let line = row.line;
    let field = |name: &str| header.field(&row.fields, name);

    let name = field("Name");
    let roll_number = field("Roll Number");
    let email = field("Email");

    let missing = blank_fields(&[
        ("Name", name),
        ("Roll Number", roll_number),
        ("Email", email),
        ("CGPA", field("CGPA")),
        ("Semester", field("Semester")),
        ("Branch", field("Branch")),
        ("Phone", field("Phone")),
        ("Address", field("Address")),
    ]);
    if let Some(errors) = identity_errors(&missing, email) {
        return RowOutcome::Rejected { line, errors };
    }

    if existing.contains_key(roll_number) {
        return RowOutcome::Skipped {
            line,
            reason: format!("duplicate roll number {roll_number} already exists"),
        };
    }
    if working.contains_key(roll_number) {
        return RowOutcome::Skipped {
            line,
            reason: format!("duplicate roll number {roll_number} earlier in this batch"),
        };
    }

    let mut warnings = Vec::new();
    let cgpa = ranged_number(field("CGPA"), "CGPA", &CGPA_RANGE, &mut warnings);
    let semester = semester(field("Semester"), &mut warnings);
    let attendance = match field("Attendance") {
        "" => 0.0,
        raw => ranged_number(raw, "Attendance", &ATTENDANCE_RANGE, &mut warnings),
    };

    let status = match field("Placement Status") {
        "" => PlacementStatus::NotPlaced,
        raw => PlacementStatus::parse(raw).unwrap_or_else(|| {
            warnings.push(format!(
                "unknown placement status '{raw}'; recorded as {}",
                PlacementStatus::NotPlaced.as_str()
            ));
            PlacementStatus::NotPlaced
        }),
    };

    let company = optional(field("Company"));
    if status == PlacementStatus::Placed && company.is_none() {
        warnings.push("marked Placed without a company".to_string());
    }

    let package = match field("Package") {
        "" => None,
        raw => match Package::parse(raw) {
            Ok(package) => Some(package),
            Err(_) => {
                warnings.push(format!("unrecognized package '{raw}'; no package recorded"));
                None
            }
        },
    };

    let record = StudentResult {
        roll_number: roll_number.to_string(),
        name: name.to_string(),
        email: email.to_string(),
        phone: field("Phone").to_string(),
        address: field("Address").to_string(),
        branch: field("Branch").to_string(),
        semester,
        cgpa,
        attendance,
        marksheet: Marksheet::default(),
        placement: PlacementRecord {
            status,
            company,
            package,
            joining_date: optional(field("Joining Date")),
        },
        skills: split_list(field("Skills")),
        projects: split_list(field("Projects")),
        internships: split_list(field("Internships")),
        certifications: split_list(field("Certifications")),
    };

    RowOutcome::Accepted {
        line,
        record,
        warnings,
    }
}

/// Applies an approval-request batch. A row duplicates any pending request
/// with the same roll number and type, including ones earlier in the batch.
#[must_use]
pub fn merge_requests(
    header: &HeaderMap,
    rows: &[BatchRow],
    requests: &[ApprovalRequest],
    submitted_at: OffsetDateTime,
) -> MergeOutcome<Vec<ApprovalRequest>, ApprovalRequest> {
    let mut working = requests.to_vec();
    let mut outcomes = Vec::with_capacity(rows.len());

    for row in rows {
        let outcome = request_row(header, row, &working, submitted_at);
        if let RowOutcome::Accepted { record, .. } = &outcome {
            working.push(record.clone());
        }
        debug!(line = row.line, outcome = outcome.label(), "request row");
        outcomes.push(outcome);
    }

    MergeOutcome::fold(working, &outcomes)
}

fn request_row(
    header: &HeaderMap,
    row: &BatchRow,
    working: &[ApprovalRequest],
    submitted_at: OffsetDateTime,
) -> RowOutcome<ApprovalRequest> {
    let line = row.line;
    let field = |name: &str| header.field(&row.fields, name);

    let raw_type = field("Type");
    let roll_number = field("Roll Number");
    let email = field("Email");

    let missing = blank_fields(&[
        ("Type", raw_type),
        ("Student Name", field("Student Name")),
        ("Roll Number", roll_number),
        ("Email", email),
        ("Phone", field("Phone")),
        ("CGPA", field("CGPA")),
        ("Semester", field("Semester")),
        ("Description", field("Description")),
    ]);
    if let Some(errors) = identity_errors(&missing, email) {
        return RowOutcome::Rejected { line, errors };
    }

    let mut warnings = Vec::new();
    let request_type = RequestType::parse(raw_type).unwrap_or_else(|| {
        warnings.push(format!(
            "unknown request type '{raw_type}'; recorded as {}",
            RequestType::Other.as_str()
        ));
        RequestType::Other
    });

    if working
        .iter()
        .any(|request| request.blocks(roll_number, request_type))
    {
        return RowOutcome::Skipped {
            line,
            reason: format!(
                "duplicate pending {} request for roll number {roll_number}",
                request_type.as_str()
            ),
        };
    }

    let cgpa = ranged_number(field("CGPA"), "CGPA", &CGPA_RANGE, &mut warnings);
    let semester = semester(field("Semester"), &mut warnings);
    let urgency = match field("Urgency") {
        "" => Urgency::default(),
        raw => Urgency::parse(raw).unwrap_or_else(|| {
            warnings.push(format!(
                "unknown urgency '{raw}'; recorded as {}",
                Urgency::default().as_str()
            ));
            Urgency::default()
        }),
    };

    let record = ApprovalRequest {
        id: Ulid::new(),
        request_type,
        student_name: field("Student Name").to_string(),
        roll_number: roll_number.to_string(),
        email: email.to_string(),
        phone: field("Phone").to_string(),
        cgpa,
        semester,
        description: field("Description").to_string(),
        documents: split_list(field("Documents")),
        urgency,
        status: RequestStatus::Pending,
        submitted_at,
    };

    RowOutcome::Accepted {
        line,
        record,
        warnings,
    }
}

/// Changes a single mark through the grade engine.
///
/// # Errors
/// Returns [`PlacementError::NotFound`] for an unknown student or subject and
/// [`PlacementError::Validation`] for a mark outside `[0, max_marks]`.
pub fn apply_mark_edit(
    students: &StudentSet,
    subjects: &[SubjectDefinition],
    scale: &GradingScale,
    roll_number: &str,
    subject_code: &str,
    mark: f64,
) -> Result<StudentResult, PlacementError> {
    let Some(existing) = students.get(roll_number) else {
        return Err(PlacementError::NotFound(format!("student {roll_number}")));
    };
    if !subjects.iter().any(|subject| subject.code == subject_code) {
        return Err(PlacementError::NotFound(format!("subject {subject_code}")));
    }

    let marksheet = existing
        .marksheet
        .with_mark(subject_code, mark, subjects, scale)?;
    let mut updated = existing.clone();
    updated.marksheet = marksheet;
    Ok(updated)
}

/// Result of running one batch through schema validation and the merger.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingestion {
    pub kind: BatchKind,
    pub write: WriteBatch,
    pub report: IngestionReport,
}

/// Runs `text` through the full pipeline against `snapshot`. Nothing is
/// persisted; callers write [`Ingestion::write`] themselves.
///
/// # Errors
/// Returns [`PlacementError::Configuration`] when the grading scale is invalid
/// or a marks batch is run with no subjects configured. Structural problems
/// with the batch itself are reported in [`Ingestion::report`] instead.
pub fn ingest(
    kind: BatchKind,
    text: &str,
    snapshot: &RecordSnapshot,
    now: OffsetDateTime,
) -> Result<Ingestion, PlacementError> {
    if kind == BatchKind::Marks {
        snapshot.scale.validate()?;
        if snapshot.subjects.is_empty() {
            return Err(PlacementError::Configuration(
                "no subjects configured for marks ingestion".to_string(),
            ));
        }
    }

    let checked = parse_batch(text).and_then(|batch| {
        let required = required_headers(kind, &snapshot.subjects);
        validate_headers(&batch.headers, &required).map(|map| (batch, map))
    });
    let (batch, header) = match checked {
        Ok(value) => value,
        Err(err) => {
            warn!(kind = kind.as_str(), error = %err, "batch rejected");
            let message = match err {
                PlacementError::Schema(message) => message,
                other => other.to_string(),
            };
            return Ok(Ingestion {
                kind,
                write: WriteBatch::default(),
                report: IngestionReport::rejected(message),
            });
        }
    };

    let (write, report) = match kind {
        BatchKind::Marks => {
            let merged = merge_marks(
                &header,
                &batch.rows,
                &snapshot.students,
                &snapshot.subjects,
                &snapshot.scale,
            );
            (
                WriteBatch {
                    students: merged.accepted,
                    requests: Vec::new(),
                },
                merged.report,
            )
        }
        BatchKind::Roster => {
            let merged = merge_roster(&header, &batch.rows, &snapshot.students);
            (
                WriteBatch {
                    students: merged.accepted,
                    requests: Vec::new(),
                },
                merged.report,
            )
        }
        BatchKind::Requests => {
            let merged = merge_requests(&header, &batch.rows, &snapshot.requests, now);
            (
                WriteBatch {
                    students: Vec::new(),
                    requests: merged.accepted,
                },
                merged.report,
            )
        }
    };

    info!(
        kind = kind.as_str(),
        rows = batch.rows.len(),
        processed = report.processed,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "batch merged"
    );

    Ok(Ingestion {
        kind,
        write,
        report,
    })
}

/// Reads the store, ingests `text`, and writes accepted records back.
///
/// # Errors
/// Propagates store failures and the configuration errors of [`ingest`].
pub fn ingest_into<S>(
    store: &mut S,
    kind: BatchKind,
    text: &str,
    now: OffsetDateTime,
) -> Result<IngestionReport, PlacementError>
where
    S: RecordStore + ?Sized,
{
    let snapshot = store.read_all()?;
    let ingestion = ingest(kind, text, &snapshot, now)?;
    if !ingestion.write.is_empty() {
        store.write_batch(&ingestion.write)?;
    }
    Ok(ingestion.report)
}

fn blank_fields<'a>(fields: &[(&'a str, &str)]) -> Vec<&'a str> {
    fields
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| *name)
        .collect()
}

fn identity_errors(missing: &[&str], email: &str) -> Option<Vec<String>> {
    let mut errors = Vec::new();
    if !missing.is_empty() {
        errors.push(format!("missing required field(s): {}", missing.join(", ")));
    }
    if !email.is_empty() && !email.contains('@') {
        errors.push(format!("invalid email '{email}'"));
    }
    if errors.is_empty() {
        None
    } else {
        Some(errors)
    }
}

/// Non-mark numbers never reject a row: unreadable values fall back to zero
/// and out-of-range values are kept, both with a warning.
fn ranged_number(
    raw: &str,
    label: &str,
    range: &std::ops::RangeInclusive<f64>,
    warnings: &mut Vec<String>,
) -> f64 {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => {
            if !range.contains(&value) {
                warnings.push(format!(
                    "{label} {raw} is outside [{}, {}]",
                    range.start(),
                    range.end()
                ));
            }
            value
        }
        _ => {
            warnings.push(format!("{label} '{raw}' is not a number; recorded as 0"));
            0.0
        }
    }
}

fn semester(raw: &str, warnings: &mut Vec<String>) -> u8 {
    match raw.parse::<u8>() {
        Ok(value) => {
            if !SEMESTER_RANGE.contains(&value) {
                warnings.push(format!(
                    "Semester {raw} is outside [{}, {}]",
                    SEMESTER_RANGE.start(),
                    SEMESTER_RANGE.end()
                ));
            }
            value
        }
        Err(_) => {
            warnings.push(format!("Semester '{raw}' is not a number; recorded as 0"));
            0
        }
    }
}

fn optional(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp, clippy::too_many_lines)]

    use super::*;
    use crate::model::OverallStatus;

    fn must_ok<T>(result: Result<T, PlacementError>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn fixture_subjects() -> Vec<SubjectDefinition> {
        vec![
            SubjectDefinition {
                code: "DS".to_string(),
                name: "Data Structures".to_string(),
                credits: 4,
                max_marks: 100.0,
            },
            SubjectDefinition {
                code: "OS".to_string(),
                name: "Operating Systems".to_string(),
                credits: 3,
                max_marks: 100.0,
            },
        ]
    }

    fn fixture_snapshot() -> RecordSnapshot {
        let mut snapshot = RecordSnapshot {
            subjects: fixture_subjects(),
            ..RecordSnapshot::default()
        };
        for (roll, name) in [("CS01", "Asha Rao"), ("CS02", "Vikram Das")] {
            snapshot.students.insert(
                roll.to_string(),
                StudentResult {
                    roll_number: roll.to_string(),
                    name: name.to_string(),
                    branch: "Computer Science".to_string(),
                    ..StudentResult::default()
                },
            );
        }
        snapshot
    }

    fn ingest_now(kind: BatchKind, text: &str, snapshot: &RecordSnapshot) -> Ingestion {
        must_ok(ingest(kind, text, snapshot, crate::now_utc()))
    }

    const ROSTER_HEADER: &str = "Name,Roll Number,Email,CGPA,Semester,Branch,Phone,Address";

    #[test]
    fn missing_header_rejects_whole_batch() {
        let text = "Name,Roll Number,Email\nAsha,CS09,asha@example.edu\n";
        let ingestion = ingest_now(BatchKind::Roster, text, &RecordSnapshot::default());

        assert!(!ingestion.report.success);
        assert_eq!(ingestion.report.processed, 0);
        assert_eq!(
            ingestion.report.errors,
            vec!["missing required headers: CGPA, Semester, Branch, Phone, Address".to_string()]
        );
        assert!(ingestion.write.is_empty());
    }

    #[test]
    fn empty_text_is_a_schema_failure() {
        let ingestion = ingest_now(BatchKind::Roster, "", &RecordSnapshot::default());
        assert!(!ingestion.report.success);
        assert_eq!(ingestion.report.errors.len(), 1);
    }

    #[test]
    fn bad_rows_are_reported_and_good_rows_continue() {
        let text = format!(
            "{ROSTER_HEADER}\n\
             Asha,CS09,asha.example.edu,8.1,5,CSE,900,Pune\n\
             ,CS10,ravi@example.edu,7.0,5,CSE,901,Pune\n\
             Ravi,CS11,ravi@example.edu,7.0,5,CSE,902,Pune\n"
        );
        let ingestion = ingest_now(BatchKind::Roster, &text, &RecordSnapshot::default());

        assert_eq!(ingestion.report.processed, 1);
        assert!(!ingestion.report.success);
        assert_eq!(
            ingestion.report.errors,
            vec![
                "Row 2: invalid email 'asha.example.edu'".to_string(),
                "Row 3: missing required field(s): Name".to_string(),
            ]
        );
        assert_eq!(ingestion.write.students[0].roll_number, "CS11");
    }

    #[test]
    fn non_mark_numbers_out_of_range_only_warn() {
        let text = format!(
            "{ROSTER_HEADER},Placement Status,Package\n\
             Asha,CS09,asha@example.edu,11.5,9,CSE,900,Pune,Hired,TBD\n"
        );
        let ingestion = ingest_now(BatchKind::Roster, &text, &RecordSnapshot::default());

        assert!(ingestion.report.success);
        assert_eq!(ingestion.report.processed, 1);
        assert_eq!(
            ingestion.report.warnings,
            vec![
                "Row 2: CGPA 11.5 is outside [0, 10]".to_string(),
                "Row 2: Semester 9 is outside [1, 8]".to_string(),
                "Row 2: unknown placement status 'Hired'; recorded as Not Placed".to_string(),
                "Row 2: unrecognized package 'TBD'; no package recorded".to_string(),
            ]
        );
        let student = &ingestion.write.students[0];
        assert_eq!(student.cgpa, 11.5);
        assert_eq!(student.placement.status, PlacementStatus::NotPlaced);
        assert!(student.placement.package.is_none());
    }

    #[test]
    fn roster_duplicates_within_batch_and_store_are_skipped() {
        let text = format!(
            "{ROSTER_HEADER}\n\
             Asha,CS01,asha@example.edu,8.1,5,CSE,900,Pune\n\
             Neel,CS20,neel@example.edu,7.4,5,CSE,903,Pune\n\
             Neel Again,CS20,neel2@example.edu,7.4,5,CSE,904,Pune\n"
        );
        let snapshot = fixture_snapshot();
        let ingestion = ingest_now(BatchKind::Roster, &text, &snapshot);

        assert_eq!(ingestion.report.processed, 1);
        assert!(ingestion.report.success);
        assert_eq!(
            ingestion.report.warnings,
            vec![
                "Row 2: duplicate roll number CS01 already exists".to_string(),
                "Row 4: duplicate roll number CS20 earlier in this batch".to_string(),
            ]
        );
        assert_eq!(ingestion.write.students[0].name, "Neel");
    }

    #[test]
    fn roster_optional_columns_are_parsed() {
        let text = format!(
            "{ROSTER_HEADER},Placement Status,Company,Package,Skills,Attendance\n\
             Asha,CS09,asha@example.edu,8.1,6,CSE,900,\"12 MG Road, Pune\",Placed,Infosys,6.5 LPA,Rust; SQL ;,91.5\n"
        );
        let ingestion = ingest_now(BatchKind::Roster, &text, &RecordSnapshot::default());
        assert!(ingestion.report.warnings.is_empty());

        let student = &ingestion.write.students[0];
        assert_eq!(student.address, "12 MG Road, Pune");
        assert_eq!(student.placement.company.as_deref(), Some("Infosys"));
        assert_eq!(student.placement.package.map(|p| p.lakhs()), Some(6.5));
        assert_eq!(student.skills, vec!["Rust".to_string(), "SQL".to_string()]);
        assert_eq!(student.attendance, 91.5);
    }

    #[test]
    fn marks_row_grades_and_derives_status() {
        let text = "Roll Number,Student Name,DS,OS\nCS01,Asha Rao,87,65\nCS02,Vikram Das,91,35\n";
        let ingestion = ingest_now(BatchKind::Marks, text, &fixture_snapshot());

        assert!(ingestion.report.success);
        assert_eq!(ingestion.report.processed, 2);

        let asha = &ingestion.write.students[0];
        assert_eq!(asha.marksheet.sgpa(), 8.14);
        assert_eq!(asha.marksheet.overall_status(), OverallStatus::Pass);

        let vikram = &ingestion.write.students[1];
        assert_eq!(vikram.marksheet.overall_status(), OverallStatus::Atkt);
        assert_eq!(
            vikram.marksheet.subject("OS").map(crate::SubjectResult::grade),
            Some("F")
        );
    }

    #[test]
    fn one_bad_mark_rejects_the_whole_row() {
        let text = "Roll Number,Student Name,DS,OS\nCS01,Asha Rao,87,abc\nCS02,Vikram Das,101,\n";
        let snapshot = fixture_snapshot();
        let ingestion = ingest_now(BatchKind::Marks, text, &snapshot);

        assert_eq!(ingestion.report.processed, 0);
        assert_eq!(
            ingestion.report.errors,
            vec![
                "Row 2: mark for OS is not a number ('abc')".to_string(),
                "Row 3: mark for DS must be between 0 and 100 (got 101)".to_string(),
                "Row 3: mark for OS is blank".to_string(),
            ]
        );
        assert!(ingestion.write.is_empty());
    }

    #[test]
    fn unknown_student_in_marks_batch_is_a_warning() {
        let text = "Roll Number,Student Name,DS,OS\nCS99,Ghost,50,50\n";
        let ingestion = ingest_now(BatchKind::Marks, text, &fixture_snapshot());

        assert!(ingestion.report.success);
        assert_eq!(ingestion.report.processed, 0);
        assert_eq!(
            ingestion.report.warnings,
            vec!["Row 2: student not found (roll number CS99)".to_string()]
        );
    }

    #[test]
    fn marks_name_mismatch_is_accepted_with_warning() {
        let text = "Roll Number,Student Name,DS,OS\nCS01,A. Rao,70,70\n";
        let ingestion = ingest_now(BatchKind::Marks, text, &fixture_snapshot());
        assert_eq!(ingestion.report.processed, 1);
        assert_eq!(ingestion.report.warnings.len(), 1);
    }

    #[test]
    fn second_identical_marks_batch_changes_nothing() {
        let mut store = fixture_snapshot();
        let text = "Roll Number,Student Name,DS,OS\nCS01,Asha Rao,87,65\nCS02,Vikram Das,91,45\n";

        let first = must_ok(ingest_into(&mut store, BatchKind::Marks, text, crate::now_utc()));
        assert_eq!(first.processed, 2);
        let after_first = store.clone();

        let second = must_ok(ingest_into(&mut store, BatchKind::Marks, text, crate::now_utc()));
        assert_eq!(second.processed, 0);
        assert_eq!(second.warnings.len(), 2);
        assert!(second
            .warnings
            .iter()
            .all(|warning| warning.contains("duplicate")));
        assert_eq!(store, after_first);
    }

    #[test]
    fn second_identical_roster_batch_changes_nothing() {
        let mut store = RecordSnapshot::default();
        let text = format!(
            "{ROSTER_HEADER}\n\
             Asha,CS09,asha@example.edu,8.1,5,CSE,900,Pune\n\
             Ravi,CS11,ravi@example.edu,7.0,5,CSE,902,Pune\n"
        );

        let first = must_ok(ingest_into(&mut store, BatchKind::Roster, &text, crate::now_utc()));
        assert_eq!(first.processed, 2);
        let after_first = store.clone();

        let second = must_ok(ingest_into(&mut store, BatchKind::Roster, &text, crate::now_utc()));
        assert_eq!(second.processed, 0);
        assert_eq!(second.warnings.len(), 2);
        assert_eq!(store, after_first);
    }

    #[test]
    fn duplicate_roll_in_same_marks_batch_is_skipped() {
        let text = "Roll Number,Student Name,DS,OS\nCS01,Asha Rao,87,65\nCS01,Asha Rao,20,20\n";
        let ingestion = ingest_now(BatchKind::Marks, text, &fixture_snapshot());

        assert_eq!(ingestion.report.processed, 1);
        assert_eq!(
            ingestion.report.warnings,
            vec!["Row 3: duplicate roll number CS01 earlier in this batch".to_string()]
        );
        assert_eq!(
            ingestion.write.students[0].marksheet.subject("DS").map(crate::SubjectResult::mark),
            Some(87.0)
        );
    }

    #[test]
    fn later_subject_is_filled_by_batch_without_touching_recorded_marks() {
        let mut store = fixture_snapshot();
        let first = "Roll Number,Student Name,DS,OS\nCS01,Asha Rao,87,65\n";
        assert_eq!(
            must_ok(ingest_into(&mut store, BatchKind::Marks, first, crate::now_utc())).processed,
            1
        );

        store.subjects.push(SubjectDefinition {
            code: "ML".to_string(),
            name: "Machine Learning".to_string(),
            credits: 3,
            max_marks: 100.0,
        });
        let second = "Roll Number,Student Name,DS,OS,ML\nCS01,Asha Rao,,,72\n";
        let report = must_ok(ingest_into(&mut store, BatchKind::Marks, second, crate::now_utc()));
        assert_eq!(report.processed, 1);
        assert!(report.errors.is_empty());

        let marksheet = &store.students["CS01"].marksheet;
        assert_eq!(marksheet.subject("DS").map(crate::SubjectResult::mark), Some(87.0));
        assert_eq!(marksheet.subject("ML").map(crate::SubjectResult::mark), Some(72.0));
        // (9 * 4 + 7 * 3 + 8 * 3) / 10
        assert_eq!(marksheet.sgpa(), 8.1);

        let overwrite = "Roll Number,Student Name,DS,OS,ML\nCS01,Asha Rao,20,,\n";
        let report = must_ok(ingest_into(&mut store, BatchKind::Marks, overwrite, crate::now_utc()));
        assert_eq!(report.processed, 0);
        assert_eq!(
            report.warnings,
            vec![
                "Row 2: duplicate marks for roll number CS01: already recorded for DS".to_string()
            ]
        );

        let blank = "Roll Number,Student Name,DS,OS,ML\nCS01,Asha Rao,,,\n";
        let report = must_ok(ingest_into(&mut store, BatchKind::Marks, blank, crate::now_utc()));
        assert_eq!(report.processed, 0);
        assert_eq!(
            report.warnings,
            vec!["Row 2: no new marks for roll number CS01".to_string()]
        );
        let kept = store.students["CS01"].marksheet.subject("DS");
        assert_eq!(kept.map(crate::SubjectResult::mark), Some(87.0));
    }

    #[test]
    fn marks_batch_without_subjects_is_misconfigured() {
        let result = ingest(
            BatchKind::Marks,
            "Roll Number,Student Name\n",
            &RecordSnapshot::default(),
            crate::now_utc(),
        );
        assert!(matches!(result, Err(PlacementError::Configuration(_))));
    }

    #[test]
    fn pending_request_duplicates_are_skipped() {
        let text = "Type,Student Name,Roll Number,Email,Phone,CGPA,Semester,Description,Urgency\n\
                    Registration,Meera,IT07,meera@example.edu,900,8.0,3,New joiner,Critical\n\
                    registration,Meera,IT07,meera@example.edu,900,8.0,3,Again,\n\
                    Bonafide,Meera,IT07,meera@example.edu,900,8.0,3,Letter,Low\n";
        let ingestion = ingest_now(BatchKind::Requests, text, &RecordSnapshot::default());

        assert_eq!(ingestion.report.processed, 2);
        assert_eq!(
            ingestion.report.warnings,
            vec![
                "Row 2: unknown urgency 'Critical'; recorded as Medium".to_string(),
                "Row 3: duplicate pending Registration request for roll number IT07".to_string(),
                "Row 4: unknown request type 'Bonafide'; recorded as Other".to_string(),
            ]
        );
        let requests = &ingestion.write.requests;
        assert_eq!(requests[0].urgency, Urgency::Medium);
        assert_eq!(requests[1].request_type, RequestType::Other);
        assert!(requests
            .iter()
            .all(|request| request.status == RequestStatus::Pending));
    }

    #[test]
    fn decided_request_no_longer_blocks_resubmission() {
        let text = "Type,Student Name,Roll Number,Email,Phone,CGPA,Semester,Description\n\
                    Profile Update,Meera,IT07,meera@example.edu,900,8.0,3,New phone\n";
        let mut store = RecordSnapshot::default();
        let first = must_ok(ingest_into(&mut store, BatchKind::Requests, text, crate::now_utc()));
        assert_eq!(first.processed, 1);

        store.requests[0].status = RequestStatus::Rejected;
        let second = must_ok(ingest_into(&mut store, BatchKind::Requests, text, crate::now_utc()));
        assert_eq!(second.processed, 1);
        assert_eq!(store.requests.len(), 2);
    }

    #[test]
    fn mark_edit_regrades_single_student() {
        let mut snapshot = fixture_snapshot();
        let text = "Roll Number,Student Name,DS,OS\nCS02,Vikram Das,91,35\n";
        must_ok(ingest_into(&mut snapshot, BatchKind::Marks, text, crate::now_utc()));
        assert_eq!(
            snapshot.students["CS02"].marksheet.overall_status(),
            OverallStatus::Atkt
        );

        let updated = must_ok(apply_mark_edit(
            &snapshot.students,
            &snapshot.subjects,
            &snapshot.scale,
            "CS02",
            "OS",
            52.0,
        ));
        assert_eq!(updated.marksheet.overall_status(), OverallStatus::Pass);
        assert_eq!(updated.marksheet.subject("OS").map(crate::SubjectResult::grade), Some("C+"));

        let invalid = apply_mark_edit(
            &snapshot.students,
            &snapshot.subjects,
            &snapshot.scale,
            "CS02",
            "OS",
            120.0,
        );
        assert!(matches!(invalid, Err(PlacementError::Validation(_))));
        let unknown = apply_mark_edit(
            &snapshot.students,
            &snapshot.subjects,
            &snapshot.scale,
            "CS02",
            "PHY",
            50.0,
        );
        assert!(matches!(unknown, Err(PlacementError::NotFound(_))));
    }

    #[test]
    fn row_numbers_follow_source_lines() {
        let batch = must_ok(parse_batch("A,B\n1,2\n\n3,4\n"));
        let lines = batch.rows.iter().map(|row| row.line).collect::<Vec<_>>();
        assert_eq!(lines, vec![2, 4]);
    }
}
