#![allow(clippy::missing_errors_doc)]

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use placement_core::{
    format_rfc3339, now_utc, parse_rfc3339_utc, ApprovalRequest, BatchKind, CompanyReference,
    GradingScale, IngestionReport, Marksheet, Package, PackageUnit, PlacementError,
    PlacementRecord, PlacementStatus, RecordSnapshot, RecordStore, RequestStatus, RequestType,
    StudentResult, StudentSet, SubjectDefinition, Urgency, WriteBatch,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use ulid::Ulid;

const PLACEMENT_MIGRATION_VERSION: i64 = 1;
const GRADING_SCALE_KEY: &str = "grading_scale";

const SCHEMA_PLACEMENT_V1: &str = r"
CREATE TABLE IF NOT EXISTS subjects (
  code TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  credits INTEGER NOT NULL CHECK (credits >= 1),
  max_marks REAL NOT NULL CHECK (max_marks > 0),
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS companies (
  name TEXT PRIMARY KEY COLLATE NOCASE,
  tier TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
  key TEXT PRIMARY KEY,
  value_json TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS students (
  roll_number TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  email TEXT NOT NULL,
  phone TEXT NOT NULL,
  address TEXT NOT NULL,
  branch TEXT NOT NULL,
  semester INTEGER NOT NULL CHECK (semester BETWEEN 0 AND 255),
  cgpa REAL NOT NULL,
  attendance REAL NOT NULL,
  placement_status TEXT NOT NULL CHECK (
    placement_status IN ('Placed', 'Not Placed', 'In Process', 'Higher Studies')
  ),
  company TEXT,
  package_amount REAL CHECK (package_amount >= 0 OR package_amount IS NULL),
  package_unit TEXT CHECK (package_unit IN ('lakhs', 'crores', 'rupees') OR package_unit IS NULL),
  joining_date TEXT,
  skills_json TEXT NOT NULL DEFAULT '[]',
  projects_json TEXT NOT NULL DEFAULT '[]',
  internships_json TEXT NOT NULL DEFAULT '[]',
  certifications_json TEXT NOT NULL DEFAULT '[]',
  sgpa REAL NOT NULL DEFAULT 0 CHECK (sgpa BETWEEN 0.0 AND 10.0),
  overall_status TEXT NOT NULL CHECK (overall_status IN ('Pass', 'ATKT')),
  updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_students_branch ON students(branch);

CREATE TABLE IF NOT EXISTS subject_results (
  roll_number TEXT NOT NULL,
  subject_code TEXT NOT NULL,
  mark REAL NOT NULL CHECK (mark >= 0),
  grade TEXT NOT NULL,
  grade_point INTEGER NOT NULL CHECK (grade_point BETWEEN 0 AND 10),
  status TEXT NOT NULL CHECK (status IN ('Pass', 'Fail')),
  PRIMARY KEY (roll_number, subject_code),
  FOREIGN KEY (roll_number) REFERENCES students(roll_number) ON DELETE CASCADE,
  FOREIGN KEY (subject_code) REFERENCES subjects(code)
);

CREATE TABLE IF NOT EXISTS approval_requests (
  request_seq INTEGER PRIMARY KEY AUTOINCREMENT,
  request_id TEXT NOT NULL UNIQUE,
  request_type TEXT NOT NULL CHECK (
    request_type IN (
      'Registration',
      'Profile Update',
      'Document Verification',
      'Placement Drive',
      'Other'
    )
  ),
  student_name TEXT NOT NULL,
  roll_number TEXT NOT NULL,
  email TEXT NOT NULL,
  phone TEXT NOT NULL,
  cgpa REAL NOT NULL,
  semester INTEGER NOT NULL CHECK (semester BETWEEN 0 AND 255),
  description TEXT NOT NULL,
  documents_json TEXT NOT NULL DEFAULT '[]',
  urgency TEXT NOT NULL CHECK (urgency IN ('Low', 'Medium', 'High')),
  status TEXT NOT NULL CHECK (status IN ('Pending', 'Approved', 'Rejected')),
  submitted_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_approval_requests_roll_status
  ON approval_requests(roll_number, status);

CREATE TABLE IF NOT EXISTS ingestion_batches (
  batch_seq INTEGER PRIMARY KEY AUTOINCREMENT,
  batch_id TEXT NOT NULL UNIQUE,
  kind TEXT NOT NULL CHECK (kind IN ('marks', 'roster', 'requests')),
  source TEXT NOT NULL,
  success INTEGER NOT NULL CHECK (success IN (0, 1)),
  processed INTEGER NOT NULL CHECK (processed >= 0),
  error_count INTEGER NOT NULL CHECK (error_count >= 0),
  warning_count INTEGER NOT NULL CHECK (warning_count >= 0),
  report_json TEXT NOT NULL,
  recorded_at TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS trg_ingestion_batches_no_update
BEFORE UPDATE ON ingestion_batches
BEGIN
  SELECT RAISE(FAIL, 'ingestion_batches is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_ingestion_batches_no_delete
BEFORE DELETE ON ingestion_batches
BEGIN
  SELECT RAISE(FAIL, 'ingestion_batches is append-only');
END;
";

pub struct SqliteRecordStore {
    conn: Connection,
}

/// One entry of the ingestion audit log.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct BatchRecord {
    pub batch_seq: i64,
    pub batch_id: Ulid,
    pub kind: BatchKind,
    pub source: String,
    pub recorded_at: String,
    pub report: IngestionReport,
}

impl SqliteRecordStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_PLACEMENT_V1)
            .context("failed to apply placement schema")?;

        let now = timestamp()?;
        let standard = serde_json::to_string(&GradingScale::standard())
            .context("failed to serialize standard grading scale")?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO settings(key, value_json, updated_at) VALUES (?1, ?2, ?3)",
                params![GRADING_SCALE_KEY, standard, now],
            )
            .context("failed to initialize grading scale")?;

        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![PLACEMENT_MIGRATION_VERSION, now],
            )
            .context("failed to register placement schema migration")?;

        Ok(())
    }

    pub fn upsert_subject(&self, subject: &SubjectDefinition) -> Result<()> {
        subject
            .validate()
            .map_err(|err| anyhow!("invalid subject definition: {err}"))?;

        // Stored marks must stay within [0, max_marks] or regrading on load fails.
        let highest: Option<f64> = self
            .conn
            .query_row(
                "SELECT MAX(mark) FROM subject_results WHERE subject_code = ?1",
                params![subject.code],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to read stored marks for subject {}", subject.code))?;
        if let Some(highest) = highest {
            if highest > subject.max_marks {
                return Err(anyhow!(
                    "max_marks {} for subject {} is below a stored mark of {highest}",
                    subject.max_marks,
                    subject.code
                ));
            }
        }

        self.conn
            .execute(
                "INSERT INTO subjects(code, name, credits, max_marks, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(code) DO UPDATE SET
                   name = excluded.name,
                   credits = excluded.credits,
                   max_marks = excluded.max_marks,
                   updated_at = excluded.updated_at",
                params![
                    subject.code,
                    subject.name,
                    i64::from(subject.credits),
                    subject.max_marks,
                    timestamp()?
                ],
            )
            .with_context(|| format!("failed to upsert subject {}", subject.code))?;

        Ok(())
    }

    pub fn list_subjects(&self) -> Result<Vec<SubjectDefinition>> {
        let mut stmt = self
            .conn
            .prepare("SELECT code, name, credits, max_marks FROM subjects ORDER BY code ASC")?;
        let rows = stmt.query_map([], parse_subject_row)?;
        collect_rows(rows)
    }

    pub fn upsert_company(&self, company: &CompanyReference) -> Result<()> {
        let name = company.name.trim();
        if name.is_empty() {
            return Err(anyhow!("company name MUST be provided"));
        }

        self.conn
            .execute(
                "INSERT INTO companies(name, tier, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                   tier = excluded.tier,
                   updated_at = excluded.updated_at",
                params![name, company.tier.trim(), timestamp()?],
            )
            .with_context(|| format!("failed to upsert company {name}"))?;

        Ok(())
    }

    pub fn list_companies(&self) -> Result<Vec<CompanyReference>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, tier FROM companies ORDER BY name COLLATE NOCASE ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(CompanyReference {
                name: row.get(0)?,
                tier: row.get(1)?,
            })
        })?;
        collect_rows(rows)
    }

    pub fn set_grading_scale(&self, scale: &GradingScale) -> Result<()> {
        scale
            .validate()
            .map_err(|err| anyhow!("invalid grading scale: {err}"))?;

        let payload = serde_json::to_string(scale).context("failed to serialize grading scale")?;
        self.conn
            .execute(
                "INSERT INTO settings(key, value_json, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value_json = excluded.value_json,
                   updated_at = excluded.updated_at",
                params![GRADING_SCALE_KEY, payload, timestamp()?],
            )
            .context("failed to store grading scale")?;

        Ok(())
    }

    /// Active grading scale; the standard table until one is set.
    pub fn grading_scale(&self) -> Result<GradingScale> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = ?1",
                params![GRADING_SCALE_KEY],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read grading scale")?;

        let Some(json) = stored else {
            return Ok(GradingScale::standard());
        };
        let value: Value =
            serde_json::from_str(&json).context("invalid stored grading scale JSON")?;
        GradingScale::from_json(&value)
            .map_err(|err| anyhow!("failed to load grading scale: {err}"))
    }

    /// Appends one audit entry for a completed (non dry-run) ingestion.
    pub fn record_batch(
        &self,
        kind: BatchKind,
        source: &str,
        report: &IngestionReport,
    ) -> Result<BatchRecord> {
        append_batch(&self.conn, kind, source, report)
    }

    /// Writes the accepted records of one ingestion and its audit entry in a
    /// single transaction. Either both land or neither does.
    pub fn commit_ingestion(
        &mut self,
        batch: &WriteBatch,
        kind: BatchKind,
        source: &str,
        report: &IngestionReport,
    ) -> Result<BatchRecord> {
        let now = timestamp()?;
        let tx = self
            .conn
            .transaction()
            .context("failed to start ingestion transaction")?;

        write_into(&tx, batch, &now)?;
        let record = append_batch(&tx, kind, source, report)?;

        tx.commit().context("failed to commit ingestion transaction")?;
        Ok(record)
    }

    pub fn list_batches(&self, limit: Option<usize>) -> Result<Vec<BatchRecord>> {
        let mut query = "SELECT batch_seq, batch_id, kind, source, recorded_at, report_json
             FROM ingestion_batches
             ORDER BY batch_seq DESC"
            .to_string();

        if let Some(raw_limit) = limit {
            query.push_str(" LIMIT ");
            query.push_str(&raw_limit.to_string());
        }

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map([], parse_batch_row)?;
        collect_rows(rows)
    }

    /// Full record collection with every marksheet regraded against the
    /// current subjects and grading scale.
    pub fn snapshot(&self) -> Result<RecordSnapshot> {
        let subjects = self.list_subjects()?;
        let scale = self.grading_scale()?;
        let students = self.load_students(&subjects, &scale)?;

        Ok(RecordSnapshot {
            subjects,
            scale,
            students,
            requests: self.list_requests()?,
            companies: self.list_companies()?,
        })
    }

    fn load_students(
        &self,
        subjects: &[SubjectDefinition],
        scale: &GradingScale,
    ) -> Result<StudentSet> {
        let mut marks: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT roll_number, subject_code, mark FROM subject_results
                 ORDER BY roll_number ASC, subject_code ASC",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let roll_number: String = row.get(0)?;
                let code: String = row.get(1)?;
                let mark: f64 = row.get(2)?;
                marks.entry(roll_number).or_default().insert(code, mark);
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT
                roll_number, name, email, phone, address, branch,
                semester, cgpa, attendance, placement_status, company,
                package_amount, package_unit, joining_date,
                skills_json, projects_json, internships_json, certifications_json
             FROM students
             ORDER BY roll_number ASC",
        )?;
        let rows = stmt.query_map([], parse_student_row)?;

        let mut students = StudentSet::new();
        for mut student in collect_rows(rows)? {
            if let Some(student_marks) = marks.get(&student.roll_number) {
                student.marksheet = Marksheet::grade(student_marks, subjects, scale).map_err(
                    |err| anyhow!("failed to regrade student {}: {err}", student.roll_number),
                )?;
            }
            students.insert(student.roll_number.clone(), student);
        }

        Ok(students)
    }

    fn list_requests(&self) -> Result<Vec<ApprovalRequest>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                request_id, request_type, student_name, roll_number, email, phone,
                cgpa, semester, description, documents_json, urgency, status, submitted_at
             FROM approval_requests
             ORDER BY request_seq ASC",
        )?;
        let rows = stmt.query_map([], parse_request_row)?;
        collect_rows(rows)
    }

    fn write_records(&mut self, batch: &WriteBatch) -> Result<()> {
        let now = timestamp()?;
        let tx = self
            .conn
            .transaction()
            .context("failed to start write transaction")?;

        write_into(&tx, batch, &now)?;
        tx.commit().context("failed to commit write transaction")?;
        Ok(())
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl RecordStore for SqliteRecordStore {
    fn read_all(&self) -> Result<RecordSnapshot, PlacementError> {
        self.snapshot().map_err(store_error)
    }

    fn write_batch(&mut self, batch: &WriteBatch) -> Result<(), PlacementError> {
        self.write_records(batch).map_err(store_error)
    }
}

fn write_into(conn: &Connection, batch: &WriteBatch, now: &str) -> Result<()> {
    for student in &batch.students {
        upsert_student(conn, student, now)?;
    }
    for request in &batch.requests {
        upsert_request(conn, request, now)?;
    }
    Ok(())
}

fn append_batch(
    conn: &Connection,
    kind: BatchKind,
    source: &str,
    report: &IngestionReport,
) -> Result<BatchRecord> {
    let batch_id = Ulid::new();
    let recorded_at = timestamp()?;

    conn.execute(
        "INSERT INTO ingestion_batches(
            batch_id, kind, source, success, processed,
            error_count, warning_count, report_json, recorded_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            batch_id.to_string(),
            kind.as_str(),
            source,
            i64::from(report.success),
            count_to_sql(report.processed)?,
            count_to_sql(report.errors.len())?,
            count_to_sql(report.warnings.len())?,
            serde_json::to_string(report).context("failed to serialize report")?,
            recorded_at,
        ],
    )
    .context("failed to append ingestion batch")?;

    Ok(BatchRecord {
        batch_seq: conn.last_insert_rowid(),
        batch_id,
        kind,
        source: source.to_string(),
        recorded_at,
        report: report.clone(),
    })
}

fn upsert_student(conn: &Connection, student: &StudentResult, now: &str) -> Result<()> {
    let placement = &student.placement;
    conn.execute(
        "INSERT INTO students(
            roll_number, name, email, phone, address, branch,
            semester, cgpa, attendance, placement_status, company,
            package_amount, package_unit, joining_date,
            skills_json, projects_json, internships_json, certifications_json,
            sgpa, overall_status, updated_at
         ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9, ?10, ?11,
            ?12, ?13, ?14,
            ?15, ?16, ?17, ?18,
            ?19, ?20, ?21
         )
         ON CONFLICT(roll_number) DO UPDATE SET
            name = excluded.name,
            email = excluded.email,
            phone = excluded.phone,
            address = excluded.address,
            branch = excluded.branch,
            semester = excluded.semester,
            cgpa = excluded.cgpa,
            attendance = excluded.attendance,
            placement_status = excluded.placement_status,
            company = excluded.company,
            package_amount = excluded.package_amount,
            package_unit = excluded.package_unit,
            joining_date = excluded.joining_date,
            skills_json = excluded.skills_json,
            projects_json = excluded.projects_json,
            internships_json = excluded.internships_json,
            certifications_json = excluded.certifications_json,
            sgpa = excluded.sgpa,
            overall_status = excluded.overall_status,
            updated_at = excluded.updated_at",
        params![
            student.roll_number,
            student.name,
            student.email,
            student.phone,
            student.address,
            student.branch,
            i64::from(student.semester),
            student.cgpa,
            student.attendance,
            placement.status.as_str(),
            placement.company,
            placement.package.map(|package| package.amount),
            placement.package.map(|package| package.unit.as_str()),
            placement.joining_date,
            list_to_sql(&student.skills)?,
            list_to_sql(&student.projects)?,
            list_to_sql(&student.internships)?,
            list_to_sql(&student.certifications)?,
            student.marksheet.sgpa(),
            student.marksheet.overall_status().as_str(),
            now,
        ],
    )
    .with_context(|| format!("failed to upsert student {}", student.roll_number))?;

    conn.execute(
        "DELETE FROM subject_results WHERE roll_number = ?1",
        params![student.roll_number],
    )
    .with_context(|| format!("failed to clear marks for {}", student.roll_number))?;

    for (code, result) in student.marksheet.subjects() {
        conn.execute(
            "INSERT INTO subject_results(roll_number, subject_code, mark, grade, grade_point, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                student.roll_number,
                code,
                result.mark(),
                result.grade(),
                i64::from(result.grade_point()),
                result.status().as_str(),
            ],
        )
        .with_context(|| {
            format!(
                "failed to store {code} mark for student {}",
                student.roll_number
            )
        })?;
    }

    Ok(())
}

fn upsert_request(conn: &Connection, request: &ApprovalRequest, now: &str) -> Result<()> {
    let submitted_at =
        format_rfc3339(request.submitted_at).map_err(|err| anyhow!(err.to_string()))?;

    conn.execute(
        "INSERT INTO approval_requests(
            request_id, request_type, student_name, roll_number, email, phone,
            cgpa, semester, description, documents_json, urgency, status,
            submitted_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(request_id) DO UPDATE SET
            status = excluded.status,
            updated_at = excluded.updated_at",
        params![
            request.id.to_string(),
            request.request_type.as_str(),
            request.student_name,
            request.roll_number,
            request.email,
            request.phone,
            request.cgpa,
            i64::from(request.semester),
            request.description,
            list_to_sql(&request.documents)?,
            request.urgency.as_str(),
            request.status.as_str(),
            submitted_at,
            now,
        ],
    )
    .with_context(|| format!("failed to upsert approval request {}", request.id))?;

    Ok(())
}

fn parse_subject_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubjectDefinition> {
    let credits_i64: i64 = row.get(2)?;
    let credits = u32::try_from(credits_i64).map_err(|_| {
        invalid_data(2, Type::Integer, format!("invalid credits: {credits_i64}"))
    })?;

    Ok(SubjectDefinition {
        code: row.get(0)?,
        name: row.get(1)?,
        credits,
        max_marks: row.get(3)?,
    })
}

fn parse_student_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentResult> {
    let semester_i64: i64 = row.get(6)?;
    let status_raw: String = row.get(9)?;
    let package_amount: Option<f64> = row.get(11)?;
    let package_unit_raw: Option<String> = row.get(12)?;

    let semester = u8::try_from(semester_i64).map_err(|_| {
        invalid_data(6, Type::Integer, format!("invalid semester: {semester_i64}"))
    })?;

    let status = PlacementStatus::parse(&status_raw).ok_or_else(|| {
        invalid_data(9, Type::Text, format!("invalid placement_status: {status_raw}"))
    })?;

    let package = match (package_amount, package_unit_raw) {
        (Some(amount), Some(unit_raw)) => {
            let unit = PackageUnit::parse(&unit_raw).ok_or_else(|| {
                invalid_data(12, Type::Text, format!("invalid package_unit: {unit_raw}"))
            })?;
            Some(Package { amount, unit })
        }
        _ => None,
    };

    Ok(StudentResult {
        roll_number: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        address: row.get(4)?,
        branch: row.get(5)?,
        semester,
        cgpa: row.get(7)?,
        attendance: row.get(8)?,
        marksheet: Marksheet::default(),
        placement: PlacementRecord {
            status,
            company: row.get(10)?,
            package,
            joining_date: row.get(13)?,
        },
        skills: list_from_row(row, 14)?,
        projects: list_from_row(row, 15)?,
        internships: list_from_row(row, 16)?,
        certifications: list_from_row(row, 17)?,
    })
}

fn parse_request_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApprovalRequest> {
    let id_raw: String = row.get(0)?;
    let type_raw: String = row.get(1)?;
    let semester_i64: i64 = row.get(7)?;
    let urgency_raw: String = row.get(10)?;
    let status_raw: String = row.get(11)?;
    let submitted_raw: String = row.get(12)?;

    let id = Ulid::from_string(&id_raw)
        .map_err(|_| invalid_data(0, Type::Text, format!("invalid request_id: {id_raw}")))?;
    let request_type = RequestType::parse(&type_raw).ok_or_else(|| {
        invalid_data(1, Type::Text, format!("invalid request_type: {type_raw}"))
    })?;
    let semester = u8::try_from(semester_i64).map_err(|_| {
        invalid_data(7, Type::Integer, format!("invalid semester: {semester_i64}"))
    })?;
    let urgency = Urgency::parse(&urgency_raw)
        .ok_or_else(|| invalid_data(10, Type::Text, format!("invalid urgency: {urgency_raw}")))?;
    let status = RequestStatus::parse(&status_raw)
        .ok_or_else(|| invalid_data(11, Type::Text, format!("invalid status: {status_raw}")))?;
    let submitted_at = parse_rfc3339_utc(&submitted_raw)
        .map_err(|err| invalid_data(12, Type::Text, err.to_string()))?;

    Ok(ApprovalRequest {
        id,
        request_type,
        student_name: row.get(2)?,
        roll_number: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        cgpa: row.get(6)?,
        semester,
        description: row.get(8)?,
        documents: list_from_row(row, 9)?,
        urgency,
        status,
        submitted_at,
    })
}

fn parse_batch_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BatchRecord> {
    let batch_id_raw: String = row.get(1)?;
    let kind_raw: String = row.get(2)?;
    let report_json: String = row.get(5)?;

    let batch_id = Ulid::from_string(&batch_id_raw).map_err(|_| {
        invalid_data(1, Type::Text, format!("invalid batch_id: {batch_id_raw}"))
    })?;
    let kind = BatchKind::parse(&kind_raw)
        .ok_or_else(|| invalid_data(2, Type::Text, format!("invalid kind: {kind_raw}")))?;
    let report: IngestionReport = serde_json::from_str(&report_json)
        .map_err(|err| invalid_data(5, Type::Text, format!("invalid report_json: {err}")))?;

    Ok(BatchRecord {
        batch_seq: row.get(0)?,
        batch_id,
        kind,
        source: row.get(3)?,
        recorded_at: row.get(4)?,
        report,
    })
}

fn list_from_row(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(index)?;
    serde_json::from_str(&raw)
        .map_err(|err| invalid_data(index, Type::Text, format!("invalid JSON list: {err}")))
}

fn list_to_sql(values: &[String]) -> Result<String> {
    serde_json::to_string(values).context("failed to serialize list column")
}

fn count_to_sql(value: usize) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("count out of range: {value}"))
}

fn invalid_data(index: usize, kind: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        kind,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn timestamp() -> Result<String> {
    format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))
}

fn store_error(err: anyhow::Error) -> PlacementError {
    PlacementError::Store(format!("{err:#}"))
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}
