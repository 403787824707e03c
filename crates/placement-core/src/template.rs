use crate::model::{StudentResult, SubjectDefinition};
use crate::schema::{optional_headers, required_headers, BatchKind};
use crate::{PlacementError, StudentSet};

const SAMPLE_STUDENTS: [(&str, &str); 3] = [
    ("CS2021001", "Aarav Sharma"),
    ("EC2021014", "Diya Patel"),
    ("ME2021027", "Kabir Singh"),
];

const MARK_FRACTIONS: [f64; 3] = [0.86, 0.72, 0.64];

/// Renders a downloadable batch template: every required and optional header
/// followed by sample rows that ingest cleanly.
///
/// Marks rows name up to three enrolled students who still lack a mark for a
/// configured subject, leaving cells blank where a mark is already recorded.
/// An empty roster falls back to the roster template's sample students, so
/// ingesting the roster template and then the marks template accepts every row.
///
/// # Errors
/// Returns [`PlacementError::Configuration`] for a marks template with no
/// subjects configured.
pub fn template(
    kind: BatchKind,
    subjects: &[SubjectDefinition],
    students: &StudentSet,
) -> Result<String, PlacementError> {
    if kind == BatchKind::Marks && subjects.is_empty() {
        return Err(PlacementError::Configuration(
            "no subjects configured for a marks template".to_string(),
        ));
    }

    let mut headers = required_headers(kind, subjects);
    headers.extend(optional_headers(kind).iter().map(|header| (*header).to_string()));

    let rows = match kind {
        BatchKind::Marks => marks_rows(subjects, students),
        BatchKind::Roster => roster_rows(),
        BatchKind::Requests => request_rows(),
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&headers).map_err(render_error)?;
    for row in rows {
        writer.write_record(&row).map_err(render_error)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| render_error(err.to_string()))?;
    String::from_utf8(bytes).map_err(render_error)
}

fn render_error(err: impl std::fmt::Display) -> PlacementError {
    PlacementError::Validation(format!("failed to render template: {err}"))
}

fn marks_rows(subjects: &[SubjectDefinition], students: &StudentSet) -> Vec<Vec<String>> {
    let has_mark = |student: &StudentResult, code: &str| student.marksheet.subject(code).is_some();

    let mut chosen = students
        .values()
        .filter(|student| subjects.iter().any(|subject| !has_mark(*student, &subject.code)))
        .take(SAMPLE_STUDENTS.len())
        .collect::<Vec<_>>();
    if chosen.is_empty() {
        chosen = students.values().take(SAMPLE_STUDENTS.len()).collect();
    }

    let identities = if chosen.is_empty() {
        SAMPLE_STUDENTS
            .iter()
            .map(|(roll, name)| ((*roll).to_string(), (*name).to_string(), None))
            .collect::<Vec<_>>()
    } else {
        chosen
            .into_iter()
            .map(|student| (student.roll_number.clone(), student.name.clone(), Some(student)))
            .collect()
    };

    identities
        .into_iter()
        .enumerate()
        .map(|(row, (roll, name, student))| {
            let mut fields = vec![roll, name];
            fields.extend(subjects.iter().enumerate().map(|(column, subject)| {
                if student.is_some_and(|student| has_mark(student, &subject.code)) {
                    return String::new();
                }
                let fraction = MARK_FRACTIONS[(row + column) % MARK_FRACTIONS.len()];
                (subject.max_marks * fraction).round().to_string()
            }));
            fields
        })
        .collect()
}

fn roster_rows() -> Vec<Vec<String>> {
    let details = [
        [
            "aarav.sharma@college.edu",
            "8.72",
            "6",
            "Computer Science",
            "9876543210",
            "14 MG Road, Pune",
            "Placed",
            "Infosys",
            "6.5 LPA",
            "2025-07-01",
            "Java;SQL;React",
            "Library Management System",
            "Infosys Summer Internship",
            "AWS Cloud Practitioner",
            "92",
        ],
        [
            "diya.patel@college.edu",
            "9.10",
            "6",
            "Electronics",
            "9876543211",
            "7 Ring Road, Surat",
            "In Process",
            "",
            "",
            "",
            "Embedded C;VLSI",
            "Smart Irrigation Controller",
            "",
            "",
            "88.5",
        ],
        [
            "kabir.singh@college.edu",
            "7.45",
            "6",
            "Mechanical",
            "9876543212",
            "22 Mall Road, Ludhiana",
            "Not Placed",
            "",
            "",
            "",
            "AutoCAD;SolidWorks",
            "",
            "",
            "",
            "79",
        ],
    ];

    SAMPLE_STUDENTS
        .iter()
        .zip(details)
        .map(|((roll, name), rest)| {
            let mut fields = vec![(*name).to_string(), (*roll).to_string()];
            fields.extend(rest.iter().map(|value| (*value).to_string()));
            fields
        })
        .collect()
}

fn request_rows() -> Vec<Vec<String>> {
    [
        [
            "Registration",
            "Ishaan Verma",
            "IT2022005",
            "ishaan.verma@college.edu",
            "9876543213",
            "8.05",
            "4",
            "New student registration",
            "Admission Letter;ID Card",
            "Medium",
        ],
        [
            "Document Verification",
            "Aarav Sharma",
            "CS2021001",
            "aarav.sharma@college.edu",
            "9876543210",
            "8.72",
            "6",
            "Verify semester 5 marksheet",
            "Semester 5 Marksheet",
            "High",
        ],
        [
            "Placement Drive",
            "Diya Patel",
            "EC2021014",
            "diya.patel@college.edu",
            "9876543211",
            "9.10",
            "6",
            "Register for the campus drive",
            "Resume",
            "Low",
        ],
    ]
    .iter()
    .map(|row| row.iter().map(|value| (*value).to_string()).collect())
    .collect()
}
