//! Command surface for the `placement` binary.
//!
//! [`run_cli`] executes a parsed [`Cli`]; [`run_with_store`] runs a single
//! command against an already opened [`SqliteRecordStore`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use placement_core::{
    aggregate, apply_mark_edit, decide_request, ingest, now_utc, template, AggregateStatistics,
    ApprovalRequest, BatchKind, CompanyReference, Decision, GradingScale, IngestionReport,
    RecordStore, RequestStatus, StudentResult, SubjectDefinition, WriteBatch,
};
use placement_store_sqlite::{BatchRecord, SqliteRecordStore};
use tracing::info;
use ulid::Ulid;

#[derive(Debug, Parser)]
#[command(name = "placement")]
#[command(about = "Academic results ingestion, grading and placement analytics")]
pub struct Cli {
    #[arg(long, env = "PLACEMENT_DB", default_value = "./placement.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Subjects {
        #[command(subcommand)]
        command: SubjectsCommand,
    },
    Companies {
        #[command(subcommand)]
        command: CompaniesCommand,
    },
    Scale {
        #[command(subcommand)]
        command: ScaleCommand,
    },
    Template(TemplateArgs),
    Ingest(IngestArgs),
    Students {
        #[command(subcommand)]
        command: StudentsCommand,
    },
    Requests {
        #[command(subcommand)]
        command: RequestsCommand,
    },
    Stats(JsonArgs),
    Batches {
        #[command(subcommand)]
        command: BatchesCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum SubjectsCommand {
    Add(SubjectAddArgs),
    List(JsonArgs),
}

#[derive(Debug, Args)]
pub struct SubjectAddArgs {
    #[arg(long)]
    code: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    credits: u32,
    #[arg(long, default_value_t = 100.0)]
    max_marks: f64,
}

#[derive(Debug, Subcommand)]
pub enum CompaniesCommand {
    Add(CompanyAddArgs),
    List(JsonArgs),
}

#[derive(Debug, Args)]
pub struct CompanyAddArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    tier: String,
}

#[derive(Debug, Subcommand)]
pub enum ScaleCommand {
    Show,
    Set(ScaleSetArgs),
}

#[derive(Debug, Args)]
pub struct ScaleSetArgs {
    #[arg(long)]
    file: PathBuf,
}

#[derive(Debug, Args)]
pub struct TemplateArgs {
    kind: BatchKindArg,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    kind: BatchKindArg,
    #[arg(long)]
    file: PathBuf,
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
pub enum StudentsCommand {
    List(StudentsListArgs),
    Show(StudentShowArgs),
    SetMark(SetMarkArgs),
}

#[derive(Debug, Args)]
pub struct StudentsListArgs {
    #[arg(long)]
    branch: Option<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct StudentShowArgs {
    #[arg(long)]
    roll: String,
}

#[derive(Debug, Args)]
pub struct SetMarkArgs {
    #[arg(long)]
    roll: String,
    #[arg(long)]
    subject: String,
    #[arg(long)]
    mark: f64,
}

#[derive(Debug, Subcommand)]
pub enum RequestsCommand {
    List(RequestsListArgs),
    Approve(DecideArgs),
    Reject(DecideArgs),
}

#[derive(Debug, Args)]
pub struct RequestsListArgs {
    #[arg(long)]
    status: Option<RequestStatusArg>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct DecideArgs {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Subcommand)]
pub enum BatchesCommand {
    List(BatchesListArgs),
}

#[derive(Debug, Args)]
pub struct BatchesListArgs {
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct JsonArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BatchKindArg {
    Marks,
    Roster,
    Requests,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RequestStatusArg {
    Pending,
    Approved,
    Rejected,
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when opening or migrating the store fails or the command
/// itself fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let mut store = SqliteRecordStore::open(&cli.db)?;
    store.migrate()?;
    run_with_store(cli.command, &mut store)
}

/// Executes one command against an existing store handle.
///
/// # Errors
/// Returns an error when validation, persistence or output fails, and when an
/// ingestion report carries row errors.
pub fn run_with_store(command: Command, store: &mut SqliteRecordStore) -> Result<()> {
    match command {
        Command::Subjects { command } => run_subjects(command, store),
        Command::Companies { command } => run_companies(command, store),
        Command::Scale { command } => run_scale(command, store),
        Command::Template(args) => {
            let snapshot = store.read_all()?;
            let text = template(map_kind(args.kind), &snapshot.subjects, &snapshot.students)?;
            match args.output {
                Some(path) => {
                    fs::write(&path, text)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("template written to {}", path.display());
                }
                None => print!("{text}"),
            }
            Ok(())
        }
        Command::Ingest(args) => run_ingest(&args, store),
        Command::Students { command } => run_students(command, store),
        Command::Requests { command } => run_requests(command, store),
        Command::Stats(args) => {
            let snapshot = store.read_all()?;
            let stats = aggregate(snapshot.students.values(), &snapshot.companies);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats);
            }
            Ok(())
        }
        Command::Batches {
            command: BatchesCommand::List(args),
        } => {
            let batches = store.list_batches(args.limit)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&batches)?);
            } else {
                print_batches(&batches);
            }
            Ok(())
        }
    }
}

fn run_subjects(command: SubjectsCommand, store: &SqliteRecordStore) -> Result<()> {
    match command {
        SubjectsCommand::Add(args) => {
            let subject = SubjectDefinition {
                code: args.code.trim().to_string(),
                name: args.name.trim().to_string(),
                credits: args.credits,
                max_marks: args.max_marks,
            };
            store.upsert_subject(&subject)?;
            println!("{}", serde_json::to_string_pretty(&subject)?);
            Ok(())
        }
        SubjectsCommand::List(args) => {
            let subjects = store.list_subjects()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&subjects)?);
            } else {
                print_subjects(&subjects);
            }
            Ok(())
        }
    }
}

fn run_companies(command: CompaniesCommand, store: &SqliteRecordStore) -> Result<()> {
    match command {
        CompaniesCommand::Add(args) => {
            let company = CompanyReference {
                name: args.name.trim().to_string(),
                tier: args.tier.trim().to_string(),
            };
            store.upsert_company(&company)?;
            println!("{}", serde_json::to_string_pretty(&company)?);
            Ok(())
        }
        CompaniesCommand::List(args) => {
            let companies = store.list_companies()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&companies)?);
            } else {
                println!("{:<32} tier", "company");
                println!("{}", "-".repeat(48));
                for company in &companies {
                    println!("{:<32} {}", company.name, company.tier);
                }
            }
            Ok(())
        }
    }
}

fn run_scale(command: ScaleCommand, store: &SqliteRecordStore) -> Result<()> {
    match command {
        ScaleCommand::Show => {
            println!("{}", serde_json::to_string_pretty(&store.grading_scale()?)?);
            Ok(())
        }
        ScaleCommand::Set(args) => {
            let body = fs::read_to_string(&args.file)
                .with_context(|| format!("failed to read {}", args.file.display()))?;
            let value = serde_json::from_str(&body)
                .with_context(|| format!("invalid JSON in {}", args.file.display()))?;
            let scale = GradingScale::from_json(&value)?;
            store.set_grading_scale(&scale)?;
            println!("{}", serde_json::to_string_pretty(&scale)?);
            Ok(())
        }
    }
}

fn run_ingest(args: &IngestArgs, store: &mut SqliteRecordStore) -> Result<()> {
    let kind = map_kind(args.kind);
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let snapshot = store.read_all()?;
    let ingestion = ingest(kind, &text, &snapshot, now_utc())?;

    let batch = if args.dry_run {
        None
    } else {
        let record = store.commit_ingestion(
            &ingestion.write,
            kind,
            &source_name(&args.file),
            &ingestion.report,
        )?;
        info!(
            batch_id = %record.batch_id,
            kind = kind.as_str(),
            processed = ingestion.report.processed,
            "ingestion recorded"
        );
        Some(record)
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ingestion.report)?);
    } else {
        print_report(kind, batch.as_ref(), &ingestion.report);
    }

    if ingestion.report.success {
        Ok(())
    } else {
        Err(anyhow!(
            "ingestion finished with {} error(s)",
            ingestion.report.errors.len()
        ))
    }
}

fn run_students(command: StudentsCommand, store: &mut SqliteRecordStore) -> Result<()> {
    match command {
        StudentsCommand::List(args) => {
            let snapshot = store.read_all()?;
            let students = snapshot
                .students
                .values()
                .filter(|student| match args.branch.as_deref() {
                    Some(branch) => student.branch.eq_ignore_ascii_case(branch),
                    None => true,
                })
                .collect::<Vec<_>>();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&students)?);
            } else {
                print_students(&students);
            }
            Ok(())
        }
        StudentsCommand::Show(args) => {
            let snapshot = store.read_all()?;
            let Some(student) = snapshot.students.get(&args.roll) else {
                return Err(anyhow!("student not found: {}", args.roll));
            };
            println!("{}", serde_json::to_string_pretty(student)?);
            Ok(())
        }
        StudentsCommand::SetMark(args) => {
            let snapshot = store.read_all()?;
            let updated = apply_mark_edit(
                &snapshot.students,
                &snapshot.subjects,
                &snapshot.scale,
                &args.roll,
                &args.subject,
                args.mark,
            )?;
            store.write_batch(&WriteBatch {
                students: vec![updated.clone()],
                requests: Vec::new(),
            })?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
            Ok(())
        }
    }
}

fn run_requests(command: RequestsCommand, store: &mut SqliteRecordStore) -> Result<()> {
    let (id_raw, decision) = match command {
        RequestsCommand::List(args) => {
            let snapshot = store.read_all()?;
            let wanted = args.status.map(map_status);
            let requests = snapshot
                .requests
                .iter()
                .filter(|request| match wanted {
                    Some(status) => request.status == status,
                    None => true,
                })
                .collect::<Vec<_>>();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&requests)?);
            } else {
                print_requests(&requests);
            }
            return Ok(());
        }
        RequestsCommand::Approve(args) => (args.id, Decision::Approve),
        RequestsCommand::Reject(args) => (args.id, Decision::Reject),
    };

    let id = Ulid::from_string(&id_raw)
        .map_err(|err| anyhow!("invalid request id {id_raw}: {err}"))?;
    let snapshot = store.read_all()?;
    let outcome = decide_request(&snapshot.requests, &snapshot.students, id, decision)?;

    store.write_batch(&WriteBatch {
        students: outcome.student.iter().cloned().collect(),
        requests: vec![outcome.request.clone()],
    })?;

    println!(
        "request {} {} ({} for {})",
        outcome.request.id,
        outcome.request.status.as_str().to_lowercase(),
        outcome.request.request_type.as_str(),
        outcome.request.roll_number
    );
    if let Some(student) = &outcome.student {
        let verb = if snapshot.students.contains_key(&student.roll_number) {
            "updated"
        } else {
            "enrolled"
        };
        println!("{verb} student {} ({})", student.roll_number, student.name);
    }
    Ok(())
}

fn map_kind(kind: BatchKindArg) -> BatchKind {
    match kind {
        BatchKindArg::Marks => BatchKind::Marks,
        BatchKindArg::Roster => BatchKind::Roster,
        BatchKindArg::Requests => BatchKind::Requests,
    }
}

fn map_status(status: RequestStatusArg) -> RequestStatus {
    match status {
        RequestStatusArg::Pending => RequestStatus::Pending,
        RequestStatusArg::Approved => RequestStatus::Approved,
        RequestStatusArg::Rejected => RequestStatus::Rejected,
    }
}

fn source_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn print_report(kind: BatchKind, batch: Option<&BatchRecord>, report: &IngestionReport) {
    println!(
        "batch={} kind={} success={} processed={} errors={} warnings={}",
        batch.map_or_else(|| "dry-run".to_string(), |record| record.batch_id.to_string()),
        kind.as_str(),
        yes_no(report.success),
        report.processed,
        report.errors.len(),
        report.warnings.len()
    );
    for error in &report.errors {
        println!("error: {error}");
    }
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
}

fn print_subjects(subjects: &[SubjectDefinition]) {
    println!("{:<10} {:<32} {:<7} max_marks", "code", "name", "credits");
    println!("{}", "-".repeat(64));
    for subject in subjects {
        println!(
            "{:<10} {:<32} {:<7} {}",
            subject.code, subject.name, subject.credits, subject.max_marks
        );
    }
}

fn print_students(students: &[&StudentResult]) {
    println!(
        "{:<12} {:<24} {:<20} {:<4} {:<6} {:<6} {:<7} placement",
        "roll", "name", "branch", "sem", "cgpa", "sgpa", "status"
    );
    println!("{}", "-".repeat(110));
    for student in students {
        let placement = &student.placement;
        let mut summary = placement.status.as_str().to_string();
        if let Some(company) = &placement.company {
            summary.push_str(&format!(" @ {company}"));
        }
        if let Some(package) = placement.package {
            summary.push_str(&format!(" ({package})"));
        }
        println!(
            "{:<12} {:<24} {:<20} {:<4} {:<6.2} {:<6.2} {:<7} {}",
            student.roll_number,
            student.name,
            student.branch,
            student.semester,
            student.cgpa,
            student.marksheet.sgpa(),
            student.marksheet.overall_status().as_str(),
            summary
        );
    }
}

fn print_requests(requests: &[&ApprovalRequest]) {
    println!(
        "{:<26} {:<22} {:<12} {:<24} {:<7} status",
        "id", "type", "roll", "student", "urgency"
    );
    println!("{}", "-".repeat(110));
    for request in requests {
        println!(
            "{:<26} {:<22} {:<12} {:<24} {:<7} {}",
            request.id,
            request.request_type.as_str(),
            request.roll_number,
            request.student_name,
            request.urgency.as_str(),
            request.status.as_str()
        );
    }
}

fn print_stats(stats: &AggregateStatistics) {
    println!(
        "students={} placed={} rate={:.2}%",
        stats.total_students, stats.placed_students, stats.placement_rate
    );
    println!(
        "package_lpa average={:.2} median={:.2} highest={:.2}",
        stats.average_package, stats.median_package, stats.highest_package
    );

    println!();
    println!(
        "{:<24} {:<6} {:<6} {:<8} avg_package",
        "branch", "total", "placed", "rate"
    );
    println!("{}", "-".repeat(64));
    for branch in &stats.branch_wise_stats {
        println!(
            "{:<24} {:<6} {:<6} {:<8.2} {:.2}",
            branch.branch, branch.total, branch.placed, branch.rate, branch.avg_package
        );
    }

    println!();
    println!("{:<24} {:<10} {:<6} avg_package", "company", "tier", "hires");
    println!("{}", "-".repeat(64));
    for company in &stats.company_wise_stats {
        println!(
            "{:<24} {:<10} {:<6} {:.2}",
            company.company, company.tier, company.hires, company.avg_package
        );
    }

    println!();
    println!("{:<12} count", "range");
    println!("{}", "-".repeat(24));
    for bucket in &stats.package_distribution {
        println!("{:<12} {}", bucket.range, bucket.count);
    }
}

fn print_batches(batches: &[BatchRecord]) {
    println!(
        "{:<6} {:<26} {:<9} {:<24} {:<8} {:<9} {:<6} {:<8} recorded_at",
        "seq", "batch_id", "kind", "source", "success", "processed", "errors", "warnings"
    );
    println!("{}", "-".repeat(120));
    for batch in batches {
        println!(
            "{:<6} {:<26} {:<9} {:<24} {:<8} {:<9} {:<6} {:<8} {}",
            batch.batch_seq,
            batch.batch_id,
            batch.kind.as_str(),
            batch.source,
            yes_no(batch.report.success),
            batch.report.processed,
            batch.report.errors.len(),
            batch.report.warnings.len(),
            batch.recorded_at
        );
    }
}
