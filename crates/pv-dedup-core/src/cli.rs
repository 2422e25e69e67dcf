//! Command-line interface for pv-dedup.
//!
//! Screens adverse-event submissions against a case database and records
//! reviewer decisions. Every command prints JSON to stdout.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::Settings;
use crate::db::Database;
use crate::dedup::{Deduplicator, LinkageWriter};
use crate::intake::parse_submission;
use crate::matcher::CaseMatchingEngine;
use crate::models::MatchReport;

/// pv-dedup - Duplicate screening for adverse-event reports
#[derive(Parser, Debug)]
#[command(name = "pv-dedup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Case database
    #[arg(long, global = true, env = "PV_DEDUP_DB", default_value = "pv-dedup.db")]
    pub db: PathBuf,

    /// Settings file (YAML)
    #[arg(long, global = true, env = "PV_DEDUP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Screen a submission against stored cases
    Screen {
        /// Submission JSON file ("-" for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Store a submission as a new active case
    Accept {
        /// Submission JSON file ("-" for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Screening report the decision was based on
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Reviewer identifier
        #[arg(long = "by", default_value = "cli")]
        decided_by: String,
    },

    /// Link a case to one of its screened matches
    Link {
        case_id: String,
        target_case_id: String,

        /// Screening report containing the target
        #[arg(short, long)]
        report: PathBuf,

        #[arg(short, long)]
        notes: Option<String>,

        /// Reviewer identifier
        #[arg(long = "by", default_value = "cli")]
        decided_by: String,
    },

    /// Discard a case as a duplicate of one of its screened matches
    Discard {
        case_id: String,
        target_case_id: String,

        /// Screening report containing the target
        #[arg(short, long)]
        report: PathBuf,

        #[arg(short, long)]
        notes: Option<String>,

        /// Reviewer identifier
        #[arg(long = "by", default_value = "cli")]
        decided_by: String,
    },

    /// Link a case to any stored case, bypassing screening
    Override {
        case_id: String,
        target_case_id: String,

        /// Why the reviewer overrode the screening
        #[arg(long)]
        reason: String,

        /// Reviewer identifier
        #[arg(long = "by", default_value = "cli")]
        decided_by: String,
    },

    /// Re-screen a stored case against the rest of the store
    Rescreen { case_id: String },

    /// Show a stored case
    Show {
        case_id: String,

        /// Include the linkage decision history
        #[arg(long)]
        history: bool,
    },
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let settings = Settings::load(self.config.as_deref())
            .context("Failed to load settings")?;
        let db = Database::open(&self.db)
            .with_context(|| format!("Failed to open database: {}", self.db.display()))?;

        match self.command {
            Commands::Screen { input } => screen(&db, &settings, &input),
            Commands::Accept {
                input,
                report,
                decided_by,
            } => accept(&db, &input, report.as_deref(), &decided_by),
            Commands::Link {
                case_id,
                target_case_id,
                report,
                notes,
                decided_by,
            } => {
                let report = read_report(&report)?;
                let stored = writer(&db, &settings)?.link(
                    &case_id,
                    &target_case_id,
                    &report,
                    notes.as_deref(),
                    &decided_by,
                )?;
                print_json(&stored)
            }
            Commands::Discard {
                case_id,
                target_case_id,
                report,
                notes,
                decided_by,
            } => {
                let report = read_report(&report)?;
                let stored = writer(&db, &settings)?.discard(
                    &case_id,
                    &target_case_id,
                    &report,
                    notes.as_deref(),
                    &decided_by,
                )?;
                print_json(&stored)
            }
            Commands::Override {
                case_id,
                target_case_id,
                reason,
                decided_by,
            } => {
                let stored = LinkageWriter::new(&db).override_link(
                    &case_id,
                    &target_case_id,
                    &reason,
                    &decided_by,
                )?;
                print_json(&stored)
            }
            Commands::Rescreen { case_id } => {
                let engine = CaseMatchingEngine::new(settings.matcher.clone())?;
                let dedup = Deduplicator::new(&db, engine, settings.candidates.clone());
                print_json(&dedup.screen_stored(&case_id)?)
            }
            Commands::Show { case_id, history } => show(&db, &case_id, history),
        }
    }
}

fn screen(db: &Database, settings: &Settings, input: &Path) -> Result<()> {
    let submission = parse_submission(&read_input(input)?)?;

    let mut engine = CaseMatchingEngine::new(settings.matcher.clone())?;
    if let Some(threshold) = submission.threshold {
        engine = engine.with_threshold(threshold)?;
    }

    let dedup = Deduplicator::new(db, engine, settings.candidates.clone());
    print_json(&dedup.screen_or_manual_review(&submission.case))
}

/// Writer that verifies duplicates with the configured matcher.
fn writer<'a>(db: &'a Database, settings: &Settings) -> Result<LinkageWriter<'a>> {
    let engine = CaseMatchingEngine::new(settings.matcher.clone())?;
    Ok(LinkageWriter::with_engine(db, engine))
}

fn accept(db: &Database, input: &Path, report: Option<&Path>, decided_by: &str) -> Result<()> {
    let submission = parse_submission(&read_input(input)?)?;
    let report = report.map(read_report).transpose()?;

    let stored = LinkageWriter::new(db).accept(&submission.case, report.as_ref(), decided_by)?;
    print_json(&stored)
}

fn show(db: &Database, case_id: &str, history: bool) -> Result<()> {
    let Some(case) = db.get_case(case_id)? else {
        bail!("Case not found: {}", case_id);
    };

    if history {
        let entries = db.linking_history(case_id)?;
        print_json(&serde_json::json!({ "case": case, "history": entries }))
    } else {
        print_json(&case)
    }
}

/// Read a file, or stdin when the path is "-".
fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        return Ok(buffer);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Accepts either a bare report or the output of `screen`.
fn read_report(path: &Path) -> Result<MatchReport> {
    let value: serde_json::Value = serde_json::from_str(&read_input(path)?)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;

    if value.get("outcome").and_then(|o| o.as_str()) == Some("manual_review") {
        bail!("{} is a manual-review screening and has no matches", path.display());
    }
    serde_json::from_value(value)
        .with_context(|| format!("{} is not a screening report", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
