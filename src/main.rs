use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;

mod chart;
mod completion;
mod config;
mod context;
mod db;
mod effectiveness;
mod error;
mod logging;
mod models;
mod month;
mod overview;
mod performance;
mod report;
mod source;
mod stats;
mod trends;

use config::EngineConfig;
use context::MetricsContext;
use error::SnapshotError;
use models::Snapshot;
use report::{Artifact, ReportHeader, SectionReport};
use source::SnapshotSource;

#[derive(Parser)]
#[command(name = "mentorship-metrics")]
#[command(about = "Completion, performance, mentor and growth analytics for the mentorship platform", long_about = None)]
struct Cli {
    /// Where to read the snapshot from
    #[arg(long, value_enum, default_value_t = SourceKind::Postgres, global = true)]
    source: SourceKind,
    /// Directory holding users.csv, mentors.csv, courses.csv, enrollments.csv and submissions.csv
    #[arg(long, default_value = "data", global = true)]
    data_dir: PathBuf,
    /// TOML file overriding scoring weights, thresholds and leaderboard sizes
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    Postgres,
    Csv,
}

#[derive(Args)]
struct Outputs {
    /// JSON report path
    #[arg(long)]
    out: Option<PathBuf>,
    /// SVG chart path
    #[arg(long, conflicts_with = "no_chart")]
    chart: Option<PathBuf>,
    /// Skip writing the chart
    #[arg(long)]
    no_chart: bool,
}

impl Outputs {
    fn json_path(&self, default: &str) -> PathBuf {
        self.out.clone().unwrap_or_else(|| PathBuf::from(default))
    }

    fn chart_path(&self, default: &str) -> Option<PathBuf> {
        if self.no_chart {
            None
        } else {
            Some(self.chart.clone().unwrap_or_else(|| PathBuf::from(default)))
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze course completion rates and time to completion
    Completion {
        #[command(flatten)]
        outputs: Outputs,
    },
    /// Analyze graded submissions and student performance
    Performance {
        #[command(flatten)]
        outputs: Outputs,
    },
    /// Score mentor effectiveness and course success
    Mentors {
        #[command(flatten)]
        outputs: Outputs,
    },
    /// Monthly registration and enrollment trends
    Trends {
        #[command(flatten)]
        outputs: Outputs,
    },
    /// Run every analysis and write the combined report
    Report {
        #[command(flatten)]
        outputs: Outputs,
    },
}

impl Cli {
    fn snapshot_source(&self) -> Result<SnapshotSource, SnapshotError> {
        match self.source {
            SourceKind::Postgres => {
                let database_url =
                    std::env::var("DATABASE_URL").map_err(|_| SnapshotError::MissingDatabaseUrl)?;
                Ok(SnapshotSource::Postgres { database_url })
            }
            SourceKind::Csv => Ok(SnapshotSource::Csv {
                dir: self.data_dir.clone(),
            }),
        }
    }
}

/// Refuses to write artifacts for a run that has nothing to analyze.
fn require_rows(rows: usize, what: &str) -> anyhow::Result<()> {
    if rows == 0 {
        anyhow::bail!("no {what} found in the snapshot; nothing to analyze");
    }
    Ok(())
}

/// Renders every artifact first, writes them, and only then prints the summary.
fn write_outputs<T: Serialize>(
    summary: &str,
    json_path: PathBuf,
    value: &T,
    chart: Option<(PathBuf, Vec<chart::Panel>)>,
) -> anyhow::Result<()> {
    let mut artifacts = vec![Artifact::json(json_path, value)?];
    if let Some((path, panels)) = chart {
        artifacts.push(Artifact {
            path,
            contents: chart::render_svg(&panels),
        });
    }
    report::write_artifacts(&artifacts)?;

    print!("{summary}");
    println!();
    println!("Report saved to {}.", artifacts[0].path.display());
    for artifact in artifacts.iter().skip(1) {
        println!("Chart saved to {}.", artifact.path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let source = cli.snapshot_source()?;
    let snapshot: Snapshot = source
        .load()
        .await
        .with_context(|| format!("failed to load snapshot from {source}"))?;
    let ctx = MetricsContext::new(&snapshot, &config, Utc::now());
    let header = ReportHeader::new(source.to_string(), ctx.now);
    info!(run_id = %header.run_id, rows = snapshot.row_count(), "starting analysis");

    match &cli.command {
        Commands::Completion { outputs } => {
            require_rows(snapshot.enrollments.len(), "enrollments")?;
            let section = SectionReport::new(header, completion::analyze(&ctx));
            let summary = report::render_section(&section, "Course Completion Analysis", report::render_completion);
            let chart = outputs.chart_path("course_completion_analysis.svg").map(|path| {
                (
                    path,
                    vec![
                        chart::category_completion_panel(&section.metrics),
                        chart::difficulty_completion_panel(&section.metrics),
                    ],
                )
            });
            write_outputs(&summary, outputs.json_path("completion_report.json"), &section, chart)?;
        }
        Commands::Performance { outputs } => {
            require_rows(snapshot.submissions.len(), "submission records")?;
            let section = SectionReport::new(header, performance::analyze(&ctx));
            let summary =
                report::render_section(&section, "Student Performance Analysis", report::render_performance);
            let chart = outputs
                .chart_path("student_performance_analysis.svg")
                .map(|path| (path, vec![chart::grade_distribution_panel(&section.metrics)]));
            write_outputs(
                &summary,
                outputs.json_path("student_performance_report.json"),
                &section,
                chart,
            )?;
        }
        Commands::Mentors { outputs } => {
            require_rows(snapshot.courses.len(), "courses")?;
            let section = SectionReport::new(header, effectiveness::analyze(&ctx));
            let summary =
                report::render_section(&section, "Mentor Effectiveness Analysis", report::render_effectiveness);
            let chart = outputs.chart_path("mentor_effectiveness_analysis.svg").map(|path| {
                (
                    path,
                    vec![chart::top_mentors_panel(&section.metrics, config.top_n.mentors)],
                )
            });
            write_outputs(
                &summary,
                outputs.json_path("mentor_effectiveness_report.json"),
                &section,
                chart,
            )?;
        }
        Commands::Trends { outputs } => {
            require_rows(snapshot.users.len() + snapshot.enrollments.len(), "users or enrollments")?;
            let section = SectionReport::new(header, trends::analyze(&ctx));
            let summary = report::render_section(&section, "Growth Trends", report::render_trends);
            let chart = outputs.chart_path("growth_trends_analysis.svg").map(|path| {
                (
                    path,
                    vec![
                        chart::monthly_panel("Monthly registrations", &section.metrics.registrations),
                        chart::monthly_panel("Monthly enrollments", &section.metrics.enrollments),
                    ],
                )
            });
            write_outputs(&summary, outputs.json_path("growth_trends_report.json"), &section, chart)?;
        }
        Commands::Report { outputs } => {
            anyhow::ensure!(!snapshot.is_empty(), "snapshot is empty; nothing to analyze");
            let report = report::assemble(&ctx, header);
            let summary = report::render_report(&report);
            let chart = outputs.chart_path("platform_report.svg").map(|path| {
                (
                    path,
                    vec![
                        chart::grade_distribution_panel(&report.performance),
                        chart::category_completion_panel(&report.completion),
                        chart::top_mentors_panel(&report.effectiveness, config.top_n.report_mentors),
                        chart::monthly_panel("Monthly registrations", &report.trends.registrations),
                    ],
                )
            });
            write_outputs(&summary, outputs.json_path("platform_report.json"), &report, chart)?;
        }
    }

    Ok(())
}
