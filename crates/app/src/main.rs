use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pressline::{ingest, RecordSet, RecordSetError, DEFAULT_WORKERS};
use pressline_core::SourceFamily;
use pressline_import::import::default_pipeline;
use pressline_import::SheetTemplate;
use pressline_reconcile::{reconcile, ConfigError, MasterTotals, ReconciliationConfig};
use pressline_storage::{MemorySink, RecordSink, SqliteSink};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Spreadsheet ingestion and scrap/adjustment reconciliation for the press shop.
#[derive(Parser, Debug)]
#[command(name = "pressline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a directory of period files (or one file) into the record store
    Ingest {
        /// hit-tracker, scrap-log or inventory-adjustment
        source_type: SourceFamily,
        /// Directory of period files, or a single file
        path: PathBuf,
        /// SQLite database to upsert into; without it nothing is persisted
        #[arg(long, env = "PRESSLINE_DB")]
        db: Option<PathBuf>,
        /// Plant configuration (templates, filename pattern)
        #[arg(long, env = "PRESSLINE_CONFIG")]
        config: Option<PathBuf>,
        /// Write the ingested records as a JSON record set
        #[arg(long)]
        export: Option<PathBuf>,
        /// Files read concurrently
        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
    },
    /// Build the reconciliation report for a record set
    Reconcile {
        /// JSON export, or the SQLite database written by `ingest --db`
        record_set: PathBuf,
        #[arg(long, env = "PRESSLINE_CONFIG")]
        config: PathBuf,
        /// Which records to read; required for a database
        #[arg(long)]
        source: Option<SourceFamily>,
        /// Master summary CSV with `period,total` columns
        #[arg(long)]
        master: Option<PathBuf>,
        /// Also write the report as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Print the built-in sheet templates as TOML
    Templates,
}

/// Bad arguments or configuration: exit code 2.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct UsageError(String);

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Ingest {
            source_type,
            path,
            db,
            config,
            export,
            workers,
        } => {
            run_ingest(source_type, &path, db.as_deref(), config.as_deref(), export.as_deref(), workers)
                .await
        }
        Command::Reconcile {
            record_set,
            config,
            source,
            master,
            json,
        } => run_reconcile(&record_set, &config, source, master.as_deref(), json.as_deref()).await,
        Command::Templates => print_templates(),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(e: &anyhow::Error) -> ExitCode {
    if e.downcast_ref::<ConfigError>().is_some() || e.downcast_ref::<UsageError>().is_some() {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

async fn run_ingest(
    family: SourceFamily,
    path: &Path,
    db: Option<&Path>,
    config: Option<&Path>,
    export: Option<&Path>,
    workers: usize,
) -> Result<ExitCode> {
    let pipeline = match config {
        Some(config_path) => ReconciliationConfig::load(config_path)?.pipeline_for(family)?,
        None => default_pipeline(family),
    };

    let sink: Box<dyn RecordSink> = match db {
        Some(db_path) => {
            let pool = pressline_storage::create_db(db_path)
                .await
                .with_context(|| format!("opening database {}", db_path.display()))?;
            Box::new(SqliteSink::new(pool))
        }
        None => {
            tracing::info!("No --db given; records will not be persisted");
            Box::new(MemorySink::new())
        }
    };

    let outcome = ingest(path, pipeline, sink.as_ref(), workers, ctrl_c()).await?;

    if let Some(export_path) = export {
        outcome.records.write_json(export_path)?;
        tracing::info!("Exported {} records to {}", outcome.records.len(), export_path.display());
    }
    print!("{}", outcome.digest);

    if outcome.digest.is_success() && !outcome.digest.interrupted {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn run_reconcile(
    record_set: &Path,
    config: &Path,
    source: Option<SourceFamily>,
    master: Option<&Path>,
    json: Option<&Path>,
) -> Result<ExitCode> {
    if source == Some(SourceFamily::HitTracker) {
        return Err(UsageError("hit-tracker records carry no cost to reconcile".to_string()).into());
    }
    let config = ReconciliationConfig::load(config)?;

    let set = match RecordSet::open(record_set, source).await {
        Ok(set) => set,
        Err(RecordSetError::SourceRequired) => {
            return Err(UsageError(RecordSetError::SourceRequired.to_string()).into())
        }
        Err(e) => return Err(e.into()),
    };
    if !set.source.yields_adjustments() {
        return Err(UsageError(format!(
            "{} holds hit-tracker records, which carry no cost to reconcile",
            record_set.display()
        ))
        .into());
    }

    let master = match master {
        Some(path) => Some(
            MasterTotals::from_path(path)
                .with_context(|| format!("reading master totals {}", path.display()))?,
        ),
        None => None,
    };

    let report = reconcile(&set.adjustments, &config, master.as_ref())?;
    print!("{report}");

    if let Some(json_path) = json {
        std::fs::write(json_path, report.to_json()?)
            .with_context(|| format!("writing {}", json_path.display()))?;
        tracing::info!("Report written to {}", json_path.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn print_templates() -> Result<ExitCode> {
    for family in SourceFamily::ALL {
        println!("# ---- {family} ----");
        println!("{}", SheetTemplate::default_for(family).to_toml()?);
    }
    Ok(ExitCode::SUCCESS)
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Ctrl-C handler unavailable: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_ingest() {
        let cli = Cli::try_parse_from([
            "pressline", "ingest", "scrap-log", "data/scrap", "--db", "p.db", "--workers", "2",
        ])
        .unwrap();
        match cli.command {
            Command::Ingest {
                source_type,
                workers,
                db,
                ..
            } => {
                assert_eq!(source_type, SourceFamily::ScrapLog);
                assert_eq!(workers, 2);
                assert_eq!(db, Some(PathBuf::from("p.db")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_unknown_source_type() {
        assert!(Cli::try_parse_from(["pressline", "ingest", "payroll", "x"]).is_err());
    }

    #[test]
    fn config_and_usage_errors_exit_2() {
        let config = anyhow::Error::from(ConfigError::Invalid("planned_codes".to_string()))
            .context("loading config");
        assert_eq!(exit_code_for(&config), ExitCode::from(2));
        let usage = anyhow::Error::from(UsageError("no".to_string()));
        assert_eq!(exit_code_for(&usage), ExitCode::from(2));
        assert_eq!(exit_code_for(&anyhow::anyhow!("disk full")), ExitCode::FAILURE);
    }

    #[tokio::test]
    async fn hit_tracker_reconcile_is_usage_error() {
        let err = run_reconcile(
            Path::new("hits.json"),
            Path::new("pressline.toml"),
            Some(SourceFamily::HitTracker),
            None,
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(exit_code_for(&err), ExitCode::from(2));
    }

    #[tokio::test]
    async fn reconcile_reads_exported_record_set() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("scrap");
        std::fs::create_dir(&data).unwrap();
        std::fs::write(
            data.join("1-2-25.csv"),
            "Part Number,Qty,Scrap Cost,Reason\nA-100,-4,50,7 - Setup\nB-200,-2,30,3 - Die damage\n",
        )
        .unwrap();
        let export = dir.path().join("scrap.json");
        let code = run_ingest(SourceFamily::ScrapLog, &data, None, None, Some(export.as_path()), 2)
            .await
            .unwrap();
        assert_eq!(code, ExitCode::SUCCESS);

        let config = dir.path().join("pressline.toml");
        std::fs::write(&config, "planned_codes = [7]\n").unwrap();
        let master = dir.path().join("master.csv");
        std::fs::write(&master, "period,total\n2025-01,80\n").unwrap();
        let report_path = dir.path().join("report.json");

        let code = run_reconcile(&export, &config, None, Some(master.as_path()), Some(report_path.as_path()))
            .await
            .unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(report["discrepancies"][0]["flagged"], serde_json::Value::Bool(false));
    }

    #[tokio::test]
    async fn invalid_config_exits_2() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("pressline.toml");
        std::fs::write(&config, "planned_codes = []\n").unwrap();
        let err = run_ingest(SourceFamily::ScrapLog, dir.path(), None, Some(config.as_path()), None, 1)
            .await
            .unwrap_err();
        assert_eq!(exit_code_for(&err), ExitCode::from(2));
    }
}
