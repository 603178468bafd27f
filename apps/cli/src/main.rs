//! Maintenance commands run against the configured PostgreSQL database
//!
//! Usage:
//!   rdr-cli import-organizations --awardee-file awardees.csv --organization-file orgs.csv --site-file sites.csv [--dry-run]
//!   rdr-cli backfill-measurements
//!   rdr-cli distinct-measurements [--output distinct.json]
//!   rdr-cli migrate

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::info;

use rdr::{
    clock::SystemClock,
    db::PostgresStore,
    logging::init_simple_logging,
    services::{ImportSummary, PhysicalMeasurementsService, ReferenceDataImporter},
    Config,
};

#[derive(Parser)]
#[command(name = "rdr-cli")]
#[command(about = "Research data repository maintenance")]
struct Cli {
    /// Database URL; defaults to the configured `database.url`
    #[arg(long, env = "RDR_DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import awardees, organizations and sites from CSV exports
    ImportOrganizations {
        #[arg(long)]
        awardee_file: PathBuf,
        #[arg(long)]
        organization_file: PathBuf,
        #[arg(long)]
        site_file: PathBuf,
        /// Report changes without writing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-derive audit fields and measurement rows from stored documents
    BackfillMeasurements,
    /// Print every distinct measurement concept seen in stored documents
    DistinctMeasurements {
        /// Write the JSON here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Apply pending schema migrations
    Migrate,
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn report(kind: &str, summary: ImportSummary, dry_run: bool) {
    info!(
        inserted = summary.inserted,
        updated = summary.updated,
        unchanged = summary.unchanged,
        skipped = summary.skipped,
        dry_run,
        "Imported {kind}"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    init_simple_logging();
    let cli = Cli::parse();

    let config = Config::load().context("Failed to load configuration")?;
    let url = cli.database_url.unwrap_or_else(|| config.database.url.clone());
    let postgres = PostgresStore::connect_url(&config.database, &url)
        .await
        .context("Failed to connect to database")?;

    match cli.command {
        Commands::Migrate => {
            postgres.run_migrations().await.context("Failed to run migrations")?;
            info!("Migrations applied");
        }
        Commands::ImportOrganizations {
            awardee_file,
            organization_file,
            site_file,
            dry_run,
        } => {
            let importer = ReferenceDataImporter::new(Arc::new(postgres));
            let awardees = importer.import_awardees(open(&awardee_file)?, dry_run).await?;
            report("awardees", awardees, dry_run);
            let organizations = importer
                .import_organizations(open(&organization_file)?, dry_run)
                .await?;
            report("organizations", organizations, dry_run);
            let sites = importer.import_sites(open(&site_file)?, dry_run).await?;
            report("sites", sites, dry_run);
        }
        Commands::BackfillMeasurements => {
            let updated = measurements_service(postgres, &config).backfill().await?;
            info!(updated, "Backfill complete");
        }
        Commands::DistinctMeasurements { output } => {
            let distinct = measurements_service(postgres, &config)
                .distinct_measurements_json()
                .await?;
            let json = serde_json::to_string_pretty(&distinct)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(concepts = distinct.len(), path = %path.display(), "Wrote distinct measurements");
                }
                None => println!("{json}"),
            }
        }
    }
    Ok(())
}

fn measurements_service(store: PostgresStore, config: &Config) -> PhysicalMeasurementsService {
    PhysicalMeasurementsService::new(
        Arc::new(store),
        Arc::new(SystemClock),
        &config.enrollment,
        &config.sync,
    )
}
