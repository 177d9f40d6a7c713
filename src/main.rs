use clap::{CommandFactory, Parser};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;
use vendor_export::{
    AppConfig, Database, Error, OutputTarget, ReportRegistry, ReportService, Result, RuleSet,
};

/// Vendor master-data reports exported to Excel.
#[derive(Debug, Parser)]
#[command(name = "vendor-export", version, about)]
struct Cli {
    /// Configuration file (defaults to ./vendor-export.toml when present)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Report to generate, or `all`
    #[arg(long, short = 'r')]
    report: Option<String>,

    /// Output file (single report only)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Output directory for timestamped files
    #[arg(long, short = 'd')]
    output_dir: Option<PathBuf>,

    /// Row cap applied by the database (for testing)
    #[arg(long, short = 'l', value_parser = clap::value_parser!(u32).range(1..))]
    limit: Option<u32>,

    /// List available reports
    #[arg(long)]
    list: bool,

    /// Check the database connection and exit
    #[arg(long, short = 't')]
    test_connection: bool,

    /// Print the first N rows of --report instead of writing a file
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    preview: Option<u32>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("[ERROR] {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = AppConfig::load(cli.config.as_deref())?;
    info!("Loaded config: {:?}", config.database);

    let rules = Arc::new(RuleSet::from_config(&config.rules)?);
    let registry = ReportRegistry::standard(&rules)?;

    if cli.list {
        print_reports(&registry);
        return Ok(ExitCode::SUCCESS);
    }

    if cli.test_connection {
        return Ok(test_connection(Database::new(config.database.clone())).await);
    }

    let Some(report_name) = cli.report.as_deref() else {
        Cli::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    let run_all = report_name.eq_ignore_ascii_case("all");
    if !run_all && registry.get(report_name).is_none() {
        eprintln!("[ERROR] {}", Error::UnknownReport(report_name.to_string()));
        print_reports(&registry);
        return Ok(ExitCode::FAILURE);
    }

    let mut db = Database::new(config.database.clone());
    db.connect().await?;
    let mut service = ReportService::new(db, rules, config.export.clone());

    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| config.export.default_output_dir.clone());
    let limit = cli.limit.and_then(NonZeroU32::new);

    let result = if run_all {
        generate_all(&service, &registry, &output_dir, limit).await
    } else if let Some(rows) = cli.preview.and_then(NonZeroU32::new) {
        preview(&service, &registry, report_name, rows).await
    } else {
        let output = match &cli.output {
            Some(path) => OutputTarget::File(path.clone()),
            None => OutputTarget::Directory(output_dir),
        };
        generate_one(&service, &registry, report_name, &output, limit).await
    };

    service.close().await;
    result
}

async fn test_connection(mut db: Database) -> ExitCode {
    println!("Testing database connection...");
    let result = match db.connect().await {
        Ok(()) => db.test_connection().await,
        Err(e) => Err(e),
    };
    db.close().await;

    match result {
        Ok(()) => {
            println!("[OK] Connection successful");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("[ERROR] Connection failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn generate_one(
    service: &ReportService,
    registry: &ReportRegistry,
    name: &str,
    output: &OutputTarget,
    limit: Option<NonZeroU32>,
) -> Result<ExitCode> {
    let report = registry
        .get(name)
        .ok_or_else(|| Error::UnknownReport(name.to_string()))?;
    let summary = service.generate(report, output, limit).await?;
    println!(
        "[OK] {} ({} rows) -> {}",
        report.name(),
        summary.rows_written,
        summary.path.display()
    );
    Ok(ExitCode::SUCCESS)
}

async fn generate_all(
    service: &ReportService,
    registry: &ReportRegistry,
    output_dir: &std::path::Path,
    limit: Option<NonZeroU32>,
) -> Result<ExitCode> {
    println!("Generating all reports in {}", output_dir.display());
    let outcome = service.generate_all(registry, output_dir, limit).await;

    println!("[OK] Generated {} report(s):", outcome.generated.len());
    for summary in &outcome.generated {
        println!("   - {}", summary.path.display());
    }
    for (name, e) in &outcome.failed {
        eprintln!("[ERROR] {}: {}", name, e);
    }

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn preview(
    service: &ReportService,
    registry: &ReportRegistry,
    name: &str,
    rows: NonZeroU32,
) -> Result<ExitCode> {
    let report = registry
        .get(name)
        .ok_or_else(|| Error::UnknownReport(name.to_string()))?;
    let batch = service.preview(report, rows).await?;

    println!("{}", batch.columns.join("\t"));
    for row in &batch.rows {
        let cells: Vec<String> = row.iter().map(|v| v.render()).collect();
        println!("{}", cells.join("\t"));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_reports(registry: &ReportRegistry) {
    println!("\nAvailable reports:");
    println!("{}", "-".repeat(40));
    for report in registry.iter() {
        println!("  {:20} - {}", report.name(), report.sheet_name());
    }
    println!();
}
