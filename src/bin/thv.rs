use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::thread;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use transfer_harvest::archive::ZipExtractor;
use transfer_harvest::browser::chromium::ChromiumLauncher;
use transfer_harvest::config::{ConfigLoader, ResolvedConfig};
use transfer_harvest::domain::LinkId;
use transfer_harvest::error::HarvestError;
use transfer_harvest::extract::{LinkExtractor, SheetExport, SheetSource};
use transfer_harvest::orchestrator::{Orchestrator, RunSettings};
use transfer_harvest::output::{JsonOutput, OutputMode, TextOutput};
use transfer_harvest::registry::{Registry, ResetSelector};
use transfer_harvest::resolve::StdinSignal;
use transfer_harvest::summary::Summary;
use transfer_harvest::wait::CancelToken;

#[derive(Parser)]
#[command(name = "thv")]
#[command(about = "Download the file-transfer links listed in a spreadsheet, resumably")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    registry: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Merge links from the spreadsheet export into the registry")]
    Extract(ExtractArgs),
    #[command(about = "Download every link not yet processed")]
    Run(RunArgs),
    #[command(about = "Show the registry summary")]
    Status(StatusArgs),
    #[command(about = "Mark links for another attempt")]
    Reset(ResetArgs),
}

#[derive(Args)]
struct ExtractArgs {
    source: Option<String>,

    #[arg(long)]
    column: Option<String>,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    downloads: Option<Utf8PathBuf>,

    #[arg(long)]
    headless: bool,

    #[arg(long)]
    interactive: bool,

    #[arg(long, short = 'y')]
    yes: bool,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct StatusArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ResetArgs {
    ids: Vec<String>,

    #[arg(long, conflicts_with = "ids")]
    all_failed: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(harvest) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(harvest));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::RegistryRead { .. }
        | HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_)
        | HarvestError::ColumnNotFound { .. }
        | HarvestError::UnsupportedProvider(_)
        | HarvestError::InvalidLinkId(_)
        | HarvestError::LinkNotFound(_) => 2,
        HarvestError::RegistryParse { .. }
        | HarvestError::RegistryWrite { .. }
        | HarvestError::SheetHttp(_)
        | HarvestError::SheetStatus { .. }
        | HarvestError::BrowserNotFound
        | HarvestError::Browser(_)
        | HarvestError::StaleElement(_)
        | HarvestError::Filesystem(_)
        | HarvestError::Archive(_) => 3,
        HarvestError::Cancelled => 130,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(registry) = cli.registry {
        config.registry = registry;
    }
    let registry = Registry::new(config.registry.clone());

    match cli.command {
        Commands::Extract(args) => run_extract(args, &config, &registry),
        Commands::Run(args) => run_links(args, config, &registry, cli.non_interactive),
        Commands::Status(args) => run_status(args, &registry),
        Commands::Reset(args) => run_reset(args, &registry),
    }
}

fn run_extract(args: ExtractArgs, config: &ResolvedConfig, registry: &Registry) -> miette::Result<()> {
    let source = match args.source {
        Some(source) => SheetSource::parse(&source),
        None => config.sheet.source.clone().ok_or_else(|| {
            miette::Report::msg("no spreadsheet given (pass a source or set `sheet.source` in thv.json)")
        })?,
    };
    let column = args.column.unwrap_or_else(|| config.sheet.column.clone());

    let extracted = SheetExport::new(source, column).extract()?;
    let report = registry.merge(&extracted)?;
    info!(
        added = report.added.len(),
        duplicates = report.duplicates,
        unsupported = report.unsupported,
        "registry updated"
    );

    if args.json {
        JsonOutput::print_merge(&report).into_diagnostic()?;
    } else {
        println!(
            "Added {} link(s) to {} ({} already present, {} unsupported)",
            report.added.len(),
            registry.path(),
            report.duplicates,
            report.unsupported
        );
    }
    Ok(())
}

fn run_links(
    args: RunArgs,
    mut config: ResolvedConfig,
    registry: &Registry,
    non_interactive: bool,
) -> miette::Result<()> {
    if let Some(downloads) = args.downloads {
        config.download_root = downloads;
    }
    config.headless |= args.headless;
    config.interactive_fallback = (config.interactive_fallback || args.interactive) && !non_interactive;

    let summary = Summary::from_links(&registry.load()?);
    let queued = summary.unprocessed;
    if queued == 0 {
        println!("Nothing to do: all {} link(s) are processed", summary.total);
        return Ok(());
    }
    if !args.yes && !non_interactive && !confirm(queued, &config)? {
        println!("Cancelled");
        return Ok(());
    }

    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone());

    let orchestrator = Orchestrator::new(
        ChromiumLauncher::from_config(&config),
        ZipExtractor,
        RunSettings::from_config(&config),
    )
    .with_cancel(cancel)
    .with_manual(Box::new(StdinSignal));

    let mode = OutputMode::from_json_flag(args.json);
    let report = orchestrator.run(registry, mode.progress())?;
    match mode {
        OutputMode::Json => JsonOutput::print_run(&report).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_summary(&report.summary).into_diagnostic()?,
    }
    Ok(())
}

fn run_status(args: StatusArgs, registry: &Registry) -> miette::Result<()> {
    let summary = Summary::from_links(&registry.load()?);
    match OutputMode::from_json_flag(args.json) {
        OutputMode::Json => JsonOutput::print_summary(&summary).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_summary(&summary).into_diagnostic()?,
    }
    Ok(())
}

fn run_reset(args: ResetArgs, registry: &Registry) -> miette::Result<()> {
    let selector = if args.all_failed {
        ResetSelector::Unsuccessful
    } else {
        if args.ids.is_empty() {
            return Err(miette::Report::msg("give link ids or --all-failed"));
        }
        let ids = args
            .ids
            .iter()
            .map(|id| id.parse::<LinkId>())
            .collect::<Result<Vec<_>, HarvestError>>()?;
        ResetSelector::Ids(ids)
    };

    let reset = registry.reset(&selector)?;
    println!("Reset {} link(s)", reset.len());
    for id in reset {
        println!("  {id}");
    }
    Ok(())
}

fn confirm(queued: usize, config: &ResolvedConfig) -> miette::Result<bool> {
    print!(
        "Download {queued} link(s) into {}? [y/N] ",
        config.download_root
    );
    io::stdout().flush().into_diagnostic()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer).into_diagnostic()?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn install_interrupt_handler(cancel: CancelToken) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(error = %err, "interrupt handler unavailable");
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted; finishing the current step");
                cancel.cancel();
            }
        });
    });
}
