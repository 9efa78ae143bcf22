use anyhow::Result;
use chrono::Local;
use clap::Parser;
use console::style;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use transcript_harvester::cli::{Cli, Commands, RunArgs, SourceArg};
use transcript_harvester::config::{Config, RunOptions};
use transcript_harvester::model::ContentKind;
use transcript_harvester::{output, utils, HarvestPipeline};

/// Exit code when the run finished but some collections or items failed
const PARTIAL_FAILURE_EXIT: i32 = 2;

fn init_logging(cli: &Cli, config: &Config) -> Result<()> {
    let filter = if cli.verbose {
        EnvFilter::new("transcript_harvester=debug,harvester=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("transcript_harvester=info,harvester=info"))
    };

    let json_layer = cli
        .json_logs
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let plain_layer = (!cli.json_logs).then(|| fmt::layer().with_writer(std::io::stderr));

    let file_layer = match &config.logging.dir {
        Some(dir) => {
            fs_err::create_dir_all(dir)?;
            let name = format!("{}_etl.log", Local::now().format("%Y-%m-%d_%H-%M-%S"));
            let file = fs_err::File::create(dir.join(name))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).await?;
    init_logging(&cli, &config)?;

    match &cli.command {
        Commands::Run(args) => {
            if !harvest(&cli, &config, args, false).await? {
                std::process::exit(PARTIAL_FAILURE_EXIT);
            }
        }
        Commands::Plan(args) => {
            harvest(&cli, &config, args, true).await?;
        }
        Commands::Sources { source } => print_sources(&config, *source),
        Commands::Config { show } => {
            if *show {
                config.display();
            } else {
                let path = match &cli.config {
                    Some(path) => path.clone(),
                    None => Config::config_path()?,
                };
                println!(
                    "{} {} is valid ({} video, {} blog collection(s))",
                    style("✓").green(),
                    path.display(),
                    config.collections.video.len(),
                    config.collections.blog.len()
                );
            }
        }
    }

    Ok(())
}

/// Run or plan every selected kind in turn; false when anything failed
async fn harvest(cli: &Cli, config: &Config, args: &RunArgs, dry_run: bool) -> Result<bool> {
    let kinds = args.source.kinds();

    if kinds.contains(&ContentKind::Video) && !config.collections.video.is_empty() {
        let missing_deps = utils::check_dependencies(&config.video.yt_dlp_path).await;
        if !missing_deps.is_empty() {
            eprintln!("⚠️  Dependency check warnings:");
            for dep in missing_deps {
                eprintln!("   • {}", dep);
            }
        }
    }

    let mut clean = true;
    for kind in kinds {
        if config.collections(kind).is_empty() {
            tracing::info!("No {} collections configured, skipping", kind);
            continue;
        }

        let options = RunOptions::resolve(config, kind, &args.overrides(dry_run, cli.quiet))?;
        let pipeline = HarvestPipeline::from_config(config.clone(), &options)?;

        if dry_run {
            let plan = pipeline.plan(&options).await?;
            output::print_work_list(&plan.work);
            for failure in &plan.failures {
                println!("  {} {}", style("✗").red(), failure);
            }
            clean &= plan.failures.is_empty();
        } else {
            let report = pipeline.run(&options).await?;
            if !cli.quiet {
                report.print_summary();
            }
            clean &= report.is_clean();
        }
    }

    Ok(clean)
}

fn print_sources(config: &Config, source: SourceArg) {
    for kind in source.kinds() {
        let collections = config.collections(kind);
        println!("{} ({}):", style(kind).bold(), collections.len());
        for collection in collections {
            let domain = utils::extract_domain(&collection.source_url).unwrap_or_default();
            println!(
                "  {:<8} {} [{}]",
                collection.key,
                collection.name,
                style(domain).dim()
            );
            println!("           {}", collection.source_url);
        }
    }
}
