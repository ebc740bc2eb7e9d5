//! addon-registry command-line tool
//!
//! ## Usage
//!
//! ```bash
//! addon-registry --modules-dir addons generate --output src/generated/registry.rs
//! addon-registry check
//! addon-registry order --json
//! addon-registry reconcile --records modules.json
//! ```

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use addon_registry::config::{ArtifactFormat, ResolverConfig};
use addon_registry::module::codegen::RegistryGenerator;
use addon_registry::module::registry::records::{reconcile, JsonRecordStore, ModuleRecordStore};
use addon_registry::module::registry::{ModuleDependencies, Resolution, ResolutionReport};
use addon_registry::utils::init_logging_from_config;

#[derive(Parser)]
#[command(name = "addon-registry")]
#[command(
    about = "Resolve addon module dependencies and generate the module registry",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory whose subdirectories are modules
    #[arg(short, long, value_name = "DIR")]
    modules_dir: Option<PathBuf>,

    /// Treat every diagnostic as an error
    #[arg(long)]
    strict: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the registry artifact (default)
    Generate {
        /// Artifact path
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Artifact format: rust or json
        #[arg(short, long, value_name = "FORMAT")]
        format: Option<ArtifactFormat>,
    },

    /// Fail when the artifact on disk is stale
    Check {
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print the computed load order
    Order {
        /// Emit order, cycles and diagnostics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare declared modules with persisted module records
    Reconcile {
        /// JSON file holding an array of module records
        #[arg(long, value_name = "FILE")]
        records: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    };
    init_logging_from_config(Some(&config.logging));

    match run(cli.command, config) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ResolverConfig> {
    let mut config = match &cli.config {
        Some(path) => ResolverConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ResolverConfig::default(),
    };
    if let Some(dir) = &cli.modules_dir {
        config.modules_dir = dir.clone();
    }
    if cli.strict {
        config.strict = true;
    }
    Ok(config)
}

/// Returns `Ok(false)` when the command ran but reported a failure
fn run(command: Option<Commands>, mut config: ResolverConfig) -> anyhow::Result<bool> {
    let command = command.unwrap_or(Commands::Generate {
        output: None,
        format: None,
    });

    let (output, format) = match &command {
        Commands::Generate { output, format } => (output.clone(), *format),
        Commands::Check { output } => (output.clone(), None),
        _ => (None, None),
    };
    if let Some(format) = format {
        config.format = format;
        if output.is_none() {
            config.output.set_file_name(format.default_file_name());
        }
    }
    if let Some(output) = output {
        config.output = output;
    }

    // Resolve leniently so the summary is printed before strict mode rejects it
    let lenient = ResolverConfig {
        strict: false,
        ..config.clone()
    };
    let mut resolution = ModuleDependencies::resolve_dir(&lenient)
        .with_context(|| format!("failed to resolve {}", config.modules_dir.display()))?;
    eprint!("{}", resolution.summary());
    if config.strict {
        resolution = resolution.into_strict()?;
    }

    match command {
        Commands::Generate { .. } => {
            let generator = RegistryGenerator::from_config(&resolution, &config);
            generator.write_to(&config.output)?;
            info!("Registry written to {}", config.output.display());
            Ok(true)
        }
        Commands::Check { .. } => {
            let generator = RegistryGenerator::from_config(&resolution, &config);
            if generator.is_up_to_date(&config.output)? {
                info!("Registry {} is up to date", config.output.display());
                Ok(true)
            } else {
                error!(
                    "Registry {} is stale; run `addon-registry generate`",
                    config.output.display()
                );
                Ok(false)
            }
        }
        Commands::Order { json } => {
            print_order(&resolution, json)?;
            Ok(true)
        }
        Commands::Reconcile { records } => {
            let records = JsonRecordStore::new(&records).records()?;
            for item in reconcile(&resolution, &records) {
                println!("{}", item);
            }
            Ok(true)
        }
    }
}

fn print_order(resolution: &Resolution, json: bool) -> anyhow::Result<()> {
    if json {
        let report = ResolutionReport::from(resolution);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for name in &resolution.load_order {
            println!("{}", name);
        }
    }
    Ok(())
}
