use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dialogue_learner::{LearnerArgs, LearnerConfig, OptimizerType};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "dialogue-learner")]
#[command(about = "Truncated-sequence training loop for dialogue encoder-decoders", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a learner configuration file
    CheckConfig {
        /// Configuration file to validate (JSON or YAML)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print the configuration resolved from command-line flags
    PrintConfig {
        #[command(flatten)]
        learner: LearnerArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Yaml)]
        format: Format,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show system information
    Info,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig { file } => check_config(file)?,
        Commands::PrintConfig {
            learner,
            format,
            output,
        } => print_config(learner.into(), format, output)?,
        Commands::Info => show_system_info(),
    }

    Ok(())
}

fn check_config(config_path: PathBuf) -> Result<()> {
    info!("Validating configuration file: {}", config_path.display());

    let config = LearnerConfig::from_file(&config_path).context("Failed to load configuration file")?;

    match config.validate() {
        Ok(()) => {
            info!("Configuration is valid");
            info!("Optimizer: {} (lr={})", config.optimizer, config.learning_rate);
            info!(
                "Epochs: {}, print every {} steps, batch size {}",
                config.max_epochs, config.print_every, config.batch_size
            );
            if config.grad_clip <= 0.0 {
                warn!("Gradient clipping is disabled");
            }
            let device = config.device()?;
            info!("Device: {:?} (gpu={})", device, config.gpu);
            if let Some(init_from) = &config.init_from {
                if !init_from.exists() {
                    warn!("init_from {} does not exist yet", init_from.display());
                }
            }
            Ok(())
        }
        Err(err) => {
            error!("Configuration validation failed: {:#}", err);
            Err(err)
        }
    }
}

fn print_config(config: LearnerConfig, format: Format, output: Option<PathBuf>) -> Result<()> {
    config.validate()?;

    match output {
        Some(path) => {
            config.to_file(&path)?;
            info!("Configuration written to {}", path.display());
        }
        None => {
            let content = match format {
                Format::Json => serde_json::to_string_pretty(&config)?,
                Format::Yaml => serde_yaml::to_string(&config)?,
            };
            println!("{}", content);
        }
    }

    Ok(())
}

fn show_system_info() {
    println!("dialogue-learner {}", dialogue_learner::VERSION);
    println!();
    println!("Optimizers: {}", OptimizerType::NAMES.join(", "));
    println!();
    println!("Hardware support:");

    #[cfg(feature = "cuda")]
    println!("  CUDA GPU acceleration: enabled");
    #[cfg(not(feature = "cuda"))]
    println!("  CUDA GPU acceleration: not compiled");

    #[cfg(feature = "metal")]
    println!("  Metal GPU acceleration: enabled");
    #[cfg(not(feature = "metal"))]
    println!("  Metal GPU acceleration: not compiled");

    #[cfg(feature = "accelerate")]
    println!("  Accelerate framework: enabled");
    #[cfg(not(feature = "accelerate"))]
    println!("  Accelerate framework: not compiled");

    println!();
    match dialogue_learner::utils::memory::resident_memory_mb() {
        Some(mb) => println!("Resident memory: {:.1} MB", mb),
        None => println!("Resident memory: unavailable on this platform"),
    }
}
