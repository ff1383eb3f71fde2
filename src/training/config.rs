//! Learner configuration
//!
//! [`LearnerConfig`] is the single configuration surface of the training loop.
//! It can be loaded from JSON or YAML, or built from command-line flags through
//! [`LearnerArgs`]. Missing fields take the defaults below.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_core::Device;
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::training::optimizers::OptimizerType;
use crate::utils::io::write_file_atomic;

/// Training loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Optimizer name: `sgd`, `adagrad` or `adam`
    pub optimizer: String,

    /// Element-wise gradient clip; `<= 0` disables clipping
    pub grad_clip: f64,

    pub learning_rate: f64,

    pub max_epochs: usize,

    /// Overrides the number of dialogue batches per epoch reported by the data source
    pub num_per_epoch: Option<usize>,

    /// Report every this many steps (and always at the end of an epoch)
    pub print_every: usize,

    /// Checkpoint file, or directory whose latest epoch checkpoint is restored
    pub init_from: Option<PathBuf>,

    /// Directory for epoch checkpoints; the best snapshot goes to `<checkpoint>-best`
    pub checkpoint: PathBuf,

    /// 0 trains on CPU; `k > 0` selects CUDA device `k - 1` when available
    pub gpu: usize,

    pub batch_size: usize,

    /// Dump the first example of every chunk
    pub verbose: bool,

    /// Split whose loss drives best-model selection
    pub dev_split: String,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            optimizer: "sgd".to_string(),
            grad_clip: 5.0,
            learning_rate: 0.1,
            max_epochs: 10,
            num_per_epoch: None,
            print_every: 1,
            init_from: None,
            checkpoint: PathBuf::from("."),
            gpu: 0,
            batch_size: 1,
            verbose: false,
            dev_split: "dev".to_string(),
        }
    }
}

impl LearnerConfig {
    /// Parsed optimizer name
    pub fn optimizer_type(&self) -> Result<OptimizerType> {
        Ok(self.optimizer.parse::<OptimizerType>()?)
    }

    /// Validate every field; failures are invalid-configuration errors
    pub fn validate(&self) -> Result<()> {
        self.optimizer_type()?;

        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::config(format!("learning rate must be positive, got {}", self.learning_rate)).into());
        }
        if !self.grad_clip.is_finite() {
            return Err(Error::config(format!("grad_clip must be finite, got {}", self.grad_clip)).into());
        }
        if self.max_epochs == 0 {
            return Err(Error::config("max_epochs must be greater than 0").into());
        }
        if self.print_every == 0 {
            return Err(Error::config("print_every must be greater than 0").into());
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be greater than 0").into());
        }
        if self.num_per_epoch == Some(0) {
            return Err(Error::config("num_per_epoch must be greater than 0 when set").into());
        }
        if self.dev_split.trim().is_empty() {
            return Err(Error::config("dev_split must not be empty").into());
        }

        Ok(())
    }

    /// Compute device for `gpu`
    pub fn device(&self) -> Result<Device> {
        if self.gpu == 0 {
            return Ok(Device::Cpu);
        }
        Device::cuda_if_available(self.gpu - 1).context("Failed to select compute device")
    }

    /// Load configuration from a `.json` file, or YAML otherwise
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        let config = if is_json(path) {
            serde_json::from_str(&content).context("Failed to parse JSON configuration")?
        } else {
            serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?
        };

        Ok(config)
    }

    /// Save configuration to a `.json` file, or YAML otherwise
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self).context("Failed to serialize configuration to JSON")?
        } else {
            serde_yaml::to_string(self).context("Failed to serialize configuration to YAML")?
        };

        write_file_atomic(path, content.as_bytes()).context("Failed to write configuration file")?;
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("json")
}

/// Command-line flags for the training loop
#[derive(Debug, Clone, Args)]
pub struct LearnerArgs {
    /// Optimizer: sgd, adagrad or adam
    #[arg(long, default_value = "sgd")]
    pub optimizer: String,

    /// Min and (-1*) max value for gradient clipping
    #[arg(long, default_value_t = 5.0)]
    pub grad_clip: f64,

    /// Initial learning rate
    #[arg(long, default_value_t = 0.1)]
    pub learning_rate: f64,

    /// Maximum number of training epochs
    #[arg(long, default_value_t = 10)]
    pub max_epochs: usize,

    /// Number of dialogue batches per epoch
    #[arg(long)]
    pub num_per_epoch: Option<usize>,

    /// How often to print training statistics
    #[arg(long, default_value_t = 1)]
    pub print_every: usize,

    /// Initial parameters
    #[arg(long)]
    pub init_from: Option<PathBuf>,

    /// Directory to save learned models
    #[arg(long, default_value = ".")]
    pub checkpoint: PathBuf,

    /// Use GPU or not
    #[arg(long, default_value_t = 0)]
    pub gpu: usize,

    /// Number of parallel dialogues per batch
    #[arg(long, default_value_t = 1)]
    pub batch_size: usize,

    /// Print the first example of every chunk
    #[arg(long)]
    pub verbose: bool,

    /// Split used for best-model selection
    #[arg(long, default_value = "dev")]
    pub dev_split: String,
}

impl From<LearnerArgs> for LearnerConfig {
    fn from(args: LearnerArgs) -> Self {
        Self {
            optimizer: args.optimizer,
            grad_clip: args.grad_clip,
            learning_rate: args.learning_rate,
            max_epochs: args.max_epochs,
            num_per_epoch: args.num_per_epoch,
            print_every: args.print_every,
            init_from: args.init_from,
            checkpoint: args.checkpoint,
            gpu: args.gpu,
            batch_size: args.batch_size,
            verbose: args.verbose,
            dev_split: args.dev_split,
        }
    }
}
