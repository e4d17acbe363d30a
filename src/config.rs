use std::path::Path;

use burn::{config::Config, optim::AdamConfig};

use crate::{model::CnnConfig, MnistError};

/// Hyperparameters of a training run.
///
/// The defaults reproduce the reference setup: 10 epochs of Adam at a
/// learning rate of `0.01` over shuffled batches of 100 images.
#[derive(Config)]
pub struct TrainingConfig {
    pub model: CnnConfig,
    pub optimizer: AdamConfig,
    #[config(default = 10)]
    pub num_epochs: usize,
    #[config(default = 100)]
    pub batch_size: usize,
    #[config(default = 1)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 0.01)]
    pub learning_rate: f64,
    /// Number of training steps between two progress lines.
    #[config(default = 100)]
    pub log_interval: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new(CnnConfig::new(), AdamConfig::new())
    }
}

impl TrainingConfig {
    /// Loads a config from a JSON file and validates it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MnistError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the training loop cannot work with.
    pub fn validate(&self) -> Result<(), MnistError> {
        if self.num_epochs == 0 {
            return Err(MnistError::InvalidConfig(
                "num_epochs must be at least 1".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(MnistError::InvalidConfig(
                "batch_size must be at least 1".into(),
            ));
        }
        if self.log_interval == 0 {
            return Err(MnistError::InvalidConfig(
                "log_interval must be at least 1".into(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(MnistError::InvalidConfig(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }

        self.model.validate()
    }
}
