use burn::config::ConfigError;

/// Errors returned while configuring, training or evaluating the classifier.
///
/// Failures raised inside burn itself (dataset download, tensor shape
/// mismatches) are not represented here: they panic and terminate the process.
#[derive(Debug, thiserror::Error)]
pub enum MnistError {
    /// The configuration file could not be read or parsed.
    #[error("could not load the training config: {0}")]
    Config(#[from] ConfigError),

    /// The configuration was parsed but holds unusable values.
    #[error("invalid training config: {0}")]
    InvalidConfig(String),

    /// A dataset split contained no items.
    #[error("the {0} dataset is empty")]
    EmptyDataset(&'static str),

    /// The command line could not be interpreted.
    #[error("usage: {0}")]
    Usage(String),
}
