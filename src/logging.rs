use log::LevelFilter;

/// Installs the global logger.
///
/// Defaults to `info`; `RUST_LOG` overrides it, e.g. `RUST_LOG=mnist_cnn=debug`.
/// Calling it twice is harmless, the second installation is ignored.
pub fn init() {
    let result = env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();

    if let Err(err) = result {
        log::debug!("Logger already installed: {err}");
    }
}
