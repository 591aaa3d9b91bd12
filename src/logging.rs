use env_logger::{Builder, Env};
use log::LevelFilter;

const LOG_ENV_VAR: &str = "KOMMANDER_LOG";

/// Initialize logging, given a verbosity level.
///
/// The verbosity level is the difference between `-v` and `-q` flags:
/// `0` is `WARN`, positive values increase verbosity, negative values decrease it.
/// Environment variable `KOMMANDER_LOG` takes precedence, if set.
pub fn init(verbosity_level: i8) {
    let default_level = match verbosity_level {
        i8::MIN..=-2 => LevelFilter::Off,
        -1 => LevelFilter::Error,
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        3..=i8::MAX => LevelFilter::Trace,
    };

    let mut logger_builder =
        Builder::from_env(Env::default().filter_or(LOG_ENV_VAR, default_level.as_str()));
    logger_builder.init();

    info!("Configured log level: {}", log::max_level());
}
