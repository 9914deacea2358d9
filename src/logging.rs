// Logging - env_logger setup and the critical! macro
//
// Filter precedence: debug.log_filter, then RUST_LOG, then info.
// With debug.log_file set, output goes to that file instead of stderr.

use crate::config::DebugConfig;
use std::fs::File;
use std::sync::Once;

/// Logs at error level, tagged so unrecoverable conditions stand out.
macro_rules! critical {
    ($($arg:tt)+) => {
        ::log::error!("[critical] {}", format_args!($($arg)+))
    };
}
pub(crate) use critical;

static INIT: Once = Once::new();

/// Initializes the global logger once. Later calls are ignored.
pub fn init_logging(config: &DebugConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        if let Some(filter) = &config.log_filter {
            builder.parse_filters(filter);
        } else if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else {
            builder.filter_level(log::LevelFilter::Info);
        }

        let mut file_error = None;
        if let Some(path) = &config.log_file {
            match File::create(path) {
                Ok(file) => {
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
                Err(e) => file_error = Some((path, e)),
            }
        }

        builder.init();

        if let Some((path, e)) = file_error {
            log::warn!("Failed to open log file {}: {}. Logging to stderr.", path, e);
        }
        log::debug!("logging initialized");
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn critical_formats_like_error() {
        // No logger installed: the macro must still expand and evaluate
        super::critical!("{} went wrong {}", "surface", 3);
    }
}
