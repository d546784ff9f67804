use crate::config::{Config, ConfigPaths};
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

/// Route `tracing` output into the log file so stdout stays reserved for
/// command output.
pub fn init_logging(cfg: Option<&Config>) {
    let (level, file_path) = if let Some(c) = cfg {
        (c.logging.level.clone(), PathBuf::from(&c.logging.file))
    } else {
        let paths = ConfigPaths::default().ok();
        let p = paths
            .as_ref()
            .map(|p| p.config_dir.join("sessionrec.log"))
            .unwrap_or_else(|| PathBuf::from("sessionrec.log"));
        ("info".to_string(), p)
    };

    if let Some(parent) = file_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match OpenOptions::new().create(true).append(true).open(&file_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!(
                "sessionrec: cannot open log file {}: {e}; logging disabled",
                file_path.display()
            );
            return;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    // Guard must outlive every log call.
    Box::leak(Box::new(guard));

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .try_init();
}
