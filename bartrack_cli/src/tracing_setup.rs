//! Tracing initialization: env-filter with a CLI default level, stderr
//! writer so `--json` stdout stays machine-parseable.

use tracing_subscriber::EnvFilter;

pub fn init_tracing(json: bool, level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
