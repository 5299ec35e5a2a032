use tracing_subscriber::EnvFilter;

/// Workspace crate targets that receive the configured log level.
const CRATE_TARGETS: &[&str] = &["mailman_core", "mailman_server", "tower_http"];

/// Initialize tracing.
///
/// `RUST_LOG` overrides `level` if set. `json` switches to JSON lines, `source` adds the file and
/// line of every record.
pub fn init(level: &str, json: bool, source: bool) {
    let default_filter: String = CRATE_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(source)
        .with_line_number(source);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
