//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use timedial_core::config::LoggingConfig;

/// `RUST_LOG` wins; otherwise `--verbose`, then the configured level and
/// per-crate filters.
fn env_filter(config: &LoggingConfig, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = if verbose {
        "debug"
    } else {
        config.level.as_deref().unwrap_or("info")
    };
    let mut filter = EnvFilter::new(level);
    for directive in &config.filters {
        match directive.parse() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("Ignoring log filter '{directive}': {e}"),
        }
    }
    filter
}

pub fn init(config: &LoggingConfig, verbose: bool) {
    let filter = env_filter(config, verbose);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let json = config.format.eq_ignore_ascii_case("json");
    let stdout = config.output.eq_ignore_ascii_case("stdout");

    let result = match (json, stdout) {
        (true, true) => builder.json().with_writer(std::io::stdout).try_init(),
        (true, false) => builder.json().with_writer(std::io::stderr).try_init(),
        (false, true) => builder.with_writer(std::io::stdout).try_init(),
        (false, false) => builder.with_writer(std::io::stderr).try_init(),
    };
    if let Err(e) = result {
        eprintln!("Logging already initialized: {e}");
    }
}
