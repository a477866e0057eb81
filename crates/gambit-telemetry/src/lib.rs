use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "gambit_net" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of the human-readable format.
    pub json_output: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json_output: false,
        }
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    if config.json_output {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_filter(env_filter);
        tracing_subscriber::registry().with(fmt_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter);
        tracing_subscriber::registry().with(fmt_layer).init();
    }
}

fn filter_directive(config: &TelemetryConfig) -> String {
    let mut filter = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    filter
}
