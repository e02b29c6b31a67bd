//! Webhealth synthesizer
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - WEBHEALTH_CONFIG: JSON settings file (optional)
//! - WEBHEALTH_STACK_NAME: Stack name (default: web-health)
//! - WEBHEALTH_INTERVAL_MINUTES: Health check period (default: 2)
//! - WEBHEALTH_URLS: Comma-separated endpoints (default: https://example.com)
//! - WEBHEALTH_NAMESPACE: Metric namespace (default: WebHealth)
//! - WEBHEALTH_ALARM_EMAIL: Alarm notification address
//! - WEBHEALTH_ASSET_DIR: Handler code directory (default: ./resources)
//! - WEBHEALTH_OUTPUT: Template output file (default: stdout)
//! - RUST_LOG: Log level (default: info)

use webhealth::stack::{build_web_health_stack, StackSettings};
use webhealth::template::{self, SynthOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout carries only the template
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webhealth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = StackSettings::from_env()?;
    let output = std::env::var("WEBHEALTH_OUTPUT")
        .ok()
        .filter(|p| !p.trim().is_empty());

    tracing::info!("Webhealth configuration:");
    tracing::info!("  Stack: {}", settings.stack_name);
    tracing::info!("  Interval: {} minutes", settings.interval_minutes);
    tracing::info!("  Endpoints: {}", settings.urls.len());
    for url in &settings.urls {
        tracing::info!("    - {}", url);
    }
    tracing::info!("  Namespace: {}", settings.namespace);
    tracing::info!("  Alarm email: {}", settings.alarm_email);
    tracing::info!(
        "  Evaluation periods: {}",
        settings.alarm_evaluation_periods()
    );
    tracing::info!("  Assets: {}", settings.asset_dir.display());

    let stack = build_web_health_stack(&settings)?;
    let rendered = template::render(&stack.graph, &SynthOptions::new(&settings.stack_name))?;

    match output {
        Some(path) => template::write_to(path.trim(), &rendered)?,
        None => println!("{}", template::to_string_pretty(&rendered)?),
    }

    Ok(())
}
