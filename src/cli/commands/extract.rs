//! One-shot extraction from the command line.

use console::style;

use crate::config::Settings;
use crate::models::{ExtractionRequest, Source, StrategyHint};
use crate::pipeline::{ExtractService, Outcome};
use crate::server::ApiResponse;

/// Run one extraction and print the same JSON envelope the API returns.
pub async fn cmd_extract(
    settings: Settings,
    url: &str,
    source: Option<&str>,
    method: &str,
    force: bool,
) -> anyhow::Result<()> {
    let source = match source {
        Some(name) => Source::from_str(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown source: {}", name))?,
        None => Source::detect(url, &settings.file_locker, &settings.pin)
            .ok_or_else(|| anyhow::anyhow!("Cannot tell which service {} belongs to", url))?,
    };
    let hint = StrategyHint::from_str(method)
        .ok_or_else(|| anyhow::anyhow!("Unknown method: {}", method))?;

    eprintln!("{} Extracting {} ({})", style("→").cyan(), url, source);

    let service = ExtractService::from_settings(settings)?;
    let request = ExtractionRequest::new(url).with_hint(hint).with_force(force);

    let (response, ok) = match service.extract(source, &request).await {
        Ok(Outcome::Fresh { record, attempts }) => {
            eprintln!(
                "{} {} via {} ({} attempt(s))",
                style("✓").green(),
                record.name,
                record.method_used,
                attempts
            );
            (ApiResponse::ok(record, false), true)
        }
        Ok(Outcome::Cached(record)) => (ApiResponse::ok(record, true), true),
        // a fresh service has nothing in flight
        Ok(Outcome::InProgress { retry }) => (ApiResponse::in_progress(retry, url.to_string()), false),
        Err(e) => {
            eprintln!("{} {}", style("✗").red(), e);
            (ApiResponse::from(e), false)
        }
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
