//! Web server command.

use console::style;

use crate::config::{Settings, DEFAULT_BIND};

/// Start the HTTP API.
pub async fn cmd_serve(mut settings: Settings, bind: Option<&str>) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        settings.bind = parse_bind_address(bind);
    }

    println!(
        "{} Starting mediapull at http://{}",
        style("→").cyan(),
        settings.bind
    );
    println!(
        "  {} cache TTL {}s, {} concurrent requests, verify {:?}",
        style("•").dim(),
        settings.cache_ttl_secs,
        settings.max_concurrent,
        settings.verify
    );
    println!("  Press Ctrl+C to stop");

    crate::server::serve(settings).await
}

/// Parse a bind address that can be:
/// - Just a port: "3030" -> 127.0.0.1:3030
/// - Just a host: "0.0.0.0" -> 0.0.0.0:3030
/// - Host and port: "0.0.0.0:3030" -> 0.0.0.0:3030
fn parse_bind_address(bind: &str) -> String {
    let default_port = DEFAULT_BIND.rsplit_once(':').map_or("3030", |(_, p)| p);

    if bind.parse::<u16>().is_ok() {
        return format!("127.0.0.1:{}", bind);
    }
    if let Some((_, port)) = bind.rsplit_once(':') {
        if port.parse::<u16>().is_ok() {
            return bind.to_string();
        }
    }
    format!("{}:{}", bind, default_port)
}
