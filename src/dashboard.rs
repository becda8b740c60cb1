//! Local dashboard discovery over a fixed localhost port range.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client as HttpClient;
use tracing::debug;

pub const DEFAULT_PORT_START: u16 = 8501;
pub const DEFAULT_PORT_COUNT: u16 = 10;

/// Probe `127.0.0.1:start..start+count` and return the first port that
/// responds. Any HTTP status counts as a response; only a connection
/// failure moves on to the next port.
pub fn discover(start: u16, count: u16) -> Option<u16> {
    let client = match HttpClient::builder()
        .timeout(Duration::from_millis(750))
        .build()
    {
        Ok(client) => client,
        Err(_) => return None,
    };

    for port in start..start.saturating_add(count) {
        let url = format!("http://127.0.0.1:{port}/");
        match client.get(&url).send() {
            Ok(_) => {
                debug!(port, "dashboard found");
                return Some(port);
            }
            Err(err) => {
                debug!(port, %err, "dashboard probe miss");
            }
        }
    }
    None
}

pub fn open(port: u16) -> Result<()> {
    let url = format!("http://127.0.0.1:{port}/");
    webbrowser::open(&url).with_context(|| format!("dashboard: open {url}"))
}
