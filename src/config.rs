use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::decode::DecodeFormat;

const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Streaming endpoint of the upstream inference service.
    pub upstream_url: String,
    pub api_key: Option<String>,
    /// Idle window after which the pipeline synthesizes a timeout error.
    pub idle_timeout: Duration,
    pub decode_format: DecodeFormat,
}

impl Config {
    pub fn load() -> Result<Self> {
        let upstream_url =
            std::env::var("CHATFLOW_UPSTREAM_URL").context("CHATFLOW_UPSTREAM_URL not set")?;
        let api_key = std::env::var("CHATFLOW_API_KEY").ok();

        let idle_timeout_ms = match std::env::var("CHATFLOW_IDLE_TIMEOUT_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .context("CHATFLOW_IDLE_TIMEOUT_MS must be an integer of milliseconds")?,
            Err(_) => DEFAULT_IDLE_TIMEOUT_MS,
        };

        let decode_format = match std::env::var("CHATFLOW_WIRE_FORMAT") {
            Ok(raw) => parse_wire_format(&raw)
                .with_context(|| format!("unrecognized CHATFLOW_WIRE_FORMAT '{raw}'"))?,
            Err(_) => DecodeFormat::EventStream,
        };

        let config = Self {
            upstream_url,
            api_key,
            idle_timeout: Duration::from_millis(idle_timeout_ms),
            decode_format,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.upstream_url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("upstream URL '{url}' must be http(s)");
        }
        if self.idle_timeout.is_zero() {
            bail!("idle timeout must be greater than zero");
        }
        Ok(())
    }
}

fn parse_wire_format(raw: &str) -> Option<DecodeFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "sse" | "event-stream" | "event_stream" => Some(DecodeFormat::EventStream),
        "ndjson" | "json-lines" | "json_lines" => Some(DecodeFormat::JsonLines),
        _ => None,
    }
}
