use crate::actor::{BackendSettings, DISPATCH_PACING};
use anyhow::{Context, Result};
use depsweep_protocol::PackageName;

/// Process configuration, read once at startup. Only a missing token or
/// operator secret is fatal; everything after startup surfaces through
/// record states.
#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: String,
    pub operator_secret: String,
    pub package_offset: u64,
    pub ignore: Vec<PackageName>,
    pub console_addr: String,
    pub abort_on_tag_mismatch: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let github_token =
            require("DEPSWEEP_GITHUB_TOKEN").context("hosting-platform token is required")?;
        let operator_secret =
            require("DEPSWEEP_OPERATOR_SECRET").context("operator secret is required")?;

        let package_offset = match optional("DEPSWEEP_PACKAGE_OFFSET") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("DEPSWEEP_PACKAGE_OFFSET '{raw}' is not an integer"))?,
            None => 0,
        };

        let ignore = parse_ignore_list(&optional("DEPSWEEP_IGNORE").unwrap_or_default())
            .context("DEPSWEEP_IGNORE")?;

        let console_addr =
            optional("DEPSWEEP_CONSOLE_ADDR").unwrap_or_else(|| "127.0.0.1:8901".to_string());

        let abort_on_tag_mismatch = optional("DEPSWEEP_ABORT_ON_TAG_MISMATCH")
            .map(|raw| {
                let raw = raw.trim();
                raw == "1" || raw.eq_ignore_ascii_case("true")
            })
            .unwrap_or(false);

        Ok(Self {
            github_token,
            operator_secret,
            package_offset,
            ignore,
            console_addr,
            abort_on_tag_mismatch,
        })
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            operator_secret: self.operator_secret.clone(),
            package_offset: self.package_offset,
            ignore: self.ignore.clone(),
            abort_on_tag_mismatch: self.abort_on_tag_mismatch,
            pacing: DISPATCH_PACING,
        }
    }
}

fn require(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .with_context(|| format!("environment variable {key} is not set"))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Comma-separated package names that are never analyzed. Malformed names
/// are a configuration error, reported at startup.
fn parse_ignore_list(raw: &str) -> Result<Vec<PackageName>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<PackageName>()
                .map_err(|err| anyhow::anyhow!(err))
        })
        .collect()
}
