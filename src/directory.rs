//! Probe directory: the static list of endpoints checked on every tick.
//!
//! Loaded once from a JSON file at startup. Any failure here is fatal,
//! there is nothing useful to run without probes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// Directory loading error types.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("failed to read probe directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse probe directory: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid probe {id:?}: {reason}")]
    Invalid { id: String, reason: String },
}

/// A single probe definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeDefinition {
    pub id: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_probe_type", rename = "type")]
    pub probe_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_ms: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

fn default_probe_type() -> String {
    "http".to_string()
}

impl ProbeDefinition {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            enabled: true,
            probe_type: default_probe_type(),
            name: None,
            component: None,
            group: None,
            sla_ms: None,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> DirectoryError {
        DirectoryError::Invalid {
            id: self.id.clone(),
            reason: reason.into(),
        }
    }

    fn validate(&self) -> Result<(), DirectoryError> {
        if !id_pattern().is_match(&self.id) {
            return Err(self.invalid("id must be non-empty and use only [A-Za-z0-9._:-]"));
        }

        if self.probe_type != "http" {
            return Err(self.invalid(format!("unsupported probe type {:?}", self.probe_type)));
        }

        let url = reqwest::Url::parse(&self.url)
            .map_err(|e| self.invalid(format!("bad url {:?}: {}", self.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(self.invalid(format!("url scheme must be http or https, got {}", url.scheme())));
        }

        Ok(())
    }
}

fn id_pattern() -> &'static Regex {
    static ID: OnceLock<Regex> = OnceLock::new();
    ID.get_or_init(|| Regex::new(r"^[A-Za-z0-9._:-]+$").expect("static regex"))
}

#[derive(Debug, Deserialize)]
struct ProbesFile {
    probes: Vec<ProbeDefinition>,
}

/// Load the probe directory from a JSON file and keep only enabled probes.
pub fn load_probes<P: AsRef<Path>>(path: P) -> Result<Vec<ProbeDefinition>, DirectoryError> {
    let raw = fs::read_to_string(path)?;
    parse_probes(&raw)
}

/// Parse and validate a probe directory document.
pub fn parse_probes(raw: &str) -> Result<Vec<ProbeDefinition>, DirectoryError> {
    let file: ProbesFile = serde_json::from_str(raw)?;

    let mut seen = HashSet::new();
    for probe in &file.probes {
        probe.validate()?;
        if !seen.insert(probe.id.as_str()) {
            return Err(probe.invalid("duplicate id"));
        }
    }

    let total = file.probes.len();
    let enabled: Vec<_> = file.probes.into_iter().filter(|p| p.enabled).collect();
    tracing::debug!("Probe directory: {} of {} probes enabled", enabled.len(), total);

    Ok(enabled)
}
