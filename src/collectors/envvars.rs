//! Environment variables of the flare process.

use std::io::Write;

use anyhow::{Context, Result};
use log::info;

use crate::collectors::collector::{CollectContext, Collector};
use crate::constants::{COLLECTOR_ENVVARS, ENVVARS_FILE_NAME, REDACTION_MARKER};
use crate::security::credential_scrubber::looks_like_secret_name;

/// Writes `envvars.log`, one `NAME=value` line per variable, sorted by name.
///
/// Values of variables whose name looks like a secret are masked outright;
/// everything else still goes through the redacting writer.
pub struct EnvVarsCollector {
    vars: Vec<(String, String)>,
}

impl EnvVarsCollector {
    pub fn new(vars: Vec<(String, String)>) -> Self {
        Self { vars }
    }

    fn selected<'a>(&'a self, prefixes: &[String]) -> Vec<(&'a str, &'a str)> {
        let mut selected: Vec<(&str, &str)> = self
            .vars
            .iter()
            .filter(|(name, _)| prefixes.is_empty() || prefixes.iter().any(|p| name.starts_with(p.as_str())))
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        selected.sort();
        selected
    }
}

#[async_trait::async_trait]
impl Collector for EnvVarsCollector {
    fn name(&self) -> &'static str {
        COLLECTOR_ENVVARS
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<()> {
        let vars = self.selected(&ctx.config.env_prefixes);
        let mut writer = ctx.writer(ENVVARS_FILE_NAME)?;

        let mut masked = 0;
        for &(name, value) in &vars {
            let value = if looks_like_secret_name(name) {
                masked += 1;
                REDACTION_MARKER
            } else {
                value
            };
            writeln!(writer, "{}={}", name, value).context("Failed to write envvars.log")?;
        }
        writer.close()?;

        info!("Collected {} environment variable(s), {} masked by name", vars.len(), masked);
        Ok(())
    }
}
