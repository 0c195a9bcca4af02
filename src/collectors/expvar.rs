//! Runtime metrics of the running service, one YAML file per metric group.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{debug, info};

use crate::collectors::collector::{CollectContext, Collector};
use crate::collectors::providers::MetricsProvider;
use crate::constants::{COLLECTOR_EXPVAR, EXPVAR_DIR_NAME};
use crate::security::path_validator::sanitize_component;

/// Writes `expvar/<group>` for every top-level key of the metrics object.
pub struct ExpvarCollector {
    provider: Arc<dyn MetricsProvider>,
}

impl ExpvarCollector {
    pub fn new(provider: Arc<dyn MetricsProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl Collector for ExpvarCollector {
    fn name(&self) -> &'static str {
        COLLECTOR_EXPVAR
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<()> {
        if ctx.request.local {
            debug!("Local flare requested, metrics not collected");
            return Ok(());
        }

        let metrics = self
            .provider
            .fetch_metrics()
            .await
            .context("Failed to fetch runtime metrics")?;
        let groups = match metrics.as_object() {
            Some(groups) => groups,
            None => bail!("Runtime metrics are not a JSON object"),
        };

        let mut written = 0;
        for (key, value) in groups {
            let name = sanitize_component(key);
            if name.is_empty() {
                debug!("Skipping metric group with an unusable name");
                continue;
            }
            let yaml = serde_yaml::to_string(value)
                .context(format!("Failed to serialize metric group '{}'", name))?;

            let mut writer = ctx.writer(Path::new(EXPVAR_DIR_NAME).join(&name))?;
            writer.write_all(yaml.as_bytes())?;
            writer.close()?;
            written += 1;
        }

        info!("Collected {} metric group(s)", written);
        Ok(())
    }
}
