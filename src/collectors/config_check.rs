use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use crate::collectors::collector::{CollectContext, Collector};
use crate::collectors::providers::ConfigChecker;
use crate::constants::{COLLECTOR_CONFIG_CHECK, CONFIG_CHECK_FILE_NAME};
use crate::security::redacting_writer::write_redacted;

/// Runs the configuration self-check and stores its report in `configcheck.log`.
pub struct ConfigCheckCollector {
    checker: Arc<dyn ConfigChecker>,
}

impl ConfigCheckCollector {
    pub fn new(checker: Arc<dyn ConfigChecker>) -> Self {
        Self { checker }
    }
}

#[async_trait::async_trait]
impl Collector for ConfigCheckCollector {
    fn name(&self) -> &'static str {
        COLLECTOR_CONFIG_CHECK
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<()> {
        let report = self
            .checker
            .check(ctx.config.main_config_file.as_deref(), &ctx.request.conf_search_paths)
            .await
            .context("Configuration check failed")?;

        let path = ctx.entry_path(CONFIG_CHECK_FILE_NAME)?;
        let written = write_redacted(&path, ctx.scrubber, report.as_bytes())?;
        info!("Collected configuration check ({} bytes)", written);
        Ok(())
    }
}
