//! Service status report.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use crate::collectors::collector::{CollectContext, Collector};
use crate::collectors::providers::StatusProvider;
use crate::constants::{COLLECTOR_STATUS, LOCAL_SENTINEL_NAME, STATUS_FILE_NAME};
use crate::security::redacting_writer::write_redacted;

/// Writes `status.log`, or the `local` sentinel in local-only mode.
pub struct StatusCollector {
    provider: Arc<dyn StatusProvider>,
}

impl StatusCollector {
    pub fn new(provider: Arc<dyn StatusProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl Collector for StatusCollector {
    fn name(&self) -> &'static str {
        COLLECTOR_STATUS
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<()> {
        if ctx.request.local {
            // The service is not queried at all in local mode
            let sentinel = ctx.entry_path(LOCAL_SENTINEL_NAME)?;
            fs::File::create(&sentinel)
                .context(format!("Failed to create {}", sentinel.display()))?;
            info!("Local flare requested, status not collected");
            return Ok(());
        }

        let status = self
            .provider
            .fetch_status()
            .await
            .context("Failed to fetch status report")?;

        let path = ctx.entry_path(STATUS_FILE_NAME)?;
        let written = write_redacted(&path, ctx.scrubber, &status)?;
        info!("Collected status report ({} bytes)", written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::providers::MockStatusProvider;
    use crate::test_utils::TestStage;
    use anyhow::anyhow;

    #[tokio::test]
    async fn test_status_is_scrubbed() -> Result<()> {
        let mut provider = MockStatusProvider::new();
        provider
            .expect_fetch_status()
            .times(1)
            .returning(|| Ok(b"Agent running\napi_key=ABCDEF1234\n".to_vec()));

        let stage = TestStage::new()?;
        StatusCollector::new(Arc::new(provider)).collect(&stage.ctx()).await?;

        let content = fs::read_to_string(stage.root().join(STATUS_FILE_NAME))?;
        assert!(content.contains("api_key=********"));
        assert!(!content.contains("ABCDEF1234"));
        assert!(!stage.root().join(LOCAL_SENTINEL_NAME).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_local_mode_never_contacts_provider() -> Result<()> {
        let mut provider = MockStatusProvider::new();
        provider.expect_fetch_status().times(0);

        let mut stage = TestStage::new()?;
        stage.request.local = true;
        StatusCollector::new(Arc::new(provider)).collect(&stage.ctx()).await?;

        let sentinel = stage.root().join(LOCAL_SENTINEL_NAME);
        assert!(sentinel.exists());
        assert_eq!(fs::metadata(&sentinel)?.len(), 0);
        assert!(!stage.root().join(STATUS_FILE_NAME).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() -> Result<()> {
        let mut provider = MockStatusProvider::new();
        provider
            .expect_fetch_status()
            .returning(|| Err(anyhow!("connection refused")));

        let stage = TestStage::new()?;
        let err = StatusCollector::new(Arc::new(provider))
            .collect(&stage.ctx())
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("connection refused"));
        Ok(())
    }
}
