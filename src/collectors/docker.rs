//! Container self-inspection and container listing.
//!
//! Only part of the collector set when a container runtime is available.

use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::bytes::Regex;
use serde::Serialize;

use crate::collectors::collector::{CollectContext, Collector};
use crate::collectors::providers::{ContainerRuntime, ContainerSummary};
use crate::constants::{
    COLLECTOR_DOCKER_INSPECT, COLLECTOR_DOCKER_PS, DOCKER_INSPECT_FILE_NAME, DOCKER_PS_FILE_NAME,
    SHORT_CONTAINER_ID_LEN,
};
use crate::security::credential_scrubber::Replacer;

/// Image references by digest, as they appear in the serialized inspection.
const IMAGE_DIGEST_PATTERN: &str = r#""Image":\s*"(sha256:[0-9a-fA-F]+)""#;

lazy_static! {
    static ref IMAGE_DIGEST: Regex = Regex::new(IMAGE_DIGEST_PATTERN).expect("image digest pattern");
}

/// Writes this process's own container inspection to `docker_inspect.log`.
///
/// Image digests are replaced by their `name:tag` where the runtime can
/// resolve them; unresolved digests are left as they are.
pub struct DockerInspectCollector {
    runtime: Arc<dyn ContainerRuntime>,
}

impl DockerInspectCollector {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    async fn resolve_digests(&self, json: &[u8], ctx: &CollectContext<'_>) -> HashMap<String, String> {
        let digests: BTreeSet<String> = IMAGE_DIGEST
            .captures_iter(json)
            .map(|caps| String::from_utf8_lossy(&caps[1]).into_owned())
            .collect();

        let mut names = HashMap::new();
        for digest in digests {
            let lookup = self.runtime.resolve_image_digest(&digest);
            match tokio::time::timeout(ctx.config.collector_timeout(), lookup).await {
                Ok(Ok(name)) => {
                    debug!("Resolved image {} to {}", digest, name);
                    names.insert(digest, name);
                }
                Ok(Err(e)) => warn!("Could not resolve image {}: {}", digest, e),
                Err(_) => warn!("Timed out resolving image {}", digest),
            }
        }
        names
    }
}

/// Serialize with tab indentation, the layout support tooling expects.
fn to_tab_indented_json(value: &serde_json::Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .context("Failed to serialize container inspection")?;
    buf.push(b'\n');
    Ok(buf)
}

fn image_replacer(names: HashMap<String, String>) -> Result<Replacer> {
    let replacer = Replacer::with_fn(IMAGE_DIGEST_PATTERN, move |caps| {
        let digest = String::from_utf8_lossy(&caps[1]);
        match names.get(digest.as_ref()) {
            Some(name) => format!("\"Image\": \"{}\"", name).into_bytes(),
            None => caps[0].to_vec(),
        }
    })?;
    Ok(replacer)
}

#[async_trait::async_trait]
impl Collector for DockerInspectCollector {
    fn name(&self) -> &'static str {
        COLLECTOR_DOCKER_INSPECT
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<()> {
        let inspect = self
            .runtime
            .inspect_self()
            .await
            .context("Failed to inspect own container")?;
        let json = to_tab_indented_json(&inspect)?;
        let names = self.resolve_digests(&json, ctx).await;

        let mut writer = ctx.writer(DOCKER_INSPECT_FILE_NAME)?;
        writer.register_replacer(image_replacer(names)?)?;
        writer.write_all(&json).context("Failed to write container inspection")?;
        let written = writer.close()?;

        info!("Collected container inspection ({} bytes)", written);
        Ok(())
    }
}

/// Writes the container list to `docker_ps.log` as an aligned table.
pub struct DockerPsCollector {
    runtime: Arc<dyn ContainerRuntime>,
}

impl DockerPsCollector {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }
}

fn format_container_table(containers: &[ContainerSummary]) -> String {
    const HEADER: [&str; 6] = ["CONTAINER ID", "IMAGE", "COMMAND", "STATUS", "PORTS", "NAMES"];

    let mut rows: Vec<[String; 6]> = vec![HEADER.map(str::to_string)];
    for c in containers {
        rows.push([
            c.id.chars().take(SHORT_CONTAINER_ID_LEN).collect(),
            c.image.clone(),
            c.command.clone(),
            c.status.clone(),
            c.ports.clone(),
            c.names.clone(),
        ]);
    }

    let mut widths = [0usize; 6];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut table = String::new();
    for row in &rows {
        let mut line = String::new();
        for (cell, width) in row.iter().zip(widths.iter()) {
            line.push_str(&format!("{:<width$}  ", cell, width = *width));
        }
        table.push_str(line.trim_end());
        table.push('\n');
    }
    table
}

#[async_trait::async_trait]
impl Collector for DockerPsCollector {
    fn name(&self) -> &'static str {
        COLLECTOR_DOCKER_PS
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<()> {
        let containers = self
            .runtime
            .list_containers()
            .await
            .context("Failed to list containers")?;

        let mut writer = ctx.writer(DOCKER_PS_FILE_NAME)?;
        writer
            .write_all(format_container_table(&containers).as_bytes())
            .context("Failed to write container list")?;
        writer.close()?;

        info!("Collected container list ({} containers)", containers.len());
        Ok(())
    }
}
