//! Ring snapshot acquisition from cluster membership.
//!
//! The membership client is an external collaborator with its own network
//! protocol. This module only bounds the call with a timeout and maps every
//! failure to `TopologyUnavailable`.

use std::time::Duration;

use async_trait::async_trait;
use ringscan_common::{Error, Result, RingSnapshot};
use tracing::{debug, warn};

/// Source of ring snapshots.
#[async_trait]
pub trait TopologyClient: Send + Sync {
    async fn fetch_ring(&self) -> anyhow::Result<RingSnapshot>;
}

/// Fetches one snapshot, giving up after `timeout`.
pub async fn fetch_ring(client: &dyn TopologyClient, timeout: Duration) -> Result<RingSnapshot> {
    match tokio::time::timeout(timeout, client.fetch_ring()).await {
        Ok(Ok(ring)) => {
            debug!(
                nodes = ring.nodes().len(),
                partitions = ring.partitions().len(),
                "fetched ring snapshot"
            );
            Ok(ring)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "ring fetch failed");
            Err(Error::TopologyUnavailable(format!("{:#}", e)))
        }
        Err(_) => {
            warn!(?timeout, "ring fetch timed out");
            Err(Error::TopologyUnavailable(format!(
                "ring fetch timed out after {}ms",
                timeout.as_millis()
            )))
        }
    }
}

/// Serves a fixed snapshot, e.g. one loaded from a cluster-state file.
#[derive(Debug, Clone)]
pub struct StaticTopology {
    ring: RingSnapshot,
}

impl StaticTopology {
    pub fn new(ring: RingSnapshot) -> Self {
        Self { ring }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        RingSnapshot::from_json(raw).map(Self::new)
    }
}

#[async_trait]
impl TopologyClient for StaticTopology {
    async fn fetch_ring(&self) -> anyhow::Result<RingSnapshot> {
        Ok(self.ring.clone())
    }
}
