//! Link shaping requested from the test harness before the node starts.
//!
//! The sidecar that actually shapes traffic lives outside this process and is
//! reached through [`NetworkShaper`]. Local runs use [`NoopShaper`].

use core::time::Duration;

use async_trait::async_trait;
use eyre::{Result as EyreResult, WrapErr};
use rand::{thread_rng, Rng};
use tracing::{debug, info};

use crate::config::ShapeConfig;

/// Sync point every instance reaches once its link is configured.
pub const NETWORK_CONFIGURED: &str = "network-configured";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LinkShape {
    pub latency: Duration,
    pub jitter: Duration,
    /// Bytes per second.
    pub bandwidth: u64,
}

impl LinkShape {
    pub fn from_params<R: Rng + ?Sized>(config: &ShapeConfig, rng: &mut R) -> Self {
        let latency = if config.latency_max > config.latency {
            rng.gen_range(config.latency..config.latency_max)
        } else {
            config.latency
        };

        let jitter = config
            .latency
            .saturating_mul(config.jitter_pct)
            .checked_div(100)
            .unwrap_or_default();

        Self {
            latency,
            jitter,
            bandwidth: config.bandwidth_mb.saturating_mul(1_024 * 1_024),
        }
    }
}

#[async_trait]
pub trait NetworkShaper: Send + Sync {
    async fn apply(&self, shape: LinkShape) -> EyreResult<()>;

    async fn barrier(&self, state: &str, count: usize) -> EyreResult<()>;
}

/// Accepts every request without touching the network.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopShaper;

#[async_trait]
impl NetworkShaper for NoopShaper {
    async fn apply(&self, shape: LinkShape) -> EyreResult<()> {
        info!(?shape, "no shaping sidecar, link left as is");

        Ok(())
    }

    async fn barrier(&self, state: &str, count: usize) -> EyreResult<()> {
        debug!(state, count, "no sync service, barrier passes immediately");

        Ok(())
    }
}

/// Applies the configured link shape and waits for all `instances` to do the
/// same. Any failure here is fatal for the run.
pub async fn setup_network<S>(shaper: &S, config: &ShapeConfig, instances: usize) -> EyreResult<()>
where
    S: NetworkShaper + ?Sized,
{
    if !config.enabled {
        debug!("network shaping disabled");
        return Ok(());
    }

    let shape = {
        let mut rng = thread_rng();
        LinkShape::from_params(config, &mut rng)
    };

    shaper
        .apply(shape)
        .await
        .wrap_err("failed to configure network")?;

    shaper
        .barrier(NETWORK_CONFIGURED, instances)
        .await
        .wrap_err_with(|| format!("failed waiting on {NETWORK_CONFIGURED:?}"))?;

    info!(?shape, instances, "network configured");

    Ok(())
}
