use core::time::Duration;

use eyre::{eyre, Result as EyreResult};
use libp2p::identity::Keypair;
use libp2p::StreamProtocol;
use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 2428;

pub const DEFAULT_DEGRADE: f64 = 1.0;
pub const DEFAULT_REGRAFT_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_REGRAFT_BACKOFF: Duration = Duration::from_secs(15);
pub const DEFAULT_SEEN_CACHE_DURATION: Duration = Duration::from_secs(120);

#[derive(Debug)]
#[non_exhaustive]
pub struct NetworkConfig {
    pub identity: Keypair,
    /// Sequence number of this node within the experiment, used in log prefixes.
    pub seq: u64,
    pub protocol: StreamProtocol,

    pub swarm: SwarmConfig,
    pub sybil: SybilParams,
}

impl NetworkConfig {
    #[must_use]
    pub const fn new(
        identity: Keypair,
        seq: u64,
        protocol: StreamProtocol,
        swarm: SwarmConfig,
        sybil: SybilParams,
    ) -> Self {
        Self {
            identity,
            seq,
            protocol,
            swarm,
            sybil,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct SwarmConfig {
    pub listen: Vec<Multiaddr>,
}

impl SwarmConfig {
    #[must_use]
    pub const fn new(listen: Vec<Multiaddr>) -> Self {
        Self { listen }
    }
}

/// Timing knobs of the attack. They decide when the sybil acts, never what
/// it answers.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SybilParams {
    /// Fraction of real relay work withheld, in `[0, 1]`.
    pub degrade: f64,
    /// Time after startup before any forged response is sent.
    #[serde(with = "humantime_serde")]
    pub attack_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub regraft_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub regraft_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub seen_cache_duration: Duration,
}

impl SybilParams {
    pub fn validate(&self) -> EyreResult<()> {
        if !(0.0..=1.0).contains(&self.degrade) {
            return Err(eyre!(
                "sybil degrade must be within [0, 1], got {}",
                self.degrade
            ));
        }

        Ok(())
    }
}

impl Default for SybilParams {
    fn default() -> Self {
        Self {
            degrade: DEFAULT_DEGRADE,
            attack_delay: Duration::ZERO,
            regraft_delay: DEFAULT_REGRAFT_DELAY,
            regraft_backoff: DEFAULT_REGRAFT_BACKOFF,
            seen_cache_duration: DEFAULT_SEEN_CACHE_DURATION,
        }
    }
}

/// Link characteristics requested from the network emulation sidecar.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct ShapeConfig {
    /// Whether a shaping sidecar is present at all. Local runs leave it off.
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
    /// When non-zero, the effective latency is drawn from `[latency, latency_max)`.
    #[serde(with = "humantime_serde")]
    pub latency_max: Duration,
    pub jitter_pct: u32,
    pub bandwidth_mb: u64,
}

impl ShapeConfig {
    pub fn validate(&self) -> EyreResult<()> {
        if self.jitter_pct > 100 {
            return Err(eyre!(
                "jitter_pct must be at most 100, got {}",
                self.jitter_pct
            ));
        }

        if !self.latency_max.is_zero() && self.latency_max < self.latency {
            return Err(eyre!(
                "latency_max ({:?}) must not be below latency ({:?})",
                self.latency_max,
                self.latency
            ));
        }

        Ok(())
    }
}

pub fn parse_protocol(protocol: &str) -> EyreResult<StreamProtocol> {
    StreamProtocol::try_from_owned(protocol.to_owned())
        .map_err(|err| eyre!("invalid stream protocol {:?}: {}", protocol, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sybil_params_are_valid() {
        let params = SybilParams::default();

        assert!(params.validate().is_ok());
        assert!((params.degrade - 1.0).abs() < f64::EPSILON);
        assert_eq!(params.attack_delay, Duration::ZERO);
    }

    #[test]
    fn test_degrade_out_of_range_is_rejected() {
        for degrade in [-0.1, 1.5, f64::NAN] {
            let params = SybilParams {
                degrade,
                ..SybilParams::default()
            };
            assert!(params.validate().is_err(), "degrade {degrade} accepted");
        }
    }

    #[test]
    fn test_shape_bounds() {
        let shape = ShapeConfig {
            jitter_pct: 101,
            ..ShapeConfig::default()
        };
        assert!(shape.validate().is_err());

        let shape = ShapeConfig {
            latency: Duration::from_millis(100),
            latency_max: Duration::from_millis(50),
            ..ShapeConfig::default()
        };
        assert!(shape.validate().is_err());

        let shape = ShapeConfig {
            latency: Duration::from_millis(100),
            jitter_pct: 10,
            ..ShapeConfig::default()
        };
        assert!(shape.validate().is_ok());
    }

    #[test]
    fn test_protocol_must_be_absolute() {
        assert_eq!(
            parse_protocol("/meshsub/1.1.0").unwrap().as_ref(),
            "/meshsub/1.1.0"
        );
        assert!(parse_protocol("meshsub").is_err());
    }
}
