use core::time::Duration;
use std::fs::{read_to_string, write};

use camino::Utf8Path;
use eyre::{bail, Result as EyreResult, WrapErr};
use libp2p::StreamProtocol;
use libp2p_identity::Keypair;
use multiaddr::{Multiaddr, Protocol};
use serde::{Deserialize, Serialize};
use sybil_network::config::{parse_protocol, ShapeConfig, SwarmConfig, SybilParams};

mod delays;
mod pubsub;

pub use delays::ConnectDelays;
pub use pubsub::{PubsubOption, PubsubOptions};

pub const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_PROTOCOL: &str = "/meshsub/1.0.0";
pub const DEFAULT_RUNTIME: Duration = Duration::from_secs(120);
pub const DEFAULT_CONNECT_DELAY_JITTER_PCT: u32 = 5;

#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ConfigFile {
    /// Position of this node in the experiment.
    #[serde(default)]
    pub seq: u64,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Peers dialled once the node is up, each as `/.../p2p/<peer>`.
    #[serde(default)]
    pub targets: Vec<Multiaddr>,

    #[serde(
        with = "serde_identity",
        default = "libp2p_identity::Keypair::generate_ed25519"
    )]
    pub identity: Keypair,

    pub swarm: SwarmConfig,

    #[serde(default)]
    pub sybil: SybilParams,

    #[serde(default)]
    pub shape: ShapeConfig,

    #[serde(default)]
    pub pubsub: PubsubOptions,

    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct RunConfig {
    #[serde(with = "humantime_serde")]
    pub runtime: Duration,
    pub connect_delays: ConnectDelays,
    pub connect_delay_jitter_pct: u32,
    /// Number of instances taking part in barriers.
    pub instances: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            runtime: DEFAULT_RUNTIME,
            connect_delays: ConnectDelays::default(),
            connect_delay_jitter_pct: DEFAULT_CONNECT_DELAY_JITTER_PCT,
            instances: 1,
        }
    }
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_owned()
}

impl ConfigFile {
    #[must_use]
    pub fn new(identity: Keypair, swarm: SwarmConfig, targets: Vec<Multiaddr>) -> Self {
        Self {
            seq: 0,
            protocol: default_protocol(),
            targets,
            identity,
            swarm,
            sybil: SybilParams::default(),
            shape: ShapeConfig::default(),
            pubsub: PubsubOptions::default(),
            run: RunConfig::default(),
        }
    }

    #[must_use]
    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(CONFIG_FILE).is_file()
    }

    pub fn load(dir: &Utf8Path) -> EyreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let content = read_to_string(&path)
            .wrap_err_with(|| format!("failed to read configuration from {path:?}"))?;

        toml::from_str(&content).wrap_err_with(|| format!("failed to parse {path:?}"))
    }

    pub fn save(&self, dir: &Utf8Path) -> EyreResult<()> {
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;

        write(&path, content)
            .wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;

        Ok(())
    }

    /// Rejects configurations the node cannot start with.
    pub fn validate(&self) -> EyreResult<()> {
        let _protocol = self.protocol()?;

        self.sybil.validate()?;
        self.shape.validate()?;

        if self.run.connect_delay_jitter_pct > 100 {
            bail!(
                "connect_delay_jitter_pct must be at most 100, got {}",
                self.run.connect_delay_jitter_pct
            );
        }

        for target in &self.targets {
            if !matches!(target.iter().last(), Some(Protocol::P2p(_))) {
                bail!("target {target} does not end in /p2p/<peer>");
            }
        }

        Ok(())
    }

    pub fn protocol(&self) -> EyreResult<StreamProtocol> {
        parse_protocol(&self.protocol)
    }
}

pub mod serde_identity {
    use core::fmt::{self, Formatter};

    use libp2p_identity::Keypair;
    use serde::de::{self, MapAccess};
    use serde::ser::{self, SerializeMap};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(key: &Keypair, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut keypair = serializer.serialize_map(Some(2))?;
        keypair.serialize_entry("peer_id", &key.public().to_peer_id().to_base58())?;
        keypair.serialize_entry(
            "keypair",
            &bs58::encode(&key.to_protobuf_encoding().map_err(ser::Error::custom)?).into_string(),
        )?;
        keypair.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Keypair, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdentityVisitor;

        impl<'de> de::Visitor<'de> for IdentityVisitor {
            type Value = Keypair;

            fn expecting(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
                formatter.write_str("an identity")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut peer_id = None::<String>;
                let mut priv_key = None::<String>;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "peer_id" => peer_id = Some(map.next_value()?),
                        "keypair" => priv_key = Some(map.next_value()?),
                        _ => {
                            let _ignored = map.next_value::<de::IgnoredAny>()?;
                        }
                    }
                }

                let peer_id = peer_id.ok_or_else(|| de::Error::missing_field("peer_id"))?;
                let priv_key = priv_key.ok_or_else(|| de::Error::missing_field("keypair"))?;

                let priv_key = bs58::decode(priv_key)
                    .into_vec()
                    .map_err(|_| de::Error::custom("invalid base58"))?;

                let keypair = Keypair::from_protobuf_encoding(&priv_key)
                    .map_err(|_| de::Error::custom("invalid protobuf"))?;

                if peer_id != keypair.public().to_peer_id().to_base58() {
                    return Err(de::Error::custom("Peer ID does not match public key"));
                }

                Ok(keypair)
            }
        }

        deserializer.deserialize_struct("Keypair", &["peer_id", "keypair"], IdentityVisitor)
    }
}

#[cfg(test)]
mod tests {
    use std::env::temp_dir;
    use std::fs::{create_dir_all, remove_dir_all};
    use std::process;

    use camino::Utf8PathBuf;

    use super::*;

    const MINIMAL: &str = r#"
        [swarm]
        listen = ["/ip4/0.0.0.0/tcp/2428"]
    "#;

    fn target() -> Multiaddr {
        let peer = Keypair::generate_ed25519().public().to_peer_id();
        format!("/ip4/10.0.0.2/tcp/2428/p2p/{peer}").parse().unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ConfigFile = toml::from_str(MINIMAL).unwrap();

        assert_eq!(config.seq, 0);
        assert_eq!(config.protocol().unwrap().as_ref(), DEFAULT_PROTOCOL);
        assert_eq!(config.sybil, SybilParams::default());
        assert_eq!(config.run, RunConfig::default());
        assert!(!config.shape.enabled);
        assert!(config.pubsub.options().is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_config_parses() {
        let target = target();
        let content = format!(
            r#"
            seq = 4
            protocol = "/meshsub/1.1.0"
            targets = ["{target}"]

            [swarm]
            listen = ["/ip4/0.0.0.0/tcp/2428"]

            [sybil]
            degrade = 0.5
            attack_delay = "30s"
            regraft_delay = "1m"

            [shape]
            enabled = true
            latency = "50ms"
            latency_max = "80ms"
            jitter_pct = 10
            bandwidth_mb = 10

            [pubsub]
            outbound_queue_size = 64

            [run]
            runtime = "5m"
            connect_delays = "1@10s,2@1m"
            instances = 20
            "#
        );

        let config: ConfigFile = toml::from_str(&content).unwrap();

        assert_eq!(config.seq, 4);
        assert_eq!(config.targets, [target]);
        assert!((config.sybil.degrade - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.sybil.attack_delay, Duration::from_secs(30));
        assert_eq!(config.sybil.regraft_delay, Duration::from_secs(60));
        assert_eq!(
            config.sybil.regraft_backoff,
            SybilParams::default().regraft_backoff
        );
        assert_eq!(config.shape.latency_max, Duration::from_millis(80));
        assert_eq!(
            config.pubsub.options(),
            [PubsubOption::PeerOutboundQueueSize(64)]
        );
        assert_eq!(config.run.runtime, Duration::from_secs(300));
        assert_eq!(config.run.connect_delays.len(), 3);
        assert_eq!(config.run.connect_delay_jitter_pct, 5);
        assert_eq!(config.run.instances, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config: ConfigFile = toml::from_str(MINIMAL).unwrap();
        config.targets = vec!["/ip4/10.0.0.2/tcp/2428".parse().unwrap()];
        assert!(config.validate().is_err());

        let mut config: ConfigFile = toml::from_str(MINIMAL).unwrap();
        config.sybil.degrade = 2.0;
        assert!(config.validate().is_err());

        let mut config: ConfigFile = toml::from_str(MINIMAL).unwrap();
        config.protocol = "meshsub".to_owned();
        assert!(config.validate().is_err());

        let mut config: ConfigFile = toml::from_str(MINIMAL).unwrap();
        config.run.connect_delay_jitter_pct = 150;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_connect_delays_fail_to_parse() {
        let content = format!("{MINIMAL}\n[run]\nconnect_delays = \"5-10s\"\n");

        assert!(toml::from_str::<ConfigFile>(&content).is_err());
    }

    #[test]
    fn test_save_then_load_keeps_identity() {
        let dir = temp_dir().join(format!("sybil-config-{}", process::id()));
        create_dir_all(&dir).unwrap();
        let dir = Utf8PathBuf::from_path_buf(dir).unwrap();

        let swarm = SwarmConfig::new(vec!["/ip4/0.0.0.0/tcp/2428".parse().unwrap()]);
        let config = ConfigFile::new(Keypair::generate_ed25519(), swarm, vec![target()]);

        assert!(!ConfigFile::exists(&dir));
        config.save(&dir).unwrap();
        assert!(ConfigFile::exists(&dir));

        let loaded = ConfigFile::load(&dir).unwrap();
        remove_dir_all(&dir).unwrap();

        assert_eq!(
            loaded.identity.public().to_peer_id(),
            config.identity.public().to_peer_id()
        );
        assert_eq!(loaded.targets, config.targets);
        assert_eq!(loaded.sybil, config.sybil);
        assert_eq!(loaded.run, config.run);
    }

    #[test]
    fn test_identity_with_wrong_peer_id_is_rejected() {
        let key = Keypair::generate_ed25519();
        let other = Keypair::generate_ed25519().public().to_peer_id();
        let content = format!(
            "[identity]\npeer_id = \"{other}\"\nkeypair = \"{}\"\n{MINIMAL}",
            bs58::encode(key.to_protobuf_encoding().unwrap()).into_string()
        );

        let err = toml::from_str::<ConfigFile>(&content).unwrap_err();

        assert!(err.to_string().contains("Peer ID does not match"));
    }
}
