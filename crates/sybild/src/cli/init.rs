use std::fs::create_dir_all;

use clap::Parser;
use eyre::{bail, Result as EyreResult, WrapErr};
use libp2p_identity::Keypair;
use multiaddr::{Multiaddr, Protocol};
use sybil_config::ConfigFile;
use sybil_network::config::{SwarmConfig, DEFAULT_PORT};
use tracing::{info, warn};

use crate::cli::RootArgs;

/// Initialize node configuration
#[derive(Debug, Parser)]
pub struct InitCommand {
    /// Port to listen on
    #[arg(long, value_name = "PORT")]
    #[arg(default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Honest peer to dial once running, as `/.../p2p/<peer>`
    #[arg(long, value_name = "ADDR")]
    pub target: Vec<Multiaddr>,

    /// Force initialization even if the node is already initialized
    #[arg(long)]
    pub force: bool,
}

impl InitCommand {
    pub fn run(self, root_args: &RootArgs) -> EyreResult<()> {
        let path = root_args.node_dir();

        if !path.exists() {
            create_dir_all(&path)
                .wrap_err_with(|| format!("failed to create directory {path:?}"))?;
        }

        if ConfigFile::exists(&path) {
            if let Err(err) = ConfigFile::load(&path) {
                if self.force {
                    warn!(%err, "Failed to load existing configuration, overwriting");
                } else {
                    bail!("failed to load existing configuration: {err}");
                }
            }
            if !self.force {
                bail!("Node is already initialized in {path:?}");
            }
        }

        let identity = Keypair::generate_ed25519();
        info!("Generated identity: {:?}", identity.public().to_peer_id());

        let listen = Multiaddr::empty()
            .with(Protocol::Ip4([0, 0, 0, 0].into()))
            .with(Protocol::Tcp(self.port));

        let config = ConfigFile::new(identity, SwarmConfig::new(vec![listen]), self.target);

        config.validate()?;
        config.save(&path)?;

        info!("Initialized a sybil node in {:?}", path);

        Ok(())
    }
}
