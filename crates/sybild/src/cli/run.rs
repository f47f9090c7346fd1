use core::time::Duration;

use clap::Parser;
use eyre::{bail, Result as EyreResult};
use humantime::{format_duration, parse_duration};
use rand::thread_rng;
use sybil_config::ConfigFile;
use sybil_network::client::NetworkClient;
use sybil_network::config::NetworkConfig;
use sybil_network::shape::{setup_network, NoopShaper};
use tokio::signal::ctrl_c;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::RootArgs;

/// Run a node
#[derive(Debug, Parser)]
pub struct RunCommand {
    /// Override how long the node runs before shutting down
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub runtime: Option<Duration>,
}

impl RunCommand {
    pub async fn run(self, root_args: &RootArgs) -> EyreResult<()> {
        let path = root_args.node_dir();

        if !ConfigFile::exists(&path) {
            bail!("Node is not initialized in {:?}", path);
        }

        let config = ConfigFile::load(&path)?;
        config.validate()?;

        for option in config.pubsub.options() {
            debug!(?option, "pubsub option");
        }

        setup_network(&NoopShaper, &config.shape, config.run.instances).await?;

        let network = NetworkConfig::new(
            config.identity.clone(),
            config.seq,
            config.protocol()?,
            config.swarm.clone(),
            config.sybil,
        );

        let shutdown = CancellationToken::new();
        let (client, event_loop) = sybil_network::run(&network, shutdown.clone()).await?;

        dial_targets(&client, &config, &shutdown);

        let runtime = self.runtime.unwrap_or(config.run.runtime);
        info!(runtime = %format_duration(runtime), "sybil node running");

        tokio::select! {
            result = ctrl_c() => {
                result?;
                info!("Received interrupt, shutting down");
            }
            () = sleep(runtime) => info!("Runtime elapsed, shutting down"),
        }

        shutdown.cancel();
        event_loop.await?;

        Ok(())
    }
}

fn dial_targets(client: &NetworkClient, config: &ConfigFile, shutdown: &CancellationToken) {
    let schedule = config.run.connect_delays.schedule(
        config.targets.len(),
        config.run.connect_delay_jitter_pct,
        &mut thread_rng(),
    );

    for (target, delay) in config.targets.iter().cloned().zip(schedule) {
        let client = client.clone();
        let shutdown = shutdown.clone();

        drop(tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => return,
                () = sleep(delay) => {}
            }

            match client.connect(target.clone()).await {
                Ok(Some(())) => info!(%target, "Connected to target"),
                Ok(None) => debug!(%target, "Dial to target already in progress"),
                Err(err) => warn!(%target, %err, "Failed to connect to target"),
            }
        }));
    }
}
