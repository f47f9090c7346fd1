#![allow(
    clippy::allow_attributes,
    reason = "Needed for lints that don't follow expect"
)]
//! A meshsub peer that lies about its topic interest.
//!
//! Inbound pubsub streams are served by one session each. Every announced
//! subscription is echoed back with a graft request, published content is
//! swallowed and nothing is ever relayed.

use std::collections::hash_map::HashMap;
use std::sync::Arc;

use eyre::{bail, Result as EyreResult};
use futures_util::StreamExt;
use libp2p::identify::{Behaviour as IdentifyBehaviour, Config as IdentifyConfig};
use libp2p::noise::Config as NoiseConfig;
use libp2p::ping::Behaviour as PingBehaviour;
use libp2p::swarm::{NetworkBehaviour, Swarm};
use libp2p::tcp::Config as TcpConfig;
use libp2p::yamux::Config as YamuxConfig;
use libp2p::{PeerId, Stream as P2pStream, StreamProtocol, SwarmBuilder};
use libp2p_stream::{Behaviour as StreamBehaviour, IncomingStreams};
use sybil_network_primitives::stream::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::NetworkClient;
use crate::config::NetworkConfig;
use crate::gate::AttackGate;
use crate::handler::Command;
use crate::sender::StreamSender;
use crate::session::SessionContext;
use crate::sessions::Sessions;

pub mod client;
pub mod config;
mod events;
pub mod gate;
mod handler;
pub mod sender;
pub mod session;
pub mod sessions;
pub mod shape;
pub mod strategy;

const PROTOCOL_VERSION: &str = "ipfs/0.1.0";
const AGENT_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(NetworkBehaviour)]
struct Behaviour {
    identify: IdentifyBehaviour,
    ping: PingBehaviour,
    stream: StreamBehaviour,
}

/// Starts the node and returns a client to drive it together with the handle
/// of its event loop. Cancelling `shutdown` stops the loop and every session.
pub async fn run(
    config: &NetworkConfig,
    shutdown: CancellationToken,
) -> EyreResult<(NetworkClient, JoinHandle<()>)> {
    let (client, event_loop) = init(config, shutdown)?;

    let handle = spawn(event_loop.run());

    for addr in &config.swarm.listen {
        client.listen_on(addr.clone()).await?;
    }

    Ok((client, handle))
}

fn init(
    config: &NetworkConfig,
    shutdown: CancellationToken,
) -> EyreResult<(NetworkClient, EventLoop)> {
    config.sybil.validate()?;

    let swarm = SwarmBuilder::with_existing_identity(config.identity.clone())
        .with_tokio()
        .with_tcp(
            TcpConfig::default().nodelay(true),
            NoiseConfig::new,
            YamuxConfig::default,
        )?
        .with_behaviour(|key| Behaviour {
            identify: IdentifyBehaviour::new(
                IdentifyConfig::new(PROTOCOL_VERSION.to_owned(), key.public())
                    .with_agent_version(AGENT_VERSION.to_owned()),
            ),
            ping: PingBehaviour::default(),
            stream: StreamBehaviour::new(),
        })?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(Duration::from_secs(60)))
        .build();

    let mut control = swarm.behaviour().stream.new_control();

    let incoming_streams = match control.accept(config.protocol.clone()) {
        Ok(incoming_streams) => incoming_streams,
        Err(err) => {
            bail!("Failed to setup control for stream protocol: {:?}", err)
        }
    };

    let sender = StreamSender::new(control, config.protocol.clone());
    let gate = AttackGate::new(config.sybil.attack_delay);
    let context = SessionContext::new(config.seq, Arc::new(sender), gate);
    let sessions = Sessions::new(context, shutdown.clone());

    info!(
        peer_id = %swarm.local_peer_id(),
        seq = config.seq,
        protocol = %config.protocol,
        params = ?config.sybil,
        "sybil node initialised"
    );

    let (command_sender, command_receiver) = mpsc::channel(32);

    let client = NetworkClient::new(command_sender, sessions.clone());

    let event_loop = EventLoop::new(
        swarm,
        incoming_streams,
        command_receiver,
        sessions,
        config.protocol.clone(),
        shutdown,
    );

    Ok((client, event_loop))
}

pub(crate) struct EventLoop {
    swarm: Box<Swarm<Behaviour>>,
    incoming_streams: Box<IncomingStreams>,
    command_receiver: mpsc::Receiver<Command>,
    sessions: Sessions,
    protocol: StreamProtocol,
    shutdown: CancellationToken,
    pending_dial: HashMap<PeerId, oneshot::Sender<EyreResult<Option<()>>>>,
}

#[allow(
    clippy::multiple_inherent_impl,
    reason = "Currently necessary due to code structure"
)]
impl EventLoop {
    fn new(
        swarm: Swarm<Behaviour>,
        incoming_streams: IncomingStreams,
        command_receiver: mpsc::Receiver<Command>,
        sessions: Sessions,
        protocol: StreamProtocol,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            swarm: Box::new(swarm),
            incoming_streams: Box::new(incoming_streams),
            command_receiver,
            sessions,
            protocol,
            shutdown,
            pending_dial: HashMap::default(),
        }
    }

    pub(crate) async fn run(mut self) {
        #[expect(clippy::redundant_pub_crate, reason = "Needed for Tokio code")]
        loop {
            select! {
                () = self.shutdown.cancelled() => break,
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event).await;
                },
                incoming_stream = self.incoming_streams.next() => {
                    let Some(incoming_stream) = incoming_stream else {
                        warn!("Incoming stream registration was dropped");
                        break;
                    };
                    self.handle_incoming_stream(incoming_stream);
                },
                command = self.command_receiver.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command);
                }
            }
        }

        let active = self.sessions.len();
        self.sessions.shutdown().await;

        info!(active, "network event loop stopped");
    }

    fn handle_incoming_stream(&mut self, (peer_id, stream): (PeerId, P2pStream)) {
        debug!(%peer_id, protocol = %self.protocol, "accepted pubsub stream");

        drop(self.sessions.accept(peer_id, Stream::new(stream)));
    }
}
