//! Server network layer handling UDP communications and the session loop

use crate::client_manager::ClientManager;
use crate::config::SessionConfig;
use crate::replication::Outgoing;
use crate::scheduler::TimerEvent;
use crate::session::SessionManager;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ConnectionId, Packet, Pattern, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;

const LIVENESS_CHECK_INTERVAL: Duration = Duration::from_secs(1);
const SENDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Messages delivered to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    Timer {
        generation: u64,
        event: TimerEvent,
    },
    Shutdown,
}

/// Main server owning the socket and the single authoritative session
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: ClientManager,
    session: SessionManager,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Outgoing>>,

    receiver_task: Option<JoinHandle<()>>,
    sender_task: Option<JoinHandle<()>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: SessionConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let clients = ClientManager::new(config.client_timeout());
        let session = SessionManager::new(
            config,
            Pattern::standard_catalog(),
            outbound_tx,
            server_tx.clone(),
        );

        Ok(Server {
            socket,
            clients,
            session,
            server_tx,
            server_rx,
            outbound_rx: Some(outbound_rx),
            receiver_task: None,
            sender_task: None,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender for posting `ServerMessage::Shutdown` from outside the loop
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&mut self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        self.receiver_task = Some(tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }));
    }

    /// Spawns task that writes the replication queue to the socket in order
    ///
    /// The task ends once the session closes its replication channel and the
    /// queue is drained.
    fn spawn_network_sender(&mut self) {
        let Some(mut outbound_rx) = self.outbound_rx.take() else {
            warn!("Network sender already running");
            return;
        };
        let socket = Arc::clone(&self.socket);

        self.sender_task = Some(tokio::spawn(async move {
            while let Some(Outgoing { addr, packet }) = outbound_rx.recv().await {
                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
            debug!("Outbound queue closed");
        }));
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    /// Routes an incoming packet to the session
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::RequestJoin {
            client_version,
            desired_seat_count,
        } = packet
        {
            self.handle_join(addr, client_version, desired_seat_count)
                .await;
            return;
        }

        let Some(client_id) = self.clients.find_client_by_addr(addr) else {
            warn!("Packet from unknown address {} ignored", addr);
            return;
        };
        self.clients.touch(client_id);

        match packet {
            Packet::SetReady { ready } => {
                if let Err(e) = self.session.set_ready(client_id, ready) {
                    debug!("Ready change from {} ignored: {}", client_id, e);
                }
            }
            Packet::SetDisplayName { name } => {
                if let Err(e) = self.session.set_display_name(client_id, &name) {
                    debug!("Rename from {} ignored: {}", client_id, e);
                }
            }
            Packet::RequestStart => {
                let _ = self.session.request_start(client_id);
            }
            Packet::ClaimWin { marking } => {
                let _ = self.session.claim_win(client_id, &marking);
            }
            Packet::RequestReset => {
                let _ = self.session.request_reset(client_id);
            }
            Packet::Heartbeat => {}
            Packet::Leave => {
                self.disconnect(client_id);
            }
            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_join(
        &mut self,
        addr: SocketAddr,
        client_version: u32,
        desired_seat_count: Option<u8>,
    ) {
        info!(
            "Client joining from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            warn!(
                "Rejecting {}: protocol version {} (expected {})",
                addr, client_version, PROTOCOL_VERSION
            );
            let response = Packet::Disconnected {
                reason: format!(
                    "Protocol version {} is not supported, expected {}",
                    client_version, PROTOCOL_VERSION
                ),
            };
            if let Err(e) = Self::send_packet_impl(&self.socket, &response, addr).await {
                error!("Failed to send packet to {}: {}", addr, e);
            }
            return;
        }

        // Joins are retried over UDP; the same address keeps its connection
        if let Some(existing_id) = self.clients.find_client_by_addr(addr) {
            debug!("Repeated join from {} for client {}", addr, existing_id);
            self.clients.touch(existing_id);
            let _ = self
                .session
                .on_connection_join(existing_id, addr, desired_seat_count);
            return;
        }

        let client_id = self.clients.add_client(addr);
        if self
            .session
            .on_connection_join(client_id, addr, desired_seat_count)
            .is_err()
        {
            self.clients.remove_client(&client_id);
        }
    }

    fn disconnect(&mut self, client_id: ConnectionId) {
        self.clients.remove_client(&client_id);
        self.session.on_connection_leave(client_id);
    }

    fn check_timeouts(&mut self) {
        for client_id in self.clients.check_timeouts() {
            self.session.on_connection_leave(client_id);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();

        let mut liveness = interval(LIVENESS_CHECK_INTERVAL);
        let mut liveness_ticks: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::Timer { generation, event }) => {
                            self.session.on_timer(generation, event);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = liveness.tick() => {
                    self.check_timeouts();
                    self.session.broadcast_snapshot();

                    liveness_ticks += 1;
                    if liveness_ticks % 30 == 0 && !self.clients.is_empty() {
                        debug!(
                            "{} clients, phase {:?}, {} numbers drawn",
                            self.clients.len(),
                            self.session.phase(),
                            self.session.drawn().len()
                        );
                    }
                },
            }
        }

        self.session.shutdown("Server shutting down");
        self.clients.clear();

        if let Some(task) = self.receiver_task.take() {
            task.abort();
        }
        if let Some(task) = self.sender_task.take() {
            if tokio::time::timeout(SENDER_DRAIN_TIMEOUT, task).await.is_err() {
                warn!("Outbound queue was not drained before shutdown");
            }
        }

        Ok(())
    }
}
