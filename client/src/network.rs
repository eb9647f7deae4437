use crate::card::Card;
use crate::view::SessionView;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{Packet, SessionPhase, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, Instant};

/// How the bot plays.
#[derive(Debug, Clone)]
pub struct BotOptions {
    /// Seat count to request if this client opens the session
    pub desired_seat_count: Option<u8>,
    pub display_name: Option<String>,
    /// Start the round once the lobby is full and ready (owner only)
    pub auto_start: bool,
    /// Reset after a round ends, following `reset_delay` (owner only)
    pub auto_reset: bool,
    pub reset_delay: Duration,
    pub heartbeat_interval: Duration,
    /// Leave after this many finished rounds
    pub max_rounds: Option<u32>,
    pub seed: Option<u64>,
}

impl Default for BotOptions {
    fn default() -> Self {
        Self {
            desired_seat_count: None,
            display_name: None,
            auto_start: false,
            auto_reset: false,
            reset_delay: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(1),
            max_rounds: None,
            seed: None,
        }
    }
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    options: BotOptions,

    view: SessionView,
    card: Option<Card>,
    rng: StdRng,

    claim_pending: bool,
    start_requested: bool,
    reset_at: Option<Instant>,
    rounds_finished: u32,
    running: bool,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        options: BotOptions,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Client {
            socket,
            server_addr,
            options,
            view: SessionView::new(),
            card: None,
            rng,
            claim_pending: false,
            start_requested: false,
            reset_at: None,
            rounds_finished: 0,
            running: true,
        })
    }

    pub fn view(&self) -> &SessionView {
        &self.view
    }

    pub fn card(&self) -> Option<&Card> {
        self.card.as_ref()
    }

    pub fn rounds_finished(&self) -> u32 {
        self.rounds_finished
    }

    async fn join(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Joining session at {}...", self.server_addr);

        let packet = Packet::RequestJoin {
            client_version: PROTOCOL_VERSION,
            desired_seat_count: self.options.desired_seat_count,
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn send_or_log(&self, packet: &Packet) {
        if let Err(e) = self.send_packet(packet).await {
            error!("Error sending packet: {}", e);
        }
    }

    /// Applies a server packet to the view, then reacts to what changed.
    ///
    /// Reactions key off state transitions rather than packet types, so a
    /// snapshot that repairs lost packets drives the bot the same way.
    async fn handle_packet(&mut self, packet: Packet, receive_time: Instant) {
        let was_joined = self.view.is_joined();
        let phase_before = self.view.phase;
        let drawn_before = self.view.drawn.clone();
        let outcome_before = self.view.outcome;

        self.view.apply(&packet, receive_time.into_std());

        match &packet {
            Packet::Joined { number_range, .. } if !was_joined => {
                self.deal_card(*number_range);
                if let Some(name) = self.options.display_name.clone() {
                    self.send_or_log(&Packet::SetDisplayName { name }).await;
                }
                self.send_or_log(&Packet::SetReady { ready: true }).await;
            }
            Packet::JoinRejected { .. } | Packet::Disconnected { .. } => {
                self.running = false;
                return;
            }
            Packet::ClaimRejected { .. } => self.claim_pending = false,
            Packet::RequestRejected { .. } => self.start_requested = false,
            _ => {}
        }

        if self.view.phase != phase_before && self.view.phase == SessionPhase::Lobby {
            self.start_requested = false;
            self.reset_at = None;
            self.claim_pending = false;
            // Every round in the lobby gets a fresh card.
            if self.view.is_joined() {
                self.deal_card(self.view.number_range);
            }
        }

        if self.view.drawn != drawn_before {
            if let Some(card) = &mut self.card {
                let marked = card.sync_marks(&self.view.drawn);
                debug!("{} numbers drawn, {} cells marked", self.view.drawn.len(), marked);
            }
        }

        if outcome_before.is_none() && self.view.outcome.is_some() {
            self.claim_pending = false;
            self.rounds_finished += 1;

            if let Some(max_rounds) = self.options.max_rounds {
                if self.rounds_finished >= max_rounds {
                    info!("Played {} rounds, leaving", self.rounds_finished);
                    self.running = false;
                    return;
                }
            }

            if self.options.auto_reset && self.view.is_owner {
                self.reset_at = Some(Instant::now() + self.options.reset_delay);
            }
        }

        self.maybe_claim().await;
        self.maybe_start().await;
    }

    fn deal_card(&mut self, number_range: (u32, u32)) {
        self.card = Card::generate(number_range, &mut self.rng);
        match &mut self.card {
            Some(card) => {
                card.sync_marks(&self.view.drawn);
            }
            None => warn!("Playing without a card"),
        }
    }

    async fn maybe_claim(&mut self) {
        if self.claim_pending {
            return;
        }
        self.send_claim().await;
    }

    /// Sends a claim if the card currently covers the pattern. Returns true
    /// when a claim went out.
    async fn send_claim(&mut self) -> bool {
        if self.view.phase != SessionPhase::Drawing {
            return false;
        }
        let (Some(card), Some(pattern)) = (&self.card, &self.view.pattern) else {
            return false;
        };
        if !card.satisfies(pattern) {
            return false;
        }

        info!("Card covers '{}', claiming", pattern.name());
        let packet = Packet::ClaimWin {
            marking: card.marking(),
        };
        self.claim_pending = true;
        self.send_or_log(&packet).await;
        true
    }

    async fn maybe_start(&mut self) {
        if !self.options.auto_start
            || !self.view.is_owner
            || self.start_requested
            || !self.view.lobby_is_full_and_ready()
        {
            return;
        }

        info!("Lobby is full and ready, starting");
        self.start_requested = true;
        self.send_or_log(&Packet::RequestStart).await;
    }

    /// Keeps the connection alive and repeats any request whose answer has
    /// not arrived yet. The server treats every repeat as idempotent.
    async fn on_heartbeat(&mut self) {
        if !self.view.is_joined() {
            if let Err(e) = self.join().await {
                error!("Error sending join: {}", e);
            }
            return;
        }
        self.send_or_log(&Packet::Heartbeat).await;

        if self.claim_pending && !self.send_claim().await {
            self.claim_pending = false;
        }

        if self.start_requested && self.view.phase == SessionPhase::Lobby {
            debug!("Start not acknowledged yet, asking again");
            self.send_or_log(&Packet::RequestStart).await;
        }

        if let Some(reset_at) = self.reset_at {
            if Instant::now() >= reset_at {
                self.reset_at = None;
                info!("Resetting for the next round");
                self.send_or_log(&Packet::RequestReset).await;
            }
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.join().await?;

        let mut heartbeat_interval = interval(self.options.heartbeat_interval);
        // The first tick completes immediately; the join already went out.
        heartbeat_interval.tick().await;
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

        while self.running {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    let receive_time = Instant::now();
                    match result {
                        Ok((len, _)) => {
                            if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                                self.handle_packet(packet, receive_time).await;
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = heartbeat_interval.tick() => {
                    self.on_heartbeat().await;
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, leaving");
                    self.running = false;
                },
            }
        }

        if self.view.is_joined() {
            let _ = self.send_packet(&Packet::Leave).await;
        }

        Ok(())
    }
}
