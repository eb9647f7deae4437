//! The authoritative session.
//!
//! `SessionManager` is the only writer of seats, phase, pool and pattern.
//! It is driven from a single loop (see `network::Server::run`), so every
//! join, leave, claim and draw tick is applied one at a time. After each
//! mutation it pushes the resulting change through the replication channel.

use crate::config::SessionConfig;
use crate::network::ServerMessage;
use crate::number_pool::NumberPool;
use crate::phase::{PhaseTrigger, SessionPhaseMachine};
use crate::replication::{Outgoing, ReplicationChannel};
use crate::scheduler::{DrawScheduler, DrawStep, TimerEvent};
use crate::seat_registry::SeatRegistry;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared::{
    default_display_name, ConnectionId, Packet, Pattern, RequestKind, Seat, SessionError,
    SessionPhase, MAX_DISPLAY_NAME_CHARS, MIN_SEATS,
};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

pub struct SessionManager {
    config: SessionConfig,
    seats: SeatRegistry,
    phase: SessionPhaseMachine,
    pool: NumberPool,
    scheduler: DrawScheduler,
    replication: ReplicationChannel,
    catalog: Vec<Pattern>,
    pattern: Option<Pattern>,
    roster: BTreeMap<ConnectionId, Seat>,
    owner: Option<ConnectionId>,
    opened: bool,
    required_seat_count: Option<u8>,
    winner: Option<u8>,
    round: u32,
    snapshot_sequence: u64,
    rng: StdRng,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        catalog: Vec<Pattern>,
        outbound: mpsc::UnboundedSender<Outgoing>,
        timers: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (min, max) = config.number_range;

        let mut session = Self {
            seats: SeatRegistry::new(config.capacity),
            phase: SessionPhaseMachine::new(),
            pool: NumberPool::new(min, max),
            scheduler: DrawScheduler::new(config.draw_interval(), config.settle_delay(), timers),
            replication: ReplicationChannel::new(outbound),
            catalog,
            pattern: None,
            roster: BTreeMap::new(),
            owner: None,
            opened: false,
            required_seat_count: None,
            winner: None,
            round: 1,
            snapshot_sequence: 0,
            rng,
            config,
        };
        session.select_pattern();
        session
    }

    // Connection lifecycle

    /// Admits a connection and gives it a seat.
    ///
    /// The first connection ever admitted opens the session and becomes its
    /// owner; its desired seat count becomes the number of players required
    /// to start. A repeated join for a seated connection changes nothing and
    /// replays the welcome and the current state to it.
    pub fn on_connection_join(
        &mut self,
        connection: ConnectionId,
        addr: SocketAddr,
        desired_seat_count: Option<u8>,
    ) -> Result<Seat, SessionError> {
        if let Some(seat) = self.roster.get(&connection).cloned() {
            debug!("Connection {} joined twice, resending welcome", connection);
            self.send_welcome(connection, &seat);
            self.send_catch_up(connection);
            self.replication.send_to(
                connection,
                &Packet::RosterChanged {
                    seats: self.roster(),
                },
            );
            return Ok(seat);
        }

        let (seat_index, visual_variant) = match self.seats.reserve(&mut self.rng) {
            Ok(indices) => indices,
            Err(reason) => {
                warn!(
                    "Rejecting connection {} from {}: {}",
                    connection, addr, reason
                );
                self.replication
                    .send_to_addr(addr, &Packet::JoinRejected { reason });
                return Err(reason);
            }
        };

        let seat = Seat::new(seat_index, visual_variant);
        self.roster.insert(connection, seat.clone());
        self.replication.subscribe(connection, addr);

        if !self.opened {
            self.opened = true;
            self.owner = Some(connection);
            self.required_seat_count = desired_seat_count
                .map(|count| count.clamp(MIN_SEATS, self.config.capacity.max(MIN_SEATS)));
            info!(
                "Connection {} opened the session (required seats: {:?})",
                connection, self.required_seat_count
            );
        }

        info!(
            "Connection {} took seat {} with variant {} ({}/{} seated)",
            connection,
            seat_index,
            visual_variant,
            self.roster.len(),
            self.config.capacity
        );

        self.send_welcome(connection, &seat);
        self.send_catch_up(connection);
        self.broadcast_roster();
        Ok(seat)
    }

    /// Releases the connection's seat and tells everyone else. Returns false
    /// for unknown or already-removed connections.
    pub fn on_connection_leave(&mut self, connection: ConnectionId) -> bool {
        let Some(seat) = self.roster.remove(&connection) else {
            debug!("Ignoring leave for unknown connection {}", connection);
            return false;
        };

        self.seats.release(seat.seat_index, seat.visual_variant);
        self.replication.unsubscribe(connection);

        if self.owner == Some(connection) {
            // No failover: the session stays ownerless from here on.
            self.owner = None;
            warn!(
                "Session owner (connection {}) left during {:?}; nobody can start or reset now",
                connection,
                self.phase.phase()
            );
        }

        info!(
            "Connection {} left seat {} ({} remaining)",
            connection,
            seat.seat_index,
            self.roster.len()
        );
        self.broadcast_roster();
        true
    }

    pub fn set_ready(&mut self, connection: ConnectionId, ready: bool) -> Result<(), SessionError> {
        let seat = self
            .roster
            .get_mut(&connection)
            .ok_or(SessionError::UnknownConnection)?;
        if seat.ready == ready {
            return Ok(());
        }

        seat.ready = ready;
        self.broadcast_roster();
        Ok(())
    }

    /// Renames a seat. Names are trimmed and capped; an empty name falls back
    /// to the seat's default.
    pub fn set_display_name(
        &mut self,
        connection: ConnectionId,
        name: &str,
    ) -> Result<(), SessionError> {
        let seat = self
            .roster
            .get_mut(&connection)
            .ok_or(SessionError::UnknownConnection)?;

        let trimmed: String = name.trim().chars().take(MAX_DISPLAY_NAME_CHARS).collect();
        let display_name = if trimmed.is_empty() {
            default_display_name(seat.seat_index)
        } else {
            trimmed
        };

        if seat.display_name == display_name {
            return Ok(());
        }

        seat.display_name = display_name;
        self.broadcast_roster();
        Ok(())
    }

    // Phase control

    /// Owner asks to leave the lobby. On success the settle delay starts.
    pub fn request_start(&mut self, connection: ConnectionId) -> Result<(), SessionError> {
        let result = self.try_start(connection);
        if let Err(reason) = result {
            warn!("Start request from {} rejected: {}", connection, reason);
            self.replication.send_to(
                connection,
                &Packet::RequestRejected {
                    request: RequestKind::Start,
                    reason,
                },
            );
        }
        result
    }

    fn try_start(&mut self, connection: ConnectionId) -> Result<(), SessionError> {
        self.authorize(connection)?;

        if !self.phase.is(SessionPhase::Lobby) {
            return Err(SessionError::IllegalTransition);
        }
        let required = self
            .required_seat_count
            .ok_or(SessionError::IllegalTransition)?;
        if self.roster.len() < required as usize {
            return Err(SessionError::NotEnoughPlayers);
        }

        self.phase.fire(PhaseTrigger::Start)?;
        info!(
            "Round {} starting with {} players",
            self.round,
            self.roster.len()
        );
        self.broadcast_phase();
        self.scheduler.begin_settle();
        Ok(())
    }

    /// Owner asks for a fresh round after one has ended. Seats are kept.
    pub fn request_reset(&mut self, connection: ConnectionId) -> Result<(), SessionError> {
        let result = self.try_reset(connection);
        if let Err(reason) = result {
            warn!("Reset request from {} rejected: {}", connection, reason);
            self.replication.send_to(
                connection,
                &Packet::RequestRejected {
                    request: RequestKind::Reset,
                    reason,
                },
            );
        }
        result
    }

    fn try_reset(&mut self, connection: ConnectionId) -> Result<(), SessionError> {
        self.authorize(connection)?;
        self.phase.fire(PhaseTrigger::Reset)?;

        self.scheduler.cancel();
        self.pool.reseed();
        self.winner = None;
        self.round += 1;
        self.select_pattern();

        info!("Session reset, round {} waiting in lobby", self.round);
        self.broadcast_phase();
        self.replication.broadcast(&Packet::CountdownReset {
            seconds_until_next_draw: 0.0,
        });
        if let Some(pattern) = &self.pattern {
            self.replication.broadcast(&Packet::PatternSelected {
                pattern: pattern.clone(),
            });
        }
        Ok(())
    }

    /// Routes a timer message from the scheduler.
    pub fn on_timer(&mut self, generation: u64, event: TimerEvent) {
        if !self.scheduler.fired(generation) {
            return;
        }

        match event {
            TimerEvent::Settled => self.begin_drawing(),
            TimerEvent::DrawDue => self.draw_tick(),
        }
    }

    fn begin_drawing(&mut self) {
        if let Err(e) = self.phase.fire(PhaseTrigger::Settled) {
            warn!("Settle timer fired outside of Starting: {}", e);
            return;
        }

        info!("Round {} drawing", self.round);
        self.broadcast_phase();
        let step = self
            .scheduler
            .begin_drawing(&self.pool, self.config.max_draws, &self.replication);
        if step == DrawStep::Finished {
            self.finish_exhausted();
        }
    }

    fn draw_tick(&mut self) {
        if !self.phase.is(SessionPhase::Drawing) {
            warn!("Draw tick outside of Drawing ignored");
            return;
        }

        let step = self.scheduler.on_draw_due(
            &mut self.pool,
            &mut self.rng,
            self.config.max_draws,
            &self.replication,
        );
        if step == DrawStep::Finished {
            self.finish_exhausted();
        }
    }

    fn finish_exhausted(&mut self) {
        if let Err(e) = self.phase.fire(PhaseTrigger::Exhausted) {
            warn!("Could not end round: {}", e);
            return;
        }

        info!(
            "Round {} ended without a winner after {} draws",
            self.round,
            self.pool.drawn().len()
        );
        self.broadcast_phase();
        self.replication
            .broadcast(&Packet::RoundEnded { winning_seat: None });
    }

    // Claims

    /// Adjudicates a win claim from a connection.
    ///
    /// Only the marking is checked against the pattern. The server never sees
    /// the claimant's card numbers, so it can't tell whether the marked cells
    /// hold numbers that were actually drawn.
    pub fn claim_win(
        &mut self,
        connection: ConnectionId,
        marking: &[bool],
    ) -> Result<u8, SessionError> {
        let result = self.adjudicate(connection, marking);

        match result {
            Ok(seat_index) => {
                self.scheduler.cancel();
                if let Err(e) = self.phase.fire(PhaseTrigger::WinAccepted) {
                    warn!("Accepted claim could not end the round: {}", e);
                    return Err(e);
                }
                self.winner = Some(seat_index);

                info!(
                    "Seat {} (connection {}) won round {} after {} draws",
                    seat_index,
                    connection,
                    self.round,
                    self.pool.drawn().len()
                );
                self.replication.broadcast(&Packet::CountdownReset {
                    seconds_until_next_draw: 0.0,
                });
                self.broadcast_phase();
                self.replication.broadcast(&Packet::RoundEnded {
                    winning_seat: Some(seat_index),
                });
            }
            Err(reason) => {
                if reason == SessionError::MalformedMarking {
                    warn!(
                        "Connection {} sent a marking of {} cells",
                        connection,
                        marking.len()
                    );
                } else {
                    debug!("Claim from connection {} rejected: {}", connection, reason);
                }
                self.replication
                    .send_to(connection, &Packet::ClaimRejected { reason });
            }
        }

        result
    }

    fn adjudicate(&self, connection: ConnectionId, marking: &[bool]) -> Result<u8, SessionError> {
        let seat = self
            .roster
            .get(&connection)
            .ok_or(SessionError::UnknownConnection)?;

        if !self.phase.is(SessionPhase::Drawing) {
            return Err(SessionError::RoundNotActive);
        }
        let pattern = self.pattern.as_ref().ok_or(SessionError::NoActivePattern)?;
        pattern.check(marking)?;

        Ok(seat.seat_index)
    }

    // Resync

    /// Sends the whole round state to every connection. Called periodically
    /// so clients recover from lost or reordered datagrams.
    pub fn broadcast_snapshot(&mut self) {
        if self.replication.subscriber_count() == 0 {
            return;
        }

        self.snapshot_sequence += 1;
        let snapshot = self.snapshot_packet();
        self.replication.broadcast(&snapshot);
    }

    fn snapshot_packet(&self) -> Packet {
        let seconds_until_next_draw = match self.phase.phase() {
            SessionPhase::Drawing => self
                .scheduler
                .time_remaining()
                .unwrap_or_default()
                .as_secs_f32(),
            _ => 0.0,
        };

        Packet::SessionSnapshot {
            sequence: self.snapshot_sequence,
            round: self.round,
            phase: self.phase.phase(),
            required_seat_count: self.required_seat_count,
            pattern: self.pattern.clone(),
            roster: self.roster(),
            drawn: self.pool.drawn().to_vec(),
            winning_seat: self.winner,
            seconds_until_next_draw,
        }
    }

    // Shutdown

    /// Cancels the scheduler, tells every connection the session is going
    /// away, releases every seat and closes replication.
    pub fn shutdown(&mut self, reason: &str) {
        self.scheduler.cancel();
        self.replication.broadcast(&Packet::Disconnected {
            reason: reason.to_string(),
        });

        self.roster.clear();
        self.seats.reset();
        self.owner = None;
        self.replication.close();
        info!("Session shut down: {}", reason);
    }

    // Accessors

    pub fn phase(&self) -> SessionPhase {
        self.phase.phase()
    }

    pub fn pattern(&self) -> Option<&Pattern> {
        self.pattern.as_ref()
    }

    pub fn drawn(&self) -> &[u32] {
        self.pool.drawn()
    }

    pub fn pool(&self) -> &NumberPool {
        &self.pool
    }

    pub fn seat_registry(&self) -> &SeatRegistry {
        &self.seats
    }

    pub fn seat_of(&self, connection: ConnectionId) -> Option<&Seat> {
        self.roster.get(&connection)
    }

    pub fn roster(&self) -> Vec<Seat> {
        let mut seats: Vec<Seat> = self.roster.values().cloned().collect();
        seats.sort_by_key(|seat| seat.seat_index);
        seats
    }

    pub fn owner(&self) -> Option<ConnectionId> {
        self.owner
    }

    pub fn required_seat_count(&self) -> Option<u8> {
        self.required_seat_count
    }

    pub fn winner(&self) -> Option<u8> {
        self.winner
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn is_drawing_scheduled(&self) -> bool {
        self.scheduler.is_armed()
    }

    // Internals

    fn authorize(&self, connection: ConnectionId) -> Result<(), SessionError> {
        if self.owner == Some(connection) {
            Ok(())
        } else {
            Err(SessionError::NotAuthorized)
        }
    }

    /// Picks a pattern at random, avoiding the current one when the catalog
    /// has an alternative.
    fn select_pattern(&mut self) {
        let current = self.pattern.as_ref().map(|p| p.name().to_string());
        let candidates: Vec<&Pattern> = self
            .catalog
            .iter()
            .filter(|p| Some(p.name()) != current.as_deref())
            .collect();

        let chosen = if candidates.is_empty() {
            self.catalog.choose(&mut self.rng)
        } else {
            candidates.choose(&mut self.rng).copied()
        };

        self.pattern = chosen.cloned();
        match &self.pattern {
            Some(pattern) => info!("Selected pattern '{}'", pattern.name()),
            None => warn!("Pattern catalog is empty; claims will be rejected"),
        }
    }

    fn send_welcome(&self, connection: ConnectionId, seat: &Seat) {
        self.replication.send_to(
            connection,
            &Packet::Joined {
                connection_id: connection,
                seat: seat.clone(),
                is_owner: self.owner == Some(connection),
                number_range: self.pool.range(),
            },
        );
    }

    /// Replays the current round to a newcomer so it doesn't have to wait for
    /// the next change to know where the session stands.
    fn send_catch_up(&self, connection: ConnectionId) {
        self.replication.send_to(connection, &self.phase_packet());

        if let Some(pattern) = &self.pattern {
            self.replication.send_to(
                connection,
                &Packet::PatternSelected {
                    pattern: pattern.clone(),
                },
            );
        }

        for (ordinal, value) in self.pool.drawn().iter().enumerate() {
            self.replication.send_to(
                connection,
                &Packet::NumberDrawn {
                    ordinal: ordinal as u32,
                    value: *value,
                },
            );
        }

        match self.phase.phase() {
            SessionPhase::Drawing => {
                let remaining = self.scheduler.time_remaining().unwrap_or_default();
                self.replication.send_to(
                    connection,
                    &Packet::CountdownReset {
                        seconds_until_next_draw: remaining.as_secs_f32(),
                    },
                );
            }
            SessionPhase::Ended => {
                self.replication.send_to(
                    connection,
                    &Packet::RoundEnded {
                        winning_seat: self.winner,
                    },
                );
            }
            SessionPhase::Lobby | SessionPhase::Starting => {}
        }
    }

    fn phase_packet(&self) -> Packet {
        Packet::PhaseChanged {
            phase: self.phase.phase(),
            required_seat_count: self.required_seat_count,
        }
    }

    fn broadcast_phase(&self) {
        self.replication.broadcast(&self.phase_packet());
    }

    fn broadcast_roster(&self) {
        self.replication.broadcast(&Packet::RosterChanged {
            seats: self.roster(),
        });
    }
}
