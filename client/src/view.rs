//! The client's replica of the session, rebuilt from server packets.

use log::{debug, info, warn};
use shared::{
    ConnectionId, Packet, Pattern, RequestKind, Seat, SessionError, SessionPhase,
    MAX_DRAWS_PER_ROUND,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// How the last round ended from this client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Won,
    Lost { winning_seat: u8 },
    NoWinner,
}

/// The latest refusal the server sent back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Join(SessionError),
    Claim(SessionError),
    Request(RequestKind, SessionError),
}

#[derive(Debug, Clone)]
pub struct SessionView {
    pub connection_id: Option<ConnectionId>,
    pub seat: Option<Seat>,
    pub is_owner: bool,
    pub number_range: (u32, u32),
    pub phase: SessionPhase,
    pub required_seat_count: Option<u8>,
    pub round: u32,
    pub roster: Vec<Seat>,
    pub pattern: Option<Pattern>,
    /// Drawn numbers in server draw order, without gaps.
    pub drawn: Vec<u32>,
    pub outcome: Option<Outcome>,
    pub last_rejection: Option<Rejection>,
    pub disconnect_reason: Option<String>,
    countdown: Option<(Instant, Duration)>,
    // Draws that arrived ahead of a missing one, keyed by ordinal.
    pending_draws: BTreeMap<usize, u32>,
    last_snapshot: Option<u64>,
}

impl Default for SessionView {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionView {
    pub fn new() -> Self {
        Self {
            connection_id: None,
            seat: None,
            is_owner: false,
            number_range: (0, 0),
            phase: SessionPhase::Lobby,
            required_seat_count: None,
            round: 0,
            roster: Vec::new(),
            pattern: None,
            drawn: Vec::new(),
            outcome: None,
            last_rejection: None,
            disconnect_reason: None,
            countdown: None,
            pending_draws: BTreeMap::new(),
            last_snapshot: None,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.connection_id.is_some()
    }

    /// Applies one server packet. `received_at` anchors any countdown it
    /// carries to the local clock.
    pub fn apply(&mut self, packet: &Packet, received_at: Instant) {
        match packet {
            Packet::Joined {
                connection_id,
                seat,
                is_owner,
                number_range,
            } => {
                info!(
                    "Joined as connection {} in seat {}{}",
                    connection_id,
                    seat.seat_index,
                    if *is_owner { " (owner)" } else { "" }
                );
                self.connection_id = Some(*connection_id);
                self.seat = Some(seat.clone());
                self.is_owner = *is_owner;
                self.number_range = *number_range;
                self.disconnect_reason = None;
                self.last_snapshot = None;
            }

            Packet::JoinRejected { reason } => {
                warn!("Join rejected: {}", reason);
                self.last_rejection = Some(Rejection::Join(*reason));
            }

            Packet::RosterChanged { seats } => self.set_roster(seats),

            Packet::PhaseChanged {
                phase,
                required_seat_count,
            } => {
                self.required_seat_count = *required_seat_count;
                self.enter_phase(*phase);
            }

            Packet::PatternSelected { pattern } => {
                info!("Pattern for this round: {}", pattern.name());
                self.pattern = Some(pattern.clone());
            }

            Packet::NumberDrawn { ordinal, value } => {
                self.record_draw(*ordinal as usize, *value);
            }

            Packet::CountdownReset {
                seconds_until_next_draw,
            } => {
                self.countdown = Some((received_at, countdown_duration(*seconds_until_next_draw)));
            }

            Packet::RoundEnded { winning_seat } => self.end_round(*winning_seat),

            Packet::SessionSnapshot {
                sequence,
                round,
                phase,
                required_seat_count,
                pattern,
                roster,
                drawn,
                winning_seat,
                seconds_until_next_draw,
            } => {
                if self.last_snapshot.is_some_and(|last| *sequence <= last) {
                    debug!("Ignoring out-of-date snapshot {}", sequence);
                    return;
                }
                self.last_snapshot = Some(*sequence);

                self.round = *round;
                self.required_seat_count = *required_seat_count;
                self.pattern = pattern.clone();
                self.set_roster(roster);
                self.enter_phase(*phase);
                self.merge_drawn(drawn);

                match phase {
                    SessionPhase::Drawing => {
                        self.countdown =
                            Some((received_at, countdown_duration(*seconds_until_next_draw)));
                    }
                    SessionPhase::Ended if self.outcome.is_none() => {
                        self.end_round(*winning_seat)
                    }
                    _ => {}
                }
            }

            Packet::ClaimRejected { reason } => {
                warn!("Claim rejected: {}", reason);
                self.last_rejection = Some(Rejection::Claim(*reason));
            }

            Packet::RequestRejected { request, reason } => {
                warn!("{:?} request rejected: {}", request, reason);
                self.last_rejection = Some(Rejection::Request(*request, *reason));
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.disconnect_reason = Some(reason.clone());
                self.connection_id = None;
                self.seat = None;
                self.is_owner = false;
                self.countdown = None;
                self.last_snapshot = None;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    fn set_roster(&mut self, seats: &[Seat]) {
        self.roster = seats.to_vec();
        if let Some(mine) = &self.seat {
            let index = mine.seat_index;
            if let Some(updated) = seats.iter().find(|s| s.seat_index == index) {
                self.seat = Some(updated.clone());
            }
        }
    }

    fn enter_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            debug!("Phase {:?} -> {:?}", self.phase, phase);
        }
        self.phase = phase;

        match phase {
            SessionPhase::Lobby => {
                self.drawn.clear();
                self.pending_draws.clear();
                self.outcome = None;
                self.countdown = None;
            }
            SessionPhase::Starting => self.outcome = None,
            SessionPhase::Drawing | SessionPhase::Ended => {}
        }
    }

    fn end_round(&mut self, winning_seat: Option<u8>) {
        let outcome = match winning_seat {
            None => Outcome::NoWinner,
            Some(seat) if self.seat_index() == Some(seat) => Outcome::Won,
            Some(seat) => Outcome::Lost { winning_seat: seat },
        };
        info!("Round ended: {:?}", outcome);
        self.outcome = Some(outcome);
        self.countdown = None;
    }

    /// Places a draw at its ordinal. Draws past a gap wait until the gap is
    /// filled by a later packet or a snapshot.
    fn record_draw(&mut self, ordinal: usize, value: u32) {
        match ordinal.cmp(&self.drawn.len()) {
            Ordering::Less => {
                if self.drawn[ordinal] != value {
                    warn!(
                        "Draw {} was {} but the server says {}, dropping later draws",
                        ordinal, self.drawn[ordinal], value
                    );
                    self.drawn.truncate(ordinal);
                    self.drawn.push(value);
                }
            }
            Ordering::Equal => self.drawn.push(value),
            Ordering::Greater => {
                if ordinal < MAX_DRAWS_PER_ROUND {
                    debug!("Draw {} arrived before draw {}", ordinal, self.drawn.len());
                    self.pending_draws.insert(ordinal, value);
                } else {
                    warn!("Ignoring draw with ordinal {}", ordinal);
                }
            }
        }
        self.fill_from_pending();
    }

    /// Adopts the server's draw list unless the local one already extends it.
    fn merge_drawn(&mut self, authoritative: &[u32]) {
        if !self.drawn.starts_with(authoritative) {
            self.drawn = authoritative.to_vec();
        }
        self.fill_from_pending();
    }

    fn fill_from_pending(&mut self) {
        let len = self.drawn.len();
        self.pending_draws.retain(|ordinal, _| *ordinal >= len);
        while let Some(value) = self.pending_draws.remove(&self.drawn.len()) {
            self.drawn.push(value);
        }
    }

    pub fn seat_index(&self) -> Option<u8> {
        self.seat.as_ref().map(|s| s.seat_index)
    }

    /// Seconds until the next draw as seen from `now`, never negative.
    pub fn time_until_next_draw(&self, now: Instant) -> f32 {
        match self.countdown {
            Some((anchor, remaining)) => remaining
                .saturating_sub(now.saturating_duration_since(anchor))
                .as_secs_f32(),
            None => 0.0,
        }
    }

    /// Whether everyone the owner asked for is seated and ready.
    pub fn lobby_is_full_and_ready(&self) -> bool {
        match self.required_seat_count {
            Some(required) => {
                self.phase == SessionPhase::Lobby
                    && self.roster.len() >= required as usize
                    && self.roster.iter().all(|s| s.ready)
            }
            None => false,
        }
    }
}

// Hostile or garbled values collapse to zero instead of panicking.
fn countdown_duration(seconds: f32) -> Duration {
    Duration::try_from_secs_f32(seconds.max(0.0)).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn joined(view: &mut SessionView, seat_index: u8, is_owner: bool) {
        view.apply(
            &Packet::Joined {
                connection_id: 1,
                seat: Seat::new(seat_index, 0),
                is_owner,
                number_range: (1, 75),
            },
            Instant::now(),
        );
    }

    #[test]
    fn test_joined_sets_identity() {
        let mut view = SessionView::new();
        joined(&mut view, 2, true);

        assert!(view.is_joined());
        assert_eq!(view.seat_index(), Some(2));
        assert!(view.is_owner);
        assert_eq!(view.number_range, (1, 75));
    }

    #[test]
    fn test_countdown_is_anchored_locally() {
        let mut view = SessionView::new();
        let anchor = Instant::now();
        view.apply(
            &Packet::CountdownReset {
                seconds_until_next_draw: 2.0,
            },
            anchor,
        );

        assert_approx_eq!(view.time_until_next_draw(anchor), 2.0, 0.001);
        assert_approx_eq!(
            view.time_until_next_draw(anchor + Duration::from_millis(500)),
            1.5,
            0.001
        );
        assert_eq!(view.time_until_next_draw(anchor + Duration::from_secs(5)), 0.0);
    }

    #[test]
    fn test_negative_countdown_clamps_to_zero() {
        let mut view = SessionView::new();
        let now = Instant::now();
        view.apply(
            &Packet::CountdownReset {
                seconds_until_next_draw: -3.0,
            },
            now,
        );
        assert_eq!(view.time_until_next_draw(now), 0.0);
    }

    #[test]
    fn test_round_outcomes() {
        let mut view = SessionView::new();
        joined(&mut view, 1, false);

        view.apply(&Packet::RoundEnded { winning_seat: Some(1) }, Instant::now());
        assert_eq!(view.outcome, Some(Outcome::Won));

        view.apply(&Packet::RoundEnded { winning_seat: Some(3) }, Instant::now());
        assert_eq!(view.outcome, Some(Outcome::Lost { winning_seat: 3 }));

        view.apply(&Packet::RoundEnded { winning_seat: None }, Instant::now());
        assert_eq!(view.outcome, Some(Outcome::NoWinner));
    }

    #[test]
    fn test_lobby_clears_round_state() {
        let mut view = SessionView::new();
        let now = Instant::now();
        view.apply(&Packet::NumberDrawn { ordinal: 0, value: 5 }, now);
        view.apply(&Packet::NumberDrawn { ordinal: 0, value: 5 }, now);
        view.apply(&Packet::RoundEnded { winning_seat: None }, now);
        assert_eq!(view.drawn, vec![5]);

        view.apply(
            &Packet::PhaseChanged {
                phase: SessionPhase::Lobby,
                required_seat_count: Some(2),
            },
            now,
        );
        assert!(view.drawn.is_empty());
        assert!(view.outcome.is_none());
        assert_eq!(view.required_seat_count, Some(2));
    }

    #[test]
    fn test_roster_updates_own_seat() {
        let mut view = SessionView::new();
        joined(&mut view, 0, true);

        let mut me = Seat::new(0, 0);
        me.ready = true;
        view.apply(
            &Packet::RosterChanged {
                seats: vec![me, Seat::new(1, 3)],
            },
            Instant::now(),
        );

        assert!(view.seat.as_ref().unwrap().ready);
        assert_eq!(view.roster.len(), 2);
    }

    #[test]
    fn test_lobby_full_and_ready() {
        let mut view = SessionView::new();
        let now = Instant::now();
        view.apply(
            &Packet::PhaseChanged {
                phase: SessionPhase::Lobby,
                required_seat_count: Some(2),
            },
            now,
        );

        let mut a = Seat::new(0, 0);
        let mut b = Seat::new(1, 1);
        a.ready = true;
        view.apply(
            &Packet::RosterChanged {
                seats: vec![a.clone(), b.clone()],
            },
            now,
        );
        assert!(!view.lobby_is_full_and_ready());

        b.ready = true;
        view.apply(&Packet::RosterChanged { seats: vec![a, b] }, now);
        assert!(view.lobby_is_full_and_ready());
    }

    #[test]
    fn test_rejections_are_recorded() {
        let mut view = SessionView::new();
        view.apply(
            &Packet::ClaimRejected {
                reason: SessionError::PatternMismatch,
            },
            Instant::now(),
        );
        assert_eq!(
            view.last_rejection,
            Some(Rejection::Claim(SessionError::PatternMismatch))
        );

        view.apply(
            &Packet::Disconnected {
                reason: "bye".to_string(),
            },
            Instant::now(),
        );
        assert!(!view.is_joined());
        assert_eq!(view.disconnect_reason.as_deref(), Some("bye"));
    }
    fn draw(ordinal: u32, value: u32) -> Packet {
        Packet::NumberDrawn { ordinal, value }
    }

    fn snapshot(sequence: u64, phase: SessionPhase, drawn: Vec<u32>) -> Packet {
        Packet::SessionSnapshot {
            sequence,
            round: 1,
            phase,
            required_seat_count: Some(2),
            pattern: Some(Pattern::four_corners()),
            roster: vec![Seat::new(0, 0), Seat::new(1, 1)],
            drawn,
            winning_seat: None,
            seconds_until_next_draw: 1.5,
        }
    }

    #[test]
    fn test_reordered_draws_keep_server_order() {
        let mut view = SessionView::new();
        let now = Instant::now();

        view.apply(&draw(1, 12), now);
        assert!(view.drawn.is_empty());

        view.apply(&draw(0, 7), now);
        assert_eq!(view.drawn, vec![7, 12]);

        view.apply(&draw(3, 40), now);
        view.apply(&draw(2, 33), now);
        view.apply(&draw(1, 12), now);
        assert_eq!(view.drawn, vec![7, 12, 33, 40]);
    }

    #[test]
    fn test_snapshot_fills_lost_draw() {
        let mut view = SessionView::new();
        let now = Instant::now();
        view.apply(&draw(0, 7), now);
        view.apply(&draw(2, 33), now);
        assert_eq!(view.drawn, vec![7]);

        view.apply(&snapshot(1, SessionPhase::Drawing, vec![7, 12]), now);
        assert_eq!(view.drawn, vec![7, 12, 33]);
        assert_eq!(view.phase, SessionPhase::Drawing);
        assert_eq!(view.pattern, Some(Pattern::four_corners()));
        assert_eq!(view.roster.len(), 2);
        assert_approx_eq!(view.time_until_next_draw(now), 1.5, 0.001);

        view.apply(&draw(3, 50), now);
        assert_eq!(view.drawn, vec![7, 12, 33, 50]);
    }

    #[test]
    fn test_snapshot_recovers_lost_round_end() {
        let mut view = SessionView::new();
        joined(&mut view, 1, false);
        let now = Instant::now();
        view.apply(&draw(0, 7), now);

        let mut ended = snapshot(4, SessionPhase::Ended, vec![7, 9]);
        if let Packet::SessionSnapshot { winning_seat, .. } = &mut ended {
            *winning_seat = Some(1);
        }
        view.apply(&ended, now);

        assert_eq!(view.phase, SessionPhase::Ended);
        assert_eq!(view.drawn, vec![7, 9]);
        assert_eq!(view.outcome, Some(Outcome::Won));
        assert_eq!(view.time_until_next_draw(now), 0.0);
    }

    #[test]
    fn test_stale_snapshot_is_ignored() {
        let mut view = SessionView::new();
        let now = Instant::now();
        view.apply(&snapshot(5, SessionPhase::Drawing, vec![7, 12, 33]), now);
        view.apply(&snapshot(4, SessionPhase::Drawing, vec![7]), now);
        assert_eq!(view.drawn, vec![7, 12, 33]);

        view.apply(&snapshot(6, SessionPhase::Lobby, Vec::new()), now);
        assert!(view.drawn.is_empty());
        assert_eq!(view.phase, SessionPhase::Lobby);
    }

    #[test]
    fn test_conflicting_draw_follows_latest_server_word() {
        let mut view = SessionView::new();
        let now = Instant::now();
        // Left over from a previous round.
        view.apply(&draw(0, 60), now);
        view.apply(&draw(1, 61), now);

        view.apply(&snapshot(1, SessionPhase::Drawing, vec![7]), now);
        assert_eq!(view.drawn, vec![7]);

        view.apply(&draw(0, 8), now);
        assert_eq!(view.drawn, vec![8]);
    }

    #[test]
    fn test_hostile_countdown_does_not_panic() {
        let mut view = SessionView::new();
        let now = Instant::now();
        for seconds in [f32::MAX, f32::INFINITY, f32::NAN, 1e30] {
            view.apply(
                &Packet::CountdownReset {
                    seconds_until_next_draw: seconds,
                },
                now,
            );
            assert_eq!(view.time_until_next_draw(now), 0.0);
        }
    }
}
