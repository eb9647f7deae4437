//! Types shared by the bingo server and its clients: the wire protocol,
//! seats, phases, patterns and the rejection taxonomy.

mod error;
mod pattern;

pub use error::SessionError;
pub use pattern::Pattern;

use serde::{Deserialize, Serialize};

pub const GRID_COLUMNS: usize = 6;
pub const GRID_ROWS: usize = 4;
pub const GRID_SIZE: usize = GRID_COLUMNS * GRID_ROWS;

pub const VISUAL_VARIANT_COUNT: u8 = 6;
pub const MIN_SEATS: u8 = 2;
pub const MAX_SEATS: u8 = 6;

pub const PROTOCOL_VERSION: u32 = 2;

/// Largest datagram either side will read.
pub const MAX_DATAGRAM_SIZE: usize = 2048;
/// Upper bound on draws in one round; keeps a full snapshot inside one datagram.
pub const MAX_DRAWS_PER_ROUND: usize = 250;
pub const MAX_DISPLAY_NAME_CHARS: usize = 24;

pub type ConnectionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    Lobby,
    Starting,
    Drawing,
    Ended,
}

/// A participant's slot in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub seat_index: u8,
    pub visual_variant: u8,
    pub display_name: String,
    pub ready: bool,
}

impl Seat {
    pub fn new(seat_index: u8, visual_variant: u8) -> Self {
        Self {
            seat_index,
            visual_variant,
            display_name: default_display_name(seat_index),
            ready: false,
        }
    }
}

pub fn default_display_name(seat_index: u8) -> String {
    format!("Player {}", seat_index as u32 + 1)
}

/// Owner-only requests that can be refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    Start,
    Reset,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client -> server
    RequestJoin {
        client_version: u32,
        desired_seat_count: Option<u8>,
    },
    SetReady {
        ready: bool,
    },
    SetDisplayName {
        name: String,
    },
    RequestStart,
    ClaimWin {
        marking: Vec<bool>,
    },
    RequestReset,
    Heartbeat,
    Leave,

    // Server -> client
    Joined {
        connection_id: ConnectionId,
        seat: Seat,
        is_owner: bool,
        number_range: (u32, u32),
    },
    JoinRejected {
        reason: SessionError,
    },
    RosterChanged {
        seats: Vec<Seat>,
    },
    PhaseChanged {
        phase: SessionPhase,
        required_seat_count: Option<u8>,
    },
    PatternSelected {
        pattern: Pattern,
    },
    /// `ordinal` is the zero-based position of `value` in this round's
    /// draw order.
    NumberDrawn {
        ordinal: u32,
        value: u32,
    },
    CountdownReset {
        seconds_until_next_draw: f32,
    },
    RoundEnded {
        winning_seat: Option<u8>,
    },
    ClaimRejected {
        reason: SessionError,
    },
    RequestRejected {
        request: RequestKind,
        reason: SessionError,
    },
    Disconnected {
        reason: String,
    },
    /// Full round state, repeated periodically so clients that lost or
    /// reordered datagrams converge. Higher `sequence` wins.
    SessionSnapshot {
        sequence: u64,
        round: u32,
        phase: SessionPhase,
        required_seat_count: Option<u8>,
        pattern: Option<Pattern>,
        roster: Vec<Seat>,
        drawn: Vec<u32>,
        winning_seat: Option<u8>,
        seconds_until_next_draw: f32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_grid_dimensions() {
        assert_eq!(GRID_SIZE, 24);
        assert!(MIN_SEATS <= MAX_SEATS);
        assert_eq!(MAX_SEATS, VISUAL_VARIANT_COUNT);
    }

    #[test]
    fn test_seat_defaults() {
        let seat = Seat::new(2, 5);
        assert_eq!(seat.seat_index, 2);
        assert_eq!(seat.visual_variant, 5);
        assert_eq!(seat.display_name, "Player 3");
        assert!(!seat.ready);
    }

    #[test]
    fn test_packet_serialization_claim() {
        let mut marking = vec![false; GRID_SIZE];
        marking[0] = true;
        let packet = Packet::ClaimWin { marking };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::ClaimWin { marking } => {
                assert_eq!(marking.len(), GRID_SIZE);
                assert!(marking[0]);
                assert!(!marking[1]);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_pattern() {
        let packet = Packet::PatternSelected {
            pattern: Pattern::four_corners(),
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, packet);
    }

    #[test]
    fn test_packet_serialization_countdown() {
        let packet = Packet::CountdownReset {
            seconds_until_next_draw: 2.5,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::CountdownReset {
                seconds_until_next_draw,
            } => assert_approx_eq!(seconds_until_next_draw, 2.5, 0.0001),
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_largest_snapshot_fits_one_datagram() {
        let roster: Vec<Seat> = (0..MAX_SEATS)
            .map(|index| {
                let mut seat = Seat::new(index, index);
                seat.display_name = "\u{1F600}".repeat(MAX_DISPLAY_NAME_CHARS);
                seat
            })
            .collect();
        let snapshot = Packet::SessionSnapshot {
            sequence: u64::MAX,
            round: u32::MAX,
            phase: SessionPhase::Ended,
            required_seat_count: Some(MAX_SEATS),
            pattern: Some(Pattern::full_card()),
            roster,
            drawn: (0..MAX_DRAWS_PER_ROUND as u32).map(|n| n + 1_000_000).collect(),
            winning_seat: Some(0),
            seconds_until_next_draw: 0.0,
        };

        let serialized = bincode::serialize(&snapshot).unwrap();
        assert!(
            serialized.len() <= MAX_DATAGRAM_SIZE,
            "snapshot is {} bytes",
            serialized.len()
        );
    }

    #[test]
    fn test_rejection_reason_survives_the_wire() {
        let packet = Packet::RequestRejected {
            request: RequestKind::Start,
            reason: SessionError::NotAuthorized,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, packet);
        assert_eq!(
            SessionError::NotAuthorized.to_string(),
            "only the session owner may do that"
        );
    }
}
