use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every way the session can refuse a request.
///
/// These travel over the wire as rejection reasons, so they carry no payload
/// and stay `Copy`. None of them is fatal to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum SessionError {
    #[error("session is at capacity")]
    CapacityExceeded,
    #[error("only the session owner may do that")]
    NotAuthorized,
    #[error("not allowed in the current phase")]
    IllegalTransition,
    #[error("marking does not cover exactly one card")]
    MalformedMarking,
    #[error("no pattern has been selected")]
    NoActivePattern,
    #[error("no round is being drawn")]
    RoundNotActive,
    #[error("marking does not satisfy the pattern")]
    PatternMismatch,
    #[error("not enough players have joined")]
    NotEnoughPlayers,
    #[error("number pool is exhausted")]
    Exhausted,
    #[error("unknown connection")]
    UnknownConnection,
}
