//! # Bingo Session Server Library
//!
//! This library provides the authoritative server for a multiplayer bingo
//! session. One server hosts one session: it seats players, runs the round
//! through its phases, draws numbers on a fixed cadence, adjudicates win
//! claims and replicates every change to the connected clients.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! Seats, the phase, the number pool and the active pattern live only on the
//! server. Clients hold a replica that they update from the packets the
//! server sends; nothing a client sends changes state without being checked
//! first.
//!
//! ### Ordering
//! Every input (packets, timer ticks, timeouts) is funneled into a single
//! loop and applied one at a time. A winning claim and a draw tick can never
//! interleave, and two simultaneous claims are settled by arrival order.
//!
//! ### Replication
//! State changes are broadcast to an explicit list of subscribed
//! connections, in the order they happened. Late joiners get a catch-up of
//! the current phase, pattern and drawn numbers.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! The `SessionManager` that owns all authoritative state and exposes the
//! operations clients can trigger: join, leave, ready, rename, start, claim
//! and reset.
//!
//! ### Building Blocks
//! - `seat_registry`: seat indices and visual variants, never handed out twice
//! - `phase`: the Lobby, Starting, Drawing, Ended state machine
//! - `number_pool`: draws without replacement
//! - `scheduler`: settle delay and draw cadence as cancellable timers
//! - `replication`: fan-out of packets to subscribed connections
//! - `config`: validated session settings
//!
//! ### Network Module (`network`)
//! UDP socket handling, connection tracking through `client_manager`, and
//! the main loop that drives the session.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::SessionConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig {
//!         capacity: 4,
//!         draw_interval_seconds: 1.5,
//!         ..SessionConfig::default()
//!     };
//!
//!     let mut server = Server::new("127.0.0.1:8080", config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server runs two internal tasks next to its main loop:
//! - **Network Receiver**: listens for incoming packets
//! - **Network Sender**: writes the replication queue to the socket in order

pub mod client_manager;
pub mod config;
pub mod network;
pub mod number_pool;
pub mod phase;
pub mod replication;
pub mod scheduler;
pub mod seat_registry;
pub mod session;
