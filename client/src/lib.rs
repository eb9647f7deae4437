//! # Bingo Client Library
//!
//! This library provides a headless client for the bingo session server. It
//! keeps a replica of the session built from server packets and plays a card
//! automatically, which makes it useful both as a load and smoke-test bot
//! and as the base for a graphical front end.
//!
//! ## Architecture Overview
//!
//! The server is authoritative for everything shared: seats, phase, drawn
//! numbers, pattern and the winner. The client only owns its card. It marks
//! cells as numbers are drawn and claims once the marking covers the active
//! pattern; the server then decides.
//!
//! ### Local Countdown
//! The server sends the time until the next draw after every draw. The
//! client anchors that value to its own clock on receipt, so the countdown
//! it shows keeps ticking between packets without any clock sync.
//!
//! ## Module Organization
//!
//! ### Card Module (`card`)
//! Card dealing, marking rules and the pattern check used before claiming.
//!
//! ### View Module (`view`)
//! `SessionView`, the replica of the session: roster, phase, pattern, drawn
//! numbers, countdown and the outcome of the last round.
//!
//! ### Network Module (`network`)
//! The bot `Client`: UDP socket, join and heartbeat, and the automatic play
//! (ready up, start when owner, claim, reset).
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{BotOptions, Client};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = BotOptions {
//!         desired_seat_count: Some(2),
//!         auto_start: true,
//!         ..BotOptions::default()
//!     };
//!
//!     let mut client = Client::new("127.0.0.1:8080", options).await?;
//!     client.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod card;
pub mod network;
pub mod view;
