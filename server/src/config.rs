//! Static session configuration.

use shared::{MAX_DRAWS_PER_ROUND, MAX_SEATS, MIN_SEATS};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CAPACITY: u8 = 6;
pub const DEFAULT_MIN_NUMBER: u32 = 1;
pub const DEFAULT_MAX_NUMBER: u32 = 75;
pub const DEFAULT_MAX_DRAWS: usize = 25;
pub const DEFAULT_DRAW_INTERVAL_SECONDS: f32 = 2.0;
pub const DEFAULT_SETTLE_DELAY_SECONDS: f32 = 3.0;
pub const DEFAULT_CLIENT_TIMEOUT_SECONDS: f32 = 5.0;

/// Widest number range a session will hold in its pool.
pub const MAX_RANGE_SPAN: u32 = 10_000;
/// Longest timing value accepted for any delay, in seconds.
pub const MAX_TIMING_SECONDS: f32 = 86_400.0;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("capacity {0} is outside {}..={}", MIN_SEATS, MAX_SEATS)]
    CapacityOutOfRange(u8),
    #[error("number range {min}..={max} is empty")]
    EmptyRange { min: u32, max: u32 },
    #[error("number range {min}..={max} holds more than {} numbers", MAX_RANGE_SPAN)]
    RangeTooWide { min: u32, max: u32 },
    #[error("at most {} draws per round are supported, got {0}", MAX_DRAWS_PER_ROUND)]
    TooManyDraws(usize),
    #[error("draw interval must be above 0 and at most {} seconds, got {0}", MAX_TIMING_SECONDS)]
    InvalidDrawInterval(f32),
    #[error("settle delay must be between 0 and {} seconds, got {0}", MAX_TIMING_SECONDS)]
    InvalidSettleDelay(f32),
    #[error("client timeout must be above 0 and at most {} seconds, got {0}", MAX_TIMING_SECONDS)]
    InvalidClientTimeout(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub capacity: u8,
    pub number_range: (u32, u32),
    pub max_draws: usize,
    pub draw_interval_seconds: f32,
    pub start_settle_delay_seconds: f32,
    pub client_timeout_seconds: f32,
    /// Fixed seed for draws, patterns and visual variants.
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            number_range: (DEFAULT_MIN_NUMBER, DEFAULT_MAX_NUMBER),
            max_draws: DEFAULT_MAX_DRAWS,
            draw_interval_seconds: DEFAULT_DRAW_INTERVAL_SECONDS,
            start_settle_delay_seconds: DEFAULT_SETTLE_DELAY_SECONDS,
            client_timeout_seconds: DEFAULT_CLIENT_TIMEOUT_SECONDS,
            seed: None,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SEATS..=MAX_SEATS).contains(&self.capacity) {
            return Err(ConfigError::CapacityOutOfRange(self.capacity));
        }

        let (min, max) = self.number_range;
        if min > max {
            return Err(ConfigError::EmptyRange { min, max });
        }
        if max - min >= MAX_RANGE_SPAN {
            return Err(ConfigError::RangeTooWide { min, max });
        }

        if self.max_draws > MAX_DRAWS_PER_ROUND {
            return Err(ConfigError::TooManyDraws(self.max_draws));
        }

        if !(timing_in_bounds(self.draw_interval_seconds) && self.draw_interval_seconds > 0.0) {
            return Err(ConfigError::InvalidDrawInterval(self.draw_interval_seconds));
        }

        if !timing_in_bounds(self.start_settle_delay_seconds) {
            return Err(ConfigError::InvalidSettleDelay(
                self.start_settle_delay_seconds,
            ));
        }

        if !(timing_in_bounds(self.client_timeout_seconds) && self.client_timeout_seconds > 0.0) {
            return Err(ConfigError::InvalidClientTimeout(self.client_timeout_seconds));
        }

        Ok(())
    }

    pub fn draw_interval(&self) -> Duration {
        seconds(self.draw_interval_seconds)
    }

    pub fn settle_delay(&self) -> Duration {
        seconds(self.start_settle_delay_seconds)
    }

    pub fn client_timeout(&self) -> Duration {
        seconds(self.client_timeout_seconds)
    }
}

fn timing_in_bounds(value: f32) -> bool {
    (0.0..=MAX_TIMING_SECONDS).contains(&value)
}

// Values `validate` would refuse collapse to zero instead of panicking.
fn seconds(value: f32) -> Duration {
    if timing_in_bounds(value) {
        Duration::try_from_secs_f32(value).unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}
