//! Seat and visual-variant allocation.
//!
//! Seat indices are handed out lowest-first so lobby positions stay
//! predictable; visual variants are picked at random among the free ones.

use log::warn;
use rand::Rng;
use shared::SessionError;
use std::collections::BTreeSet;

pub struct SeatRegistry {
    capacity: u8,
    available_seats: BTreeSet<u8>,
    available_variants: Vec<u8>,
}

impl SeatRegistry {
    pub fn new(capacity: u8) -> Self {
        Self {
            capacity,
            available_seats: (0..capacity).collect(),
            available_variants: (0..capacity).collect(),
        }
    }

    /// Takes one seat index and one visual variant.
    ///
    /// Nothing is taken unless both pools still have a free value.
    pub fn reserve<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(u8, u8), SessionError> {
        if self.available_variants.is_empty() {
            return Err(SessionError::CapacityExceeded);
        }
        let seat_index = self
            .available_seats
            .pop_first()
            .ok_or(SessionError::CapacityExceeded)?;

        let pick = rng.gen_range(0..self.available_variants.len());
        let visual_variant = self.available_variants.swap_remove(pick);

        Ok((seat_index, visual_variant))
    }

    /// Returns both indices to their pools. Values that are already free or
    /// out of range are ignored, so duplicate disconnects are harmless.
    pub fn release(&mut self, seat_index: u8, visual_variant: u8) {
        if seat_index >= self.capacity || visual_variant >= self.capacity {
            warn!(
                "Ignoring release of out-of-range seat {} / variant {}",
                seat_index, visual_variant
            );
            return;
        }

        if !self.available_seats.insert(seat_index) {
            warn!("Seat {} was already free", seat_index);
        }

        if self.available_variants.contains(&visual_variant) {
            warn!("Visual variant {} was already free", visual_variant);
        } else {
            self.available_variants.push(visual_variant);
        }
    }

    /// Frees every seat and variant.
    pub fn reset(&mut self) {
        *self = Self::new(self.capacity);
    }

    pub fn capacity(&self) -> u8 {
        self.capacity
    }

    pub fn assigned_count(&self) -> usize {
        self.capacity as usize - self.available_seats.len()
    }

    pub fn is_full(&self) -> bool {
        self.available_seats.is_empty() || self.available_variants.is_empty()
    }

    pub fn available_seats(&self) -> Vec<u8> {
        self.available_seats.iter().copied().collect()
    }

    pub fn available_variants(&self) -> Vec<u8> {
        let mut variants = self.available_variants.clone();
        variants.sort_unstable();
        variants
    }
}
