use rand::Rng;
use shared::SessionError;

/// Numbers still to be drawn this round, plus the ones already drawn in
/// draw order.
#[derive(Debug, Clone)]
pub struct NumberPool {
    min: u32,
    max: u32,
    remaining: Vec<u32>,
    drawn: Vec<u32>,
}

impl NumberPool {
    /// Creates a full pool for `min..=max`. A reversed range is swapped.
    pub fn new(min: u32, max: u32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            remaining: (min..=max).collect(),
            drawn: Vec::new(),
        }
    }

    /// Draws one remaining number uniformly at random.
    pub fn draw_next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<u32, SessionError> {
        if self.remaining.is_empty() {
            return Err(SessionError::Exhausted);
        }

        let pick = rng.gen_range(0..self.remaining.len());
        let value = self.remaining.swap_remove(pick);
        self.drawn.push(value);
        Ok(value)
    }

    /// Whether another draw is allowed under the given draw limit.
    pub fn can_draw(&self, max_draws: usize) -> bool {
        !self.remaining.is_empty() && self.drawn.len() < max_draws
    }

    /// Puts every number back and forgets the draw history.
    pub fn reseed(&mut self) {
        self.remaining = (self.min..=self.max).collect();
        self.drawn.clear();
    }

    pub fn range(&self) -> (u32, u32) {
        (self.min, self.max)
    }

    pub fn drawn(&self) -> &[u32] {
        &self.drawn
    }

    pub fn remaining_count(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_empty()
    }
}
