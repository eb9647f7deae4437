use log::{debug, warn};
use rand::seq::index;
use rand::Rng;
use shared::{Pattern, GRID_SIZE};

/// A player's card: 24 distinct numbers from the session's range and the
/// cells marked so far.
///
/// The card never leaves the client. Only the marking is sent with a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    numbers: [u32; GRID_SIZE],
    marked: [bool; GRID_SIZE],
}

impl Card {
    /// Deals a card from `min..=max`. Returns None when the range holds fewer
    /// than 24 numbers.
    pub fn generate<R: Rng + ?Sized>(range: (u32, u32), rng: &mut R) -> Option<Self> {
        let (min, max) = range;
        if min > max {
            warn!("Cannot deal a card from empty range {}..={}", min, max);
            return None;
        }

        let span = (max - min) as usize + 1;
        if span < GRID_SIZE {
            warn!(
                "Range {}..={} has {} numbers, a card needs {}",
                min, max, span, GRID_SIZE
            );
            return None;
        }

        let mut numbers = [0u32; GRID_SIZE];
        for (cell, offset) in numbers.iter_mut().zip(index::sample(rng, span, GRID_SIZE)) {
            *cell = min + offset as u32;
        }
        debug!("Dealt card {:?}", numbers);

        Some(Self::from_numbers(numbers))
    }

    pub fn from_numbers(numbers: [u32; GRID_SIZE]) -> Self {
        Self {
            numbers,
            marked: [false; GRID_SIZE],
        }
    }

    pub fn numbers(&self) -> &[u32; GRID_SIZE] {
        &self.numbers
    }

    /// Marks a cell if its number has been drawn. Returns true when the cell
    /// is marked afterwards.
    pub fn mark(&mut self, cell: usize, drawn: &[u32]) -> bool {
        let Some(number) = self.numbers.get(cell).copied() else {
            return false;
        };
        if !drawn.contains(&number) {
            return false;
        }

        self.marked[cell] = true;
        true
    }

    /// Rebuilds the marking from the whole draw list, so a corrected list
    /// also removes marks. Returns the number of marked cells.
    pub fn sync_marks(&mut self, drawn: &[u32]) -> usize {
        self.clear_marks();
        for cell in 0..GRID_SIZE {
            self.mark(cell, drawn);
        }
        self.marked_count()
    }

    pub fn marking(&self) -> Vec<bool> {
        self.marked.to_vec()
    }

    pub fn marked_count(&self) -> usize {
        self.marked.iter().filter(|m| **m).count()
    }

    pub fn clear_marks(&mut self) {
        self.marked = [false; GRID_SIZE];
    }

    /// Whether the current marking would win against `pattern`.
    pub fn satisfies(&self, pattern: &Pattern) -> bool {
        pattern.check(&self.marked).is_ok()
    }
}
