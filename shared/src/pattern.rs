//! Target patterns a winning marking has to cover.
//!
//! The card is a 6x4 grid stored row-major, so cell `i` sits in row
//! `i / GRID_COLUMNS` and column `i % GRID_COLUMNS`.

use crate::{SessionError, GRID_COLUMNS, GRID_ROWS, GRID_SIZE};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    name: String,
    mask: [bool; GRID_SIZE],
}

impl Pattern {
    pub fn new(name: impl Into<String>, mask: [bool; GRID_SIZE]) -> Self {
        Self {
            name: name.into(),
            mask,
        }
    }

    /// Builds a pattern from a mask of any length.
    ///
    /// Short masks are padded with `false`, long ones are truncated. This
    /// never fails, so a malformed pattern definition can't take the
    /// session down.
    pub fn from_cells(name: impl Into<String>, cells: &[bool]) -> Self {
        let mut mask = [false; GRID_SIZE];
        for (slot, cell) in mask.iter_mut().zip(cells) {
            *slot = *cell;
        }
        Self::new(name, mask)
    }

    /// Builds a pattern requiring the given cell indices. Out-of-range
    /// indices are ignored.
    pub fn from_indices(name: impl Into<String>, indices: &[usize]) -> Self {
        let mut mask = [false; GRID_SIZE];
        for &index in indices {
            if let Some(slot) = mask.get_mut(index) {
                *slot = true;
            }
        }
        Self::new(name, mask)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mask(&self) -> &[bool; GRID_SIZE] {
        &self.mask
    }

    pub fn required_cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.mask
            .iter()
            .enumerate()
            .filter(|(_, required)| **required)
            .map(|(index, _)| index)
    }

    pub fn required_count(&self) -> usize {
        self.required_cells().count()
    }

    /// Checks a candidate marking against this pattern.
    ///
    /// Only cells the pattern requires are looked at; marking extra cells
    /// never disqualifies a claim.
    pub fn check(&self, marking: &[bool]) -> Result<(), SessionError> {
        if marking.len() != GRID_SIZE {
            return Err(SessionError::MalformedMarking);
        }

        if self.required_cells().all(|index| marking[index]) {
            Ok(())
        } else {
            Err(SessionError::PatternMismatch)
        }
    }

    pub fn horizontal_line(row: usize) -> Self {
        let indices: Vec<usize> = (0..GRID_COLUMNS).map(|col| row * GRID_COLUMNS + col).collect();
        Self::from_indices(format!("Horizontal Line {}", row + 1), &indices)
    }

    pub fn vertical_line(col: usize) -> Self {
        let indices: Vec<usize> = if col < GRID_COLUMNS {
            (0..GRID_ROWS).map(|row| row * GRID_COLUMNS + col).collect()
        } else {
            Vec::new()
        };
        Self::from_indices(format!("Vertical Line {}", col + 1), &indices)
    }

    pub fn full_card() -> Self {
        Self::new("Full Card", [true; GRID_SIZE])
    }

    pub fn four_corners() -> Self {
        Self::from_indices(
            "Four Corners",
            &[0, GRID_COLUMNS - 1, GRID_SIZE - GRID_COLUMNS, GRID_SIZE - 1],
        )
    }

    /// Every built-in pattern: each row, each column, four corners and
    /// the full card.
    pub fn standard_catalog() -> Vec<Pattern> {
        let mut catalog: Vec<Pattern> = (0..GRID_ROWS).map(Self::horizontal_line).collect();
        catalog.extend((0..GRID_COLUMNS).map(Self::vertical_line));
        catalog.push(Self::four_corners());
        catalog.push(Self::full_card());
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact_marking(pattern: &Pattern) -> Vec<bool> {
        pattern.mask().to_vec()
    }

    #[test]
    fn test_four_corners_cells() {
        let pattern = Pattern::four_corners();
        let required: Vec<usize> = pattern.required_cells().collect();
        assert_eq!(required, vec![0, 5, 18, 23]);
    }

    #[test]
    fn test_four_corners_claims() {
        let pattern = Pattern::four_corners();

        let mut marking = vec![false; GRID_SIZE];
        for index in [0, 5, 18, 23] {
            marking[index] = true;
        }
        assert_eq!(pattern.check(&marking), Ok(()));

        marking[0] = false;
        assert_eq!(pattern.check(&marking), Err(SessionError::PatternMismatch));
    }

    #[test]
    fn test_exact_marking_accepted_for_every_catalog_pattern() {
        for pattern in Pattern::standard_catalog() {
            assert_eq!(pattern.check(&exact_marking(&pattern)), Ok(()), "{}", pattern.name());
        }
    }

    #[test]
    fn test_any_missing_required_cell_rejects() {
        for pattern in Pattern::standard_catalog() {
            for index in pattern.required_cells() {
                let mut marking = exact_marking(&pattern);
                marking[index] = false;
                assert_eq!(
                    pattern.check(&marking),
                    Err(SessionError::PatternMismatch),
                    "{} cell {}",
                    pattern.name(),
                    index
                );
            }
        }
    }

    #[test]
    fn test_over_marking_never_disqualifies() {
        let pattern = Pattern::horizontal_line(2);
        assert_eq!(pattern.check(&[true; GRID_SIZE]), Ok(()));
    }

    #[test]
    fn test_malformed_marking_length() {
        let pattern = Pattern::four_corners();
        assert_eq!(pattern.check(&[true; 23]), Err(SessionError::MalformedMarking));
        assert_eq!(pattern.check(&[true; 25]), Err(SessionError::MalformedMarking));
        assert_eq!(pattern.check(&[]), Err(SessionError::MalformedMarking));
    }

    #[test]
    fn test_from_cells_pads_and_truncates() {
        let short = Pattern::from_cells("short", &[true, true]);
        assert_eq!(short.required_count(), 2);
        assert_eq!(short.mask().len(), GRID_SIZE);

        let long = Pattern::from_cells("long", &[true; 40]);
        assert_eq!(long.required_count(), GRID_SIZE);
    }

    #[test]
    fn test_from_indices_ignores_out_of_range() {
        let pattern = Pattern::from_indices("odd", &[3, 24, 99]);
        assert_eq!(pattern.required_cells().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_lines_and_rows() {
        let vertical = Pattern::vertical_line(1);
        assert_eq!(vertical.required_cells().collect::<Vec<_>>(), vec![1, 7, 13, 19]);

        let horizontal = Pattern::horizontal_line(3);
        assert_eq!(
            horizontal.required_cells().collect::<Vec<_>>(),
            (18..24).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_standard_catalog_size() {
        assert_eq!(Pattern::standard_catalog().len(), GRID_ROWS + GRID_COLUMNS + 2);
    }
}
