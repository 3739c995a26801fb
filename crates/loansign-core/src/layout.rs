//! Deterministic placement of signatures on a page.
//!
//! Signatures fill a grid from the bottom-left corner of the page, left to
//! right, then upward one row at a time. The slot of a new signature is the
//! number of signatures already on the agreement.

use serde::{Deserialize, Serialize};

/// Bottom-left corner of a signature block, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: u32,
    pub y: u32,
}

/// Grid geometry used to place signature blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureGrid {
    pub per_row: u32,
    pub horizontal_spacing: u32,
    pub vertical_spacing: u32,
    pub x_offset: u32,
    pub y_offset: u32,
}

impl Default for SignatureGrid {
    fn default() -> Self {
        Self {
            per_row: 5,
            horizontal_spacing: 120,
            vertical_spacing: 120,
            x_offset: 25,
            y_offset: 25,
        }
    }
}

impl SignatureGrid {
    /// Position of the signature that follows `existing` earlier signatures.
    ///
    /// A zero `per_row` is treated as one column.
    #[must_use]
    pub fn position(&self, existing: u32) -> GridPosition {
        let per_row = self.per_row.max(1);
        let column = existing % per_row;
        let row = existing / per_row;
        GridPosition {
            x: self
                .x_offset
                .saturating_add(column.saturating_mul(self.horizontal_spacing)),
            y: self
                .y_offset
                .saturating_add(row.saturating_mul(self.vertical_spacing)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_slot_sits_at_offsets() {
        let grid = SignatureGrid::default();
        assert_eq!(grid.position(0), GridPosition { x: 25, y: 25 });
    }

    #[test]
    fn first_row_advances_horizontally() {
        let grid = SignatureGrid::default();
        assert_eq!(grid.position(1), GridPosition { x: 145, y: 25 });
        assert_eq!(grid.position(4), GridPosition { x: 505, y: 25 });
    }

    #[test]
    fn sixth_signature_wraps_to_next_row() {
        let grid = SignatureGrid::default();
        assert_eq!(grid.position(5), GridPosition { x: 25, y: 145 });
        assert_eq!(grid.position(12), GridPosition { x: 265, y: 265 });
    }

    #[test]
    fn slots_never_collide() {
        let grid = SignatureGrid::default();
        let mut seen = std::collections::HashSet::new();
        for n in 0..50 {
            assert!(seen.insert(grid.position(n)), "slot {n} collided");
        }
    }

    #[test]
    fn zero_per_row_degrades_to_single_column() {
        let grid = SignatureGrid {
            per_row: 0,
            ..SignatureGrid::default()
        };
        assert_eq!(grid.position(2), GridPosition { x: 25, y: 265 });
    }
}
