use crate::board::{BOARD_HEIGHT, BOARD_WIDTH, Board};

/// Numeric encoding of a board for an external scoring model.
///
/// This is the stable feature-extraction surface: the simulation and search
/// logic never depend on how a scorer encodes boards, and the internal
/// bit-grid representation can change without touching scorer integrations.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    /// Row-major cell occupancy, `0.0` or `1.0`, top row first.
    pub cells: Vec<f32>,
    /// Scalar features alongside the grid: `[lines_remaining, score]`.
    pub extra: [f32; 2],
}

impl ModelInput {
    /// Number of cell values in [`ModelInput::cells`].
    pub const CELLS: usize = BOARD_WIDTH * BOARD_HEIGHT;
}

impl Board {
    /// Extracts the numeric encoding of this board.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn model_input(&self) -> ModelInput {
        let mut cells = Vec::with_capacity(ModelInput::CELLS);
        for y in 0..BOARD_HEIGHT {
            for x in 0..BOARD_WIDTH {
                cells.push(if self.grid().is_occupied(x, y) { 1.0 } else { 0.0 });
            }
        }
        ModelInput {
            cells,
            extra: [self.lines_remaining() as f32, self.score() as f32],
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::board::Grid;

    use super::*;

    #[test]
    fn test_model_input_shape() {
        let input = Board::new(130).model_input();
        assert_eq!(input.cells.len(), ModelInput::CELLS);
        assert!(input.cells.iter().all(|&c| c == 0.0));
        assert_eq!(input.extra, [130.0, 0.0]);
    }

    #[test]
    fn test_model_input_marks_occupied_cells() {
        let board = Board::with_grid(
            Grid::from_ascii(
                r"
                #.........
                ",
            ),
            130,
        );
        let input = board.model_input();
        assert_eq!(input.cells.iter().filter(|&&c| c == 1.0).count(), 1);
        assert_eq!(input.cells[(BOARD_HEIGHT - 1) * BOARD_WIDTH], 1.0);
    }
}
