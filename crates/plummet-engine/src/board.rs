use std::fmt::{self, Write as _};

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

use crate::piece::{PieceKind, PieceVariant};

/// Width of the playable grid in cells.
pub const BOARD_WIDTH: usize = 10;
/// Height of the playable grid in cells.
pub const BOARD_HEIGHT: usize = 20;

/// Maximum stack height allowed per column.
///
/// A placement that would raise any column above its entry here is excluded
/// from choice enumeration. The outer columns are restricted harder than the
/// middle to keep generated stacks away from the walls; the exact numbers are
/// a tunable, not a rule of the game.
pub const COLUMN_HEIGHT_LIMITS: [u32; BOARD_WIDTH] = [16, 18, 20, 20, 20, 20, 20, 20, 18, 16];

/// Score values for line clears, indexed by lines cleared simultaneously.
const SCORE_TABLE: [u32; 5] = [0, 100, 300, 500, 800];

const FULL_ROW: u16 = (1 << BOARD_WIDTH) - 1;

/// The filled/empty cell grid of a board, one bitmask per row.
///
/// Bit `x` of a row represents column `x` (bit 0 is the leftmost column);
/// row 0 is the top of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    rows: [u16; BOARD_HEIGHT],
}

impl Grid {
    pub const EMPTY: Self = Self {
        rows: [0; BOARD_HEIGHT],
    };

    /// Checks if the cell at (`x`, `y`) is occupied.
    #[inline]
    #[must_use]
    pub fn is_occupied(&self, x: usize, y: usize) -> bool {
        self.rows[y] & (1 << x) != 0
    }

    /// Height of the stack in column `x`: the distance from the floor to the
    /// topmost occupied cell, or 0 for an empty column.
    #[expect(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn column_height(&self, x: usize) -> u32 {
        let bit = 1 << x;
        for (y, row) in self.rows.iter().enumerate() {
            if row & bit != 0 {
                return (BOARD_HEIGHT - y) as u32;
            }
        }
        0
    }

    /// Heights of all columns, left to right.
    #[must_use]
    pub fn column_heights(&self) -> [u32; BOARD_WIDTH] {
        std::array::from_fn(|x| self.column_height(x))
    }

    /// Height of the tallest column.
    #[must_use]
    pub fn max_height(&self) -> u32 {
        self.column_heights().into_iter().max().unwrap_or(0)
    }

    /// Number of empty cells with at least one occupied cell above them.
    #[must_use]
    pub fn count_holes(&self) -> u32 {
        let mut holes = 0;
        let mut covered: u16 = 0;
        for row in &self.rows {
            holes += (covered & !row).count_ones();
            covered |= row;
        }
        holes
    }

    /// Clears filled rows and returns the number of rows cleared.
    fn clear_lines(&mut self) -> usize {
        let mut count = 0;
        for y in (0..BOARD_HEIGHT).rev() {
            if self.rows[y] == FULL_ROW {
                count += 1;
                continue;
            }
            if count > 0 {
                self.rows[y + count] = self.rows[y];
            }
        }
        self.rows[..count].fill(0);
        count
    }

    /// Checks whether piece masks shifted to the given position overlap the
    /// stack. `masks` must already be shifted to the target columns.
    #[inline]
    fn collides(&self, masks: &[u16], y: usize) -> bool {
        masks
            .iter()
            .zip(&self.rows[y..])
            .any(|(mask, row)| mask & row != 0)
    }

    /// Creates a `Grid` from ASCII art for testing.
    ///
    /// `'#'` is an occupied cell, `'.'` an empty cell. Rows are listed top to
    /// bottom; missing leading rows are treated as empty, so fixtures only
    /// need to spell out the bottom of the stack.
    ///
    /// # Panics
    ///
    /// Panics if a row does not have exactly [`BOARD_WIDTH`] cells or there
    /// are more than [`BOARD_HEIGHT`] rows.
    #[must_use]
    pub fn from_ascii(art: &str) -> Self {
        let lines: Vec<&str> = art.lines().filter(|line| !line.trim().is_empty()).collect();
        assert!(lines.len() <= BOARD_HEIGHT, "too many rows: {}", lines.len());

        let mut grid = Self::EMPTY;
        let offset = BOARD_HEIGHT - lines.len();
        for (i, line) in lines.iter().enumerate() {
            let cells: Vec<char> = line.chars().filter(|c| *c == '#' || *c == '.').collect();
            assert_eq!(
                cells.len(),
                BOARD_WIDTH,
                "each row must have exactly {BOARD_WIDTH} cells, got {} at row {i}",
                cells.len(),
            );
            for (x, &cell) in cells.iter().enumerate() {
                if cell == '#' {
                    grid.rows[offset + i] |= 1 << x;
                }
            }
        }
        grid
    }
}

impl Serialize for Grid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Format: "000,3ff,..." (comma-separated hex row masks, top row first)
        let mut hex = String::with_capacity(BOARD_HEIGHT * 4);
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                hex.push(',');
            }
            write!(&mut hex, "{row:03x}").unwrap();
        }
        serializer.serialize_str(&hex)
    }
}

impl<'de> Deserialize<'de> for Grid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != BOARD_HEIGHT {
            return Err(serde::de::Error::custom(format!(
                "expected {BOARD_HEIGHT} comma-separated hex rows, got {}",
                parts.len()
            )));
        }

        let mut rows = [0u16; BOARD_HEIGHT];
        for (i, hex) in parts.iter().enumerate() {
            let bits = u16::from_str_radix(hex, 16).map_err(|e| {
                serde::de::Error::custom(format!("invalid hex at row {i}: {hex} ({e})"))
            })?;
            if bits > FULL_ROW {
                return Err(serde::de::Error::custom(format!(
                    "row {i} has bits outside the {BOARD_WIDTH}-column grid: {hex}"
                )));
            }
            rows[i] = bits;
        }
        Ok(Grid { rows })
    }
}

/// State of the stacking game at one point in time.
///
/// A board is the cell grid plus the scoring metadata accumulated so far.
/// Boards are produced either by [`Board::new`] or by applying a legal
/// placement to an existing board via [`Board::find_choices`]; placement is a
/// pure transformation and never mutates the source board.
///
/// # Equality
///
/// Two boards are equal iff their grids are bit-identical. Score and the
/// line-clear counters are deliberately excluded so that choice detection can
/// match an observed grid against enumerated placements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "BoardRepr", into = "BoardRepr")]
pub struct Board {
    grid: Grid,
    score: u32,
    lines_cleared: u32,
    lines_cleared_max: u32,
    finished: bool,
}

impl PartialEq for Board {
    fn eq(&self, other: &Self) -> bool {
        self.grid == other.grid
    }
}

impl Eq for Board {}

impl Board {
    /// Creates an empty board that finishes once `lines_cleared_max` lines
    /// have been cleared.
    #[must_use]
    pub fn new(lines_cleared_max: u32) -> Self {
        Self {
            grid: Grid::EMPTY,
            score: 0,
            lines_cleared: 0,
            lines_cleared_max,
            finished: lines_cleared_max == 0,
        }
    }

    /// Creates a board with a preset grid, for tests and fixtures.
    #[must_use]
    pub fn with_grid(grid: Grid, lines_cleared_max: u32) -> Self {
        Self {
            grid,
            score: 0,
            lines_cleared: 0,
            lines_cleared_max,
            finished: lines_cleared_max == 0,
        }
    }

    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Points accumulated from line clears.
    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn lines_cleared(&self) -> u32 {
        self.lines_cleared
    }

    /// The horizon: the game ends once this many lines have been cleared.
    #[must_use]
    pub fn lines_cleared_max(&self) -> u32 {
        self.lines_cleared_max
    }

    /// Lines still to clear before the horizon ends the game.
    #[must_use]
    pub fn lines_remaining(&self) -> u32 {
        self.lines_cleared_max - self.lines_cleared
    }

    /// Whether the horizon has been reached. A finished board accepts no
    /// further placements.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Height of the tallest column.
    #[must_use]
    pub fn max_height(&self) -> u32 {
        self.grid.max_height()
    }

    /// Heights of all columns, left to right.
    #[must_use]
    pub fn column_heights(&self) -> [u32; BOARD_WIDTH] {
        self.grid.column_heights()
    }

    /// Number of covered empty cells.
    #[must_use]
    pub fn count_holes(&self) -> u32 {
        self.grid.count_holes()
    }

    /// Enumerates every distinct final resting board reachable by dropping
    /// `kind` onto this board.
    ///
    /// Each distinct orientation is tried at each horizontal offset where it
    /// fits; the piece falls under gravity to its resting row, completed rows
    /// are cleared, and score and line counters are updated. Placements that
    /// would raise a column above its [`COLUMN_HEIGHT_LIMITS`] ceiling are
    /// excluded.
    ///
    /// The ordering is deterministic (orientation-major, then offset). An
    /// empty result means no legal placement exists for this piece draw; that
    /// is the ordinary end-of-game signal, distinct from [`Board::finished`]
    /// being already set (which also yields an empty result).
    #[must_use]
    pub fn find_choices(&self, kind: PieceKind) -> Vec<Board> {
        let mut choices = Vec::new();
        if self.finished {
            return choices;
        }
        for variant in kind.variants() {
            for x in 0..=(BOARD_WIDTH - variant.width()) {
                if let Some(board) = self.drop_variant(variant, x) {
                    choices.push(board);
                }
            }
        }
        choices
    }

    /// Finds the enumerated choice whose grid matches `after` exactly.
    ///
    /// Used by move-detection pipelines that reconstruct which placement a
    /// recorded before/after board pair corresponds to. Returns `None` when
    /// no enumerated choice matches; callers treat that as a data defect, not
    /// a recoverable condition.
    #[must_use]
    pub fn find_choice_index(&self, kind: PieceKind, after: &Board) -> Option<usize> {
        self.find_choices(kind)
            .iter()
            .position(|choice| choice.grid == after.grid)
    }

    /// Drops one oriented piece at horizontal offset `x`, returning the
    /// resulting board, or `None` when the placement is illegal.
    fn drop_variant(&self, variant: &PieceVariant, x: usize) -> Option<Board> {
        let masks: ArrayVec<u16, 4> = variant.rows().iter().map(|row| row << x).collect();
        let height = variant.height();

        if self.grid.collides(&masks, 0) {
            return None;
        }
        let mut y = 0;
        while y + height < BOARD_HEIGHT && !self.grid.collides(&masks, y + 1) {
            y += 1;
        }

        let mut grid = self.grid;
        for (dy, mask) in masks.iter().enumerate() {
            grid.rows[y + dy] |= mask;
        }
        for (x, limit) in COLUMN_HEIGHT_LIMITS.iter().enumerate() {
            if grid.column_height(x) > *limit {
                return None;
            }
        }

        let cleared = grid.clear_lines();
        Some(self.advanced(grid, cleared))
    }

    /// Builds the successor board after a placement that cleared `cleared`
    /// lines.
    #[expect(clippy::cast_possible_truncation)]
    fn advanced(&self, grid: Grid, cleared: usize) -> Board {
        let lines_cleared =
            (self.lines_cleared + cleared as u32).min(self.lines_cleared_max);
        Board {
            grid,
            score: self.score + SCORE_TABLE[cleared.min(SCORE_TABLE.len() - 1)],
            lines_cleared,
            lines_cleared_max: self.lines_cleared_max,
            finished: lines_cleared >= self.lines_cleared_max,
        }
    }

    /// Renders the grid highlighting cells that are filled here but not in
    /// `prev`, using ANSI color. A debugging aid, not used in training logic.
    #[must_use]
    pub fn render_diff(&self, prev: &Board) -> String {
        let mut out = String::new();
        for y in 0..BOARD_HEIGHT {
            out.push('|');
            for x in 0..BOARD_WIDTH {
                if self.grid.is_occupied(x, y) {
                    if prev.grid.is_occupied(x, y) {
                        out.push('#');
                    } else {
                        out.push_str("\x1b[34m#\x1b[0m");
                    }
                } else {
                    out.push('.');
                }
            }
            out.push_str("|\n");
        }
        writeln!(&mut out, "lines: {}/{}", self.lines_cleared, self.lines_cleared_max).unwrap();
        writeln!(&mut out, "score: {}", self.score).unwrap();
        out
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..BOARD_HEIGHT {
            f.write_char('|')?;
            for x in 0..BOARD_WIDTH {
                f.write_char(if self.grid.is_occupied(x, y) { '#' } else { '.' })?;
            }
            f.write_str("|\n")?;
        }
        writeln!(f, "lines: {}/{}", self.lines_cleared, self.lines_cleared_max)?;
        writeln!(f, "score: {}", self.score)
    }
}

/// Storage shape for board JSON.
///
/// `finished` is derived from the line counters on load, so the stored shape
/// is exactly the grid plus the three counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BoardRepr {
    grid: Grid,
    score: u32,
    lines_cleared: u32,
    lines_cleared_max: u32,
}

impl From<Board> for BoardRepr {
    fn from(board: Board) -> Self {
        Self {
            grid: board.grid,
            score: board.score,
            lines_cleared: board.lines_cleared,
            lines_cleared_max: board.lines_cleared_max,
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("lines_cleared ({lines_cleared}) exceeds lines_cleared_max ({lines_cleared_max})")]
pub struct InvalidBoardRepr {
    lines_cleared: u32,
    lines_cleared_max: u32,
}

impl TryFrom<BoardRepr> for Board {
    type Error = InvalidBoardRepr;

    fn try_from(repr: BoardRepr) -> Result<Self, Self::Error> {
        if repr.lines_cleared > repr.lines_cleared_max {
            return Err(InvalidBoardRepr {
                lines_cleared: repr.lines_cleared,
                lines_cleared_max: repr.lines_cleared_max,
            });
        }
        Ok(Board {
            grid: repr.grid,
            score: repr.score,
            lines_cleared: repr.lines_cleared,
            lines_cleared_max: repr.lines_cleared_max,
            finished: repr.lines_cleared >= repr.lines_cleared_max,
        })
    }
}
