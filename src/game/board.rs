use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boards are always square with this side length.
pub const BOARD_SIZE: usize = 5;

/// The fixed tile palette. Wire names match the colors the frontend renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileColor {
    Red,
    Blue,
    Green,
    Yellow,
    Purple,
}

impl TileColor {
    pub const PALETTE: [TileColor; 5] = [
        TileColor::Red,
        TileColor::Blue,
        TileColor::Green,
        TileColor::Yellow,
        TileColor::Purple,
    ];

    /// Pick a palette color uniformly at random.
    pub fn random(rng: &mut impl Rng) -> TileColor {
        Self::PALETTE[rng.random_range(0..Self::PALETTE.len())]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, Eq, PartialEq)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Orthogonal adjacency. The engine does not require swapped cells to be
    /// adjacent; the click handler owns that rule, this helper is for callers
    /// that want to enforce it.
    pub fn is_adjacent_to(&self, other: &Position) -> bool {
        let row_diff = (self.row as i32 - other.row as i32).abs();
        let col_diff = (self.col as i32 - other.col as i32).abs();

        row_diff + col_diff == 1
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("invalid move: ({row}, {col}) is outside the {BOARD_SIZE}x{BOARD_SIZE} board")]
    OutOfBounds { row: usize, col: usize },
}

/// What happens to a run once a swap produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Matched tiles stay on the board; the swap is kept as-is.
    #[default]
    DetectOnly,
    /// Matched runs are cleared, columns collapse, new tiles fall in from the
    /// top, and cascades resolve until the board is stable.
    ClearAndRefill,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The swap produced at least one run and was committed.
    /// `cleared` is empty under `MatchPolicy::DetectOnly`.
    Matched { cleared: Vec<Position> },
    /// The swap produced no run. The board was left untouched.
    NoMatch,
}

/// A 5x5 grid of colored tiles. Ephemeral: owned by a session, regenerated
/// per session, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: [[TileColor; BOARD_SIZE]; BOARD_SIZE],
}

impl Board {
    /// Generate a board with every cell drawn independently and uniformly
    /// from the palette. No solvability guarantee: the result may contain no
    /// possible match, or pre-existing runs, which are not collapsed.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::rng())
    }

    pub fn generate_with(rng: &mut impl Rng) -> Self {
        let mut cells = [[TileColor::Red; BOARD_SIZE]; BOARD_SIZE];
        for row in cells.iter_mut() {
            for cell in row.iter_mut() {
                *cell = TileColor::random(rng);
            }
        }
        Self { cells }
    }

    pub fn from_cells(cells: [[TileColor; BOARD_SIZE]; BOARD_SIZE]) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[[TileColor; BOARD_SIZE]; BOARD_SIZE] {
        &self.cells
    }

    pub fn color_at(&self, pos: Position) -> Result<TileColor, BoardError> {
        self.check_bounds(pos)?;
        Ok(self.cells[pos.row][pos.col])
    }

    fn check_bounds(&self, pos: Position) -> Result<(), BoardError> {
        if pos.row >= BOARD_SIZE || pos.col >= BOARD_SIZE {
            return Err(BoardError::OutOfBounds {
                row: pos.row,
                col: pos.col,
            });
        }
        Ok(())
    }

    /// Exchange two tiles unconditionally. Self-inverse: applying the same
    /// exchange twice restores the board.
    pub fn swap_tiles(&mut self, a: Position, b: Position) -> Result<(), BoardError> {
        self.check_bounds(a)?;
        self.check_bounds(b)?;

        let tmp = self.cells[a.row][a.col];
        self.cells[a.row][a.col] = self.cells[b.row][b.col];
        self.cells[b.row][b.col] = tmp;
        Ok(())
    }

    /// The gameplay swap: check-then-commit. The exchange is evaluated first
    /// and undone before returning when it produces no run, so a rejected
    /// swap never becomes visible state.
    pub fn try_swap(&mut self, a: Position, b: Position, policy: MatchPolicy) -> Result<SwapOutcome, BoardError> {
        self.try_swap_with(a, b, policy, &mut rand::rng())
    }

    pub fn try_swap_with(
        &mut self,
        a: Position,
        b: Position,
        policy: MatchPolicy,
        rng: &mut impl Rng,
    ) -> Result<SwapOutcome, BoardError> {
        self.swap_tiles(a, b)?;

        if !self.has_match() {
            self.swap_tiles(a, b)?;
            return Ok(SwapOutcome::NoMatch);
        }

        let cleared = match policy {
            MatchPolicy::DetectOnly => Vec::new(),
            MatchPolicy::ClearAndRefill => self.resolve_matches(rng),
        };

        Ok(SwapOutcome::Matched { cleared })
    }

    /// True iff any horizontal or vertical triple holds three identical
    /// colors. A whole-board scan: runs that existed before the last swap
    /// count too.
    pub fn has_match(&self) -> bool {
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE - 2 {
                if self.cells[row][col] == self.cells[row][col + 1]
                    && self.cells[row][col] == self.cells[row][col + 2]
                {
                    return true;
                }
            }
        }

        for col in 0..BOARD_SIZE {
            for row in 0..BOARD_SIZE - 2 {
                if self.cells[row][col] == self.cells[row + 1][col]
                    && self.cells[row][col] == self.cells[row + 2][col]
                {
                    return true;
                }
            }
        }

        false
    }

    /// Every cell that belongs to a run of 3+ in its row or column, in
    /// row-major order. Cells shared by crossing runs appear once.
    pub fn matched_positions(&self) -> Vec<Position> {
        let mask = self.matched_mask();
        let mut positions = Vec::new();
        for (row, mask_row) in mask.iter().enumerate() {
            for (col, matched) in mask_row.iter().enumerate() {
                if *matched {
                    positions.push(Position::new(row, col));
                }
            }
        }
        positions
    }

    fn matched_mask(&self) -> [[bool; BOARD_SIZE]; BOARD_SIZE] {
        let mut mask = [[false; BOARD_SIZE]; BOARD_SIZE];

        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE - 2 {
                if self.cells[row][col] == self.cells[row][col + 1]
                    && self.cells[row][col] == self.cells[row][col + 2]
                {
                    mask[row][col] = true;
                    mask[row][col + 1] = true;
                    mask[row][col + 2] = true;
                }
            }
        }

        for col in 0..BOARD_SIZE {
            for row in 0..BOARD_SIZE - 2 {
                if self.cells[row][col] == self.cells[row + 1][col]
                    && self.cells[row][col] == self.cells[row + 2][col]
                {
                    mask[row][col] = true;
                    mask[row + 1][col] = true;
                    mask[row + 2][col] = true;
                }
            }
        }

        mask
    }

    /// Clear all current runs, collapse columns, refill from the top, and
    /// repeat until no run remains. Returns every cleared position across
    /// all cascade waves.
    fn resolve_matches(&mut self, rng: &mut impl Rng) -> Vec<Position> {
        let mut cleared_all = Vec::new();

        loop {
            let cleared = self.matched_positions();
            if cleared.is_empty() {
                break;
            }
            let mask = self.matched_mask();
            cleared_all.extend(cleared);
            self.collapse_and_refill(&mask, rng);
        }

        cleared_all
    }

    fn collapse_and_refill(
        &mut self,
        mask: &[[bool; BOARD_SIZE]; BOARD_SIZE],
        rng: &mut impl Rng,
    ) {
        for col in 0..BOARD_SIZE {
            let mut write = BOARD_SIZE;
            for row in (0..BOARD_SIZE).rev() {
                if !mask[row][col] {
                    write -= 1;
                    self.cells[write][col] = self.cells[row][col];
                }
            }
            for row in 0..write {
                self.cells[row][col] = TileColor::random(rng);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// A board with no run anywhere: color = PALETTE[(col + 2*row) % 5], so
    /// any three consecutive cells in a row or column are pairwise distinct.
    fn no_match_board() -> Board {
        let mut cells = [[TileColor::Red; BOARD_SIZE]; BOARD_SIZE];
        for (row, cells_row) in cells.iter_mut().enumerate() {
            for (col, cell) in cells_row.iter_mut().enumerate() {
                *cell = TileColor::PALETTE[(col + 2 * row) % TileColor::PALETTE.len()];
            }
        }
        Board::from_cells(cells)
    }

    #[test]
    fn test_generated_board_is_5x5_within_palette() {
        for _ in 0..50 {
            let board = Board::generate();
            assert_eq!(board.cells().len(), BOARD_SIZE);
            for row in board.cells() {
                assert_eq!(row.len(), BOARD_SIZE);
                for cell in row {
                    assert!(TileColor::PALETTE.contains(cell));
                }
            }
        }
    }

    #[test]
    fn test_no_match_board_has_no_match() {
        assert!(!no_match_board().has_match());
    }

    #[test]
    fn test_has_match_horizontal_run() {
        let mut board = no_match_board();
        let mut cells = *board.cells();
        cells[2][1] = TileColor::Green;
        cells[2][2] = TileColor::Green;
        cells[2][3] = TileColor::Green;
        board = Board::from_cells(cells);

        assert!(board.has_match());
        assert_eq!(
            board.matched_positions(),
            vec![
                Position::new(2, 1),
                Position::new(2, 2),
                Position::new(2, 3)
            ]
        );
    }

    #[test]
    fn test_has_match_vertical_run() {
        let mut cells = *no_match_board().cells();
        cells[0][4] = TileColor::Purple;
        cells[1][4] = TileColor::Purple;
        cells[2][4] = TileColor::Purple;
        let board = Board::from_cells(cells);

        assert!(board.has_match());
        assert_eq!(board.matched_positions().len(), 3);
    }

    #[test]
    fn test_overlapping_runs_share_cells() {
        // A cross: horizontal run through (2,1)..(2,3) and vertical run
        // through (1,2)..(3,2) sharing the center cell.
        let mut cells = *no_match_board().cells();
        for col in 1..=3 {
            cells[2][col] = TileColor::Yellow;
        }
        for row in 1..=3 {
            cells[row][2] = TileColor::Yellow;
        }
        // The base pattern already holds Yellow at (2,4); break it so the
        // horizontal run is exactly three long.
        cells[2][4] = TileColor::Red;
        let board = Board::from_cells(cells);

        assert!(board.has_match());
        // 3 + 3 cells minus the shared center.
        assert_eq!(board.matched_positions().len(), 5);
    }

    #[test]
    fn test_run_longer_than_three_is_detected() {
        let mut cells = *no_match_board().cells();
        for col in 0..5 {
            cells[0][col] = TileColor::Blue;
        }
        let board = Board::from_cells(cells);

        assert!(board.has_match());
        assert_eq!(board.matched_positions().len(), 5);
    }

    #[test]
    fn test_swap_tiles_is_its_own_inverse() {
        let board = no_match_board();
        let mut swapped = board.clone();
        let a = Position::new(0, 0);
        let b = Position::new(3, 4);

        swapped.swap_tiles(a, b).unwrap();
        assert_ne!(board, swapped);
        swapped.swap_tiles(a, b).unwrap();
        assert_eq!(board, swapped);
    }

    #[test]
    fn test_out_of_bounds_swap_is_rejected_without_mutation() {
        let mut board = no_match_board();
        let original = board.clone();

        let result = board.swap_tiles(Position::new(0, 0), Position::new(5, 2));
        assert_eq!(result, Err(BoardError::OutOfBounds { row: 5, col: 2 }));
        assert_eq!(board, original);

        let result = board.try_swap(Position::new(9, 9), Position::new(0, 0), MatchPolicy::DetectOnly);
        assert_eq!(result, Err(BoardError::OutOfBounds { row: 9, col: 9 }));
        assert_eq!(board, original);
    }

    #[test]
    fn test_try_swap_without_match_leaves_board_untouched() {
        let mut board = no_match_board();
        let original = board.clone();

        let outcome = board
            .try_swap(Position::new(0, 0), Position::new(0, 1), MatchPolicy::DetectOnly)
            .unwrap();

        assert_eq!(outcome, SwapOutcome::NoMatch);
        assert_eq!(board, original, "rejected swap must not commit");
    }

    #[test]
    fn test_try_swap_with_match_commits_under_detect_only() {
        // (1,0) holds Green; swapping it into (2,0) completes the Green run
        // along row 2. (2,3) is re-colored so no run exists before the swap.
        let mut cells = *no_match_board().cells();
        cells[2][0] = TileColor::Red;
        cells[2][1] = TileColor::Green;
        cells[2][2] = TileColor::Green;
        cells[2][3] = TileColor::Red;
        cells[1][0] = TileColor::Green;
        let mut board = Board::from_cells(cells);
        assert!(!board.has_match());

        let a = Position::new(1, 0);
        let b = Position::new(2, 0);
        let outcome = board.try_swap(a, b, MatchPolicy::DetectOnly).unwrap();

        assert_eq!(outcome, SwapOutcome::Matched { cleared: Vec::new() });
        // The swap is kept and the matched tiles stay on the board.
        assert_eq!(board.color_at(b).unwrap(), TileColor::Green);
        assert!(board.has_match());
    }

    #[test]
    fn test_try_swap_with_match_clears_under_clear_and_refill() {
        let mut cells = *no_match_board().cells();
        cells[2][0] = TileColor::Red;
        cells[2][1] = TileColor::Green;
        cells[2][2] = TileColor::Green;
        cells[2][3] = TileColor::Red;
        cells[1][0] = TileColor::Green;
        let mut board = Board::from_cells(cells);

        let mut rng = StdRng::seed_from_u64(7);
        let outcome = board
            .try_swap_with(
                Position::new(1, 0),
                Position::new(2, 0),
                MatchPolicy::ClearAndRefill,
                &mut rng,
            )
            .unwrap();

        match outcome {
            SwapOutcome::Matched { cleared } => assert!(cleared.len() >= 3),
            SwapOutcome::NoMatch => panic!("swap should have matched"),
        }
        // Resolution cascades until stable.
        assert!(!board.has_match());
        for row in board.cells() {
            for cell in row {
                assert!(TileColor::PALETTE.contains(cell));
            }
        }
    }

    #[test]
    fn test_pre_existing_run_makes_any_swap_match() {
        // Generation does not collapse runs, and has_match scans the whole
        // board, so a board holding an old run accepts unrelated swaps.
        let mut cells = *no_match_board().cells();
        for col in 1..=3 {
            cells[4][col] = TileColor::Red;
        }
        let mut board = Board::from_cells(cells);

        let outcome = board
            .try_swap(Position::new(0, 0), Position::new(0, 1), MatchPolicy::DetectOnly)
            .unwrap();
        assert!(matches!(outcome, SwapOutcome::Matched { .. }));
    }

    #[test]
    fn test_adjacency_is_orthogonal_only() {
        let center = Position::new(2, 2);
        assert!(center.is_adjacent_to(&Position::new(1, 2)));
        assert!(center.is_adjacent_to(&Position::new(2, 3)));
        assert!(!center.is_adjacent_to(&Position::new(1, 1)), "diagonals are not adjacent");
        assert!(!center.is_adjacent_to(&center));
        assert!(!center.is_adjacent_to(&Position::new(2, 4)));
    }

    #[test]
    fn test_generate_with_is_deterministic_for_a_seed() {
        let a = Board::generate_with(&mut StdRng::seed_from_u64(42));
        let b = Board::generate_with(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_tile_color_wire_names() {
        let json = serde_json::to_string(&TileColor::Yellow).unwrap();
        assert_eq!(json, "\"yellow\"");
        let back: TileColor = serde_json::from_str("\"purple\"").unwrap();
        assert_eq!(back, TileColor::Purple);
    }
}
