use anyhow::{anyhow, Result};

use std::fmt;

use crate::{CONNECT, DEFAULT_HEIGHT, DEFAULT_WIDTH, MIN_DIMENSION};

/// One of the two sides of a game
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Player {
    One,
    Two,
}

impl Player {
    pub fn opponent(self) -> Self {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }

    /// Numeric identity used on the wire and in cell storage
    pub fn id(self) -> u8 {
        match self {
            Player::One => 1,
            Player::Two => 2,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Player::One),
            2 => Some(Player::Two),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Cell {
    PlayerOne,
    PlayerTwo,
    Empty,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            _ => false,
        }
    }

    pub fn player(&self) -> Option<Player> {
        match self {
            Cell::PlayerOne => Some(Player::One),
            Cell::PlayerTwo => Some(Player::Two),
            Cell::Empty => None,
        }
    }

    pub fn id(&self) -> u8 {
        self.player().map_or(0, Player::id)
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Cell::Empty),
            _ => Player::from_id(id).map(Cell::from),
        }
    }
}

impl From<Player> for Cell {
    fn from(player: Player) -> Self {
        match player {
            Player::One => Cell::PlayerOne,
            Player::Two => Cell::PlayerTwo,
        }
    }
}

// the four axes a line can run along: horizontal, vertical and both diagonals
const AXES: [(isize, isize); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];

/// A snapshot of the grid plus the move that produced it
///
/// Tiles only ever enter a column from the bottom, and a tile once placed is
/// never changed. New positions are derived by cloning and inserting, so tree
/// nodes never share a board.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Board {
    width: usize,
    height: usize,
    cells: Vec<Cell>, // cells are stored left-to-right, bottom-to-top
    heights: Vec<usize>,
    // (column, row) of the most recent tile
    last_move: Option<(usize, usize)>,
    last_player: Player,
}

impl Board {
    /// Creates an empty board, player one moves first
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Err(anyhow!(
                "Invalid board size {}x{}, both dimensions must be at least {}",
                width,
                height,
                MIN_DIMENSION
            ));
        }
        Ok(Self {
            width,
            height,
            cells: vec![Cell::Empty; width * height],
            heights: vec![0; width],
            last_move: None,
            last_player: Player::Two,
        })
    }

    /// Builds a default-sized board from a string of 1-indexed columns,
    /// alternating players starting with player one
    pub fn from_moves<S: AsRef<str>>(moves: S) -> Result<Self> {
        let mut board = Self::default();

        for column_char in moves.as_ref().chars() {
            match column_char.to_digit(10).map(|c| c as usize) {
                Some(column) if column >= 1 && column <= board.width => {
                    if board.check_winner().is_some() {
                        return Err(anyhow!("Invalid position, game is over"));
                    }
                    let player = board.next_player();
                    if !board.insert(column - 1, player) {
                        return Err(anyhow!("Invalid move, column {} full", column));
                    }
                }
                _ => return Err(anyhow!("could not parse '{}' as a valid move", column_char)),
            }
        }
        Ok(board)
    }

    /// Reassembles a board from raw parts, checking every board invariant
    pub fn from_parts(
        width: usize,
        height: usize,
        cells: Vec<Cell>,
        last_move: Option<(usize, usize)>,
        last_player: Player,
    ) -> Result<Self> {
        let mut board = Self::new(width, height)?;
        if cells.len() != width * height {
            return Err(anyhow!(
                "expected {} cells for a {}x{} board, got {}",
                width * height,
                width,
                height,
                cells.len()
            ));
        }

        for column in 0..width {
            let filled = (0..height)
                .take_while(|&row| !cells[column + width * row].is_empty())
                .count();
            if (filled..height).any(|row| !cells[column + width * row].is_empty()) {
                return Err(anyhow!("column {} has a floating tile", column));
            }
            board.heights[column] = filled;
        }

        if let Some((column, row)) = last_move {
            if column >= width || row >= height {
                return Err(anyhow!("last move ({}, {}) is off the board", column, row));
            }
            if board.heights[column] != row + 1 {
                return Err(anyhow!("last move ({}, {}) is not a column top", column, row));
            }
            if cells[column + width * row].player() != Some(last_player) {
                return Err(anyhow!(
                    "last move ({}, {}) does not belong to player {}",
                    column,
                    row,
                    last_player.id()
                ));
            }
        }

        board.cells = cells;
        board.last_move = last_move;
        board.last_player = last_player;
        Ok(board)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// The cell at a column and row, with row 0 at the bottom
    pub fn cell(&self, column: usize, row: usize) -> Cell {
        self.cells[column + self.width * row]
    }

    pub fn last_move(&self) -> Option<(usize, usize)> {
        self.last_move
    }

    pub fn last_column(&self) -> Option<usize> {
        self.last_move.map(|(column, _)| column)
    }

    pub fn last_player(&self) -> Player {
        self.last_player
    }

    pub fn next_player(&self) -> Player {
        self.last_player.opponent()
    }

    pub fn column_height(&self, column: usize) -> usize {
        self.heights[column]
    }

    pub fn move_count(&self) -> usize {
        self.heights.iter().sum()
    }

    pub fn is_valid_move(&self, column: usize) -> bool {
        column < self.width && self.heights[column] < self.height
    }

    /// Columns that can still take a tile, in ascending order
    pub fn legal_columns(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.width).filter(move |&column| self.is_valid_move(column))
    }

    pub fn is_full(&self) -> bool {
        self.move_count() == self.width * self.height
    }

    /// Drops a tile into a column
    ///
    /// Returns `false` and leaves the board untouched if the column is out of
    /// range or already full.
    pub fn insert(&mut self, column: usize, player: Player) -> bool {
        if !self.is_valid_move(column) {
            return false;
        }
        let row = self.heights[column];
        self.cells[column + self.width * row] = player.into();
        self.heights[column] += 1;
        self.last_move = Some((column, row));
        self.last_player = player;
        true
    }

    /// Looks for a line through the most recent tile only
    ///
    /// Any win has to include the last tile placed, so walking outwards from it
    /// along each axis is enough.
    pub fn check_winner(&self) -> Option<Player> {
        let (column, row) = self.last_move?;
        let cell = self.cell(column, row);
        let player = cell.player()?;

        for &(dx, dy) in AXES.iter() {
            let run = 1
                + self.run_length(column, row, dx, dy, cell)
                + self.run_length(column, row, -dx, -dy, cell);
            if run >= CONNECT {
                return Some(player);
            }
        }
        None
    }

    // count matching tiles from (column, row) in one direction, excluding the start
    fn run_length(&self, column: usize, row: usize, dx: isize, dy: isize, cell: Cell) -> usize {
        let mut run = 0;
        let mut x = column as isize + dx;
        let mut y = row as isize + dy;
        while x >= 0
            && y >= 0
            && (x as usize) < self.width
            && (y as usize) < self.height
            && self.cell(x as usize, y as usize) == cell
        {
            run += 1;
            x += dx;
            y += dy;
        }
        run
    }
}

impl Default for Board {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            cells: vec![Cell::Empty; DEFAULT_WIDTH * DEFAULT_HEIGHT],
            heights: vec![0; DEFAULT_WIDTH],
            last_move: None,
            last_player: Player::Two,
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in (0..self.height).rev() {
            for column in 0..self.width {
                let mark = match self.cell(column, row) {
                    Cell::PlayerOne => 'X',
                    Cell::PlayerTwo => 'O',
                    Cell::Empty => '.',
                };
                write!(f, "{}", mark)?;
            }
            writeln!(f)?;
        }
        for column in 0..self.width {
            write!(f, "{}", column % 10)?;
        }
        Ok(())
    }
}
