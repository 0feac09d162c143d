//! A distributed game tree search for the board game 'Connect 4'
//!
//! The coordinator expands a shallow tree from the current position, cuts its
//! frontier into independent subtree searches, hands those to a fixed group of
//! ranks over a message-passing [`transport::Transport`], and merges the
//! returned subtree summaries back before picking a move.
//!
//! # Basic Usage
//!
//! ```
//! use connect4_cluster::{board::Board, expander::Expander, tree::{Outcome, SearchTree, ROOT}};
//!
//!# use std::error::Error;
//!# fn main() -> Result<(), Box<dyn Error>> {
//! // player one has three stacked in the first column and is to move
//! let mut tree = SearchTree::new(Board::from_moves("121212")?);
//! Expander::new(&mut tree).expand(ROOT, 1);
//!
//! assert_eq!(tree.node(ROOT).outcome, Outcome::ForcedLoss);
//!# Ok(())
//!# }
//! ```

use static_assertions::*;
pub use anyhow;

pub mod board;

pub mod tree;

pub mod expander;

pub mod partition;

pub mod wire;

pub mod transport;

pub mod coordinator;

pub mod config;

mod test;

/// The default width of the game board in tiles
pub const DEFAULT_WIDTH: usize = 7;

/// The default height of the game board in tiles
pub const DEFAULT_HEIGHT: usize = 6;

/// The number of aligned tiles needed to win
pub const CONNECT: usize = 4;

/// The smallest board dimension accepted
pub const MIN_DIMENSION: usize = CONNECT;

// the default board must be able to hold a winning line on every axis
const_assert!(DEFAULT_WIDTH >= MIN_DIMENSION && DEFAULT_HEIGHT >= MIN_DIMENSION);
// the wire format stores dimensions as u16
const_assert!(DEFAULT_WIDTH * DEFAULT_HEIGHT <= u16::MAX as usize);
