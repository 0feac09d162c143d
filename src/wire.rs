//! Binary encoding of protocol payloads
//!
//! All integers are big-endian. Decoders check board invariants and reject
//! trailing bytes, so a malformed payload never reaches the search.

use anyhow::{anyhow, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use std::convert::TryFrom;

use crate::board::{Board, Cell, Player};
use crate::partition::{Task, TaskResult};
use crate::tree::{Outcome, Summary};

/// What the coordinator asks of the workers at the start of a round
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Control {
    /// Search the upcoming tasks to this many plies
    Search { depth: usize },
    Shutdown,
}

const CONTROL_SEARCH: u8 = 0;
const CONTROL_SHUTDOWN: u8 = 1;

pub fn encode_control(control: Control) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(5);
    match control {
        Control::Search { depth } => {
            buf.write_u8(CONTROL_SEARCH)?;
            buf.write_u32::<BigEndian>(to_u32(depth)?)?;
        }
        Control::Shutdown => {
            buf.write_u8(CONTROL_SHUTDOWN)?;
            buf.write_u32::<BigEndian>(0)?;
        }
    }
    Ok(buf)
}

pub fn decode_control(mut payload: &[u8]) -> Result<Control> {
    let kind = payload.read_u8()?;
    let depth = payload.read_u32::<BigEndian>()? as usize;
    finish(payload)?;
    match kind {
        CONTROL_SEARCH => Ok(Control::Search { depth }),
        CONTROL_SHUTDOWN => Ok(Control::Shutdown),
        _ => Err(anyhow!("unknown control message kind {}", kind)),
    }
}

pub fn encode_count(count: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(4);
    buf.write_u32::<BigEndian>(to_u32(count)?)?;
    Ok(buf)
}

pub fn decode_count(mut payload: &[u8]) -> Result<usize> {
    let count = payload.read_u32::<BigEndian>()? as usize;
    finish(payload)?;
    Ok(count)
}

/// Encodes what a worker needs to search a task
///
/// The frontier and parent node ids stay with the coordinator, the index is
/// the only key that crosses the wire.
pub fn encode_task(task: &Task) -> Result<Vec<u8>> {
    let board = &task.board;
    let mut buf = Vec::with_capacity(16 + board.cells().len());
    buf.write_u32::<BigEndian>(to_u32(task.index)?)?;
    buf.write_u8(task.whose_turn.id())?;
    write_board(&mut buf, board)?;
    Ok(buf)
}

/// Decodes a task as seen by a worker
///
/// The returned task has no node or parent of its own, its `node` is 0 and
/// `parent` is `None`.
pub fn decode_task(mut payload: &[u8]) -> Result<Task> {
    let index = payload.read_u32::<BigEndian>()? as usize;
    let whose_turn = read_player(&mut payload)?;
    let board = read_board(&mut payload)?;
    finish(payload)?;
    Ok(Task {
        index,
        node: 0,
        parent: None,
        board,
        whose_turn,
    })
}

// index, outcome, claim, score and three counters
const RESULT_LEN: usize = 4 + 1 + 1 + 8 + 3 * 8;

pub fn encode_results(results: &[TaskResult]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(4 + results.len() * RESULT_LEN);
    buf.write_u32::<BigEndian>(to_u32(results.len())?)?;
    for result in results {
        let summary = &result.summary;
        buf.write_u32::<BigEndian>(to_u32(result.index)?)?;
        buf.write_u8(outcome_code(summary.outcome))?;
        buf.write_u8(summary.parent_claim.map_or(NO_CLAIM, outcome_code))?;
        buf.write_f64::<BigEndian>(summary.score)?;
        buf.write_u64::<BigEndian>(summary.win_count)?;
        buf.write_u64::<BigEndian>(summary.loss_count)?;
        buf.write_u64::<BigEndian>(summary.undecided_count)?;
    }
    Ok(buf)
}

pub fn decode_results(mut payload: &[u8]) -> Result<Vec<TaskResult>> {
    let count = payload.read_u32::<BigEndian>()? as usize;
    // the count is untrusted until the bytes behind it have been read
    let mut results = Vec::with_capacity(count.min(payload.len() / RESULT_LEN));
    for _ in 0..count {
        let index = payload.read_u32::<BigEndian>()? as usize;
        let outcome = outcome_from_code(payload.read_u8()?)?;
        let parent_claim = match payload.read_u8()? {
            NO_CLAIM => None,
            code => Some(outcome_from_code(code)?),
        };
        let score = payload.read_f64::<BigEndian>()?;
        if !score.is_finite() || score < -1.0 || score > 1.0 {
            return Err(anyhow!("score {} for task {} is out of range", score, index));
        }
        results.push(TaskResult {
            index,
            summary: Summary {
                outcome,
                score,
                win_count: payload.read_u64::<BigEndian>()?,
                loss_count: payload.read_u64::<BigEndian>()?,
                undecided_count: payload.read_u64::<BigEndian>()?,
                parent_claim,
            },
        });
    }
    finish(payload)?;
    Ok(results)
}

fn write_board(buf: &mut Vec<u8>, board: &Board) -> Result<()> {
    buf.write_u16::<BigEndian>(to_u16(board.width())?)?;
    buf.write_u16::<BigEndian>(to_u16(board.height())?)?;
    buf.write_u8(board.last_player().id())?;
    match board.last_move() {
        Some((column, row)) => {
            buf.write_u8(1)?;
            buf.write_u16::<BigEndian>(to_u16(column)?)?;
            buf.write_u16::<BigEndian>(to_u16(row)?)?;
        }
        None => {
            buf.write_u8(0)?;
            buf.write_u16::<BigEndian>(0)?;
            buf.write_u16::<BigEndian>(0)?;
        }
    }
    for cell in board.cells() {
        buf.write_u8(cell.id())?;
    }
    Ok(())
}

fn read_board(payload: &mut &[u8]) -> Result<Board> {
    let width = payload.read_u16::<BigEndian>()? as usize;
    let height = payload.read_u16::<BigEndian>()? as usize;
    let last_player = read_player(payload)?;
    let has_last_move = payload.read_u8()?;
    let column = payload.read_u16::<BigEndian>()? as usize;
    let row = payload.read_u16::<BigEndian>()? as usize;
    let last_move = match has_last_move {
        0 => None,
        1 => Some((column, row)),
        flag => return Err(anyhow!("invalid last move flag {}", flag)),
    };

    let mut cells = Vec::with_capacity((width * height).min(payload.len()));
    for _ in 0..width * height {
        let id = payload.read_u8()?;
        cells.push(Cell::from_id(id).ok_or_else(|| anyhow!("invalid cell value {}", id))?);
    }
    Board::from_parts(width, height, cells, last_move, last_player)
}

fn read_player(payload: &mut &[u8]) -> Result<Player> {
    let id = payload.read_u8()?;
    Player::from_id(id).ok_or_else(|| anyhow!("invalid player id {}", id))
}

// outcome codes are 0-3, a result without a claim on its parent uses this
const NO_CLAIM: u8 = 0xff;

fn outcome_code(outcome: Outcome) -> u8 {
    match outcome {
        Outcome::Undetermined => 0,
        Outcome::InProgress => 1,
        Outcome::ForcedWin => 2,
        Outcome::ForcedLoss => 3,
    }
}

fn outcome_from_code(code: u8) -> Result<Outcome> {
    match code {
        0 => Ok(Outcome::Undetermined),
        1 => Ok(Outcome::InProgress),
        2 => Ok(Outcome::ForcedWin),
        3 => Ok(Outcome::ForcedLoss),
        _ => Err(anyhow!("invalid outcome code {}", code)),
    }
}

fn finish(payload: &[u8]) -> Result<()> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("{} unexpected trailing bytes", payload.len()))
    }
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{} does not fit in a u32", value))
}

fn to_u16(value: usize) -> Result<u16> {
    u16::try_from(value).map_err(|_| anyhow!("{} does not fit in a u16", value))
}
