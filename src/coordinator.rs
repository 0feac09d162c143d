//! Coordinator and worker sides of a distributed search round
//!
//! Every rank runs the same program. Rank 0 owns the authoritative tree: it
//! expands it to the cut depth, deals out the frontier, searches its own
//! share, merges everybody's results and picks a move. The other ranks only
//! ever see copies of the positions they were handed.

use anyhow::{anyhow, Result};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use std::time::{Duration, Instant};

use crate::board::{Board, Player};
use crate::config::Config;
use crate::expander::Expander;
use crate::partition::*;
use crate::transport::{Tag, Transport, COORDINATOR};
use crate::tree::*;
use crate::wire::{self, Control};

/// Searches one task in a fresh tree and reports on its root
pub fn evaluate_task(task: &Task, depth: usize) -> TaskResult {
    let mut tree = SearchTree::with_turn(task.board.clone(), task.whose_turn);
    Expander::new(&mut tree).expand(ROOT, depth);
    TaskResult {
        index: task.index,
        summary: tree.root().summary(),
    }
}

pub fn evaluate_tasks(tasks: &[Task], depth: usize) -> Vec<TaskResult> {
    tasks.iter().map(|task| evaluate_task(task, depth)).collect()
}

/// Writes each result into the frontier node of the task it answers
///
/// Every task must be answered exactly by index, a result for an unknown or
/// unmergeable task and a task left without a result are both errors.
pub fn merge_results(tree: &mut SearchTree, tasks: &[Task], results: &[TaskResult]) -> Result<()> {
    for result in results {
        let task = tasks
            .get(result.index)
            .ok_or_else(|| anyhow!("received a result for unknown task {}", result.index))?;
        if !task.is_mergeable() {
            return Err(anyhow!("task {} is the root and has nothing to merge into", task.index));
        }
        tree.settle(task.node, result.summary);
    }

    if let Some(task) = tasks.iter().find(|task| !tree.node(task.node).is_settled()) {
        return Err(anyhow!("task {} never received a result", task.index));
    }
    Ok(())
}

/// Picks the root child to play
///
/// Children are shuffled so that equal scores are broken at random, then
/// stably sorted by descending score. The first child that is not a forced
/// loss wins; if every child is a forced loss the best scoring one is played
/// anyway.
pub fn select_move<R: Rng + ?Sized>(tree: &SearchTree, rng: &mut R) -> Option<NodeId> {
    let mut candidates = tree.children(ROOT).to_vec();
    candidates.shuffle(rng);
    candidates.sort_by(|&a, &b| tree.node(b).score.total_cmp(&tree.node(a).score));

    candidates
        .iter()
        .copied()
        .find(|&id| tree.node(id).outcome != Outcome::ForcedLoss)
        .or_else(|| candidates.first().copied())
}

/// How a round was split up
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct RoundStats {
    pub cut_depth: usize,
    pub subtree_depth: usize,
    pub task_count: usize,
    /// The root was a leaf at the cut and was searched on the coordinator alone
    pub degenerate: bool,
}

/// Runs the coordinator side of one round, leaving `tree` scored to
/// `target_depth` plies
pub fn search_round<T: Transport>(
    transport: &mut T,
    tree: &mut SearchTree,
    target_depth: usize,
) -> Result<RoundStats> {
    let size = transport.size();
    let cut_depth = choose_cut_depth(size, tree.root().board.width(), target_depth);
    let subtree_depth = target_depth.saturating_sub(cut_depth);

    Expander::new(tree).generate(ROOT, cut_depth);
    let tasks = flatten(tree);
    let degenerate = is_degenerate(&tasks);
    let shards = if degenerate {
        vec![Vec::new(); size]
    } else {
        assign(&tasks, size)
    };
    info!(
        "Cut depth {}, subtree depth {}, {} tasks over {} ranks",
        cut_depth,
        subtree_depth,
        tasks.len(),
        size
    );

    // the count has to reach each rank before its tasks
    for (rank, shard) in shards.iter().enumerate().skip(1) {
        transport.send(
            rank,
            Tag::Control,
            wire::encode_control(Control::Search {
                depth: subtree_depth,
            })?,
        )?;
        transport.send(rank, Tag::TaskCount, wire::encode_count(shard.len())?)?;
        for task in shard {
            transport.send(rank, Tag::Task, wire::encode_task(task)?)?;
        }
    }
    wait(&*transport);

    debug!("Rank {} has {} tasks", COORDINATOR, shards[COORDINATOR].len());
    let mut results = evaluate_tasks(&shards[COORDINATOR], subtree_depth);
    for rank in 1..size {
        results.extend(wire::decode_results(&transport.receive(rank, Tag::Results)?)?);
    }
    transport.barrier();

    if degenerate {
        info!("Root is a leaf at the cut, searching it locally");
        Expander::new(tree).expand(ROOT, target_depth);
    } else {
        merge_results(tree, &tasks, &results)?;
        Expander::new(tree).rescore(ROOT);
    }

    for &child in tree.children(ROOT) {
        let node = tree.node(child);
        debug!(
            "Column {:?}: score {:.4}, {:?}\n{}",
            node.column(),
            node.score,
            node.outcome,
            node.board
        );
    }

    Ok(RoundStats {
        cut_depth,
        subtree_depth,
        task_count: tasks.len(),
        degenerate,
    })
}

/// Serves rounds on a non-coordinator rank until told to shut down
pub fn run_worker<T: Transport>(transport: &mut T) -> Result<()> {
    loop {
        match wire::decode_control(&transport.receive(COORDINATOR, Tag::Control)?)? {
            Control::Shutdown => {
                debug!("Rank {} shutting down", transport.rank());
                return Ok(());
            }
            Control::Search { depth } => worker_round(transport, depth)?,
        }
    }
}

fn worker_round<T: Transport>(transport: &mut T, depth: usize) -> Result<()> {
    wait(&*transport);

    let count = wire::decode_count(&transport.receive(COORDINATOR, Tag::TaskCount)?)?;
    let mut tasks = Vec::with_capacity(count);
    for _ in 0..count {
        tasks.push(wire::decode_task(&transport.receive(COORDINATOR, Tag::Task)?)?);
    }
    debug!("Rank {} has {} tasks", transport.rank(), tasks.len());

    let results = evaluate_tasks(&tasks, depth);
    transport.send(COORDINATOR, Tag::Results, wire::encode_results(&results)?)?;
    transport.barrier();
    Ok(())
}

/// Tells every worker to leave [`run_worker`]
pub fn shutdown<T: Transport>(transport: &T) -> Result<()> {
    for rank in 1..transport.size() {
        transport.send(rank, Tag::Control, wire::encode_control(Control::Shutdown)?)?;
    }
    Ok(())
}

fn wait<T: Transport>(transport: &T) {
    debug!("Rank {} is waiting", transport.rank());
    transport.barrier();
    debug!("Rank {} is continuing", transport.rank());
}

/// State of the game after a move
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MoveResult {
    /// The column was full or off the board, nothing changed
    Invalid,
    Playing,
    Won(Player),
    Draw,
}

/// What the CPU played and why
#[derive(Clone, Debug)]
pub struct CpuMove {
    pub column: usize,
    /// Score of the chosen child
    pub score: f64,
    /// Outcome of the chosen child
    pub outcome: Outcome,
    /// The searched root before the move was applied
    pub root: Summary,
    pub result: MoveResult,
    pub elapsed: Duration,
    pub stats: RoundStats,
}

/// A human-versus-CPU game on the coordinator
///
/// The tree always holds a single fresh root between turns; it is expanded
/// during the CPU's turn and thrown away once a move is made.
pub struct Game {
    tree: SearchTree,
    empty: Board,
    target_depth: usize,
    rng: StdRng,
}

impl Game {
    pub fn new(config: &Config) -> Result<Self> {
        let board = Board::new(config.board.width, config.board.height)?;
        let rng = match config.cluster.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self::from_board(board, config.search.target_depth, rng))
    }

    /// Starts from an arbitrary position; new rounds start from an empty board
    /// of the same size
    pub fn from_board(board: Board, target_depth: usize, rng: StdRng) -> Self {
        // an existing board already has valid dimensions
        let empty = Board::new(board.width(), board.height()).unwrap_or_default();
        Self {
            tree: SearchTree::new(board),
            empty,
            target_depth,
            rng,
        }
    }

    pub fn board(&self) -> &Board {
        &self.tree.root().board
    }

    pub fn tree(&self) -> &SearchTree {
        &self.tree
    }

    pub fn whose_turn(&self) -> Player {
        self.tree.root().whose_turn
    }

    /// Clears the board for a new round
    pub fn reset(&mut self) {
        self.tree = SearchTree::new(self.empty.clone());
    }

    /// Plays a column for the side to move, normally the human
    pub fn play_column(&mut self, column: usize) -> MoveResult {
        let mut board = self.board().clone();
        if !board.insert(column, self.whose_turn()) {
            return MoveResult::Invalid;
        }
        self.advance(board)
    }

    /// Searches the current position with the whole group and plays the
    /// chosen move
    ///
    /// Returns `None` when there is no legal move left.
    pub fn play_cpu<T: Transport>(&mut self, transport: &mut T) -> Result<Option<CpuMove>> {
        let start = Instant::now();
        let stats = match search_round(transport, &mut self.tree, self.target_depth) {
            Ok(stats) => stats,
            Err(e) => {
                // drop the partly generated and merged tree so a retry starts clean
                let board = self.board().clone();
                self.tree = SearchTree::new(board);
                return Err(e);
            }
        };
        let root = self.tree.root().summary();

        let chosen = match select_move(&self.tree, &mut self.rng) {
            Some(chosen) => chosen,
            None => return Ok(None),
        };
        let node = self.tree.node(chosen);
        let column = node
            .column()
            .ok_or_else(|| anyhow!("search produced a child without a move"))?;
        let (score, outcome) = (node.score, node.outcome);
        let board = node.board.clone();

        let result = self.advance(board);
        let elapsed = start.elapsed();
        info!("CPU plays column {} ({:.4}) in {:?}", column, score, elapsed);

        Ok(Some(CpuMove {
            column,
            score,
            outcome,
            root,
            result,
            elapsed,
            stats,
        }))
    }

    fn advance(&mut self, board: Board) -> MoveResult {
        let result = match board.check_winner() {
            Some(player) => MoveResult::Won(player),
            None if board.is_full() => MoveResult::Draw,
            None => MoveResult::Playing,
        };
        self.tree = SearchTree::new(board);
        result
    }
}
