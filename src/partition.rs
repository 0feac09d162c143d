//! Splitting a shallow tree into independent subtree searches

use static_assertions::assert_impl_all;

use crate::board::{Board, Player};
use crate::tree::*;

/// A frontier position to be searched by one rank
#[derive(Clone, PartialEq, Debug)]
pub struct Task {
    /// Position in the pre-order flattening, the key results are merged by
    pub index: usize,
    /// The frontier node this task stands for
    pub node: NodeId,
    pub parent: Option<NodeId>,
    pub board: Board,
    pub whose_turn: Player,
}

impl Task {
    /// A task without a parent is the root itself and cannot be merged into
    /// a larger tree
    pub fn is_mergeable(&self) -> bool {
        self.parent.is_some()
    }
}

/// The outcome of fully searching one [`Task`]
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct TaskResult {
    pub index: usize,
    pub summary: Summary,
}

assert_impl_all!(Task: Send, Clone);
assert_impl_all!(TaskResult: Send, Copy);

/// Picks how many plies the coordinator expands before handing off
///
/// Aims for at least `worker_count²` frontier positions so that the static
/// round-robin still gives every rank several tasks.
pub fn choose_cut_depth(worker_count: usize, branching_factor: usize, target_depth: usize) -> usize {
    let min_tasks = (worker_count * worker_count) as f64;
    let depth = if branching_factor < 2 || min_tasks <= 1.0 {
        1
    } else {
        (min_tasks.ln() / (branching_factor as f64).ln()).ceil() as usize
    };
    depth.max(1).min(target_depth)
}

/// Side to move at `depth` plies below a root where `root_turn` moves
pub fn turn_at_depth(root_turn: Player, depth: usize) -> Player {
    if depth % 2 == 0 {
        root_turn
    } else {
        root_turn.opponent()
    }
}

/// Collects every leaf of the tree as a task, in depth-first pre-order
pub fn flatten(tree: &SearchTree) -> Vec<Task> {
    let mut tasks = Vec::new();
    collect(tree, ROOT, 0, tree.root().whose_turn, &mut tasks);
    tasks
}

fn collect(tree: &SearchTree, id: NodeId, depth: usize, root_turn: Player, tasks: &mut Vec<Task>) {
    let node = tree.node(id);
    if node.is_leaf() {
        let whose_turn = turn_at_depth(root_turn, depth);
        debug_assert_eq!(whose_turn, node.whose_turn);
        tasks.push(Task {
            index: tasks.len(),
            node: id,
            parent: node.parent(),
            board: node.board.clone(),
            whose_turn,
        });
    } else {
        for &child in node.children() {
            collect(tree, child, depth + 1, root_turn, tasks);
        }
    }
}

/// True when the only task is the unmergeable root
pub fn is_degenerate(tasks: &[Task]) -> bool {
    tasks.len() == 1 && !tasks[0].is_mergeable()
}

/// Deals tasks out round-robin, `tasks[i]` going to rank `i % worker_count`
///
/// The returned vector is indexed by rank and always has `worker_count` entries.
pub fn assign(tasks: &[Task], worker_count: usize) -> Vec<Vec<Task>> {
    let mut shards = vec![Vec::new(); worker_count];
    if worker_count == 0 {
        return shards;
    }
    for (i, task) in tasks.iter().enumerate() {
        shards[i % worker_count].push(task.clone());
    }
    shards
}
