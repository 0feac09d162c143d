//! Exhaustive bounded-depth expansion of a game tree

use crate::tree::*;

/// Generates, scores and backpropagates over a [`SearchTree`]
///
/// # Notes
/// There is no pruning: every legal continuation within the depth bound is
/// generated. Depths count plies below the node being expanded, so a depth of
/// 0 only evaluates the node itself.
///
/// # Position Scoring
/// A node whose last move completed a line is a forced result, +1 if the
/// maximizer made it and -1 otherwise. A node whose children are all forced
/// the same way inherits that result. Any other node with children scores
/// `(wins - losses) / (wins + losses + undecided)` over the counts collected
/// from its whole subtree, which favours continuations with many winning and
/// few losing lines rather than assuming a perfect opponent.
pub struct Expander<'a> {
    tree: &'a mut SearchTree,

    /// The number of nodes visited by this `Expander` so far (for diagnostics only)
    pub node_count: usize,
}

impl<'a> Expander<'a> {
    pub fn new(tree: &'a mut SearchTree) -> Self {
        Self {
            tree,
            node_count: 0,
        }
    }

    /// Expands `id` to `depth` plies, scoring every node on the way back up
    pub fn expand(&mut self, id: NodeId, depth: usize) {
        self.node_count += 1;
        self.evaluate(id);

        if depth > 0 && self.tree.node(id).outcome == Outcome::InProgress {
            self.tree.generate_children(id);
            let children = self.tree.children(id).to_vec();
            for child in children {
                self.expand(child, depth - 1);
            }
        }

        self.notify_parent(id);
        self.aggregate(id);
    }

    /// Builds the tree to `depth` plies without backpropagating anything
    ///
    /// Nodes are still evaluated so that finished games are not expanded.
    pub fn generate(&mut self, id: NodeId, depth: usize) {
        self.node_count += 1;
        self.evaluate(id);

        if depth > 0 && self.tree.node(id).outcome == Outcome::InProgress {
            self.tree.generate_children(id);
            let children = self.tree.children(id).to_vec();
            for child in children {
                self.generate(child, depth - 1);
            }
        }
    }

    /// Rescores an already generated tree without adding nodes
    ///
    /// Settled nodes keep their merged result and only pass on the claim they
    /// made on their parent when they were searched, everything above them is
    /// recomputed.
    pub fn rescore(&mut self, id: NodeId) {
        self.node_count += 1;
        if self.tree.node(id).is_settled() {
            self.forward_claim(id);
            return;
        }

        self.evaluate(id);
        if self.tree.node(id).outcome == Outcome::InProgress {
            let children = self.tree.children(id).to_vec();
            for child in children {
                self.rescore(child);
            }
        }

        self.notify_parent(id);
        self.aggregate(id);
    }

    // outcome of the move that produced this node, with counters starting afresh
    fn evaluate(&mut self, id: NodeId) {
        let node = self.tree.node_mut(id);
        node.clear_counts();
        node.outcome = Outcome::from_winner(node.board.check_winner());
        node.score = f64::from(node.outcome.value());
        if node.outcome == Outcome::InProgress {
            node.undecided_count = 1;
        }
    }

    // a forced result claimed by the side that just moved forces its parent too,
    // regardless of the parent's other children
    fn notify_parent(&mut self, id: NodeId) {
        let node = self.tree.node_mut(id);
        node.parent_claim = match node.outcome {
            Outcome::ForcedWin if node.whose_turn == MAXIMIZER.opponent() => Some(Outcome::ForcedWin),
            Outcome::ForcedLoss if node.whose_turn == MAXIMIZER => Some(Outcome::ForcedLoss),
            _ => None,
        };
        self.forward_claim(id);
    }

    // replays the claim a node made when it was searched, which may predate
    // its own aggregation
    fn forward_claim(&mut self, id: NodeId) {
        let node = self.tree.node(id);
        if let (Some(parent), Some(claim)) = (node.parent(), node.parent_claim) {
            self.tree.node_mut(parent).outcome = claim;
        }
    }

    fn aggregate(&mut self, id: NodeId) {
        let children = self.tree.children(id);
        if children.is_empty() {
            return;
        }

        let num_moves = children.len() as u64;
        let mut num_forced_win = 0;
        let mut num_forced_loss = 0;
        let (mut wins, mut losses, mut undecided) = (0, 0, 0);
        for &child in children {
            let child = self.tree.node(child);
            match child.outcome {
                Outcome::ForcedWin => num_forced_win += 1,
                Outcome::ForcedLoss => num_forced_loss += 1,
                _ => {}
            }
            wins += child.win_count;
            losses += child.loss_count;
            undecided += child.undecided_count;
        }

        let node = self.tree.node_mut(id);
        if num_moves == num_forced_win {
            node.outcome = Outcome::ForcedWin;
            node.score = 1.0;
        } else if num_moves == num_forced_loss {
            node.outcome = Outcome::ForcedLoss;
            node.score = -1.0;
        } else {
            node.win_count += num_forced_win + wins;
            node.loss_count += num_forced_loss + losses;
            node.undecided_count += num_moves - num_forced_win - num_forced_loss + undecided;

            let total = node.win_count + node.loss_count + node.undecided_count;
            node.score = if total == 0 {
                0.0
            } else {
                (node.win_count as f64 - node.loss_count as f64) / total as f64
            };
        }
    }
}
