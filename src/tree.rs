//! Arena-backed game tree
//!
//! Nodes live in a single `Vec` owned by [`SearchTree`]. Children are held as
//! indices into that arena and the parent link is a plain index used only for
//! upward notification, so ownership runs strictly from the tree downwards.

use crate::board::{Board, Player};

/// Index of a node inside its [`SearchTree`]
pub type NodeId = usize;

/// The root is always the first node allocated
pub const ROOT: NodeId = 0;

/// The side whose forced wins score +1 (the CPU)
pub const MAXIMIZER: Player = Player::Two;

/// What is known about a node after the expander has seen it
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Outcome {
    /// Not yet processed
    Undetermined,
    /// No forced result within the searched depth
    InProgress,
    /// The maximizer wins by force
    ForcedWin,
    /// The opponent wins by force
    ForcedLoss,
}

impl Outcome {
    /// Outcome of a position given the winner of its last move
    pub fn from_winner(winner: Option<Player>) -> Self {
        match winner {
            None => Outcome::InProgress,
            Some(player) if player == MAXIMIZER => Outcome::ForcedWin,
            Some(_) => Outcome::ForcedLoss,
        }
    }

    /// -1, 0 or +1 from the maximizer's point of view
    pub fn value(self) -> i8 {
        match self {
            Outcome::ForcedWin => 1,
            Outcome::ForcedLoss => -1,
            Outcome::InProgress | Outcome::Undetermined => 0,
        }
    }
}

/// Everything a subtree search reports about its root
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Summary {
    pub outcome: Outcome,
    pub score: f64,
    pub win_count: u64,
    pub loss_count: u64,
    pub undecided_count: u64,
    /// The forced outcome this node pushed onto its parent, if any
    pub parent_claim: Option<Outcome>,
}

/// One position in the game tree
#[derive(Clone, Debug)]
pub struct SearchNode {
    pub board: Board,
    /// The side to move from this position
    pub whose_turn: Player,
    pub outcome: Outcome,
    /// Heuristic value in [-1, 1]
    pub score: f64,
    pub win_count: u64,
    pub loss_count: u64,
    pub undecided_count: u64,
    pub parent_claim: Option<Outcome>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    // holds a merged remote result and must not be re-evaluated locally
    settled: bool,
}

impl SearchNode {
    fn new(board: Board, whose_turn: Player, parent: Option<NodeId>) -> Self {
        Self {
            board,
            whose_turn,
            outcome: Outcome::Undetermined,
            score: 0.0,
            win_count: 0,
            loss_count: 0,
            undecided_count: 0,
            parent_claim: None,
            children: Vec::new(),
            parent,
            settled: false,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// The column played to reach this node
    pub fn column(&self) -> Option<usize> {
        self.board.last_column()
    }

    pub fn summary(&self) -> Summary {
        Summary {
            outcome: self.outcome,
            score: self.score,
            win_count: self.win_count,
            loss_count: self.loss_count,
            undecided_count: self.undecided_count,
            parent_claim: self.parent_claim,
        }
    }

    pub(crate) fn clear_counts(&mut self) {
        self.score = 0.0;
        self.win_count = 0;
        self.loss_count = 0;
        self.undecided_count = 0;
        self.parent_claim = None;
    }
}

/// A game tree rooted at a single position
///
/// The tree is rebuilt from scratch after every accepted move.
#[derive(Clone, Debug)]
pub struct SearchTree {
    nodes: Vec<SearchNode>,
}

impl SearchTree {
    /// Creates a one-node tree, the side to move being the one that did not
    /// make the board's last move
    pub fn new(board: Board) -> Self {
        let whose_turn = board.next_player();
        Self::with_turn(board, whose_turn)
    }

    /// Creates a one-node tree with an explicit side to move
    pub fn with_turn(board: Board, whose_turn: Player) -> Self {
        Self {
            nodes: vec![SearchNode::new(board, whose_turn, None)],
        }
    }

    pub fn root(&self) -> &SearchNode {
        &self.nodes[ROOT]
    }

    pub fn node(&self, id: NodeId) -> &SearchNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut SearchNode {
        &mut self.nodes[id]
    }

    /// Number of nodes allocated
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// Adds one child per playable column, in ascending column order
    ///
    /// Does nothing if the node already has children.
    pub fn generate_children(&mut self, id: NodeId) {
        let node = &self.nodes[id];
        if !node.children.is_empty() {
            return;
        }
        let turn = node.whose_turn;
        let boards: Vec<Board> = node
            .board
            .legal_columns()
            .filter_map(|column| {
                let mut board = node.board.clone();
                if board.insert(column, turn) {
                    Some(board)
                } else {
                    None
                }
            })
            .collect();

        for board in boards {
            let child = self.nodes.len();
            self.nodes
                .push(SearchNode::new(board, turn.opponent(), Some(id)));
            self.nodes[id].children.push(child);
        }
    }

    /// Overwrites a node with a remotely computed result
    pub fn settle(&mut self, id: NodeId, summary: Summary) {
        let node = &mut self.nodes[id];
        node.outcome = summary.outcome;
        node.score = summary.score;
        node.win_count = summary.win_count;
        node.loss_count = summary.loss_count;
        node.undecided_count = summary.undecided_count;
        node.parent_claim = summary.parent_claim;
        node.settled = true;
    }

    /// Longest path from a node down to a leaf of the generated tree
    pub fn height(&self, id: NodeId) -> usize {
        self.nodes[id]
            .children
            .iter()
            .map(|&child| self.height(child) + 1)
            .max()
            .unwrap_or(0)
    }

    /// Distance from the root
    pub fn depth_of(&self, mut id: NodeId) -> usize {
        let mut depth = 0;
        while let Some(parent) = self.nodes[id].parent {
            depth += 1;
            id = parent;
        }
        depth
    }
}
