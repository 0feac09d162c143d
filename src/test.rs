#[cfg(test)]
pub mod test {
    use anyhow::{anyhow, Result};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use std::thread;

    use crate::board::{Board, Cell, Player};
    use crate::coordinator::*;
    use crate::expander::Expander;
    use crate::partition::*;
    use crate::transport::{local_group, LocalTransport, Tag, Transport};
    use crate::tree::*;
    use crate::wire;

    // runs `f` on rank 0 while the other ranks serve rounds on their own threads
    fn with_group<F, R>(size: usize, f: F) -> Result<R>
    where
        F: FnOnce(&mut LocalTransport) -> Result<R>,
    {
        let mut ranks = local_group(size).into_iter();
        let mut coordinator = ranks.next().ok_or(anyhow!("empty group"))?;
        let workers: Vec<_> = ranks
            .map(|mut transport| thread::spawn(move || run_worker(&mut transport)))
            .collect();

        let result = f(&mut coordinator);

        shutdown(&coordinator)?;
        for worker in workers {
            worker.join().map_err(|_| anyhow!("worker thread panicked"))??;
        }
        result
    }

    fn sequential(board: Board, depth: usize) -> SearchTree {
        let mut tree = SearchTree::new(board);
        Expander::new(&mut tree).expand(ROOT, depth);
        tree
    }

    // the coordinator's round without any transport in between
    fn pipeline(board: Board, cut_depth: usize, subtree_depth: usize) -> Result<SearchTree> {
        let mut tree = SearchTree::new(board);
        Expander::new(&mut tree).generate(ROOT, cut_depth);
        let tasks = flatten(&tree);
        let results = evaluate_tasks(&tasks, subtree_depth);
        merge_results(&mut tree, &tasks, &results)?;
        Expander::new(&mut tree).rescore(ROOT);
        Ok(tree)
    }

    // compares every node of `cut` with the node at the same path in `full`
    fn assert_same_above_cut(full: &SearchTree, a: NodeId, cut: &SearchTree, b: NodeId) {
        assert_eq!(full.node(a).board, cut.node(b).board);
        assert_eq!(full.node(a).summary(), cut.node(b).summary());
        if cut.node(b).is_leaf() {
            return;
        }
        assert_eq!(full.children(a).len(), cut.children(b).len());
        for (&x, &y) in full.children(a).iter().zip(cut.children(b)) {
            assert_same_above_cut(full, x, cut, y);
        }
    }

    fn four_by_four_draw() -> Result<Board> {
        use Cell::{PlayerOne as X, PlayerTwo as O};
        let cells = vec![
            X, X, O, O,
            O, O, X, X,
            X, X, O, O,
            O, O, X, X,
        ];
        Board::from_parts(4, 4, cells, Some((3, 3)), Player::One)
    }

    #[test]
    pub fn winner_detection() -> Result<()> {
        // horizontal, vertical, both diagonals and a line completed in its middle
        for moves in &["1122334", "1212121", "12233434474", "76655454414", "1122443"] {
            assert_eq!(Board::from_moves(moves)?.check_winner(), Some(Player::One), "{}", moves);
        }
        assert_eq!(Board::from_moves("112233")?.check_winner(), None);
        assert_eq!(Board::default().check_winner(), None);
        Ok(())
    }

    #[test]
    pub fn rejected_moves_leave_board_untouched() -> Result<()> {
        let mut board = Board::from_moves("121212")?;
        let before = board.clone();
        assert!(!board.insert(7, Player::One));
        assert_eq!(board, before);

        board = Board::from_moves("111111")?;
        let before = board.clone();
        assert!(!board.is_valid_move(0));
        assert!(!board.insert(0, Player::One));
        assert_eq!(board, before);
        assert_eq!(board.legal_columns().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6]);
        Ok(())
    }

    #[test]
    pub fn move_strings() -> Result<()> {
        let board = Board::from_moves("12")?;
        assert_eq!(board.last_move(), Some((1, 0)));
        assert_eq!(board.last_player(), Player::Two);
        assert_eq!(board.next_player(), Player::One);
        assert_eq!(board.move_count(), 2);
        assert!(board.to_string().ends_with("XO.....\n0123456"));

        assert!(Board::from_moves("11223344").is_err());
        assert!(Board::from_moves("1111111").is_err());
        assert!(Board::from_moves("8").is_err());
        assert!(Board::from_moves("a").is_err());
        assert!(Board::new(3, 6).is_err());
        Ok(())
    }

    #[test]
    pub fn board_from_parts() -> Result<()> {
        let board = four_by_four_draw()?;
        assert!(board.is_full());
        assert_eq!(board.check_winner(), None);

        let mut cells = vec![Cell::Empty; 16];
        cells[4] = Cell::PlayerOne;
        assert!(Board::from_parts(4, 4, cells.clone(), None, Player::Two).is_err());

        cells[0] = Cell::PlayerTwo;
        assert!(Board::from_parts(4, 4, cells.clone(), Some((0, 1)), Player::One).is_ok());
        assert!(Board::from_parts(4, 4, cells.clone(), Some((0, 0)), Player::Two).is_err());
        assert!(Board::from_parts(4, 4, cells.clone(), Some((0, 1)), Player::Two).is_err());
        assert!(Board::from_parts(4, 4, cells, Some((0, 1)), Player::One)?.column_height(0) == 2);
        Ok(())
    }

    #[test]
    pub fn tree_shape() -> Result<()> {
        let mut tree = SearchTree::new(Board::default());
        assert_eq!(tree.root().whose_turn, Player::One);
        Expander::new(&mut tree).generate(ROOT, 2);

        assert_eq!(tree.len(), 1 + 7 + 49);
        assert_eq!(tree.height(ROOT), 2);
        let child = tree.children(ROOT)[3];
        assert_eq!(tree.node(child).column(), Some(3));
        assert_eq!(tree.node(child).whose_turn, Player::Two);
        let grandchild = tree.children(child)[0];
        assert_eq!(tree.depth_of(grandchild), 2);
        assert_eq!(tree.parent(grandchild), Some(child));
        assert!(tree.node(grandchild).is_leaf());
        Ok(())
    }

    #[test]
    pub fn full_board_is_an_undecided_leaf() -> Result<()> {
        let tree = sequential(four_by_four_draw()?, 3);
        let root = tree.root();
        assert_eq!(tree.len(), 1);
        assert_eq!(root.outcome, Outcome::InProgress);
        assert_eq!(root.score, 0.0);
        assert_eq!((root.win_count, root.loss_count, root.undecided_count), (0, 0, 1));
        Ok(())
    }

    #[test]
    pub fn opponent_threat_forces_parent() -> Result<()> {
        // player one threatens the first column, one of seven replies wins for them
        let tree = sequential(Board::from_moves("121212")?, 1);
        let root = tree.root();
        assert_eq!(root.outcome, Outcome::ForcedLoss);
        assert_eq!(root.score, -1.0 / 14.0);
        assert_eq!(root.loss_count, 1);
        assert_eq!(root.undecided_count, 13);

        let winning = tree.node(tree.children(ROOT)[0]);
        assert_eq!(winning.outcome, Outcome::ForcedLoss);
        assert_eq!(winning.score, -1.0);
        assert_eq!(winning.parent_claim, Some(Outcome::ForcedLoss));
        Ok(())
    }

    #[test]
    pub fn every_reply_losing_is_a_forced_loss() -> Result<()> {
        // an open three, whichever end the CPU blocks the other one wins
        let tree = sequential(Board::from_moves("22334")?, 2);
        assert_eq!(tree.root().outcome, Outcome::ForcedLoss);
        assert_eq!(tree.root().score, -1.0);
        for &child in tree.children(ROOT) {
            assert_eq!(tree.node(child).outcome, Outcome::ForcedLoss);
        }
        Ok(())
    }

    #[test]
    pub fn cut_depth() -> Result<()> {
        assert_eq!(choose_cut_depth(4, 7, 6), 2);
        assert_eq!(choose_cut_depth(3, 7, 6), 2);
        assert_eq!(choose_cut_depth(2, 7, 6), 1);
        assert_eq!(choose_cut_depth(1, 7, 6), 1);
        assert_eq!(choose_cut_depth(8, 7, 6), 3);
        assert_eq!(choose_cut_depth(8, 7, 2), 2);
        assert_eq!(choose_cut_depth(4, 1, 6), 1);

        assert_eq!(turn_at_depth(Player::Two, 0), Player::Two);
        assert_eq!(turn_at_depth(Player::Two, 1), Player::One);
        assert_eq!(turn_at_depth(Player::Two, 2), Player::Two);
        Ok(())
    }

    #[test]
    pub fn flatten_in_pre_order() -> Result<()> {
        let mut tree = SearchTree::new(Board::default());
        Expander::new(&mut tree).generate(ROOT, 2);
        let tasks = flatten(&tree);

        assert_eq!(tasks.len(), 49);
        for (i, task) in tasks.iter().enumerate() {
            assert_eq!(task.index, i);
            assert_eq!(task.whose_turn, Player::One);
            assert_eq!(task.board.last_column(), Some(i % 7));
            let parent = task.parent.ok_or(anyhow!("task {} has no parent", i))?;
            assert_eq!(tree.node(parent).column(), Some(i / 7));
            assert_eq!(tree.parent(task.node), Some(parent));
        }
        assert!(!is_degenerate(&tasks));
        Ok(())
    }

    #[test]
    pub fn round_robin_assignment() -> Result<()> {
        let mut tree = SearchTree::new(Board::from_moves("444")?);
        Expander::new(&mut tree).generate(ROOT, 1);
        let tasks = flatten(&tree);
        assert_eq!(tasks.len(), 7);

        let shards = assign(&tasks, 3);
        assert_eq!(shards, assign(&tasks, 3));
        assert_eq!(shards.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 2, 2]);
        let indices: Vec<_> = shards[1].iter().map(|task| task.index).collect();
        assert_eq!(indices, vec![1, 4]);

        assert_eq!(assign(&tasks[..1], 4).iter().map(Vec::len).collect::<Vec<_>>(), vec![1, 0, 0, 0]);
        Ok(())
    }

    #[test]
    pub fn finished_root_is_degenerate() -> Result<()> {
        let mut tree = SearchTree::new(Board::from_moves("1122334")?);
        Expander::new(&mut tree).generate(ROOT, 2);
        let tasks = flatten(&tree);
        assert_eq!(tasks.len(), 1);
        assert!(is_degenerate(&tasks));

        let results = evaluate_tasks(&tasks, 2);
        assert!(merge_results(&mut tree, &tasks, &results).is_err());
        Ok(())
    }

    #[test]
    pub fn merge_checks_every_task() -> Result<()> {
        let mut tree = SearchTree::new(Board::default());
        Expander::new(&mut tree).generate(ROOT, 1);
        let tasks = flatten(&tree);
        let mut results = evaluate_tasks(&tasks, 1);

        let mut missing = tree.clone();
        assert!(merge_results(&mut missing, &tasks, &results[..6]).is_err());

        results[2].index = 99;
        let mut unknown = tree.clone();
        assert!(merge_results(&mut unknown, &tasks, &results).is_err());

        results[2].index = 2;
        merge_results(&mut tree, &tasks, &results)?;
        assert!(tasks.iter().all(|task| tree.node(task.node).is_settled()));
        Ok(())
    }

    #[test]
    pub fn distributed_matches_sequential() -> Result<()> {
        let cases = [
            ("", 2, 2),
            ("", 1, 3),
            ("4", 1, 3),
            ("4", 2, 2),
            ("112233", 1, 3),
            ("112233", 2, 2),
            ("121212", 3, 1),
        ];
        for &(moves, cut_depth, subtree_depth) in cases.iter() {
            let board = Board::from_moves(moves)?;
            let full = sequential(board.clone(), cut_depth + subtree_depth);
            let cut = pipeline(board, cut_depth, subtree_depth)?;
            assert_same_above_cut(&full, ROOT, &cut, ROOT);
        }
        Ok(())
    }

    #[test]
    pub fn task_wire_format() -> Result<()> {
        let mut tree = SearchTree::new(Board::from_moves("4453")?);
        Expander::new(&mut tree).generate(ROOT, 2);
        let tasks = flatten(&tree);
        let task = &tasks[10];

        let decoded = wire::decode_task(&wire::encode_task(task)?)?;
        assert_eq!(decoded.index, task.index);
        assert_eq!(decoded.board, task.board);
        assert_eq!(decoded.whose_turn, task.whose_turn);
        assert_eq!((decoded.node, decoded.parent), (0, None));

        let mut trailing = wire::encode_task(task)?;
        trailing.push(0);
        assert!(wire::decode_task(&trailing).is_err());

        let mut bad_player = wire::encode_task(task)?;
        bad_player[4] = 9;
        assert!(wire::decode_task(&bad_player).is_err());

        // index, turn and board header come before the cells
        let mut floating = wire::encode_task(&flatten(&SearchTree::new(Board::default()))[0])?;
        floating[15 + 7] = Cell::PlayerOne.id();
        assert!(wire::decode_task(&floating).is_err());
        Ok(())
    }

    #[test]
    pub fn result_wire_format() -> Result<()> {
        let mut tree = SearchTree::new(Board::from_moves("112233")?);
        Expander::new(&mut tree).generate(ROOT, 1);
        let results = evaluate_tasks(&flatten(&tree), 2);
        assert!(results.iter().any(|result| result.summary.parent_claim.is_some()));

        assert_eq!(wire::decode_results(&wire::encode_results(&results)?)?, results);
        assert!(wire::decode_results(&wire::encode_results(&[])?)?.is_empty());

        let mut bad_score = results[0];
        bad_score.summary.score = 2.0;
        assert!(wire::decode_results(&wire::encode_results(&[bad_score])?).is_err());

        let control = wire::Control::Search { depth: 4 };
        assert_eq!(wire::decode_control(&wire::encode_control(control)?)?, control);
        assert_eq!(wire::decode_count(&wire::encode_count(12)?)?, 12);
        Ok(())
    }

    #[test]
    pub fn oversized_counts_are_rejected() -> Result<()> {
        assert!(wire::decode_results(&[0xff; 4]).is_err());

        // a 65535x65535 board header with no cells behind it
        let mut task = vec![0, 0, 0, 0, 1, 0xff, 0xff, 0xff, 0xff, 2, 0, 0, 0, 0, 0];
        assert!(wire::decode_task(&task).is_err());
        task.push(0);
        assert!(wire::decode_task(&task).is_err());
        Ok(())
    }

    #[test]
    pub fn transport_keeps_order_per_source_and_tag() -> Result<()> {
        let mut group = local_group(3);
        let mut rank0 = group.remove(0);
        assert!(rank0.send(0, Tag::Task, vec![]).is_err());
        assert!(rank0.send(3, Tag::Task, vec![]).is_err());

        let senders: Vec<_> = group
            .into_iter()
            .map(|transport| {
                thread::spawn(move || -> Result<()> {
                    let rank = transport.rank() as u8;
                    for i in 0..3 {
                        transport.send(0, Tag::Task, vec![rank, i])?;
                    }
                    transport.send(0, Tag::Results, vec![rank])?;
                    transport.barrier();
                    Ok(())
                })
            })
            .collect();

        // ask in a different order from the one the messages were sent in
        assert_eq!(rank0.receive(2, Tag::Results)?, vec![2]);
        for i in 0..3u8 {
            assert_eq!(rank0.receive(1, Tag::Task)?, vec![1, i]);
        }
        assert_eq!(rank0.receive(1, Tag::Results)?, vec![1]);
        for i in 0..3u8 {
            assert_eq!(rank0.receive(2, Tag::Task)?, vec![2, i]);
        }
        rank0.barrier();

        for sender in senders {
            sender.join().map_err(|_| anyhow!("sender thread panicked"))??;
        }
        Ok(())
    }

    #[test]
    pub fn cluster_matches_sequential() -> Result<()> {
        for &size in &[1, 3] {
            let board = Board::from_moves("4")?;
            let full = sequential(board.clone(), 4);
            let (cut, stats) = with_group(size, |transport| {
                let mut tree = SearchTree::new(board);
                let stats = search_round(transport, &mut tree, 4)?;
                Ok((tree, stats))
            })?;

            assert_eq!(stats.cut_depth + stats.subtree_depth, 4);
            assert!(!stats.degenerate);
            assert_same_above_cut(&full, ROOT, &cut, ROOT);
        }
        Ok(())
    }

    #[test]
    pub fn cluster_serves_several_rounds() -> Result<()> {
        let moves = with_group(3, |transport| {
            let mut game = Game::from_board(Board::default(), 3, StdRng::seed_from_u64(1));
            let mut moves = 0;
            for &column in &[3, 3, 2] {
                assert_eq!(game.play_column(column), MoveResult::Playing);
                let cpu_move = game.play_cpu(transport)?.ok_or(anyhow!("no CPU move"))?;
                assert_ne!(cpu_move.outcome, Outcome::ForcedLoss);
                moves += 1;
            }
            Ok(moves)
        })?;
        assert_eq!(moves, 3);
        Ok(())
    }

    #[test]
    pub fn cpu_blocks_a_threat() -> Result<()> {
        let cpu_move = with_group(2, |transport| {
            let mut game = Game::from_board(Board::from_moves("11223")?, 4, StdRng::seed_from_u64(3));
            game.play_cpu(transport)?.ok_or(anyhow!("no CPU move"))
        })?;
        assert_eq!(cpu_move.column, 3);
        assert_eq!(cpu_move.result, MoveResult::Playing);
        Ok(())
    }

    #[test]
    pub fn cpu_takes_a_win() -> Result<()> {
        let cpu_move = with_group(2, |transport| {
            let mut game = Game::from_board(Board::from_moves("1212627")?, 2, StdRng::seed_from_u64(5));
            game.play_cpu(transport)?.ok_or(anyhow!("no CPU move"))
        })?;
        assert_eq!(cpu_move.column, 1);
        assert_eq!(cpu_move.score, 1.0);
        assert_eq!(cpu_move.root.outcome, Outcome::ForcedWin);
        assert_eq!(cpu_move.result, MoveResult::Won(Player::Two));
        Ok(())
    }

    #[test]
    pub fn cpu_plays_on_when_lost() -> Result<()> {
        let cpu_move = with_group(2, |transport| {
            let mut game = Game::from_board(Board::from_moves("22334")?, 2, StdRng::seed_from_u64(9));
            game.play_cpu(transport)?.ok_or(anyhow!("no CPU move"))
        })?;
        assert_eq!(cpu_move.root.outcome, Outcome::ForcedLoss);
        assert_eq!(cpu_move.root.score, -1.0);
        assert_eq!(cpu_move.outcome, Outcome::ForcedLoss);
        Ok(())
    }

    #[test]
    pub fn cpu_blocks_open_three() -> Result<()> {
        // player one holds columns 1-3 of the bottom row with both ends open
        let columns = with_group(3, |transport| {
            let mut columns = Vec::new();
            for seed in 0..5 {
                let mut game = Game::from_board(Board::from_moves("22334")?, 4, StdRng::seed_from_u64(seed));
                let cpu_move = game.play_cpu(transport)?.ok_or(anyhow!("no CPU move"))?;
                columns.push(cpu_move.column);
            }
            Ok(columns)
        })?;
        assert!(columns.iter().all(|&column| column == 0 || column == 4), "{:?}", columns);
        Ok(())
    }

    #[test]
    pub fn first_reply_is_safe() -> Result<()> {
        let outcomes = with_group(4, |transport| {
            let mut outcomes = Vec::new();
            for seed in 0..3 {
                let mut game = Game::from_board(Board::default(), 4, StdRng::seed_from_u64(seed));
                assert_eq!(game.play_column(3), MoveResult::Playing);
                let cpu_move = game.play_cpu(transport)?.ok_or(anyhow!("no CPU move"))?;
                outcomes.push(cpu_move.outcome);
            }
            Ok(outcomes)
        })?;
        assert!(outcomes.iter().all(|&outcome| outcome != Outcome::ForcedLoss), "{:?}", outcomes);
        Ok(())
    }

    #[test]
    pub fn failed_round_leaves_a_fresh_tree() -> Result<()> {
        let mut group = local_group(2);
        let mut rank0 = group.remove(0);
        drop(group);

        let board = Board::from_moves("44")?;
        let mut game = Game::from_board(board.clone(), 3, StdRng::seed_from_u64(0));
        assert!(game.play_cpu(&mut rank0).is_err());
        assert_eq!(game.tree().len(), 1);
        assert!(!game.tree().root().is_settled());
        assert_eq!(game.board(), &board);
        Ok(())
    }

    #[test]
    pub fn no_move_on_a_full_board() -> Result<()> {
        let board = four_by_four_draw()?;
        let cpu_move = with_group(2, |transport| {
            let mut game = Game::from_board(board, 2, StdRng::seed_from_u64(0));
            game.play_cpu(transport)
        })?;
        assert!(cpu_move.is_none());
        Ok(())
    }

    #[test]
    pub fn finished_game_is_searched_locally() -> Result<()> {
        let (tree, stats) = with_group(3, |transport| {
            let mut tree = SearchTree::new(Board::from_moves("1122334")?);
            let stats = search_round(transport, &mut tree, 4)?;
            Ok((tree, stats))
        })?;
        assert!(stats.degenerate);
        assert_eq!(stats.task_count, 1);
        assert_eq!(tree.root().outcome, Outcome::ForcedLoss);
        assert!(select_move(&tree, &mut StdRng::seed_from_u64(0)).is_none());
        Ok(())
    }

    #[test]
    pub fn human_moves() -> Result<()> {
        let mut game = Game::new(&crate::config::Config::default_hardcoded())?;
        assert_eq!(game.whose_turn(), Player::One);
        assert_eq!(game.play_column(7), MoveResult::Invalid);
        assert_eq!(game.whose_turn(), Player::One);
        assert_eq!(game.play_column(0), MoveResult::Playing);
        assert_eq!(game.whose_turn(), Player::Two);
        assert_eq!(game.board().column_height(0), 1);

        game.reset();
        assert_eq!(game.board(), &Board::default());

        let mut game = Game::from_board(Board::from_moves("121212")?, 2, StdRng::seed_from_u64(0));
        assert_eq!(game.play_column(0), MoveResult::Won(Player::One));
        Ok(())
    }
}
