use anyhow::{anyhow, Result};
use indicatif::{HumanDuration, ProgressBar};
use log::info;

use std::io::{stdin, stdout, Write};
use std::thread;

use connect4_cluster::config::Config;
use connect4_cluster::coordinator::*;
use connect4_cluster::partition::choose_cut_depth;
use connect4_cluster::transport::{local_group, LocalTransport};
use connect4_cluster::tree::MAXIMIZER;

mod display;
use display::*;

fn main() -> Result<()> {
    // default to 'info' unless RUST_LOG says otherwise
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default(),
    };

    let size = config.cluster.processes;
    let width = config.board.width;
    let target_depth = config.search.target_depth;
    let cut_depth = choose_cut_depth(size, width, target_depth);
    info!("Number of processes: {}", size);
    info!("Recommended number of tasks: {}", size * size);
    info!("Initial depth: {}", cut_depth);
    info!("Subtree depth: {}", target_depth - cut_depth);
    info!("Expected number of tasks: {}", width.saturating_pow(cut_depth as u32));

    let mut ranks = local_group(size).into_iter();
    let mut coordinator = ranks
        .next()
        .ok_or_else(|| anyhow!("the group needs at least one process"))?;
    let workers: Vec<_> = ranks
        .map(|mut transport| thread::spawn(move || run_worker(&mut transport)))
        .collect();

    let result = play(&config, &mut coordinator);

    shutdown(&coordinator)?;
    // a worker stuck in a barrier after a failed round never returns, there are no timeouts
    for worker in workers {
        worker
            .join()
            .map_err(|_| anyhow!("worker thread panicked"))??;
    }
    result
}

fn play(config: &Config, transport: &mut LocalTransport) -> Result<()> {
    let mut game = Game::new(config)?;
    let last_column = config.board.width - 1;
    let stdin = stdin();

    println!("Welcome to Connect 4\n");

    // game loop
    loop {
        display(game.board())?;

        print!("Your turn, column (0-{}) > ", last_column);
        stdout().flush()?;
        let mut input_str = String::new();
        if stdin.read_line(&mut input_str)? == 0 {
            // end of input
            println!();
            return Ok(());
        }

        let column = match input_str.trim().parse::<usize>() {
            Ok(column) => column,
            Err(_) => {
                println!("Invalid column number. Please use numbers 0-{}.", last_column);
                continue;
            }
        };

        match game.play_column(column) {
            MoveResult::Invalid => {
                println!("Invalid column number. Please use numbers 0-{}.", last_column);
                continue;
            }
            MoveResult::Won(_) => {
                display(game.board())?;
                println!("\nYou won!\n");
                new_round(&mut game);
                continue;
            }
            MoveResult::Draw => {
                display(game.board())?;
                println!("\nDraw!\n");
                new_round(&mut game);
                continue;
            }
            MoveResult::Playing => display(game.board())?,
        }

        println!("\nCPU turn:");
        let spinner = ProgressBar::new_spinner();
        spinner.set_message("Searching...");
        spinner.enable_steady_tick(100);
        let cpu_move = game.play_cpu(transport);
        spinner.finish_and_clear();

        match cpu_move? {
            None => {
                println!("\nNo moves left, draw!\n");
                new_round(&mut game);
            }
            Some(cpu_move) => {
                println!("Best column: {} ({:.4})", cpu_move.column, cpu_move.score);
                println!("Time: {}", HumanDuration(cpu_move.elapsed));
                match cpu_move.result {
                    MoveResult::Won(player) if player == MAXIMIZER => {
                        display(game.board())?;
                        println!("\nCPU won!\n");
                        new_round(&mut game);
                    }
                    MoveResult::Draw => {
                        display(game.board())?;
                        println!("\nDraw!\n");
                        new_round(&mut game);
                    }
                    _ => {}
                }
            }
        }
    }
}

fn new_round(game: &mut Game) {
    game.reset();
    println!("New Game\n");
}
