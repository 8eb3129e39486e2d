use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use snakebird_solver::engine::{GameState, Move, MoveStatus};
use snakebird_solver::render::{render, RenderOptions};
use snakebird_solver::solver::{format_moves, Solver, SolverConfig};
use snakebird_solver::utils::load_level_file;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Search a Snakebird level for a winning move sequence", long_about = None)]
struct Args {
    /// Path to the level file
    level_file: PathBuf,

    /// Number of replayed states kept in the move-sequence cache
    #[clap(long, default_value_t = snakebird_solver::cache::DEFAULT_CACHE_CAPACITY)]
    cache_capacity: usize,

    /// Give up after expanding this many states
    #[clap(long)]
    max_expansions: Option<u64>,

    /// Give up after this many seconds
    #[clap(long)]
    time_limit_secs: Option<u64>,

    /// Print every intermediate board of the solution
    #[clap(short, long)]
    replay: bool,

    /// Color snakes and blocks with ANSI escape codes
    #[clap(short, long)]
    color: bool,

    /// Draw boards with Unicode glyphs
    #[clap(short, long)]
    fancy: bool,
}

fn print_replay(initial: &GameState, moves: &[Move], options: RenderOptions) -> Result<()> {
    let mut state = initial.clone();
    for (i, mv) in moves.iter().enumerate() {
        println!("Move {}: {}", i + 1, mv);
        match state.apply_move(*mv)? {
            MoveStatus::Moved(next) => {
                println!("{}\n", render(&next, options));
                state = next;
            }
            MoveStatus::MissionComplete => {
                println!("Level complete.");
                return Ok(());
            }
        }
    }
    bail!("solution {} did not clear the level", format_moves(moves))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let level = load_level_file(&args.level_file)
        .with_context(|| format!("failed to load level from {}", args.level_file.display()))?;
    let options = RenderOptions {
        color: args.color,
        fancy: args.fancy,
    };
    println!("Loaded level from {}\n", args.level_file.display());
    println!("{}\n", render(&level, options));

    let config = SolverConfig {
        cache_capacity: args.cache_capacity,
        max_expansions: args.max_expansions,
        time_limit: args.time_limit_secs.map(Duration::from_secs),
        ..SolverConfig::default()
    };
    let started = Instant::now();
    let mut solver = Solver::new(level.clone(), config);
    let solution = solver.solve().context("search failed")?;
    info!("search took {:?}: {}", started.elapsed(), solution.stats);

    let moves = format_moves(&solution.moves);
    println!("Solution ({} moves): {}", solution.moves.len(), moves);
    if args.replay {
        println!();
        print_replay(&level, &solution.moves, options)?;
    }
    Ok(())
}
