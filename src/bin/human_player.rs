use anyhow::{Context, Result};
use clap::Parser;
use snakebird_solver::engine::{Game, Move};
use snakebird_solver::render::{render, RenderOptions};
use snakebird_solver::utils::load_level_file;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Play a Snakebird level in the terminal", long_about = None)]
struct Args {
    /// Path to the level file
    level_file: PathBuf,

    /// Color snakes and blocks with ANSI escape codes
    #[clap(short, long)]
    color: bool,

    /// Draw the board with Unicode glyphs
    #[clap(short, long)]
    fancy: bool,
}

const HELP: &str = "Commands:
  <snake><direction>  move a snake, e.g. 'rd' (snakes: r g b, directions: w a s d)
  u                   undo the last move
  h                   show this help
  q                   quit";

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let level = load_level_file(&args.level_file)
        .with_context(|| format!("failed to load level from {}", args.level_file.display()))?;
    let options = RenderOptions {
        color: args.color,
        fancy: args.fancy,
    };
    let mut game = Game::new(level);
    println!("Welcome to Snakebird!");
    println!("{}", HELP);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        println!("---------------------");
        println!("Steps: {}", game.steps());
        if game.is_complete() {
            println!("Level complete in {} moves! ('u' to undo, 'q' to quit)", game.steps());
        } else {
            println!("{}", render(game.state(), options));
        }

        print!("> ");
        io::stdout().flush().context("failed to flush stdout")?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("failed to read input")?;

        match line.trim() {
            "" => continue,
            "q" => {
                println!("Thanks for playing!");
                break;
            }
            "h" => println!("{}", HELP),
            "u" => {
                if game.undo_last_move() {
                    println!("Move undone.");
                } else {
                    println!("Nothing to undo.");
                }
            }
            command => match command.parse::<Move>() {
                Ok(mv) => {
                    if let Err(e) = game.process_move(mv) {
                        println!("Move rejected: {}", e);
                    }
                }
                Err(e) => println!("{} (type 'h' for help)", e),
            },
        }
    }
    Ok(())
}
