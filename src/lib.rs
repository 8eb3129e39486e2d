//! # Snakebird Solver Library
//!
//! This library simulates Snakebird puzzle levels and searches them for a winning
//! sequence of moves.
//!
//! It is used by two binaries:
//! - `human_player`: Loads a level and lets you play it move by move from the terminal.
//! - `ai_solver`: Loads a level and prints a move string that clears it.
//!
//! ## Modules
//! - `engine`: The board model (`Board`, `Cell`, `GameState`), move application
//!   (motion, pushing, eating, exits and gravity), and an undoable play session (`Game`).
//! - `utils`: Level loading from the text format.
//! - `render`: Plain, fancy and colored text rendering of a state.
//! - `fingerprint`: Content digests of boards, used to detect repeated states.
//! - `heuristics`: The scoring function that orders the solver's frontier.
//! - `cache`: A bounded cache of states reached by move sequences.
//! - `solver`: Best-first search over move sequences.

pub mod cache;
pub mod engine;
pub mod fingerprint;
pub mod heuristics;
pub mod render;
pub mod solver;
pub mod utils;
