use crate::cache::{ReplayCache, DEFAULT_CACHE_CAPACITY};
use crate::engine::{Direction, GameState, Move, MoveError, MoveStatus};
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::heuristics::{score_state, HeuristicWeights};
use fxhash::FxHashSet;
use log::{debug, info, trace};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Tunables for a [`Solver`].
#[derive(Clone, Debug)]
pub struct SolverConfig {
    /// How many replayed states the move-sequence cache keeps.
    pub cache_capacity: usize,
    /// Stop after expanding this many states (counted over the solver's lifetime).
    pub max_expansions: Option<u64>,
    /// Stop once a single `solve` call has run this long.
    pub time_limit: Option<Duration>,
    /// Log a progress line every this many expansions. `0` disables progress lines.
    pub progress_interval: u64,
    pub weights: HeuristicWeights,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_expansions: None,
            time_limit: None,
            progress_interval: 10_000,
            weights: HeuristicWeights::default(),
        }
    }
}

/// Counters describing the work a search has done.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// States popped from the frontier and expanded.
    pub expanded: u64,
    /// Children pushed onto the frontier.
    pub generated: u64,
    /// Frontier entries skipped because their state was already expanded.
    pub duplicates: u64,
    /// Children not enqueued because their state was already expanded.
    pub pruned: u64,
    /// Candidate moves rejected by the engine.
    pub rejected: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Moves re-applied to rebuild states that were not cached.
    pub replayed_moves: u64,
}

impl fmt::Display for SearchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expanded {}, generated {}, duplicates {}, pruned {}, rejected {}, cache {}/{} hit, replayed {}",
            self.expanded,
            self.generated,
            self.duplicates,
            self.pruned,
            self.rejected,
            self.cache_hits,
            self.cache_hits + self.cache_misses,
            self.replayed_moves
        )
    }
}

/// Why a search stopped before reaching a verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    ExpansionLimit(u64),
    TimeLimit(Duration),
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::ExpansionLimit(limit) => write!(f, "expansion limit of {} reached", limit),
            StopReason::TimeLimit(limit) => write!(f, "time limit of {:?} reached", limit),
            StopReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    /// Every reachable state was expanded without clearing the level.
    #[error("no solution: search space exhausted after expanding {expanded} states")]
    NoSolution { expanded: u64 },
    /// A limit or an external cancellation stopped the search. The solver is left intact
    /// and `solve` may be called again to continue.
    #[error("search interrupted: {0}")]
    Interrupted(StopReason),
    /// Replaying a previously accepted move sequence gave a different outcome.
    #[error("replay failed: {0}")]
    Replay(String),
    #[error(transparent)]
    Engine(#[from] MoveError),
}

/// A winning move sequence together with the statistics of the search that found it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution {
    pub moves: Vec<Move>,
    pub stats: SearchStats,
}

impl fmt::Display for Solution {
    /// Formats the solution as its compact command string, e.g. `rdrdgw`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_moves(&self.moves))
    }
}

/// Concatenates the two-letter commands of `moves`.
pub fn format_moves(moves: &[Move]) -> String {
    moves.iter().map(|m| m.to_string()).collect()
}

/// Parses a compact command string such as `rdrdgw` back into moves.
///
/// # Examples
/// ```
/// use snakebird_solver::solver::{format_moves, parse_moves};
/// let moves = parse_moves("rdgw").unwrap();
/// assert_eq!(moves.len(), 2);
/// assert_eq!(format_moves(&moves), "rdgw");
/// assert!(parse_moves("rdg").is_err());
/// ```
pub fn parse_moves(text: &str) -> Result<Vec<Move>, MoveError> {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.len() % 2 != 0 {
        return Err(MoveError::Invalid(format!(
            "move string '{}' has an odd number of letters",
            text
        )));
    }
    chars
        .chunks(2)
        .map(|pair| pair.iter().collect::<String>().parse())
        .collect()
}

/// Applies `moves` to `initial` one after another.
///
/// Stops at the first rejected move. A `MissionComplete` before the last move is reported
/// as an invalid move, since no state remains to continue from.
pub fn replay(initial: &GameState, moves: &[Move]) -> Result<MoveStatus, MoveError> {
    let mut status = MoveStatus::Moved(initial.clone());
    for (i, &mv) in moves.iter().enumerate() {
        status = match status {
            MoveStatus::Moved(state) => state.apply_move(mv)?,
            MoveStatus::MissionComplete => {
                return Err(MoveError::Invalid(format!(
                    "level already complete before move {} ({})",
                    i + 1,
                    mv
                )));
            }
        };
    }
    Ok(status)
}

/// A frontier entry. Ordered by score, then by insertion order so equal scores expand
/// first-in first-out.
struct SearchNode {
    score: i64,
    order: u64,
    moves: Vec<Move>,
}

impl PartialEq for SearchNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchNode {}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.score, self.order).cmp(&(other.score, other.order))
    }
}

/// Best-first search over move sequences.
///
/// The frontier stores move sequences rather than states; a popped sequence is rebuilt by
/// replaying it from the longest cached prefix. States already expanded are tracked by
/// fingerprint and never expanded twice.
///
/// # Examples
/// ```
/// use snakebird_solver::solver::{Solver, SolverConfig};
/// use snakebird_solver::utils::load_level;
///
/// let level = load_level("rR_O\n####").unwrap();
/// let mut solver = Solver::new(level, SolverConfig::default());
/// let solution = solver.solve().unwrap();
/// assert_eq!(solution.to_string(), "rdrd");
/// ```
pub struct Solver {
    initial: GameState,
    config: SolverConfig,
    frontier: BinaryHeap<Reverse<SearchNode>>,
    visited: FxHashSet<Fingerprint>,
    cache: ReplayCache,
    counter: u64,
    stats: SearchStats,
    cancel: Option<Arc<AtomicBool>>,
    solution: Option<Vec<Move>>,
}

impl Solver {
    /// Creates a solver seeded with the empty move sequence.
    ///
    /// # Arguments
    ///
    /// * `initial` - The level as loaded. Moves are replayed from this state.
    /// * `config` - Cache size, search limits and heuristic weights.
    ///
    /// # Returns
    ///
    /// A solver whose frontier holds only the initial state. Nothing is searched until
    /// [`Solver::solve`] is called.
    pub fn new(initial: GameState, config: SolverConfig) -> Self {
        let cache = ReplayCache::new(config.cache_capacity);
        let mut solver = Solver {
            initial,
            config,
            frontier: BinaryHeap::new(),
            visited: FxHashSet::default(),
            cache,
            counter: 0,
            stats: SearchStats::default(),
            cancel: None,
            solution: None,
        };
        solver.cache.insert(Vec::new(), solver.initial.clone());
        let score = score_state(&solver.initial, 0, &solver.config.weights);
        solver.enqueue(score, Vec::new());
        solver
    }

    /// Installs a flag that, once set, makes the running search stop at its next
    /// iteration with [`StopReason::Cancelled`].
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn set_max_expansions(&mut self, limit: Option<u64>) {
        self.config.max_expansions = limit;
    }

    pub fn set_time_limit(&mut self, limit: Option<Duration>) {
        self.config.time_limit = limit;
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    /// Number of move sequences waiting to be expanded.
    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    /// Number of distinct states expanded so far.
    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    fn enqueue(&mut self, score: i64, moves: Vec<Move>) {
        let order = self.counter;
        self.counter += 1;
        self.frontier.push(Reverse(SearchNode {
            score,
            order,
            moves,
        }));
    }

    fn stop_reason(&self, started: Instant) -> Option<StopReason> {
        if let Some(flag) = &self.cancel {
            if flag.load(atomic::Ordering::Relaxed) {
                return Some(StopReason::Cancelled);
            }
        }
        if let Some(limit) = self.config.max_expansions {
            if self.stats.expanded >= limit {
                return Some(StopReason::ExpansionLimit(limit));
            }
        }
        if let Some(limit) = self.config.time_limit {
            if started.elapsed() >= limit {
                return Some(StopReason::TimeLimit(limit));
            }
        }
        None
    }

    /// Rebuilds the state reached by `moves`, starting from the longest cached prefix.
    fn reconstruct(&mut self, moves: &[Move]) -> Result<GameState, SolveError> {
        // The empty sequence may have been evicted too; then start from the level itself.
        let (start, mut state) = match self.cache.longest_prefix(moves) {
            Some(hit) => {
                self.stats.cache_hits += 1;
                hit
            }
            None => {
                self.stats.cache_misses += 1;
                (0, self.initial.clone())
            }
        };
        for &mv in &moves[start..] {
            self.stats.replayed_moves += 1;
            state = match state.apply_move(mv) {
                Ok(MoveStatus::Moved(next)) => next,
                Ok(MoveStatus::MissionComplete) => {
                    return Err(SolveError::Replay(format!(
                        "{} completed the level before the end of {}",
                        mv,
                        format_moves(moves)
                    )));
                }
                Err(e) => {
                    return Err(SolveError::Replay(format!(
                        "{} was rejected while replaying {}: {}",
                        mv,
                        format_moves(moves),
                        e
                    )));
                }
            };
        }
        Ok(state)
    }

    /// Runs the search until a solution is found, the frontier is exhausted, or a limit
    /// stops it.
    ///
    /// After an [`SolveError::Interrupted`] the frontier, visited set and cache are left
    /// consistent, so calling `solve` again (typically after raising a limit) resumes the
    /// search where it stopped. Once a solution has been found, further calls return it
    /// again.
    pub fn solve(&mut self) -> Result<Solution, SolveError> {
        // Already solved on an earlier call.
        if let Some(moves) = &self.solution {
            return Ok(Solution {
                moves: moves.clone(),
                stats: self.stats,
            });
        }
        let started = Instant::now();

        loop {
            // Limits are only checked here, between expansions, so an interrupted search
            // never leaves a node half expanded.
            if let Some(reason) = self.stop_reason(started) {
                debug!("search stopped: {} ({})", reason, self.stats);
                return Err(SolveError::Interrupted(reason));
            }

            let Some(Reverse(node)) = self.frontier.pop() else {
                debug!("frontier exhausted ({})", self.stats);
                return Err(SolveError::NoSolution {
                    expanded: self.stats.expanded,
                });
            };

            let state = self.reconstruct(&node.moves)?;
            // The same state may be queued under several move sequences; expand it once.
            if !self.visited.insert(fingerprint(state.board())) {
                self.stats.duplicates += 1;
                continue;
            }
            self.stats.expanded += 1;
            if self.config.progress_interval > 0
                && self.stats.expanded % self.config.progress_interval == 0
            {
                info!(
                    "{} (visited {}, frontier {}, best score {}, depth {})",
                    self.stats,
                    self.visited_len(),
                    self.frontier_len(),
                    node.score,
                    node.moves.len()
                );
            }

            // Try every direction for every snake still on the board.
            for color in state.board().snake_colors() {
                for direction in Direction::ALL {
                    let mv = Move::new(color, direction);
                    let mut moves = Vec::with_capacity(node.moves.len() + 1);
                    moves.extend_from_slice(&node.moves);
                    moves.push(mv);

                    match state.apply_move(mv) {
                        Ok(MoveStatus::MissionComplete) => {
                            info!(
                                "solved in {} moves: {} ({})",
                                moves.len(),
                                format_moves(&moves),
                                self.stats
                            );
                            self.solution = Some(moves.clone());
                            return Ok(Solution {
                                moves,
                                stats: self.stats,
                            });
                        }
                        Ok(MoveStatus::Moved(next)) => {
                            // Already expanded through another sequence.
                            if self.visited.contains(&fingerprint(next.board())) {
                                self.stats.pruned += 1;
                                continue;
                            }
                            let score = score_state(&next, moves.len(), &self.config.weights);
                            // Cache the child so popping it later needs no replay.
                            self.cache.insert(moves.clone(), next);
                            self.enqueue(score, moves);
                            self.stats.generated += 1;
                        }
                        // A board that never settles is an engine bug, not a bad move.
                        Err(e @ MoveError::Unsettled { .. }) => return Err(e.into()),
                        Err(e) => {
                            trace!("{}{} rejected: {}", format_moves(&node.moves), mv, e);
                            self.stats.rejected += 1;
                        }
                    }
                }
            }
        }
    }
}

/// Solves `initial` with the default configuration.
pub fn solve(initial: &GameState) -> Result<Solution, SolveError> {
    Solver::new(initial.clone(), SolverConfig::default()).solve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::load_level;

    fn level(rows: &[&str]) -> GameState {
        load_level(&rows.join("\n")).unwrap()
    }

    fn assert_solves(initial: &GameState, solution: &Solution) {
        assert_eq!(
            replay(initial, &solution.moves),
            Ok(MoveStatus::MissionComplete),
            "solution {} does not clear the level",
            solution
        );
    }

    #[test]
    fn test_solve_straight_walk() {
        let initial = level(&["rR_O", "####"]);
        let solution = solve(&initial).unwrap();
        assert_eq!(format_moves(&solution.moves), "rdrd");
        assert_solves(&initial, &solution);
    }

    #[test]
    fn test_solve_requires_eating_fruit_first() {
        let initial = level(&["_____", "O_rRF", "#####"]);
        let solution = solve(&initial).unwrap();
        assert_eq!(solution.moves[0], "rd".parse::<Move>().unwrap());
        assert_solves(&initial, &solution);
    }

    #[test]
    fn test_solve_two_snakes() {
        let initial = level(&["rR_O_Gg", "#######"]);
        let solution = solve(&initial).unwrap();
        assert_eq!(solution.moves.len(), 4);
        assert_solves(&initial, &solution);
    }

    #[test]
    fn test_solve_with_block_push() {
        let initial = level(&["_______", "rR1___O", "###_###", "###_###"]);
        let solution = solve(&initial).unwrap();
        assert_solves(&initial, &solution);
    }

    #[test]
    fn test_no_solution_when_stuck() {
        let initial = level(&["rR#O", "####"]);
        let result = solve(&initial);
        assert_eq!(result, Err(SolveError::NoSolution { expanded: 1 }));
    }

    #[test]
    fn test_no_solution_without_snakes() {
        let initial = level(&["__O", "###"]);
        assert!(matches!(solve(&initial), Err(SolveError::NoSolution { .. })));
    }

    #[test]
    fn test_solver_is_deterministic() {
        let initial = level(&["_____", "O_rRF", "#####"]);
        let first = solve(&initial).unwrap();
        let second = solve(&initial).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_expansion_limit_interrupts_and_resumes() {
        let initial = level(&["_____", "O_rRF", "#####"]);
        let config = SolverConfig {
            max_expansions: Some(1),
            ..SolverConfig::default()
        };
        let mut solver = Solver::new(initial.clone(), config);
        assert_eq!(
            solver.solve(),
            Err(SolveError::Interrupted(StopReason::ExpansionLimit(1)))
        );
        assert_eq!(solver.stats().expanded, 1);
        assert_eq!(solver.visited_len(), 1);
        assert!(solver.frontier_len() > 0);

        solver.set_max_expansions(None);
        let solution = solver.solve().unwrap();
        assert_solves(&initial, &solution);
        assert_eq!(solver.solve().unwrap().moves, solution.moves);
        assert_eq!(solution, solve(&initial).unwrap());
    }

    #[test]
    fn test_cancel_flag_stops_search() {
        let initial = level(&["rR_O", "####"]);
        let flag = Arc::new(AtomicBool::new(true));
        let mut solver =
            Solver::new(initial, SolverConfig::default()).with_cancel_flag(flag.clone());
        assert_eq!(
            solver.solve(),
            Err(SolveError::Interrupted(StopReason::Cancelled))
        );
        assert_eq!(solver.stats().expanded, 0);

        flag.store(false, atomic::Ordering::Relaxed);
        assert!(solver.solve().is_ok());
    }

    #[test]
    fn test_zero_time_limit_interrupts() {
        let initial = level(&["rR_O", "####"]);
        let config = SolverConfig {
            time_limit: Some(Duration::ZERO),
            ..SolverConfig::default()
        };
        let mut solver = Solver::new(initial, config);
        assert!(matches!(
            solver.solve(),
            Err(SolveError::Interrupted(StopReason::TimeLimit(_)))
        ));
    }

    #[test]
    fn test_search_uses_replay_cache() {
        let initial = level(&["_____", "O_rRF", "#####"]);
        let mut solver = Solver::new(initial.clone(), SolverConfig::default());
        solver.solve().unwrap();
        let stats = solver.stats();
        assert!(stats.cache_hits > 0);
        assert!(stats.cache_hits + stats.cache_misses >= stats.expanded);

        let tiny = SolverConfig {
            cache_capacity: 0,
            ..SolverConfig::default()
        };
        let mut uncached = Solver::new(initial, tiny);
        let solution = uncached.solve().unwrap();
        assert_eq!(uncached.stats().cache_hits, 0);
        assert!(uncached.stats().replayed_moves > 0);
        assert_eq!(solution.moves, solver.solve().unwrap().moves);
    }

    #[test]
    fn test_parse_and_format_moves() {
        let moves = parse_moves("rd gw ba").unwrap();
        assert_eq!(format_moves(&moves), "rdgwba");
        assert!(matches!(parse_moves("rx"), Err(MoveError::Invalid(_))));
        assert!(parse_moves("").unwrap().is_empty());
    }

    #[test]
    fn test_replay_stops_after_completion() {
        let initial = level(&["rR_O", "####"]);
        let moves = parse_moves("rdrdrd").unwrap();
        assert!(matches!(
            replay(&initial, &moves),
            Err(MoveError::Invalid(_))
        ));
    }

    #[test]
    fn test_search_node_orders_by_score_then_fifo() {
        let mut heap = BinaryHeap::new();
        heap.push(Reverse(SearchNode { score: 5, order: 0, moves: Vec::new() }));
        heap.push(Reverse(SearchNode { score: 3, order: 2, moves: Vec::new() }));
        heap.push(Reverse(SearchNode { score: 3, order: 1, moves: Vec::new() }));
        let order: Vec<u64> =
            std::iter::from_fn(|| heap.pop().map(|Reverse(n)| n.order)).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }
}
