use crate::engine::GameState;

/// Weights for [`score_state`]. Every term is a cost, so lower scores are better.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeuristicWeights {
    /// Charged once per snake still on the board.
    pub live_snake: i64,
    /// Charged once per fruit still on the board.
    pub fruit: i64,
    /// Per unit of Manhattan distance from every head to every fruit.
    pub fruit_distance: i64,
    /// Extra charge per unit of distance between each fruit and its nearest head.
    pub nearest_fruit: i64,
    /// Per unit of distance from each head to the endpoint, once all fruit is gone.
    pub endpoint_distance: i64,
    /// Extra charge per unit of distance for the head furthest from the endpoint.
    pub straggler: i64,
    /// Charged per move already made.
    pub move_cost: i64,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        HeuristicWeights {
            live_snake: 100,
            fruit: 100,
            fruit_distance: 2,
            nearest_fruit: 5,
            endpoint_distance: 10,
            straggler: 5,
            move_cost: 3,
        }
    }
}

/// Estimates how far `state` is from a cleared level after `moves_so_far` moves.
///
/// The estimate is not admissible: it only orders the solver's frontier and may steer
/// it toward longer solutions than necessary.
///
/// While fruit remains, heads are pulled toward fruit; once all fruit is eaten, heads are
/// pulled toward the endpoint with an additional pull on the furthest one so stragglers
/// are not left behind.
///
/// # Arguments
///
/// * `state` - The state to score.
/// * `moves_so_far` - Length of the move sequence that reached `state`.
/// * `weights` - Coefficients for each term.
///
/// # Returns
///
/// The estimated cost. Lower is better.
///
/// # Examples
/// ```
/// use snakebird_solver::heuristics::{score_state, HeuristicWeights};
/// use snakebird_solver::utils::load_level;
///
/// let weights = HeuristicWeights::default();
/// let far = load_level("rR___O\n######").unwrap();
/// let near = load_level("___rRO\n######").unwrap();
/// assert!(score_state(&near, 0, &weights) < score_state(&far, 0, &weights));
/// assert!(score_state(&near, 0, &weights) < score_state(&near, 5, &weights));
/// ```
pub fn score_state(state: &GameState, moves_so_far: usize, weights: &HeuristicWeights) -> i64 {
    let board = state.board();
    let heads = board.heads();
    let fruit = board.fruit();

    let mut score = weights.live_snake * heads.len() as i64;

    if !fruit.is_empty() {
        // Pull every head toward every fruit, and the closest head a bit harder.
        for &f in &fruit {
            score += weights.fruit;
            let distances = heads.iter().map(|h| h.manhattan(f) as i64);
            score += weights.fruit_distance * distances.clone().sum::<i64>();
            if let Some(nearest) = distances.min() {
                score += weights.nearest_fruit * nearest;
            }
        }
    } else if let Some(endpoint) = state.endpoint() {
        // All fruit eaten: head home.
        let distances = heads.iter().map(|h| h.manhattan(endpoint) as i64);
        score += weights.endpoint_distance * distances.clone().sum::<i64>();
        if let Some(furthest) = distances.max() {
            score += weights.straggler * furthest;
        }
    }

    score + weights.move_cost * moves_so_far as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::load_level;

    #[test]
    fn test_score_counts_live_snakes() {
        let weights = HeuristicWeights::default();
        let one = load_level("rR____\n######").unwrap();
        let two = load_level("rR__gG\n######").unwrap();
        // No endpoint and no fruit: only the per-snake charge applies.
        assert_eq!(score_state(&one, 0, &weights), 100);
        assert_eq!(score_state(&two, 0, &weights), 200);
    }

    #[test]
    fn test_score_with_fruit() {
        let weights = HeuristicWeights::default();
        let state = load_level("rR__F_O\n#######").unwrap();
        // One snake (100), one fruit (100), head at distance 3: 2*3 + 5*3.
        assert_eq!(score_state(&state, 0, &weights), 100 + 100 + 6 + 15);
    }

    #[test]
    fn test_score_nearest_head_only_counts_once_per_fruit() {
        let weights = HeuristicWeights::default();
        let state = load_level("rR_F_Gg\n#######").unwrap();
        // Red head at col 1 (distance 2), green head at col 5 (distance 2).
        let expected = 200 + 100 + 2 * (2 + 2) + 5 * 2;
        assert_eq!(score_state(&state, 0, &weights), expected);
    }

    #[test]
    fn test_score_toward_endpoint_with_straggler() {
        let weights = HeuristicWeights::default();
        let state = load_level("rR__O_Gg\n########").unwrap();
        // Distances to the endpoint: red 3, green 2. Furthest is 3.
        let expected = 200 + 10 * (3 + 2) + 5 * 3;
        assert_eq!(score_state(&state, 0, &weights), expected);
    }

    #[test]
    fn test_score_prefers_fewer_moves() {
        let weights = HeuristicWeights::default();
        let state = load_level("rR_O\n####").unwrap();
        assert_eq!(
            score_state(&state, 4, &weights) - score_state(&state, 0, &weights),
            12
        );
    }

    #[test]
    fn test_custom_weights() {
        let weights = HeuristicWeights {
            live_snake: 1,
            fruit: 0,
            fruit_distance: 0,
            nearest_fruit: 0,
            endpoint_distance: 0,
            straggler: 0,
            move_cost: 0,
        };
        let state = load_level("rR_F_Gg\n#######").unwrap();
        assert_eq!(score_state(&state, 10, &weights), 2);
    }
}
