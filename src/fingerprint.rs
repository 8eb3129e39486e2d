//! Canonical digests of boards, used by the solver to recognise states it has already
//! expanded.
use crate::engine::{Board, Cell};
use sha2::{Digest, Sha256};
use std::fmt;

/// A fixed-length digest of a board's full content.
///
/// Identical boards always produce identical fingerprints. Distinct boards colliding is
/// astronomically unlikely, and a collision would only make the solver skip a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Hashes the board dimensions followed by every cell (variant tag plus payload) in
/// row-major order.
///
/// # Examples
/// ```
/// use snakebird_solver::fingerprint::fingerprint;
/// use snakebird_solver::utils::load_level;
///
/// let a = load_level("rR_\n###").unwrap();
/// let b = load_level("_rR\n###").unwrap();
/// assert_eq!(fingerprint(a.board()), fingerprint(a.clone().board()));
/// assert_ne!(fingerprint(a.board()), fingerprint(b.board()));
/// ```
pub fn fingerprint(board: &Board) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update((board.height() as u32).to_le_bytes());
    hasher.update((board.width() as u32).to_le_bytes());
    for cell in board.cells() {
        match *cell {
            Cell::Empty => hasher.update([0u8]),
            Cell::Solid => hasher.update([1u8]),
            Cell::Hazard => hasher.update([2u8]),
            Cell::Fruit => hasher.update([3u8]),
            Cell::Snake(segment) => {
                hasher.update([4u8, segment.color as u8]);
                hasher.update((segment.index as u32).to_le_bytes());
                match segment.link {
                    Some(link) => {
                        hasher.update([1u8]);
                        hasher.update((link.row as u32).to_le_bytes());
                        hasher.update((link.col as u32).to_le_bytes());
                    }
                    None => hasher.update([0u8]),
                }
            }
            Cell::Block(id) => hasher.update([5u8, id.0]),
        }
    }
    Fingerprint(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::load_level;

    #[test]
    fn test_fingerprint_is_stable() {
        let state = load_level("_rR1F\n##+##").unwrap();
        let first = fingerprint(state.board());
        let second = fingerprint(&state.board().clone());
        assert_eq!(first, second);
        let hex: String = first.as_bytes().iter().map(|b| format!("{:02x}", b)).collect();
        assert_eq!(first.to_string(), hex);
        assert_eq!(hex.len(), 64);
    }

    #[test]
    fn test_fingerprint_distinguishes_cell_payloads() {
        let red = load_level("rR_\n###").unwrap();
        let green = load_level("gG_\n###").unwrap();
        let block_one = load_level("1__\n###").unwrap();
        let block_two = load_level("2__\n###").unwrap();
        assert_ne!(fingerprint(red.board()), fingerprint(green.board()));
        assert_ne!(fingerprint(block_one.board()), fingerprint(block_two.board()));
    }

    #[test]
    fn test_fingerprint_includes_dimensions() {
        let wide = load_level("____").unwrap();
        let tall = load_level("__\n__").unwrap();
        assert_ne!(fingerprint(wide.board()), fingerprint(tall.board()));
    }

    #[test]
    fn test_fingerprint_ignores_specials() {
        // Endpoint and teleports never change during a search, only the grid is hashed.
        let plain = load_level("rR__\n####").unwrap();
        let special = load_level("rRXO\n####").unwrap();
        assert_eq!(fingerprint(plain.board()), fingerprint(special.board()));
    }
}
