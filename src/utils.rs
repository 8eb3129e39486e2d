use crate::engine::{BlockId, Board, Cell, Color, Direction, GameState, Position, Segment};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while decoding a level.
#[derive(Debug, Error)]
pub enum LevelError {
    #[error("failed to read level file: {0}")]
    Io(#[from] std::io::Error),
    #[error("level contains no rows")]
    Empty,
    #[error("unrecognized character '{symbol}' in row {row} col {col}")]
    UnknownSymbol { symbol: char, row: usize, col: usize },
    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("multiple endpoints: {first} and {second}")]
    MultipleEndpoints { first: Position, second: Position },
    #[error("more than one {0} snake head")]
    DuplicateHead(Color),
    #[error("{color} snake segment at {pos} is not connected to a head")]
    DetachedSegment { color: Color, pos: Position },
}

/// What a level character stands for before snake chains are resolved.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Symbol {
    Plain(Cell),
    Head(Color),
    Body(Color),
}

fn decode_symbol(symbol: char) -> Option<Symbol> {
    let decoded = match symbol {
        ' ' | '_' | 'X' | 'O' => Symbol::Plain(Cell::Empty),
        '#' => Symbol::Plain(Cell::Solid),
        '+' => Symbol::Plain(Cell::Hazard),
        'F' => Symbol::Plain(Cell::Fruit),
        '1'..='5' => Symbol::Plain(Cell::Block(BlockId(symbol as u8 - b'0'))),
        'R' => Symbol::Head(Color::Red),
        'G' => Symbol::Head(Color::Green),
        'B' => Symbol::Head(Color::Blue),
        other => Symbol::Body(Color::from_letter(other)?),
    };
    Some(decoded)
}

/// Parses a textual level into its initial `GameState`.
///
/// Each line is one row of the grid, top first. Recognised symbols:
/// - `' '` or `'_'`: empty space
/// - `'#'`: solid ground, `'+'`: spikes, `'F'`: fruit
/// - `'R'`, `'G'`, `'B'`: snake heads; `'r'`, `'g'`, `'b'`: snake bodies
/// - `'1'`..=`'5'`: blocks (cells with the same digit form one block)
/// - `'X'`: teleport, `'O'`: endpoint (both are empty cells on the board)
///
/// Trailing empty lines are ignored. Snake bodies are linked from each head outward by
/// adjacency, preferring up, down, left, then right.
///
/// # Arguments
///
/// * `text` - The level, one line per board row.
///
/// # Returns
///
/// The initial `GameState`, exactly as written (it is not settled).
///
/// # Errors
/// Returns a `LevelError` if a character is unrecognized, rows have different lengths,
/// the level is empty, there is more than one endpoint or head of a color, or a body
/// segment cannot be reached from its head.
///
/// # Examples
/// ```
/// use snakebird_solver::engine::{Cell, Color, Position};
/// use snakebird_solver::utils::load_level;
///
/// let state = load_level("_rR_O\n#####").unwrap();
/// assert_eq!(state.endpoint(), Some(Position::new(0, 4)));
/// assert_eq!(state.board().head(Color::Red), Some(Position::new(0, 2)));
/// assert_eq!(state.board().get(Position::new(1, 0)), Cell::Solid);
///
/// assert!(load_level("rRZ").is_err());
/// ```
pub fn load_level(text: &str) -> Result<GameState, LevelError> {
    let mut lines: Vec<&str> = text.lines().map(|l| l.trim_end_matches('\r')).collect();
    while lines.last().map_or(false, |l| l.is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return Err(LevelError::Empty);
    }

    let width = lines[0].chars().count();
    let height = lines.len();
    let mut symbols = Vec::with_capacity(width * height);
    let mut teleports = BTreeSet::new();
    let mut endpoint: Option<Position> = None;

    for (row, line) in lines.iter().enumerate() {
        let found = line.chars().count();
        if found != width {
            return Err(LevelError::RaggedRow {
                row,
                expected: width,
                found,
            });
        }
        for (col, ch) in line.chars().enumerate() {
            let pos = Position::new(row, col);
            let symbol = decode_symbol(ch).ok_or(LevelError::UnknownSymbol {
                symbol: ch,
                row,
                col,
            })?;
            match ch {
                'X' => {
                    teleports.insert(pos);
                }
                'O' => {
                    if let Some(first) = endpoint {
                        return Err(LevelError::MultipleEndpoints { first, second: pos });
                    }
                    endpoint = Some(pos);
                }
                _ => {}
            }
            symbols.push(symbol);
        }
    }

    let mut board = Board::new_empty(height, width);
    for (i, symbol) in symbols.iter().enumerate() {
        if let Symbol::Plain(cell) = symbol {
            board.set(Position::new(i / width, i % width), *cell);
        }
    }

    let symbol_at = |pos: Position| symbols[pos.row * width + pos.col];
    let mut linked: BTreeSet<Position> = BTreeSet::new();
    for color in Color::ALL {
        let heads: Vec<Position> = (0..symbols.len())
            .map(|i| Position::new(i / width, i % width))
            .filter(|&pos| symbol_at(pos) == Symbol::Head(color))
            .collect();
        let head = match heads.as_slice() {
            [] => continue,
            [head] => *head,
            _ => return Err(LevelError::DuplicateHead(color)),
        };

        let mut chain = vec![head];
        let mut current = head;
        linked.insert(head);
        'walk: loop {
            for direction in [Direction::Up, Direction::Down, Direction::Left, Direction::Right] {
                let Some(next) = current.step(direction, height, width) else {
                    continue;
                };
                if symbol_at(next) == Symbol::Body(color) && !linked.contains(&next) {
                    linked.insert(next);
                    chain.push(next);
                    current = next;
                    continue 'walk;
                }
            }
            break;
        }

        for (index, &pos) in chain.iter().enumerate() {
            let link = index.checked_sub(1).map(|prev| chain[prev]);
            board.set(pos, Cell::Snake(Segment { color, index, link }));
        }
    }

    for (i, symbol) in symbols.iter().enumerate() {
        let pos = Position::new(i / width, i % width);
        if let Symbol::Body(color) = symbol {
            if !linked.contains(&pos) {
                return Err(LevelError::DetachedSegment { color: *color, pos });
            }
        }
    }

    Ok(GameState::new(board, teleports, endpoint))
}

/// Reads and parses a level file. See [`load_level`] for the format.
pub fn load_level_file(path: impl AsRef<Path>) -> Result<GameState, LevelError> {
    let text = fs::read_to_string(path)?;
    load_level(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_level_valid() {
        let state = load_level("__F_X_\n_rrR_O\n######\n").unwrap();
        let board = state.board();
        assert_eq!(board.height(), 3);
        assert_eq!(board.width(), 6);
        assert_eq!(board.get(Position::new(0, 2)), Cell::Fruit);
        assert_eq!(board.get(Position::new(2, 0)), Cell::Solid);
        assert_eq!(state.endpoint(), Some(Position::new(1, 5)));
        assert!(state.teleports().contains(&Position::new(0, 4)));
        assert_eq!(board.get(Position::new(0, 4)), Cell::Empty);
        assert_eq!(
            board.snake_segments(Color::Red),
            vec![
                Position::new(1, 3),
                Position::new(1, 2),
                Position::new(1, 1)
            ]
        );
        assert!(board.chains_are_consistent());
    }

    #[test]
    fn test_load_level_links_bent_snake() {
        let state = load_level("_gg\n_Gg\n###").unwrap();
        let segments = state.board().snake_segments(Color::Green);
        // Up is preferred over right when walking away from the head.
        assert_eq!(
            segments,
            vec![
                Position::new(1, 1),
                Position::new(0, 1),
                Position::new(0, 2),
                Position::new(1, 2)
            ]
        );
        assert!(state.board().chains_are_consistent());
    }

    #[test]
    fn test_load_level_blocks_share_id() {
        let state = load_level("11_2\n####").unwrap();
        let board = state.board();
        assert_eq!(board.get(Position::new(0, 0)), Cell::Block(BlockId(1)));
        assert_eq!(board.get(Position::new(0, 1)), Cell::Block(BlockId(1)));
        assert_eq!(board.get(Position::new(0, 3)), Cell::Block(BlockId(2)));
        assert_eq!(board.entities().len(), 2);
    }

    #[test]
    fn test_load_level_invalid_char() {
        let result = load_level("rRZ");
        assert!(matches!(
            result,
            Err(LevelError::UnknownSymbol { symbol: 'Z', row: 0, col: 2 })
        ));
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("unrecognized character 'Z'"));
    }

    #[test]
    fn test_load_level_ragged_rows() {
        let result = load_level("rR__\n###");
        assert!(matches!(
            result,
            Err(LevelError::RaggedRow { row: 1, expected: 4, found: 3 })
        ));
    }

    #[test]
    fn test_load_level_multiple_endpoints() {
        let result = load_level("O_O\n###");
        assert!(matches!(result, Err(LevelError::MultipleEndpoints { .. })));
    }

    #[test]
    fn test_load_level_duplicate_head() {
        let result = load_level("rR_R\n####");
        assert!(matches!(result, Err(LevelError::DuplicateHead(Color::Red))));
    }

    #[test]
    fn test_load_level_detached_segment() {
        let result = load_level("rR_b\n####");
        assert!(matches!(
            result,
            Err(LevelError::DetachedSegment { color: Color::Blue, .. })
        ));
    }

    #[test]
    fn test_load_level_empty_input() {
        assert!(matches!(load_level(""), Err(LevelError::Empty)));
        assert!(matches!(load_level("\n\n"), Err(LevelError::Empty)));
    }

    #[test]
    fn test_load_level_file_missing() {
        let result = load_level_file("definitely/not/a/level.txt");
        assert!(matches!(result, Err(LevelError::Io(_))));
    }
}
