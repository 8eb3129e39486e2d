//! Text rendering of a `GameState`.
//!
//! Plain output uses the same symbols the level loader reads, so a rendered board can be
//! loaded back. Fancy output swaps in Unicode glyphs, and colored output wraps snakes and
//! blocks in ANSI foreground color codes.
use crate::engine::{BlockId, Cell, Color, GameState, Position};
use std::fmt;

/// Presentation switches for [`render`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Wrap colored entities in ANSI escape codes.
    pub color: bool,
    /// Use Unicode glyphs instead of level symbols.
    pub fancy: bool,
}

const ANSI_RESET: &str = "\x1b[39m";

fn snake_color_code(color: Color) -> &'static str {
    match color {
        Color::Red => "\x1b[31m",
        Color::Green => "\x1b[32m",
        Color::Blue => "\x1b[34m",
    }
}

fn block_color_code(id: BlockId) -> &'static str {
    match id.0 {
        1 => "\x1b[36m",
        2 => "\x1b[33m",
        3 => "\x1b[35m",
        4 => "\x1b[34m",
        _ => "\x1b[32m",
    }
}

/// Glyph for a cell, taking the special (endpoint/teleport) overlays into account.
fn glyph(state: &GameState, pos: Position, cell: Cell, fancy: bool) -> char {
    match cell {
        Cell::Empty if state.endpoint() == Some(pos) => pick(fancy, 'O', '\u{269D}'),
        Cell::Empty if state.teleports().contains(&pos) => pick(fancy, 'X', '\u{2609}'),
        Cell::Empty => ' ',
        Cell::Solid => pick(fancy, '#', '\u{2588}'),
        Cell::Hazard => pick(fancy, '+', '\u{271A}'),
        Cell::Fruit => pick(fancy, 'F', '\u{2764}'),
        Cell::Snake(segment) if segment.is_head() => {
            pick(fancy, segment.color.letter().to_ascii_uppercase(), '\u{263A}')
        }
        Cell::Snake(segment) => pick(fancy, segment.color.letter(), '\u{25CF}'),
        Cell::Block(id) => pick(fancy, char::from(b'0' + id.0), '\u{25A1}'),
    }
}

fn pick(fancy: bool, plain: char, unicode: char) -> char {
    if fancy {
        unicode
    } else {
        plain
    }
}

/// Renders `state` as text, one line per board row.
///
/// # Examples
/// ```
/// use snakebird_solver::render::{render, RenderOptions};
/// use snakebird_solver::utils::load_level;
///
/// let state = load_level("_rR_O\n##+##").unwrap();
/// assert_eq!(render(&state, RenderOptions::default()), " rR O\n##+##");
/// ```
pub fn render(state: &GameState, options: RenderOptions) -> String {
    let mut lines = Vec::with_capacity(state.board().height());
    for (row, cells) in state.board().rows().enumerate() {
        let mut line = String::new();
        for (col, &cell) in cells.iter().enumerate() {
            let code = match cell {
                Cell::Snake(segment) if options.color => Some(snake_color_code(segment.color)),
                Cell::Block(id) if options.color => Some(block_color_code(id)),
                _ => None,
            };
            if let Some(code) = code {
                line.push_str(code);
            }
            line.push(glyph(state, Position::new(row, col), cell, options.fancy));
            if code.is_some() {
                line.push_str(ANSI_RESET);
            }
        }
        lines.push(line);
    }
    lines.join("\n")
}

impl fmt::Display for GameState {
    /// Formats the state with plain, uncolored symbols.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render(self, RenderOptions::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::load_level;

    #[test]
    fn test_render_plain_round_trips_through_loader() {
        let text = "X F  \n gG 1\nrR O1\n##+##";
        let state = load_level(text).unwrap();
        let rendered = render(&state, RenderOptions::default());
        assert_eq!(rendered, "X F  \n gG 1\nrR O1\n##+##");
        assert_eq!(load_level(&rendered).unwrap(), state);
        assert_eq!(state.to_string(), rendered);
    }

    #[test]
    fn test_render_fancy_glyphs() {
        let state = load_level("rRO\n#+F").unwrap();
        let rendered = render(
            &state,
            RenderOptions {
                color: false,
                fancy: true,
            },
        );
        assert_eq!(rendered, "\u{25CF}\u{263A}\u{269D}\n\u{2588}\u{271A}\u{2764}");
    }

    #[test]
    fn test_render_color_wraps_entities_only() {
        let state = load_level("rR1\n###").unwrap();
        let rendered = render(
            &state,
            RenderOptions {
                color: true,
                fancy: false,
            },
        );
        let first_line = rendered.lines().next().unwrap();
        assert_eq!(
            first_line,
            "\x1b[31mr\x1b[39m\x1b[31mR\x1b[39m\x1b[36m1\x1b[39m"
        );
        assert_eq!(rendered.lines().nth(1), Some("###"));
    }
}
