//! Core game engine for the Snakebird puzzle.
//!
//! This module defines the game's fundamental components:
//! - `Cell`: The content of one grid position (ground, spikes, fruit, snake segments, blocks).
//! - `Board`: The dense grid of cells plus queries over the entities living on it.
//! - `GameState`: A board together with its teleports and endpoint. Every accepted move
//!   produces a new `GameState`; existing values are never mutated.
//! - `Game`: An interactive session wrapper with a move history for undo.
//!
//! Moves are resolved in a fixed order: validation, target classification (advance, eat,
//! push), end resolution, then gravity repeated until nothing falls any more.
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A (row, column) coordinate into the grid. `(0, 0)` is the top-left corner and rows
/// grow downwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Position { row, col }
    }

    /// Returns the neighbouring position in `direction`, or `None` if that neighbour
    /// would lie outside a grid of `height` x `width` cells.
    ///
    /// # Examples
    /// ```
    /// use snakebird_solver::engine::{Direction, Position};
    /// let p = Position::new(0, 3);
    /// assert_eq!(p.step(Direction::Up, 2, 4), None);
    /// assert_eq!(p.step(Direction::Right, 2, 4), None);
    /// assert_eq!(p.step(Direction::Down, 2, 4), Some(Position::new(1, 3)));
    /// ```
    pub fn step(self, direction: Direction, height: usize, width: usize) -> Option<Position> {
        let (d_row, d_col) = direction.delta();
        self.translate(d_row, d_col)
            .filter(|p| p.row < height && p.col < width)
    }

    /// Offsets the position without any upper bound check.
    fn translate(self, d_row: isize, d_col: isize) -> Option<Position> {
        Some(Position {
            row: self.row.checked_add_signed(d_row)?,
            col: self.col.checked_add_signed(d_col)?,
        })
    }

    /// Manhattan distance between two positions.
    pub fn manhattan(self, other: Position) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// One of the four cardinal directions a snake can be commanded to move in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// All directions, in the order the solver tries them.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Left,
        Direction::Down,
        Direction::Right,
    ];

    fn delta(self) -> (isize, isize) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }

    /// The `wasd` command letter for this direction.
    pub fn letter(self) -> char {
        match self {
            Direction::Up => 'w',
            Direction::Left => 'a',
            Direction::Down => 's',
            Direction::Right => 'd',
        }
    }

    pub fn from_letter(letter: char) -> Option<Direction> {
        Direction::ALL.into_iter().find(|d| d.letter() == letter)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        };
        f.write_str(name)
    }
}

/// The color of a snake. A level holds at most one snake per color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Color {
    Red,
    Green,
    Blue,
}

impl Color {
    pub const ALL: [Color; 3] = [Color::Red, Color::Green, Color::Blue];

    /// The lowercase letter used both for body segments in level files and for
    /// selecting the snake in move commands.
    pub fn letter(self) -> char {
        match self {
            Color::Red => 'r',
            Color::Green => 'g',
            Color::Blue => 'b',
        }
    }

    pub fn from_letter(letter: char) -> Option<Color> {
        Color::ALL.into_iter().find(|c| c.letter() == letter)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Color::Red => "red",
            Color::Green => "green",
            Color::Blue => "blue",
        };
        f.write_str(name)
    }
}

/// Identifies a block. All cells carrying the same id move as one rigid body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u8);

/// One cell-sized piece of a snake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Segment {
    pub color: Color,
    /// Position in the chain, `0` is the head.
    pub index: usize,
    /// Where the next segment toward the head sits. `None` for the head itself.
    pub link: Option<Position>,
}

impl Segment {
    pub fn is_head(&self) -> bool {
        self.index == 0
    }
}

/// The content of a single grid position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Cell {
    #[default]
    Empty,
    Solid,
    /// Spikes: snakes touching them while falling die.
    Hazard,
    Fruit,
    Snake(Segment),
    Block(BlockId),
}

impl Cell {
    /// The movable entity this cell belongs to, if any.
    pub fn entity(self) -> Option<Entity> {
        match self {
            Cell::Snake(segment) => Some(Entity::Snake(segment.color)),
            Cell::Block(id) => Some(Entity::Block(id)),
            _ => None,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Cell::Empty => "empty space",
            Cell::Solid => "solid ground",
            Cell::Hazard => "spikes",
            Cell::Fruit => "fruit",
            Cell::Snake(_) => "a snake",
            Cell::Block(_) => "a block",
        }
    }

    /// Moves a snake segment's link along with the segment itself.
    fn translated(self, d_row: isize, d_col: isize) -> Cell {
        match self {
            Cell::Snake(segment) => Cell::Snake(Segment {
                link: segment.link.and_then(|l| l.translate(d_row, d_col)),
                ..segment
            }),
            other => other,
        }
    }
}

/// Something that can be pushed and can fall: a whole snake or a whole block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Entity {
    Snake(Color),
    Block(BlockId),
}

/// A commanded move: which snake, which way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Move {
    pub color: Color,
    pub direction: Direction,
}

impl Move {
    pub fn new(color: Color, direction: Direction) -> Self {
        Move { color, direction }
    }
}

impl fmt::Display for Move {
    /// Formats the move as its two-letter command, e.g. `rd` for "red right".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.color.letter(), self.direction.letter())
    }
}

impl FromStr for Move {
    type Err = MoveError;

    /// Parses a `<snake-letter><direction-letter>` command such as `rd` or `gw`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(c), Some(d), None) => {
                let color = Color::from_letter(c)
                    .ok_or_else(|| MoveError::Invalid(format!("unknown snake '{}'", c)))?;
                let direction = Direction::from_letter(d)
                    .ok_or_else(|| MoveError::Invalid(format!("unknown direction '{}'", d)))?;
                Ok(Move { color, direction })
            }
            _ => Err(MoveError::Invalid(format!(
                "expected a two letter command, got '{}'",
                s
            ))),
        }
    }
}

/// Why a move was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    /// Malformed input: unknown snake, the snake is not on the board, or the move
    /// points off the grid.
    #[error("invalid move: {0}")]
    Invalid(String),
    /// The game rules block the move.
    #[error("illegal move: {0}")]
    Illegal(String),
    /// The move would kill a snake.
    #[error("unsafe move: {0}")]
    Unsafe(String),
    /// Gravity failed to come to rest within its safety bound. This indicates a bug in
    /// the engine, not a game outcome.
    #[error("gravity did not settle after {steps} steps")]
    Unsettled { steps: usize },
}

/// The successful outcome of a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveStatus {
    /// The move was accepted and produced this new state.
    Moved(GameState),
    /// The last snake left through the endpoint: the level is cleared.
    MissionComplete,
}

/// The game board as a dense 2D grid of `Cell`s, stored row-major.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Board {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Board {
    /// Creates a board of `height` rows by `width` columns where every cell is `Cell::Empty`.
    pub fn new_empty(height: usize, width: usize) -> Self {
        Board {
            width,
            height,
            cells: vec![Cell::Empty; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the cell at `pos`.
    ///
    /// # Panics
    /// Panics if `pos` is outside the board.
    pub fn get(&self, pos: Position) -> Cell {
        self.cells[self.index(pos)]
    }

    /// Overwrites the cell at `pos`.
    ///
    /// # Panics
    /// Panics if `pos` is outside the board.
    pub fn set(&mut self, pos: Position, cell: Cell) {
        let idx = self.index(pos);
        self.cells[idx] = cell;
    }

    fn index(&self, pos: Position) -> usize {
        assert!(
            pos.row < self.height && pos.col < self.width,
            "position {} outside {}x{} board",
            pos,
            self.height,
            self.width
        );
        pos.row * self.width + pos.col
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Iterates over the rows of the board, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> + '_ {
        self.cells.chunks(self.width.max(1))
    }

    /// Iterates over every position paired with its cell, row-major.
    pub fn iter(&self) -> impl Iterator<Item = (Position, Cell)> + '_ {
        let width = self.width.max(1);
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, &cell)| (Position::new(i / width, i % width), cell))
    }

    /// Position of the head of the `color` snake, if that snake is on the board.
    pub fn head(&self, color: Color) -> Option<Position> {
        self.iter().find_map(|(pos, cell)| match cell {
            Cell::Snake(s) if s.color == color && s.is_head() => Some(pos),
            _ => None,
        })
    }

    /// Positions of the `color` snake's segments ordered from head to tail.
    pub fn snake_segments(&self, color: Color) -> Vec<Position> {
        let mut segments: Vec<(usize, Position)> = self
            .iter()
            .filter_map(|(pos, cell)| match cell {
                Cell::Snake(s) if s.color == color => Some((s.index, pos)),
                _ => None,
            })
            .collect();
        segments.sort_unstable();
        segments.into_iter().map(|(_, pos)| pos).collect()
    }

    /// Colors of all snakes that still have a head on the board.
    pub fn snake_colors(&self) -> Vec<Color> {
        Color::ALL
            .into_iter()
            .filter(|&color| self.head(color).is_some())
            .collect()
    }

    /// Heads of all living snakes.
    pub fn heads(&self) -> Vec<Position> {
        self.iter()
            .filter_map(|(pos, cell)| match cell {
                Cell::Snake(s) if s.is_head() => Some(pos),
                _ => None,
            })
            .collect()
    }

    pub fn fruit(&self) -> Vec<Position> {
        self.iter()
            .filter(|&(_, cell)| cell == Cell::Fruit)
            .map(|(pos, _)| pos)
            .collect()
    }

    pub fn has_fruit(&self) -> bool {
        self.cells.iter().any(|&c| c == Cell::Fruit)
    }

    pub fn has_snakes(&self) -> bool {
        self.cells.iter().any(|c| matches!(c, Cell::Snake(_)))
    }

    /// Groups the cells of every movable entity, keyed by entity. Cells within an entity
    /// are listed in row-major order.
    pub fn entities(&self) -> BTreeMap<Entity, Vec<Position>> {
        let mut entities: BTreeMap<Entity, Vec<Position>> = BTreeMap::new();
        for (pos, cell) in self.iter() {
            if let Some(entity) = cell.entity() {
                entities.entry(entity).or_default().push(pos);
            }
        }
        entities
    }

    fn entity_cells(&self, entity: Entity) -> Vec<Position> {
        self.iter()
            .filter(|&(_, cell)| cell.entity() == Some(entity))
            .map(|(pos, _)| pos)
            .collect()
    }

    /// Checks the snake chain invariant for every color: indices form a contiguous run
    /// from `0`, and following links from any segment reaches the head in exactly
    /// `index` steps.
    pub fn chains_are_consistent(&self) -> bool {
        Color::ALL.into_iter().all(|color| {
            let mut by_index: Vec<(usize, Position, Option<Position>)> = self
                .iter()
                .filter_map(|(pos, cell)| match cell {
                    Cell::Snake(s) if s.color == color => Some((s.index, pos, s.link)),
                    _ => None,
                })
                .collect();
            by_index.sort_unstable_by_key(|&(index, _, _)| index);
            by_index.iter().enumerate().all(|(expected, &(index, pos, link))| {
                if index != expected {
                    return false;
                }
                match (index, link) {
                    (0, None) => true,
                    (0, Some(_)) | (_, None) => false,
                    (_, Some(link)) => {
                        let (_, previous, _) = by_index[index - 1];
                        link == previous && link.manhattan(pos) == 1
                    }
                }
            })
        })
    }

    /// Writes the `color` snake onto the board along `positions` (head first),
    /// recomputing every link.
    fn place_snake(&mut self, color: Color, positions: &[Position]) {
        for (index, &pos) in positions.iter().enumerate() {
            let link = index.checked_sub(1).map(|prev| positions[prev]);
            self.set(pos, Cell::Snake(Segment { color, index, link }));
        }
    }

    fn remove_snake(&mut self, color: Color) {
        for cell in self.cells.iter_mut() {
            if matches!(cell, Cell::Snake(s) if s.color == color) {
                *cell = Cell::Empty;
            }
        }
    }

    /// Moves the `color` snake's head into `target` and drags the body along. When
    /// `grow` is set the tail stays where it was, lengthening the snake by one.
    fn advance(&mut self, color: Color, target: Position, grow: bool) {
        let old = self.snake_segments(color);
        let kept = if grow { old.len() } else { old.len().saturating_sub(1) };
        let mut new_positions = Vec::with_capacity(kept + 1);
        new_positions.push(target);
        new_positions.extend_from_slice(&old[..kept]);
        for &pos in &old {
            self.set(pos, Cell::Empty);
        }
        self.place_snake(color, &new_positions);
    }

    /// Pushes `first` (and everything it transitively shoves) one cell in `direction`.
    ///
    /// The whole push group is gathered and validated before anything is written, so a
    /// failed push leaves the board untouched.
    fn push(&mut self, first: Entity, direction: Direction, pusher: Color) -> Result<(), MoveError> {
        let mut group = BTreeSet::new();
        let mut pending = vec![first];
        let mut moves: Vec<(Position, Position)> = Vec::new();

        while let Some(entity) = pending.pop() {
            if !group.insert(entity) {
                continue;
            }
            if entity == Entity::Snake(pusher) {
                return Err(MoveError::Illegal(format!(
                    "the {} snake would push itself",
                    pusher
                )));
            }
            for pos in self.entity_cells(entity) {
                let target = pos
                    .step(direction, self.height, self.width)
                    .ok_or_else(|| MoveError::Illegal("cannot push off the board".to_string()))?;
                match self.get(target) {
                    Cell::Empty => {}
                    cell @ (Cell::Solid | Cell::Hazard | Cell::Fruit) => {
                        return Err(MoveError::Illegal(format!(
                            "cannot push into {}",
                            cell.describe()
                        )));
                    }
                    cell => {
                        if let Some(other) = cell.entity() {
                            if !group.contains(&other) {
                                pending.push(other);
                            }
                        }
                    }
                }
                moves.push((pos, target));
            }
        }

        let (d_row, d_col) = direction.delta();
        let lifted: Vec<(Position, Cell)> = moves
            .iter()
            .map(|&(from, to)| (to, self.get(from).translated(d_row, d_col)))
            .collect();
        for &(from, _) in &moves {
            self.set(from, Cell::Empty);
        }
        for (to, cell) in lifted {
            self.set(to, cell);
        }
        trace!("pushed {:?} {}", group, direction);
        Ok(())
    }
}

/// Fall distance meaning "nothing below ever stops this entity".
const FALLS_OFF: usize = usize::MAX;

/// What holds an entity up, gathered column by column beneath each of its cells.
struct Support {
    /// Rows it can drop before static ground (or the endpoint, for a head) stops it.
    ground: usize,
    /// Rows until a snake segment would land on spikes.
    spikes: usize,
    /// `(other, gap)`: resting on `other` after falling `gap` rows plus however far
    /// `other` itself falls.
    resting_on: Vec<(Entity, usize)>,
}

/// A board together with its special positions. This is the value the transition
/// engine maps to a new value on every accepted move.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GameState {
    board: Board,
    teleports: BTreeSet<Position>,
    endpoint: Option<Position>,
}

impl GameState {
    pub fn new(board: Board, teleports: BTreeSet<Position>, endpoint: Option<Position>) -> Self {
        GameState {
            board,
            teleports,
            endpoint,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Teleport cells. They are loaded and rendered but behave as empty space for
    /// movement and gravity.
    pub fn teleports(&self) -> &BTreeSet<Position> {
        &self.teleports
    }

    pub fn endpoint(&self) -> Option<Position> {
        self.endpoint
    }

    /// Applies `mv` and returns the resulting state, or reports why the move is rejected.
    ///
    /// `self` is never modified; a rejected move leaves the caller's state exactly as it was.
    ///
    /// # Arguments
    ///
    /// * `mv` - The snake to command and the direction to move its head.
    ///
    /// # Returns
    ///
    /// * `Ok(MoveStatus::Moved(next))` - The settled state after the move.
    /// * `Ok(MoveStatus::MissionComplete)` - The last snake left through the endpoint.
    /// * `Err(MoveError::Invalid(_))` - No such snake, or the head would leave the grid.
    /// * `Err(MoveError::Illegal(_))` - The head or a pushed entity is blocked.
    /// * `Err(MoveError::Unsafe(_))` - A snake would fall onto spikes or off the board.
    ///
    /// # Examples
    /// ```
    /// use snakebird_solver::engine::{Color, Direction, Move, MoveStatus};
    /// use snakebird_solver::utils::load_level;
    ///
    /// let state = load_level("_rrrR__\n#######").unwrap();
    /// let moved = state.apply_move(Move::new(Color::Red, Direction::Right)).unwrap();
    /// let expected = load_level("__rrrR_\n#######").unwrap();
    /// assert_eq!(moved, MoveStatus::Moved(expected));
    /// ```
    pub fn apply_move(&self, mv: Move) -> Result<MoveStatus, MoveError> {
        // Work on a copy so a rejection anywhere below leaves `self` untouched.
        let mut board = self.board.clone();
        let head = board
            .head(mv.color)
            .ok_or_else(|| MoveError::Invalid(format!("there is no {} snake", mv.color)))?;
        let target = head
            .step(mv.direction, board.height, board.width)
            .ok_or_else(|| {
                MoveError::Invalid(format!(
                    "the {} snake cannot move {} off the board",
                    mv.color, mv.direction
                ))
            })?;

        match board.get(target) {
            // Teleports are plain empty cells as far as movement is concerned.
            Cell::Empty => board.advance(mv.color, target, false),
            Cell::Fruit => board.advance(mv.color, target, true),
            cell @ (Cell::Solid | Cell::Hazard) => {
                return Err(MoveError::Illegal(format!(
                    "the {} snake is blocked by {}",
                    mv.color,
                    cell.describe()
                )));
            }
            cell => {
                // Another snake or a block: it has to move out of the way first.
                if let Some(entity) = cell.entity() {
                    board.push(entity, mv.direction, mv.color)?;
                }
                board.advance(mv.color, target, false);
            }
        }

        let board = self.settle_board(board)?;
        debug_assert!(board.chains_are_consistent());
        // Every snake left the board, so the level is cleared.
        if !board.has_snakes() {
            return Ok(MoveStatus::MissionComplete);
        }
        Ok(MoveStatus::Moved(GameState {
            board,
            teleports: self.teleports.clone(),
            endpoint: self.endpoint,
        }))
    }

    /// Runs end resolution and gravity until the board comes to rest.
    ///
    /// A state that is already at rest settles to an identical state.
    pub fn settle(&self) -> Result<GameState, MoveError> {
        Ok(GameState {
            board: self.settle_board(self.board.clone())?,
            teleports: self.teleports.clone(),
            endpoint: self.endpoint,
        })
    }

    fn settle_board(&self, mut board: Board) -> Result<Board, MoveError> {
        self.resolve_end(&mut board);
        // Every productive step lowers some entity by a row or deletes one.
        let bound = (board.height + 1) * (board.entities().len() + 1);
        for _ in 0..bound {
            if !self.gravity_step(&mut board)? {
                return Ok(board);
            }
            self.resolve_end(&mut board);
        }
        Err(MoveError::Unsettled { steps: bound })
    }

    /// Removes a snake whose head sits on the endpoint once all fruit is eaten.
    fn resolve_end(&self, board: &mut Board) {
        let Some(endpoint) = self.endpoint else {
            return;
        };
        if board.has_fruit() {
            return;
        }
        if let Cell::Snake(segment) = board.get(endpoint) {
            if segment.is_head() {
                debug!("{} snake reached the endpoint", segment.color);
                board.remove_snake(segment.color);
            }
        }
    }

    /// Performs one simultaneous gravity step. Returns whether anything moved or
    /// disappeared.
    fn gravity_step(&self, board: &mut Board) -> Result<bool, MoveError> {
        let entities = board.entities();
        let fruit_left = board.has_fruit();

        let mut supports: BTreeMap<Entity, Support> = BTreeMap::new();
        for (&entity, cells) in &entities {
            let mut support = Support {
                ground: FALLS_OFF,
                spikes: FALLS_OFF,
                resting_on: Vec::new(),
            };
            // Scan straight down from every cell until something stops the scan.
            for &pos in cells {
                let is_head = matches!(board.get(pos), Cell::Snake(s) if s.is_head());
                for row in pos.row + 1..board.height {
                    let below = Position::new(row, pos.col);
                    let gap = row - pos.row - 1;
                    match board.get(below) {
                        Cell::Empty => {
                            // A head drops into the endpoint and stops there.
                            if is_head && !fruit_left && self.endpoint == Some(below) {
                                support.ground = support.ground.min(gap + 1);
                                break;
                            }
                        }
                        // Spikes kill snakes but are solid ground for blocks.
                        Cell::Hazard if matches!(entity, Entity::Snake(_)) => {
                            support.spikes = support.spikes.min(gap + 1);
                            break;
                        }
                        Cell::Solid | Cell::Hazard | Cell::Fruit => {
                            support.ground = support.ground.min(gap);
                            break;
                        }
                        // Own cells are skipped; another entity is a support to resolve later.
                        cell => {
                            if let Some(other) = cell.entity().filter(|&o| o != entity) {
                                support.resting_on.push((other, gap));
                            }
                            break;
                        }
                    }
                }
            }
            supports.insert(entity, support);
        }

        // Relax the "resting on" constraints until no fall distance shrinks further.
        let mut falls: BTreeMap<Entity, usize> =
            supports.iter().map(|(&e, s)| (e, s.ground)).collect();
        loop {
            let mut changed = false;
            for (entity, support) in &supports {
                let current = falls.get(entity).copied().unwrap_or(FALLS_OFF);
                let relaxed = support
                    .resting_on
                    .iter()
                    .map(|(other, gap)| {
                        gap.saturating_add(falls.get(other).copied().unwrap_or(FALLS_OFF))
                    })
                    .fold(current, usize::min);
                if relaxed < current {
                    falls.insert(*entity, relaxed);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        // Snakes must never die, whatever else happens in this step.
        for (entity, &fall) in &falls {
            if let Entity::Snake(color) = entity {
                let spikes = supports.get(entity).map_or(FALLS_OFF, |s| s.spikes);
                if fall == FALLS_OFF && spikes == FALLS_OFF {
                    return Err(MoveError::Unsafe(format!(
                        "the {} snake would fall off the board",
                        color
                    )));
                }
                if fall >= spikes {
                    return Err(MoveError::Unsafe(format!(
                        "the {} snake would be impaled on spikes",
                        color
                    )));
                }
            }
        }

        if falls.values().all(|&fall| fall == 0) {
            return Ok(false);
        }

        // Commit every fall at once: clear all moving cells, then write them back lower.
        // Blocks that fall off the board are simply not written back.
        let mut lifted = Vec::new();
        for (entity, cells) in &entities {
            let fall = falls.get(entity).copied().unwrap_or(0);
            if fall == 0 {
                continue;
            }
            if fall == FALLS_OFF {
                debug!("{:?} fell off the board", entity);
            }
            for &pos in cells {
                lifted.push((pos, fall));
            }
        }
        let landed: Vec<(Position, Cell)> = lifted
            .iter()
            .filter(|&&(_, fall)| fall != FALLS_OFF)
            .filter_map(|&(pos, fall)| {
                let to = pos.translate(fall as isize, 0)?;
                Some((to, board.get(pos).translated(fall as isize, 0)))
            })
            .collect();
        for &(pos, _) in &lifted {
            board.set(pos, Cell::Empty);
        }
        for (pos, cell) in landed {
            board.set(pos, cell);
        }
        Ok(true)
    }
}

/// Manages an interactive play session: the current state, the number of accepted
/// moves, and a history of earlier states for undo.
///
/// # Examples
/// ```
/// use snakebird_solver::engine::Game;
/// use snakebird_solver::utils::load_level;
///
/// let mut game = Game::new(load_level("rR_O\n####").unwrap());
/// game.process_move("rd".parse().unwrap()).unwrap();
/// assert_eq!(game.steps(), 1);
/// assert!(game.undo_last_move());
/// game.process_move("rd".parse().unwrap()).unwrap();
/// game.process_move("rd".parse().unwrap()).unwrap();
/// assert!(game.is_complete());
/// ```
#[derive(Clone, Debug)]
pub struct Game {
    state: GameState,
    steps: u32,
    completed: bool,
    history: Vec<(GameState, u32)>,
}

impl Game {
    pub fn new(initial: GameState) -> Self {
        Game {
            state: initial.clone(),
            steps: 0,
            completed: false,
            history: vec![(initial, 0)],
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Number of accepted moves, including the one that completed the level.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Applies `mv` to the current state. Rejected moves leave the session unchanged.
    pub fn process_move(&mut self, mv: Move) -> Result<(), MoveError> {
        if self.completed {
            return Err(MoveError::Invalid("the level is already complete".to_string()));
        }
        match self.state.apply_move(mv)? {
            MoveStatus::Moved(next) => {
                self.steps += 1;
                self.state = next;
                self.history.push((self.state.clone(), self.steps));
            }
            MoveStatus::MissionComplete => {
                self.steps += 1;
                self.completed = true;
            }
        }
        Ok(())
    }

    /// Reverts the last accepted move. Returns `false` when there is nothing to undo.
    pub fn undo_last_move(&mut self) -> bool {
        if self.completed {
            self.completed = false;
            self.steps = self.history.last().map_or(0, |&(_, steps)| steps);
            return true;
        }
        if self.history.len() > 1 {
            self.history.pop();
            if let Some((previous, steps)) = self.history.last() {
                self.state = previous.clone();
                self.steps = *steps;
            }
            true
        } else {
            false
        }
    }
}
