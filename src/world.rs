use std::fmt;
use std::str::FromStr;

use approx::abs_diff_eq;
use ndarray::Array2;

use crate::error::{MdpError, Result};

/// Largest accepted distance between the noise probability sum and 1.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Kind of a grid cell.
///
/// Pit and exit cells are terminal. Terminal and wall cells permit no actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellType {
    Void,
    Pit,
    Exit,
    Wall,
}

impl CellType {
    pub fn is_terminal(self) -> bool {
        matches!(self, CellType::Pit | CellType::Exit)
    }

    /// Single character used in the grid text format.
    pub fn symbol(self) -> char {
        match self {
            CellType::Void => 'V',
            CellType::Pit => 'P',
            CellType::Exit => 'E',
            CellType::Wall => 'W',
        }
    }

    pub fn from_symbol(symbol: char) -> Option<CellType> {
        match symbol.to_ascii_uppercase() {
            'V' => Some(CellType::Void),
            'P' => Some(CellType::Pit),
            'E' => Some(CellType::Exit),
            'W' => Some(CellType::Wall),
            _ => None,
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CellType::Void => "void",
            CellType::Pit => "pit",
            CellType::Exit => "exit",
            CellType::Wall => "wall",
        };
        write!(f, "{}", name)
    }
}

/// The four cardinal moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    North,
    South,
    West,
    East,
}

impl Action {
    /// Canonical order. Ties between equally good actions go to the earliest.
    pub const ALL: [Action; 4] = [Action::North, Action::South, Action::West, Action::East];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn symbol(self) -> char {
        match self {
            Action::North => 'N',
            Action::South => 'S',
            Action::West => 'W',
            Action::East => 'E',
        }
    }

    /// Direction actually taken when this action is intended and the
    /// agent slips by `deviation`.
    pub fn turn(self, deviation: Deviation) -> Action {
        TURNS[self.index()][deviation.index()]
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Action::North => "North",
            Action::South => "South",
            Action::West => "West",
            Action::East => "East",
        };
        f.pad(name)
    }
}

impl FromStr for Action {
    type Err = MdpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "n" | "north" => Ok(Action::North),
            "s" | "south" => Ok(Action::South),
            "w" | "west" => Ok(Action::West),
            "e" | "east" => Ok(Action::East),
            other => Err(MdpError::InvalidConfiguration(format!(
                "unknown action '{}'",
                other
            ))),
        }
    }
}

/// Where an action ends up relative to the intended direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Deviation {
    Forward,
    Left,
    Right,
    Backward,
}

impl Deviation {
    pub const ALL: [Deviation; 4] = [
        Deviation::Forward,
        Deviation::Left,
        Deviation::Right,
        Deviation::Backward,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

// Indexed by [intended action][deviation], both in declaration order.
const TURNS: [[Action; 4]; 4] = [
    [Action::North, Action::West, Action::East, Action::South],
    [Action::South, Action::East, Action::West, Action::North],
    [Action::West, Action::South, Action::North, Action::East],
    [Action::East, Action::North, Action::South, Action::West],
];

/// Cell coordinates. `x` is the column, `y` the row counted from the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub fn new(x: usize, y: usize) -> Position {
        Position { x, y }
    }

    pub(crate) fn index(self) -> [usize; 2] {
        [self.y, self.x]
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Immutable rectangular matrix of cell types, indexed `[[row, column]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    cells: Array2<CellType>,
}

impl Grid {
    pub fn new(cells: Array2<CellType>) -> Result<Grid> {
        if cells.is_empty() {
            return Err(MdpError::InvalidGrid(String::from("grid has no cells")));
        }
        Ok(Grid { cells })
    }

    /// Build a grid from rows listed top to bottom.
    pub fn from_rows(rows: Vec<Vec<CellType>>) -> Result<Grid> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if height == 0 || width == 0 {
            return Err(MdpError::InvalidGrid(String::from("grid has no cells")));
        }
        if let Some(y) = rows.iter().position(|row| row.len() != width) {
            return Err(MdpError::InvalidGrid(format!(
                "row {} has {} cells, expected {}",
                y,
                rows[y].len(),
                width
            )));
        }
        let cells = Array2::from_shape_vec((height, width), rows.into_iter().flatten().collect())
            .map_err(|e| MdpError::InvalidGrid(e.to_string()))?;
        Grid::new(cells)
    }

    pub fn columns(&self) -> usize {
        self.cells.ncols()
    }

    pub fn rows(&self) -> usize {
        self.cells.nrows()
    }

    /// Shape `(rows, columns)` shared by utility and policy grids.
    pub fn dim(&self) -> (usize, usize) {
        self.cells.dim()
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.x < self.columns() && pos.y < self.rows()
    }

    pub fn cell_at(&self, pos: Position) -> Option<CellType> {
        self.cells.get(pos.index()).copied()
    }

    pub fn cells(&self) -> &Array2<CellType> {
        &self.cells
    }

    /// Every position in row-major order. Turbo sweeps rely on this order.
    pub fn positions(&self) -> Positions {
        Positions::new(self.columns(), self.rows())
    }
}

impl FromStr for Grid {
    type Err = MdpError;

    /// One line per row, one symbol (`V`, `P`, `E`, `W`) per cell.
    /// Whitespace between symbols and blank lines are ignored.
    fn from_str(s: &str) -> Result<Self> {
        let rows = s
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.chars()
                    .filter(|c| !c.is_whitespace())
                    .map(|c| {
                        CellType::from_symbol(c).ok_or_else(|| {
                            MdpError::InvalidGrid(format!("unknown cell symbol '{}'", c))
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Grid::from_rows(rows)
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (y, row) in self.cells.rows().into_iter().enumerate() {
            if y > 0 {
                writeln!(f)?;
            }
            let line: Vec<String> = row.iter().map(|c| c.symbol().to_string()).collect();
            write!(f, "{}", line.join(" "))?;
        }
        Ok(())
    }
}

/// Row-major walk over the positions of a grid.
pub struct Positions {
    x: usize,
    y: usize,
    columns: usize,
    rows: usize,
}

impl Positions {
    fn new(columns: usize, rows: usize) -> Positions {
        Positions { x: 0, y: 0, columns, rows }
    }
}

impl Iterator for Positions {
    type Item = Position;

    fn next(&mut self) -> Option<Self::Item> {
        if self.y >= self.rows || self.columns == 0 {
            return None;
        }
        let pos = Position::new(self.x, self.y);
        if self.x + 1 < self.columns {
            self.x += 1;
        } else {
            self.x = 0;
            self.y += 1;
        }
        Some(pos)
    }
}

/// Probabilities of slipping away from the intended direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseModel {
    forward: f64,
    left: f64,
    right: f64,
    backward: f64,
}

impl NoiseModel {
    /// Each probability must lie in `[0, 1]` and together they must sum to 1
    /// within [`PROBABILITY_TOLERANCE`].
    pub fn new(forward: f64, left: f64, right: f64, backward: f64) -> Result<NoiseModel> {
        let probs = [forward, left, right, backward];
        if let Some(p) = probs.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(MdpError::InvalidConfiguration(format!(
                "probability {} is outside [0, 1]",
                p
            )));
        }
        let sum: f64 = probs.iter().sum();
        if !abs_diff_eq!(sum, 1.0, epsilon = PROBABILITY_TOLERANCE) {
            return Err(MdpError::InvalidConfiguration(format!(
                "probabilities sum to {}, expected 1",
                sum
            )));
        }
        Ok(NoiseModel { forward, left, right, backward })
    }

    /// Every action goes exactly where it is aimed.
    pub fn deterministic() -> NoiseModel {
        NoiseModel { forward: 1.0, left: 0.0, right: 0.0, backward: 0.0 }
    }

    pub fn probability(&self, deviation: Deviation) -> f64 {
        match deviation {
            Deviation::Forward => self.forward,
            Deviation::Left => self.left,
            Deviation::Right => self.right,
            Deviation::Backward => self.backward,
        }
    }
}

impl Default for NoiseModel {
    fn default() -> Self {
        NoiseModel { forward: 0.8, left: 0.1, right: 0.1, backward: 0.0 }
    }
}

/// Reward for standing in each kind of cell. Walls always yield 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardModel {
    pub step: f64,
    pub pit: f64,
    pub exit: f64,
}

impl RewardModel {
    pub fn new(step: f64, pit: f64, exit: f64) -> RewardModel {
        RewardModel { step, pit, exit }
    }

    pub fn for_cell(&self, cell: CellType) -> f64 {
        match cell {
            CellType::Void => self.step,
            CellType::Pit => self.pit,
            CellType::Exit => self.exit,
            CellType::Wall => 0.0,
        }
    }
}

impl Default for RewardModel {
    fn default() -> Self {
        RewardModel { step: -0.04, pit: -1.0, exit: 1.0 }
    }
}

/// One possible result of an intended action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    /// Direction actually taken
    pub action: Action,
    /// Where the agent lands
    pub position: Position,
    pub probability: f64,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:<5} -> {} p={:.3}", self.action, self.position, self.probability)
    }
}

/// The environment: grid, rewards, action noise and discount factor.
///
/// Built once, then shared read-only by every solver working on it.
#[derive(Debug, Clone)]
pub struct GridWorld {
    grid: Grid,
    rewards: RewardModel,
    noise: NoiseModel,
    discount: f64,
}

impl GridWorld {
    pub fn new(
        grid: Grid,
        rewards: RewardModel,
        noise: NoiseModel,
        discount: f64,
    ) -> Result<GridWorld> {
        if !(0.0..=1.0).contains(&discount) {
            return Err(MdpError::InvalidConfiguration(format!(
                "discount factor {} is outside [0, 1]",
                discount
            )));
        }
        Ok(GridWorld { grid, rewards, noise, discount })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn rewards(&self) -> &RewardModel {
        &self.rewards
    }

    pub fn noise(&self) -> &NoiseModel {
        &self.noise
    }

    pub fn discount(&self) -> f64 {
        self.discount
    }

    pub fn cell_at(&self, pos: Position) -> Option<CellType> {
        self.grid.cell_at(pos)
    }

    pub fn is_void(&self, pos: Position) -> bool {
        self.grid.cell_at(pos) == Some(CellType::Void)
    }

    pub fn reward(&self, cell: CellType) -> f64 {
        self.rewards.for_cell(cell)
    }

    pub fn reward_at(&self, pos: Position) -> Option<f64> {
        self.grid.cell_at(pos).map(|cell| self.reward(cell))
    }

    /// Deterministic result of `action` from a void cell.
    ///
    /// Moves are clamped at the border and blocked by walls; both leave the
    /// agent where it was.
    pub fn transition(&self, pos: Position, action: Action) -> Result<Position> {
        let cell = self.grid.cell_at(pos).ok_or(MdpError::OutOfBounds(pos))?;
        if cell != CellType::Void {
            return Err(MdpError::IllegalAction { position: pos, cell, action });
        }
        Ok(self.step(pos, action))
    }

    // Caller guarantees `pos` is inside the grid.
    fn step(&self, pos: Position, action: Action) -> Position {
        let next = match action {
            Action::North => Position::new(pos.x, pos.y.saturating_sub(1)),
            Action::South => Position::new(pos.x, (pos.y + 1).min(self.grid.rows() - 1)),
            Action::West => Position::new(pos.x.saturating_sub(1), pos.y),
            Action::East => Position::new((pos.x + 1).min(self.grid.columns() - 1), pos.y),
        };
        if self.grid.cell_at(next) == Some(CellType::Wall) {
            pos
        } else {
            next
        }
    }

    /// The four possible results of intending `intended` from `pos`.
    ///
    /// Empty when `pos` is not a void cell.
    pub fn outcomes(&self, pos: Position, intended: Action) -> Vec<Outcome> {
        if !self.is_void(pos) {
            return Vec::new();
        }
        Deviation::ALL
            .iter()
            .map(|&deviation| {
                let action = intended.turn(deviation);
                Outcome {
                    action,
                    position: self.step(pos, action),
                    probability: self.noise.probability(deviation),
                }
            })
            .collect()
    }

    /// Expected next-state utility of intending `intended` from `pos`,
    /// i.e. the probability-weighted sum over [`GridWorld::outcomes`].
    ///
    /// Zero for cells that permit no actions.
    pub fn expected_utility(&self, pos: Position, intended: Action, utilities: &Array2<f64>) -> f64 {
        if !self.is_void(pos) {
            return 0.0;
        }
        Deviation::ALL
            .iter()
            .map(|&deviation| {
                let next = self.step(pos, intended.turn(deviation));
                self.noise.probability(deviation) * utilities[next.index()]
            })
            .sum()
    }
}
