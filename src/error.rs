use thiserror::Error;

use crate::world::{Action, CellType, Position};

/// Errors raised while building a grid world or driving a solver.
///
/// Running out of iterations or time is not an error; see
/// [`crate::solver::Termination`].
#[derive(Debug, Error)]
pub enum MdpError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Action {action} is not allowed from the {cell} cell at {position}")]
    IllegalAction {
        position: Position,
        cell: CellType,
        action: Action,
    },

    #[error("Position {0} is outside the grid")]
    OutOfBounds(Position),

    #[error("Unable to read configuration file: {0}")]
    ConfigFile(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MdpError>;
