//! Value iteration and policy iteration for grid world Markov decision
//! processes with noisy moves.

pub mod config;
pub mod error;
pub mod policy;
pub mod report;
pub mod solver;
pub mod world;

pub use error::{MdpError, Result};
pub use policy::{PolicyGrid, QValues};
pub use solver::{
    Control, ProgressObserver, Snapshot, SolveReport, Solver, SolverLimits, Termination,
    UpdateMode,
};
pub use world::{Action, CellType, Grid, GridWorld, NoiseModel, Position, RewardModel};
