//! Plain-text and CSV views of solver results.

use std::fs::File;
use std::io;
use std::path::Path;

use ndarray::Array2;
use serde::Serialize;

use crate::error::Result;
use crate::policy;
use crate::world::{Action, GridWorld};

/// Utilities laid out like the grid.
pub fn utilities_table(utilities: &Array2<f64>) -> String {
    utilities
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .map(|u| format!("{:6.3}", u))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line per void cell with the Q-value of each action.
pub fn q_values_table(world: &GridWorld, utilities: &Array2<f64>) -> String {
    let mut lines = Vec::new();
    for pos in world.grid().positions() {
        if let Some(q) = policy::q_values(world, utilities, pos) {
            let values: Vec<String> = q
                .iter()
                .map(|(action, value)| format!("{}: {:6.3}", action.symbol(), value))
                .collect();
            lines.push(format!("{:<8} {}", pos.to_string(), values.join("  ")));
        }
    }
    lines.join("\n")
}

/// Greedy action per cell, `_` where no action is possible.
pub fn policy_table(world: &GridWorld, utilities: &Array2<f64>) -> String {
    policy::greedy_policy(world, utilities).to_string()
}

#[derive(Serialize)]
struct CellRecord {
    x: usize,
    y: usize,
    cell: String,
    utility: f64,
    q_north: Option<f64>,
    q_south: Option<f64>,
    q_west: Option<f64>,
    q_east: Option<f64>,
    greedy: Option<char>,
}

/// One CSV row per cell, in row-major order, with a header line.
pub fn write_csv<W: io::Write>(writer: W, world: &GridWorld, utilities: &Array2<f64>) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for pos in world.grid().positions() {
        let q = policy::q_values(world, utilities, pos);
        let q_of = |action: Action| q.map(|q| q.get(action));
        wtr.serialize(CellRecord {
            x: pos.x,
            y: pos.y,
            cell: world.cell_at(pos).map(|c| c.to_string()).unwrap_or_default(),
            utility: utilities[[pos.y, pos.x]],
            q_north: q_of(Action::North),
            q_south: q_of(Action::South),
            q_west: q_of(Action::West),
            q_east: q_of(Action::East),
            greedy: policy::greedy_from_utility(world, utilities, pos).map(Action::symbol),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_csv_file(path: &Path, world: &GridWorld, utilities: &Array2<f64>) -> Result<()> {
    let file = File::create(path)?;
    write_csv(file, world, utilities)
}
