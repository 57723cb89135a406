use std::path::Path;
use std::time::Duration;

use config_file::FromConfigFile;
use serde::Deserialize;
use tracing::debug;

use crate::error::{MdpError, Result};
use crate::solver::SolverLimits;
use crate::world::{Grid, GridWorld, NoiseModel, RewardModel};

/// Hold information read from a configuration file.
///
/// Every section but `grid` falls back to the classic 4x3 setup.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MdpConfig {
    /// Grid rows top to bottom, one `V`/`P`/`E`/`W` symbol per cell
    pub grid: Vec<String>,
    #[serde(default = "default_discount")]
    pub discount: f64,
    #[serde(default)]
    pub rewards: RewardConfig,
    #[serde(default)]
    pub probabilities: ProbabilityConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn default_discount() -> f64 {
    1.0
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RewardConfig {
    /// Reward for every step through a void cell, must not be positive
    pub step: f64,
    /// Must not be positive
    pub pit: f64,
    /// Must not be negative
    pub exit: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        let rewards = RewardModel::default();
        RewardConfig { step: rewards.step, pit: rewards.pit, exit: rewards.exit }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ProbabilityConfig {
    pub forward: f64,
    pub left: f64,
    pub right: f64,
    pub backward: f64,
}

impl Default for ProbabilityConfig {
    fn default() -> Self {
        ProbabilityConfig { forward: 0.8, left: 0.1, right: 0.1, backward: 0.0 }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_iterations: usize,
    /// Seconds
    pub time_to_live: f64,
    pub epsilon: f64,
    pub evaluation_cap: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let limits = SolverLimits::default();
        LimitsConfig {
            max_iterations: limits.max_iterations,
            time_to_live: limits.time_to_live.as_secs_f64(),
            epsilon: limits.epsilon,
            evaluation_cap: limits.evaluation_cap,
        }
    }
}

impl MdpConfig {
    pub fn from_path(path: &Path) -> Result<MdpConfig> {
        debug!(path = %path.display(), "reading configuration file");
        MdpConfig::from_config_file(path).map_err(|e| MdpError::ConfigFile(e.to_string()))
    }

    /// Checks the solver itself leaves to the caller: reward signs and
    /// limit ranges.
    pub fn validate(&self) -> Result<()> {
        let rewards = &self.rewards;
        if !(rewards.step <= 0.0) {
            return invalid(format!("step reward {} must not be positive", rewards.step));
        }
        if !(rewards.pit <= 0.0) {
            return invalid(format!("pit reward {} must not be positive", rewards.pit));
        }
        if !(rewards.exit >= 0.0) {
            return invalid(format!("exit reward {} must not be negative", rewards.exit));
        }
        let limits = &self.limits;
        if limits.max_iterations == 0 {
            return invalid(String::from("max_iterations must be at least 1"));
        }
        if limits.evaluation_cap == 0 {
            return invalid(String::from("evaluation_cap must be at least 1"));
        }
        if !(limits.time_to_live.is_finite() && limits.time_to_live >= 0.0) {
            return invalid(format!(
                "time_to_live {} must be a non-negative number of seconds",
                limits.time_to_live
            ));
        }
        if !(limits.epsilon.is_finite() && limits.epsilon >= 0.0) {
            return invalid(format!("epsilon {} must not be negative", limits.epsilon));
        }
        Ok(())
    }

    /// Validated environment described by this configuration.
    pub fn world(&self) -> Result<GridWorld> {
        self.validate()?;
        let grid: Grid = self.grid.join("\n").parse()?;
        let p = &self.probabilities;
        let noise = NoiseModel::new(p.forward, p.left, p.right, p.backward)?;
        let r = &self.rewards;
        GridWorld::new(grid, RewardModel::new(r.step, r.pit, r.exit), noise, self.discount)
    }

    pub fn limits(&self) -> Result<SolverLimits> {
        self.validate()?;
        Ok(SolverLimits {
            max_iterations: self.limits.max_iterations,
            time_to_live: Duration::from_secs_f64(self.limits.time_to_live),
            epsilon: self.limits.epsilon,
            evaluation_cap: self.limits.evaluation_cap,
        })
    }
}

fn invalid(message: String) -> Result<()> {
    Err(MdpError::InvalidConfiguration(message))
}
