use std::fmt;
use std::time::{Duration, Instant};

use ndarray::{Array2, Zip};
use tracing::{debug, info, trace, warn};

use crate::policy::{self, PolicyGrid, QValues};
use crate::world::{Action, CellType, GridWorld, Position};

/// Bounds applied to every solve call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverLimits {
    /// Most sweeps (value iteration) or rounds (policy iteration) per call
    pub max_iterations: usize,
    /// Wall-clock budget per call, checked after each sweep
    pub time_to_live: Duration,
    /// Convergence epsilon
    pub epsilon: f64,
    /// Most evaluation sweeps in one policy iteration round
    pub evaluation_cap: usize,
}

impl Default for SolverLimits {
    fn default() -> Self {
        SolverLimits {
            max_iterations: 1000,
            time_to_live: Duration::from_secs(3),
            epsilon: 0.1,
            evaluation_cap: 50,
        }
    }
}

impl SolverLimits {
    /// Largest max-norm accepted as converged: `epsilon * (1 - discount) / discount`.
    ///
    /// `None` for a zero discount, where one sweep already yields the exact
    /// utilities.
    pub fn convergence_threshold(&self, discount: f64) -> Option<f64> {
        if discount == 0.0 {
            None
        } else {
            Some(self.epsilon * (1.0 - discount) / discount)
        }
    }

    pub fn is_converged(&self, max_norm: f64, discount: f64) -> bool {
        self.convergence_threshold(discount)
            .map_or(true, |threshold| max_norm <= threshold)
    }
}

/// How a sweep writes new utilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// Every cell reads the previous sweep's utilities.
    #[default]
    Standard,
    /// `Standard`, with cells spread over the rayon thread pool.
    Parallel,
    /// Cells are updated in place in row-major order, so later cells read
    /// values already updated in the same sweep.
    Turbo,
}

/// Why a solve call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Converged,
    ExceededIterations,
    ExceededTime,
    Cancelled,
}

impl Termination {
    /// Stopped by a resource limit. The utilities are a best effort.
    pub fn is_exceeded(self) -> bool {
        matches!(self, Termination::ExceededIterations | Termination::ExceededTime)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let reason = match self {
            Termination::Converged => "converged",
            Termination::ExceededIterations => "exceeded-iterations",
            Termination::ExceededTime => "exceeded-time",
            Termination::Cancelled => "cancelled",
        };
        write!(f, "{}", reason)
    }
}

/// Summary of one solve call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    pub iterations: usize,
    pub elapsed: Duration,
    pub termination: Termination,
}

impl fmt::Display for SolveReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} after {} iterations in {:.3} secs",
            self.termination,
            self.iterations,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Observer verdict after a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

/// Solver state as of the last completed sweep.
#[derive(Debug)]
pub struct Snapshot<'a> {
    pub world: &'a GridWorld,
    pub utilities: &'a Array2<f64>,
    /// Current policy, policy iteration only
    pub policy: Option<&'a PolicyGrid>,
    pub iterations: usize,
    pub elapsed: Duration,
    /// Largest utility change in the last sweep
    pub max_norm: f64,
}

/// Hook called once per completed sweep, never mid-sweep.
///
/// Returning [`Control::Stop`] cancels the solve before the next sweep
/// starts. A last call with `is_final = true` follows every termination;
/// its verdict is ignored.
pub trait ProgressObserver {
    fn on_sweep(&mut self, snapshot: &Snapshot<'_>, is_final: bool) -> Control;
}

/// Observer that lets every solve run to completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unobserved;

impl ProgressObserver for Unobserved {
    fn on_sweep(&mut self, _snapshot: &Snapshot<'_>, _is_final: bool) -> Control {
        Control::Continue
    }
}

/// Observer backed by a closure, see [`from_fn`].
pub struct FnObserver<F>(F);

impl<F> ProgressObserver for FnObserver<F>
where
    F: FnMut(&Snapshot<'_>, bool) -> Control,
{
    fn on_sweep(&mut self, snapshot: &Snapshot<'_>, is_final: bool) -> Control {
        (self.0)(snapshot, is_final)
    }
}

pub fn from_fn<F>(f: F) -> FnObserver<F>
where
    F: FnMut(&Snapshot<'_>, bool) -> Control,
{
    FnObserver(f)
}

/// Dynamic-programming solver for a [`GridWorld`].
///
/// Owns the utility grid (and the policy grid after policy iteration).
/// Utilities carry over between solve calls until [`Solver::reset`].
pub struct Solver<'w> {
    world: &'w GridWorld,
    limits: SolverLimits,
    utilities: Array2<f64>,
    policy: Option<PolicyGrid>,
    iterations: usize,
    elapsed: Duration,
}

impl<'w> Solver<'w> {
    pub fn new(world: &'w GridWorld, limits: SolverLimits) -> Solver<'w> {
        Solver {
            world,
            limits,
            utilities: Array2::zeros(world.grid().dim()),
            policy: None,
            iterations: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Zero the utilities and forget the policy and counters.
    pub fn reset(&mut self) {
        self.utilities.fill(0.0);
        self.policy = None;
        self.iterations = 0;
        self.elapsed = Duration::ZERO;
    }

    pub fn world(&self) -> &'w GridWorld {
        self.world
    }

    pub fn limits(&self) -> &SolverLimits {
        &self.limits
    }

    /// Utility grid indexed `[[row, column]]`.
    pub fn utilities(&self) -> &Array2<f64> {
        &self.utilities
    }

    pub fn utility_at(&self, pos: Position) -> Option<f64> {
        self.utilities.get(pos.index()).copied()
    }

    /// Policy left by the last policy iteration.
    pub fn policy(&self) -> Option<&PolicyGrid> {
        self.policy.as_ref()
    }

    /// Iterations of the last solve call.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn q_value(&self, pos: Position, action: Action) -> Option<f64> {
        policy::q_value(self.world, &self.utilities, pos, action)
    }

    pub fn q_values(&self, pos: Position) -> Option<QValues> {
        policy::q_values(self.world, &self.utilities, pos)
    }

    pub fn greedy_from_q_values(&self, pos: Position) -> Option<Action> {
        policy::greedy_from_q_values(self.world, &self.utilities, pos)
    }

    pub fn greedy_from_utility(&self, pos: Position) -> Option<Action> {
        policy::greedy_from_utility(self.world, &self.utilities, pos)
    }

    pub fn greedy_policy(&self) -> PolicyGrid {
        policy::greedy_policy(self.world, &self.utilities)
    }

    /// Value iteration: repeated Bellman backups until the max-norm of a
    /// sweep drops to the convergence threshold.
    pub fn value_iteration<O>(&mut self, mode: UpdateMode, observer: &mut O) -> SolveReport
    where
        O: ProgressObserver + ?Sized,
    {
        let world = self.world;
        let start = Instant::now();
        self.iterations = 0;
        let mut max_norm;
        let termination = loop {
            self.iterations += 1;
            max_norm = sweep(world, &mut self.utilities, mode, |utilities, pos| {
                bellman_backup(world, utilities, pos)
            });
            self.elapsed = start.elapsed();
            debug!(iteration = self.iterations, max_norm, "value iteration sweep");
            let converged = self.limits.is_converged(max_norm, world.discount());
            if let Some(termination) = self.after_sweep(None, max_norm, converged, observer) {
                break termination;
            }
        };
        self.finish("value iteration", None, max_norm, termination, observer)
    }

    /// Policy iteration: bounded policy evaluation followed by greedy
    /// improvement, until a round leaves the policy unchanged.
    ///
    /// Evaluation stops at the convergence threshold or after
    /// `evaluation_cap` sweeps, so termination is usual but not guaranteed;
    /// `max_iterations` and `time_to_live` still bound the call.
    pub fn policy_iteration<O>(&mut self, mode: UpdateMode, observer: &mut O) -> SolveReport
    where
        O: ProgressObserver + ?Sized,
    {
        let world = self.world;
        let start = Instant::now();
        self.iterations = 0;
        let mut policy = PolicyGrid::new(world, Action::North);
        let mut max_norm;
        let termination = loop {
            self.iterations += 1;
            max_norm = evaluate_policy(world, &mut self.utilities, &policy, &self.limits, mode);
            let changed = improve_policy(world, &self.utilities, &mut policy);
            self.elapsed = start.elapsed();
            debug!(iteration = self.iterations, changed, max_norm, "policy iteration round");
            if let Some(termination) = self.after_sweep(Some(&policy), max_norm, changed == 0, observer)
            {
                break termination;
            }
        };
        let report = self.finish("policy iteration", Some(&policy), max_norm, termination, observer);
        self.policy = Some(policy);
        report
    }

    fn snapshot<'a>(&'a self, policy: Option<&'a PolicyGrid>, max_norm: f64) -> Snapshot<'a> {
        Snapshot {
            world: self.world,
            utilities: &self.utilities,
            policy,
            iterations: self.iterations,
            elapsed: self.elapsed,
            max_norm,
        }
    }

    // Observer first, then convergence, then the resource limits.
    fn after_sweep<O>(
        &self,
        policy: Option<&PolicyGrid>,
        max_norm: f64,
        converged: bool,
        observer: &mut O,
    ) -> Option<Termination>
    where
        O: ProgressObserver + ?Sized,
    {
        if observer.on_sweep(&self.snapshot(policy, max_norm), false) == Control::Stop {
            return Some(Termination::Cancelled);
        }
        if converged {
            return Some(Termination::Converged);
        }
        if self.iterations >= self.limits.max_iterations {
            return Some(Termination::ExceededIterations);
        }
        if self.elapsed > self.limits.time_to_live {
            return Some(Termination::ExceededTime);
        }
        None
    }

    fn finish<O>(
        &self,
        algorithm: &str,
        policy: Option<&PolicyGrid>,
        max_norm: f64,
        termination: Termination,
        observer: &mut O,
    ) -> SolveReport
    where
        O: ProgressObserver + ?Sized,
    {
        let _ = observer.on_sweep(&self.snapshot(policy, max_norm), true);
        let report = SolveReport {
            iterations: self.iterations,
            elapsed: self.elapsed,
            termination,
        };
        if termination.is_exceeded() {
            warn!(%termination, iterations = report.iterations, max_norm, "{} stopped before converging", algorithm);
        } else {
            info!(%termination, iterations = report.iterations, "{} finished", algorithm);
        }
        report
    }
}

// Bellman optimality backup. Cells without actions keep their bare reward.
fn bellman_backup(world: &GridWorld, utilities: &Array2<f64>, pos: Position) -> f64 {
    let cell = world.grid().cells()[pos.index()];
    let reward = world.reward(cell);
    if cell != CellType::Void {
        return reward;
    }
    let best = Action::ALL
        .iter()
        .map(|&action| world.expected_utility(pos, action, utilities))
        .fold(f64::NEG_INFINITY, f64::max);
    reward + world.discount() * best
}

// Bellman expectation backup for the action the policy fixes at `pos`.
fn policy_backup(
    world: &GridWorld,
    utilities: &Array2<f64>,
    policy: &PolicyGrid,
    pos: Position,
) -> f64 {
    let reward = world.reward(world.grid().cells()[pos.index()]);
    match policy.action_at(pos) {
        Some(action) => reward + world.discount() * world.expected_utility(pos, action, utilities),
        None => reward,
    }
}

/// One full pass over the grid; returns the max-norm of the change.
fn sweep<F>(world: &GridWorld, utilities: &mut Array2<f64>, mode: UpdateMode, backup: F) -> f64
where
    F: Fn(&Array2<f64>, Position) -> f64 + Sync,
{
    match mode {
        UpdateMode::Standard => {
            let current: &Array2<f64> = utilities;
            let next = Array2::from_shape_fn(current.dim(), |(y, x)| {
                backup(current, Position::new(x, y))
            });
            let max_norm = max_change(current, &next);
            *utilities = next;
            max_norm
        }
        UpdateMode::Parallel => {
            let current: &Array2<f64> = utilities;
            let mut next = Array2::zeros(current.dim());
            Zip::indexed(&mut next).par_for_each(|(y, x), value| {
                *value = backup(current, Position::new(x, y));
            });
            let max_norm = max_change(current, &next);
            *utilities = next;
            max_norm
        }
        UpdateMode::Turbo => {
            let mut max_norm = 0.0_f64;
            for pos in world.grid().positions() {
                let value = backup(utilities, pos);
                max_norm = max_norm.max((utilities[pos.index()] - value).abs());
                utilities[pos.index()] = value;
            }
            max_norm
        }
    }
}

fn max_change(old: &Array2<f64>, new: &Array2<f64>) -> f64 {
    Zip::from(old)
        .and(new)
        .fold(0.0_f64, |norm, &a, &b| norm.max((a - b).abs()))
}

// Approximate evaluation of a fixed policy, capped at `evaluation_cap` sweeps.
fn evaluate_policy(
    world: &GridWorld,
    utilities: &mut Array2<f64>,
    policy: &PolicyGrid,
    limits: &SolverLimits,
    mode: UpdateMode,
) -> f64 {
    let mut sweeps = 0;
    loop {
        sweeps += 1;
        let max_norm = sweep(world, utilities, mode, |current, pos| {
            policy_backup(world, current, policy, pos)
        });
        trace!(sweeps, max_norm, "policy evaluation sweep");
        if limits.is_converged(max_norm, world.discount()) || sweeps >= limits.evaluation_cap {
            return max_norm;
        }
    }
}

// Greedy improvement; returns how many cells switched action.
fn improve_policy(world: &GridWorld, utilities: &Array2<f64>, policy: &mut PolicyGrid) -> usize {
    let mut changed = 0;
    for pos in world.grid().positions() {
        let Some(current) = policy.action_at(pos) else {
            continue;
        };
        let candidates = Action::ALL
            .iter()
            .map(|&action| (action, world.expected_utility(pos, action, utilities)));
        let Some((best, best_value)) = policy::argmax(candidates) else {
            continue;
        };
        if best_value > world.expected_utility(pos, current, utilities) {
            policy.set(pos, best);
            changed += 1;
        }
    }
    changed
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::world::{Grid, NoiseModel, RewardModel};
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use test_case::test_case;

    fn textbook_utilities() -> Array2<f64> {
        array![
            [0.812, 0.868, 0.918, 1.0],
            [0.762, 0.0, 0.660, -1.0],
            [0.705, 0.655, 0.611, 0.388]
        ]
    }

    fn open_field(discount: f64) -> GridWorld {
        let grid: Grid = "VVV\nVVV".parse().unwrap();
        GridWorld::new(grid, RewardModel::default(), NoiseModel::default(), discount).unwrap()
    }

    #[test_case(UpdateMode::Standard; "Standard sweeps")]
    #[test_case(UpdateMode::Parallel; "Parallel sweeps")]
    #[test_case(UpdateMode::Turbo; "Turbo sweeps")]
    fn value_iteration_reaches_textbook_utilities(mode: UpdateMode) {
        // Arrange
        let world = fixtures::four_by_three(1.0, NoiseModel::default());
        let mut solver = Solver::new(&world, SolverLimits::default());
        // Act
        let report = solver.value_iteration(mode, &mut Unobserved);
        // Assert
        assert_eq!(report.termination, Termination::Converged);
        assert_eq!(report.iterations, solver.iterations());
        assert_abs_diff_eq!(*solver.utilities(), textbook_utilities(), epsilon = 1e-3);
    }

    #[test]
    fn turbo_needs_fewer_sweeps() {
        let world = fixtures::four_by_three(1.0, NoiseModel::default());
        let mut standard = Solver::new(&world, SolverLimits::default());
        let mut turbo = Solver::new(&world, SolverLimits::default());
        let slow = standard.value_iteration(UpdateMode::Standard, &mut Unobserved);
        let fast = turbo.value_iteration(UpdateMode::Turbo, &mut Unobserved);
        assert!(fast.iterations < slow.iterations);
    }

    #[test]
    fn parallel_sweeps_match_standard_sweeps() {
        let world = fixtures::four_by_three(0.9, NoiseModel::default());
        let mut standard = Solver::new(&world, SolverLimits::default());
        let mut parallel = Solver::new(&world, SolverLimits::default());
        let a = standard.value_iteration(UpdateMode::Standard, &mut Unobserved);
        let b = parallel.value_iteration(UpdateMode::Parallel, &mut Unobserved);
        assert_eq!(a.iterations, b.iterations);
        assert_eq!(standard.utilities(), parallel.utilities());
    }

    #[test_case(0.0; "No discount")]
    #[test_case(0.5; "Half discount")]
    #[test_case(0.9; "Typical discount")]
    #[test_case(1.0; "Full discount")]
    fn terminal_cells_hold_their_reward(discount: f64) {
        // Arrange
        let world = fixtures::four_by_three(discount, NoiseModel::default());
        let exit = Position::new(3, 0);
        let pit = Position::new(3, 1);
        let wall = Position::new(1, 1);
        let mut solver = Solver::new(&world, SolverLimits::default());
        for policy_iteration in [false, true] {
            solver.reset();
            // Act
            if policy_iteration {
                solver.policy_iteration(UpdateMode::Standard, &mut Unobserved);
            } else {
                solver.value_iteration(UpdateMode::Turbo, &mut Unobserved);
            }
            // Assert
            assert_eq!(solver.utility_at(exit), Some(1.0));
            assert_eq!(solver.utility_at(pit), Some(-1.0));
            assert_eq!(solver.utility_at(wall), Some(0.0));
        }
    }

    #[test]
    fn deterministic_moves_discount_one_step() {
        // Arrange
        let world = fixtures::four_by_three(0.9, NoiseModel::deterministic());
        let mut solver = Solver::new(&world, SolverLimits::default());
        // Act
        let report = solver.value_iteration(UpdateMode::Standard, &mut Unobserved);
        // Assert
        assert_eq!(report.termination, Termination::Converged);
        assert_eq!(solver.utility_at(Position::new(3, 0)), Some(1.0));
        let next_to_exit = solver.utility_at(Position::new(2, 0)).unwrap();
        assert_abs_diff_eq!(next_to_exit, -0.04 + 0.9 * 1.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_discount_converges_after_one_sweep() {
        // Arrange
        let world = fixtures::four_by_three(0.0, NoiseModel::default());
        let mut solver = Solver::new(&world, SolverLimits::default());
        // Act
        let report = solver.value_iteration(UpdateMode::Standard, &mut Unobserved);
        // Assert
        assert_eq!(report.termination, Termination::Converged);
        assert_eq!(report.iterations, 1);
        for pos in world.grid().positions() {
            assert_eq!(solver.utility_at(pos), world.reward_at(pos));
        }
    }

    #[test_case(0.9; "Typical discount")]
    #[test_case(1.0; "Full discount")]
    fn value_and_policy_iteration_agree(discount: f64) {
        // Arrange
        let world = fixtures::four_by_three(discount, NoiseModel::default());
        let mut vi = Solver::new(&world, SolverLimits::default());
        let mut pi = Solver::new(&world, SolverLimits::default());
        // Act
        let vi_report = vi.value_iteration(UpdateMode::Standard, &mut Unobserved);
        let pi_report = pi.policy_iteration(UpdateMode::Standard, &mut Unobserved);
        // Assert
        assert_eq!(vi_report.termination, Termination::Converged);
        assert_eq!(pi_report.termination, Termination::Converged);
        for pos in world.grid().positions() {
            assert_eq!(vi.greedy_from_utility(pos), pi.greedy_from_utility(pos));
            assert_eq!(vi.greedy_from_q_values(pos), pi.policy().unwrap().action_at(pos));
        }
    }

    #[test]
    fn policy_iteration_finds_textbook_policy() {
        let world = fixtures::four_by_three(1.0, NoiseModel::default());
        let mut solver = Solver::new(&world, SolverLimits::default());
        let report = solver.policy_iteration(UpdateMode::Turbo, &mut Unobserved);
        assert_eq!(report.termination, Termination::Converged);
        assert_eq!(solver.policy().unwrap().to_string(), "E E E _\nN _ N _\nN W W W");
        assert_eq!(*solver.policy().unwrap(), solver.greedy_policy());
    }

    #[test]
    fn resolving_after_reset_is_idempotent() {
        let world = fixtures::four_by_three(0.9, NoiseModel::default());
        let mut solver = Solver::new(&world, SolverLimits::default());
        for mode in [UpdateMode::Standard, UpdateMode::Turbo] {
            solver.reset();
            let first_report = solver.value_iteration(mode, &mut Unobserved);
            let first = solver.utilities().clone();
            solver.reset();
            let second_report = solver.value_iteration(mode, &mut Unobserved);
            assert_eq!(first_report.iterations, second_report.iterations);
            assert_abs_diff_eq!(first, *solver.utilities(), epsilon = 1e-12);
        }
        solver.reset();
        solver.policy_iteration(UpdateMode::Standard, &mut Unobserved);
        let first = solver.utilities().clone();
        solver.reset();
        solver.policy_iteration(UpdateMode::Standard, &mut Unobserved);
        assert_abs_diff_eq!(first, *solver.utilities(), epsilon = 1e-12);
    }

    #[test]
    fn converged_utilities_warm_start_the_next_solve() {
        let world = fixtures::four_by_three(1.0, NoiseModel::default());
        let mut solver = Solver::new(&world, SolverLimits::default());
        solver.value_iteration(UpdateMode::Standard, &mut Unobserved);
        let report = solver.value_iteration(UpdateMode::Standard, &mut Unobserved);
        assert_eq!(report.termination, Termination::Converged);
        assert_eq!(report.iterations, 1);
    }

    #[test]
    fn reset_clears_results() {
        let world = fixtures::four_by_three(0.9, NoiseModel::default());
        let mut solver = Solver::new(&world, SolverLimits::default());
        solver.policy_iteration(UpdateMode::Standard, &mut Unobserved);
        solver.reset();
        assert!(solver.utilities().iter().all(|&u| u == 0.0));
        assert!(solver.policy().is_none());
        assert_eq!(solver.iterations(), 0);
        assert_eq!(solver.elapsed(), Duration::ZERO);
    }

    #[test]
    fn grid_without_exit_exceeds_iterations() {
        // Arrange
        let world = open_field(1.0);
        let limits = SolverLimits { max_iterations: 25, ..SolverLimits::default() };
        let mut solver = Solver::new(&world, limits);
        // Act
        let report = solver.value_iteration(UpdateMode::Standard, &mut Unobserved);
        // Assert
        assert_eq!(report.termination, Termination::ExceededIterations);
        assert!(report.termination.is_exceeded());
        assert_eq!(report.iterations, 25);
        assert_abs_diff_eq!(solver.utility_at(Position::new(0, 0)).unwrap(), -1.0, epsilon = 1e-9);
    }

    #[test]
    fn policy_iteration_exceeds_iterations() {
        let world = fixtures::four_by_three(1.0, NoiseModel::default());
        let limits = SolverLimits { max_iterations: 1, ..SolverLimits::default() };
        let mut solver = Solver::new(&world, limits);
        let report = solver.policy_iteration(UpdateMode::Standard, &mut Unobserved);
        assert_eq!(report.termination, Termination::ExceededIterations);
        assert!(solver.policy().is_some());
    }

    #[test]
    fn zero_time_to_live_exceeds_time() {
        let world = fixtures::four_by_three(1.0, NoiseModel::default());
        let limits = SolverLimits { time_to_live: Duration::ZERO, ..SolverLimits::default() };
        let mut solver = Solver::new(&world, limits);
        let report = solver.value_iteration(UpdateMode::Standard, &mut Unobserved);
        assert_eq!(report.termination, Termination::ExceededTime);
        assert_eq!(report.iterations, 1);
    }

    #[test]
    fn observer_can_cancel_between_sweeps() {
        // Arrange
        let world = fixtures::four_by_three(1.0, NoiseModel::default());
        let mut solver = Solver::new(&world, SolverLimits::default());
        let mut calls = Vec::new();
        let mut observer = from_fn(|snapshot: &Snapshot<'_>, is_final: bool| {
            calls.push((snapshot.iterations, is_final));
            if snapshot.iterations >= 2 {
                Control::Stop
            } else {
                Control::Continue
            }
        });
        // Act
        let report = solver.value_iteration(UpdateMode::Turbo, &mut observer);
        // Assert
        assert_eq!(report.termination, Termination::Cancelled);
        assert_eq!(report.iterations, 2);
        assert_eq!(calls, vec![(1, false), (2, false), (2, true)]);
    }

    #[test]
    fn observer_sees_every_round_of_policy_iteration() {
        // Arrange
        let world = fixtures::four_by_three(0.9, NoiseModel::default());
        let mut solver = Solver::new(&world, SolverLimits::default());
        let mut rounds = 0;
        let mut finals = 0;
        let mut observer = from_fn(|snapshot: &Snapshot<'_>, is_final: bool| {
            assert!(snapshot.policy.is_some());
            assert_eq!(snapshot.utilities.dim(), (3, 4));
            if is_final {
                finals += 1;
            } else {
                rounds += 1;
                assert_eq!(snapshot.iterations, rounds);
            }
            Control::Continue
        });
        // Act
        let report = solver.policy_iteration(UpdateMode::Standard, &mut observer);
        // Assert
        assert_eq!(report.termination, Termination::Converged);
        assert_eq!(rounds, report.iterations);
        assert_eq!(finals, 1);
    }

    #[test_case(0.0, None; "No discount")]
    #[test_case(0.5, Some(0.1); "Half discount")]
    #[test_case(1.0, Some(0.0); "Full discount")]
    fn convergence_threshold(discount: f64, expected: Option<f64>) {
        let limits = SolverLimits::default();
        match (limits.convergence_threshold(discount), expected) {
            (Some(actual), Some(expected)) => assert_abs_diff_eq!(actual, expected, epsilon = 1e-12),
            (actual, expected) => assert_eq!(actual, expected),
        }
    }

    #[test]
    fn termination_reasons_render() {
        assert_eq!(Termination::Converged.to_string(), "converged");
        assert_eq!(Termination::ExceededIterations.to_string(), "exceeded-iterations");
        assert_eq!(Termination::ExceededTime.to_string(), "exceeded-time");
        assert_eq!(Termination::Cancelled.to_string(), "cancelled");
    }
}
