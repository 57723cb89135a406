use std::fmt;

use ndarray::Array2;

use crate::world::{Action, GridWorld, Position};

/// A chosen action for every void cell. Walls and terminal cells have none.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyGrid {
    actions: Array2<Option<Action>>,
}

impl PolicyGrid {
    /// Policy that picks `initial` everywhere an action is possible.
    pub fn new(world: &GridWorld, initial: Action) -> PolicyGrid {
        let actions = Array2::from_shape_fn(world.grid().dim(), |(y, x)| {
            world.is_void(Position::new(x, y)).then_some(initial)
        });
        PolicyGrid { actions }
    }

    pub fn action_at(&self, pos: Position) -> Option<Action> {
        self.actions.get(pos.index()).copied().flatten()
    }

    pub(crate) fn set(&mut self, pos: Position, action: Action) {
        self.actions[pos.index()] = Some(action);
    }

    /// Action matrix indexed `[[row, column]]`.
    pub fn actions(&self) -> &Array2<Option<Action>> {
        &self.actions
    }
}

impl fmt::Display for PolicyGrid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (y, row) in self.actions.rows().into_iter().enumerate() {
            if y > 0 {
                writeln!(f)?;
            }
            let line: Vec<String> = row
                .iter()
                .map(|a| a.map_or('_', Action::symbol).to_string())
                .collect();
            write!(f, "{}", line.join(" "))?;
        }
        Ok(())
    }
}

/// Q-values of the four actions of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QValues([f64; 4]);

impl QValues {
    pub fn get(&self, action: Action) -> f64 {
        self.0[action.index()]
    }

    /// Pairs in canonical action order.
    pub fn iter(&self) -> impl Iterator<Item = (Action, f64)> + '_ {
        Action::ALL.iter().map(move |&a| (a, self.get(a)))
    }

    /// Highest valued action, the earliest one on ties.
    pub fn best(&self) -> Action {
        argmax(self.iter()).map_or(Action::North, |(action, _)| action)
    }
}

// First strictly greater value wins, so ties keep the earlier action.
pub(crate) fn argmax<I>(values: I) -> Option<(Action, f64)>
where
    I: IntoIterator<Item = (Action, f64)>,
{
    let mut best: Option<(Action, f64)> = None;
    for (action, value) in values {
        match best {
            Some((_, top)) if value <= top => {}
            _ => best = Some((action, value)),
        }
    }
    best
}

/// `Q(s, a) = R(s) + discount * sum(p * U(s'))` over the outcomes of `action`.
///
/// `None` unless `pos` is a void cell.
pub fn q_value(
    world: &GridWorld,
    utilities: &Array2<f64>,
    pos: Position,
    action: Action,
) -> Option<f64> {
    if !world.is_void(pos) {
        return None;
    }
    let reward = world.reward_at(pos)?;
    Some(reward + world.discount() * world.expected_utility(pos, action, utilities))
}

pub fn q_values(world: &GridWorld, utilities: &Array2<f64>, pos: Position) -> Option<QValues> {
    if !world.is_void(pos) {
        return None;
    }
    let mut values = [0.0; 4];
    for action in Action::ALL {
        values[action.index()] = q_value(world, utilities, pos, action)?;
    }
    Some(QValues(values))
}

pub fn greedy_from_q_values(
    world: &GridWorld,
    utilities: &Array2<f64>,
    pos: Position,
) -> Option<Action> {
    q_values(world, utilities, pos).map(|q| q.best())
}

/// Same choice as [`greedy_from_q_values`], ranked on expected next-state
/// utility alone so no Q-value table is built.
pub fn greedy_from_utility(
    world: &GridWorld,
    utilities: &Array2<f64>,
    pos: Position,
) -> Option<Action> {
    if !world.is_void(pos) {
        return None;
    }
    // With no discount every Q-value equals the reward, so all actions tie.
    if world.discount() == 0.0 {
        return Some(Action::ALL[0]);
    }
    argmax(
        Action::ALL
            .iter()
            .map(|&a| (a, world.expected_utility(pos, a, utilities))),
    )
    .map(|(action, _)| action)
}

/// Greedy action of every void cell.
pub fn greedy_policy(world: &GridWorld, utilities: &Array2<f64>) -> PolicyGrid {
    let mut policy = PolicyGrid::new(world, Action::North);
    for pos in world.grid().positions() {
        if let Some(action) = greedy_from_utility(world, utilities, pos) {
            policy.set(pos, action);
        }
    }
    policy
}
