//! Named systems and the dependency-ordered scheduler that drives them.

use std::collections::HashMap;

use tracing::{debug, error, warn};

use crate::world::World;

/// Slack applied when comparing the fixed-step accumulator with the timestep,
/// so that time adding up to whole steps is not lost to float rounding.
pub const FIXED_STEP_EPSILON: f32 = 1e-6;

/// A unit of per-frame logic run over the world.
pub trait System: Send + Sync {
    fn run(&mut self, world: &mut World, dt: f32, alpha: f32);
}

/// Blanket implementation so closures and plain functions can be used as systems.
impl<F: FnMut(&mut World, f32, f32) + Send + Sync> System for F {
    fn run(&mut self, world: &mut World, dt: f32, alpha: f32) {
        (self)(world, dt, alpha);
    }
}

/// Scheduling failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("unknown system '{0}'")]
    UnknownSystem(String),

    #[error("dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },
}

struct Registration {
    name: String,
    system: Box<dyn System>,
    /// Systems that must run after this one.
    successors: Vec<usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Registry of named systems with "runs before" constraints.
///
/// The execution order is derived by a depth-first topological sort and
/// cached until a registration changes. Systems with no relative constraint
/// run in registration order.
pub struct Scheduler {
    systems: Vec<Registration>,
    by_name: HashMap<String, usize>,
    order: Vec<usize>,
    dirty: bool,
    cycle_reported: bool,
    max_fixed_steps: Option<u32>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            by_name: HashMap::new(),
            order: Vec::new(),
            dirty: true,
            cycle_reported: false,
            max_fixed_steps: None,
        }
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.cycle_reported = false;
    }

    /// Register a system under `name`, replacing the callable of an existing
    /// system with that name. A replaced system keeps its position and edges.
    pub fn add_system<S: System + 'static>(&mut self, name: impl Into<String>, system: S) {
        let name = name.into();
        match self.by_name.get(&name) {
            Some(&idx) => {
                debug!("replacing system '{name}'");
                self.systems[idx].system = Box::new(system);
            }
            None => {
                debug!("registered system '{name}'");
                self.by_name.insert(name.clone(), self.systems.len());
                self.systems.push(Registration {
                    name,
                    system: Box::new(system),
                    successors: Vec::new(),
                });
            }
        }
        self.mark_dirty();
    }

    fn lookup(&self, name: &str) -> Result<usize, ScheduleError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ScheduleError::UnknownSystem(name.to_string()))
    }

    /// Require `before` to run earlier than `after`. Both must already be
    /// registered; otherwise nothing changes.
    pub fn add_dependency(&mut self, before: &str, after: &str) -> Result<(), ScheduleError> {
        let (from, to) = match (self.lookup(before), self.lookup(after)) {
            (Ok(from), Ok(to)) => (from, to),
            (Err(err), _) | (_, Err(err)) => {
                warn!("rejected dependency {before} -> {after}: {err}");
                return Err(err);
            }
        };
        let successors = &mut self.systems[from].successors;
        if !successors.contains(&to) {
            successors.push(to);
        }
        self.mark_dirty();
        Ok(())
    }

    /// Drop a `before -> after` constraint. Returns `true` if it existed.
    pub fn remove_dependency(&mut self, before: &str, after: &str) -> bool {
        let (Ok(from), Ok(to)) = (self.lookup(before), self.lookup(after)) else {
            return false;
        };
        let successors = &mut self.systems[from].successors;
        let Some(pos) = successors.iter().position(|&s| s == to) else {
            return false;
        };
        successors.remove(pos);
        self.mark_dirty();
        true
    }

    /// Recompute the cached execution order.
    ///
    /// On a cycle the cached order is left empty and the scheduler stays dirty.
    pub fn rebuild_order(&mut self) -> Result<(), ScheduleError> {
        self.order.clear();

        let mut marks = vec![Mark::Unvisited; self.systems.len()];
        let mut post_order = Vec::with_capacity(self.systems.len());
        let mut path = Vec::new();

        // Reverse registration order here, reversed again below, keeps
        // unconstrained systems in the order they were added.
        for root in (0..self.systems.len()).rev() {
            if marks[root] == Mark::Unvisited {
                self.visit(root, &mut marks, &mut post_order, &mut path)?;
            }
        }

        post_order.reverse();
        self.order = post_order;
        self.dirty = false;
        Ok(())
    }

    fn visit(
        &self,
        idx: usize,
        marks: &mut [Mark],
        post_order: &mut Vec<usize>,
        path: &mut Vec<usize>,
    ) -> Result<(), ScheduleError> {
        match marks[idx] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let start = path.iter().position(|&p| p == idx).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..]
                    .iter()
                    .map(|&p| self.systems[p].name.clone())
                    .collect();
                cycle.push(self.systems[idx].name.clone());
                return Err(ScheduleError::Cycle { path: cycle });
            }
            Mark::Unvisited => {}
        }

        marks[idx] = Mark::InProgress;
        path.push(idx);
        for &next in self.systems[idx].successors.iter().rev() {
            self.visit(next, marks, post_order, path)?;
        }
        path.pop();
        marks[idx] = Mark::Done;
        post_order.push(idx);
        Ok(())
    }

    /// Rebuild if needed. `false` means this frame's systems must not run.
    fn ensure_order(&mut self) -> bool {
        if !self.dirty {
            return true;
        }
        match self.rebuild_order() {
            Ok(()) => {
                debug!(order = ?self.order(), "rebuilt system order");
                true
            }
            Err(err) => {
                if self.cycle_reported {
                    debug!("skipping systems: {err}");
                } else {
                    error!("skipping systems until the schedule is fixed: {err}");
                    self.cycle_reported = true;
                }
                false
            }
        }
    }

    fn run_once(&mut self, world: &mut World, dt: f32, alpha: f32) {
        let Self { systems, order, .. } = self;
        for &idx in order.iter() {
            systems[idx].system.run(world, dt, alpha);
        }
    }

    /// Run every system once in dependency order. Returns how many ran,
    /// which is zero when the schedule contains a cycle.
    pub fn update(&mut self, world: &mut World, dt: f32, alpha: f32) -> usize {
        if !self.ensure_order() {
            return 0;
        }
        self.run_once(world, dt, alpha);
        self.order.len()
    }

    /// Fixed-timestep catch-up loop: while at least `fixed_dt` has
    /// accumulated, run every system with `fixed_dt` and consume one step.
    /// Returns the number of steps taken.
    ///
    /// With a step cap set, whole steps beyond the cap are discarded and only
    /// the fractional remainder stays in the accumulator. An accumulator so
    /// large that subtracting `fixed_dt` no longer changes it is discarded.
    pub fn fixed_update(
        &mut self,
        world: &mut World,
        accumulator: &mut f32,
        fixed_dt: f32,
        alpha: f32,
    ) -> u32 {
        if !self.ensure_order() {
            return 0;
        }
        if fixed_dt <= 0.0 {
            warn!("fixed_update called with non-positive timestep {fixed_dt}");
            return 0;
        }

        let mut steps = 0;
        while *accumulator + FIXED_STEP_EPSILON >= fixed_dt {
            if self.max_fixed_steps.is_some_and(|max| steps >= max) {
                let remainder = accumulator.rem_euclid(fixed_dt);
                warn!(
                    steps,
                    dropped = *accumulator - remainder,
                    "fixed-step catch-up capped, simulation time dropped"
                );
                *accumulator = remainder;
                break;
            }
            let next = (*accumulator - fixed_dt).max(0.0);
            if next == *accumulator {
                warn!(
                    steps,
                    dropped = *accumulator,
                    "accumulator too large for fixed step {fixed_dt}, simulation time dropped"
                );
                *accumulator = 0.0;
                break;
            }
            self.run_once(world, fixed_dt, alpha);
            *accumulator = next;
            steps += 1;
        }
        steps
    }

    /// Cap the number of catch-up steps per [`Scheduler::fixed_update`] call.
    /// `None` removes the cap.
    pub fn set_max_fixed_steps(&mut self, max: Option<u32>) {
        self.max_fixed_steps = max;
    }

    pub fn max_fixed_steps(&self) -> Option<u32> {
        self.max_fixed_steps
    }

    /// The cached execution order (empty until built, or after a cycle).
    pub fn order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&idx| self.systems[idx].name.as_str())
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Number of registered systems.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Forget every system and dependency.
    pub fn clear(&mut self) {
        self.systems.clear();
        self.by_name.clear();
        self.order.clear();
        self.mark_dirty();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
