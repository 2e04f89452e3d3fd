//! Kine ECS - Component store and system scheduler
//!
//! A type-indexed component store built on generational entity handles and
//! sparse-set storage, plus a dependency-ordered scheduler that drives named
//! systems at variable and fixed rates over the same [`World`].

mod component;
mod context;
mod entity;
mod error;
mod query;
mod system;
mod world;

pub use component::Component;
pub use entity::Entity;
pub use error::EcsError;
pub use query::{ComponentSet, DefaultBundle, QueryIter, ReadOnlyWorldQuery, View, ViewIter, WorldQuery};
pub use system::{ScheduleError, Scheduler, System, FIXED_STEP_EPSILON};
pub use world::World;
