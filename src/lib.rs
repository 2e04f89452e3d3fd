//! Kine - a small real-time simulation engine
//!
//! A scene tree of behaviour nodes bound to an entity-component world, and
//! a dependency-ordered system scheduler running at a variable and a fixed
//! rate. [`Engine`] ties them together with a frame clock and a handful of
//! context objects (input, draw list, frame timing) stored in the world.

pub mod config;
pub mod context;
mod engine;
pub mod render;

pub use config::{ConfigError, DemoConfig, EngineConfig, SchedulerConfig};
pub use context::{FrameTiming, Input, Key, MouseButton, Running};
pub use engine::Engine;
pub use render::{DrawCommand, RenderList};

pub use kine_core::{vec2, Color, FrameClock, FrameTimer, TimeConfig, Vec2};
pub use kine_ecs::{
    Component, DefaultBundle, EcsError, Entity, ScheduleError, Scheduler, System, View, World,
};
pub use kine_scene::{EmptyNode, Node, NodeContext, NodeData, NodeId, SceneError, SceneGraph, SceneTree};
