//! Kine Core - Core types and utilities for the Kine engine
//!
//! This crate provides the foundational types shared by the engine crates:
//! - 2D math primitives (re-exported from glam)
//! - Frame time keeping with a fixed-timestep accumulator
//! - Common value types such as [`Color`]

pub mod time;
pub mod types;

pub use glam::{vec2, Vec2};
pub use time::{FrameClock, FrameTimer, TimeConfig};
pub use types::Color;
