//! Frame time keeping for the Kine engine
//!
//! The engine core never reads a clock itself. The host measures the raw
//! frame delta (see [`FrameTimer`]) and feeds it to a [`FrameClock`], which
//! produces the delta time, fixed timestep, accumulator and interpolation
//! alpha that the scene tree and scheduler consume.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Configuration for frame timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// How many simulated seconds pass per real second
    pub time_scale: f32,
    /// Fixed timestep for fixed-rate updates (in seconds)
    pub fixed_timestep: f32,
    /// Maximum raw delta time accepted per frame
    pub max_delta_time: f32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            fixed_timestep: 1.0 / 60.0,
            max_delta_time: 0.25,
        }
    }
}

/// Per-frame timing state
#[derive(Debug, Clone)]
pub struct FrameClock {
    /// Configuration
    pub config: TimeConfig,
    /// Simulated time since start in seconds
    pub total_time: f64,
    /// Delta time for this frame (clamped and scaled)
    pub delta_time: f32,
    /// Clamped delta time before scaling
    pub unscaled_delta_time: f32,
    /// Frame counter
    pub frame_count: u64,
    /// Whether simulated time is frozen
    pub paused: bool,
    /// Time not yet consumed by fixed-rate steps
    accumulator: f32,
    /// Fractional progress through the current fixed step
    alpha: f32,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(TimeConfig::default())
    }
}

impl FrameClock {
    /// Create a frame clock with custom config
    pub fn new(config: TimeConfig) -> Self {
        Self {
            config,
            total_time: 0.0,
            delta_time: 0.0,
            unscaled_delta_time: 0.0,
            frame_count: 0,
            paused: false,
            accumulator: 0.0,
            alpha: 0.0,
        }
    }

    /// Start a new frame with the raw delta measured by the host.
    pub fn begin_frame(&mut self, raw_delta: f32) {
        self.unscaled_delta_time = raw_delta.clamp(0.0, self.config.max_delta_time);
        self.frame_count += 1;

        if self.paused {
            self.delta_time = 0.0;
        } else {
            self.delta_time = self.unscaled_delta_time * self.config.time_scale;
            self.total_time += self.delta_time as f64;
            self.accumulator += self.delta_time;
        }

        self.alpha = (self.accumulator / self.config.fixed_timestep).clamp(0.0, 1.0);
    }

    /// The fixed timestep in seconds
    pub fn fixed_dt(&self) -> f32 {
        self.config.fixed_timestep
    }

    /// Interpolation factor computed at the start of the frame
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Time waiting to be consumed by fixed-rate steps
    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    /// Mutable accumulator, consumed by the scheduler's catch-up loop
    pub fn accumulator_mut(&mut self) -> &mut f32 {
        &mut self.accumulator
    }

    /// Pause simulated time
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume simulated time
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Set the time scale (0.0 = frozen, 1.0 = normal, 2.0 = double speed)
    pub fn set_time_scale(&mut self, scale: f32) {
        self.config.time_scale = scale.max(0.0);
    }
}

/// Wall-clock frame delta measurement for hosts
#[derive(Debug, Clone)]
pub struct FrameTimer {
    last: Instant,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Seconds elapsed since the previous call (or since creation).
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let delta = now.duration_since(self.last).as_secs_f32();
        self.last = now;
        delta
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_frame_accumulates() {
        let mut clock = FrameClock::default();
        clock.begin_frame(0.01);
        clock.begin_frame(0.01);

        assert_eq!(clock.frame_count, 2);
        assert!((clock.accumulator() - 0.02).abs() < 1e-6);
        assert!((clock.alpha() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn alpha_is_fraction_of_fixed_step() {
        let mut clock = FrameClock::new(TimeConfig {
            fixed_timestep: 0.1,
            ..Default::default()
        });
        clock.begin_frame(0.05);
        assert!((clock.alpha() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn large_delta_is_clamped() {
        let mut clock = FrameClock::default();
        clock.begin_frame(5.0);
        assert_eq!(clock.unscaled_delta_time, 0.25);
        assert!((clock.accumulator() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn negative_delta_is_ignored() {
        let mut clock = FrameClock::default();
        clock.begin_frame(-1.0);
        assert_eq!(clock.delta_time, 0.0);
        assert_eq!(clock.accumulator(), 0.0);
    }

    #[test]
    fn paused_clock_freezes_time() {
        let mut clock = FrameClock::default();
        clock.pause();
        clock.begin_frame(0.016);
        assert_eq!(clock.delta_time, 0.0);
        assert_eq!(clock.accumulator(), 0.0);
        assert_eq!(clock.frame_count, 1);

        clock.resume();
        clock.begin_frame(0.016);
        assert!(clock.delta_time > 0.0);
    }

    #[test]
    fn time_scale_applies() {
        let mut clock = FrameClock::default();
        clock.set_time_scale(2.0);
        clock.begin_frame(0.01);
        assert!((clock.delta_time - 0.02).abs() < 1e-6);

        clock.set_time_scale(-3.0);
        assert_eq!(clock.config.time_scale, 0.0);
    }

    #[test]
    fn timer_is_monotonic() {
        let mut timer = FrameTimer::new();
        assert!(timer.tick() >= 0.0);
    }
}
