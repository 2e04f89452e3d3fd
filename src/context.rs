//! Context objects the engine installs in the scene tree's world
//!
//! Systems and nodes reach them through `World::context` instead of globals.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use glam::Vec2;

/// Main loop flag. Cleared by [`Engine::request_exit`](crate::Engine::request_exit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Running(pub bool);

/// Timing of the frame being simulated
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTiming {
    /// Scaled variable delta (in seconds)
    pub dt: f32,
    pub fixed_dt: f32,
    /// Interpolation factor between fixed steps (0-1)
    pub alpha: f32,
    pub frame: u64,
}

/// Host key code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key(pub u16);

impl Key {
    pub const SPACE: Self = Self(32);
    pub const R: Self = Self(82);
    pub const ESCAPE: Self = Self(256);
}

/// Host mouse button index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MouseButton(pub u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const RIGHT: Self = Self(1);
    pub const MIDDLE: Self = Self(2);
}

/// Current and previous-frame state of a set of buttons.
#[derive(Debug, Clone)]
pub struct ButtonState<T: Eq + Hash + Copy> {
    current: HashSet<T>,
    previous: HashSet<T>,
}

impl<T: Eq + Hash + Copy> ButtonState<T> {
    pub fn new() -> Self {
        Self {
            current: HashSet::new(),
            previous: HashSet::new(),
        }
    }

    pub fn set(&mut self, input: T, down: bool) {
        if down {
            self.current.insert(input);
        } else {
            self.current.remove(&input);
        }
    }

    /// Held this frame
    pub fn down(&self, input: T) -> bool {
        self.current.contains(&input)
    }

    /// Down this frame, up the previous one
    pub fn pressed(&self, input: T) -> bool {
        self.current.contains(&input) && !self.previous.contains(&input)
    }

    /// Up this frame, down the previous one
    pub fn released(&self, input: T) -> bool {
        !self.current.contains(&input) && self.previous.contains(&input)
    }

    fn roll(&mut self) {
        self.previous.clone_from(&self.current);
    }
}

impl<T: Eq + Hash + Copy> Default for ButtonState<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
struct ActionBinding {
    keys: Vec<Key>,
    mouse_buttons: Vec<MouseButton>,
}

/// Keyboard and mouse state fed by the host.
///
/// The host calls the `set_*` methods from its event handling; the engine
/// rolls the state over in [`Input::begin_frame`] so that `*_pressed` and
/// `*_released` report edges relative to the previous frame.
#[derive(Debug, Clone, Default)]
pub struct Input {
    keys: ButtonState<Key>,
    mouse: ButtonState<MouseButton>,
    cursor: Vec2,
    previous_cursor: Vec2,
    scroll: Vec2,
    bindings: HashMap<String, ActionBinding>,
}

impl Input {
    pub fn begin_frame(&mut self) {
        self.keys.roll();
        self.mouse.roll();
        self.previous_cursor = self.cursor;
        self.scroll = Vec2::ZERO;
    }

    pub fn set_key_state(&mut self, key: Key, down: bool) {
        self.keys.set(key, down);
    }

    pub fn set_mouse_button_state(&mut self, button: MouseButton, down: bool) {
        self.mouse.set(button, down);
    }

    pub fn set_cursor_position(&mut self, position: Vec2) {
        self.cursor = position;
    }

    pub fn set_scroll(&mut self, scroll: Vec2) {
        self.scroll = scroll;
    }

    pub fn key_down(&self, key: Key) -> bool {
        self.keys.down(key)
    }

    pub fn key_pressed(&self, key: Key) -> bool {
        self.keys.pressed(key)
    }

    pub fn key_released(&self, key: Key) -> bool {
        self.keys.released(key)
    }

    pub fn mouse_down(&self, button: MouseButton) -> bool {
        self.mouse.down(button)
    }

    pub fn mouse_pressed(&self, button: MouseButton) -> bool {
        self.mouse.pressed(button)
    }

    pub fn mouse_released(&self, button: MouseButton) -> bool {
        self.mouse.released(button)
    }

    pub fn cursor_position(&self) -> Vec2 {
        self.cursor
    }

    pub fn cursor_delta(&self) -> Vec2 {
        self.cursor - self.previous_cursor
    }

    /// Scroll offset received this frame
    pub fn scroll(&self) -> Vec2 {
        self.scroll
    }

    pub fn bind_key(&mut self, action: impl Into<String>, key: Key) {
        self.bindings.entry(action.into()).or_default().keys.push(key);
    }

    pub fn bind_mouse_button(&mut self, action: impl Into<String>, button: MouseButton) {
        self.bindings
            .entry(action.into())
            .or_default()
            .mouse_buttons
            .push(button);
    }

    /// Any input bound to `action` is held. Unbound actions are never down.
    pub fn action_down(&self, action: &str) -> bool {
        self.bindings.get(action).is_some_and(|binding| {
            binding.keys.iter().any(|&k| self.key_down(k))
                || binding.mouse_buttons.iter().any(|&b| self.mouse_down(b))
        })
    }

    pub fn action_pressed(&self, action: &str) -> bool {
        self.bindings.get(action).is_some_and(|binding| {
            binding.keys.iter().any(|&k| self.key_pressed(k))
                || binding.mouse_buttons.iter().any(|&b| self.mouse_pressed(b))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_edges() {
        let mut input = Input::default();
        input.set_key_state(Key::SPACE, true);
        assert!(input.key_down(Key::SPACE));
        assert!(input.key_pressed(Key::SPACE));

        input.begin_frame();
        assert!(input.key_down(Key::SPACE));
        assert!(!input.key_pressed(Key::SPACE));

        input.set_key_state(Key::SPACE, false);
        assert!(input.key_released(Key::SPACE));
        input.begin_frame();
        assert!(!input.key_released(Key::SPACE));
    }

    #[test]
    fn mouse_and_cursor() {
        let mut input = Input::default();
        input.set_cursor_position(Vec2::new(10.0, 5.0));
        input.begin_frame();
        input.set_cursor_position(Vec2::new(12.0, 1.0));
        input.set_scroll(Vec2::new(0.0, 1.0));
        input.set_mouse_button_state(MouseButton::LEFT, true);

        assert_eq!(input.cursor_delta(), Vec2::new(2.0, -4.0));
        assert!(input.mouse_pressed(MouseButton::LEFT));
        assert_eq!(input.scroll(), Vec2::new(0.0, 1.0));

        input.begin_frame();
        assert_eq!(input.scroll(), Vec2::ZERO);
        assert!(!input.mouse_pressed(MouseButton::LEFT));
        assert!(input.mouse_down(MouseButton::LEFT));
    }

    #[test]
    fn action_bindings() {
        let mut input = Input::default();
        input.bind_key("flap", Key::SPACE);
        input.bind_mouse_button("flap", MouseButton::LEFT);
        assert!(!input.action_down("flap"));
        assert!(!input.action_down("unbound"));

        input.set_mouse_button_state(MouseButton::LEFT, true);
        assert!(input.action_down("flap"));
        assert!(input.action_pressed("flap"));
    }
}
