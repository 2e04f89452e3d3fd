//! Core value types used throughout the Kine engine

use serde::{Deserialize, Serialize};

/// RGBA color with components in the 0-255 range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self::rgb(255.0, 255.0, 255.0);
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const GREEN: Self = Self::rgb(0.0, 255.0, 0.0);
    pub const YELLOW: Self = Self::rgb(255.0, 255.0, 0.0);

    /// Create an opaque color
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 255.0 }
    }

    /// Create a color with alpha
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Components normalized to the 0-1 range
    pub fn to_normalized(self) -> [f32; 4] {
        [self.r / 255.0, self.g / 255.0, self.b / 255.0, self.a / 255.0]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_components() {
        let c = Color::rgba(255.0, 0.0, 51.0, 255.0);
        assert_eq!(c.to_normalized(), [1.0, 0.0, 0.2, 1.0]);
    }
}
