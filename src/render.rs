//! Draw command list filled by systems and consumed by a renderer

use glam::Vec2;
use kine_core::Color;

/// Layer used when a command does not name one
pub const DEFAULT_LAYER: i32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Rect {
        pos: Vec2,
        size: Vec2,
        color: Color,
        layer: i32,
    },
    Circle {
        center: Vec2,
        radius: f32,
        color: Color,
        layer: i32,
    },
    Line {
        start: Vec2,
        end: Vec2,
        thickness: f32,
        color: Color,
        layer: i32,
    },
    Sprite {
        texture: String,
        pos: Vec2,
        rotation: f32,
        pivot: Vec2,
        scale: f32,
        layer: i32,
    },
}

impl DrawCommand {
    pub fn layer(&self) -> i32 {
        match self {
            Self::Rect { layer, .. }
            | Self::Circle { layer, .. }
            | Self::Line { layer, .. }
            | Self::Sprite { layer, .. } => *layer,
        }
    }
}

/// Per-frame list of draw commands. The engine clears it in `begin_frame`.
#[derive(Debug, Clone, Default)]
pub struct RenderList {
    commands: Vec<DrawCommand>,
}

impl RenderList {
    pub fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    pub fn draw_rect(&mut self, pos: Vec2, size: Vec2, color: Color) {
        self.push(DrawCommand::Rect {
            pos,
            size,
            color,
            layer: DEFAULT_LAYER,
        });
    }

    pub fn draw_circle(&mut self, center: Vec2, radius: f32, color: Color) {
        self.push(DrawCommand::Circle {
            center,
            radius,
            color,
            layer: DEFAULT_LAYER,
        });
    }

    pub fn draw_line(&mut self, start: Vec2, end: Vec2, thickness: f32, color: Color) {
        self.push(DrawCommand::Line {
            start,
            end,
            thickness,
            color,
            layer: DEFAULT_LAYER,
        });
    }

    pub fn draw_sprite(&mut self, texture: impl Into<String>, pos: Vec2, rotation: f32, pivot: Vec2) {
        self.push(DrawCommand::Sprite {
            texture: texture.into(),
            pos,
            rotation,
            pivot,
            scale: 1.0,
            layer: DEFAULT_LAYER,
        });
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Commands ordered by layer; submission order is kept within a layer.
    pub fn sorted_by_layer(&self) -> Vec<&DrawCommand> {
        let mut sorted: Vec<_> = self.commands.iter().collect();
        sorted.sort_by_key(|command| command.layer());
        sorted
    }

    pub fn drain(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
