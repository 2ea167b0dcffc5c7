// SPDX-License-Identifier: CEPL-1.0
use glam::{Vec2, Vec4};

/// Click-drag state in the render target's pixel space, origin bottom-left.
#[derive(Clone, Copy, Debug, Default)]
pub struct MouseTracker {
    current: Vec2,
    last_click: Vec2,
    down: bool,
}

impl MouseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `pointer` is relative to the top-left corner of a region of `size`
    /// pixels. Positions only update while a button is held strictly inside
    /// the region; anything else counts as released.
    pub fn update(&mut self, size: Vec2, pointer: Option<Vec2>, pressed: bool) {
        let inside = pointer.filter(|p| {
            p.x > 0.0 && p.x < size.x && p.y > 0.0 && p.y < size.y
        });

        match inside {
            Some(p) if pressed => {
                self.current = Vec2::new(p.x, size.y - p.y);
                if !self.down {
                    self.last_click = self.current;
                    self.down = true;
                }
            }
            _ => self.down = false,
        }
    }

    pub fn is_down(&self) -> bool {
        self.down
    }

    /// `(x, y, ±click.x, -click.y)`: the sign of `z` tells whether the
    /// button is still held.
    pub fn encode(&self) -> Vec4 {
        let sign = if self.down { 1.0 } else { -1.0 };
        Vec4::new(
            self.current.x,
            self.current.y,
            sign * self.last_click.x,
            -self.last_click.y,
        )
    }
}
