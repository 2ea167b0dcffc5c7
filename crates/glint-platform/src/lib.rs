// SPDX-License-Identifier: CEPL-1.0
//! Window creation and the per-frame input snapshot fed to the engine.

pub use winit;

use anyhow::{Context, Result};
use glam::Vec2;
use glint_render::{FrameInput, RenderSize, UiActions};
use tracing::debug;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::Window;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowSpec {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            title: "glint".into(),
            width: 800,
            height: 632,
        }
    }
}

pub fn create_window(event_loop: &ActiveEventLoop, spec: &WindowSpec) -> Result<Window> {
    let attrs = Window::default_attributes()
        .with_title(spec.title.clone())
        .with_inner_size(LogicalSize::new(spec.width, spec.height));
    event_loop.create_window(attrs).context("create_window")
}

/// Physical pixels; zero on either axis while minimised.
pub fn framebuffer_size(window: &Window) -> RenderSize {
    let size = window.inner_size();
    RenderSize::new(size.width, size.height)
}

/// Accumulates window events between frames.
#[derive(Debug, Default)]
pub struct InputState {
    cursor: Option<Vec2>,
    mouse_down: bool,
    actions: UiActions,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_moved(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::CursorLeft { .. } => self.cursor = None,
            WindowEvent::MouseInput { state, button, .. } => self.mouse_button(*button, *state),
            WindowEvent::Focused(false) => self.mouse_down = false,
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.key(code, event.state, event.repeat);
                }
            }
            _ => {}
        }
    }

    pub fn cursor_moved(&mut self, position: Vec2) {
        self.cursor = Some(position);
    }

    pub fn mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if button == MouseButton::Left {
            self.mouse_down = state.is_pressed();
        }
    }

    /// R restarts, Space toggles play/stop, F5 recompiles.
    pub fn key(&mut self, code: KeyCode, state: ElementState, repeat: bool) {
        if !state.is_pressed() || repeat {
            return;
        }
        match code {
            KeyCode::KeyR => self.actions.restart = true,
            KeyCode::Space => self.actions.toggle_play = true,
            KeyCode::F5 => self.actions.recompile = true,
            _ => return,
        }
        debug!(?code, "transport key");
    }

    /// Snapshot for one frame. Pending actions are consumed.
    pub fn frame_input(&mut self, framebuffer: RenderSize) -> FrameInput {
        FrameInput {
            framebuffer,
            cursor: self.cursor,
            mouse_down: self.mouse_down,
            actions: std::mem::take(&mut self.actions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_fire_once_per_press() {
        let mut input = InputState::new();
        input.key(KeyCode::F5, ElementState::Pressed, false);
        input.key(KeyCode::F5, ElementState::Pressed, true);
        input.key(KeyCode::Space, ElementState::Released, false);

        let first = input.frame_input(RenderSize::new(800, 632));
        assert!(first.actions.recompile);
        assert!(!first.actions.toggle_play && !first.actions.restart);

        let second = input.frame_input(RenderSize::new(800, 632));
        assert_eq!(second.actions, UiActions::default());
    }

    #[test]
    fn only_the_left_button_counts() {
        let mut input = InputState::new();
        input.cursor_moved(Vec2::new(10.0, 20.0));
        input.mouse_button(MouseButton::Right, ElementState::Pressed);
        assert!(!input.frame_input(RenderSize::new(1, 1)).mouse_down);

        input.mouse_button(MouseButton::Left, ElementState::Pressed);
        let snap = input.frame_input(RenderSize::new(1, 1));
        assert!(snap.mouse_down);
        assert_eq!(snap.cursor, Some(Vec2::new(10.0, 20.0)));

        input.mouse_button(MouseButton::Left, ElementState::Released);
        assert!(!input.frame_input(RenderSize::new(1, 1)).mouse_down);
    }

    #[test]
    fn other_keys_are_ignored() {
        let mut input = InputState::new();
        input.key(KeyCode::KeyQ, ElementState::Pressed, false);
        assert!(!input.frame_input(RenderSize::default()).actions.any());
    }
}
