// SPDX-License-Identifier: CEPL-1.0
//! The UI collaborator: decides the viewport region, owns the displayable
//! textures and composites its draw data over the swapchain image.

use ash::vk;
use glam::Vec2;

use crate::encoder::CommandEncoder;
use crate::gpu::Gpu;
use crate::{RenderSize, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Transport buttons pressed since the previous frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UiActions {
    pub restart: bool,
    pub toggle_play: bool,
    pub recompile: bool,
}

impl UiActions {
    pub fn any(&self) -> bool {
        self.restart || self.toggle_play || self.recompile
    }
}

/// Window-side state sampled once per frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameInput {
    pub framebuffer: RenderSize,
    /// Cursor in window pixels, `None` when outside the window.
    pub cursor: Option<Vec2>,
    pub mouse_down: bool,
    pub actions: UiActions,
}

/// What the overlay decided for this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UiFrame {
    /// Where the render target is shown, in framebuffer pixels. Its extent is
    /// the render-target size.
    pub region: vk::Rect2D,
    /// Cursor relative to the region's top-left corner.
    pub pointer: Option<Vec2>,
    pub pressed: bool,
    pub actions: UiActions,
}

pub trait Overlay<G: Gpu> {
    type DrawData;

    fn register_texture(&mut self, gpu: &mut G, view: vk::ImageView) -> Result<TextureId>;
    fn unregister_texture(&mut self, gpu: &mut G, texture: TextureId);

    fn layout(&mut self, input: &FrameInput) -> UiFrame;
    fn compose(&mut self, texture: TextureId, frame: &UiFrame) -> Self::DrawData;

    /// Records into the composite pass, which is already begun over the
    /// swapchain image.
    fn render(&mut self, encoder: &mut dyn CommandEncoder, data: &Self::DrawData);

    /// Releases everything still registered. Called once, after a device
    /// idle wait.
    fn destroy(&mut self, gpu: &mut G);
}

/// The framebuffer minus a bottom strip of `bar` pixels, never smaller than
/// one pixel on either axis.
pub fn viewport_region(framebuffer: RenderSize, bar: u32) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: vk::Extent2D {
            width: framebuffer.width.max(1),
            height: framebuffer.height.saturating_sub(bar).max(1),
        },
    }
}

/// Cursor position relative to `region`.
pub fn localize(cursor: Option<Vec2>, region: vk::Rect2D) -> Option<Vec2> {
    cursor.map(|c| c - Vec2::new(region.offset.x as f32, region.offset.y as f32))
}

impl UiFrame {
    /// Layout shared by overlays that show the target above a status strip.
    pub fn with_status_bar(input: &FrameInput, bar: u32) -> Self {
        let region = viewport_region(input.framebuffer, bar);
        Self {
            region,
            pointer: localize(input.cursor, region),
            pressed: input.mouse_down,
            actions: input.actions,
        }
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(
            self.region.extent.width as f32,
            self.region.extent.height as f32,
        )
    }
}
