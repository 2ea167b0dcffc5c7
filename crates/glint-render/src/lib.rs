// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic frame orchestration: the frames-in-flight ring, the
//! off-screen render targets, the shader pipeline and its hot reload, and
//! the two-pass command stream that ends in a present.

pub mod clock;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod mouse;
pub mod overlay;
pub mod pipeline;
pub mod push;
pub mod recorder;
pub mod ring;
pub mod sync;
pub mod targets;

pub use ash::vk;

pub use clock::FrameClock;
pub use encoder::{CommandEncoder, Transition};
pub use engine::{Engine, EngineConfig, FrameOutcome, FrameState, FrameStatus};
pub use error::{RenderError, Result};
pub use gpu::{Acquire, Gpu, Present};
pub use overlay::{FrameInput, Overlay, TextureId, UiActions, UiFrame};
pub use pipeline::{Glslc, ShaderCompiler, ShaderSources};
pub use push::PushConstants;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Minimised windows report a zero-area framebuffer.
    pub fn is_zero(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn extent(self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}
