// SPDX-License-Identifier: CEPL-1.0
//! The device capabilities the frame loop needs, expressed over raw `vk`
//! handles so the orchestration logic can run against any backend.

use ash::vk;

use crate::encoder::CommandEncoder;
use crate::{RenderSize, Result};

/// One slot of the frames-in-flight ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    /// Created signaled so the first wait on a fresh slot returns at once.
    pub in_flight: vk::Fence,
    pub commands: vk::CommandBuffer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
    Failed(vk::Result),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Present {
    Done,
    /// `OUT_OF_DATE` or `SUBOPTIMAL`: the chain has to be rebuilt.
    Stale,
    Failed(vk::Result),
}

#[derive(Clone, Copy, Debug)]
pub struct Submission {
    pub commands: vk::CommandBuffer,
    pub wait: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal: vk::Semaphore,
    pub fence: vk::Fence,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
}

/// Opaque handle to the memory backing a render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AllocationId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub allocation: AllocationId,
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineDesc {
    pub layout: vk::PipelineLayout,
    pub vertex: vk::ShaderModule,
    pub fragment: vk::ShaderModule,
    pub color_format: vk::Format,
    pub cull_mode: vk::CullModeFlags,
}

pub trait Gpu {
    type Encoder<'a>: CommandEncoder
    where
        Self: 'a;

    fn wait_idle(&self) -> Result<()>;

    fn create_frame_sync(&mut self) -> Result<FrameSync>;
    fn destroy_frame_sync(&mut self, sync: FrameSync);

    /// Blocks without timeout.
    fn wait_fence(&self, fence: vk::Fence) -> Result<()>;
    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;

    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Acquire;
    fn submit(&mut self, submission: &Submission) -> Result<()>;
    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> Present;

    /// Rebuilds the swapchain, passing the previous one as a hint. Every
    /// handle returned by [`Gpu::swapchain_image`] before the call is stale
    /// afterwards.
    fn rebuild_swapchain(&mut self, hint: RenderSize) -> Result<()>;
    fn swapchain_image(&self, index: u32) -> Option<SwapchainImage>;

    /// Device-local, sampled + colour-attachment, single mip and sample,
    /// backed by a dedicated allocation.
    fn create_render_target(&mut self, extent: vk::Extent2D) -> Result<TargetImage>;
    fn destroy_render_target(&mut self, target: TargetImage);

    fn create_shader_module(&mut self, code: &[u32]) -> Result<vk::ShaderModule>;
    fn destroy_shader_module(&mut self, module: vk::ShaderModule);

    fn create_pipeline_layout(
        &mut self,
        push_constants: vk::PushConstantRange,
    ) -> Result<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout);

    fn create_graphics_pipeline(&mut self, desc: &PipelineDesc) -> Result<vk::Pipeline>;
    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline);

    fn encoder(&self, commands: vk::CommandBuffer) -> Self::Encoder<'_>;
}
