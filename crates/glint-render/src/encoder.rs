// SPDX-License-Identifier: CEPL-1.0
//! Command-stream vocabulary shared by the recorder and the backends.

use ash::vk;

/// A single-image layout transition with its synchronization2 scopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl Transition {
    /// Off-screen target before the shader pass. Previous contents are
    /// discarded so nothing has to be waited on.
    pub fn target_to_attachment(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            dst_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        }
    }

    /// Off-screen target after the shader pass, sampled by the overlay.
    pub fn target_to_sampled(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            src_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
            dst_access: vk::AccessFlags2::SHADER_READ,
        }
    }

    /// Swapchain image before the composite pass. The source stage matches
    /// the submit's image-available wait stage.
    pub fn present_to_attachment(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            dst_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        }
    }

    pub fn attachment_to_present(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            src_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            dst_stage: vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            dst_access: vk::AccessFlags2::NONE,
        }
    }
}

/// Recording surface over one primary command buffer.
///
/// Implementations only translate calls; ordering is owned by
/// [`crate::recorder::record_frame`].
pub trait CommandEncoder {
    fn raw(&self) -> vk::CommandBuffer;

    /// Resets and begins the buffer for one-time submission.
    fn begin(&mut self) -> crate::Result<()>;
    fn end(&mut self) -> crate::Result<()>;

    fn image_barrier(&mut self, transition: &Transition);

    /// Single colour attachment, cleared on load, stored on exit.
    fn begin_rendering(&mut self, view: vk::ImageView, extent: vk::Extent2D, clear: [f32; 4]);
    fn end_rendering(&mut self);

    fn set_viewport(&mut self, viewport: vk::Viewport);
    fn set_scissor(&mut self, scissor: vk::Rect2D);
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);
    fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet);
    fn push_constants(
        &mut self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        bytes: &[u8],
    );
    fn draw(&mut self, vertices: u32, instances: u32);
}
