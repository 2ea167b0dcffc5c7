// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use glint_render::{CommandEncoder, RenderError, Result, Transition};

use crate::swapchain::color_range;

/// Records straight into one primary command buffer. The pool it came from
/// was created with `RESET_COMMAND_BUFFER`.
pub struct VkEncoder<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
}

impl<'a> VkEncoder<'a> {
    pub fn new(device: &'a ash::Device, cmd: vk::CommandBuffer) -> Self {
        Self { device, cmd }
    }
}

impl CommandEncoder for VkEncoder<'_> {
    fn raw(&self) -> vk::CommandBuffer {
        self.cmd
    }

    fn begin(&mut self) -> Result<()> {
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe {
            self.device
                .reset_command_buffer(self.cmd, vk::CommandBufferResetFlags::empty())
                .map_err(RenderError::at("vkResetCommandBuffer"))?;
            self.device
                .begin_command_buffer(self.cmd, &begin)
                .map_err(RenderError::at("vkBeginCommandBuffer"))
        }
    }

    fn end(&mut self) -> Result<()> {
        unsafe {
            self.device
                .end_command_buffer(self.cmd)
                .map_err(RenderError::at("vkEndCommandBuffer"))
        }
    }

    fn image_barrier(&mut self, t: &Transition) {
        let barrier = vk::ImageMemoryBarrier2 {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
            src_stage_mask: t.src_stage,
            src_access_mask: t.src_access,
            dst_stage_mask: t.dst_stage,
            dst_access_mask: t.dst_access,
            old_layout: t.old_layout,
            new_layout: t.new_layout,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: t.image,
            subresource_range: color_range(),
            ..Default::default()
        };
        let dependency = vk::DependencyInfo {
            s_type: vk::StructureType::DEPENDENCY_INFO,
            image_memory_barrier_count: 1,
            p_image_memory_barriers: &barrier,
            ..Default::default()
        };
        unsafe { self.device.cmd_pipeline_barrier2(self.cmd, &dependency) }
    }

    fn begin_rendering(&mut self, view: vk::ImageView, extent: vk::Extent2D, clear: [f32; 4]) {
        let color = vk::RenderingAttachmentInfo {
            s_type: vk::StructureType::RENDERING_ATTACHMENT_INFO,
            image_view: view,
            image_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue { float32: clear },
            },
            ..Default::default()
        };
        let info = vk::RenderingInfo {
            s_type: vk::StructureType::RENDERING_INFO,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            layer_count: 1,
            color_attachment_count: 1,
            p_color_attachments: &color,
            ..Default::default()
        };
        unsafe { self.device.cmd_begin_rendering(self.cmd, &info) }
    }

    fn end_rendering(&mut self) {
        unsafe { self.device.cmd_end_rendering(self.cmd) }
    }

    fn set_viewport(&mut self, viewport: vk::Viewport) {
        unsafe {
            self.device
                .cmd_set_viewport(self.cmd, 0, std::slice::from_ref(&viewport))
        }
    }

    fn set_scissor(&mut self, scissor: vk::Rect2D) {
        unsafe {
            self.device
                .cmd_set_scissor(self.cmd, 0, std::slice::from_ref(&scissor))
        }
    }

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        }
    }

    fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                std::slice::from_ref(&set),
                &[],
            )
        }
    }

    fn push_constants(
        &mut self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        bytes: &[u8],
    ) {
        unsafe { self.device.cmd_push_constants(self.cmd, layout, stages, 0, bytes) }
    }

    fn draw(&mut self, vertices: u32, instances: u32) {
        unsafe { self.device.cmd_draw(self.cmd, vertices, instances, 0, 0) }
    }
}
