// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::encoder::{CommandEncoder, Transition};
use crate::gpu::SwapchainImage;
use crate::push::PushConstants;
use crate::Result;

const OPAQUE_BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Everything one frame's command buffer references.
#[derive(Clone, Copy, Debug)]
pub struct FramePlan {
    pub target_image: vk::Image,
    pub target_view: vk::ImageView,
    pub target_extent: vk::Extent2D,
    pub swapchain: SwapchainImage,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub push: PushConstants,
}

/// Viewport with the Y axis pointing up.
pub fn flipped_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: extent.height as f32,
        width: extent.width as f32,
        height: -(extent.height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Records the off-screen shader pass followed by the overlay composite pass.
pub fn record_frame(
    enc: &mut dyn CommandEncoder,
    plan: &FramePlan,
    overlay: impl FnOnce(&mut dyn CommandEncoder),
) -> Result<()> {
    enc.begin()?;

    enc.image_barrier(&Transition::target_to_attachment(plan.target_image));
    enc.begin_rendering(plan.target_view, plan.target_extent, OPAQUE_BLACK);
    enc.set_viewport(flipped_viewport(plan.target_extent));
    enc.set_scissor(vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: plan.target_extent,
    });
    enc.bind_pipeline(plan.pipeline);
    enc.push_constants(
        plan.layout,
        vk::ShaderStageFlags::FRAGMENT,
        plan.push.as_bytes(),
    );
    enc.draw(3, 1);
    enc.end_rendering();
    enc.image_barrier(&Transition::target_to_sampled(plan.target_image));

    enc.image_barrier(&Transition::present_to_attachment(plan.swapchain.image));
    enc.begin_rendering(plan.swapchain.view, plan.swapchain.extent, OPAQUE_BLACK);
    overlay(enc);
    enc.end_rendering();
    enc.image_barrier(&Transition::attachment_to_present(plan.swapchain.image));

    enc.end()
}

/// Composite pass with nothing drawn: clears `swapchain` to opaque black and
/// hands it back for presentation.
pub fn record_cleared(enc: &mut dyn CommandEncoder, swapchain: &SwapchainImage) -> Result<()> {
    enc.begin()?;
    enc.image_barrier(&Transition::present_to_attachment(swapchain.image));
    enc.begin_rendering(swapchain.view, swapchain.extent, OPAQUE_BLACK);
    enc.end_rendering();
    enc.image_barrier(&Transition::attachment_to_present(swapchain.image));
    enc.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_is_flipped() {
        let v = flipped_viewport(vk::Extent2D { width: 800, height: 600 });
        assert_eq!((v.x, v.y, v.width, v.height), (0.0, 600.0, 800.0, -600.0));
    }
}
