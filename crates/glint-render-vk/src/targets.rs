// SPDX-License-Identifier: CEPL-1.0
//! Off-screen colour images backed by dedicated `gpu-allocator` blocks.

use ash::vk;
use glint_render::targets::TARGET_FORMAT;
use glint_render::{RenderError, Result};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::{AllocationError, MemoryLocation};

use crate::swapchain::color_range;

pub struct TargetMemory {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub allocation: Allocation,
}

fn alloc_err(e: AllocationError) -> RenderError {
    match e {
        AllocationError::OutOfMemory => {
            RenderError::OutOfDeviceMemory("allocating a render target".into())
        }
        other => RenderError::DeviceInit(format!("render target allocation: {other}")),
    }
}

pub fn target_image_info(extent: vk::Extent2D) -> vk::ImageCreateInfo<'static> {
    vk::ImageCreateInfo {
        s_type: vk::StructureType::IMAGE_CREATE_INFO,
        image_type: vk::ImageType::TYPE_2D,
        format: TARGET_FORMAT,
        extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
        mip_levels: 1,
        array_layers: 1,
        samples: vk::SampleCountFlags::TYPE_1,
        tiling: vk::ImageTiling::OPTIMAL,
        usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::COLOR_ATTACHMENT,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        ..Default::default()
    }
}

/// Image, dedicated device-local memory, then a 2D view. Each step undoes
/// the previous ones on failure.
pub unsafe fn create_target(
    device: &ash::Device,
    allocator: &mut Allocator,
    extent: vk::Extent2D,
) -> Result<TargetMemory> {
    let image = device
        .create_image(&target_image_info(extent), None)
        .map_err(RenderError::at("vkCreateImage"))?;
    let requirements = device.get_image_memory_requirements(image);

    let allocation = match allocator.allocate(&AllocationCreateDesc {
        name: "render target",
        requirements,
        location: MemoryLocation::GpuOnly,
        linear: false,
        allocation_scheme: AllocationScheme::DedicatedImage(image),
    }) {
        Ok(allocation) => allocation,
        Err(e) => {
            device.destroy_image(image, None);
            return Err(alloc_err(e));
        }
    };

    if let Err(e) = device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
        device.destroy_image(image, None);
        let _ = allocator.free(allocation);
        return Err(RenderError::vk("vkBindImageMemory", e));
    }

    let view_info = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format: TARGET_FORMAT,
        subresource_range: color_range(),
        ..Default::default()
    };
    let view = match device.create_image_view(&view_info, None) {
        Ok(view) => view,
        Err(e) => {
            device.destroy_image(image, None);
            let _ = allocator.free(allocation);
            return Err(RenderError::vk("vkCreateImageView", e));
        }
    };

    Ok(TargetMemory {
        image,
        view,
        allocation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_are_single_sample_sampled_attachments() {
        let info = target_image_info(vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!(info.format, vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!((info.mip_levels, info.array_layers), (1, 1));
        assert_eq!(info.samples, vk::SampleCountFlags::TYPE_1);
        assert!(info
            .usage
            .contains(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert_eq!(info.extent.depth, 1);
    }

    #[test]
    fn allocator_exhaustion_is_fatal() {
        assert!(alloc_err(AllocationError::OutOfMemory).is_fatal());
        assert!(matches!(
            alloc_err(AllocationError::OutOfMemory),
            RenderError::OutOfDeviceMemory(_)
        ));
    }
}
