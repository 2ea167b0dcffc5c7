// SPDX-License-Identifier: CEPL-1.0
use ash::khr::swapchain;
use ash::vk;
use glint_render::gpu::SwapchainImage;
use glint_render::{RenderError, RenderSize, Result};
use tracing::info;

use crate::context::Context;

pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
}

/// RGBA8 UNORM in sRGB colour space, then BGRA8, then whatever comes first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let wanted = |format| {
        formats.iter().copied().find(|f| {
            f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
    };
    wanted(vk::Format::R8G8B8A8_UNORM)
        .or_else(|| wanted(vk::Format::B8G8R8A8_UNORM))
        .or_else(|| formats.first().copied())
}

pub fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// The surface minimum, capped by the maximum (0 = no maximum).
pub fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let min = caps.min_image_count.max(1);
    if caps.max_image_count == 0 {
        min
    } else {
        min.min(caps.max_image_count)
    }
}

impl Swapchain {
    /// Builds a chain for the surface's current state. `old` is handed to
    /// the driver as a hint and stays alive; the caller retires it.
    pub unsafe fn build(
        ctx: &Context,
        loader: &swapchain::Device,
        old: vk::SwapchainKHR,
        hint: RenderSize,
    ) -> Result<Self> {
        let caps = ctx
            .surface_loader
            .get_physical_device_surface_capabilities(ctx.phys, ctx.surface)
            .map_err(RenderError::SwapchainRebuild)?;
        let formats = ctx
            .surface_loader
            .get_physical_device_surface_formats(ctx.phys, ctx.surface)
            .map_err(RenderError::SwapchainRebuild)?;

        let extent = extent_from_caps(&caps, hint);
        if extent.width == 0 || extent.height == 0 {
            return Err(RenderError::SurfaceIncompatible(format!(
                "zero-area surface ({}x{})",
                extent.width, extent.height
            )));
        }
        let surf_format = choose_surface_format(&formats)
            .ok_or_else(|| RenderError::SurfaceIncompatible("no surface formats".into()))?;
        // FIFO is the only mode every implementation must expose.
        let present_mode = vk::PresentModeKHR::FIFO;
        let min_count = image_count(&caps);

        let families = [ctx.families.graphics, ctx.families.present];
        let (sharing, family_count) = if families[0] == families[1] {
            (vk::SharingMode::EXCLUSIVE, 0)
        } else {
            (vk::SharingMode::CONCURRENT, families.len() as u32)
        };

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: ctx.surface,
            min_image_count: min_count,
            image_format: surf_format.format,
            image_color_space: surf_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing,
            queue_family_index_count: family_count,
            p_queue_family_indices: families.as_ptr(),
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: old,
            ..Default::default()
        };

        let handle = loader
            .create_swapchain(&swap_info, None)
            .map_err(RenderError::SwapchainRebuild)?;
        let images = match loader.get_swapchain_images(handle) {
            Ok(images) => images,
            Err(e) => {
                loader.destroy_swapchain(handle, None);
                return Err(RenderError::SwapchainRebuild(e));
            }
        };

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let iv_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: surf_format.format,
                subresource_range: color_range(),
                ..Default::default()
            };
            match ctx.device.create_image_view(&iv_info, None) {
                Ok(view) => views.push(view),
                Err(e) => {
                    for view in views {
                        ctx.device.destroy_image_view(view, None);
                    }
                    loader.destroy_swapchain(handle, None);
                    return Err(RenderError::vk("vkCreateImageView", e));
                }
            }
        }

        info!(
            width = extent.width,
            height = extent.height,
            images = images.len(),
            format = ?surf_format.format,
            "swapchain built"
        );

        Ok(Self {
            handle,
            format: surf_format.format,
            color_space: surf_format.color_space,
            extent,
            present_mode,
            images,
            views,
        })
    }

    pub fn image(&self, index: u32) -> Option<SwapchainImage> {
        let i = index as usize;
        Some(SwapchainImage {
            image: *self.images.get(i)?,
            view: *self.views.get(i)?,
            extent: self.extent,
        })
    }

    /// Views first, then the chain. Nothing may still be using either.
    pub unsafe fn destroy(&mut self, device: &ash::Device, loader: &swapchain::Device) {
        for view in self.views.drain(..) {
            device.destroy_image_view(view, None);
        }
        self.images.clear();
        if self.handle != vk::SwapchainKHR::null() {
            loader.destroy_swapchain(self.handle, None);
            self.handle = vk::SwapchainKHR::null();
        }
    }
}

pub fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn prefers_rgba_then_bgra() {
        let all = [fmt(vk::Format::B8G8R8A8_UNORM), fmt(vk::Format::R8G8B8A8_UNORM)];
        assert_eq!(choose_surface_format(&all), Some(all[1]));
        assert_eq!(choose_surface_format(&all[..1]), Some(all[0]));
        let odd = [fmt(vk::Format::A2B10G10R10_UNORM_PACK32)];
        assert_eq!(choose_surface_format(&odd), Some(odd[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn free_size_surfaces_clamp_the_hint() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };
        assert_eq!(
            extent_from_caps(&caps, RenderSize::new(8000, 600)),
            vk::Extent2D {
                width: 4096,
                height: 600
            }
        );
    }

    #[test]
    fn image_count_is_the_minimum_within_bounds() {
        let caps = |min, max| vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        };
        assert_eq!(image_count(&caps(2, 0)), 2);
        assert_eq!(image_count(&caps(3, 8)), 3);
        assert_eq!(image_count(&caps(0, 0)), 1);
    }
}
