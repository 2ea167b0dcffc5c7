// SPDX-License-Identifier: CEPL-1.0
//! The ash backend for `glint-render`.

#![allow(clippy::missing_safety_doc)]

pub mod context;
pub mod encoder;
pub mod hud;
pub mod pipeline;
pub mod swapchain;
pub mod targets;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ash::vk;
use glint_render::gpu::{
    Acquire, AllocationId, FrameSync, Gpu, PipelineDesc, Present, Submission, SwapchainImage,
    TargetImage,
};
use glint_render::{RenderError, RenderSize, Result};
use gpu_allocator::vulkan::{Allocation, Allocator, AllocatorCreateDesc};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

pub use context::{Context, DeviceConfig, QueueFamilies};
pub use encoder::VkEncoder;
pub use hud::{HudDraw, HudOverlay};
pub use swapchain::Swapchain;

pub struct VkGpu {
    allocations: HashMap<AllocationId, Allocation>,
    next_allocation: u64,
    allocator: Option<Allocator>,
    pipeline_cache: vk::PipelineCache,
    cache_path: Option<PathBuf>,
    command_pool: vk::CommandPool,
    swapchain: Swapchain,
    swapchain_loader: ash::khr::swapchain::Device,
    ctx: Context,
}

impl Drop for VkGpu {
    fn drop(&mut self) {
        unsafe {
            let d = &self.ctx.device;
            d.device_wait_idle().ok();

            if let Some(path) = &self.cache_path {
                if self.pipeline_cache != vk::PipelineCache::null() {
                    pipeline::save_pipeline_cache(d, self.pipeline_cache, path);
                }
            }
            d.destroy_pipeline_cache(self.pipeline_cache, None);

            if let Some(allocator) = self.allocator.as_mut() {
                if !self.allocations.is_empty() {
                    warn!(count = self.allocations.len(), "render targets leaked to teardown");
                }
                for (_, allocation) in self.allocations.drain() {
                    let _ = allocator.free(allocation);
                }
            }
            // The allocator must go before the device it was built on.
            drop(self.allocator.take());

            d.destroy_command_pool(self.command_pool, None);
            self.swapchain.destroy(d, &self.swapchain_loader);
        }
        debug!("vulkan backend released");
    }
}

impl VkGpu {
    /// Device, swapchain, command pool, pipeline cache and allocator, in
    /// that order. `cache_dir` enables the on-disk pipeline cache.
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        config: &DeviceConfig,
        cache_dir: Option<&Path>,
    ) -> Result<Self> {
        let ctx = Context::new(window, display, config)?;
        let swapchain_loader = ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device);
        let swapchain = unsafe {
            Swapchain::build(&ctx, &swapchain_loader, vk::SwapchainKHR::null(), size)?
        };

        // From here on a failure drops a partly built `VkGpu`; destroying
        // null handles is a no-op.
        let mut gpu = Self {
            allocations: HashMap::new(),
            next_allocation: 1,
            allocator: None,
            pipeline_cache: vk::PipelineCache::null(),
            cache_path: cache_dir.map(|dir| pipeline::pipeline_cache_path(dir, &ctx.properties)),
            command_pool: vk::CommandPool::null(),
            swapchain,
            swapchain_loader,
            ctx,
        };

        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: gpu.ctx.families.graphics,
            ..Default::default()
        };
        gpu.command_pool = unsafe {
            gpu.ctx
                .device
                .create_command_pool(&pool_info, None)
                .map_err(RenderError::at("vkCreateCommandPool"))?
        };

        gpu.pipeline_cache = unsafe {
            pipeline::create_or_load_pipeline_cache(&gpu.ctx.device, gpu.cache_path.as_deref())?
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: gpu.ctx.instance.clone(),
            device: gpu.ctx.device.clone(),
            physical_device: gpu.ctx.phys,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| RenderError::DeviceInit(format!("gpu allocator: {e}")))?;
        gpu.allocator = Some(allocator);

        info!(
            width = gpu.swapchain.extent.width,
            height = gpu.swapchain.extent.height,
            format = ?gpu.swapchain.format,
            "vulkan backend ready"
        );
        Ok(gpu)
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn device(&self) -> &ash::Device {
        &self.ctx.device
    }

    pub fn swapchain_format(&self) -> vk::Format {
        self.swapchain.format
    }

    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn pipeline_cache(&self) -> vk::PipelineCache {
        self.pipeline_cache
    }

    fn build_frame_sync(&self, sync: &mut FrameSync) -> Result<()> {
        let d = &self.ctx.device;
        let sem_info = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        let fence_info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        unsafe {
            sync.image_available = d
                .create_semaphore(&sem_info, None)
                .map_err(RenderError::at("vkCreateSemaphore"))?;
            sync.render_finished = d
                .create_semaphore(&sem_info, None)
                .map_err(RenderError::at("vkCreateSemaphore"))?;
            sync.in_flight = d
                .create_fence(&fence_info, None)
                .map_err(RenderError::at("vkCreateFence"))?;
            sync.commands = d
                .allocate_command_buffers(&alloc_info)
                .map_err(RenderError::at("vkAllocateCommandBuffers"))?
                .into_iter()
                .next()
                .ok_or(RenderError::Internal("vkAllocateCommandBuffers returned nothing"))?;
        }
        Ok(())
    }
}

impl Gpu for VkGpu {
    type Encoder<'a> = VkEncoder<'a>;

    fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .device_wait_idle()
                .map_err(RenderError::at("vkDeviceWaitIdle"))
        }
    }

    fn create_frame_sync(&mut self) -> Result<FrameSync> {
        let mut sync = FrameSync {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight: vk::Fence::null(),
            commands: vk::CommandBuffer::null(),
        };
        match self.build_frame_sync(&mut sync) {
            Ok(()) => Ok(sync),
            Err(e) => {
                self.destroy_frame_sync(sync);
                Err(e)
            }
        }
    }

    fn destroy_frame_sync(&mut self, sync: FrameSync) {
        let d = &self.ctx.device;
        unsafe {
            if sync.commands != vk::CommandBuffer::null() {
                d.free_command_buffers(self.command_pool, std::slice::from_ref(&sync.commands));
            }
            d.destroy_fence(sync.in_flight, None);
            d.destroy_semaphore(sync.render_finished, None);
            d.destroy_semaphore(sync.image_available, None);
        }
    }

    fn wait_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .wait_for_fences(std::slice::from_ref(&fence), true, u64::MAX)
                .map_err(RenderError::at("vkWaitForFences"))
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .reset_fences(std::slice::from_ref(&fence))
                .map_err(RenderError::at("vkResetFences"))
        }
    }

    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Acquire {
        let acquired = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain.handle,
                u64::MAX,
                signal,
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((index, suboptimal)) => Acquire::Image { index, suboptimal },
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Acquire::OutOfDate,
            Err(e) => Acquire::Failed(e),
        }
    }

    fn submit(&mut self, s: &Submission) -> Result<()> {
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &s.wait,
            p_wait_dst_stage_mask: &s.wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &s.commands,
            signal_semaphore_count: 1,
            p_signal_semaphores: &s.signal,
            ..Default::default()
        };
        unsafe {
            self.ctx
                .device
                .queue_submit(
                    self.ctx.graphics_queue,
                    std::slice::from_ref(&submit),
                    s.fence,
                )
                .map_err(RenderError::at("vkQueueSubmit"))
        }
    }

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> Present {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &self.swapchain.handle,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let presented = unsafe {
            self.swapchain_loader
                .queue_present(self.ctx.present_queue, &present)
        };
        match presented {
            Ok(false) => Present::Done,
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Present::Stale,
            Err(e) => Present::Failed(e),
        }
    }

    fn rebuild_swapchain(&mut self, hint: RenderSize) -> Result<()> {
        self.wait_idle()?;
        let mut fresh = unsafe {
            Swapchain::build(&self.ctx, &self.swapchain_loader, self.swapchain.handle, hint)?
        };
        std::mem::swap(&mut self.swapchain, &mut fresh);
        unsafe { fresh.destroy(&self.ctx.device, &self.swapchain_loader) };
        Ok(())
    }

    fn swapchain_image(&self, index: u32) -> Option<SwapchainImage> {
        self.swapchain.image(index)
    }

    fn create_render_target(&mut self, extent: vk::Extent2D) -> Result<TargetImage> {
        let allocator = self
            .allocator
            .as_mut()
            .ok_or(RenderError::Internal("allocator used after teardown"))?;
        let target = unsafe { targets::create_target(&self.ctx.device, allocator, extent)? };

        let id = AllocationId(self.next_allocation);
        self.next_allocation += 1;
        self.allocations.insert(id, target.allocation);
        debug!(
            allocation = id.0,
            width = extent.width,
            height = extent.height,
            "render target created"
        );
        Ok(TargetImage {
            image: target.image,
            view: target.view,
            extent,
            allocation: id,
        })
    }

    fn destroy_render_target(&mut self, target: TargetImage) {
        unsafe {
            self.ctx.device.destroy_image_view(target.view, None);
            self.ctx.device.destroy_image(target.image, None);
        }
        match (self.allocations.remove(&target.allocation), self.allocator.as_mut()) {
            (Some(allocation), Some(allocator)) => {
                if let Err(e) = allocator.free(allocation) {
                    warn!(%e, allocation = target.allocation.0, "render target memory not freed");
                }
            }
            _ => warn!(allocation = target.allocation.0, "unknown render target allocation"),
        }
        debug!(allocation = target.allocation.0, "render target destroyed");
    }

    fn create_shader_module(&mut self, code: &[u32]) -> Result<vk::ShaderModule> {
        unsafe { pipeline::create_shader_module(&self.ctx.device, code) }
    }

    fn destroy_shader_module(&mut self, module: vk::ShaderModule) {
        unsafe { self.ctx.device.destroy_shader_module(module, None) }
    }

    fn create_pipeline_layout(
        &mut self,
        push_constants: vk::PushConstantRange,
    ) -> Result<vk::PipelineLayout> {
        unsafe { pipeline::create_layout(&self.ctx.device, &[], &[push_constants]) }
    }

    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout) {
        unsafe { self.ctx.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(&mut self, desc: &PipelineDesc) -> Result<vk::Pipeline> {
        unsafe { pipeline::create_graphics_pipeline(&self.ctx.device, self.pipeline_cache, desc) }
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe { self.ctx.device.destroy_pipeline(pipeline, None) }
    }

    fn encoder(&self, commands: vk::CommandBuffer) -> VkEncoder<'_> {
        VkEncoder::new(&self.ctx.device, commands)
    }
}
