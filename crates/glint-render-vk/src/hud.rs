// SPDX-License-Identifier: CEPL-1.0
//! Composites the current render target into the window, above a status
//! strip, with a sampling blit.

use std::collections::HashMap;

use ash::vk;
use glint_render::engine::MAX_FRAMES_IN_FLIGHT;
use glint_render::pipeline::{compile_stages, with_modules};
use glint_render::{
    CommandEncoder, FrameInput, Gpu, Overlay, Result, RenderError, ShaderCompiler, ShaderSources,
    TextureId, UiFrame,
};
use tracing::{debug, info, warn};

use crate::pipeline::create_layout;
use crate::VkGpu;

/// One set per render-target slot.
const MAX_TEXTURES: u32 = MAX_FRAMES_IN_FLIGHT as u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HudDraw {
    pub set: vk::DescriptorSet,
    pub region: vk::Rect2D,
}

pub struct HudOverlay {
    bar_height: u32,
    set_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    sampler: vk::Sampler,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    textures: HashMap<TextureId, vk::DescriptorSet>,
    next_id: u64,
}

impl HudOverlay {
    /// Builds the blit pipeline for the current swapchain format. A failure
    /// part-way releases whatever was already created.
    pub fn new(
        gpu: &mut VkGpu,
        compiler: &dyn ShaderCompiler,
        sources: &ShaderSources,
        bar_height: u32,
    ) -> Result<Self> {
        let mut hud = Self {
            bar_height,
            set_layout: vk::DescriptorSetLayout::null(),
            pool: vk::DescriptorPool::null(),
            sampler: vk::Sampler::null(),
            layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            textures: HashMap::new(),
            next_id: 1,
        };
        match hud.build(gpu, compiler, sources) {
            Ok(()) => {
                info!(bar_height, "hud ready");
                Ok(hud)
            }
            Err(e) => {
                hud.destroy(gpu);
                Err(e)
            }
        }
    }

    fn build(
        &mut self,
        gpu: &mut VkGpu,
        compiler: &dyn ShaderCompiler,
        sources: &ShaderSources,
    ) -> Result<()> {
        let code = compile_stages(compiler, sources)?;
        let device = gpu.device();

        unsafe {
            let binding = vk::DescriptorSetLayoutBinding {
                binding: 0,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 1,
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
                ..Default::default()
            };
            let set_layout_info = vk::DescriptorSetLayoutCreateInfo {
                s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
                binding_count: 1,
                p_bindings: &binding,
                ..Default::default()
            };
            self.set_layout = device
                .create_descriptor_set_layout(&set_layout_info, None)
                .map_err(RenderError::at("vkCreateDescriptorSetLayout"))?;

            let pool_size = vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: MAX_TEXTURES,
            };
            let pool_info = vk::DescriptorPoolCreateInfo {
                s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
                flags: vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
                max_sets: MAX_TEXTURES,
                pool_size_count: 1,
                p_pool_sizes: &pool_size,
                ..Default::default()
            };
            self.pool = device
                .create_descriptor_pool(&pool_info, None)
                .map_err(RenderError::at("vkCreateDescriptorPool"))?;

            let sampler_info = vk::SamplerCreateInfo {
                s_type: vk::StructureType::SAMPLER_CREATE_INFO,
                mag_filter: vk::Filter::LINEAR,
                min_filter: vk::Filter::LINEAR,
                mipmap_mode: vk::SamplerMipmapMode::NEAREST,
                address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
                address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
                address_mode_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
                max_lod: vk::LOD_CLAMP_NONE,
                ..Default::default()
            };
            self.sampler = device
                .create_sampler(&sampler_info, None)
                .map_err(RenderError::at("vkCreateSampler"))?;

            self.layout = create_layout(device, &[self.set_layout], &[])?;
        }

        let layout = self.layout;
        let color_format = gpu.swapchain_format();
        self.pipeline = with_modules(gpu, &code, |gpu, vertex, fragment| {
            gpu.create_graphics_pipeline(&glint_render::gpu::PipelineDesc {
                layout,
                vertex,
                fragment,
                color_format,
                cull_mode: vk::CullModeFlags::NONE,
            })
        })?;
        Ok(())
    }

    pub fn bar_height(&self) -> u32 {
        self.bar_height
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

impl Overlay<VkGpu> for HudOverlay {
    type DrawData = Option<HudDraw>;

    fn register_texture(&mut self, gpu: &mut VkGpu, view: vk::ImageView) -> Result<TextureId> {
        let device = gpu.device();
        let set = unsafe {
            let alloc_info = vk::DescriptorSetAllocateInfo {
                s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
                descriptor_pool: self.pool,
                descriptor_set_count: 1,
                p_set_layouts: &self.set_layout,
                ..Default::default()
            };
            let set = device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(RenderError::at("vkAllocateDescriptorSets"))?
                .into_iter()
                .next()
                .ok_or(RenderError::Internal("vkAllocateDescriptorSets returned nothing"))?;

            let image_info = vk::DescriptorImageInfo {
                sampler: self.sampler,
                image_view: view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            };
            let write = vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: set,
                dst_binding: 0,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                p_image_info: &image_info,
                ..Default::default()
            };
            device.update_descriptor_sets(std::slice::from_ref(&write), &[]);
            set
        };

        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.textures.insert(id, set);
        debug!(texture = id.0, "texture registered");
        Ok(id)
    }

    fn unregister_texture(&mut self, gpu: &mut VkGpu, texture: TextureId) {
        let Some(set) = self.textures.remove(&texture) else {
            warn!(texture = texture.0, "unregistering an unknown texture");
            return;
        };
        unsafe {
            if let Err(e) = gpu
                .device()
                .free_descriptor_sets(self.pool, std::slice::from_ref(&set))
            {
                warn!(%e, texture = texture.0, "descriptor set not freed");
            }
        }
        debug!(texture = texture.0, "texture unregistered");
    }

    fn layout(&mut self, input: &FrameInput) -> UiFrame {
        UiFrame::with_status_bar(input, self.bar_height)
    }

    fn compose(&mut self, texture: TextureId, frame: &UiFrame) -> Option<HudDraw> {
        let set = self.textures.get(&texture).copied();
        if set.is_none() {
            warn!(texture = texture.0, "composing an unknown texture");
        }
        set.map(|set| HudDraw {
            set,
            region: frame.region,
        })
    }

    fn render(&mut self, encoder: &mut dyn CommandEncoder, data: &Option<HudDraw>) {
        let Some(draw) = data else { return };
        let r = draw.region;
        encoder.set_viewport(vk::Viewport {
            x: r.offset.x as f32,
            y: r.offset.y as f32,
            width: r.extent.width as f32,
            height: r.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        encoder.set_scissor(r);
        encoder.bind_pipeline(self.pipeline);
        encoder.bind_descriptor_set(self.layout, draw.set);
        encoder.draw(3, 1);
    }

    fn destroy(&mut self, gpu: &mut VkGpu) {
        self.textures.clear();
        if self.pipeline != vk::Pipeline::null() {
            gpu.destroy_pipeline(std::mem::take(&mut self.pipeline));
        }
        let device = gpu.device();
        unsafe {
            // Sets go with the pool.
            device.destroy_pipeline_layout(std::mem::take(&mut self.layout), None);
            device.destroy_sampler(std::mem::take(&mut self.sampler), None);
            device.destroy_descriptor_pool(std::mem::take(&mut self.pool), None);
            device.destroy_descriptor_set_layout(std::mem::take(&mut self.set_layout), None);
        }
    }
}
