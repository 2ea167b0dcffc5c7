// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::{debug, info};

use crate::gpu::{Gpu, TargetImage};
use crate::overlay::{Overlay, TextureId};
use crate::Result;

/// Every off-screen target uses this format.
pub const TARGET_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTargetSlot {
    pub target: TargetImage,
    pub texture: TextureId,
}

/// N off-screen colour targets sized to the overlay's viewport region,
/// rebuilt together whenever that region changes size.
pub struct RenderTargetPool {
    slots: Vec<RenderTargetSlot>,
    count: usize,
    extent: vk::Extent2D,
}

impl RenderTargetPool {
    pub fn new(count: usize) -> Self {
        Self {
            slots: Vec::with_capacity(count),
            count,
            extent: vk::Extent2D::default(),
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn slots(&self) -> &[RenderTargetSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&RenderTargetSlot> {
        self.slots.get(index)
    }

    /// Returns `true` when the slots were rebuilt. On failure the pool is
    /// left empty, so the next call rebuilds from scratch.
    pub fn resize<G, O>(
        &mut self,
        gpu: &mut G,
        overlay: &mut O,
        extent: vk::Extent2D,
    ) -> Result<bool>
    where
        G: Gpu,
        O: Overlay<G>,
    {
        if self.slots.len() == self.count && self.extent == extent {
            return Ok(false);
        }

        gpu.wait_idle()?;
        self.release(gpu, overlay);

        let mut batch = SlotBatch::new(gpu, overlay, self.count);
        for _ in 0..self.count {
            batch.push(extent)?;
        }
        self.slots = batch.commit();
        self.extent = extent;

        info!(
            width = extent.width,
            height = extent.height,
            slots = self.count,
            "render targets rebuilt"
        );
        Ok(true)
    }

    /// Inverse of a build, slot by slot. Caller must have waited for idle.
    pub fn release<G, O>(&mut self, gpu: &mut G, overlay: &mut O)
    where
        G: Gpu,
        O: Overlay<G>,
    {
        for slot in self.slots.drain(..) {
            release_slot(gpu, overlay, slot);
        }
        self.extent = vk::Extent2D::default();
    }
}

fn release_slot<G: Gpu, O: Overlay<G>>(gpu: &mut G, overlay: &mut O, slot: RenderTargetSlot) {
    overlay.unregister_texture(gpu, slot.texture);
    gpu.destroy_render_target(slot.target);
    debug!(texture = ?slot.texture, "render target released");
}

/// Slots built so far in one resize; releases them unless committed.
struct SlotBatch<'a, G: Gpu, O: Overlay<G>> {
    gpu: &'a mut G,
    overlay: &'a mut O,
    slots: Vec<RenderTargetSlot>,
}

impl<'a, G: Gpu, O: Overlay<G>> SlotBatch<'a, G, O> {
    fn new(gpu: &'a mut G, overlay: &'a mut O, capacity: usize) -> Self {
        Self {
            gpu,
            overlay,
            slots: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, extent: vk::Extent2D) -> Result<()> {
        let target = self.gpu.create_render_target(extent)?;
        let texture = match self.overlay.register_texture(self.gpu, target.view) {
            Ok(texture) => texture,
            Err(e) => {
                self.gpu.destroy_render_target(target);
                return Err(e);
            }
        };
        self.slots.push(RenderTargetSlot { target, texture });
        Ok(())
    }

    fn commit(mut self) -> Vec<RenderTargetSlot> {
        std::mem::take(&mut self.slots)
    }
}

impl<G: Gpu, O: Overlay<G>> Drop for SlotBatch<'_, G, O> {
    fn drop(&mut self) {
        while let Some(slot) = self.slots.pop() {
            release_slot(self.gpu, self.overlay, slot);
        }
    }
}
