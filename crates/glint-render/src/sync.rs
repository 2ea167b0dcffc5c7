// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::debug;

use crate::gpu::{FrameSync, Gpu, Present, Submission};
use crate::ring::RingIndex;
use crate::Result;

/// Per-slot semaphore/fence triples, indexed by the current-frame index.
///
/// A slot's fence is waited on before its command buffer is re-recorded and
/// reset right before the submit that signals it again.
pub struct FrameSyncRing {
    slots: Vec<FrameSync>,
    index: RingIndex,
}

impl FrameSyncRing {
    pub fn new<G: Gpu>(gpu: &mut G, frames_in_flight: usize) -> Result<Self> {
        let mut slots = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            match gpu.create_frame_sync() {
                Ok(sync) => slots.push(sync),
                Err(e) => {
                    for sync in slots.drain(..) {
                        gpu.destroy_frame_sync(sync);
                    }
                    return Err(e);
                }
            }
        }
        debug!(frames_in_flight, "frame sync ring created");
        Ok(Self {
            slots,
            index: RingIndex::new(frames_in_flight),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index.get()
    }

    pub fn current(&self) -> &FrameSync {
        &self.slots[self.index.get()]
    }

    /// Blocks until the current slot's previous submission has retired.
    pub fn acquire<G: Gpu>(&self, gpu: &G) -> Result<()> {
        gpu.wait_fence(self.current().in_flight)
    }

    pub fn submit<G: Gpu>(&self, gpu: &mut G) -> Result<()> {
        let slot = *self.current();
        gpu.reset_fence(slot.in_flight)?;
        gpu.submit(&Submission {
            commands: slot.commands,
            wait: slot.image_available,
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal: slot.render_finished,
            fence: slot.in_flight,
        })
    }

    pub fn present<G: Gpu>(&self, gpu: &mut G, image_index: u32) -> Present {
        gpu.present(image_index, self.current().render_finished)
    }

    pub fn advance(&mut self) {
        self.index.advance();
    }

    /// Caller must have waited for the device to go idle.
    pub fn destroy<G: Gpu>(&mut self, gpu: &mut G) {
        for sync in self.slots.drain(..) {
            gpu.destroy_frame_sync(sync);
        }
    }
}
