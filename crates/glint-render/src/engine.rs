// SPDX-License-Identifier: CEPL-1.0
use std::fmt;

use ash::vk;
use tracing::{debug, error, info, trace, warn};

use crate::clock::FrameClock;
use crate::gpu::{Acquire, Gpu, Present, SwapchainImage};
use crate::mouse::MouseTracker;
use crate::overlay::{FrameInput, Overlay, UiActions};
use crate::pipeline::{PipelineManager, ShaderCompiler, ShaderSources};
use crate::push::PushConstants;
use crate::recorder::{record_cleared, record_frame, FramePlan};
use crate::sync::FrameSyncRing;
use crate::targets::{RenderTargetPool, TARGET_FORMAT};
use crate::{RenderError, RenderSize, Result};

pub const MIN_FRAMES_IN_FLIGHT: usize = 2;
/// Overlays size their texture tables from this.
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub frames_in_flight: usize,
    pub shaders: ShaderSources,
}

impl EngineConfig {
    pub fn new(shaders: ShaderSources) -> Self {
        Self {
            frames_in_flight: MIN_FRAMES_IN_FLIGHT,
            shaders,
        }
    }

    pub fn with_frames_in_flight(mut self, n: usize) -> Self {
        self.frames_in_flight = n.clamp(MIN_FRAMES_IN_FLIGHT, MAX_FRAMES_IN_FLIGHT);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// The swapchain was rebuilt instead of presenting; the frame index did
    /// not move.
    SwapchainRebuilt,
    /// Nothing reached the screen; the frame index did not move.
    Skipped,
}

/// Snapshot for the status line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameStatus {
    pub time: f64,
    pub fps: f32,
    pub width: u32,
    pub height: u32,
    pub playing: bool,
}

impl fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2}\t{:.1} fps\t{}x{}",
            self.time, self.fps, self.width, self.height
        )
    }
}

/// Owns every per-frame resource and drives acquire, record, submit and
/// present for one window.
///
/// Field order matters for drop: the overlay and all GPU objects are
/// released in [`Drop`] before `gpu` itself goes away.
pub struct Engine<G: Gpu, O: Overlay<G>> {
    overlay: O,
    sync: FrameSyncRing,
    targets: RenderTargetPool,
    pipeline: PipelineManager,
    clock: FrameClock,
    mouse: MouseTracker,
    state: FrameState,
    /// Wall-clock time of frames that never reached recording.
    unclaimed_dt: f32,
    gpu: G,
}

impl<G: Gpu, O: Overlay<G>> Engine<G, O> {
    /// Creates the sync ring and builds the initial pipeline. Render targets
    /// are created by the first frame, once the viewport size is known.
    pub fn new(
        mut gpu: G,
        mut overlay: O,
        compiler: Box<dyn ShaderCompiler>,
        config: EngineConfig,
    ) -> Result<Self> {
        let frames = config
            .frames_in_flight
            .clamp(MIN_FRAMES_IN_FLIGHT, MAX_FRAMES_IN_FLIGHT);

        let mut sync = FrameSyncRing::new(&mut gpu, frames)?;
        let mut pipeline = PipelineManager::new(config.shaders, compiler, TARGET_FORMAT);
        if let Err(e) = pipeline.build(&mut gpu) {
            if let Err(e) = gpu.wait_idle() {
                warn!(error = %e, "wait_idle failed while unwinding engine init");
            }
            pipeline.destroy(&mut gpu);
            sync.destroy(&mut gpu);
            overlay.destroy(&mut gpu);
            return Err(e);
        }

        info!(frames_in_flight = frames, "engine ready");
        Ok(Self {
            overlay,
            sync,
            targets: RenderTargetPool::new(frames),
            pipeline,
            clock: FrameClock::new(),
            mouse: MouseTracker::new(),
            state: FrameState::Idle,
            unclaimed_dt: 0.0,
            gpu,
        })
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }

    pub fn overlay(&self) -> &O {
        &self.overlay
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut FrameClock {
        &mut self.clock
    }

    pub fn targets(&self) -> &RenderTargetPool {
        &self.targets
    }

    pub fn pipeline(&self) -> &PipelineManager {
        &self.pipeline
    }

    pub fn frame_index(&self) -> usize {
        self.sync.index()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.sync.len()
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn status(&self) -> FrameStatus {
        let extent = self.targets.extent();
        FrameStatus {
            time: self.clock.simulation_time(),
            fps: self.clock.fps(),
            width: extent.width,
            height: extent.height,
            playing: self.clock.playing(),
        }
    }

    /// Hot reload. On failure the previous pipeline stays bound and the
    /// error is returned; on success simulation time restarts.
    pub fn reload_pipeline(&mut self) -> Result<()> {
        self.pipeline.reload(&mut self.gpu)?;
        self.clock.restart();
        Ok(())
    }

    /// Resizes the render-target pool to `extent` if needed.
    pub fn resize_targets(&mut self, extent: vk::Extent2D) -> Result<bool> {
        self.targets.resize(&mut self.gpu, &mut self.overlay, extent)
    }

    /// Runs one pass of the frame state machine. `dt` is the wall-clock time
    /// since the previous call, in seconds; time from frames skipped before
    /// recording is carried into the next recorded one. A non-fatal recording failure
    /// still presents a cleared image and then returns the error.
    pub fn frame(&mut self, input: &FrameInput, dt: f32) -> Result<FrameOutcome> {
        let result = self.run_frame(input, dt);
        self.enter(FrameState::Idle);
        result
    }

    fn enter(&mut self, state: FrameState) {
        trace!(from = ?self.state, to = ?state, "frame state");
        self.state = state;
    }

    fn run_frame(&mut self, input: &FrameInput, dt: f32) -> Result<FrameOutcome> {
        if input.framebuffer.is_zero() {
            return Ok(FrameOutcome::Skipped);
        }

        self.unclaimed_dt += dt;
        self.enter(FrameState::Acquiring);
        self.sync.acquire(&self.gpu)?;
        let image_index = match self.gpu.acquire_next_image(self.sync.current().image_available) {
            Acquire::Image { index, suboptimal } => {
                if suboptimal {
                    trace!(index, "acquired suboptimal image");
                }
                index
            }
            Acquire::OutOfDate => return self.rebuild_swapchain(input.framebuffer),
            Acquire::Failed(result) => {
                warn!(%result, "acquire failed; skipping frame");
                return Ok(FrameOutcome::Skipped);
            }
        };

        self.enter(FrameState::Recording);
        // An acquired image is always submitted and presented. A failed
        // recording falls back to a cleared composite.
        let failure = match self.record(input, image_index) {
            Ok(()) => None,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "frame recording failed; presenting a cleared image");
                self.record_cleared(image_index).map_err(unsubmittable)?;
                Some(e)
            }
        };

        self.enter(FrameState::Submitted);
        self.sync.submit(&mut self.gpu).map_err(unsubmittable)?;

        self.enter(FrameState::Presenting);
        let outcome = match self.sync.present(&mut self.gpu, image_index) {
            Present::Done => {
                self.sync.advance();
                self.clock.count_presented();
                FrameOutcome::Presented
            }
            Present::Stale => self.rebuild_swapchain(input.framebuffer)?,
            Present::Failed(result) => {
                warn!(%result, "present failed; frame dropped");
                FrameOutcome::Skipped
            }
        };
        match failure {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    fn record(&mut self, input: &FrameInput, image_index: u32) -> Result<()> {
        self.clock.tick(std::mem::take(&mut self.unclaimed_dt));
        let ui = self.overlay.layout(input);
        self.apply(ui.actions)?;

        self.targets
            .resize(&mut self.gpu, &mut self.overlay, ui.region.extent)?;
        self.mouse.update(ui.size(), ui.pointer, ui.pressed);

        let slot = *self
            .targets
            .slot(self.sync.index())
            .ok_or(RenderError::Internal("no render target for the current slot"))?;
        let (layout, pipeline) = self
            .pipeline
            .bound()
            .ok_or(RenderError::Internal("no pipeline bound"))?;
        let swapchain = self.swapchain_image(image_index)?;

        let extent = slot.target.extent;
        let plan = FramePlan {
            target_image: slot.target.image,
            target_view: slot.target.view,
            target_extent: extent,
            swapchain,
            pipeline,
            layout,
            push: PushConstants::new(extent.width, extent.height, &self.clock, self.mouse.encode()),
        };
        let draw_data = self.overlay.compose(slot.texture, &ui);
        let overlay = &mut self.overlay;
        let mut encoder = self.gpu.encoder(self.sync.current().commands);
        record_frame(&mut encoder, &plan, |enc| overlay.render(enc, &draw_data))
    }

    fn record_cleared(&mut self, image_index: u32) -> Result<()> {
        let swapchain = self.swapchain_image(image_index)?;
        let mut encoder = self.gpu.encoder(self.sync.current().commands);
        record_cleared(&mut encoder, &swapchain)
    }

    fn swapchain_image(&self, image_index: u32) -> Result<SwapchainImage> {
        self.gpu
            .swapchain_image(image_index)
            .ok_or(RenderError::Internal("acquired index outside the swapchain"))
    }

    fn apply(&mut self, actions: UiActions) -> Result<()> {
        if actions.restart {
            self.clock.restart();
        }
        if actions.toggle_play {
            let playing = self.clock.toggle_playing();
            info!(playing, "transport toggled");
        }
        if actions.recompile {
            match self.reload_pipeline() {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(error = %e, "reload failed; keeping previous pipeline"),
            }
        }
        Ok(())
    }

    fn rebuild_swapchain(&mut self, hint: RenderSize) -> Result<FrameOutcome> {
        match self.gpu.rebuild_swapchain(hint) {
            Ok(()) => {
                debug!(width = hint.width, height = hint.height, "swapchain rebuilt");
                Ok(FrameOutcome::SwapchainRebuilt)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "swapchain rebuild failed; retrying next frame");
                Ok(FrameOutcome::Skipped)
            }
        }
    }
}

/// Past acquire the slot's semaphore is signalled and its fence may already
/// be reset, so nothing after that point can be retried next frame.
fn unsubmittable(e: RenderError) -> RenderError {
    if e.is_fatal() {
        return e;
    }
    error!(error = %e, "acquired frame could not be submitted");
    RenderError::Internal("acquired frame could not be submitted")
}

impl<G: Gpu, O: Overlay<G>> Drop for Engine<G, O> {
    fn drop(&mut self) {
        if let Err(e) = self.gpu.wait_idle() {
            error!(error = %e, "wait_idle failed during teardown");
        }
        self.targets.release(&mut self.gpu, &mut self.overlay);
        self.pipeline.destroy(&mut self.gpu);
        self.sync.destroy(&mut self.gpu);
        self.overlay.destroy(&mut self.gpu);
        info!("engine torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_format() {
        let status = FrameStatus {
            time: 1.234,
            fps: 59.96,
            width: 800,
            height: 600,
            playing: true,
        };
        assert_eq!(status.to_string(), "1.23\t60.0 fps\t800x600");
    }

    #[test]
    fn frames_in_flight_is_bounded() {
        let cfg = EngineConfig::new(ShaderSources {
            vertex: "a.vert".into(),
            fragment: "a.frag".into(),
        })
        .with_frames_in_flight(1);
        assert_eq!(cfg.frames_in_flight, MIN_FRAMES_IN_FLIGHT);
        assert_eq!(
            cfg.with_frames_in_flight(64).frames_in_flight,
            MAX_FRAMES_IN_FLIGHT
        );
    }
}
