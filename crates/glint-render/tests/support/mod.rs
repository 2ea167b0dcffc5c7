// SPDX-License-Identifier: CEPL-1.0
//! In-memory `Gpu`, `Overlay` and `ShaderCompiler` that track fences, live
//! objects and the recorded command stream.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use glint_render::encoder::{CommandEncoder, Transition};
use glint_render::gpu::{
    AllocationId, FrameSync, PipelineDesc, Submission, SwapchainImage, TargetImage,
};
use glint_render::vk::{self, Handle};
use glint_render::{
    Acquire, FrameInput, Gpu, Overlay, Present, RenderError, RenderSize, Result, ShaderCompiler,
    ShaderSources, TextureId, UiFrame,
};

pub const STATUS_BAR: u32 = 32;

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    WaitIdle,
    WaitFence(u64),
    Acquire,
    RebuildSwapchain(RenderSize),
    Begin(u64),
    End(u64),
    Barrier(Transition),
    BeginRendering {
        view: vk::ImageView,
        extent: vk::Extent2D,
        clear: [f32; 4],
    },
    EndRendering,
    /// x, y, width, height, min depth, max depth.
    Viewport([f32; 6]),
    Scissor(vk::Rect2D),
    BindPipeline(vk::Pipeline),
    BindDescriptorSet(vk::DescriptorSet),
    PushConstants {
        stages: vk::ShaderStageFlags,
        bytes: Vec<u8>,
    },
    Draw {
        vertices: u32,
        instances: u32,
    },
    OverlayRender(TextureId),
    ResetFence(u64),
    Submit {
        commands: u64,
        fence: u64,
    },
    Present(u32),
    CreateTarget(vk::Extent2D),
    DestroyTarget(vk::Image),
    RegisterTexture(TextureId),
    UnregisterTexture(TextureId),
    CreatePipeline(vk::Pipeline),
    DestroyPipeline(vk::Pipeline),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceState {
    Signaled,
    Unsignaled,
    Pending,
}

#[derive(Default)]
pub struct State {
    next_handle: u64,
    pub events: Vec<Event>,

    pub fences: HashMap<u64, FenceState>,
    /// Command buffer -> the fence of the slot that owns it.
    pub owner_fence: HashMap<u64, u64>,
    pub semaphores: HashSet<u64>,
    pub command_buffers: HashSet<u64>,

    pub swapchain_images: u32,
    pub swapchain_extent: vk::Extent2D,
    pub next_image: u32,
    pub acquire_script: VecDeque<Acquire>,
    pub present_script: VecDeque<Present>,
    pub rebuilds: usize,

    pub live_targets: HashSet<u64>,
    /// Fail `create_render_target` once this many more succeed.
    pub targets_before_oom: Option<usize>,

    pub live_textures: HashSet<TextureId>,
    /// Fail this many upcoming `register_texture` calls.
    pub register_failures: usize,
    pub live_modules: HashSet<u64>,
    pub live_layouts: HashSet<u64>,
    pub live_pipelines: HashSet<u64>,
    pub overlay_destroyed: bool,
}

impl State {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn presents(&self) -> usize {
        self.count(|e| matches!(e, Event::Present(_)))
    }

    /// Events recorded between the last `Begin` and its `End`.
    pub fn last_command_stream(&self) -> Vec<Event> {
        let start = self
            .events
            .iter()
            .rposition(|e| matches!(e, Event::Begin(_)))
            .expect("nothing recorded");
        let len = self.events[start..]
            .iter()
            .position(|e| matches!(e, Event::End(_)))
            .expect("recording never ended");
        self.events[start..=start + len].to_vec()
    }

    pub fn idle(&mut self) {
        for state in self.fences.values_mut() {
            if *state == FenceState::Pending {
                *state = FenceState::Signaled;
            }
        }
    }
}

pub type Shared = Rc<RefCell<State>>;

pub struct MockGpu {
    pub state: Shared,
}

impl MockGpu {
    pub fn new(swapchain: RenderSize) -> (Self, Shared) {
        let state = Rc::new(RefCell::new(State {
            swapchain_images: 3,
            swapchain_extent: swapchain.extent(),
            ..Default::default()
        }));
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }
}

impl Gpu for MockGpu {
    type Encoder<'a> = MockEncoder<'a>;

    fn wait_idle(&self) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.idle();
        s.events.push(Event::WaitIdle);
        Ok(())
    }

    fn create_frame_sync(&mut self) -> Result<FrameSync> {
        let mut s = self.state.borrow_mut();
        let image_available = s.handle();
        let render_finished = s.handle();
        let fence = s.handle();
        let commands = s.handle();
        s.semaphores.insert(image_available);
        s.semaphores.insert(render_finished);
        s.fences.insert(fence, FenceState::Signaled);
        s.command_buffers.insert(commands);
        s.owner_fence.insert(commands, fence);
        Ok(FrameSync {
            image_available: vk::Semaphore::from_raw(image_available),
            render_finished: vk::Semaphore::from_raw(render_finished),
            in_flight: vk::Fence::from_raw(fence),
            commands: vk::CommandBuffer::from_raw(commands),
        })
    }

    fn destroy_frame_sync(&mut self, sync: FrameSync) {
        let mut s = self.state.borrow_mut();
        let fence = sync.in_flight.as_raw();
        assert_ne!(
            s.fences.get(&fence),
            Some(&FenceState::Pending),
            "destroying a fence the GPU still owns"
        );
        s.fences.remove(&fence);
        s.semaphores.remove(&sync.image_available.as_raw());
        s.semaphores.remove(&sync.render_finished.as_raw());
        s.command_buffers.remove(&sync.commands.as_raw());
    }

    fn wait_fence(&self, fence: vk::Fence) -> Result<()> {
        let mut s = self.state.borrow_mut();
        let raw = fence.as_raw();
        let state = s.fences.get_mut(&raw).expect("unknown fence");
        match *state {
            FenceState::Unsignaled => panic!("waiting on a fence nothing will signal"),
            FenceState::Pending | FenceState::Signaled => *state = FenceState::Signaled,
        }
        s.events.push(Event::WaitFence(raw));
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        let mut s = self.state.borrow_mut();
        let raw = fence.as_raw();
        let state = s.fences.get_mut(&raw).expect("unknown fence");
        assert_ne!(*state, FenceState::Pending, "reset of an in-flight fence");
        *state = FenceState::Unsignaled;
        s.events.push(Event::ResetFence(raw));
        Ok(())
    }

    fn acquire_next_image(&mut self, _signal: vk::Semaphore) -> Acquire {
        let mut s = self.state.borrow_mut();
        s.events.push(Event::Acquire);
        if let Some(scripted) = s.acquire_script.pop_front() {
            return scripted;
        }
        let index = s.next_image;
        s.next_image = (s.next_image + 1) % s.swapchain_images;
        Acquire::Image {
            index,
            suboptimal: false,
        }
    }

    fn submit(&mut self, submission: &Submission) -> Result<()> {
        let mut s = self.state.borrow_mut();
        let fence = submission.fence.as_raw();
        assert_eq!(
            s.fences.get(&fence),
            Some(&FenceState::Unsignaled),
            "submit must signal a freshly reset fence"
        );
        assert_eq!(
            submission.wait_stage,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        s.fences.insert(fence, FenceState::Pending);
        s.events.push(Event::Submit {
            commands: submission.commands.as_raw(),
            fence,
        });
        Ok(())
    }

    fn present(&mut self, image_index: u32, _wait: vk::Semaphore) -> Present {
        let mut s = self.state.borrow_mut();
        s.events.push(Event::Present(image_index));
        s.present_script.pop_front().unwrap_or(Present::Done)
    }

    fn rebuild_swapchain(&mut self, hint: RenderSize) -> Result<()> {
        let mut s = self.state.borrow_mut();
        if hint.is_zero() {
            return Err(RenderError::SurfaceIncompatible("zero-area surface".into()));
        }
        s.idle();
        s.rebuilds += 1;
        s.next_image = 0;
        s.swapchain_extent = hint.extent();
        s.events.push(Event::RebuildSwapchain(hint));
        Ok(())
    }

    fn swapchain_image(&self, index: u32) -> Option<SwapchainImage> {
        let s = self.state.borrow();
        (index < s.swapchain_images).then(|| SwapchainImage {
            image: vk::Image::from_raw(10_000 + u64::from(index)),
            view: vk::ImageView::from_raw(20_000 + u64::from(index)),
            extent: s.swapchain_extent,
        })
    }

    fn create_render_target(&mut self, extent: vk::Extent2D) -> Result<TargetImage> {
        let mut s = self.state.borrow_mut();
        if let Some(left) = s.targets_before_oom.as_mut() {
            if *left == 0 {
                return Err(RenderError::vk(
                    "vkAllocateMemory",
                    vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
                ));
            }
            *left -= 1;
        }
        let image = s.handle();
        let view = s.handle();
        s.live_targets.insert(image);
        s.events.push(Event::CreateTarget(extent));
        Ok(TargetImage {
            image: vk::Image::from_raw(image),
            view: vk::ImageView::from_raw(view),
            extent,
            allocation: AllocationId(image),
        })
    }

    fn destroy_render_target(&mut self, target: TargetImage) {
        let mut s = self.state.borrow_mut();
        assert!(
            s.live_targets.remove(&target.image.as_raw()),
            "double free of a render target"
        );
        s.events.push(Event::DestroyTarget(target.image));
    }

    fn create_shader_module(&mut self, code: &[u32]) -> Result<vk::ShaderModule> {
        assert_eq!(code.first(), Some(&0x0723_0203));
        let mut s = self.state.borrow_mut();
        let h = s.handle();
        s.live_modules.insert(h);
        Ok(vk::ShaderModule::from_raw(h))
    }

    fn destroy_shader_module(&mut self, module: vk::ShaderModule) {
        self.state
            .borrow_mut()
            .live_modules
            .remove(&module.as_raw());
    }

    fn create_pipeline_layout(
        &mut self,
        push_constants: vk::PushConstantRange,
    ) -> Result<vk::PipelineLayout> {
        assert_eq!(push_constants.size, 64);
        let mut s = self.state.borrow_mut();
        let h = s.handle();
        s.live_layouts.insert(h);
        Ok(vk::PipelineLayout::from_raw(h))
    }

    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout) {
        self.state
            .borrow_mut()
            .live_layouts
            .remove(&layout.as_raw());
    }

    fn create_graphics_pipeline(&mut self, desc: &PipelineDesc) -> Result<vk::Pipeline> {
        let mut s = self.state.borrow_mut();
        assert!(s.live_modules.contains(&desc.vertex.as_raw()));
        assert!(s.live_modules.contains(&desc.fragment.as_raw()));
        assert!(s.live_layouts.contains(&desc.layout.as_raw()));
        let h = s.handle();
        s.live_pipelines.insert(h);
        let pipeline = vk::Pipeline::from_raw(h);
        s.events.push(Event::CreatePipeline(pipeline));
        Ok(pipeline)
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        let mut s = self.state.borrow_mut();
        s.live_pipelines.remove(&pipeline.as_raw());
        s.events.push(Event::DestroyPipeline(pipeline));
    }

    fn encoder(&self, commands: vk::CommandBuffer) -> MockEncoder<'_> {
        MockEncoder { gpu: self, commands }
    }
}

pub fn viewport_fields(v: vk::Viewport) -> [f32; 6] {
    [v.x, v.y, v.width, v.height, v.min_depth, v.max_depth]
}

pub struct MockEncoder<'a> {
    gpu: &'a MockGpu,
    commands: vk::CommandBuffer,
}

impl MockEncoder<'_> {
    fn push(&self, event: Event) {
        self.gpu.state.borrow_mut().events.push(event);
    }
}

impl CommandEncoder for MockEncoder<'_> {
    fn raw(&self) -> vk::CommandBuffer {
        self.commands
    }

    fn begin(&mut self) -> Result<()> {
        let raw = self.commands.as_raw();
        {
            let s = self.gpu.state.borrow();
            let fence = s.owner_fence[&raw];
            assert_ne!(
                s.fences[&fence],
                FenceState::Pending,
                "re-recording a command buffer the GPU may still be reading"
            );
        }
        self.push(Event::Begin(raw));
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.push(Event::End(self.commands.as_raw()));
        Ok(())
    }

    fn image_barrier(&mut self, transition: &Transition) {
        self.push(Event::Barrier(*transition));
    }

    fn begin_rendering(&mut self, view: vk::ImageView, extent: vk::Extent2D, clear: [f32; 4]) {
        self.push(Event::BeginRendering {
            view,
            extent,
            clear,
        });
    }

    fn end_rendering(&mut self) {
        self.push(Event::EndRendering);
    }

    fn set_viewport(&mut self, viewport: vk::Viewport) {
        self.push(Event::Viewport(viewport_fields(viewport)));
    }

    fn set_scissor(&mut self, scissor: vk::Rect2D) {
        self.push(Event::Scissor(scissor));
    }

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.push(Event::BindPipeline(pipeline));
    }

    fn bind_descriptor_set(&mut self, _layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        self.push(Event::BindDescriptorSet(set));
    }

    fn push_constants(
        &mut self,
        _layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        bytes: &[u8],
    ) {
        self.push(Event::PushConstants {
            stages,
            bytes: bytes.to_vec(),
        });
    }

    fn draw(&mut self, vertices: u32, instances: u32) {
        self.push(Event::Draw {
            vertices,
            instances,
        });
    }
}

pub struct MockOverlay {
    state: Shared,
    next_texture: u64,
}

impl MockOverlay {
    pub fn new(state: &Shared) -> Self {
        Self {
            state: state.clone(),
            next_texture: 0,
        }
    }
}

impl Overlay<MockGpu> for MockOverlay {
    type DrawData = TextureId;

    fn register_texture(&mut self, _gpu: &mut MockGpu, _view: vk::ImageView) -> Result<TextureId> {
        let mut s = self.state.borrow_mut();
        if s.register_failures > 0 {
            s.register_failures -= 1;
            return Err(RenderError::vk(
                "vkAllocateDescriptorSets",
                vk::Result::ERROR_OUT_OF_POOL_MEMORY,
            ));
        }
        self.next_texture += 1;
        let id = TextureId(self.next_texture);
        s.live_textures.insert(id);
        s.events.push(Event::RegisterTexture(id));
        Ok(id)
    }

    fn unregister_texture(&mut self, _gpu: &mut MockGpu, texture: TextureId) {
        let mut s = self.state.borrow_mut();
        assert!(s.live_textures.remove(&texture), "unknown texture");
        s.events.push(Event::UnregisterTexture(texture));
    }

    fn layout(&mut self, input: &FrameInput) -> UiFrame {
        UiFrame::with_status_bar(input, STATUS_BAR)
    }

    fn compose(&mut self, texture: TextureId, _frame: &UiFrame) -> TextureId {
        texture
    }

    fn render(&mut self, _encoder: &mut dyn CommandEncoder, data: &TextureId) {
        self.state
            .borrow_mut()
            .events
            .push(Event::OverlayRender(*data));
    }

    fn destroy(&mut self, _gpu: &mut MockGpu) {
        self.state.borrow_mut().overlay_destroyed = true;
    }
}

/// "Compiles" by copying a SPIR-V header next to the source, failing when
/// the source contains `#error`.
pub struct MockCompiler;

impl ShaderCompiler for MockCompiler {
    fn compile(&self, source: &Path) -> Result<PathBuf> {
        let text = fs::read_to_string(source).map_err(|e| RenderError::ShaderCompile {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;
        if text.contains("#error") {
            return Err(RenderError::ShaderCompile {
                path: source.to_path_buf(),
                reason: "exit status: 1".into(),
            });
        }
        let out = source.with_extension("spv");
        let words: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 1, 0];
        fs::write(&out, le_bytes(&words)).expect("write spv");
        Ok(out)
    }
}

fn le_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// A scratch directory with a vertex and a fragment source.
pub struct ShaderDir {
    pub dir: PathBuf,
    pub sources: ShaderSources,
}

impl ShaderDir {
    pub fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("glint-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("scratch dir");
        let sources = ShaderSources {
            vertex: dir.join("fullscreen.vert"),
            fragment: dir.join("toy.frag"),
        };
        fs::write(&sources.vertex, "void main() {}\n").expect("vert");
        fs::write(&sources.fragment, "void main() {}\n").expect("frag");
        Self { dir, sources }
    }

    pub fn break_fragment(&self) {
        fs::write(&self.sources.fragment, "#error broken\n").expect("frag");
    }
}

impl Drop for ShaderDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

/// Input for a window of `width x height` with the cursor outside.
pub fn input(width: u32, height: u32) -> FrameInput {
    FrameInput {
        framebuffer: RenderSize::new(width, height),
        ..Default::default()
    }
}
