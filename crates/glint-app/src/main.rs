// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use glint_core::{init_tracing, Stopwatch};
use glint_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};
use glint_platform::{create_window, framebuffer_size, InputState};
use glint_render::{Engine, Glslc, Gpu, RenderSize};
use glint_render_vk::{DeviceConfig, HudOverlay, VkGpu};
use tracing::{debug, error, info, warn};

use crate::config::AppCfg;

const TITLE_REFRESH: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file
    #[arg(long, default_value = "glint.toml")]
    config: PathBuf,
    /// Vertex shader source
    #[arg(long)]
    vertex: Option<PathBuf>,
    /// Fragment shader source
    #[arg(long)]
    fragment: Option<PathBuf>,
    /// Frames in flight (at least 2)
    #[arg(long)]
    frames_in_flight: Option<usize>,
    /// GLSL to SPIR-V compiler program
    #[arg(long)]
    compiler: Option<PathBuf>,
}

impl Args {
    fn apply(&self, cfg: &mut AppCfg) {
        if let Some(v) = &self.vertex {
            cfg.shaders.vertex = v.clone();
        }
        if let Some(f) = &self.fragment {
            cfg.shaders.fragment = f.clone();
        }
        if let Some(n) = self.frames_in_flight {
            cfg.render.frames_in_flight = n;
        }
        if let Some(c) = &self.compiler {
            cfg.shaders.compiler = c.clone();
        }
    }
}

type ToyEngine = Engine<VkGpu, HudOverlay>;

struct App {
    cfg: AppCfg,
    // Dropped before the window it renders into.
    engine: Option<ToyEngine>,
    window: Option<Window>,
    input: InputState,
    stopwatch: Stopwatch,
    last_title: Instant,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppCfg) -> Self {
        Self {
            cfg,
            engine: None,
            window: None,
            input: InputState::new(),
            stopwatch: Stopwatch::new(),
            last_title: Instant::now(),
            failure: None,
        }
    }

    fn open_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = create_window(event_loop, &self.cfg.window_spec())?;
        self.window = Some(window);
        Ok(())
    }

    /// A surface with no area cannot back a swapchain; startup waits for one.
    fn wants_engine(&self, size: RenderSize) -> bool {
        self.engine.is_none() && self.failure.is_none() && !size.is_zero()
    }

    fn start_engine(&mut self) -> Result<()> {
        let Some(window) = &self.window else {
            return Ok(());
        };
        let size = framebuffer_size(window);
        if !self.wants_engine(size) {
            if size.is_zero() {
                debug!("window has no area yet; renderer start deferred");
            }
            return Ok(());
        }

        let device_cfg = DeviceConfig::default()
            .with_app_name(self.cfg.window.title.clone())
            .with_validation(self.cfg.render.validation.unwrap_or(cfg!(debug_assertions)));
        let mut gpu = VkGpu::new(
            window,
            window,
            size,
            &device_cfg,
            Some(self.cfg.shaders.output_dir.as_path()),
        )
        .context("vulkan init")?;

        let glslc = Glslc::new(&self.cfg.shaders.compiler, &self.cfg.shaders.output_dir);
        let hud = HudOverlay::new(
            &mut gpu,
            &glslc,
            &self.cfg.hud_sources(),
            self.cfg.hud.bar_height,
        )
        .context("hud init")?;
        let engine = Engine::new(gpu, hud, Box::new(glslc), self.cfg.engine_config())
            .context("engine init")?;

        info!(
            width = size.width,
            height = size.height,
            fragment = %self.cfg.shaders.fragment.display(),
            "glint started"
        );
        self.engine = Some(engine);
        self.stopwatch.reset();
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        self.failure = Some(e);
        self.engine = None;
        self.window = None;
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(window), Some(engine)) = (&self.window, &mut self.engine) else {
            return;
        };
        let size = framebuffer_size(window);
        if size.is_zero() {
            self.stopwatch.reset();
            return;
        }

        let dt = self.stopwatch.lap().as_secs_f32();
        let input = self.input.frame_input(size);
        match engine.frame(&input, dt) {
            Ok(_) => {}
            Err(e) if e.is_fatal() => {
                self.fail(event_loop, anyhow!(e).context("frame loop"));
                return;
            }
            Err(e) => warn!(error = %e, "frame failed"),
        }

        if self.last_title.elapsed() >= TITLE_REFRESH {
            self.last_title = Instant::now();
            let status = engine.status();
            let state = if status.playing { "" } else { " [stopped]" };
            window.set_title(&format!("{}  {status}{state}", self.cfg.window.title));
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.failure.is_some() {
            return;
        }
        if let Err(e) = self.open_window(event_loop).and_then(|()| self.start_engine()) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }
        self.input.on_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.engine = None;
                self.window = None;
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                if new_size.width == 0 || new_size.height == 0 {
                    return;
                }
                // Some compositors never report OUT_OF_DATE, so rebuild here.
                if let Some(engine) = &mut self.engine {
                    let hint = RenderSize::new(new_size.width, new_size.height);
                    if let Err(e) = engine.gpu_mut().rebuild_swapchain(hint) {
                        warn!(error = %e, "swapchain rebuild on resize failed");
                    }
                }
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => self.redraw(event_loop),

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.start_engine() {
            self.fail(event_loop, e);
            return;
        }
        let Some(window) = &self.window else {
            return;
        };
        if framebuffer_size(window).is_zero() {
            // Minimised: sleep until the next event.
            event_loop.set_control_flow(ControlFlow::Wait);
        } else {
            event_loop.set_control_flow(ControlFlow::Poll);
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut cfg = AppCfg::load(&args.config);
    args.apply(&mut cfg);

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg);
    event_loop.run_app(&mut app)?;

    if let Some(e) = app.failure.take() {
        drop(app);
        error!("{e:#}");
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_the_file() {
        let args = Args::parse_from([
            "glint",
            "--fragment",
            "toys/rings.frag",
            "--frames-in-flight",
            "4",
            "--compiler",
            "/opt/vulkan/bin/glslc",
        ]);
        let mut cfg = AppCfg::default();
        args.apply(&mut cfg);
        assert_eq!(cfg.shaders.fragment, PathBuf::from("toys/rings.frag"));
        assert_eq!(cfg.shaders.vertex, PathBuf::from("shaders/fullscreen.vert"));
        assert_eq!(cfg.render.frames_in_flight, 4);
        assert_eq!(cfg.shaders.compiler, PathBuf::from("/opt/vulkan/bin/glslc"));
        assert_eq!(args.config, PathBuf::from("glint.toml"));
    }

    #[test]
    fn renderer_start_waits_for_a_drawable_window() {
        let mut app = App::new(AppCfg::default());
        assert!(!app.wants_engine(RenderSize::new(0, 0)));
        assert!(!app.wants_engine(RenderSize::new(800, 0)));
        assert!(app.wants_engine(RenderSize::new(800, 632)));

        app.failure = Some(anyhow!("vulkan init"));
        assert!(!app.wants_engine(RenderSize::new(800, 632)));
    }
}
