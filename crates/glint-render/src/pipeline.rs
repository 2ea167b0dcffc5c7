// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

use ash::vk;
use tracing::{debug, info};

use crate::gpu::{Gpu, PipelineDesc};
use crate::push::PushConstants;
use crate::{RenderError, Result};

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Turns a shader source into a SPIR-V file on disk.
pub trait ShaderCompiler {
    fn compile(&self, source: &Path) -> Result<PathBuf>;
}

/// Runs `glslc` (or a compatible program) as a child process.
#[derive(Clone, Debug)]
pub struct Glslc {
    pub program: PathBuf,
    pub output_dir: PathBuf,
}

impl Glslc {
    pub fn new(program: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn output_for(&self, source: &Path) -> PathBuf {
        let mut name = source
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".spv");
        self.output_dir.join(name)
    }
}

impl ShaderCompiler for Glslc {
    fn compile(&self, source: &Path) -> Result<PathBuf> {
        let failed = |reason: String| RenderError::ShaderCompile {
            path: source.to_path_buf(),
            reason,
        };

        fs::create_dir_all(&self.output_dir).map_err(|e| failed(e.to_string()))?;
        let output = self.output_for(source);
        // A stale blob must not pass for a fresh one.
        let _ = fs::remove_file(&output);

        let run = Command::new(&self.program)
            .arg(source)
            .arg("-o")
            .arg(&output)
            .output()
            .map_err(|e| failed(format!("{}: {e}", self.program.display())))?;

        if !run.status.success() {
            let stderr = String::from_utf8_lossy(&run.stderr);
            return Err(failed(format!("{}: {}", run.status, stderr.trim())));
        }
        if !output.is_file() {
            return Err(failed(format!("no output at {}", output.display())));
        }
        debug!(source = %source.display(), output = %output.display(), "shader compiled");
        Ok(output)
    }
}

/// Reads a SPIR-V blob, rejecting anything without the SPIR-V magic word.
pub fn load_spirv(path: &Path) -> Result<Vec<u32>> {
    let invalid = |reason: String| RenderError::ShaderModuleInvalid {
        path: path.to_path_buf(),
        reason,
    };
    let bytes = fs::read(path).map_err(|e| invalid(e.to_string()))?;
    let words = ash::util::read_spv(&mut Cursor::new(&bytes)).map_err(|e| invalid(e.to_string()))?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(other) => Err(invalid(format!("bad magic 0x{other:08x}"))),
        None => Err(invalid("empty module".into())),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderSources {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

/// SPIR-V for both stages, loaded and checked.
pub struct StageCode {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

pub fn compile_stages(compiler: &dyn ShaderCompiler, sources: &ShaderSources) -> Result<StageCode> {
    let vertex = load_spirv(&compiler.compile(&sources.vertex)?)?;
    let fragment = load_spirv(&compiler.compile(&sources.fragment)?)?;
    Ok(StageCode { vertex, fragment })
}

/// Creates both modules, runs `build`, and destroys the modules whatever
/// the outcome.
pub fn with_modules<G, T>(
    gpu: &mut G,
    code: &StageCode,
    build: impl FnOnce(&mut G, vk::ShaderModule, vk::ShaderModule) -> Result<T>,
) -> Result<T>
where
    G: Gpu,
{
    let vertex = gpu.create_shader_module(&code.vertex)?;
    let fragment = match gpu.create_shader_module(&code.fragment) {
        Ok(m) => m,
        Err(e) => {
            gpu.destroy_shader_module(vertex);
            return Err(e);
        }
    };
    let built = build(gpu, vertex, fragment);
    gpu.destroy_shader_module(vertex);
    gpu.destroy_shader_module(fragment);
    built
}

/// The shader pipeline feeding the off-screen pass.
///
/// The layout is created with the first successful build and kept; the
/// pipeline object is replaced only once its successor exists.
pub struct PipelineManager {
    sources: ShaderSources,
    compiler: Box<dyn ShaderCompiler>,
    color_format: vk::Format,
    layout: Option<vk::PipelineLayout>,
    pipeline: Option<vk::Pipeline>,
    generation: u64,
}

impl PipelineManager {
    pub fn new(
        sources: ShaderSources,
        compiler: Box<dyn ShaderCompiler>,
        color_format: vk::Format,
    ) -> Self {
        Self {
            sources,
            compiler,
            color_format,
            layout: None,
            pipeline: None,
            generation: 0,
        }
    }

    pub fn sources(&self) -> &ShaderSources {
        &self.sources
    }

    /// `(layout, pipeline)` when a pipeline has been built.
    pub fn bound(&self) -> Option<(vk::PipelineLayout, vk::Pipeline)> {
        self.layout.zip(self.pipeline)
    }

    /// Number of successful builds so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Compiles and installs a pipeline. Nothing bound changes on failure.
    pub fn build<G: Gpu>(&mut self, gpu: &mut G) -> Result<()> {
        let code = compile_stages(self.compiler.as_ref(), &self.sources)?;
        self.install(gpu, &code)
    }

    /// Like [`PipelineManager::build`] but waits for the device to go idle
    /// before the old pipeline is retired.
    pub fn reload<G: Gpu>(&mut self, gpu: &mut G) -> Result<()> {
        let code = compile_stages(self.compiler.as_ref(), &self.sources)?;
        gpu.wait_idle()?;
        self.install(gpu, &code)?;
        info!(generation = self.generation, "pipeline reloaded");
        Ok(())
    }

    fn install<G: Gpu>(&mut self, gpu: &mut G, code: &StageCode) -> Result<()> {
        let layout = match self.layout {
            Some(layout) => layout,
            None => {
                let layout = gpu.create_pipeline_layout(vk::PushConstantRange {
                    stage_flags: vk::ShaderStageFlags::FRAGMENT,
                    offset: 0,
                    size: PushConstants::SIZE,
                })?;
                self.layout = Some(layout);
                layout
            }
        };

        let color_format = self.color_format;
        let pipeline = with_modules(gpu, code, |gpu, vertex, fragment| {
            gpu.create_graphics_pipeline(&PipelineDesc {
                layout,
                vertex,
                fragment,
                color_format,
                cull_mode: vk::CullModeFlags::BACK,
            })
        })?;

        if let Some(old) = self.pipeline.replace(pipeline) {
            gpu.destroy_pipeline(old);
        }
        self.generation += 1;
        debug!(generation = self.generation, "pipeline installed");
        Ok(())
    }

    /// Caller must have waited for the device to go idle.
    pub fn destroy<G: Gpu>(&mut self, gpu: &mut G) {
        if let Some(pipeline) = self.pipeline.take() {
            gpu.destroy_pipeline(pipeline);
        }
        if let Some(layout) = self.layout.take() {
            gpu.destroy_pipeline_layout(layout);
        }
    }
}
