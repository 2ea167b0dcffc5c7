// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("device initialization failed: {0}")]
    DeviceInit(String),

    #[error("surface is incompatible with a swapchain: {0}")]
    SurfaceIncompatible(String),

    #[error("swapchain rebuild failed: {0}")]
    SwapchainRebuild(vk::Result),

    #[error("out of device memory while {0}")]
    OutOfDeviceMemory(String),

    #[error("shader compilation failed for {}: {reason}", path.display())]
    ShaderCompile { path: PathBuf, reason: String },

    #[error("invalid shader module {}: {reason}", path.display())]
    ShaderModuleInvalid { path: PathBuf, reason: String },

    #[error("swapchain acquire/present failed: {0}")]
    AcquirePresentTransient(vk::Result),

    #[error("frame loop invariant broken: {0}")]
    Internal(&'static str),

    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
}

impl RenderError {
    /// Wraps a raw Vulkan failure, folding memory exhaustion into
    /// [`RenderError::OutOfDeviceMemory`].
    pub fn vk(call: &'static str, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                RenderError::OutOfDeviceMemory(call.to_string())
            }
            _ => RenderError::Vulkan { call, result },
        }
    }

    /// `map_err` adapter for [`RenderError::vk`].
    pub fn at(call: &'static str) -> impl Fn(vk::Result) -> Self {
        move |result| Self::vk(call, result)
    }

    /// Whether the frame loop must stop. Everything else degrades to
    /// "skip this frame" or "keep the old pipeline".
    pub fn is_fatal(&self) -> bool {
        match self {
            RenderError::DeviceInit(_)
            | RenderError::OutOfDeviceMemory(_)
            | RenderError::Internal(_) => true,
            RenderError::Vulkan { result, .. } => *result == vk::Result::ERROR_DEVICE_LOST,
            RenderError::SurfaceIncompatible(_)
            | RenderError::SwapchainRebuild(_)
            | RenderError::ShaderCompile { .. }
            | RenderError::ShaderModuleInvalid { .. }
            | RenderError::AcquirePresentTransient(_) => false,
        }
    }
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
