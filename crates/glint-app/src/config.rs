// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use glint_platform::WindowSpec;
use glint_render::{EngineConfig, ShaderSources};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub shaders: ShaderCfg,
    pub hud: HudCfg,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        let spec = WindowSpec::default();
        Self {
            title: spec.title,
            width: spec.width,
            height: spec.height,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub frames_in_flight: usize,
    /// `None` follows the build profile.
    pub validation: Option<bool>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        Self {
            frames_in_flight: glint_render::engine::MIN_FRAMES_IN_FLIGHT,
            validation: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ShaderCfg {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
    pub compiler: PathBuf,
    /// SPIR-V output and the pipeline cache file.
    pub output_dir: PathBuf,
}

impl Default for ShaderCfg {
    fn default() -> Self {
        Self {
            vertex: "shaders/fullscreen.vert".into(),
            fragment: "shaders/toy.frag".into(),
            compiler: "glslc".into(),
            output_dir: "target/glint".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HudCfg {
    pub bar_height: u32,
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for HudCfg {
    fn default() -> Self {
        Self {
            bar_height: 32,
            vertex: "shaders/blit.vert".into(),
            fragment: "shaders/blit.frag".into(),
        }
    }
}

impl AppCfg {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// A missing file yields defaults; an unreadable or malformed one warns
    /// and yields defaults too.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file; using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config unreadable; using defaults");
                return Self::default();
            }
        };
        match Self::parse(&text) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config malformed; using defaults");
                Self::default()
            }
        }
    }

    pub fn window_spec(&self) -> WindowSpec {
        WindowSpec {
            title: self.window.title.clone(),
            width: self.window.width,
            height: self.window.height,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(ShaderSources {
            vertex: self.shaders.vertex.clone(),
            fragment: self.shaders.fragment.clone(),
        })
        .with_frames_in_flight(self.render.frames_in_flight)
    }

    pub fn hud_sources(&self) -> ShaderSources {
        ShaderSources {
            vertex: self.hud.vertex.clone(),
            fragment: self.hud.fragment.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg = AppCfg::parse(
            r#"
            [render]
            frames_in_flight = 3

            [shaders]
            fragment = "toys/plasma.frag"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.render.frames_in_flight, 3);
        assert_eq!(cfg.render.validation, None);
        assert_eq!(cfg.shaders.fragment, PathBuf::from("toys/plasma.frag"));
        assert_eq!(cfg.shaders.vertex, PathBuf::from("shaders/fullscreen.vert"));
        assert_eq!(cfg.hud, HudCfg::default());
    }

    #[test]
    fn engine_config_clamps_frames_in_flight() {
        let mut cfg = AppCfg::default();
        cfg.render.frames_in_flight = 1;
        assert_eq!(cfg.engine_config().frames_in_flight, 2);
        cfg.render.frames_in_flight = 64;
        assert_eq!(
            cfg.engine_config().frames_in_flight,
            glint_render::engine::MAX_FRAMES_IN_FLIGHT
        );
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("glint-cfg-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("glint.toml");
        fs::write(&path, "[render\nframes_in_flight = ").unwrap();
        assert_eq!(AppCfg::load(&path), AppCfg::default());
        assert_eq!(AppCfg::load(&dir.join("absent.toml")), AppCfg::default());
        let _ = fs::remove_dir_all(&dir);
    }
}
