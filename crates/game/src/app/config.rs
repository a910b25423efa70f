use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sandbox_engine::mode::Mode;
use sandbox_engine::{LoopConfig, RenderSettings};
use serde::Deserialize;
use thiserror::Error;

pub(crate) const CONFIG_FILE_NAME: &str = "sandbox.json";

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse config '{path}' at {field}: {source}")]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Optional overrides read from `sandbox.json` at the project root.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SandboxConfig {
    pub window_title: Option<String>,
    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
    pub target_tps: Option<u32>,
    pub max_render_fps: Option<u32>,
    pub metrics_log_interval_ms: Option<u64>,
    pub simulated_slow_frame_ms: Option<u64>,
    pub frame_skip_budget_ms: Option<u64>,
    /// Open the level in the tool menu instead of playing it.
    pub start_in_edit: bool,
    /// Level file, relative to the project root.
    pub level: Option<PathBuf>,
    pub render: Option<RenderSettings>,
}

impl SandboxConfig {
    /// A missing file means defaults.
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::parse(path, &raw),
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn parse(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            let field = match error.path().to_string() {
                field if field.is_empty() || field == "." => "<root>".to_string(),
                field => field,
            };
            ConfigError::Parse {
                path: path.to_path_buf(),
                field,
                source: error.into_inner(),
            }
        })
    }

    pub(crate) fn apply(&self, mut config: LoopConfig) -> LoopConfig {
        if let Some(title) = &self.window_title {
            config.window_title = title.clone();
        }
        if let Some(width) = self.window_width {
            config.window_width = width;
        }
        if let Some(height) = self.window_height {
            config.window_height = height;
        }
        if let Some(tps) = self.target_tps {
            config.target_tps = tps;
        }
        if let Some(fps) = self.max_render_fps {
            config.max_render_fps = Some(fps);
        }
        if let Some(ms) = self.metrics_log_interval_ms {
            config.metrics_log_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.simulated_slow_frame_ms {
            config.simulated_slow_frame_ms = ms;
        }
        if let Some(ms) = self.frame_skip_budget_ms {
            config.frame_skip_budget_ms = ms;
        }
        if self.start_in_edit {
            config.initial_mode = Mode::ToolMenu;
        }
        if let Some(render) = self.render {
            config.render = render;
        }
        config
    }
}
