use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod level;
pub mod math;
pub mod mode;
pub mod render;
pub mod session;
pub mod sim;
mod storage;

pub use app::{
    run_app, run_app_with_metrics, AppContent, AppError, InputAction, LoopConfig,
    LoopMetricsSnapshot, MetricsHandle, SLOW_FRAME_ENV_VAR,
};
pub use level::{load_level, parse_level, LevelDef, LevelError};
pub use math::Vec3;
pub use mode::{Mode, ModeStateMachine};
pub use render::{RenderGraph, RenderSettings};
pub use session::{Session, SessionParts, TransitionEffect};
pub use sim::{SimWorld, SimulationTick};

pub const ROOT_ENV_VAR: &str = "SANDBOX_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub levels_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl AppPaths {
    pub fn autosave_path(&self) -> PathBuf {
        self.cache_dir.join("autosave.json")
    }

    pub fn thumbnail_path(&self, level_name: &str) -> PathBuf {
        let stem: String = level_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.cache_dir.join("thumbnails").join(format!("{stem}.png"))
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "SANDBOX_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or levels/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or levels/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/sandbox\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    let paths = AppPaths {
        levels_dir: root.join("levels"),
        cache_dir: root.join("cache"),
        root,
    };
    for dir in [&paths.levels_dir, &paths.cache_dir] {
        fs::create_dir_all(dir).map_err(|source| StartupError::CreateDir {
            path: dir.clone(),
            source,
        })?;
    }
    Ok(paths)
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            exe_dir
                .ancestors()
                .find(|candidate| is_repo_marker(candidate))
                .map(normalize_path)
                .ok_or_else(|| StartupError::RootNotFound {
                    start_dir: normalize_path(&exe_dir),
                    env_var: ROOT_ENV_VAR,
                })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    path.join("Cargo.toml").is_file()
        && (path.join("crates").is_dir() || path.join("levels").is_dir())
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::create_dir(dir.path().join("levels")).expect("levels dir");
        assert!(!is_repo_marker(dir.path()));

        fs::write(dir.path().join("Cargo.toml"), "[workspace]\n").expect("manifest");
        assert!(is_repo_marker(dir.path()));
    }

    #[test]
    fn thumbnail_path_sanitizes_level_name() {
        let paths = AppPaths {
            root: PathBuf::from("/r"),
            levels_dir: PathBuf::from("/r/levels"),
            cache_dir: PathBuf::from("/r/cache"),
        };
        assert_eq!(
            paths.thumbnail_path("Sunny Hill/2"),
            PathBuf::from("/r/cache/thumbnails/Sunny_Hill_2.png")
        );
    }
}
