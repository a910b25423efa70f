use std::fs;
use std::io;
use std::path::PathBuf;

use sandbox_engine::{
    load_level, resolve_app_paths, AppContent, AppPaths, LevelError, LoopConfig, StartupError,
};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::brains::demo_catalog;
use super::config::{ConfigError, SandboxConfig, CONFIG_FILE_NAME};
use super::demo_level::DEMO_LEVEL_XML;

const DEMO_LEVEL_FILE_NAME: &str = "demo.xml";

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Level(#[from] LevelError),
    #[error("failed to write demo level '{path}': {source}")]
    WriteDemo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) content: AppContent,
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Sandbox Startup ===");

    let paths = resolve_app_paths()?;
    let sandbox_config = SandboxConfig::load(&paths.root.join(CONFIG_FILE_NAME))?;
    let level_path = resolve_level_path(&paths, &sandbox_config)?;
    let level = load_level(&level_path)?;
    info!(
        level = %level.name,
        path = %level_path.display(),
        actors = level.actors.len(),
        cost = level.total_cost(),
        "level_loaded"
    );

    Ok(AppWiring {
        config: sandbox_config.apply(LoopConfig::default()),
        content: AppContent {
            catalog: demo_catalog(),
            level,
        },
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// A configured level is taken as-is; otherwise the demo level is used, written out on
/// first run.
fn resolve_level_path(
    paths: &AppPaths,
    config: &SandboxConfig,
) -> Result<PathBuf, BootstrapError> {
    if let Some(level) = &config.level {
        return Ok(paths.root.join(level));
    }
    let demo = paths.levels_dir.join(DEMO_LEVEL_FILE_NAME);
    if !demo.is_file() {
        fs::write(&demo, DEMO_LEVEL_XML).map_err(|source| BootstrapError::WriteDemo {
            path: demo.clone(),
            source,
        })?;
        info!(path = %demo.display(), "demo_level_written");
    }
    Ok(demo)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths_in(root: &std::path::Path) -> AppPaths {
        let paths = AppPaths {
            root: root.to_path_buf(),
            levels_dir: root.join("levels"),
            cache_dir: root.join("cache"),
        };
        fs::create_dir_all(&paths.levels_dir).expect("levels dir");
        paths
    }

    #[test]
    fn demo_level_is_written_once_and_loads() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = paths_in(dir.path());

        let path = resolve_level_path(&paths, &SandboxConfig::default()).expect("resolve");
        assert_eq!(path, paths.levels_dir.join(DEMO_LEVEL_FILE_NAME));
        let level = load_level(&path).expect("demo level loads");
        assert_eq!(level.name, "Demo Pond");

        fs::write(&path, "<Level name=\"Edited\"/>").expect("overwrite");
        let again = resolve_level_path(&paths, &SandboxConfig::default()).expect("resolve");
        assert_eq!(load_level(&again).expect("load").name, "Edited");
    }

    #[test]
    fn configured_level_is_relative_to_the_root() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = paths_in(dir.path());
        let config = SandboxConfig {
            level: Some(PathBuf::from("levels/pond.xml")),
            ..SandboxConfig::default()
        };

        let path = resolve_level_path(&paths, &config).expect("resolve");
        assert_eq!(path, dir.path().join("levels/pond.xml"));
        assert!(!paths.levels_dir.join(DEMO_LEVEL_FILE_NAME).exists());
    }

    #[test]
    fn unwritable_levels_dir_reports_the_demo_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = AppPaths {
            root: dir.path().to_path_buf(),
            levels_dir: dir.path().join("missing"),
            cache_dir: dir.path().join("cache"),
        };

        let error = resolve_level_path(&paths, &SandboxConfig::default()).expect_err("no dir");
        match error {
            BootstrapError::WriteDemo { path, .. } => assert!(path.ends_with("demo.xml")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
