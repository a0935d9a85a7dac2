//! Immutable `Context`: the explicit replacement for the original's
//! process-wide mutable singletons (spec.md §9, SPEC_FULL.md §2 item 10).
//!
//! Built once from the environment variables in spec.md §6 and threaded
//! through the engine and executor instead of read from globals.

use std::path::{Path, PathBuf};

/// Configuration resolved once at process start, analogous to
/// `leantask/context.py::GlobalContext` but immutable after construction.
#[derive(Debug, Clone)]
pub struct Context {
    pub project_dir: PathBuf,
    pub flows_dir: PathBuf,
    pub metadata_dir: PathBuf,
    pub worker_count: u32,
    pub heartbeat_secs: u64,
    pub cache_timeout_secs: u64,
}

impl Context {
    /// Resolve from the environment variables listed in spec.md §6,
    /// falling back to the documented defaults.
    pub fn from_env() -> Self {
        let project_dir = std::env::var("PROJECT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::current_dir().expect("current dir is readable"));

        let flows_dir = match std::env::var("FLOWS_DIRNAME") {
            Ok(sub) => project_dir.join(sub),
            Err(_) => project_dir.clone(),
        };

        let metadata_dir = project_dir.join(".leantask");

        let worker_count = std::env::var("WORKER")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        let heartbeat_secs = std::env::var("HEARTBEAT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let cache_timeout_secs = std::env::var("CACHE_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600);

        Self {
            project_dir,
            flows_dir,
            metadata_dir,
            worker_count,
            heartbeat_secs,
            cache_timeout_secs,
        }
    }

    pub fn for_project(project_dir: PathBuf) -> Self {
        let metadata_dir = project_dir.join(".leantask");
        Self {
            flows_dir: project_dir.clone(),
            metadata_dir,
            project_dir,
            worker_count: 1,
            heartbeat_secs: 30,
            cache_timeout_secs: 3600,
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.metadata_dir.join("log")
    }

    pub fn scheduler_session_log_path(&self, session_id: uuid::Uuid) -> PathBuf {
        self.log_dir()
            .join("scheduler_sessions")
            .join(format!("{session_id}.log"))
    }

    pub fn flow_run_log_path(&self, flow_id: uuid::Uuid, flow_run_id: uuid::Uuid) -> PathBuf {
        self.log_dir()
            .join("flow_runs")
            .join(flow_id.to_string())
            .join(format!("{flow_run_id}.log"))
    }

    pub fn task_run_log_path(
        &self,
        flow_id: uuid::Uuid,
        task_name: &str,
        task_run_id: uuid::Uuid,
    ) -> PathBuf {
        self.log_dir()
            .join("task_runs")
            .join(flow_id.to_string())
            .join(task_name)
            .join(format!("{task_run_id}.log"))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.metadata_dir.join("__cache__")
    }

    pub fn manifest_path(&self, flow_path: &str) -> PathBuf {
        self.project_dir.join(flow_path)
    }

    /// Remove cache entries older than `CACHE_TIMEOUT` seconds (spec.md
    /// §6: "garbage-collected by age").
    pub fn gc_cache(&self) -> std::io::Result<()> {
        let dir = self.cache_dir();
        if !dir.is_dir() {
            return Ok(());
        }
        let cutoff = std::time::SystemTime::now()
            .checked_sub(std::time::Duration::from_secs(self.cache_timeout_secs));
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let modified = entry.metadata().and_then(|m| m.modified()).ok();
            if let (Some(modified), Some(cutoff)) = (modified, cutoff) {
                if modified < cutoff {
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }
        Ok(())
    }
}

pub fn ensure_layout(root: &Path) -> std::io::Result<()> {
    let metadata_dir = root.join(".leantask");
    std::fs::create_dir_all(metadata_dir.join("__cache__"))?;
    std::fs::create_dir_all(metadata_dir.join("log").join("scheduler_sessions"))?;
    std::fs::create_dir_all(metadata_dir.join("log").join("flow_runs"))?;
    std::fs::create_dir_all(metadata_dir.join("log").join("task_runs"))?;
    std::fs::create_dir_all(metadata_dir.join("log").join("local"))?;
    Ok(())
}
