//! The declarative `*.flow.toml` manifest format (SPEC_FULL.md §1).
//!
//! A manifest is parsed, never executed: deserializing it *is* "index
//! mode" (spec.md §4.2 step 1 / §4.6 step 4).

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct FlowManifest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub cron_schedules: Vec<String>,
    pub start_datetime: Option<DateTime<Utc>>,
    pub end_datetime: Option<DateTime<Utc>>,
    pub max_delay_secs: Option<i64>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub tasks: Vec<TaskManifest>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskManifest {
    pub name: String,
    pub kind: TaskKind,
    #[serde(default)]
    pub retry_max: u32,
    #[serde(default)]
    pub retry_delay_secs: u64,
    /// Names of tasks that must complete before this one starts.
    #[serde(default)]
    pub upstream: Vec<String>,
    #[serde(default)]
    pub config: toml::Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Shell,
    Noop,
}

impl FlowManifest {
    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_manifest() {
        let toml = r#"
            name = "hello"
            cron_schedules = ["*/5 * * * *"]

            [[tasks]]
            name = "greet"
            kind = "shell"
            [tasks.config]
            command = "echo hi"
        "#;
        let manifest = FlowManifest::parse(toml).unwrap();
        assert_eq!(manifest.name, "hello");
        assert_eq!(manifest.tasks.len(), 1);
        assert_eq!(manifest.tasks[0].kind, TaskKind::Shell);
        assert!(manifest.active);
    }

    #[test]
    fn upstream_defaults_to_empty() {
        let toml = r#"
            name = "solo"

            [[tasks]]
            name = "only"
            kind = "noop"
        "#;
        let manifest = FlowManifest::parse(toml).unwrap();
        assert!(manifest.tasks[0].upstream.is_empty());
    }
}
