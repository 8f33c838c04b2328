use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::Serialize;

use seedwright_generate::{GenerateOptions, GenerationReport};

use super::{RegistryError, RegistryResult};
use crate::redact::RedactedConnection;

/// What a seeding run was asked to do.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub run_dir: PathBuf,
    pub schema_path: PathBuf,
    pub model: String,
    pub store: String,
    pub only_table: Option<String>,
    pub options: GenerateOptions,
    pub connection: Option<RedactedConnection>,
}

/// `config.json` of a run directory.
#[derive(Debug, Serialize)]
pub struct RunConfig<'a> {
    pub run_id: &'a str,
    pub started_at: String,
    pub schema_path: &'a Path,
    pub model: &'a str,
    pub store: &'a str,
    pub only_table: Option<&'a str>,
    pub options: &'a GenerateOptions,
    pub connection: Option<&'a RedactedConnection>,
    pub git: GitInfo,
}

#[derive(Debug, Serialize)]
pub struct GitInfo {
    pub commit: Option<String>,
    pub dirty: Option<bool>,
}

/// Artifact paths inside a run directory.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub logs_path: PathBuf,
    pub report_path: PathBuf,
}

/// Create `<run_dir>/<timestamp>__run_<id>/` with its config and an empty log.
pub fn start_run(ctx: &RunContext) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = ctx.run_dir.join(format!("{timestamp}__run_{}", ctx.run_id));
    create_dir_all(&root)?;

    let config = RunConfig {
        run_id: &ctx.run_id,
        started_at: ctx.started_at.to_rfc3339(),
        schema_path: &ctx.schema_path,
        model: &ctx.model,
        store: &ctx.store,
        only_table: ctx.only_table.as_deref(),
        options: &ctx.options,
        connection: ctx.connection.as_ref(),
        git: collect_git_info(),
    };
    write_json(&root.join("config.json"), &config)?;

    let logs_path = root.join("logs.ndjson");
    OpenOptions::new().create(true).append(true).open(&logs_path)?;

    Ok(RunPaths {
        report_path: root.join("report.json"),
        logs_path,
        root,
    })
}

pub fn write_report(paths: &RunPaths, report: &GenerationReport) -> RegistryResult<()> {
    write_json(&paths.report_path, report)
}

fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(RegistryError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redact::redact_connection;

    #[test]
    fn run_directory_holds_redacted_config_and_report() {
        let run_dir = std::env::temp_dir().join(format!(
            "seedwright_registry_{}",
            uuid::Uuid::new_v4()
        ));
        let ctx = RunContext {
            run_id: "abc".to_string(),
            started_at: Utc::now(),
            run_dir: run_dir.clone(),
            schema_path: PathBuf::from("schema.sql"),
            model: "llama3".to_string(),
            store: "postgres".to_string(),
            only_table: None,
            options: GenerateOptions::default(),
            connection: Some(redact_connection("postgres://u:secret@h/db")),
        };

        let paths = start_run(&ctx).expect("start run");
        assert!(paths.root.ends_with(format!(
            "{}__run_abc",
            ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ")
        )));
        assert!(paths.logs_path.exists());

        let config = std::fs::read_to_string(paths.root.join("config.json")).expect("config");
        assert!(!config.contains("secret"));
        assert!(config.contains("postgres://u:***@h/db"));

        let report = GenerationReport::new("abc", "llama3", "postgres");
        write_report(&paths, &report).expect("write report");
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.report_path).expect("report"))
                .expect("parse report");
        assert_eq!(written["run_id"], "abc");

        std::fs::remove_dir_all(&run_dir).expect("cleanup");
    }
}
