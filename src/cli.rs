//! Command-line interface.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use reqwest::StatusCode;

use rorch::node::Node;
use rorch::scheduler::SchedulerKind;
use rorch::store::StoreKind;
use rorch::tasks::{ErrResponse, Task, TaskEvent};

#[derive(Debug, Parser)]
#[command(name = "rorch", version, about = "A small container orchestrator.", long_about = None)]
pub struct CliArgs {
    /// TOML file with `[manager]` and `[worker]` settings.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a worker node.
    Worker {
        #[arg(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        #[arg(short, long, default_value_t = 5556)]
        port: u16,
        /// Worker name; defaults to `worker-<random uuid>`.
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long, value_enum, default_value_t = StoreKind::Memory)]
        dbtype: StoreKind,
    },

    /// Run the manager.
    Manager {
        #[arg(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        #[arg(short, long, default_value_t = 5555)]
        port: u16,
        /// Comma separated `host:port` worker addresses.
        #[arg(short, long, value_delimiter = ',', default_value = "localhost:5556")]
        workers: Vec<String>,
        #[arg(short, long, value_enum, default_value_t = SchedulerKind::Epvm)]
        scheduler: SchedulerKind,
        #[arg(short, long, value_enum, default_value_t = StoreKind::Memory)]
        dbtype: StoreKind,
    },

    /// Submit a task event read from a JSON file.
    Run {
        #[arg(short, long, default_value = "localhost:5555")]
        manager: String,
        #[arg(short, long, default_value = "task.json")]
        filename: PathBuf,
    },

    /// Ask the manager to stop a task.
    Stop {
        #[arg(short, long, default_value = "localhost:5555")]
        manager: String,
        task_id: String,
    },

    /// List the manager's tasks.
    Status {
        #[arg(short, long, default_value = "localhost:5555")]
        manager: String,
    },

    /// List the manager's view of its workers.
    Node {
        #[arg(short, long, default_value = "localhost:5555")]
        manager: String,
    },
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}

fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("building HTTP client")
}

async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    match resp.json::<ErrResponse>().await {
        Ok(err) => err.message,
        Err(_) => format!("unexpected status {status}"),
    }
}

pub async fn run(manager: &str, filename: &Path) -> anyhow::Result<()> {
    let body = std::fs::read_to_string(filename)
        .with_context(|| format!("reading {}", filename.display()))?;
    let event: TaskEvent = serde_json::from_str(&body)
        .with_context(|| format!("parsing task event from {}", filename.display()))?;

    let resp = http_client()?
        .post(format!("http://{manager}/tasks"))
        .json(&event)
        .send()
        .await
        .with_context(|| format!("connecting to manager at {manager}"))?;

    if resp.status() != StatusCode::CREATED {
        bail!("manager refused task: {}", error_message(resp).await);
    }
    let task: Task = resp.json().await.context("decoding manager response")?;
    println!("Successfully sent task request to manager");
    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}

pub async fn stop(manager: &str, task_id: &str) -> anyhow::Result<()> {
    let resp = http_client()?
        .delete(format!("http://{manager}/tasks/{task_id}"))
        .send()
        .await
        .with_context(|| format!("connecting to manager at {manager}"))?;

    if resp.status() != StatusCode::NO_CONTENT {
        bail!("error stopping task {task_id}: {}", error_message(resp).await);
    }
    println!("Task {task_id} has been stopped.");
    Ok(())
}

pub async fn status(manager: &str) -> anyhow::Result<()> {
    let tasks: Vec<Task> = fetch(manager, "tasks").await?;
    print!("{}", status_table(&tasks, Utc::now()));
    Ok(())
}

pub async fn nodes(manager: &str) -> anyhow::Result<()> {
    let nodes: Vec<Node> = fetch(manager, "nodes").await?;
    print!("{}", node_table(&nodes));
    Ok(())
}

async fn fetch<T: serde::de::DeserializeOwned>(manager: &str, path: &str) -> anyhow::Result<T> {
    let resp = http_client()?
        .get(format!("http://{manager}/{path}"))
        .send()
        .await
        .with_context(|| format!("connecting to manager at {manager}"))?;
    if !resp.status().is_success() {
        bail!("manager error: {}", error_message(resp).await);
    }
    resp.json().await.context("decoding manager response")
}

/// Coarse "5m ago" style rendering.
fn age(since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(since) = since else {
        return "-".to_string();
    };
    let secs = (now - since).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}

fn status_table(tasks: &[Task], now: DateTime<Utc>) -> String {
    let mut out = format!(
        "{:<38} {:<16} {:<10} {:<10} {:<16} {}\n",
        "ID", "NAME", "CREATED", "STATE", "CONTAINERNAME", "IMAGE"
    );
    for task in tasks {
        out.push_str(&format!(
            "{:<38} {:<16} {:<10} {:<10} {:<16} {}\n",
            task.id.to_string(),
            task.name,
            age(task.start_time, now),
            task.state.to_string(),
            task.name,
            task.image
        ));
    }
    out
}

const GIB: u64 = 1024 * 1024 * 1024;

fn node_table(nodes: &[Node]) -> String {
    let mut out = format!(
        "{:<24} {:>12} {:>10} {:>15} {:>8} {:>6}\n",
        "NAME", "MEMORY (MiB)", "DISK (GiB)", "DISK USED (GiB)", "ROLE", "TASKS"
    );
    for node in nodes {
        out.push_str(&format!(
            "{:<24} {:>12} {:>10} {:>15} {:>8} {:>6}\n",
            node.name,
            node.memory / 1024,
            node.disk / GIB,
            node.stats.disk_used() / GIB,
            node.role,
            node.task_count
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn age_buckets() {
        let now = Utc::now();
        assert_eq!(age(None, now), "-");
        assert_eq!(age(Some(now - TimeDelta::seconds(5)), now), "5s ago");
        assert_eq!(age(Some(now - TimeDelta::minutes(12)), now), "12m ago");
        assert_eq!(age(Some(now - TimeDelta::hours(3)), now), "3h ago");
        assert_eq!(age(Some(now - TimeDelta::days(2)), now), "2d ago");
    }

    #[test]
    fn status_table_lists_every_task() {
        let tasks = vec![Task::new("web", "nginx:latest"), Task::new("db", "postgres:16")];
        let table = status_table(&tasks, Utc::now());
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].contains("nginx:latest") && lines[1].contains("Pending"));
        assert!(lines[2].contains(&tasks[1].id.to_string()));
    }

    #[test]
    fn node_table_shows_disk_in_use() {
        let mut node = Node::new("w1:5556", "http://w1:5556", "worker");
        node.apply_stats(rorch::worker::Stats {
            mem_total_kb: 4 * 1024 * 1024,
            disk_total: 100 * GIB,
            disk_free: 60 * GIB,
            ..Default::default()
        });
        node.task_count = 2;

        let table = node_table(&[node]);
        let row: Vec<&str> = table.lines().nth(1).unwrap().split_whitespace().collect();
        assert_eq!(row, ["w1:5556", "4096", "100", "40", "worker", "2"]);
    }

    #[test]
    fn manager_workers_split_on_commas() {
        let args = CliArgs::try_parse_from([
            "rorch", "manager", "--workers", "a:1,b:2", "--scheduler", "roundrobin",
        ])
        .unwrap();
        match args.command {
            Command::Manager { workers, scheduler, .. } => {
                assert_eq!(workers, ["a:1", "b:2"]);
                assert_eq!(scheduler, SchedulerKind::Roundrobin);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
