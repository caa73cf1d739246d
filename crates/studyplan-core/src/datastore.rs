use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::task::{Task, TaskPatch};

const TASKS_FILE: &str = "tasks.data";

/// Task list kept as `tasks.data`, one JSON object per line, ordered by id.
/// Every write replaces the whole file through a temp file in the same
/// directory.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let tasks_path = data_dir.join(TASKS_FILE);
        debug!(tasks = %tasks_path.display(), "task store ready");

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            tasks_path,
        })
    }

    /// A missing file is an empty list.
    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        if !self.tasks_path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.tasks_path)
            .with_context(|| format!("failed to open {}", self.tasks_path.display()))?;

        let tasks = serde_json::Deserializer::from_reader(BufReader::new(file))
            .into_iter::<Task>()
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("corrupt task file {}", self.tasks_path.display()))?;
        debug!(count = tasks.len(), "loaded tasks");
        Ok(tasks)
    }

    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        {
            let mut out = BufWriter::new(temp.as_file_mut());
            for task in tasks {
                serde_json::to_writer(&mut out, task)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
        }
        temp.persist(&self.tasks_path)
            .with_context(|| format!("failed to replace {}", self.tasks_path.display()))?;
        Ok(())
    }

    pub fn next_id(&self, tasks: &[Task]) -> anyhow::Result<u64> {
        let max = tasks.iter().filter_map(|t| t.id).max().unwrap_or(0);
        max.checked_add(1)
            .ok_or_else(|| anyhow!("task id space exhausted (highest id is {max})"))
    }

    #[tracing::instrument(skip(self, tasks, task), fields(id = ?task.id))]
    pub fn add_task(&self, mut tasks: Vec<Task>, task: Task) -> anyhow::Result<Vec<Task>> {
        tasks.push(task);
        tasks.sort_by_key(|t| t.id.unwrap_or(u64::MAX));
        self.save_tasks(&tasks)?;
        Ok(tasks)
    }

    #[tracing::instrument(skip(self, now))]
    pub fn set_done(&self, id: u64, done: bool, now: DateTime<Utc>) -> anyhow::Result<Task> {
        self.edit(id, |task| {
            task.done = done;
            task.updated_at = now;
        })
    }

    /// Applies `patch` to task `id`; fields left as `None` are untouched.
    #[tracing::instrument(skip(self, patch, now))]
    pub fn update_task(
        &self,
        id: u64,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Task> {
        if patch.is_empty() {
            return Err(anyhow!("nothing to change on task {id}"));
        }
        self.edit(id, |task| patch.apply(task, now))
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_task(&self, id: u64) -> anyhow::Result<Task> {
        let mut tasks = self.load_tasks()?;
        let idx = tasks
            .iter()
            .position(|t| t.id == Some(id))
            .ok_or_else(|| anyhow!("no task with id {id}"))?;

        let removed = tasks.remove(idx);
        self.save_tasks(&tasks)?;
        info!(id, remaining = tasks.len(), "deleted task");
        Ok(removed)
    }

    fn edit<F>(&self, id: u64, change: F) -> anyhow::Result<Task>
    where
        F: FnOnce(&mut Task),
    {
        let mut tasks = self.load_tasks()?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == Some(id))
            .ok_or_else(|| anyhow!("no task with id {id}"))?;

        change(task);
        let updated = task.clone();
        self.save_tasks(&tasks)?;
        info!(id, done = updated.done, "updated task");
        Ok(updated)
    }
}
