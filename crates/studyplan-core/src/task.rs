use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::DueDate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub uuid: Uuid,

    #[serde(default)]
    pub id: Option<u64>,

    pub title: String,

    #[serde(default)]
    pub course: Option<String>,

    /// Raw due value as entered; readers must tolerate malformed text.
    #[serde(default)]
    pub due: Option<String>,

    #[serde(default)]
    pub done: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Task {
    pub fn new(title: String, now: DateTime<Utc>, id: u64) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id: Some(id),
            title,
            course: None,
            due: None,
            done: false,
            created_at: now,
            updated_at: now,
            extra: BTreeMap::new(),
        }
    }
}

impl DueDate for Task {
    fn due_raw(&self) -> Option<&str> {
        self.due.as_deref()
    }
}

/// Partial edit of a task. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub course: Option<Option<String>>,
    pub due: Option<Option<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.course.is_none() && self.due.is_none()
    }

    pub fn apply(self, task: &mut Task, now: DateTime<Utc>) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(course) = self.course {
            task.course = course;
        }
        if let Some(due) = self.due {
            task.due = due;
        }
        task.updated_at = now;
    }
}
