//! Per-session snapshots carried alongside the segment plan: todos, notes and
//! the end-of-session review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TodoStatus {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub text: String,
    pub status: TodoStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    /// Todo this note belongs to; `None` for general notes.
    #[serde(default)]
    pub task_id: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(default)]
    pub todos: Vec<Todo>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl UserData {
    /// Adds a todo unless `text` is blank. Returns the new todo's id.
    pub fn add_todo(&mut self, text: &str, now: DateTime<Utc>) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let id = Uuid::new_v4().to_string();
        self.todos.push(Todo {
            id: id.clone(),
            text: text.to_string(),
            status: TodoStatus::NotStarted,
            created_at: now,
        });
        Some(id)
    }

    pub fn set_todo_status(&mut self, id: &str, status: TodoStatus) -> bool {
        match self.todos.iter_mut().find(|todo| todo.id == id) {
            Some(todo) => {
                todo.status = status;
                true
            }
            None => false,
        }
    }

    pub fn remove_todo(&mut self, id: &str) -> bool {
        let before = self.todos.len();
        self.todos.retain(|todo| todo.id != id);
        self.todos.len() != before
    }

    pub fn add_note(
        &mut self,
        text: &str,
        task_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let id = Uuid::new_v4().to_string();
        self.notes.push(Note {
            id: id.clone(),
            task_id,
            text: text.to_string(),
            created_at: now,
        });
        Some(id)
    }

    /// Replaces a note's text. Blank text leaves the note untouched.
    pub fn update_note(&mut self, id: &str, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        match self.notes.iter_mut().find(|note| note.id == id) {
            Some(note) => {
                note.text = text.to_string();
                true
            }
            None => false,
        }
    }

    pub fn remove_note(&mut self, id: &str) -> bool {
        let before = self.notes.len();
        self.notes.retain(|note| note.id != id);
        self.notes.len() != before
    }

    /// Drops every note attached to `task_id`, or every general note when
    /// `task_id` is `None`. Returns how many were removed.
    pub fn remove_notes_for(&mut self, task_id: Option<&str>) -> usize {
        let before = self.notes.len();
        self.notes.retain(|note| note.task_id.as_deref() != task_id);
        before - self.notes.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFeedback {
    #[serde(default)]
    pub mood: Option<u8>,
    #[serde(default)]
    pub focus: Option<u8>,
    /// Comma separated distraction labels.
    #[serde(default)]
    pub distractions: String,
}

impl SessionFeedback {
    /// Ratings outside 1..=5 are dropped.
    pub fn rate(&mut self, mood: Option<u8>, focus: Option<u8>) {
        self.mood = mood.filter(|value| (1..=5).contains(value));
        self.focus = focus.filter(|value| (1..=5).contains(value));
    }

    /// Adds `label` to the distraction list, or removes it if already present
    /// (case-insensitive).
    pub fn toggle_distraction(&mut self, label: &str) {
        let wanted = label.trim().to_lowercase();
        if wanted.is_empty() {
            return;
        }

        let mut labels: Vec<String> = self
            .distractions
            .split(',')
            .map(|part| part.trim().to_lowercase())
            .filter(|part| !part.is_empty())
            .collect();

        if labels.contains(&wanted) {
            labels.retain(|part| part != &wanted);
        } else {
            labels.push(label.trim().to_string());
        }
        self.distractions = labels.join(", ");
    }
}
