/*
 * SPDX-FileCopyrightText: Copyright (c) 2021-2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

//! Registry for long-running Redfish operations and the fixed-tick scheduler
//! that advances them.
//!
//! Progress only moves forward; a task leaves `Running` exactly once and its
//! terminal state never changes afterwards. Terminal tasks stay queryable for
//! an hour so pollers holding a monitor URL get an answer, then the tick
//! retires them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

pub const TASK_TICK: Duration = Duration::from_secs(1);
pub const TASK_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCategory {
    FirmwareUpdate,
    RaidConfig,
    VolumeProvision,
    Generic,
}

impl TaskCategory {
    /// Progress applied per scheduler tick, in percent.
    pub fn percent_per_tick(self) -> u8 {
        match self {
            TaskCategory::FirmwareUpdate => 10,
            TaskCategory::RaidConfig => 8,
            TaskCategory::VolumeProvision => 12,
            TaskCategory::Generic => 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Completed,
    Exception,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::Running)
    }

    pub fn redfish_name(self) -> &'static str {
        match self {
            TaskState::Running => "Running",
            TaskState::Completed => "Completed",
            TaskState::Exception => "Exception",
            TaskState::Cancelled => "Cancelled",
        }
    }

    pub fn redfish_status(self) -> &'static str {
        match self {
            TaskState::Running | TaskState::Completed => "OK",
            TaskState::Exception => "Critical",
            TaskState::Cancelled => "Warning",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub category: TaskCategory,
    pub state: TaskState,
    pub percent_complete: u8,
    pub started: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
    pub messages: Vec<String>,
}

#[derive(Debug)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, Task>>,
    retention: chrono::Duration,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::with_retention(TASK_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            retention: chrono::Duration::from_std(retention)
                .unwrap_or_else(|_| chrono::Duration::hours(1)),
        }
    }

    pub fn create(&self, category: TaskCategory, name: impl Into<String>) -> Task {
        let task = Task {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            category,
            state: TaskState::Running,
            percent_complete: 0,
            started: Utc::now(),
            ended: None,
            messages: Vec::new(),
        };
        info!(task = %task.id, name = %task.name, ?category, "task started");
        let mut tasks = self.tasks.lock().unwrap();
        tasks.insert(task.id.clone(), task.clone());
        task
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.lock().unwrap().get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tasks.lock().unwrap().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Cancel a running task. Terminal tasks are immutable, so cancelling one
    /// reports failure instead of rewriting history.
    pub fn cancel(&self, id: &str) -> bool {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(id) {
            Some(task) if task.state == TaskState::Running => {
                task.state = TaskState::Cancelled;
                task.ended = Some(Utc::now());
                task.messages.push(format!("{} cancelled by request", task.name));
                info!(task = %id, "task cancelled");
                true
            }
            _ => false,
        }
    }

    /// One scheduler tick: advance running tasks by their category rate and
    /// retire terminal tasks past the retention window.
    pub fn tick(&self) {
        let now = Utc::now();
        let mut tasks = self.tasks.lock().unwrap();
        for task in tasks.values_mut() {
            if task.state != TaskState::Running {
                continue;
            }
            task.percent_complete = task
                .percent_complete
                .saturating_add(task.category.percent_per_tick())
                .min(100);
            if task.percent_complete == 100 {
                task.state = TaskState::Completed;
                task.ended = Some(now);
                task.messages.push(format!("{} completed successfully", task.name));
                info!(task = %task.id, name = %task.name, "task completed");
            }
        }
        tasks.retain(|id, task| match task.ended {
            Some(ended) if task.state.is_terminal() => {
                let keep = now.signed_duration_since(ended) <= self.retention;
                if !keep {
                    debug!(task = %id, "retiring expired task");
                }
                keep
            }
            _ => true,
        });
    }
}

/// Background loop driving [`TaskRegistry::tick`] once per second.
pub fn spawn_scheduler(registry: Arc<TaskRegistry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TASK_TICK);
        loop {
            interval.tick().await;
            registry.tick();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_monotonic_and_completes() {
        let registry = TaskRegistry::new();
        let task = registry.create(TaskCategory::FirmwareUpdate, "firmware update");

        let mut last = 0;
        for _ in 0..12 {
            registry.tick();
            let task = registry.get(&task.id).unwrap();
            assert!(task.percent_complete >= last);
            last = task.percent_complete;
        }
        let task = registry.get(&task.id).unwrap();
        assert_eq!(task.percent_complete, 100);
        assert_eq!(task.state, TaskState::Completed);
        assert!(task.ended.is_some());
        assert!(!task.messages.is_empty());
    }

    #[test]
    fn category_rates_differ() {
        let registry = TaskRegistry::new();
        let raid = registry.create(TaskCategory::RaidConfig, "raid rebuild");
        let volume = registry.create(TaskCategory::VolumeProvision, "volume create");
        registry.tick();
        assert_eq!(registry.get(&raid.id).unwrap().percent_complete, 8);
        assert_eq!(registry.get(&volume.id).unwrap().percent_complete, 12);
    }

    #[test]
    fn terminal_tasks_are_immutable() {
        let registry = TaskRegistry::new();
        let task = registry.create(TaskCategory::Generic, "noop");
        for _ in 0..10 {
            registry.tick();
        }
        let completed = registry.get(&task.id).unwrap();
        assert_eq!(completed.state, TaskState::Completed);
        let ended = completed.ended;

        assert!(!registry.cancel(&task.id));
        let after = registry.get(&task.id).unwrap();
        assert_eq!(after.state, TaskState::Completed);
        assert_eq!(after.ended, ended);
        assert_eq!(after.percent_complete, 100);
    }

    #[test]
    fn cancelling_a_running_task_ends_it() {
        let registry = TaskRegistry::new();
        let task = registry.create(TaskCategory::Generic, "noop");
        assert!(registry.cancel(&task.id));
        let task = registry.get(&task.id).unwrap();
        assert_eq!(task.state, TaskState::Cancelled);
        assert!(task.ended.is_some());
    }

    #[test]
    fn expired_terminal_tasks_are_retired() {
        let registry = TaskRegistry::with_retention(Duration::ZERO);
        let task = registry.create(TaskCategory::Generic, "noop");
        for _ in 0..7 {
            registry.tick();
        }
        // completed on an earlier tick, retention zero drops it on the next
        registry.tick();
        assert!(registry.get(&task.id).is_none());
        assert!(registry.ids().is_empty());
    }
}
