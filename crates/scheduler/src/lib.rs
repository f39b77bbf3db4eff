//! Cron/one-shot job scheduler with a single fire callback (spec §4.C).
//!
//! Each enabled task's `next_run_at` is recomputed from the scheduler's
//! configured timezone on every fire. A background tick loop (driven by
//! [`Scheduler::spawn`]) polls for due tasks every `poll_interval_ms` and
//! invokes the registered [`TaskFireHandler`].

pub mod cron;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use sa_domain::config::SchedulerConfig;
use sa_domain::error::{Error, Result};
use sa_domain::schedule::{CreateTaskRequest, ScheduledTask};
use sa_domain::trace::TraceEvent;

use cron::{cron_next_tz, parse_tz};

/// Invoked with a snapshot of the task that just fired.
#[async_trait::async_trait]
pub trait TaskFireHandler: Send + Sync {
    async fn on_fire(&self, task: ScheduledTask);
}

pub struct Scheduler {
    config: SchedulerConfig,
    persist_path: PathBuf,
    tasks: RwLock<HashMap<String, ScheduledTask>>,
    handler: RwLock<Option<Arc<dyn TaskFireHandler>>>,
    stopped: Arc<AtomicBool>,
    tick_handle: RwLock<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, state_dir: &std::path::Path) -> Result<Arc<Self>> {
        std::fs::create_dir_all(state_dir).map_err(Error::Io)?;
        let persist_path = state_dir.join("scheduled_tasks.json");

        let tasks = if persist_path.exists() {
            let raw = std::fs::read_to_string(&persist_path).map_err(Error::Io)?;
            let list: Vec<ScheduledTask> = serde_json::from_str(&raw).unwrap_or_default();
            list.into_iter().map(|t| (t.id.clone(), t)).collect()
        } else {
            HashMap::new()
        };

        Ok(Arc::new(Self {
            config,
            persist_path,
            tasks: RwLock::new(tasks),
            handler: RwLock::new(None),
            stopped: Arc::new(AtomicBool::new(false)),
            tick_handle: RwLock::new(None),
        }))
    }

    fn persist(&self) {
        let tasks: Vec<ScheduledTask> = self.tasks.read().values().cloned().collect();
        if let Ok(json) = serde_json::to_string_pretty(&tasks) {
            if let Err(e) = std::fs::write(&self.persist_path, json) {
                tracing::warn!(error = %e, "failed to persist scheduled tasks");
            }
        }
    }

    pub fn set_on_task_fire(&self, handler: Arc<dyn TaskFireHandler>) {
        *self.handler.write() = Some(handler);
    }

    pub fn create(&self, req: CreateTaskRequest) -> ScheduledTask {
        let now = Utc::now();
        let next_run_at = if req.enabled {
            cron_next_tz(&req.cron, &now, parse_tz(&self.config.timezone))
        } else {
            None
        };

        let task = ScheduledTask {
            id: uuid::Uuid::new_v4().to_string(),
            name: req.name,
            cron: req.cron,
            action: req.action,
            enabled: req.enabled,
            one_shot: req.one_shot,
            last_run_at: None,
            next_run_at,
            created_at: now,
        };

        self.tasks.write().insert(task.id.clone(), task.clone());
        self.persist();
        task
    }

    /// Refreshes `next_run_at` from the live cron evaluation before returning.
    pub fn list(&self) -> Vec<ScheduledTask> {
        let mut tasks = self.tasks.write();
        let now = Utc::now();
        for task in tasks.values_mut() {
            if task.enabled {
                task.next_run_at = cron_next_tz(&task.cron, &now, parse_tz(&self.config.timezone));
            }
        }
        let snapshot: Vec<ScheduledTask> = tasks.values().cloned().collect();
        drop(tasks);
        self.persist();
        snapshot
    }

    pub fn get(&self, id: &str) -> Option<ScheduledTask> {
        self.tasks.read().get(id).cloned()
    }

    pub fn delete(&self, id: &str) -> bool {
        let removed = self.tasks.write().remove(id).is_some();
        if removed {
            self.persist();
        }
        removed
    }

    /// Cancels the tick loop without deleting any tasks.
    pub fn stop_all(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.tick_handle.write().take() {
            handle.abort();
        }
    }

    /// Starts the background poll loop. Idempotent — a second call replaces
    /// the previous loop.
    pub fn spawn(self: &Arc<Self>) {
        self.stopped.store(false, Ordering::SeqCst);
        let scheduler = Arc::clone(self);
        let interval_ms = self.config.poll_interval_ms;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                ticker.tick().await;
                if scheduler.stopped.load(Ordering::SeqCst) {
                    break;
                }
                scheduler.tick().await;
            }
        });
        *self.tick_handle.write() = Some(handle);
    }

    async fn tick(&self) {
        let now = Utc::now();
        let due: Vec<ScheduledTask> = {
            let tasks = self.tasks.read();
            tasks
                .values()
                .filter(|t| t.enabled && t.next_run_at.is_some_and(|next| next <= now))
                .cloned()
                .collect()
        };

        for mut task in due {
            let Some(handler) = self.handler.read().clone() else {
                continue;
            };

            task.last_run_at = Some(now);
            task.next_run_at = cron_next_tz(&task.cron, &now, parse_tz(&self.config.timezone));

            TraceEvent::ScheduleFired {
                task_id: task.id.clone(),
                one_shot: task.one_shot,
            }
            .emit();

            handler.on_fire(task.clone()).await;

            if task.one_shot {
                self.tasks.write().remove(&task.id);
            } else {
                self.tasks.write().insert(task.id.clone(), task);
            }
            self.persist();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct CountingHandler {
        count: AtomicUsize,
        notify: Notify,
    }

    #[async_trait::async_trait]
    impl TaskFireHandler for CountingHandler {
        async fn on_fire(&self, _task: ScheduledTask) {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
        }
    }

    fn tmp_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("sa-scheduler-test-{}", uuid::Uuid::new_v4()));
        dir
    }

    #[test]
    fn create_sets_next_run_at_in_future() {
        let scheduler = Scheduler::new(SchedulerConfig::default(), &tmp_dir()).unwrap();
        let task = scheduler.create(CreateTaskRequest {
            name: "daily".into(),
            cron: "0 9 * * *".into(),
            action: "noop".into(),
            enabled: true,
            one_shot: false,
        });
        assert!(task.next_run_at.unwrap() > Utc::now());
        assert_eq!(scheduler.list().len(), 1);
    }

    #[test]
    fn delete_removes_task() {
        let scheduler = Scheduler::new(SchedulerConfig::default(), &tmp_dir()).unwrap();
        let task = scheduler.create(CreateTaskRequest {
            name: "once".into(),
            cron: "0 0 * * *".into(),
            action: "noop".into(),
            enabled: true,
            one_shot: true,
        });
        assert!(scheduler.delete(&task.id));
        assert!(scheduler.get(&task.id).is_none());
    }

    #[test]
    fn disabled_task_has_no_next_run_at() {
        let scheduler = Scheduler::new(SchedulerConfig::default(), &tmp_dir()).unwrap();
        let task = scheduler.create(CreateTaskRequest {
            name: "off".into(),
            cron: "0 0 * * *".into(),
            action: "noop".into(),
            enabled: false,
            one_shot: false,
        });
        assert!(task.next_run_at.is_none());
    }

    #[tokio::test]
    async fn tick_fires_due_task_and_removes_one_shot() {
        let scheduler = Scheduler::new(SchedulerConfig::default(), &tmp_dir()).unwrap();
        let task = scheduler.create(CreateTaskRequest {
            name: "once".into(),
            cron: "* * * * *".into(),
            action: "noop".into(),
            enabled: true,
            one_shot: true,
        });

        // Force it due right now.
        scheduler.tasks.write().get_mut(&task.id).unwrap().next_run_at = Some(Utc::now());

        let handler = Arc::new(CountingHandler {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        scheduler.set_on_task_fire(handler.clone());

        scheduler.tick().await;

        assert_eq!(handler.count.load(Ordering::SeqCst), 1);
        assert!(scheduler.get(&task.id).is_none());
    }

    #[tokio::test]
    async fn tick_keeps_recurring_task_after_fire() {
        let scheduler = Scheduler::new(SchedulerConfig::default(), &tmp_dir()).unwrap();
        let task = scheduler.create(CreateTaskRequest {
            name: "recurring".into(),
            cron: "* * * * *".into(),
            action: "noop".into(),
            enabled: true,
            one_shot: false,
        });
        scheduler.tasks.write().get_mut(&task.id).unwrap().next_run_at = Some(Utc::now());

        let handler = Arc::new(CountingHandler {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        scheduler.set_on_task_fire(handler.clone());
        scheduler.tick().await;

        let reloaded = scheduler.get(&task.id).expect("recurring task stays");
        assert!(reloaded.last_run_at.is_some());
        assert!(reloaded.next_run_at.is_some());
    }
}
