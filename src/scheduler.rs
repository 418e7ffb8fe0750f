use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A named registry of deferred units of work. Each scheduled unit sleeps
/// until its fire time, runs, and deregisters itself; `cancel` aborts a unit
/// at its next suspension point.
pub struct Scheduler {
    name: String,
    tasks: Arc<Mutex<HashMap<String, RegisteredTask>>>,
    sequence: AtomicU64,
}

struct RegisteredTask {
    sequence: u64,
    handle: JoinHandle<()>,
}

/// Removes the owning task's registry entry when the task finishes or is
/// dropped, but only while the entry still belongs to that exact
/// registration. A cancel followed by a reschedule under the same id bumps
/// the sequence, so the stale guard leaves the new entry alone.
struct DeregisterGuard {
    scheduler_name: String,
    tasks: Arc<Mutex<HashMap<String, RegisteredTask>>>,
    task_id: String,
    sequence: u64,
}

impl Drop for DeregisterGuard {
    fn drop(&mut self) {
        let mut tasks = self.tasks.lock();
        if tasks.get(&self.task_id).map(|t| t.sequence) == Some(self.sequence) {
            debug!(
                "[{}] deregistering task with id={}",
                self.scheduler_name, self.task_id
            );
            tasks.remove(&self.task_id);
        }
    }
}

impl Scheduler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            sequence: AtomicU64::new(0),
        }
    }

    /// Registers `work` under `task_id`, to run once `run_at` is reached. A
    /// fire time in the past runs the work immediately.
    pub fn schedule<F>(&self, run_at: DateTime<Utc>, task_id: impl Into<String>, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task_id = task_id.into();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let delay = (run_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        // The task must not outrun its own registration, so it waits for the
        // insert below before doing anything.
        let (registered_tx, registered_rx) = oneshot::channel::<()>();

        let guard = DeregisterGuard {
            scheduler_name: self.name.clone(),
            tasks: Arc::clone(&self.tasks),
            task_id: task_id.clone(),
            sequence,
        };
        let scheduler_name = self.name.clone();
        let id_in_task = task_id.clone();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            let _ = registered_rx.await;

            if !delay.is_zero() {
                debug!(
                    "[{}] waiting {:?} before running task with id={}",
                    scheduler_name, delay, id_in_task
                );
                tokio::time::sleep(delay).await;
            }

            work.await;
            debug!(
                "[{}] finished task with id={}",
                scheduler_name, id_in_task
            );
        });

        let previous = self
            .tasks
            .lock()
            .insert(task_id.clone(), RegisteredTask { sequence, handle });
        if previous.is_some() {
            debug!(
                "[{}] replaced existing registration for task id={}",
                self.name, task_id
            );
        }
        let _ = registered_tx.send(());
        debug!("[{}] scheduled task with id={}", self.name, task_id);
    }

    /// Cancels and removes the unit registered under `task_id`. An unknown id
    /// is a no-op.
    pub fn cancel(&self, task_id: &str) {
        let removed = self.tasks.lock().remove(task_id);
        match removed {
            Some(task) => {
                task.handle.abort();
                info!("[{}] canceled task with id={}", self.name, task_id);
            }
            None => {
                warn!(
                    "[{}] failed to cancel task, no task found with id={}",
                    self.name, task_id
                );
            }
        }
    }

    /// Cancels every registered unit. Used on shutdown.
    pub fn cancel_all(&self) {
        info!("[{}] canceling all tasks", self.name);

        let drained: Vec<(String, RegisteredTask)> = self.tasks.lock().drain().collect();
        for (task_id, task) in drained {
            task.handle.abort();
            info!("[{}] canceled task with id={}", self.name, task_id);
        }
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks.lock().contains_key(task_id)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::Utc;

    use super::Scheduler;

    async fn settle() {
        // let spawned tasks run to completion
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn past_fire_time_runs_immediately_exactly_once() {
        let scheduler = Scheduler::new("test");
        let counter = Arc::new(AtomicUsize::new(0));

        let task_counter = Arc::clone(&counter);
        scheduler.schedule(Utc::now() - chrono::Duration::minutes(5), "past", async move {
            task_counter.fetch_add(1, Ordering::SeqCst);
        });

        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!scheduler.contains("past"));
    }

    #[tokio::test(start_paused = true)]
    async fn future_fire_time_waits_for_the_delay() {
        let scheduler = Scheduler::new("test");
        let counter = Arc::new(AtomicUsize::new(0));

        let task_counter = Arc::clone(&counter);
        scheduler.schedule(
            Utc::now() + chrono::Duration::seconds(30),
            "future",
            async move {
                task_counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        settle().await;
        assert!(scheduler.contains("future"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!scheduler.contains("future"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_unknown_id_is_a_noop() {
        let scheduler = Scheduler::new("test");
        scheduler.cancel("missing");
        assert_eq!(scheduler.task_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_a_pending_task() {
        let scheduler = Scheduler::new("test");
        let counter = Arc::new(AtomicUsize::new(0));

        let task_counter = Arc::clone(&counter);
        scheduler.schedule(
            Utc::now() + chrono::Duration::seconds(30),
            "doomed",
            async move {
                task_counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        settle().await;
        scheduler.cancel("doomed");
        settle().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(!scheduler.contains("doomed"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_then_reschedule_keeps_the_new_registration() {
        let scheduler = Scheduler::new("test");
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(
            Utc::now() + chrono::Duration::seconds(30),
            "shared-id",
            async move {},
        );
        settle().await;

        scheduler.cancel("shared-id");

        let task_counter = Arc::clone(&counter);
        scheduler.schedule(
            Utc::now() + chrono::Duration::seconds(30),
            "shared-id",
            async move {
                task_counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        settle().await;
        assert!(scheduler.contains("shared-id"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!scheduler.contains("shared-id"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_drains_the_registry() {
        let scheduler = Scheduler::new("test");
        for i in 0..3 {
            scheduler.schedule(
                Utc::now() + chrono::Duration::seconds(30),
                format!("task_{i}"),
                async move {},
            );
        }
        settle().await;
        assert_eq!(scheduler.task_count(), 3);

        scheduler.cancel_all();
        assert_eq!(scheduler.task_count(), 0);
    }
}
