//! Per-conversation work queues.
//!
//! Each conversation key gets one worker task fed by its own channel, so
//! jobs for the same conversation run one after another in submission
//! order while different conversations run in parallel. Submitting never
//! waits: a worker blocked on a rate-limit sleep only holds up its own
//! conversation, and its backlog grows instead of stalling the caller.
//!
//! A worker with nothing queued for longer than the idle timeout is
//! retired on a later submission and restarted on demand.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{sync::mpsc, task::JoinSet, time::Instant};

/// Unit of work submitted to a queue.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// How long a conversation worker may sit idle before it is retired.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

struct Lane {
    tx: mpsc::UnboundedSender<Job>,
    /// Jobs submitted but not yet finished.
    pending: Arc<AtomicUsize>,
    last_push: Instant,
}

impl Lane {
    fn is_idle(&self, now: Instant, idle: Duration) -> bool {
        self.pending.load(Ordering::Acquire) == 0 && now.duration_since(self.last_push) >= idle
    }
}

/// Worker pool keyed by conversation.
pub struct ConversationQueues {
    lanes: HashMap<String, Lane>,
    workers: JoinSet<()>,
    /// Backlog per conversation above which submissions are logged.
    capacity: usize,
    idle: Duration,
}

impl ConversationQueues {
    /// Queues that warn once a conversation has more than `capacity`
    /// unfinished jobs.
    pub fn new(capacity: usize) -> Self {
        Self {
            lanes: HashMap::new(),
            workers: JoinSet::new(),
            capacity: capacity.max(1),
            idle: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Retire workers after `idle` without work instead of the default.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Number of conversations with a live worker.
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    /// Whether no worker is live.
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Whether `key` currently has a worker.
    pub fn is_active(&self, key: &str) -> bool {
        self.lanes.contains_key(key)
    }

    /// Unfinished jobs for `key`.
    pub fn backlog(&self, key: &str) -> usize {
        self.lanes.get(key).map_or(0, |lane| lane.pending.load(Ordering::Acquire))
    }

    /// Queue `job` behind earlier jobs for `key`. Never waits.
    pub fn push(&mut self, key: &str, job: Job) {
        let now = Instant::now();
        self.reap();
        self.retire_idle(now);

        let mut job = job;
        loop {
            let mut lane = match self.lanes.remove(key) {
                Some(lane) => lane,
                None => self.spawn_worker(key, now),
            };
            let backlog = lane.pending.fetch_add(1, Ordering::AcqRel) + 1;
            match lane.tx.send(job) {
                Ok(()) => {
                    if backlog == self.capacity + 1 {
                        tracing::warn!(key, backlog, "conversation backlog over capacity");
                    }
                    lane.last_push = now;
                    self.lanes.insert(key.to_string(), lane);
                    return;
                },
                Err(mpsc::error::SendError(returned)) => {
                    // Worker died (a job panicked); start a fresh one.
                    tracing::warn!(key, "conversation worker gone, restarting");
                    job = returned;
                },
            }
        }
    }

    fn spawn_worker(&mut self, key: &str, now: Instant) -> Lane {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let pending = Arc::new(AtomicUsize::new(0));
        let done = Arc::clone(&pending);
        self.workers.spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
                done.fetch_sub(1, Ordering::AcqRel);
            }
        });
        tracing::debug!(key, workers = self.lanes.len() + 1, "conversation worker started");
        Lane { tx, pending, last_push: now }
    }

    /// Drop the sender of every idle lane. Its worker sees the channel
    /// close once the queue is empty and exits.
    fn retire_idle(&mut self, now: Instant) {
        let idle = self.idle;
        self.lanes.retain(|key, lane| {
            let retire = lane.is_idle(now, idle);
            if retire {
                tracing::debug!(key, "conversation worker retired");
            }
            !retire
        });
    }

    /// Collect workers that already exited.
    fn reap(&mut self) {
        while let Some(result) = self.workers.try_join_next() {
            if let Err(err) = result
                && err.is_panic()
            {
                tracing::error!("conversation worker panicked");
            }
        }
    }

    /// Stop accepting work and wait for queued jobs until `deadline` fires.
    ///
    /// Returns `true` when every worker finished in time. Safe to call
    /// again with a new deadline after a timeout.
    pub async fn close(&mut self, deadline: impl Future<Output = ()>) -> bool {
        self.lanes.clear();

        let drain = async {
            while self.workers.join_next().await.is_some() {}
        };
        tokio::select! {
            () = drain => true,
            () = deadline => false,
        }
    }

    /// Abort every remaining worker. Returns how many were still running.
    pub fn abort(&mut self) -> usize {
        let remaining = self.workers.len();
        self.lanes.clear();
        self.workers.abort_all();
        remaining
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_types, reason = "Collecting job order in tests")]

    use std::sync::Mutex;

    use super::*;

    fn record(log: &Arc<Mutex<Vec<String>>>, entry: String, delay_ms: u64) -> Job {
        let log = Arc::clone(log);
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            log.lock().unwrap().push(entry);
        })
    }

    async fn logged(log: &Arc<Mutex<Vec<String>>>, entry: &str) -> bool {
        for _ in 0..500 {
            if log.lock().unwrap().iter().any(|seen| seen == entry) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn jobs_for_one_key_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queues = ConversationQueues::new(8);

        for (i, delay) in [30, 5, 15, 0].into_iter().enumerate() {
            queues.push("alice", record(&log, format!("a{i}"), delay));
        }
        assert!(queues.close(tokio::time::sleep(Duration::from_secs(5))).await);

        assert_eq!(*log.lock().unwrap(), vec!["a0", "a1", "a2", "a3"]);
    }

    #[tokio::test]
    async fn keys_run_in_parallel() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queues = ConversationQueues::new(8);

        queues.push("slow", record(&log, "slow".into(), 100));
        queues.push("fast", record(&log, "fast".into(), 0));
        assert_eq!(queues.len(), 2);
        assert!(queues.close(tokio::time::sleep(Duration::from_secs(5))).await);

        assert_eq!(*log.lock().unwrap(), vec!["fast", "slow"]);
    }

    #[tokio::test]
    async fn full_backlog_does_not_hold_up_other_keys() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queues = ConversationQueues::new(1);

        for _ in 0..4 {
            queues.push("stuck", Box::pin(std::future::pending()));
        }
        queues.push("free", record(&log, "free".into(), 0));

        assert!(logged(&log, "free").await);
        assert_eq!(queues.backlog("stuck"), 4);
        assert_eq!(queues.backlog("free"), 0);
        assert_eq!(queues.abort(), 2);
    }

    #[tokio::test]
    async fn idle_workers_are_retired_and_restarted() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queues = ConversationQueues::new(8).with_idle_timeout(Duration::from_millis(20));

        queues.push("alice", record(&log, "a0".into(), 0));
        assert!(logged(&log, "a0").await);
        tokio::time::sleep(Duration::from_millis(30)).await;

        queues.push("bob", record(&log, "b0".into(), 0));
        assert!(!queues.is_active("alice"));
        assert!(queues.is_active("bob"));
        assert_eq!(queues.len(), 1);

        // A retired key comes back with a fresh worker.
        queues.push("alice", record(&log, "a1".into(), 0));
        assert!(queues.is_active("alice"));
        assert!(queues.close(tokio::time::sleep(Duration::from_secs(5))).await);
        assert_eq!(log.lock().unwrap().iter().filter(|entry| entry.starts_with('a')).count(), 2);
    }

    #[tokio::test]
    async fn busy_workers_are_not_retired() {
        let mut queues = ConversationQueues::new(8).with_idle_timeout(Duration::ZERO);

        queues.push("stuck", Box::pin(std::future::pending()));
        queues.push("other", Box::pin(async {}));

        assert!(queues.is_active("stuck"));
        assert_eq!(queues.abort(), 2);
    }

    #[tokio::test]
    async fn close_times_out_and_abort_stops_workers() {
        let mut queues = ConversationQueues::new(1);
        queues.push("stuck", Box::pin(std::future::pending()));

        assert!(!queues.close(tokio::time::sleep(Duration::from_millis(20))).await);
        assert_eq!(queues.abort(), 1);
        assert!(queues.is_empty());
    }
}
