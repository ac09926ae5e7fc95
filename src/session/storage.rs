use crate::{
    error::EmbernetError,
    session::{driver::SessionDriver, Session},
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// One queued driver operation.
pub enum SessionJob {
    /// Populate the session's data from the record.
    Load,
    /// Persist the session's data.
    Save,
    /// Remove the persistent record.
    Destroy,
    /// Copy the record out of another driver into this session's driver.
    Migrate(Arc<dyn SessionDriver>),
}

struct JobQueue {
    busy: bool,
    jobs: VecDeque<SessionJob>,
}

/// Serializes driver access for one session.
///
/// At most one driver call per session is in flight at any moment. A
/// `perform` that arrives while a job is running (including re-entrant
/// calls made by the running job) enqueues and returns; the running call
/// drains the queue in FIFO order before clearing the busy flag. A `Save`
/// enqueued after a `Destroy` is honored in order: the driver re-creates
/// the record.
pub struct SessionStorage {
    driver: Arc<dyn SessionDriver>,
    queue: Mutex<JobQueue>,
    last_error: Mutex<Option<EmbernetError>>,
}

impl SessionStorage {
    pub(crate) fn new(driver: Arc<dyn SessionDriver>) -> Self {
        Self {
            driver,
            queue: Mutex::new(JobQueue {
                busy: false,
                jobs: VecDeque::new(),
            }),
            last_error: Mutex::new(None),
        }
    }

    /// The driver behind this queue.
    pub fn driver(&self) -> &Arc<dyn SessionDriver> {
        &self.driver
    }

    /// Read-through existence check; does not go through the queue.
    pub async fn exists(&self, id: &str) -> bool {
        self.driver.exists(id).await.unwrap_or(false)
    }

    /// Runs or enqueues a job for this session.
    ///
    /// No-op while the session has not been started (no id). When the queue
    /// is idle the job runs immediately and the caller drains any jobs that
    /// arrive meanwhile; when busy, the job is queued for the draining
    /// caller and this call returns at once.
    pub async fn perform(&self, session: &Session, job: SessionJob) {
        if session.id().is_none() {
            return;
        }
        {
            let mut queue = self.queue.lock();
            if queue.busy {
                queue.jobs.push_back(job);
                return;
            }
            queue.busy = true;
        }

        let mut current = Some(job);
        while let Some(job) = current.take() {
            if let Some(id) = session.id() {
                self.run_job(session, &id, job).await;
            }
            let mut queue = self.queue.lock();
            current = queue.jobs.pop_front();
            if current.is_none() {
                queue.busy = false;
            }
        }
    }

    /// The most recent `Save`/`Destroy` failure, handed to the next
    /// completion observer.
    pub fn take_last_error(&self) -> Option<EmbernetError> {
        self.last_error.lock().take()
    }

    async fn run_job(&self, session: &Session, id: &str, job: SessionJob) {
        match job {
            SessionJob::Load => {
                if let Err(err) = self.driver.load(session, id).await {
                    // A failed load degrades the session to transient.
                    tracing::warn!(session = id, error = %err, "session load failed");
                    session.demote_to_transient();
                }
            }
            SessionJob::Save => {
                if let Err(err) = self.driver.save(session, id).await {
                    tracing::error!(session = id, error = %err, "session save failed");
                    *self.last_error.lock() = Some(err);
                }
            }
            SessionJob::Destroy => {
                if let Err(err) = self.driver.destroy(session, id).await {
                    tracing::error!(session = id, error = %err, "session destroy failed");
                    *self.last_error.lock() = Some(err);
                }
            }
            SessionJob::Migrate(from) => {
                if let Err(err) = self.driver.migrate(session, id, from.as_ref()).await {
                    tracing::error!(session = id, error = %err, "session migrate failed");
                    *self.last_error.lock() = Some(err);
                }
            }
        }
    }
}
