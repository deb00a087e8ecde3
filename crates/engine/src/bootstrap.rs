//! Bootstrap sequencing: form parsing and rule loading, in order, once.
//!
//! [`SerialQueue`] is a single worker task draining a channel of boxed
//! futures. Tasks run strictly in submission order and never overlap. A task
//! that fails (or panics) only fails its own caller; the queue keeps going.
//!
//! [`FormBootstrap`] pushes its two preparation steps through the queue and
//! caches their results by presence: a step whose result is already cached
//! is skipped, not rerun. The engine can only be built from the
//! [`Prepared`] value `prepare` returns, so field registration cannot start
//! before both steps have finished.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use formwire_interchange::{FormDefinition, RuleDefinition, RulesFileType};
use tokio::sync::{mpsc, oneshot, OnceCell};
use tracing::{debug, info, warn};

use crate::sources::{FormStructureProvider, RuleFileProvider, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("bootstrap queue is closed")]
    QueueClosed,
    #[error("bootstrap task aborted before completing")]
    TaskAborted,
}

// ──────────────────────────────────────────────
// SerialQueue
// ──────────────────────────────────────────────

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// FIFO queue running one task at a time on a background worker.
#[derive(Debug, Clone)]
pub struct SerialQueue {
    jobs: mpsc::UnboundedSender<Job>,
}

impl SerialQueue {
    /// Start the worker on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, as `tokio::spawn` does.
    pub fn new() -> Self {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // Each job runs in its own task so a panic stays contained.
                if let Err(err) = tokio::spawn(job).await {
                    warn!(error = %err, "bootstrap task aborted");
                }
            }
            debug!("bootstrap queue drained");
        });
        Self { jobs }
    }

    /// Queue `task` and wait for its output.
    ///
    /// The task is enqueued when this method is called, not when the
    /// returned future is first polled, so submission order is call order.
    pub fn run_exclusive<F, T>(&self, task: F) -> impl Future<Output = Result<T, BootstrapError>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done, result) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = done.send(task.await);
        });
        let queued = self
            .jobs
            .send(job)
            .map_err(|_| BootstrapError::QueueClosed);
        async move {
            queued?;
            result.await.map_err(|_| BootstrapError::TaskAborted)
        }
    }
}

impl Default for SerialQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────────────────────────────────
// FormBootstrap
// ──────────────────────────────────────────────

/// Everything view construction needs: the form structure and its rules.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub form: Arc<FormDefinition>,
    pub rules: Arc<Vec<RuleDefinition>>,
}

pub struct FormBootstrap<P> {
    provider: Arc<P>,
    queue: SerialQueue,
    default_rules_file: Option<String>,
    default_file_type: RulesFileType,
    form: Arc<OnceCell<Arc<FormDefinition>>>,
    rules: Arc<OnceCell<Arc<Vec<RuleDefinition>>>>,
}

impl<P> FormBootstrap<P>
where
    P: FormStructureProvider + RuleFileProvider + 'static,
{
    pub fn new(provider: P, queue: SerialQueue) -> Self {
        Self {
            provider: Arc::new(provider),
            queue,
            default_rules_file: None,
            default_file_type: RulesFileType::default(),
            form: Arc::new(OnceCell::new()),
            rules: Arc::new(OnceCell::new()),
        }
    }

    /// Rule resource used when the form does not name one.
    pub fn with_rules_file(mut self, name: impl Into<String>) -> Self {
        self.default_rules_file = Some(name.into());
        self
    }

    /// Encoding assumed when the rule resource name has no known extension.
    pub fn with_file_type(mut self, file_type: RulesFileType) -> Self {
        self.default_file_type = file_type;
        self
    }

    pub fn is_prepared(&self) -> bool {
        self.form.initialized() && self.rules.initialized()
    }

    /// Parse the form, then load its rules. Each step runs at most once over
    /// the lifetime of this bootstrap.
    pub async fn prepare(&self) -> Result<Prepared, BootstrapError> {
        let form = self.parse_form().await?;
        let rules = self.load_rules(Arc::clone(&form)).await?;
        Ok(Prepared { form, rules })
    }

    /// Queue the form-parse step.
    pub fn parse_form(&self) -> impl Future<Output = Result<Arc<FormDefinition>, BootstrapError>> {
        let queued = self.queue.run_exclusive(parse_once(
            Arc::clone(&self.provider),
            Arc::clone(&self.form),
        ));
        async move { queued.await? }
    }

    /// Queue the rule-load step for `form`.
    pub fn load_rules(
        &self,
        form: Arc<FormDefinition>,
    ) -> impl Future<Output = Result<Arc<Vec<RuleDefinition>>, BootstrapError>> {
        let name = form
            .rules_file
            .clone()
            .or_else(|| self.default_rules_file.clone());
        let file_type = name
            .as_deref()
            .and_then(RulesFileType::from_path)
            .unwrap_or(self.default_file_type);
        let queued = self.queue.run_exclusive(load_once(
            Arc::clone(&self.provider),
            Arc::clone(&self.rules),
            name,
            file_type,
        ));
        async move { queued.await? }
    }
}

async fn parse_once<P: FormStructureProvider>(
    provider: Arc<P>,
    cache: Arc<OnceCell<Arc<FormDefinition>>>,
) -> Result<Arc<FormDefinition>, BootstrapError> {
    if let Some(form) = cache.get() {
        debug!(form = %form.form, "form structure cached; skipping parse");
        return Ok(Arc::clone(form));
    }
    let form = Arc::new(provider.form_structure().await?);
    info!(form = %form.form, fields = form.fields().count(), "form structure parsed");
    let _ = cache.set(Arc::clone(&form));
    Ok(form)
}

async fn load_once<P: RuleFileProvider>(
    provider: Arc<P>,
    cache: Arc<OnceCell<Arc<Vec<RuleDefinition>>>>,
    name: Option<String>,
    file_type: RulesFileType,
) -> Result<Arc<Vec<RuleDefinition>>, BootstrapError> {
    if let Some(rules) = cache.get() {
        debug!("rules cached; skipping load");
        return Ok(Arc::clone(rules));
    }
    let rules = match name {
        Some(name) => {
            let rules = provider.read_rules(&name, file_type).await?;
            info!(file = %name, %file_type, rules = rules.len(), "rules loaded");
            rules
        }
        None => {
            info!("form names no rules file; continuing without rules");
            Vec::new()
        }
    };
    let rules = Arc::new(rules);
    let _ = cache.set(Arc::clone(&rules));
    Ok(rules)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn tasks_run_in_submission_order() {
        let queue = SerialQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow = {
            let log = Arc::clone(&log);
            queue.run_exclusive(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                log.lock().unwrap().push("first");
            })
        };
        let fast = {
            let log = Arc::clone(&log);
            queue.run_exclusive(async move {
                log.lock().unwrap().push("second");
            })
        };

        // Await in reverse: order is fixed at submission.
        fast.await.unwrap();
        slow.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn failed_or_panicking_task_does_not_stop_queue() {
        let queue = SerialQueue::new();

        let failed: Result<(), &str> = queue.run_exclusive(async { Err("boom") }).await.unwrap();
        assert_eq!(failed, Err("boom"));

        let aborted = queue
            .run_exclusive(async {
                panic!("task panicked");
            })
            .await;
        assert!(matches!(aborted, Err(BootstrapError::TaskAborted)));

        assert_eq!(queue.run_exclusive(async { 7 }).await.unwrap(), 7);
    }

    struct CountingSource {
        form_reads: AtomicUsize,
        rule_reads: AtomicUsize,
    }

    const FORM: &str = r#"{"form": "F", "rules_file": "rules.json", "steps": []}"#;

    #[async_trait::async_trait]
    impl FormStructureProvider for CountingSource {
        async fn form_structure(&self) -> Result<FormDefinition, SourceError> {
            self.form_reads.fetch_add(1, Ordering::SeqCst);
            Ok(formwire_interchange::parse_form(FORM).unwrap())
        }
    }

    #[async_trait::async_trait]
    impl RuleFileProvider for CountingSource {
        async fn read_rules(
            &self,
            name: &str,
            file_type: RulesFileType,
        ) -> Result<Vec<RuleDefinition>, SourceError> {
            assert_eq!(name, "rules.json");
            assert_eq!(file_type, RulesFileType::Json);
            self.rule_reads.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn prepare_runs_each_step_once() {
        let bootstrap = FormBootstrap::new(
            CountingSource {
                form_reads: AtomicUsize::new(0),
                rule_reads: AtomicUsize::new(0),
            },
            SerialQueue::new(),
        );
        assert!(!bootstrap.is_prepared());

        bootstrap.prepare().await.unwrap();
        let again = bootstrap.prepare().await.unwrap();

        assert!(bootstrap.is_prepared());
        assert_eq!(again.form.form, "F");
        assert_eq!(bootstrap.provider.form_reads.load(Ordering::SeqCst), 1);
        assert_eq!(bootstrap.provider.rule_reads.load(Ordering::SeqCst), 1);
    }
}
