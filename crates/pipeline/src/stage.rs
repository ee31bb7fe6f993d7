//! A pool of workers sharing one input queue

use crate::message::PipelineMessage;
use async_trait::async_trait;
use bestflags_core::{Error, Result, Task};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::Instrument;

/// Where a handled task goes next
#[derive(Debug)]
pub enum Routed {
    /// Continue to the stage's regular output
    Forward(Task),
    /// Skip the remaining stages and go straight to the completion queue
    Complete(Task),
}

/// The per-task work a stage performs
#[async_trait]
pub trait StageHandler: Send + Sync + 'static {
    fn stage_name(&self) -> &'static str;

    async fn handle(&self, task: Task) -> Result<Routed>;
}

/// Queues a stage writes to
#[derive(Debug, Clone)]
pub struct StageOutputs {
    pub forward: mpsc::Sender<PipelineMessage>,
    /// Target of [`Routed::Complete`]; falls back to `forward` when unset
    pub complete: Option<mpsc::Sender<PipelineMessage>>,
}

impl StageOutputs {
    pub fn new(forward: mpsc::Sender<PipelineMessage>) -> Self {
        Self {
            forward,
            complete: None,
        }
    }

    #[must_use]
    pub fn with_complete(mut self, complete: mpsc::Sender<PipelineMessage>) -> Self {
        self.complete = Some(complete);
        self
    }
}

/// Counters for one stage over one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    pub stage: &'static str,
    pub workers: usize,
    pub handled: usize,
    pub forwarded: usize,
    pub completed: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct WorkerCounts {
    handled: usize,
    forwarded: usize,
    completed: usize,
}

/// Input queue shared by all workers of one stage
struct SharedInput {
    receiver: Mutex<mpsc::Receiver<PipelineMessage>>,
    pill_seen: AtomicBool,
}

impl SharedInput {
    async fn close(&self) {
        self.receiver.lock().await.close();
    }
}

/// N identical workers draining one queue through a [`StageHandler`].
///
/// Whichever worker takes the poison pill closes the shared queue, so the
/// remaining workers see the end of input as soon as they are idle. A
/// supervisor waits for every worker and then forwards exactly one pill.
pub struct PipelineStage<H> {
    handler: Arc<H>,
    workers: usize,
}

impl<H: StageHandler> PipelineStage<H> {
    pub fn new(handler: Arc<H>, workers: usize) -> Self {
        Self {
            handler,
            workers: workers.max(1),
        }
    }

    pub fn name(&self) -> &'static str {
        self.handler.stage_name()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Start the workers and their supervisor.
    ///
    /// The returned handle resolves once the stage has stopped. On success
    /// the pill has been forwarded; on failure it has not, and the stage's
    /// senders are dropped so downstream observes a closed queue instead.
    pub fn spawn(
        self,
        input: mpsc::Receiver<PipelineMessage>,
        outputs: StageOutputs,
    ) -> JoinHandle<Result<StageReport>> {
        let stage = self.name();
        let shared = Arc::new(SharedInput {
            receiver: Mutex::new(input),
            pill_seen: AtomicBool::new(false),
        });

        let mut workers = JoinSet::new();
        for worker in 0..self.workers {
            let span = tracing::debug_span!("stage_worker", stage, worker);
            workers.spawn(
                run_worker(
                    Arc::clone(&self.handler),
                    Arc::clone(&shared),
                    outputs.clone(),
                )
                .instrument(span),
            );
        }

        let worker_count = self.workers;
        tokio::spawn(async move {
            let mut report = StageReport {
                stage,
                workers: worker_count,
                ..StageReport::default()
            };
            let mut first_error = None;

            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok(Ok(counts)) => {
                        report.handled += counts.handled;
                        report.forwarded += counts.forwarded;
                        report.completed += counts.completed;
                    }
                    Ok(Err(e)) => {
                        first_error.get_or_insert(e);
                    }
                    Err(join_error) => {
                        shared.close().await;
                        first_error.get_or_insert(Error::pipeline(
                            stage,
                            format!("worker panicked: {join_error}"),
                        ));
                    }
                }
            }

            if let Some(e) = first_error {
                tracing::error!(stage, error = %e, "stage_failed");
                return Err(e);
            }
            if !shared.pill_seen.load(Ordering::SeqCst) {
                return Err(Error::pipeline(
                    stage,
                    "input queue closed before the poison pill",
                ));
            }

            outputs
                .forward
                .send(PipelineMessage::PoisonPill)
                .await
                .map_err(|_| {
                    Error::pipeline(stage, "output queue closed before the poison pill")
                })?;
            tracing::debug!(
                stage,
                handled = report.handled,
                forwarded = report.forwarded,
                completed = report.completed,
                "stage_drained"
            );
            Ok(report)
        })
    }
}

async fn run_worker<H: StageHandler>(
    handler: Arc<H>,
    input: Arc<SharedInput>,
    outputs: StageOutputs,
) -> Result<WorkerCounts> {
    let result = drain(handler.as_ref(), &input, &outputs).await;
    if result.is_err() {
        // Stop the other workers and make the feeder's sends fail.
        input.close().await;
    }
    result
}

async fn drain<H: StageHandler>(
    handler: &H,
    input: &SharedInput,
    outputs: &StageOutputs,
) -> Result<WorkerCounts> {
    let stage = handler.stage_name();
    let mut counts = WorkerCounts::default();

    loop {
        let task = {
            let mut receiver = input.receiver.lock().await;
            match receiver.recv().await {
                None => break,
                Some(PipelineMessage::PoisonPill) => {
                    if input.pill_seen.swap(true, Ordering::SeqCst) {
                        return Err(Error::pipeline(stage, "received a second poison pill"));
                    }
                    receiver.close();
                    tracing::trace!(stage, "poison_pill_received");
                    break;
                }
                Some(PipelineMessage::Task(task)) => {
                    if input.pill_seen.load(Ordering::SeqCst) {
                        return Err(Error::pipeline(
                            stage,
                            format!(
                                "task {} arrived after the poison pill",
                                task.checksum().short()
                            ),
                        ));
                    }
                    task
                }
            }
        };

        counts.handled += 1;
        match handler.handle(task).await? {
            Routed::Forward(task) => {
                send(stage, &outputs.forward, task).await?;
                counts.forwarded += 1;
            }
            Routed::Complete(task) => {
                let target = outputs.complete.as_ref().unwrap_or(&outputs.forward);
                send(stage, target, task).await?;
                counts.completed += 1;
            }
        }
    }

    Ok(counts)
}

async fn send(
    stage: &'static str,
    target: &mpsc::Sender<PipelineMessage>,
    task: Task,
) -> Result<()> {
    target
        .send(PipelineMessage::Task(task))
        .await
        .map_err(|_| Error::pipeline(stage, "output queue closed while tasks were in flight"))
}
