//! Wiring the build and test stages into one batch pipeline

use crate::builder::{BuildCache, Builder};
use crate::collaborators::{Compiler, Runner};
use crate::executor::{Executor, TestCache};
use crate::message::PipelineMessage;
use crate::stage::{PipelineStage, StageOutputs, StageReport};
use bestflags_config::WorkerConfig;
use bestflags_core::{Error, Result, Task};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub builders: usize,
    pub executors: usize,
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for PipelineConfig {
    fn from(workers: &WorkerConfig) -> Self {
        Self {
            builders: workers.builders,
            executors: workers.executors,
            queue_capacity: workers.queue_capacity,
        }
    }
}

/// Everything a finished batch produced
#[derive(Debug)]
pub struct BatchOutcome {
    /// Resolved tasks in completion order
    pub tasks: Vec<Task>,
    pub reports: Vec<StageReport>,
}

/// Builder and executor plus their caches.
///
/// The caches live as long as the pipeline, so a flag set seen in an
/// earlier batch is never compiled or run again. Each batch gets fresh
/// queues and workers.
pub struct Pipeline {
    builder: Arc<Builder>,
    executor: Arc<Executor>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        compiler: Arc<dyn Compiler>,
        runner: Arc<dyn Runner>,
        config: PipelineConfig,
    ) -> Self {
        Self::from_stages(
            Arc::new(Builder::new(compiler)),
            Arc::new(Executor::new(runner)),
            config,
        )
    }

    pub fn from_stages(
        builder: Arc<Builder>,
        executor: Arc<Executor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            builder,
            executor,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn build_cache(&self) -> &Arc<BuildCache> {
        self.builder.cache()
    }

    pub fn test_cache(&self) -> &Arc<TestCache> {
        self.executor.cache()
    }

    /// Start both stages on fresh queues.
    ///
    /// Build failures skip the executor and land on the results queue
    /// directly; everything else reaches it through the executor.
    pub fn launch(&self) -> PipelineRun {
        let capacity = self.config.queue_capacity.max(1);
        let (input_tx, input_rx) = mpsc::channel(capacity);
        let (built_tx, built_rx) = mpsc::channel(capacity);
        let (results_tx, results_rx) = mpsc::channel(capacity);

        let build = PipelineStage::new(Arc::clone(&self.builder), self.config.builders).spawn(
            input_rx,
            StageOutputs::new(built_tx).with_complete(results_tx.clone()),
        );
        let test = PipelineStage::new(Arc::clone(&self.executor), self.config.executors)
            .spawn(built_rx, StageOutputs::new(results_tx));

        PipelineRun {
            input: input_tx,
            results: results_rx,
            stages: vec![build, test],
        }
    }

    /// Push `tasks` and a poison pill through a fresh run and collect every
    /// resolved task.
    ///
    /// Fails with a structural error if a stage fails, if the results queue
    /// closes before the pill, or if the number of completed tasks does not
    /// match the number submitted.
    pub async fn run_batch(&self, tasks: Vec<Task>) -> Result<BatchOutcome> {
        let submitted = tasks.len();
        tracing::debug!(tasks = submitted, "batch_started");

        let PipelineRun {
            input,
            mut results,
            stages,
        } = self.launch();

        // Feed from a separate task: with bounded queues the results must be
        // drained while the input is still being filled.
        let feeder = tokio::spawn(async move {
            for task in tasks {
                input
                    .send(PipelineMessage::Task(task))
                    .await
                    .map_err(|_| Error::pipeline("feed", "input queue closed mid-batch"))?;
            }
            input
                .send(PipelineMessage::PoisonPill)
                .await
                .map_err(|_| Error::pipeline("feed", "input queue closed before the poison pill"))
        });

        let mut completed = Vec::with_capacity(submitted);
        let mut pill = false;
        while let Some(message) = results.recv().await {
            match message {
                PipelineMessage::Task(task) => completed.push(task),
                PipelineMessage::PoisonPill => {
                    pill = true;
                    break;
                }
            }
        }
        drop(results);

        let mut first_error = None;
        let reports = join_stages(stages, &mut first_error).await;
        match feeder.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(join_error) => {
                first_error.get_or_insert(Error::pipeline(
                    "feed",
                    format!("feeder panicked: {join_error}"),
                ));
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        if !pill {
            return Err(Error::pipeline(
                "results",
                "results queue closed before the poison pill",
            ));
        }
        if completed.len() != submitted {
            return Err(Error::pipeline(
                "results",
                format!(
                    "{submitted} tasks submitted but {} completed",
                    completed.len()
                ),
            ));
        }
        if let Some(task) = completed.iter().find(|task| !task.is_resolved()) {
            return Err(Error::pipeline(
                "results",
                format!(
                    "task {} completed as {}",
                    task.checksum().short(),
                    task.status()
                ),
            ));
        }

        tracing::debug!(tasks = completed.len(), "batch_completed");
        Ok(BatchOutcome {
            tasks: completed,
            reports,
        })
    }
}

/// A launched pipeline: the input and results ends of its queues
pub struct PipelineRun {
    pub input: mpsc::Sender<PipelineMessage>,
    pub results: mpsc::Receiver<PipelineMessage>,
    stages: Vec<JoinHandle<Result<StageReport>>>,
}

impl PipelineRun {
    /// Close the input, discard unread results and wait for both stages to
    /// stop.
    ///
    /// If no poison pill was sent, the stages observe a closed queue and
    /// this returns their structural error.
    pub async fn join(self) -> Result<Vec<StageReport>> {
        let PipelineRun {
            input,
            mut results,
            stages,
        } = self;
        drop(input);
        // Discard anything still queued so no stage blocks on a full queue.
        while results.recv().await.is_some() {}
        let mut first_error = None;
        let reports = join_stages(stages, &mut first_error).await;
        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }
}

async fn join_stages(
    stages: Vec<JoinHandle<Result<StageReport>>>,
    first_error: &mut Option<Error>,
) -> Vec<StageReport> {
    let mut reports = Vec::with_capacity(stages.len());
    for handle in stages {
        match handle.await {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(join_error) => {
                first_error.get_or_insert(Error::pipeline(
                    "pipeline",
                    format!("stage supervisor panicked: {join_error}"),
                ));
            }
        }
    }
    reports
}
