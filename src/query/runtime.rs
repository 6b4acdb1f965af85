//! Pipeline runtime
//!
//! A pipeline with N stages runs on N+1 bounded queues. Stage `i` reads
//! queue `i` and writes queue `i + 1`; a collector drains the last queue
//! into the client-facing result stream:
//!
//! ```text
//!   feeder -> [q0] -> stage 0 -> [q1] -> ... -> stage N-1 -> [qN] -> collector -> results
//! ```
//!
//! Stages and the collector run on blocking worker threads. A supervisor task
//! waits for all of them and, if any stage failed, appends one final error
//! item to the result stream so partial output is never mistaken for a
//! complete one.

use super::compiler::{DataType, Pipeline};
use super::result::{AggregationResult, QueryResult};
use super::stages::{send_or_cancel, Inbox, Outbox, StageContext};
use super::traveler::{ElementRef, Payload, Traveler};
use super::{ExecutionError, ExecutionResult};
use crate::cancel::Cancellation;
use crate::config::RocksDbConfig;
use crate::graph::Element;
use crate::storage::{GraphInterface, KvStore, RocksKv};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle of one pipeline run; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Built,
    Running,
    /// The feeder has closed the first queue
    Draining,
    /// The last queue has been closed
    Closed,
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(PipelineState::Built as u8))
    }

    fn advance(&self, state: PipelineState) {
        self.0.fetch_max(state as u8, Ordering::SeqCst);
    }

    fn get(&self) -> PipelineState {
        match self.0.load(Ordering::SeqCst) {
            0 => PipelineState::Built,
            1 => PipelineState::Running,
            2 => PipelineState::Draining,
            _ => PipelineState::Closed,
        }
    }
}

/// Per-run scratch space under the caller's work directory. Every scratch
/// directory is removed when the manager is dropped.
#[derive(Debug)]
pub struct ResourceManager {
    workdir: PathBuf,
    scratch: Mutex<Vec<TempDir>>,
}

impl ResourceManager {
    pub fn new(workdir: impl AsRef<Path>) -> Self {
        Self {
            workdir: workdir.as_ref().to_path_buf(),
            scratch: Mutex::new(Vec::new()),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Fresh empty directory owned by this run
    pub fn scratch_dir(&self) -> ExecutionResult<PathBuf> {
        std::fs::create_dir_all(&self.workdir)?;
        let dir = tempfile::Builder::new()
            .prefix("trellis-scratch-")
            .tempdir_in(&self.workdir)?;
        let path = dir.path().to_path_buf();
        self.scratch
            .lock()
            .map_err(|_| ExecutionError::Runtime("scratch registry lock poisoned".to_string()))?
            .push(dir);
        Ok(path)
    }

    /// Key-value store in a fresh scratch directory
    pub fn scratch_kv(&self) -> ExecutionResult<Arc<dyn KvStore>> {
        let dir = self.scratch_dir()?;
        let config = RocksDbConfig {
            compression: false,
            ..RocksDbConfig::default()
        };
        debug!("Opening scratch store at {:?}", dir);
        Ok(Arc::new(RocksKv::open(&dir, &config)?))
    }
}

struct StageReport {
    name: String,
    emitted: u64,
    elapsed: Duration,
    error: Option<ExecutionError>,
}

struct CollectorReport {
    delivered: u64,
    error: Option<ExecutionError>,
}

enum Feed {
    Seed,
    Stream(mpsc::Receiver<Traveler>),
}

type ResultSender = mpsc::Sender<ExecutionResult<QueryResult>>;

/// Lazy result sequence of a running pipeline.
///
/// Dropping it cancels the run. The run follows the token it was started
/// with, but cancelling the run never cancels that token.
pub struct RunningPipeline {
    run_id: Uuid,
    results: ReceiverStream<ExecutionResult<QueryResult>>,
    state: Arc<StateCell>,
    cancel: Cancellation,
}

impl RunningPipeline {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Every item, including a trailing error if the run was incomplete
    pub async fn collect_results(self) -> Vec<ExecutionResult<QueryResult>> {
        self.collect().await
    }

    /// All results, or the first error
    pub async fn try_collect_results(mut self) -> ExecutionResult<Vec<QueryResult>> {
        let mut results = Vec::new();
        while let Some(item) = self.next().await {
            results.push(item?);
        }
        Ok(results)
    }
}

impl Stream for RunningPipeline {
    type Item = ExecutionResult<QueryResult>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.results).poll_next(cx)
    }
}

impl Drop for RunningPipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start `pipeline` from a single empty traveler. Must be called from
/// within a tokio runtime.
pub fn run(cancel: &Cancellation, pipeline: Arc<Pipeline>, workdir: impl AsRef<Path>) -> RunningPipeline {
    launch(cancel, pipeline, workdir.as_ref(), Feed::Seed)
}

/// Continue a pipeline from a stream of previously produced travelers
pub fn resume(
    cancel: &Cancellation,
    pipeline: Arc<Pipeline>,
    workdir: impl AsRef<Path>,
    input: mpsc::Receiver<Traveler>,
) -> RunningPipeline {
    launch(cancel, pipeline, workdir.as_ref(), Feed::Stream(input))
}

fn launch(cancel: &Cancellation, pipeline: Arc<Pipeline>, workdir: &Path, feed: Feed) -> RunningPipeline {
    let run_id = Uuid::new_v4();
    // dropping the run must not cancel the caller's other work
    let cancel = cancel.child();
    let state = Arc::new(StateCell::new());
    let resources = Arc::new(ResourceManager::new(workdir));
    let capacity = pipeline.queue_capacity();

    info!(
        "Starting pipeline {} on graph '{}' ({} stages)",
        run_id,
        pipeline.graph().name(),
        pipeline.stages().len()
    );
    state.advance(PipelineState::Running);

    let (feed_tx, mut rx) = mpsc::channel::<Traveler>(capacity);
    let mut workers = Vec::with_capacity(pipeline.stages().len());
    for index in 0..pipeline.stages().len() {
        let (tx, next_rx) = mpsc::channel::<Traveler>(capacity);
        let input = std::mem::replace(&mut rx, next_rx);
        workers.push(spawn_stage(
            run_id,
            index,
            Arc::clone(&pipeline),
            StageContext {
                graph: Arc::clone(pipeline.graph()),
                cancel: cancel.clone(),
                resources: Arc::clone(&resources),
                load_data: pipeline.stages()[index].descriptor.load_data,
                batch_size: pipeline.batch_size(),
            },
            input,
            tx,
        ));
    }

    let (results_tx, results_rx) = mpsc::channel(capacity);
    let collector = spawn_collector(
        run_id,
        Arc::clone(pipeline.graph()),
        pipeline.data_type(),
        cancel.clone(),
        Arc::clone(&state),
        rx,
        results_tx.clone(),
    );

    match feed {
        Feed::Seed => {
            if feed_tx.try_send(Traveler::new()).is_err() {
                warn!("Pipeline {} could not be seeded", run_id);
            }
            drop(feed_tx);
            state.advance(PipelineState::Draining);
        }
        Feed::Stream(mut input) => {
            let cancel = cancel.clone();
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                loop {
                    let traveler = tokio::select! {
                        item = input.recv() => match item {
                            Some(traveler) => traveler,
                            None => break,
                        },
                        _ = cancel.cancelled() => break,
                    };
                    if feed_tx.send(traveler).await.is_err() {
                        break;
                    }
                }
                drop(feed_tx);
                state.advance(PipelineState::Draining);
            });
        }
    }

    tokio::spawn(supervise(
        run_id,
        workers,
        collector,
        cancel.clone(),
        Arc::clone(&state),
        resources,
        results_tx,
    ));

    RunningPipeline {
        run_id,
        results: ReceiverStream::new(results_rx),
        state,
        cancel,
    }
}

fn spawn_stage(
    run_id: Uuid,
    index: usize,
    pipeline: Arc<Pipeline>,
    ctx: StageContext,
    input: mpsc::Receiver<Traveler>,
    output: mpsc::Sender<Traveler>,
) -> JoinHandle<StageReport> {
    tokio::task::spawn_blocking(move || {
        let compiled = &pipeline.stages()[index];
        let name = format!("{}#{}", compiled.descriptor.name, index);
        let started = Instant::now();
        let mut inbox = Inbox::new(input, ctx.cancel.clone());
        let mut outbox = Outbox::new(output, ctx.cancel.clone());

        let error = match compiled.stage.process(&ctx, &mut inbox, &mut outbox) {
            Ok(()) => None,
            Err(ExecutionError::Cancelled) => None,
            Err(e) if e.is_fatal() => {
                error!("Pipeline {} stage {} failed: {}; aborting", run_id, name, e);
                ctx.cancel.cancel();
                Some(e)
            }
            Err(e) => {
                warn!("Pipeline {} stage {} stopped early: {}", run_id, name, e);
                Some(e)
            }
        };

        let emitted = outbox.emitted();
        // closes this stage's output queue
        drop(outbox);
        drop(inbox);
        StageReport {
            name,
            emitted,
            elapsed: started.elapsed(),
            error,
        }
    })
}

fn spawn_collector(
    run_id: Uuid,
    graph: Arc<dyn GraphInterface>,
    data_type: DataType,
    cancel: Cancellation,
    state: Arc<StateCell>,
    input: mpsc::Receiver<Traveler>,
    results: ResultSender,
) -> JoinHandle<CollectorReport> {
    tokio::task::spawn_blocking(move || {
        let mut inbox = Inbox::new(input, cancel.clone());
        let mut report = CollectorReport {
            delivered: 0,
            error: None,
        };
        while let Some(traveler) = inbox.recv() {
            match to_result(graph.as_ref(), data_type, traveler) {
                Ok(Some(result)) => {
                    if !send_or_cancel(&results, Ok(result), &cancel) {
                        debug!("Pipeline {} result stream dropped or cancelled", run_id);
                        cancel.cancel();
                        break;
                    }
                    report.delivered += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    if e.is_fatal() {
                        cancel.cancel();
                    }
                    report.error = Some(e);
                    break;
                }
            }
        }
        drop(inbox);
        state.advance(PipelineState::Closed);
        report
    })
}

async fn supervise(
    run_id: Uuid,
    workers: Vec<JoinHandle<StageReport>>,
    collector: JoinHandle<CollectorReport>,
    cancel: Cancellation,
    state: Arc<StateCell>,
    resources: Arc<ResourceManager>,
    results: ResultSender,
) {
    let mut fatal: Option<String> = None;
    let mut failures = Vec::new();
    let mut record = |source: &str, e: ExecutionError| {
        let message = format!("{}: {}", source, e);
        if e.is_fatal() {
            fatal.get_or_insert(message);
        } else {
            failures.push(message);
        }
    };

    for (index, worker) in workers.into_iter().enumerate() {
        match worker.await {
            Ok(report) => {
                debug!(
                    "Pipeline {} stage {} emitted {} travelers in {:?}",
                    run_id, report.name, report.emitted, report.elapsed
                );
                if let Some(e) = report.error {
                    record(&report.name, e);
                }
            }
            Err(join) => {
                cancel.cancel();
                record(
                    &format!("stage {}", index),
                    ExecutionError::Aborted(format!("worker panicked: {}", join)),
                );
            }
        }
    }

    let delivered = match collector.await {
        Ok(report) => {
            if let Some(e) = report.error {
                record("collector", e);
            }
            report.delivered
        }
        Err(join) => {
            record(
                "collector",
                ExecutionError::Aborted(format!("worker panicked: {}", join)),
            );
            0
        }
    };
    state.advance(PipelineState::Closed);
    drop(resources);

    let outcome = match fatal {
        Some(message) => Some(ExecutionError::Aborted(message)),
        None if !failures.is_empty() => Some(ExecutionError::Incomplete { failures }),
        None => None,
    };
    match outcome {
        Some(e) => {
            warn!("Pipeline {} closed after {} results: {}", run_id, delivered, e);
            let _ = results.send(Err(e)).await;
        }
        None => info!("Pipeline {} closed after {} results", run_id, delivered),
    }
}

/// Re-read an element that was carried without its payload; `None` if it
/// has since been deleted
fn load_element(graph: &dyn GraphInterface, element: &ElementRef) -> ExecutionResult<Option<Element>> {
    if element.loaded {
        return Ok(Some(element.element.clone()));
    }
    Ok(match &element.element {
        Element::Vertex(v) => graph.get_vertex(&v.id, true)?.map(Element::Vertex),
        Element::Edge(e) => graph.get_edge(&e.id, true)?.map(Element::Edge),
    })
}

fn to_result(
    graph: &dyn GraphInterface,
    data_type: DataType,
    traveler: Traveler,
) -> ExecutionResult<Option<QueryResult>> {
    let result = match (data_type, traveler.payload()) {
        (DataType::VertexData | DataType::EdgeData, _) => {
            let Some(current) = traveler.current() else {
                return Ok(None);
            };
            load_element(graph, current)?.map(|element| match element {
                Element::Vertex(v) => QueryResult::Vertex(v),
                Element::Edge(e) => QueryResult::Edge(e),
            })
        }
        (DataType::CountData, Payload::Count(n)) => Some(QueryResult::Count(*n)),
        (DataType::GroupCountData, Payload::GroupCount(groups)) => Some(QueryResult::Render(
            groups
                .iter()
                .map(|(k, n)| (k.clone(), serde_json::Value::from(*n)))
                .collect::<serde_json::Map<_, _>>()
                .into(),
        )),
        (DataType::RowData, Payload::Row(row)) => {
            let mut selections = IndexMap::with_capacity(row.len());
            for (name, element) in row {
                match load_element(graph, element)? {
                    Some(element) => selections.insert(name.clone(), element),
                    None => return Ok(None),
                };
            }
            Some(QueryResult::Selections(selections))
        }
        (DataType::ValueData, Payload::Value(value)) => Some(QueryResult::Render(value.clone())),
        (DataType::AggregationData, Payload::Aggregation(bucket)) => {
            Some(QueryResult::Aggregation(AggregationResult {
                name: bucket.name.clone(),
                key: bucket.key.clone(),
                value: bucket.value,
            }))
        }
        _ => None,
    };
    Ok(result)
}
