//! Batch Generation Orchestrator
//!
//! Serves a batch of requests from the cache where possible and generates the
//! rest, either sequentially or on a bounded pool of blocking workers. Results
//! always come back in request order, one per request.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{BatchRecord, CacheStore, PerformanceStatsTracker};
use crate::config::Config;
use crate::error::{CacheError, GenerationError, Result};
use crate::generation::{derive_key, GenerationRequest, GenerationResult, Generator, GeneratorRegistry};

// == Orchestrator Config ==
/// Execution settings for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Worker pool size
    pub max_workers: usize,
    /// Use the pool when more than one item misses the cache
    pub parallel_enabled: bool,
    /// TTL for written-back outputs; `None` uses the store default
    pub cache_ttl: Option<u64>,
    /// Average per-item time above which a warning is logged
    pub target_item_time: Duration,
    /// Deadline applied by [`BatchGenerationOrchestrator::generate_batch`]
    pub batch_timeout: Option<Duration>,
}

impl OrchestratorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.max_workers,
            parallel_enabled: config.parallel_enabled,
            cache_ttl: None,
            target_item_time: Duration::try_from_secs_f64(config.target_item_time_seconds)
                .unwrap_or(Duration::ZERO),
            batch_timeout: config.batch_timeout(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A request that missed the cache, with its batch position and key.
struct Pending {
    index: usize,
    request: GenerationRequest,
    key: String,
}

// == Orchestrator ==
/// Cache-aware batch generator.
///
/// Per-item failures are captured in that item's result and never abort the
/// batch. The worker pool is shared by every batch run on this orchestrator.
#[derive(Debug)]
pub struct BatchGenerationOrchestrator {
    store: Arc<CacheStore>,
    registry: Arc<GeneratorRegistry>,
    workers: Arc<Semaphore>,
    tracker: Arc<PerformanceStatsTracker>,
    config: OrchestratorConfig,
}

impl BatchGenerationOrchestrator {
    /// Creates an orchestrator over `store`.
    ///
    /// Fails with a configuration error if `max_workers` is zero.
    pub fn new(
        store: Arc<CacheStore>,
        registry: GeneratorRegistry,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        if config.max_workers == 0 {
            return Err(CacheError::Configuration(
                "max_workers must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            tracker: store.tracker(),
            store,
            registry: Arc::new(registry),
            workers: Arc::new(Semaphore::new(config.max_workers)),
            config,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &GeneratorRegistry {
        &self.registry
    }

    // == Generate Batch ==
    /// Produces one result per request, in request order.
    ///
    /// Applies the configured batch timeout, if any.
    pub async fn generate_batch(&self, requests: Vec<GenerationRequest>) -> Vec<GenerationResult> {
        let deadline = self.config.batch_timeout.map(|timeout| Instant::now() + timeout);
        self.run(requests, deadline).await
    }

    /// Like [`generate_batch`](Self::generate_batch) with an explicit deadline.
    ///
    /// Items still pending when the deadline passes get a `Timeout` error.
    /// A generator already running on a blocking thread keeps its worker slot
    /// until it returns, then its output is dropped without being cached. An
    /// output that was ready before the deadline is still written back in
    /// full, to every tier.
    pub async fn generate_batch_until(
        &self,
        requests: Vec<GenerationRequest>,
        deadline: Instant,
    ) -> Vec<GenerationResult> {
        self.run(requests, Some(deadline)).await
    }

    async fn run(&self, requests: Vec<GenerationRequest>, deadline: Option<Instant>) -> Vec<GenerationResult> {
        let started = Instant::now();
        let total = requests.len();
        if total == 0 {
            return Vec::new();
        }

        let ids: Vec<String> = requests.iter().map(|r| r.id.clone()).collect();
        let mut slots: Vec<Option<GenerationResult>> = (0..total).map(|_| None).collect();
        let mut pending = Vec::new();

        // Partition into hits and misses
        for (index, request) in requests.into_iter().enumerate() {
            let key = derive_key(&request);
            match self.store.get::<Value>(&key).await {
                Some(output) => {
                    debug!(id = %request.id, key = %key, "served from cache");
                    slots[index] = Some(GenerationResult::cached(request.id, output));
                }
                None => pending.push(Pending { index, request, key }),
            }
        }

        let misses = pending.len();
        let parallel = self.config.parallel_enabled && misses > 1;
        let timed_out = if parallel {
            self.dispatch_parallel(pending, &mut slots, deadline).await
        } else {
            self.dispatch_sequential(pending, &mut slots, deadline).await
        };

        let elapsed = started.elapsed();
        let budget = deadline.map(|d| d.saturating_duration_since(started));

        let results: Vec<GenerationResult> = slots
            .into_iter()
            .zip(ids)
            .map(|(slot, id)| match slot {
                Some(result) => result,
                None if timed_out => {
                    GenerationResult::failed(id, GenerationError::Timeout(budget.unwrap_or(elapsed)), elapsed)
                }
                None => GenerationResult::failed(
                    id,
                    GenerationError::failed("generation task did not complete"),
                    elapsed,
                ),
            })
            .collect();

        let failed = results.iter().filter(|r| !r.is_success()).count();
        self.tracker.record_batch(BatchRecord {
            items: total,
            generated: misses,
            failed,
            elapsed,
            parallel,
        });

        if misses > 0 {
            let average = elapsed / misses as u32;
            if average > self.config.target_item_time {
                warn!(
                    average_secs = average.as_secs_f64(),
                    target_secs = self.config.target_item_time.as_secs_f64(),
                    generated = misses,
                    "batch exceeded target time per item"
                );
            }
        }

        info!(
            items = total,
            cached = total - misses,
            generated = misses,
            failed,
            parallel,
            elapsed_ms = elapsed.as_millis() as u64,
            "batch complete"
        );

        results
    }

    // == Dispatch ==
    /// Runs misses one after another. Returns true if the deadline cut it short.
    async fn dispatch_sequential(
        &self,
        pending: Vec<Pending>,
        slots: &mut [Option<GenerationResult>],
        deadline: Option<Instant>,
    ) -> bool {
        for Pending { index, request, key } in pending {
            let generator = self.registry.get(&request.request_type);
            let unit = generate_one(
                self.store.clone(),
                self.workers.clone(),
                generator,
                request,
                key,
                self.config.cache_ttl,
            );

            let result = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, unit).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("batch deadline expired during sequential generation");
                        return true;
                    }
                },
                None => unit.await,
            };
            slots[index] = Some(result);
        }
        false
    }

    /// Runs misses on the worker pool. Returns true if the deadline cut it short.
    async fn dispatch_parallel(
        &self,
        pending: Vec<Pending>,
        slots: &mut [Option<GenerationResult>],
        deadline: Option<Instant>,
    ) -> bool {
        let mut tasks = JoinSet::new();

        for Pending { index, request, key } in pending {
            let workers = self.workers.clone();
            let store = self.store.clone();
            let generator = self.registry.get(&request.request_type);
            let ttl = self.config.cache_ttl;

            tasks.spawn(async move {
                let result = generate_one(store, workers, generator, request, key, ttl).await;
                (index, result)
            });
        }

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(pending = tasks.len(), "batch deadline expired, aborting pending items");
                        tasks.abort_all();
                        return true;
                    }
                },
                None => tasks.join_next().await,
            };

            match next {
                Some(Ok((index, result))) => slots[index] = Some(result),
                Some(Err(e)) => warn!(error = %e, "generation task ended abnormally"),
                None => return false,
            }
        }
    }
}

// == Unit of Work ==
/// Generates one request on a blocking thread and writes a success back to
/// the cache.
///
/// The worker permit travels with the blocking closure, so it is held for as
/// long as the generator runs even if this future is dropped.
async fn generate_one(
    store: Arc<CacheStore>,
    workers: Arc<Semaphore>,
    generator: Option<Arc<dyn Generator>>,
    request: GenerationRequest,
    key: String,
    ttl: Option<u64>,
) -> GenerationResult {
    let id = request.id.clone();
    let Some(generator) = generator else {
        warn!(id = %id, request_type = %request.request_type, "no generator registered");
        return GenerationResult::failed(
            id,
            GenerationError::UnsupportedType(request.request_type),
            Duration::ZERO,
        );
    };

    // The semaphore is never closed; a failed acquire just runs unbounded
    let permit = workers.acquire_owned().await.ok();

    let started = Instant::now();
    let outcome = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        generator.generate(&request)
    })
    .await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(Ok(output)) => {
            // Own task: cancelling the batch must not split memory and remote writes
            let write = tokio::spawn({
                let output = output.clone();
                async move { store.set(&key, &output, ttl).await }
            });
            match write.await {
                Ok(true) => {}
                Ok(false) => warn!(id = %id, "generated output was not cached"),
                Err(e) => warn!(id = %id, error = %e, "cache write-back ended abnormally"),
            }
            GenerationResult::generated(id, output, elapsed)
        }
        Ok(Err(e)) => {
            warn!(id = %id, error = %e, "generation failed");
            GenerationResult::failed(id, e, elapsed)
        }
        Err(e) => {
            let message = panic_message(e);
            warn!(id = %id, panic = %message, "generator panicked");
            GenerationResult::failed(id, GenerationError::Panicked(message), elapsed)
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task cancelled".to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
