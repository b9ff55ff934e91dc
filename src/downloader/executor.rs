//! Worker pool dispatcher
//!
//! One job per station is queued on a channel sized to the job count. A fixed
//! number of workers pull from that queue, run the retry controller around the
//! fetcher, persist the records and push exactly one [`StationFetchResult`]
//! into a result channel of the same size. [`FetchExecutor::run`] returns once
//! every job has a result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::config::FetchConfig;
use super::job::{StationFetchResult, StationJob};
use super::retry::{run_with_retry, RetryPolicy};
use super::{DownloadError, DownloadResult};
use crate::fetcher::retry_formatter::{extract_error_type, RetryContext};
use crate::fetcher::{DateRange, StationFetcher};
use crate::metrics::StationMetrics;
use crate::output::ChunkStore;
use crate::StationId;

/// State shared read-only by every worker
struct WorkerContext {
    fetcher: Arc<dyn StationFetcher>,
    store: Arc<dyn ChunkStore>,
    policy: RetryPolicy,
    range: DateRange,
    dry_run: bool,
}

/// Multi-station fetch executor
pub struct FetchExecutor {
    fetcher: Arc<dyn StationFetcher>,
    store: Arc<dyn ChunkStore>,
    config: FetchConfig,
}

impl FetchExecutor {
    /// Create an executor; fails when the configuration is out of bounds
    pub fn new(
        fetcher: Arc<dyn StationFetcher>,
        store: Arc<dyn ChunkStore>,
        config: FetchConfig,
    ) -> DownloadResult<Self> {
        config.validate()?;
        Ok(Self {
            fetcher,
            store,
            config,
        })
    }

    /// Run configuration
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch every station and return one result per entry of `stations`
    ///
    /// Results are in completion order.
    pub async fn run(&self, stations: &[StationId]) -> Vec<StationFetchResult> {
        self.run_with_progress(stations, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_result` as each result arrives
    pub async fn run_with_progress<F>(
        &self,
        stations: &[StationId],
        mut on_result: F,
    ) -> Vec<StationFetchResult>
    where
        F: FnMut(&StationFetchResult),
    {
        let total = stations.len();
        let year = self.config.range.year();
        if total == 0 {
            return Vec::new();
        }

        let worker_count = self.config.concurrency.clamp(1, total);
        info!(
            stations = total,
            workers = worker_count,
            range = %self.config.range,
            dry_run = self.config.dry_run,
            "Starting multi-station fetch"
        );

        // Both channels hold every job/result, so no send ever waits
        let (job_tx, job_rx) = mpsc::channel::<StationJob>(total);
        let (result_tx, mut result_rx) = mpsc::channel::<StationFetchResult>(total);

        for &station in stations {
            if let Err(e) = job_tx.try_send(StationJob::new(station)) {
                // Unreachable with a channel sized to the job count; the
                // collector below still accounts for the job
                error!(station_id = station, error = %e, "Failed to enqueue station job");
            }
        }
        drop(job_tx);

        let ctx = Arc::new(WorkerContext {
            fetcher: Arc::clone(&self.fetcher),
            store: Arc::clone(&self.store),
            policy: RetryPolicy::from_config(&self.config),
            range: self.config.range,
            dry_run: self.config.dry_run,
        });
        let job_rx = Arc::new(Mutex::new(job_rx));

        let handles: Vec<JoinHandle<()>> = (0..worker_count)
            .map(|worker_id| {
                let rng = match self.config.rng_seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker_id as u64)),
                    None => StdRng::from_os_rng(),
                };
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&ctx),
                    Arc::clone(&job_rx),
                    result_tx.clone(),
                    rng,
                ))
            })
            .collect();
        drop(result_tx);

        let mut outstanding: HashMap<StationId, usize> = HashMap::new();
        for &station in stations {
            *outstanding.entry(station).or_default() += 1;
        }

        let mut results = Vec::with_capacity(total);
        while results.len() < total {
            match result_rx.recv().await {
                Some(result) => {
                    if let Some(n) = outstanding.get_mut(&result.station_id) {
                        *n = n.saturating_sub(1);
                    }
                    on_result(&result);
                    results.push(result);
                }
                // Every sender is gone: all workers have exited
                None => break,
            }
        }

        for (worker_id, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker_id, error = %e, "Fetch worker terminated abnormally");
            }
        }

        if results.len() < total {
            let missing = total - results.len();
            warn!(missing, "Workers exited before reporting every station");
            for &station in stations {
                let Some(n) = outstanding.get_mut(&station) else {
                    continue;
                };
                if *n == 0 {
                    continue;
                }
                *n -= 1;
                let result = StationFetchResult::failed(
                    station,
                    year,
                    0,
                    DownloadError::WorkerLost.to_string(),
                    Default::default(),
                );
                on_result(&result);
                results.push(result);
            }
        }

        info!(
            stations = total,
            failed = results.iter().filter(|r| !r.success).count(),
            "Multi-station fetch finished"
        );
        results
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: Arc<WorkerContext>,
    jobs: Arc<Mutex<mpsc::Receiver<StationJob>>>,
    results: mpsc::Sender<StationFetchResult>,
    mut rng: StdRng,
) {
    debug!(worker_id, "Fetch worker started");
    loop {
        // The lock is released before the job runs
        let job = { jobs.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };

        let span = info_span!("station", station_id = job.station_id, worker_id);
        let result = process_station(&ctx, job, &mut rng).instrument(span).await;

        if results.send(result).await.is_err() {
            warn!(worker_id, "Result channel closed, stopping worker");
            break;
        }
    }
    debug!(worker_id, "Fetch worker finished");
}

async fn process_station(
    ctx: &WorkerContext,
    job: StationJob,
    rng: &mut StdRng,
) -> StationFetchResult {
    let started = Instant::now();
    let station = job.station_id;
    let year = ctx.range.year();
    let metrics = StationMetrics::start(station);

    match ctx.store.exists(station, year).await {
        Ok(true) => {
            info!("Chunk already stored, skipping");
            metrics.record_skipped();
            return StationFetchResult::skipped(station, year, started.elapsed());
        }
        Ok(false) => {}
        Err(e) => {
            warn!(error = %e, "Existence check failed, fetching anyway");
        }
    }

    let range = ctx.range;
    let fetcher = Arc::clone(&ctx.fetcher);
    let outcome = run_with_retry(&ctx.policy, rng, station, &range, |_attempt| {
        let fetcher = Arc::clone(&fetcher);
        async move { fetcher.fetch_daily(station, &range).await }
    })
    .await;

    let (records, fetch_metrics) = match outcome.result {
        Ok(value) => value,
        Err(err) => {
            let error_type = extract_error_type(&err);
            let ctx_msg = RetryContext::new(
                outcome.attempts,
                ctx.policy.max_attempts(),
                error_type,
                Default::default(),
                station,
                Some(range),
                err.to_string(),
            );
            error!("{}", ctx_msg.format_failure());
            for hint in ctx_msg.format_suggestions() {
                debug!("{hint}");
            }
            metrics.record_failure(error_type.metric_label());
            return StationFetchResult::failed(
                station,
                year,
                outcome.attempts,
                err.to_string(),
                started.elapsed(),
            );
        }
    };

    let mut result = StationFetchResult::fetched(station, year, outcome.attempts, &fetch_metrics);

    if !ctx.dry_run && !records.is_empty() {
        let write_started = Instant::now();
        let persisted = match ctx.store.write(station, year, &records).await {
            Ok(info) => ctx.store.record_index(&info).await,
            Err(e) => Err(e),
        };
        result.timings.write = write_started.elapsed();

        if let Err(e) = persisted {
            error!(error = %e, "Failed to persist station chunk");
            result.mark_failed(DownloadError::Persist(e).to_string());
            result.total_time = started.elapsed();
            metrics.record_failure("persist");
            return result;
        }
    } else if ctx.dry_run {
        debug!(records = records.len(), "Dry run, not persisting");
    }

    result.total_time = started.elapsed();
    info!(
        records = result.record_count,
        attempts = result.attempts,
        bytes = result.bytes_transferred,
        elapsed_ms = result.total_time.as_millis() as u64,
        "Station fetched"
    );
    metrics.record_success(result.record_count, result.bytes_transferred);
    result
}
