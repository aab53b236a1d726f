use crate::channel::{MessageSink, ResultSink, SearchEvent, SharedSearchState, SharedSink};
use crate::config::Config;
use crate::error::Result;
use crate::gacha::GachaConfig;
use crate::pack;
use crate::rng;
use crate::search::{run_job, validate_target, SearchJob, SearchSettings, TargetElement, TraversalMode};
use crate::worker::SearchPool;
use crossbeam_channel::RecvTimeoutError;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Every 32-bit value.
pub const SEED_SPACE: u64 = 1 << 32;

/// How often the shared-memory coordinator samples the processed counter.
const PROGRESS_SAMPLE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// `count` positions along the orbit of `start_seed`.
    Chained,
    /// `count` integers from `start_seed` upward.
    Counter,
    /// The chained search, then every integer of the seed space.
    ChainedThenCounter,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub start_seed: u32,
    pub count: u64,
    pub mode: SearchMode,
    pub target: Vec<TargetElement>,
    pub stop_on_first_found: bool,
}

impl SearchRequest {
    /// Brute force over the whole seed space.
    pub fn full_counter(target: Vec<TargetElement>, stop_on_first_found: bool) -> Self {
        SearchRequest {
            start_seed: 0,
            count: SEED_SPACE,
            mode: SearchMode::Counter,
            target,
            stop_on_first_found,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub worker: usize,
    pub offset: u64,
    pub count: u64,
}

pub fn range_per_worker(total: u64, workers: usize) -> u64 {
    total.div_ceil(workers.max(1) as u64)
}

/// Splits `0..total` into `workers` contiguous ranges of `ceil(total / workers)`;
/// trailing ranges may be short or empty.
pub fn partitions(total: u64, workers: usize) -> Vec<Partition> {
    let workers = workers.max(1);
    let range = range_per_worker(total, workers);
    (0..workers)
        .map(|worker| {
            let offset = worker as u64 * range;
            Partition {
                worker,
                offset,
                count: total.saturating_sub(offset).min(range),
            }
        })
        .collect()
}

#[inline]
pub fn counter_start(base: u32, offset: u64) -> u32 {
    (base as u64).wrapping_add(offset) as u32
}

/// One worker's share of a request.
///
/// A chained start is `offset` generator steps past the base seed; that walk
/// happens in [`Assignment::resolve`] so each worker pays for its own.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub worker: usize,
    orbit_base: u32,
    orbit_offset: u64,
    job: SearchJob,
}

impl Assignment {
    pub fn resolve(mut self) -> SearchJob {
        if self.job.mode == TraversalMode::Chained {
            self.job.start_state = rng::advance_by(self.orbit_base, self.orbit_offset);
        }
        self.job
    }
}

pub fn plan(request: &SearchRequest, workers: usize) -> Vec<Assignment> {
    let target: Arc<[TargetElement]> = Arc::from(request.target.clone());
    let base = request.start_seed;
    let stop = request.stop_on_first_found;
    let head = |mode: TraversalMode, part: &Partition| {
        let start = match mode {
            TraversalMode::Counter => counter_start(base, part.offset),
            TraversalMode::Chained => base,
        };
        Assignment {
            worker: part.worker,
            orbit_base: base,
            orbit_offset: part.offset,
            job: SearchJob::new(start, part.count, mode, Arc::clone(&target), stop),
        }
    };

    match request.mode {
        SearchMode::Counter => partitions(request.count, workers)
            .iter()
            .filter(|p| p.count > 0)
            .map(|p| head(TraversalMode::Counter, p))
            .collect(),
        SearchMode::Chained => partitions(request.count, workers)
            .iter()
            .filter(|p| p.count > 0)
            .map(|p| head(TraversalMode::Chained, p))
            .collect(),
        SearchMode::ChainedThenCounter => partitions(request.count, workers)
            .iter()
            .zip(partitions(SEED_SPACE, workers).iter())
            .filter(|(orbit, space)| orbit.count > 0 || space.count > 0)
            .map(|(orbit, space)| {
                let tail = SearchJob::new(
                    counter_start(0, space.offset),
                    space.count,
                    TraversalMode::Counter,
                    Arc::clone(&target),
                    stop,
                );
                let mut assignment = head(TraversalMode::Chained, orbit);
                assignment.job = assignment.job.then(tail);
                assignment
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoundSeed {
    pub seed: u32,
    pub mask: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub worker: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct SearchReport {
    pub found: Vec<FoundSeed>,
    pub processed: u64,
    pub failures: Vec<WorkerFailure>,
    /// `(worker, state)` where each finished worker stopped.
    pub final_states: Vec<(usize, u32)>,
    pub stopped_early: bool,
    pub dispatched: usize,
    pub elapsed: Duration,
}

impl SearchReport {
    fn record_exit(&mut self, event: &SearchEvent) {
        match event {
            SearchEvent::Done { worker, final_state, .. } => self.final_states.push((*worker, *final_state)),
            SearchEvent::StopFound { worker, seed, .. } => {
                self.final_states.push((*worker, *seed));
                self.stopped_early = true;
            }
            SearchEvent::Error { worker, message } => {
                warn!("[Search] Worker {} failed: {}", worker, message);
                self.failures.push(WorkerFailure {
                    worker: *worker,
                    message: message.clone(),
                });
            }
            SearchEvent::Found { .. } | SearchEvent::Progress { .. } => {}
        }
    }
}

pub struct Coordinator {
    pool: SearchPool,
    workers: usize,
    settings: SearchSettings,
}

impl Coordinator {
    /// `workers == 0` means one partition per pool thread.
    pub fn new(pool: SearchPool, workers: usize, settings: SearchSettings) -> Self {
        let workers = if workers == 0 { pool.thread_count() } else { workers };
        Coordinator {
            pool,
            workers,
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            SearchPool::new_with_config(config),
            config.search_workers,
            config.search_settings(),
        )
    }

    pub fn pool(&self) -> &SearchPool {
        &self.pool
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn plan(&self, request: &SearchRequest) -> Result<Vec<Assignment>> {
        validate_target(&request.target)?;
        Ok(plan(request, self.workers))
    }

    /// Message-passing search. Every event is passed to `on_event` as it
    /// arrives; returns once every worker has sent its terminal event. When
    /// the request stops on first match, the first `stop_found` cancels the
    /// remaining workers, which then report `done` at their next poll.
    pub fn run_messages<F>(
        &self,
        request: &SearchRequest,
        config: Arc<GachaConfig>,
        mut on_event: F,
    ) -> Result<SearchReport>
    where
        F: FnMut(&SearchEvent),
    {
        let started = Instant::now();
        let assignments = self.plan(request)?;
        let mut report = SearchReport {
            dispatched: assignments.len(),
            ..SearchReport::default()
        };

        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = Arc::new(AtomicBool::new(false));
        for assignment in assignments {
            let worker = assignment.worker;
            let config = Arc::clone(&config);
            let settings = self.settings;
            let job_tx = tx.clone();
            let panic_tx = tx.clone();
            let cancel = Arc::clone(&cancel);
            self.pool.spawn_guarded(
                move || {
                    let job = assignment.resolve();
                    debug!(
                        "[Search] Worker {} starts at {:#010x} ({:?}, {} positions)",
                        worker, job.start_state, job.mode, job.candidate_count
                    );
                    let mut sink = MessageSink::new(worker, job_tx, cancel);
                    run_job(&job, &config, &settings, &mut sink);
                },
                move |message| {
                    let _ = panic_tx.send(SearchEvent::Error { worker, message });
                },
            );
        }
        drop(tx);

        let mut outstanding = report.dispatched;
        while outstanding > 0 {
            let Ok(event) = rx.recv() else {
                break;
            };
            on_event(&event);
            match &event {
                SearchEvent::Found { seed, mask, .. } | SearchEvent::StopFound { seed, mask, .. } => {
                    report.found.push(FoundSeed {
                        seed: *seed,
                        mask: *mask,
                    });
                }
                SearchEvent::Progress { delta, .. } => report.processed += delta,
                _ => {}
            }
            if event.is_terminal() {
                debug!("[Search] Worker {} exited", event.worker());
                outstanding -= 1;
                report.record_exit(&event);
            }
            if request.stop_on_first_found && matches!(event, SearchEvent::StopFound { .. }) {
                cancel.store(true, Ordering::Release);
            }
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// Shared-memory search. Workers decode the banner from `packed`, write
    /// into `state`, and only signal completion over a channel. While
    /// waiting, `on_progress` receives the processed counter.
    pub fn run_shared<F>(
        &self,
        request: &SearchRequest,
        packed: Arc<[u32]>,
        state: Arc<SharedSearchState>,
        mut on_progress: F,
    ) -> Result<SearchReport>
    where
        F: FnMut(u32),
    {
        let started = Instant::now();
        let assignments = self.plan(request)?;
        let mut report = SearchReport {
            dispatched: assignments.len(),
            ..SearchReport::default()
        };

        let (exit_tx, exit_rx) = crossbeam_channel::unbounded();
        for assignment in assignments {
            let worker = assignment.worker;
            let packed = Arc::clone(&packed);
            let state = Arc::clone(&state);
            let settings = self.settings;
            let job_tx = exit_tx.clone();
            let panic_tx = exit_tx.clone();
            self.pool.spawn_guarded(
                move || {
                    let mut sink = SharedSink::new(worker, state, job_tx);
                    match pack::decode(&packed) {
                        Ok(config) => {
                            let job = assignment.resolve();
                            run_job(&job, &config, &settings, &mut sink);
                        }
                        Err(e) => sink.error(e.to_string()),
                    }
                },
                move |message| {
                    let _ = panic_tx.send(SearchEvent::Error { worker, message });
                },
            );
        }
        drop(exit_tx);

        let mut outstanding = report.dispatched;
        while outstanding > 0 {
            match exit_rx.recv_timeout(PROGRESS_SAMPLE) {
                Ok(event) => {
                    if event.is_terminal() {
                        outstanding -= 1;
                        report.record_exit(&event);
                    }
                }
                Err(RecvTimeoutError::Timeout) => on_progress(state.processed()),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        on_progress(state.processed());

        report.processed = state.processed() as u64;
        report.found = state
            .results()
            .into_iter()
            .map(|(seed, mask)| FoundSeed { seed, mask })
            .collect();
        report.stopped_early |= state.stop_requested();
        report.elapsed = started.elapsed();
        Ok(report)
    }
}
