use crate::cache::{StepCache, STEP_CACHE_CAPACITY};
use crate::channel::ResultSink;
use crate::error::{Result, SeekError};
use crate::gacha::{DrawOutcome, GachaConfig, ItemId};
use crate::rng;
use std::sync::Arc;

/// Seeds processed between two progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 10_000;
/// Positions visited between two stop-flag polls.
pub const DEFAULT_STOP_POLL_INTERVAL: u64 = 4_096;

/// One position of the sequence being looked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetElement {
    Item(ItemId),
    Featured,
    /// Featured guarantee: matches whatever was drawn.
    ConfirmedFeatured,
}

impl TargetElement {
    #[inline]
    pub fn matches(&self, outcome: &DrawOutcome) -> bool {
        match self {
            TargetElement::ConfirmedFeatured => true,
            TargetElement::Featured => outcome.is_featured(),
            TargetElement::Item(id) => !outcome.is_featured() && outcome.item_id() == Some(*id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    /// Follow the generator's own orbit from the start state.
    Chained,
    /// Walk the integers upward from the start state.
    Counter,
}

#[derive(Debug, Clone)]
pub struct SearchJob {
    pub start_state: u32,
    /// Positions to visit, the skipped zero seed included.
    pub candidate_count: u64,
    pub mode: TraversalMode,
    pub target: Arc<[TargetElement]>,
    pub stop_on_first_found: bool,
    pub continuation: Option<Box<SearchJob>>,
}

impl SearchJob {
    pub fn new(
        start_state: u32,
        candidate_count: u64,
        mode: TraversalMode,
        target: Arc<[TargetElement]>,
        stop_on_first_found: bool,
    ) -> Self {
        SearchJob {
            start_state,
            candidate_count,
            mode,
            target,
            stop_on_first_found,
            continuation: None,
        }
    }

    pub fn then(mut self, continuation: SearchJob) -> Self {
        self.continuation = Some(Box::new(continuation));
        self
    }

    /// Rejects targets the step cache cannot replay.
    #[allow(dead_code)]
    pub fn validate(&self) -> Result<()> {
        validate_target(&self.target)?;
        match &self.continuation {
            Some(next) => next.validate(),
            None => Ok(()),
        }
    }
}

pub fn validate_target(target: &[TargetElement]) -> Result<()> {
    if target.len() > STEP_CACHE_CAPACITY {
        return Err(SeekError::TargetTooLong {
            len: target.len(),
            max: STEP_CACHE_CAPACITY,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSettings {
    pub progress_interval: u64,
    pub stop_poll_interval: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            stop_poll_interval: DEFAULT_STOP_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEnd {
    Exhausted,
    Found { seed: u32, mask: u32 },
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSummary {
    pub end: JobEnd,
    pub processed: u64,
    pub final_state: u32,
}

// Seed enumeration for one job segment. `current` runs one past u32::MAX
// when a counter walk wraps.
struct Cursor {
    mode: TraversalMode,
    start: u32,
    current: u64,
}

impl Cursor {
    fn new(mode: TraversalMode, start: u32) -> Self {
        Cursor {
            mode,
            start,
            current: start as u64,
        }
    }

    /// A chained walk that is back at its start after `visited` positions
    /// has covered the whole orbit.
    #[inline]
    fn orbit_closed(&self, visited: u64) -> bool {
        self.mode == TraversalMode::Chained && visited > 0 && self.current == self.start as u64
    }

    #[inline]
    fn seed(&self) -> Option<u32> {
        u32::try_from(self.current).ok()
    }

    #[inline]
    fn advance(&mut self) {
        self.current = match self.mode {
            TraversalMode::Chained => rng::next(self.current as u32) as u64,
            TraversalMode::Counter => self.current + 1,
        };
    }

    #[inline]
    fn final_state(&self) -> u32 {
        self.current as u32
    }
}

struct Tally {
    processed: u64,
    pending: u64,
    interval: u64,
}

impl Tally {
    #[inline]
    fn count<S: ResultSink>(&mut self, sink: &mut S) {
        self.processed += 1;
        self.pending += 1;
        if self.pending >= self.interval {
            sink.progress(self.pending);
            self.pending = 0;
        }
    }

    fn flush<S: ResultSink>(&mut self, sink: &mut S) {
        if self.pending > 0 {
            sink.progress(self.pending);
            self.pending = 0;
        }
    }
}

enum SegmentEnd {
    Exhausted(u32),
    Found { seed: u32, mask: u32 },
    Stopped(u32),
}

/// Replays `target` against the seed bound to `cache`.
///
/// Returns the match bitmask (bit `k` for position `k < 32`) when every
/// position matches; stops simulating at the first mismatch.
pub fn replay(cache: &mut StepCache<'_>, target: &[TargetElement]) -> Option<u32> {
    let mut mask = 0u32;
    for (k, element) in target.iter().enumerate() {
        let outcome = cache.get_step(k)?;
        if !element.matches(&outcome) {
            return None;
        }
        if k < 32 {
            mask |= 1 << k;
        }
    }
    Some(mask)
}

/// Runs `job` and its continuation, reporting through `sink`.
///
/// Sends exactly one terminal report: `stop_found` when a match ends the job,
/// `done` otherwise (exhausted or stopped from outside).
pub fn run_job<S: ResultSink>(
    job: &SearchJob,
    config: &GachaConfig,
    settings: &SearchSettings,
    sink: &mut S,
) -> JobSummary {
    let mut cache = StepCache::new(config, job.start_state);
    let mut tally = Tally {
        processed: 0,
        pending: 0,
        interval: settings.progress_interval.max(1),
    };
    let poll = settings.stop_poll_interval.max(1);

    let mut segment = job;
    loop {
        match run_segment(segment, poll, &mut cache, &mut tally, sink) {
            SegmentEnd::Found { seed, mask } => {
                tally.flush(sink);
                sink.stop_found(seed, mask, tally.processed);
                return JobSummary {
                    end: JobEnd::Found { seed, mask },
                    processed: tally.processed,
                    final_state: seed,
                };
            }
            SegmentEnd::Stopped(final_state) => {
                tally.flush(sink);
                sink.done(final_state, tally.processed);
                return JobSummary {
                    end: JobEnd::Stopped,
                    processed: tally.processed,
                    final_state,
                };
            }
            SegmentEnd::Exhausted(final_state) => match segment.continuation.as_deref() {
                Some(next) => segment = next,
                None => {
                    tally.flush(sink);
                    sink.done(final_state, tally.processed);
                    return JobSummary {
                        end: JobEnd::Exhausted,
                        processed: tally.processed,
                        final_state,
                    };
                }
            },
        }
    }
}

fn run_segment<S: ResultSink>(
    job: &SearchJob,
    poll: u64,
    cache: &mut StepCache<'_>,
    tally: &mut Tally,
    sink: &mut S,
) -> SegmentEnd {
    let mut cursor = Cursor::new(job.mode, job.start_state);
    let mut visited = 0u64;

    while visited < job.candidate_count {
        let Some(seed) = cursor.seed() else {
            // Counter walked past u32::MAX.
            break;
        };
        if cursor.orbit_closed(visited) {
            break;
        }
        if visited % poll == 0 && sink.should_stop() {
            return SegmentEnd::Stopped(seed);
        }
        visited += 1;

        if seed != 0 {
            cache.reset(seed);
            let matched = replay(cache, &job.target);
            tally.count(sink);
            if let Some(mask) = matched {
                if job.stop_on_first_found {
                    return SegmentEnd::Found { seed, mask };
                }
                sink.found(seed, mask);
            }
        }
        cursor.advance();
    }

    SegmentEnd::Exhausted(cursor.final_state())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{SearchEvent, SharedSearchState, SharedSink, RESULT_CAPACITY};
    use crate::gacha::{simulate_sequence, RARITY_TIERS, RATE_SCALE};

    #[derive(Default)]
    struct RecordingSink {
        events: Vec<SearchEvent>,
        stop_after_polls: Option<usize>,
        polls: usize,
    }

    impl RecordingSink {
        fn found_seeds(&self) -> Vec<u32> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    SearchEvent::Found { seed, .. } | SearchEvent::StopFound { seed, .. } => Some(*seed),
                    _ => None,
                })
                .collect()
        }

        fn progress_deltas(&self) -> Vec<u64> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    SearchEvent::Progress { delta, .. } => Some(*delta),
                    _ => None,
                })
                .collect()
        }
    }

    impl ResultSink for RecordingSink {
        fn found(&mut self, seed: u32, mask: u32) {
            self.events.push(SearchEvent::Found { worker: 0, seed, mask });
        }
        fn progress(&mut self, delta: u64) {
            self.events.push(SearchEvent::Progress { worker: 0, delta });
        }
        fn stop_found(&mut self, seed: u32, mask: u32, processed: u64) {
            self.events.push(SearchEvent::StopFound { worker: 0, seed, mask, processed });
        }
        fn done(&mut self, final_state: u32, processed: u64) {
            self.events.push(SearchEvent::Done { worker: 0, final_state, processed });
        }
        fn error(&mut self, message: String) {
            self.events.push(SearchEvent::Error { worker: 0, message });
        }
        fn should_stop(&mut self) -> bool {
            self.polls += 1;
            matches!(self.stop_after_polls, Some(n) if self.polls > n)
        }
    }

    fn always_featured() -> GachaConfig {
        GachaConfig::new(RATE_SCALE, [RATE_SCALE; RARITY_TIERS], [vec![1], vec![], vec![], vec![], vec![]])
    }

    fn mixed_config() -> GachaConfig {
        GachaConfig::from_rates(
            1_000,
            [6_000, 2_000, 1_500, 500, 0],
            [vec![1, 2, 3], vec![10, 11, 12], vec![20, 21], vec![30], vec![]],
        )
    }

    fn target(elements: &[TargetElement]) -> Arc<[TargetElement]> {
        Arc::from(elements.to_vec())
    }

    fn settings(progress_interval: u64) -> SearchSettings {
        SearchSettings {
            progress_interval,
            stop_poll_interval: 64,
        }
    }

    #[test]
    fn featured_target_matches_every_nonzero_seed() {
        let config = always_featured();
        let job = SearchJob::new(1, 500, TraversalMode::Counter, target(&[TargetElement::Featured]), false);
        let mut sink = RecordingSink::default();
        let summary = run_job(&job, &config, &settings(100), &mut sink);
        assert_eq!(summary.end, JobEnd::Exhausted);
        assert_eq!(summary.processed, 500);
        assert_eq!(sink.found_seeds(), (1..=500).collect::<Vec<u32>>());
    }

    #[test]
    fn zero_seed_is_skipped_in_counter_mode() {
        let config = always_featured();
        let job = SearchJob::new(0, 10, TraversalMode::Counter, target(&[TargetElement::Featured]), false);
        let mut sink = RecordingSink::default();
        let summary = run_job(&job, &config, &settings(100), &mut sink);
        assert_eq!(summary.processed, 9);
        assert_eq!(sink.found_seeds(), (1..10).collect::<Vec<u32>>());
        assert_eq!(summary.final_state, 10);
    }

    #[test]
    fn zero_seed_in_chained_mode_ends_immediately() {
        let config = always_featured();
        let job = SearchJob::new(0, 1_000, TraversalMode::Chained, target(&[TargetElement::Featured]), false);
        let mut sink = RecordingSink::default();
        let summary = run_job(&job, &config, &settings(100), &mut sink);
        assert_eq!(summary.processed, 0);
        assert!(sink.found_seeds().is_empty());
        assert_eq!(sink.events, vec![SearchEvent::Done { worker: 0, final_state: 0, processed: 0 }]);
    }

    #[test]
    fn chained_mode_follows_the_orbit() {
        let config = always_featured();
        let start = 0xCAFE_BABE;
        let job = SearchJob::new(start, 1_000, TraversalMode::Chained, target(&[TargetElement::Featured]), false);
        let mut sink = RecordingSink::default();
        let summary = run_job(&job, &config, &settings(100), &mut sink);
        let orbit: Vec<u32> = (0..1_000u64).map(|i| rng::advance_by(start, i)).collect();
        assert_eq!(sink.found_seeds(), orbit);
        assert_eq!(summary.final_state, rng::advance_by(start, 1_000));
    }

    #[test]
    fn chained_cursor_closes_when_back_at_start() {
        let mut cursor = Cursor::new(TraversalMode::Chained, 12_345);
        assert!(!cursor.orbit_closed(0));
        cursor.advance();
        assert_eq!(cursor.seed(), Some(rng::next(12_345)));
        assert!(!cursor.orbit_closed(1));
        // The full orbit is 2^32 - 1 steps; jump to its last position.
        cursor.current = 12_345;
        assert!(cursor.orbit_closed(2));

        let mut zero = Cursor::new(TraversalMode::Chained, 0);
        zero.advance();
        assert!(zero.orbit_closed(1));

        let counter = Cursor::new(TraversalMode::Counter, 12_345);
        assert!(!counter.orbit_closed(7));
    }

    #[test]
    fn counter_mode_stops_at_wraparound() {
        let config = always_featured();
        let job = SearchJob::new(u32::MAX - 4, 1_000, TraversalMode::Counter, target(&[TargetElement::Featured]), false);
        let mut sink = RecordingSink::default();
        let summary = run_job(&job, &config, &settings(100), &mut sink);
        assert_eq!(summary.processed, 5);
        assert_eq!(summary.end, JobEnd::Exhausted);
        assert_eq!(summary.final_state, 0);
    }

    #[test]
    fn finds_the_seed_that_produced_a_sequence() {
        let config = mixed_config();
        let secret = 2_024u32;
        let drawn = simulate_sequence(secret, 8, &config);
        let elements: Vec<TargetElement> = drawn
            .iter()
            .map(|o| match o.item_id() {
                Some(id) => TargetElement::Item(id),
                None => TargetElement::Featured,
            })
            .collect();
        let job = SearchJob::new(1, 5_000, TraversalMode::Counter, target(&elements), false);
        let mut sink = RecordingSink::default();
        run_job(&job, &config, &settings(1_000), &mut sink);
        assert!(sink.found_seeds().contains(&secret));
    }

    #[test]
    fn confirmed_featured_is_a_wildcard() {
        let config = mixed_config();
        let mut cache = StepCache::new(&config, 77);
        let mask = replay(&mut cache, &[TargetElement::ConfirmedFeatured; 3]);
        assert_eq!(mask, Some(0b111));
        cache.reset(78);
        assert_eq!(replay(&mut cache, &[]), Some(0));
    }

    #[test]
    fn replay_stops_simulating_at_first_mismatch() {
        let config = always_featured();
        let mut cache = StepCache::new(&config, 5);
        let elements = [TargetElement::Featured, TargetElement::Item(1), TargetElement::Featured];
        assert_eq!(replay(&mut cache, &elements), None);
        assert_eq!(cache.computed(), 2);
    }

    #[test]
    fn stop_on_first_found_skips_continuation() {
        let config = always_featured();
        let tail = SearchJob::new(1, 100, TraversalMode::Counter, target(&[TargetElement::Featured]), true);
        let job = SearchJob::new(10, 100, TraversalMode::Chained, target(&[TargetElement::Featured]), true).then(tail);
        let mut sink = RecordingSink::default();
        let summary = run_job(&job, &config, &settings(100), &mut sink);
        assert_eq!(summary.end, JobEnd::Found { seed: 10, mask: 1 });
        assert_eq!(summary.processed, 1);
        assert_eq!(
            sink.events,
            vec![
                SearchEvent::Progress { worker: 0, delta: 1 },
                SearchEvent::StopFound { worker: 0, seed: 10, mask: 1, processed: 1 },
            ]
        );
    }

    #[test]
    fn continuation_runs_after_exhaustion() {
        let config = always_featured();
        let tail = SearchJob::new(1_000, 50, TraversalMode::Counter, target(&[TargetElement::Featured]), false);
        let job = SearchJob::new(10, 20, TraversalMode::Chained, target(&[TargetElement::Featured]), false).then(tail);
        let mut sink = RecordingSink::default();
        let summary = run_job(&job, &config, &settings(7), &mut sink);
        assert_eq!(summary.processed, 70);
        assert_eq!(summary.final_state, 1_050);
        let found = sink.found_seeds();
        assert_eq!(found.len(), 70);
        assert_eq!(found[20], 1_000);
        let done = sink.events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(done, 1);
    }

    #[test]
    fn progress_is_batched_and_flushed() {
        let config = mixed_config();
        let job = SearchJob::new(1, 2_345, TraversalMode::Counter, target(&[TargetElement::Item(999)]), false);
        let mut sink = RecordingSink::default();
        let summary = run_job(&job, &config, &settings(1_000), &mut sink);
        assert_eq!(sink.progress_deltas(), vec![1_000, 1_000, 345]);
        assert_eq!(summary.processed, 2_345);
    }

    #[test]
    fn external_stop_is_polled() {
        let config = mixed_config();
        let job = SearchJob::new(1, 100_000, TraversalMode::Counter, target(&[TargetElement::Item(999)]), false);
        let mut sink = RecordingSink {
            stop_after_polls: Some(2),
            ..RecordingSink::default()
        };
        let summary = run_job(&job, &config, &settings(1_000), &mut sink);
        assert_eq!(summary.end, JobEnd::Stopped);
        assert_eq!(summary.processed, 128);
        assert_eq!(sink.progress_deltas().iter().sum::<u64>(), 128);
    }

    #[test]
    fn shared_buffer_caps_results() {
        let config = always_featured();
        let state = Arc::new(SharedSearchState::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut sink = SharedSink::new(0, Arc::clone(&state), tx);
        let job = SearchJob::new(1, 6_000, TraversalMode::Counter, target(&[TargetElement::Featured]), false);
        run_job(&job, &config, &settings(1_000), &mut sink);
        assert_eq!(state.result_count(), RESULT_CAPACITY);
        assert_eq!(state.processed(), 6_000);
        assert!(matches!(rx.try_recv(), Ok(SearchEvent::Done { processed: 6_000, .. })));
    }

    #[test]
    fn oversized_target_is_rejected() {
        let long = target(&[TargetElement::Featured; STEP_CACHE_CAPACITY + 1]);
        let job = SearchJob::new(1, 1, TraversalMode::Counter, long, false);
        assert!(matches!(job.validate(), Err(SeekError::TargetTooLong { len: 61, max: 60 })));
    }
}
