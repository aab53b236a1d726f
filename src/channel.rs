//! Where search workers report to.
//!
//! A worker only sees the [`ResultSink`] trait. The message variant turns
//! every report into a [`SearchEvent`] on a channel; the shared variant writes
//! into a [`SharedSearchState`] of plain atomics and only uses the channel to
//! say it has finished.
//!
//! # Shared layout
//! All slots are `u32`:
//! - result slot 0: number of published results
//! - result slots `1 + 2i` / `2 + 2i`: seed / match bitmask of result `i`
//! - a separate processed counter
//! - a separate stop flag (0 = run, 1 = stop requested)
//!
//! # Ordering
//! Counters use `Relaxed`. A result is first claimed from a private
//! reservation counter, its two slots are stored, then its private ready word
//! is set with `Release` and slot 0 is incremented. Writers never wait on each
//! other, so slot 0 counts published entries but they need not be contiguous;
//! readers take only entries whose ready word loads as set with `Acquire`.
//! The stop flag is a `Release` store paired with `Acquire` loads.

use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Hard cap on stored results; anything past it is dropped.
pub const RESULT_CAPACITY: usize = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    Found { worker: usize, seed: u32, mask: u32 },
    Progress { worker: usize, delta: u64 },
    Done { worker: usize, final_state: u32, processed: u64 },
    StopFound { worker: usize, seed: u32, mask: u32, processed: u64 },
    Error { worker: usize, message: String },
}

impl SearchEvent {
    pub fn worker(&self) -> usize {
        match self {
            SearchEvent::Found { worker, .. }
            | SearchEvent::Progress { worker, .. }
            | SearchEvent::Done { worker, .. }
            | SearchEvent::StopFound { worker, .. }
            | SearchEvent::Error { worker, .. } => *worker,
        }
    }

    /// Last event a worker sends for its job.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SearchEvent::Done { .. } | SearchEvent::StopFound { .. } | SearchEvent::Error { .. }
        )
    }
}

/// Output capability of one search worker.
pub trait ResultSink {
    fn found(&mut self, seed: u32, mask: u32);
    fn progress(&mut self, delta: u64);
    /// A match ended the job early.
    fn stop_found(&mut self, seed: u32, mask: u32, processed: u64);
    fn done(&mut self, final_state: u32, processed: u64);
    fn error(&mut self, message: String);
    /// Polled by the worker at a fixed cadence.
    fn should_stop(&mut self) -> bool;
}

pub struct MessageSink {
    worker: usize,
    tx: Sender<SearchEvent>,
    cancel: Arc<AtomicBool>,
    disconnected: bool,
}

impl MessageSink {
    /// `cancel` is set by the coordinator once the search is over.
    pub fn new(worker: usize, tx: Sender<SearchEvent>, cancel: Arc<AtomicBool>) -> Self {
        MessageSink {
            worker,
            tx,
            cancel,
            disconnected: false,
        }
    }

    fn send(&mut self, event: SearchEvent) {
        // A dropped receiver means nobody wants further results.
        if self.tx.send(event).is_err() {
            self.disconnected = true;
        }
    }
}

impl ResultSink for MessageSink {
    fn found(&mut self, seed: u32, mask: u32) {
        let worker = self.worker;
        self.send(SearchEvent::Found { worker, seed, mask });
    }

    fn progress(&mut self, delta: u64) {
        let worker = self.worker;
        self.send(SearchEvent::Progress { worker, delta });
    }

    fn stop_found(&mut self, seed: u32, mask: u32, processed: u64) {
        let worker = self.worker;
        self.send(SearchEvent::StopFound {
            worker,
            seed,
            mask,
            processed,
        });
    }

    fn done(&mut self, final_state: u32, processed: u64) {
        let worker = self.worker;
        self.send(SearchEvent::Done {
            worker,
            final_state,
            processed,
        });
    }

    fn error(&mut self, message: String) {
        let worker = self.worker;
        self.send(SearchEvent::Error { worker, message });
    }

    fn should_stop(&mut self) -> bool {
        self.disconnected || self.cancel.load(Ordering::Acquire)
    }
}

/// Fixed-layout region shared by every worker of one search.
pub struct SharedSearchState {
    results: Box<[AtomicU32]>,
    ready: Box<[AtomicU32]>,
    reserved: AtomicU32,
    processed: AtomicU32,
    stop: AtomicU32,
}

impl std::fmt::Debug for SharedSearchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSearchState")
            .field("capacity", &self.capacity())
            .field("result_count", &self.result_count())
            .field("processed", &self.processed())
            .field("stop_requested", &self.stop_requested())
            .finish()
    }
}

impl Default for SharedSearchState {
    fn default() -> Self {
        Self::with_capacity(RESULT_CAPACITY)
    }
}

impl SharedSearchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let results = (0..1 + 2 * capacity)
            .map(|_| AtomicU32::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let ready = (0..capacity)
            .map(|_| AtomicU32::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        SharedSearchState {
            results,
            ready,
            reserved: AtomicU32::new(0),
            processed: AtomicU32::new(0),
            stop: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        (self.results.len() - 1) / 2
    }

    /// Appends a result; returns `false` when the buffer is full.
    pub fn push_result(&self, seed: u32, mask: u32) -> bool {
        match self.claim() {
            Some(slot) => {
                self.publish(slot, seed, mask);
                true
            }
            None => false,
        }
    }

    fn claim(&self) -> Option<usize> {
        let capacity = self.capacity();
        // Keeps the reservation counter from creeping once full.
        if self.reserved.load(Ordering::Relaxed) as usize >= capacity {
            return None;
        }
        let slot = self.reserved.fetch_add(1, Ordering::Relaxed) as usize;
        (slot < capacity).then_some(slot)
    }

    fn publish(&self, slot: usize, seed: u32, mask: u32) {
        self.results[1 + 2 * slot].store(seed, Ordering::Relaxed);
        self.results[2 + 2 * slot].store(mask, Ordering::Relaxed);
        self.ready[slot].store(1, Ordering::Release);
        self.results[0].fetch_add(1, Ordering::Release);
    }

    #[inline]
    pub fn result_count(&self) -> usize {
        (self.results[0].load(Ordering::Acquire) as usize).min(self.capacity())
    }

    /// Published `(seed, mask)` pairs in claim order.
    pub fn results(&self) -> Vec<(u32, u32)> {
        let claimed = (self.reserved.load(Ordering::Acquire) as usize).min(self.capacity());
        (0..claimed)
            .filter(|&i| self.ready[i].load(Ordering::Acquire) != 0)
            .map(|i| {
                (
                    self.results[1 + 2 * i].load(Ordering::Relaxed),
                    self.results[2 + 2 * i].load(Ordering::Relaxed),
                )
            })
            .collect()
    }

    #[inline]
    pub fn add_processed(&self, delta: u32) {
        self.processed.fetch_add(delta, Ordering::Relaxed);
    }

    /// Wraps at 2^32 like every other slot of the layout.
    #[inline]
    pub fn processed(&self) -> u32 {
        self.processed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn request_stop(&self) {
        self.stop.store(1, Ordering::Release);
    }

    #[inline]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire) != 0
    }
}

pub struct SharedSink {
    worker: usize,
    state: Arc<SharedSearchState>,
    exits: Sender<SearchEvent>,
}

impl SharedSink {
    pub fn new(worker: usize, state: Arc<SharedSearchState>, exits: Sender<SearchEvent>) -> Self {
        SharedSink {
            worker,
            state,
            exits,
        }
    }
}

impl ResultSink for SharedSink {
    fn found(&mut self, seed: u32, mask: u32) {
        self.state.push_result(seed, mask);
    }

    fn progress(&mut self, delta: u64) {
        self.state.add_processed(delta as u32);
    }

    fn stop_found(&mut self, seed: u32, mask: u32, processed: u64) {
        self.state.push_result(seed, mask);
        self.state.request_stop();
        let _ = self.exits.send(SearchEvent::StopFound {
            worker: self.worker,
            seed,
            mask,
            processed,
        });
    }

    fn done(&mut self, final_state: u32, processed: u64) {
        let _ = self.exits.send(SearchEvent::Done {
            worker: self.worker,
            final_state,
            processed,
        });
    }

    fn error(&mut self, message: String) {
        let _ = self.exits.send(SearchEvent::Error {
            worker: self.worker,
            message,
        });
    }

    fn should_stop(&mut self) -> bool {
        self.state.stop_requested()
    }
}
