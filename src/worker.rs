use crate::config::Config;
use log::{error, info};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

const DEFAULT_STACK_SIZE: usize = 4 * 1024 * 1024;

/// Thread pool the search partitions run on.
pub struct SearchPool {
    pool: Arc<ThreadPool>,
    num_threads: usize,
}

impl SearchPool {
    #[allow(dead_code)]
    pub fn new(requested_threads: usize) -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let num_threads = if requested_threads == 0 {
            cores
        } else {
            requested_threads
        };
        Self::build_pool(num_threads, DEFAULT_STACK_SIZE)
    }

    pub fn new_with_config(config: &Config) -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let mut num_threads = if cores > config.worker_reserve_cores {
            cores - config.worker_reserve_cores
        } else {
            1
        };
        if config.worker_max_threads > 0 && num_threads > config.worker_max_threads {
            num_threads = config.worker_max_threads;
        }
        let stack_size = if config.worker_stack_size_mb == 0 {
            DEFAULT_STACK_SIZE
        } else {
            config.worker_stack_size_mb * 1024 * 1024
        };
        Self::build_pool(num_threads, stack_size)
    }

    fn build_pool(num_threads: usize, stack_size: usize) -> Self {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("seeker-thread-{}", i))
            .stack_size(stack_size)
            .panic_handler(|err| {
                error!("Worker thread panicked: {}", panic_message(err.as_ref()));
            })
            .build()
            .expect("Failed to build search pool");

        info!("Search pool initialized with {} threads.", num_threads);

        Self {
            pool: Arc::new(pool),
            num_threads,
        }
    }

    /// Runs `f` inside the pool and waits, turning a panic into an error.
    pub fn execute<F, R>(&self, f: F) -> Result<R, String>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool
            .install(|| panic::catch_unwind(AssertUnwindSafe(f)))
            .map_err(|err| format!("Task panicked: {}", panic_message(err.as_ref())))
    }

    /// Queues `task` without waiting. A panic inside it is handed to
    /// `on_panic` on the same thread, so the task's owner can report it.
    pub fn spawn_guarded<F, P>(&self, task: F, on_panic: P)
    where
        F: FnOnce() + Send + 'static,
        P: FnOnce(String) + Send + 'static,
    {
        self.pool.spawn(move || {
            if let Err(err) = panic::catch_unwind(AssertUnwindSafe(task)) {
                on_panic(format!("Task panicked: {}", panic_message(err.as_ref())));
            }
        });
    }

    pub fn thread_count(&self) -> usize {
        self.num_threads
    }
}

pub fn panic_message(err: &(dyn Any + Send)) -> String {
    if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown error".to_string()
    }
}
