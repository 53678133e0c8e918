//! Rayon thread pool dispatch for production deployment.
//!
//! This module provides [`PooledDispatch`] which runs timer fires on a
//! dedicated rayon thread pool, keeping the timer facility's delivery thread
//! free. The number of launched-but-unfinished closures is bounded by
//! [`ThreadPoolConfig::max_pending`]; beyond it launches are refused and the
//! closure is handed back to the caller.
//!
//! # Example
//!
//! ```no_run
//! use metronome_dispatch_pooled::{PooledDispatch, ThreadPoolConfig};
//!
//! // Auto-detect cores
//! let dispatch = PooledDispatch::new(ThreadPoolConfig::auto()).unwrap();
//!
//! // Or customize
//! let config = ThreadPoolConfig::builder()
//!     .threads(2)
//!     .max_pending(64)
//!     .build()
//!     .unwrap();
//!
//! let dispatch = PooledDispatch::new(config).unwrap();
//! ```

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

use metronome_dispatch::Dispatch;
use metronome_metrics as metrics;

/// Errors from thread pool configuration.
#[derive(Debug, Error)]
pub enum ThreadPoolError {
    #[error("Failed to build rayon thread pool: {0}")]
    RayonBuildError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Configuration for the timer worker pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads running timer actions.
    pub threads: usize,

    /// Maximum launched-but-unfinished closures before launches are refused.
    /// Refused fires run inline on the timer thread, so this trades queueing
    /// delay against blocking the timer facility.
    pub max_pending: usize,

    /// Stack size for worker threads (bytes). Default: 2MB.
    pub stack_size: usize,

    /// Worker threads are named `<prefix>-<index>`.
    pub thread_name_prefix: String,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self::auto()
    }
}

impl ThreadPoolConfig {
    /// Automatically configure based on available CPU cores.
    ///
    /// Timer actions are mostly short; a quarter of the cores (at least 1,
    /// at most 8) is plenty.
    pub fn auto() -> Self {
        let available = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(4);

        Self::for_core_count(available)
    }

    /// Configure for a specific number of available cores.
    pub fn for_core_count(total_cores: usize) -> Self {
        let threads = (total_cores / 4).clamp(1, 8);
        Self {
            threads,
            max_pending: threads * 64,
            stack_size: 2 * 1024 * 1024, // 2MB
            thread_name_prefix: "timer-worker".to_string(),
        }
    }

    /// Create a builder for custom configuration.
    pub fn builder() -> ThreadPoolConfigBuilder {
        ThreadPoolConfigBuilder::new()
    }

    /// Create a minimal configuration for testing (1 thread).
    pub fn minimal() -> Self {
        Self {
            threads: 1,
            max_pending: 64,
            stack_size: 2 * 1024 * 1024,
            thread_name_prefix: "timer-worker".to_string(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ThreadPoolError> {
        if self.threads == 0 {
            return Err(ThreadPoolError::InvalidConfig(
                "threads must be at least 1".to_string(),
            ));
        }
        if self.max_pending == 0 {
            return Err(ThreadPoolError::InvalidConfig(
                "max_pending must be at least 1".to_string(),
            ));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(ThreadPoolError::InvalidConfig(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for ThreadPoolConfig.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfigBuilder {
    config: ThreadPoolConfig,
}

impl ThreadPoolConfigBuilder {
    /// Create a new builder with auto-detected defaults.
    pub fn new() -> Self {
        Self {
            config: ThreadPoolConfig::auto(),
        }
    }

    /// Set the number of worker threads.
    pub fn threads(mut self, count: usize) -> Self {
        self.config.threads = count;
        self
    }

    /// Set the backpressure threshold.
    pub fn max_pending(mut self, count: usize) -> Self {
        self.config.max_pending = count;
        self
    }

    /// Set the worker stack size (bytes).
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = size;
        self
    }

    /// Set the worker thread name prefix.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<ThreadPoolConfig, ThreadPoolError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build without validation.
    pub fn build_unchecked(self) -> ThreadPoolConfig {
        self.config
    }
}

impl Default for ThreadPoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatch backed by a rayon thread pool.
///
/// Cloning is cheap and shares the pool and its pending counter.
#[derive(Clone)]
pub struct PooledDispatch {
    config: Arc<ThreadPoolConfig>,
    pool: Arc<rayon::ThreadPool>,
    pending: Arc<AtomicUsize>,
}

impl std::fmt::Debug for PooledDispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledDispatch")
            .field("threads", &self.config.threads)
            .field("max_pending", &self.config.max_pending)
            .field("pending", &self.pending.load(Ordering::Relaxed))
            .finish()
    }
}

impl PooledDispatch {
    /// Create a new pooled dispatch with the given configuration.
    pub fn new(config: ThreadPoolConfig) -> Result<Self, ThreadPoolError> {
        config.validate()?;

        let prefix = config.thread_name_prefix.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .stack_size(config.stack_size)
            .thread_name(move |i| format!("{}-{}", prefix, i))
            .build()
            .map_err(|e| ThreadPoolError::RayonBuildError(e.to_string()))?;

        tracing::info!(
            threads = config.threads,
            max_pending = config.max_pending,
            "Timer worker pool initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            pool: Arc::new(pool),
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Create with auto-detected configuration.
    pub fn auto() -> Result<Self, ThreadPoolError> {
        Self::new(ThreadPoolConfig::auto())
    }

    /// Get the configuration.
    pub fn config(&self) -> &ThreadPoolConfig {
        &self.config
    }

    /// Reserve a pending slot, failing once the threshold is reached.
    /// Returns the depth including the new slot.
    fn reserve(&self) -> Option<usize> {
        let limit = self.config.max_pending;
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                (depth < limit).then_some(depth + 1)
            })
            .ok()
            .map(|previous| previous + 1)
    }
}

impl Dispatch for PooledDispatch {
    #[instrument(level = "debug", skip_all)]
    fn try_spawn<F>(&self, f: F) -> Result<(), F>
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(depth) = self.reserve() else {
            tracing::debug!(
                max_pending = self.config.max_pending,
                "Timer worker pool saturated, refusing launch"
            );
            return Err(f);
        };
        metrics::set_dispatch_queue_depth(&self.config.thread_name_prefix, depth);

        let pending = Arc::clone(&self.pending);
        let config = Arc::clone(&self.config);
        self.pool.spawn(move || {
            f();
            let depth = pending.fetch_sub(1, Ordering::AcqRel) - 1;
            metrics::set_dispatch_queue_depth(&config.thread_name_prefix, depth);
        });
        Ok(())
    }

    fn queue_depth(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}
