/// Configuration of an [`Executor`](crate::Executor).
///
/// # Example
///
/// ```rust
/// use chorus::runtime::Config;
///
/// let config = Config::default()
///     .set_initial_run_queue_capacity(256)
///     .set_wake_burst_limit(32);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Initial capacity of the run queue.
    pub(crate) initial_run_queue_capacity: usize,
    /// How many tasks may be polled inline (one waking the next) before the
    /// executor falls back to the run queue. Bounds the poll recursion depth.
    pub(crate) wake_burst_limit: usize,
}

impl Config {
    /// Returns the default configuration.
    pub const fn default() -> Self {
        Self {
            initial_run_queue_capacity: 64,
            wake_burst_limit: 127,
        }
    }

    /// Sets the initial capacity of the run queue.
    #[must_use]
    pub const fn set_initial_run_queue_capacity(mut self, capacity: usize) -> Self {
        self.initial_run_queue_capacity = capacity;
        self
    }

    /// Sets how many tasks may be polled inline before the executor falls
    /// back to the run queue.
    ///
    /// # Panics
    ///
    /// If `limit` is zero.
    #[must_use]
    pub const fn set_wake_burst_limit(mut self, limit: usize) -> Self {
        assert!(limit > 0, "wake burst limit must be positive");
        self.wake_burst_limit = limit;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default()
    }
}
