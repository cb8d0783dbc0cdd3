/// Tuning knobs for a [`Stack`](crate::Stack).
///
/// ```
/// use hazstack::{Config, Stack};
///
/// let stack = Stack::<u64>::with_config(Config::new().with_reclaim_threshold(16));
/// assert_eq!(stack.config().reclaim_threshold(), 16);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    reclaim_threshold: usize,
}

impl Config {
    pub const DEFAULT_RECLAIM_THRESHOLD: usize = 64;

    pub const fn new() -> Self {
        Config {
            reclaim_threshold: Self::DEFAULT_RECLAIM_THRESHOLD,
        }
    }

    /// Number of nodes a stack retires between forced reclamation passes.
    ///
    /// The hazard domain also reclaims on its own schedule; this only bounds
    /// how long retired nodes of a busy stack can pile up. Clamped to at
    /// least 1, which scans on every pop.
    pub const fn with_reclaim_threshold(mut self, threshold: usize) -> Self {
        self.reclaim_threshold = if threshold == 0 { 1 } else { threshold };
        self
    }

    pub const fn reclaim_threshold(&self) -> usize {
        self.reclaim_threshold
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
