use std::time::Duration;

/// Tuning knobs for the pipeline stages.
///
/// Constructed once and passed to each component explicitly; there is no
/// global configuration state. The defaults reproduce a small deployment:
/// five workers per consumption loop, a handful of retries on contended
/// balance writes, and a short exponential backoff between attempts.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of concurrent workers draining each consumption loop.
    pub worker_pool_size: usize,
    /// Extra attempts after a version conflict on the balance write.
    /// Zero disables retrying and reports the conflict as a failure.
    pub conflict_retries: u32,
    /// Extra attempts for publishes that forward an already-resolved
    /// outcome (status and ledger events). After exhaustion the event is
    /// logged and dropped.
    pub publish_retries: u32,
    /// Base delay between retry attempts; doubles per attempt.
    pub retry_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 5,
            conflict_retries: 3,
            publish_retries: 3,
            retry_backoff: Duration::from_millis(25),
        }
    }
}
