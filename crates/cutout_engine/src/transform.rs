use std::sync::Arc;

use bytes::Bytes;
use cutout_logging::{cutout_debug, cutout_trace};

use crate::{FailureKind, TransformConfig, TransformError};

/// Reported while the total amount of work is unknown (`total == 0`).
pub const UNKNOWN_PROGRESS_PERCENT: u8 = 0;

/// Raw progress callback handed to a [`Transform`].
///
/// `stage` is informational; `total == 0` means the amount of work is unknown.
pub trait StageProgress: Send + Sync {
    fn tick(&self, stage: &str, current: u64, total: u64);
}

/// Receives the percentage computed by [`TransformAdapter`].
pub trait ProgressSink: Send + Sync {
    fn emit(&self, percent: u8);
}

/// The external background-removal step, treated as a black box.
#[async_trait::async_trait]
pub trait Transform: Send + Sync {
    async fn transform(
        &self,
        input: Bytes,
        config: &TransformConfig,
        progress: &dyn StageProgress,
    ) -> Result<Bytes, TransformError>;
}

/// `current / total` as a percentage clamped to `[0, 100]`.
pub fn progress_percent(current: u64, total: u64) -> u8 {
    if total == 0 {
        return UNKNOWN_PROGRESS_PERCENT;
    }
    let scaled = u128::from(current.min(total)) * 100 / u128::from(total);
    scaled as u8
}

struct PercentRelay<'a> {
    sink: &'a dyn ProgressSink,
}

impl StageProgress for PercentRelay<'_> {
    fn tick(&self, stage: &str, current: u64, total: u64) {
        let percent = progress_percent(current, total);
        cutout_trace!("stage {stage}: {current}/{total} -> {percent}%");
        self.sink.emit(percent);
    }
}

/// Uniform request/response wrapper around a [`Transform`].
///
/// Knows nothing about items or collections.
#[derive(Clone)]
pub struct TransformAdapter {
    transform: Arc<dyn Transform>,
    config: TransformConfig,
}

impl TransformAdapter {
    pub fn new(transform: Arc<dyn Transform>, config: TransformConfig) -> Self {
        Self { transform, config }
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    pub async fn apply(&self, input: Bytes, sink: &dyn ProgressSink) -> Result<Bytes, TransformError> {
        if input.is_empty() {
            return Err(TransformError::new(FailureKind::EmptyInput, "no image bytes"));
        }
        let relay = PercentRelay { sink };
        let call = self.transform.transform(input, &self.config, &relay);
        let output = match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                TransformError::new(
                    FailureKind::Timeout,
                    format!("no result after {} ms", limit.as_millis()),
                )
            })??,
            None => call.await?,
        };
        if output.is_empty() {
            return Err(TransformError::new(
                FailureKind::EmptyOutput,
                "transform returned no bytes",
            ));
        }
        cutout_debug!("transform produced {} bytes", output.len());
        Ok(output)
    }
}
