//! The HTTP callback poster, another external collaborator. The core only
//! needs somewhere to report stage transitions; it never constructs the
//! HTTP client itself.

use async_trait::async_trait;

use crate::result::StageInfo;

#[async_trait]
pub trait BuildNotifier: Send + Sync {
    async fn stage_finished(&self, stage: &StageInfo);
}

/// The default notifier when the caller does not supply one.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

#[async_trait]
impl BuildNotifier for NoopNotifier {
    async fn stage_finished(&self, _stage: &StageInfo) {}
}

/// Forwards every stage to a `tracing` span at info level, useful for callers
/// that want visibility without standing up an HTTP callback target.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl BuildNotifier for TracingNotifier {
    async fn stage_finished(&self, stage: &StageInfo) {
        tracing::info!(
            stage = %stage.stage,
            step = %stage.step,
            duration_ms = stage.duration().as_millis() as u64,
            "stage finished"
        );
    }
}
