//! Statically registered check handlers, one per [`TestId`].

pub mod faults;
pub mod media;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::mode::RunMode;
use crate::provider::{ErrorCode, MediaStatus, ProviderError, SessionHandle};
use crate::registry::TestId;
use crate::verdict::CheckOutcome;

/// `Err` means the provider failed in a way the check did not anticipate.
pub type CheckResult = Result<CheckOutcome, ProviderError>;

/// What every check gets to work with: the run's live session and its mode.
#[derive(Clone)]
pub struct CheckContext {
    pub session: SessionHandle,
    pub mode: RunMode,
}

pub fn dispatch(id: TestId, ctx: CheckContext) -> BoxFuture<'static, CheckResult> {
    match id {
        TestId::MediaNamespaceSupported => async move { media::namespace_supported(&ctx).await }.boxed(),
        TestId::InvalidUrl => async move { faults::invalid_url(&ctx).await }.boxed(),
        TestId::InvalidRequest => async move { faults::invalid_request(&ctx).await }.boxed(),
        TestId::PlayPauseRequest => async move { media::play_pause(&ctx).await }.boxed(),
        TestId::TimepointControl => async move { media::timepoint_control(&ctx).await }.boxed(),
        TestId::VolumeRequest => async move { media::volume(&ctx).await }.boxed(),
        TestId::StopRequest => async move { media::stop_media(&ctx).await }.boxed(),
        TestId::StopSessionRequest => async move { media::stop_session(&ctx).await }.boxed(),
    }
}

pub(crate) async fn current_media(ctx: &CheckContext) -> Result<MediaStatus, ProviderError> {
    ctx.session
        .media()
        .await
        .ok_or_else(|| ProviderError::new(ErrorCode::SessionError, "session has no current media"))
}

/// Whole-second position somewhere in `[0, duration)`.
pub(crate) fn random_offset(duration: Option<f64>) -> f64 {
    let duration = duration.unwrap_or(0.0).max(0.0);
    let percent: f64 = rand::random_range(0.0..100.0);
    (percent * duration / 100.0).floor()
}


#[cfg(test)]
mod tests {
    use super::test_support::connect;
    use super::*;
    use crate::provider::ReceiverBehavior;

    #[test]
    fn test_random_offset_is_whole_and_in_range() {
        for _ in 0..200 {
            let offset = random_offset(Some(600.0));
            assert!((0.0..600.0).contains(&offset));
            assert_eq!(offset, offset.floor());
        }
        assert_eq!(random_offset(None), 0.0);
    }

    #[tokio::test]
    async fn test_every_id_dispatches_on_a_healthy_receiver() {
        for id in [
            TestId::MediaNamespaceSupported,
            TestId::InvalidRequest,
            TestId::PlayPauseRequest,
            TestId::TimepointControl,
            TestId::VolumeRequest,
            TestId::StopRequest,
        ] {
            let (_receiver, ctx) = connect(ReceiverBehavior::default(), RunMode::Auth).await;
            let outcome = dispatch(id, ctx).await.unwrap();
            assert!(outcome.passed, "{} failed: {:?}", id, outcome.message);
        }
    }
}
