//! Checks that provoke receiver errors on purpose.

use tracing::warn;

use super::{current_media, CheckContext, CheckResult};
use crate::config::{
    INVALID_MEDIA_CONTENT_TYPE, INVALID_MEDIA_URL, INVALID_SEEK_TIME, LOAD_FAILED_DESCRIPTION,
    MEDIA_NAMESPACE,
};
use crate::provider::{ErrorCode, LoadRequest, MediaInfo};
use crate::verdict::CheckOutcome;

/// Load an unreachable URL and expect `LOAD_FAILED`. The previous media is reloaded
/// (paused, from the start) before the verdict regardless of outcome.
pub async fn invalid_url(ctx: &CheckContext) -> CheckResult {
    let previous = current_media(ctx).await?.media;

    let broken = LoadRequest::new(MediaInfo::new(INVALID_MEDIA_URL, INVALID_MEDIA_CONTENT_TYPE));
    let result = ctx.session.load_media(broken).await;

    let restore = LoadRequest {
        media: MediaInfo::new(previous.content_id, previous.content_type),
        autoplay: false,
        current_time: 0.0,
    };
    if let Err(e) = ctx.session.load_media(restore).await {
        warn!("Failed to reload previous media after invalid URL check: {}", e);
    }

    Ok(match result {
        Ok(_) => CheckOutcome::fail("expected invalid media request to fail"),
        Err(e) if e.description.as_deref() == Some(LOAD_FAILED_DESCRIPTION) => CheckOutcome::pass(),
        Err(e) => CheckOutcome::fail(format!(
            "expected invalid load media URL to return {} error, got {}",
            LOAD_FAILED_DESCRIPTION, e
        )),
    })
}

/// Send a seek whose time is not a number and expect `INVALID_PARAMETER`.
pub async fn invalid_request(ctx: &CheckContext) -> CheckResult {
    let media_session_id = ctx.session.media().await.map(|m| m.media_session_id);
    let request = serde_json::json!({
        "type": "SEEK",
        "mediaSessionId": media_session_id,
        "currentTime": INVALID_SEEK_TIME,
    });

    Ok(
        match ctx
            .session
            .send_message(MEDIA_NAMESPACE, &request.to_string())
            .await
        {
            Ok(()) => CheckOutcome::fail("expected invalid media request to fail"),
            Err(e) if e.code == ErrorCode::InvalidParameter => CheckOutcome::pass(),
            Err(e) => CheckOutcome::fail(format!(
                "expected invalid media request to return INVALID_PARAMETER error code, got {}",
                e
            )),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{connect, CLIP_URL};
    use super::*;
    use crate::mode::RunMode;
    use crate::provider::{PlayerState, ReceiverBehavior};

    #[tokio::test]
    async fn test_invalid_url_passes_and_restores_media() {
        let (receiver, ctx) = connect(ReceiverBehavior::default(), RunMode::NoAuth).await;
        let outcome = invalid_url(&ctx).await.unwrap();
        assert!(outcome.passed);

        let media = receiver.current_media().await.unwrap();
        assert_eq!(media.media.content_id, CLIP_URL);
        assert_eq!(media.player_state, PlayerState::Paused);
        assert_eq!(media.current_time, 0.0);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_on_wrong_error_but_still_restores() {
        let behavior = ReceiverBehavior {
            load_failure_description: "TIMEOUT".to_string(),
            ..ReceiverBehavior::default()
        };
        let (receiver, ctx) = connect(behavior, RunMode::NoAuth).await;
        let outcome = invalid_url(&ctx).await.unwrap();
        assert!(!outcome.passed);
        assert!(outcome.message.unwrap().contains("LOAD_FAILED"));
        assert_eq!(
            receiver.current_media().await.unwrap().media.content_id,
            CLIP_URL
        );
    }

    #[tokio::test]
    async fn test_invalid_url_fails_when_load_succeeds() {
        let behavior = ReceiverBehavior {
            unreachable_media: vec![],
            ..ReceiverBehavior::default()
        };
        let (_receiver, ctx) = connect(behavior, RunMode::NoAuth).await;
        let outcome = invalid_url(&ctx).await.unwrap();
        assert_eq!(
            outcome,
            CheckOutcome::fail("expected invalid media request to fail")
        );
    }

    #[tokio::test]
    async fn test_invalid_request_passes_on_invalid_parameter() {
        let (_receiver, ctx) = connect(ReceiverBehavior::default(), RunMode::Auth).await;
        assert!(invalid_request(&ctx).await.unwrap().passed);
    }

    #[tokio::test]
    async fn test_invalid_request_fails_when_accepted() {
        let behavior = ReceiverBehavior {
            accept_malformed_messages: true,
            ..ReceiverBehavior::default()
        };
        let (_receiver, ctx) = connect(behavior, RunMode::Auth).await;
        let outcome = invalid_request(&ctx).await.unwrap();
        assert!(!outcome.passed);
    }

    #[tokio::test]
    async fn test_invalid_request_fails_on_other_error_code() {
        let behavior = ReceiverBehavior {
            fail_on: Some((
                crate::provider::simulated::Command::SendMessage,
                ErrorCode::ChannelError,
            )),
            ..ReceiverBehavior::default()
        };
        let (_receiver, ctx) = connect(behavior, RunMode::Auth).await;
        let outcome = invalid_request(&ctx).await.unwrap();
        assert!(!outcome.passed);
        assert!(outcome.message.unwrap().contains("INVALID_PARAMETER"));
    }
}
