//! Checks that drive the session's media through normal commands.

use super::{current_media, random_offset, CheckContext, CheckResult};
use crate::config::MEDIA_NAMESPACE;
use crate::mode::RunMode;
use crate::provider::{LoadRequest, MediaInfo, PlayerState, SeekRequest, Volume};
use crate::verdict::CheckOutcome;

pub async fn namespace_supported(ctx: &CheckContext) -> CheckResult {
    let namespaces = ctx.session.namespaces().await;
    if namespaces.iter().any(|ns| ns == MEDIA_NAMESPACE) {
        Ok(CheckOutcome::pass())
    } else {
        Ok(CheckOutcome::fail(format!(
            "session does not list {}",
            MEDIA_NAMESPACE
        )))
    }
}

/// Pause (if needed), play, pause, asserting the player state after each step.
pub async fn play_pause(ctx: &CheckContext) -> CheckResult {
    let initial = current_media(ctx).await?.player_state;
    if initial.is_playing() {
        if let Err(e) = ctx.session.pause().await {
            return Ok(CheckOutcome::fail(format!(
                "error during play/pause commands: {}",
                e
            )));
        }
    }

    let state = current_media(ctx).await?.player_state;
    if state != PlayerState::Paused {
        return Ok(CheckOutcome::fail(
            "expected current media state to be PAUSED after issuing pause() command",
        ));
    }

    if let Err(e) = ctx.session.play().await {
        return Ok(CheckOutcome::fail(format!(
            "error during play/pause commands: {}",
            e
        )));
    }
    let state = current_media(ctx).await?.player_state;
    if !state.is_playing() {
        return Ok(CheckOutcome::fail(
            "expected current media state to be PLAYING or BUFFERING after issuing play() command",
        ));
    }

    // Leave the stream paused.
    if let Err(e) = ctx.session.pause().await {
        return Ok(CheckOutcome::fail(format!(
            "error during play/pause commands: {}",
            e
        )));
    }
    let state = current_media(ctx).await?.player_state;
    if state != PlayerState::Paused {
        return Ok(CheckOutcome::fail(
            "expected current media state to be PAUSED after issuing the final pause() command",
        ));
    }

    Ok(CheckOutcome::pass())
}

/// No-auth runs first reload the media at a random offset; every run then seeks to a
/// random position. The reported time must match exactly after each step.
pub async fn timepoint_control(ctx: &CheckContext) -> CheckResult {
    if ctx.mode == RunMode::NoAuth {
        let media = current_media(ctx).await?.media;
        let offset = random_offset(media.duration);
        let request = LoadRequest {
            media: MediaInfo::new(media.content_id, media.content_type),
            autoplay: true,
            current_time: offset,
        };
        if let Err(e) = ctx.session.load_media(request).await {
            return Ok(CheckOutcome::fail(format!(
                "error while loading media at an offset: {}",
                e
            )));
        }
        let now = current_media(ctx).await?.current_time;
        if now != offset {
            return Ok(CheckOutcome::fail(format!(
                "expected current time to be advanced to load offset {}, got {}",
                offset, now
            )));
        }
    }

    let duration = current_media(ctx).await?.media.duration;
    let target = random_offset(duration);
    if let Err(e) = ctx
        .session
        .seek(SeekRequest {
            current_time: target,
        })
        .await
    {
        return Ok(CheckOutcome::fail(format!("error during seek command: {}", e)));
    }

    let now = current_media(ctx).await?.current_time;
    if now != target {
        return Ok(CheckOutcome::fail(format!(
            "expected current media time to match seek target {}, got {}",
            target, now
        )));
    }
    Ok(CheckOutcome::pass())
}

pub async fn volume(ctx: &CheckContext) -> CheckResult {
    current_media(ctx).await?;
    let level = (rand::random_range(0.0..1.0_f64) * 100.0).round() / 100.0;
    let requested = Volume {
        level,
        muted: false,
    };
    if let Err(e) = ctx.session.set_volume(requested).await {
        return Ok(CheckOutcome::fail(format!("error during volume command: {}", e)));
    }

    let reported = current_media(ctx).await?.volume;
    if reported != requested {
        return Ok(CheckOutcome::fail(format!(
            "expected volume level {}, receiver reports {}",
            requested.level, reported.level
        )));
    }
    Ok(CheckOutcome::pass())
}

pub async fn stop_media(ctx: &CheckContext) -> CheckResult {
    if let Err(e) = ctx.session.stop_media().await {
        return Ok(CheckOutcome::fail(format!("error while stopping media: {}", e)));
    }
    if ctx.session.media().await.is_none() {
        Ok(CheckOutcome::pass())
    } else {
        Ok(CheckOutcome::fail(
            "expected current media to be null after issuing stop() command",
        ))
    }
}

pub async fn stop_session(ctx: &CheckContext) -> CheckResult {
    match ctx.session.stop().await {
        Ok(()) => Ok(CheckOutcome::pass()),
        Err(e) => Ok(CheckOutcome::fail(format!("error while stopping session: {}", e))),
    }
}
