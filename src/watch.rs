use log::{debug, info};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::hipchat::HipChatNotifier;
use crate::reply::Reply;
use crate::teamcity::{BuildRecord, BuildSession, SessionState};

#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    Completed(BuildRecord),
    Cancelled,
}

/// Polls a kicked build every `interval` until TeamCity reports it finished,
/// then posts exactly one completion notification.
///
/// The first refresh happens after one interval. Refresh errors end the
/// watch immediately; nothing is retried here.
pub async fn watch_build(
    mut session: BuildSession,
    notifier: &HipChatNotifier,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<WatchOutcome> {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                match session.current_record() {
                    Some(record) => info!("Stopped watching build {} ({})", record.id, record.build_type_id),
                    None => info!("Stopped watching an unqueued build"),
                }
                return Ok(WatchOutcome::Cancelled);
            }
            () = tokio::time::sleep(interval) => {}
        }

        let record = session.refresh_status().await?.clone();
        debug!(
            "Watching build {} ({:?}): {} / {}",
            record.id,
            session.request(),
            record.state,
            record.status
        );

        if session.state() == SessionState::Finished {
            notifier.notify(&Reply::completed(record.clone())).await?;
            return Ok(WatchOutcome::Completed(record));
        }
    }
}
