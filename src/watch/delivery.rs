use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::WatchEvent;
use crate::ChangeFeed;

/// Forward raw changes as typed events until cancelled or the feed ends.
///
/// `strip` is removed from the front of every changed key. Dropping the
/// sender on exit closes the consumer channel; dropping the feed releases
/// the backing store subscription.
pub(super) async fn run(
    mut feed: ChangeFeed,
    sender: mpsc::Sender<WatchEvent>,
    token: CancellationToken,
    strip: String,
) {
    debug!(prefix = strip.as_str(), "Watch delivery started");

    loop {
        let change = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            change = feed.recv() => match change {
                Some(change) => change,
                None => {
                    debug!("Watch feed ended");
                    break;
                }
            },
        };

        let key = change.key.strip_prefix(strip.as_str()).unwrap_or(&change.key).to_string();
        let event = WatchEvent::from_change(key, change);
        trace!(key = event.key.as_str(), event_type = ?event.event_type, revision = event.revision, "Watch event");

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            sent = sender.send(event) => {
                if sent.is_err() {
                    // Consumer dropped the receiver
                    break;
                }
            }
        }
    }

    debug!(prefix = strip.as_str(), "Watch delivery stopped");
}
