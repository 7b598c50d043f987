//! Background reader: the sole consumer of inbound frames.
//!
//! One reader task exists per live connection. It pulls frames off the split
//! receive half and routes them: responses and attributed errors resolve the
//! matching pending call, pushes go to the subscription registry. A decode
//! failure or stream closure ends the loop; the session-side wrapper then
//! runs the disconnect-and-drain path.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    codec::FrameError,
    connection::FrameStream,
    frame::Frame,
    result::QueryResult,
    subscription::{PushEvent, SubscriptionRegistry},
    tracker::RequestTracker,
};

/// Why the reader loop stopped.
#[derive(Debug)]
pub(crate) enum ReaderExit {
    /// Local shutdown via the cancellation token (orderly disconnect).
    Shutdown,
    /// The server closed the stream.
    PeerClosed,
    /// A fatal wire error (I/O or malformed frame).
    Failed(FrameError),
}

/// Drive the read cycle until shutdown, closure, or failure.
pub(crate) async fn run(
    mut frames: FrameStream,
    tracker: &RequestTracker,
    registry: &SubscriptionRegistry,
    shutdown: CancellationToken,
) -> ReaderExit {
    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => return ReaderExit::Shutdown,
            frame = frames.next() => frame,
        };
        match frame {
            Some(Ok(Frame::Response { id, payload })) => {
                tracker.resolve(id, QueryResult::parse(payload));
            }
            Some(Ok(Frame::Push { topic, payload })) => {
                let event = PushEvent { topic, payload };
                registry.dispatch(&event);
            }
            Some(Ok(Frame::Error { id: Some(id), message })) => {
                tracker.resolve(id, QueryResult::failed(message));
            }
            Some(Ok(Frame::Error { id: None, message })) => {
                warn!(error = %message, "server error without request attribution");
            }
            Some(Ok(Frame::Request { id, .. })) => {
                // Clients never receive requests; treat as a protocol breach.
                warn!(id, "unexpected request frame from server; ignoring");
            }
            Some(Err(err)) => {
                debug!(%err, "reader terminating on wire error");
                return ReaderExit::Failed(err);
            }
            None => return ReaderExit::PeerClosed,
        }
    }
}
