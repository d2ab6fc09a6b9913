//! Per-track read loop that answers every inbound packet with a timestamp
//! on the session's outbound data channel.

use crate::error::{SignalError, SignalResult};
use crate::peer::state::SharedSink;
use crate::peer::types::TimestampNotification;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::data_channel::RTCDataChannel;
use webrtc::track::track_remote::TrackRemote;

/// Something that yields inbound media packets one at a time.
#[async_trait]
pub trait PacketSource: Send + Sync {
    /// Waits for the next packet and returns its payload size.
    ///
    /// `SignalError::TrackEnded` means no further packet will ever arrive.
    async fn read_packet(&self) -> SignalResult<usize>;

    fn describe(&self) -> String;
}

/// Something that can carry a text notification back to the browser.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn channel_label(&self) -> String;

    async fn send_notification(&self, text: String) -> SignalResult<()>;
}

#[async_trait]
impl PacketSource for TrackRemote {
    async fn read_packet(&self) -> SignalResult<usize> {
        match self.read_rtp().await {
            Ok((pkt, _attrs)) => Ok(pkt.payload.len()),
            Err(webrtc::Error::ErrClosedPipe | webrtc::Error::ErrConnectionClosed) => {
                Err(SignalError::TrackEnded(format!("ssrc {}", self.ssrc())))
            }
            Err(e) => Err(SignalError::PacketReadFailure(e.to_string())),
        }
    }

    fn describe(&self) -> String {
        format!("{} track ssrc={}", self.kind(), self.ssrc())
    }
}

#[async_trait]
impl NotificationSink for RTCDataChannel {
    fn channel_label(&self) -> String {
        self.label().to_string()
    }

    async fn send_notification(&self, text: String) -> SignalResult<()> {
        self.send_text(text)
            .await
            .map(|_| ())
            .map_err(|e| SignalError::NotificationSendFailure(e.to_string()))
    }
}

/// Pause after a failed packet read before trying again
pub const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Counters reported when a feedback loop exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackStats {
    pub packets_read: u64,
    pub notifications_sent: u64,
    /// Packets that arrived while no channel was open
    pub skipped_no_channel: u64,
    pub read_failures: u64,
    pub send_failures: u64,
}

/// Read `source` until it ends or `cancel` fires.
///
/// Each packet produces at most one `{"now": ms}` message on whatever channel
/// `outbound` holds at that moment. Read and send failures are logged and
/// counted; neither stops the loop. Consecutive send failures warn once and
/// then drop to debug until a send succeeds again.
pub async fn run_feedback_loop<S>(
    source: Arc<S>,
    outbound: watch::Receiver<Option<SharedSink>>,
    cancel: CancellationToken,
) -> FeedbackStats
where
    S: PacketSource + ?Sized,
{
    let name = source.describe();
    let mut stats = FeedbackStats::default();
    let mut failing_sends = 0u64;
    info!(source = %name, "Feedback loop started");

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(source = %name, "Feedback loop cancelled");
                break;
            }
            read = source.read_packet() => read,
        };

        match read {
            Ok(_len) => {
                stats.packets_read += 1;
                let sink = outbound.borrow().clone();
                let Some(sink) = sink else {
                    stats.skipped_no_channel += 1;
                    continue;
                };
                match notify(sink.as_ref()).await {
                    Ok(()) => {
                        stats.notifications_sent += 1;
                        if failing_sends > 0 {
                            info!(
                                source = %name,
                                label = %sink.channel_label(),
                                failed = failing_sends,
                                "Timestamp notifications delivered again"
                            );
                            failing_sends = 0;
                        }
                    }
                    Err(e) => {
                        stats.send_failures += 1;
                        failing_sends += 1;
                        if failing_sends == 1 {
                            warn!(
                                source = %name,
                                label = %sink.channel_label(),
                                error = %e,
                                "Timestamp notification not delivered"
                            );
                        } else {
                            debug!(
                                source = %name,
                                label = %sink.channel_label(),
                                error = %e,
                                failed = failing_sends,
                                "Timestamp notification not delivered"
                            );
                        }
                    }
                }
            }
            Err(SignalError::TrackEnded(reason)) => {
                info!(source = %name, %reason, "Inbound track ended");
                break;
            }
            Err(e) => {
                stats.read_failures += 1;
                warn!(source = %name, error = %e, "Error reading RTP");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(READ_RETRY_DELAY) => {}
                }
            }
        }
    }

    info!(
        source = %name,
        packets_read = stats.packets_read,
        notifications_sent = stats.notifications_sent,
        skipped_no_channel = stats.skipped_no_channel,
        read_failures = stats.read_failures,
        send_failures = stats.send_failures,
        "Feedback loop stopped"
    );
    stats
}

async fn notify(sink: &dyn NotificationSink) -> SignalResult<()> {
    let text = TimestampNotification::now().to_text()?;
    sink.send_notification(text).await
}
