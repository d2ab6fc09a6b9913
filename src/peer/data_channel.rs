use crate::peer::state::{OutboundSlot, SharedSink};
use std::sync::Arc;
use tracing::info;
use webrtc::data_channel::RTCDataChannel;

/// Wire a data channel announced by the browser into the session's outbound slot.
///
/// The channel only becomes the outbound target once its open callback fires,
/// so no notification can precede `open`. Closing it empties the slot again
/// unless a newer channel has taken over. Browser messages are not read.
pub fn attach_dc(dc: &Arc<RTCDataChannel>, outbound: &OutboundSlot, session_id: &str) {
    info!(session_id, label = %dc.label(), id = dc.id(), "DataChannel received");

    dc.on_open(Box::new({
        let dc = dc.clone();
        let outbound = outbound.clone();
        let session_id = session_id.to_string();
        move || {
            info!(session_id = %session_id, label = %dc.label(), "DataChannel opened");
            outbound.set(dc.clone());
            Box::pin(async {})
        }
    }));

    dc.on_close(Box::new({
        let sink: SharedSink = dc.clone();
        let outbound = outbound.clone();
        let session_id = session_id.to_string();
        move || {
            let cleared = outbound.clear_if(&sink);
            info!(
                session_id = %session_id,
                label = %sink.channel_label(),
                cleared,
                "DataChannel closed"
            );
            Box::pin(async {})
        }
    }));
}
