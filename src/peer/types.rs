use crate::error::{SignalError, SignalResult};
use crate::utils::epoch_millis;
use serde::{Deserialize, Serialize};
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Remote description posted by the browser
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OfferEnvelope {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
}

impl OfferEnvelope {
    /// Check the envelope and parse its SDP into an engine offer.
    pub fn into_session_description(self) -> SignalResult<RTCSessionDescription> {
        if self.sdp_type != "offer" {
            return Err(SignalError::InvalidOffer(format!(
                "expected type \"offer\", got {:?}",
                self.sdp_type
            )));
        }
        if self.sdp.trim().is_empty() {
            return Err(SignalError::InvalidOffer("sdp is empty".into()));
        }
        RTCSessionDescription::offer(self.sdp)
            .map_err(|e| SignalError::InvalidOffer(format!("sdp does not parse: {e}")))
    }
}

/// Finished local description handed back to the browser
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnswerEnvelope {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
    pub session_id: String,
}

impl AnswerEnvelope {
    pub fn from_description(desc: &RTCSessionDescription, session_id: &str) -> Self {
        Self {
            sdp: desc.sdp.clone(),
            sdp_type: desc.sdp_type.to_string(),
            session_id: session_id.to_string(),
        }
    }
}

/// The one payload ever written to the data channel
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampNotification {
    pub now: i64,
}

impl TimestampNotification {
    pub fn now() -> Self {
        Self { now: epoch_millis() }
    }

    pub fn to_text(&self) -> SignalResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
