use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

pub type SignalResult<T> = Result<T, SignalError>;

/// Everything that can go wrong between an offer arriving and a timestamp leaving.
#[derive(Error, Debug)]
pub enum SignalError {
    /// Request body is not a usable offer
    #[error("invalid offer: {0}")]
    InvalidOffer(String),

    /// Engine refused to build the connection or the answer
    #[error("negotiation failed: {0}")]
    NegotiationFailure(String),

    /// Transient failure reading an inbound packet
    #[error("packet read failed: {0}")]
    PacketReadFailure(String),

    /// Inbound track is gone for good
    #[error("track ended: {0}")]
    TrackEnded(String),

    #[error("notification send failed: {0}")]
    NotificationSendFailure(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<webrtc::Error> for SignalError {
    fn from(err: webrtc::Error) -> Self {
        SignalError::NegotiationFailure(err.to_string())
    }
}

impl From<config::ConfigError> for SignalError {
    fn from(err: config::ConfigError) -> Self {
        SignalError::Config(err.to_string())
    }
}

impl IntoResponse for SignalError {
    fn into_response(self) -> Response {
        match self {
            SignalError::InvalidOffer(reason) => {
                (StatusCode::BAD_REQUEST, format!("Bad Request: {reason}")).into_response()
            }
            // the caller never learns which engine step broke
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response(),
        }
    }
}
