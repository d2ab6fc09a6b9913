pub mod connection;
pub mod data_channel;
pub mod feedback;
pub mod negotiation;
pub mod state;
pub mod types;

pub use feedback::{
    run_feedback_loop, FeedbackStats, NotificationSink, PacketSource, READ_RETRY_DELAY,
};
pub use negotiation::Negotiator;
pub use state::{OutboundSlot, Session, SessionRegistry};
pub use types::{AnswerEnvelope, OfferEnvelope, TimestampNotification};
