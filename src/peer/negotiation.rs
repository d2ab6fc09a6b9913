//! Offer in, finished answer out.

use crate::config::AppConfig;
use crate::error::{SignalError, SignalResult};
use crate::peer::connection::{build_api, new_session};
use crate::peer::state::{Session, SessionRegistry};
use crate::peer::types::{AnswerEnvelope, OfferEnvelope};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use webrtc::api::API;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

pub struct Negotiator {
    api: API,
    stun_urls: Vec<String>,
    gather_timeout: Option<Duration>,
    registry: SessionRegistry,
}

impl Negotiator {
    pub fn new(
        stun_urls: Vec<String>,
        gather_timeout: Option<Duration>,
        registry: SessionRegistry,
    ) -> SignalResult<Self> {
        Ok(Self {
            api: build_api()?,
            stun_urls,
            gather_timeout,
            registry,
        })
    }

    pub fn from_config(config: &AppConfig, registry: SessionRegistry) -> SignalResult<Self> {
        Self::new(config.stun_urls.clone(), config.gather_timeout(), registry)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Answer `offer` on a fresh connection that replaces the current session.
    ///
    /// Invalid envelopes are refused before anything is created or replaced.
    /// On an engine failure the new connection is dropped from the registry and closed.
    pub async fn negotiate(&self, offer: OfferEnvelope) -> SignalResult<AnswerEnvelope> {
        let remote = offer.into_session_description()?;

        if let Some(active) = self.registry.current() {
            info!(session_id = %active.id, "New offer supersedes active session");
        }

        let session = new_session(&self.api, &self.stun_urls, &self.registry).await?;
        self.registry.replace(session.clone()).await;

        match self.exchange(&session, remote).await {
            Ok(answer) => {
                info!(session_id = %session.id, "Answer ready");
                Ok(answer)
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Negotiation failed");
                self.registry.remove(&session.id);
                session.close().await;
                Err(e)
            }
        }
    }

    async fn exchange(
        &self,
        session: &Arc<Session>,
        remote: RTCSessionDescription,
    ) -> SignalResult<AnswerEnvelope> {
        let pc = &session.connection;

        pc.set_remote_description(remote).await?;
        let answer = pc.create_answer(None).await?;

        // the promise must exist before gathering can start
        let mut gather_complete = pc.gathering_complete_promise().await;
        pc.set_local_description(answer).await?;

        match self.gather_timeout {
            Some(limit) => {
                tokio::time::timeout(limit, gather_complete.recv())
                    .await
                    .map_err(|_| {
                        SignalError::NegotiationFailure(format!(
                            "ICE gathering did not finish within {}s",
                            limit.as_secs()
                        ))
                    })?;
            }
            None => {
                let _ = gather_complete.recv().await;
            }
        }

        let local = pc.local_description().await.ok_or_else(|| {
            SignalError::NegotiationFailure("no local description after gathering".into())
        })?;
        Ok(AnswerEnvelope::from_description(&local, &session.id))
    }
}
