use crate::error::SignalResult;
use crate::logger::dump_selected_pair;
use crate::peer::data_channel::attach_dc;
use crate::peer::feedback::run_feedback_loop;
use crate::peer::state::{OutboundSlot, Session, SessionRegistry};
use crate::utils::random_id;
use std::sync::{Arc, Weak};
use tracing::{info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::interceptor::registry::Registry;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;
use webrtc::{
    data_channel::RTCDataChannel,
    ice_transport::ice_server::RTCIceServer,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        RTCPeerConnection,
    },
};

/// Engine with the default codecs and interceptors so browser media sections are accepted.
pub fn build_api() -> SignalResult<API> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

/// Peer configuration for the given STUN urls
pub fn rtc_config(stun_urls: &[String]) -> RTCConfiguration {
    let ice_servers = if stun_urls.is_empty() {
        Vec::new()
    } else {
        vec![RTCIceServer {
            urls: stun_urls.to_vec(),
            ..Default::default()
        }]
    };

    RTCConfiguration {
        ice_servers,
        ..Default::default()
    }
}

/// Create a peer connection and register every callback before any description is applied.
///
/// The returned session is not yet tracked by `registry`; the registry handle is
/// only used to drop the session once the engine reports it closed.
pub async fn new_session(
    api: &API,
    stun_urls: &[String],
    registry: &SessionRegistry,
) -> SignalResult<Arc<Session>> {
    let pc = Arc::new(api.new_peer_connection(rtc_config(stun_urls)).await?);
    let session = Arc::new(Session::new(random_id(), pc.clone(), OutboundSlot::new()));
    info!(session_id = %session.id, "Peer connection created");

    // callbacks hold a Weak so the connection does not keep itself alive
    let weak_pc = Arc::downgrade(&pc);

    pc.on_ice_connection_state_change(Box::new({
        let session_id = session.id.clone();
        let weak_pc = weak_pc.clone();
        move |st: RTCIceConnectionState| {
            info!(session_id = %session_id, state = %st, "Connection State has changed");
            if st == RTCIceConnectionState::Connected {
                spawn_pair_dump(weak_pc.clone(), session_id.clone());
            }
            Box::pin(async {})
        }
    }));

    pc.on_peer_connection_state_change(Box::new({
        let session_id = session.id.clone();
        let cancel = session.cancel.clone();
        let registry = registry.clone();
        move |st: RTCPeerConnectionState| {
            info!(session_id = %session_id, state = %st, "Peer connection state changed");
            match st {
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed => {
                    cancel.cancel();
                    if registry.remove(&session_id).is_some() {
                        info!(session_id = %session_id, "Session dropped from registry");
                    }
                }
                _ => {}
            }
            Box::pin(async {})
        }
    }));

    pc.on_track(Box::new({
        let session_id = session.id.clone();
        let outbound = session.outbound.clone();
        let cancel = session.cancel.clone();
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            info!(
                session_id = %session_id,
                kind = %track.kind(),
                ssrc = track.ssrc(),
                channel_open = outbound.is_open(),
                "Track received"
            );
            let rx = outbound.subscribe();
            let token = cancel.child_token();
            tokio::spawn(async move {
                run_feedback_loop(track, rx, token).await;
            });
            Box::pin(async {})
        }
    }));

    pc.on_data_channel(Box::new({
        let session_id = session.id.clone();
        let outbound = session.outbound.clone();
        move |dc: Arc<RTCDataChannel>| {
            attach_dc(&dc, &outbound, &session_id);
            Box::pin(async {})
        }
    }));

    Ok(session)
}

fn spawn_pair_dump(weak_pc: Weak<RTCPeerConnection>, session_id: String) {
    tokio::spawn(async move {
        match weak_pc.upgrade() {
            Some(pc) => dump_selected_pair(&pc, &session_id, "CONNECTED").await,
            None => warn!(session_id = %session_id, "Connection gone before stats snapshot"),
        }
    });
}
