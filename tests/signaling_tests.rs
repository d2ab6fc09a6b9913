//! HTTP-level tests against a live router on an ephemeral port.

use bytes::Bytes;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};
use tsfeed_lib::peer::{AnswerEnvelope, Negotiator, SessionRegistry, TimestampNotification};
use tsfeed_lib::signaling::{router, AppState};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp::header::Header;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};

async fn spawn_server(asset_dir: PathBuf) -> (String, AppState) {
    let negotiator = Negotiator::new(
        Vec::new(),
        Some(Duration::from_secs(20)),
        SessionRegistry::new(),
    )
    .unwrap();
    let state = AppState::new(negotiator, asset_dir);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

fn client_api() -> API {
    let mut m = MediaEngine::default();
    m.register_default_codecs().unwrap();
    let registry = register_default_interceptors(Registry::new(), &mut m).unwrap();
    APIBuilder::new()
        .with_media_engine(m)
        .with_interceptor_registry(registry)
        .build()
}

async fn gathered_offer(pc: &RTCPeerConnection) -> RTCSessionDescription {
    let offer = pc.create_offer(None).await.unwrap();
    let mut gathered = pc.gathering_complete_promise().await;
    pc.set_local_description(offer).await.unwrap();
    let _ = gathered.recv().await;
    pc.local_description().await.unwrap()
}

/// Browser stand-in: one data channel plus a video section, fully gathered.
async fn client_offer() -> (Arc<RTCPeerConnection>, RTCSessionDescription) {
    let api = client_api();
    let pc = Arc::new(
        api.new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap(),
    );
    pc.create_data_channel("feedback", None).await.unwrap();
    pc.add_transceiver_from_kind(RTPCodecType::Video, None)
        .await
        .unwrap();

    let local = gathered_offer(&pc).await;
    (pc, local)
}

fn opened(dc: &Arc<RTCDataChannel>) -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    dc.on_open(Box::new(move || {
        let _ = tx.send(());
        Box::pin(async {})
    }));
    rx
}

async fn write_packets(track: &TrackLocalStaticRTP, first_seq: u16, count: u16) {
    for i in 0..count {
        let seq = first_seq.wrapping_add(i);
        let pkt = Packet {
            header: Header {
                version: 2,
                payload_type: 96,
                sequence_number: seq,
                timestamp: u32::from(seq) * 3000,
                ..Default::default()
            },
            payload: Bytes::from_static(&[0x10, 0x00, 0x9d, 0x01, 0x2a]),
        };
        track.write_rtp(&pkt).await.unwrap();
        sleep(Duration::from_millis(20)).await;
    }
}


async fn post_offer(base: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base}/offer"))
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn ping_answers_pong() {
    let (base, _state) = spawn_server(PathBuf::from("static")).await;
    let resp = reqwest::get(format!("{base}/ping")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "message": "pong" }));
}

#[tokio::test]
async fn assets_are_read_from_asset_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<html>hi</html>").unwrap();
    std::fs::write(dir.path().join("client.js"), "console.log(1);").unwrap();
    let (base, _state) = spawn_server(dir.path().to_path_buf()).await;

    let page = reqwest::get(format!("{base}/")).await.unwrap();
    assert_eq!(page.status(), 200);
    assert!(page.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert_eq!(page.text().await.unwrap(), "<html>hi</html>");

    let script = reqwest::get(format!("{base}/client.js")).await.unwrap();
    assert_eq!(script.status(), 200);
    assert!(script.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("application/javascript"));
}

#[tokio::test]
async fn missing_asset_is_a_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let (base, _state) = spawn_server(dir.path().to_path_buf()).await;
    let resp = reqwest::get(format!("{base}/client.js")).await.unwrap();
    assert_eq!(resp.status(), 500);
    assert_eq!(resp.text().await.unwrap(), "Internal Server Error");
}

#[tokio::test]
async fn malformed_offers_are_rejected_without_touching_state() {
    let (base, state) = spawn_server(PathBuf::from("static")).await;

    for body in [
        json!({ "type": "offer" }),
        json!({ "sdp": "v=0\r\n", "type": "bogus" }),
        json!({ "sdp": "", "type": "offer" }),
        json!({ "sdp": "not sdp at all", "type": "offer" }),
        json!([1, 2, 3]),
    ] {
        let resp = post_offer(&base, body.clone()).await;
        assert!(
            resp.status().is_client_error(),
            "{body} answered {}",
            resp.status()
        );
    }
    assert!(state.registry().is_empty());
}

#[tokio::test]
async fn valid_offer_gets_an_answer() {
    let (base, state) = spawn_server(PathBuf::from("static")).await;
    let (client, offer) = client_offer().await;

    let resp = post_offer(&base, json!({ "sdp": offer.sdp, "type": "offer" })).await;
    assert_eq!(resp.status(), 200);
    let answer: AnswerEnvelope = resp.json().await.unwrap();

    assert_eq!(answer.sdp_type, "answer");
    assert!(!answer.sdp.is_empty());
    assert_eq!(state.registry().current().unwrap().id, answer.session_id);

    // the browser side must accept what we produced
    let remote = RTCSessionDescription::answer(answer.sdp).unwrap();
    client.set_remote_description(remote).await.unwrap();
    client.close().await.unwrap();
    state.registry().close_all().await;
}

#[tokio::test]
async fn second_offer_replaces_first_session() {
    let (base, state) = spawn_server(PathBuf::from("static")).await;

    let (first_client, first_offer) = client_offer().await;
    let first: AnswerEnvelope = post_offer(&base, json!({ "sdp": first_offer.sdp, "type": "offer" }))
        .await
        .json()
        .await
        .unwrap();
    let first_session = state.registry().current().unwrap();
    assert_eq!(first_session.id, first.session_id);

    let (second_client, second_offer) = client_offer().await;
    let second: AnswerEnvelope =
        post_offer(&base, json!({ "sdp": second_offer.sdp, "type": "offer" }))
            .await
            .json()
            .await
            .unwrap();

    assert_ne!(first.session_id, second.session_id);
    assert_eq!(state.registry().len(), 1);
    assert_eq!(state.registry().current().unwrap().id, second.session_id);
    assert!(first_session.cancel.is_cancelled());

    first_client.close().await.unwrap();
    second_client.close().await.unwrap();
    state.registry().close_all().await;
}

#[tokio::test]
async fn media_packets_are_answered_once_the_channel_is_open() {
    const AFTER_OPEN: usize = 5;

    let (base, state) = spawn_server(PathBuf::from("static")).await;
    let api = client_api();
    let client = Arc::new(
        api.new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap(),
    );

    let track = Arc::new(TrackLocalStaticRTP::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            ..Default::default()
        },
        "video".to_owned(),
        "tsfeed-client".to_owned(),
    ));
    client
        .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
        .await
        .unwrap();

    // pre-agreed channel: brings up SCTP without announcing anything to the server
    let anchor = client
        .create_data_channel(
            "anchor",
            Some(RTCDataChannelInit {
                negotiated: Some(1001),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    let anchor_open = opened(&anchor);

    let offer = gathered_offer(&client).await;
    let resp = post_offer(&base, json!({ "sdp": offer.sdp, "type": "offer" })).await;
    assert_eq!(resp.status(), 200);
    let answer: AnswerEnvelope = resp.json().await.unwrap();
    client
        .set_remote_description(RTCSessionDescription::answer(answer.sdp).unwrap())
        .await
        .unwrap();

    timeout(Duration::from_secs(15), anchor_open)
        .await
        .expect("transport never came up")
        .unwrap();

    // media while the server has no outbound channel
    write_packets(&track, 0, 5).await;
    sleep(Duration::from_millis(300)).await;

    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();
    let feedback = client.create_data_channel("feedback", None).await.unwrap();
    feedback.on_message(Box::new(move |msg: DataChannelMessage| {
        let _ = frames_tx.send(String::from_utf8_lossy(&msg.data).into_owned());
        Box::pin(async {})
    }));
    timeout(Duration::from_secs(10), opened(&feedback))
        .await
        .expect("feedback channel never opened")
        .unwrap();
    sleep(Duration::from_millis(200)).await;
    assert!(frames_rx.try_recv().is_err(), "frame arrived before any packet");

    write_packets(&track, 5, AFTER_OPEN as u16).await;

    let mut stamps = Vec::new();
    while stamps.len() < AFTER_OPEN {
        let frame = timeout(Duration::from_secs(10), frames_rx.recv())
            .await
            .expect("missing timestamp frame")
            .unwrap();
        let note: TimestampNotification = serde_json::from_str(&frame).unwrap();
        stamps.push(note.now);
    }
    sleep(Duration::from_millis(300)).await;
    assert!(
        frames_rx.try_recv().is_err(),
        "packets sent before the channel opened were answered"
    );
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));

    client.close().await.unwrap();
    state.registry().close_all().await;
}
