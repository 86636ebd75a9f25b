//! Scenario F from the testable-properties section: three real WebSocket
//! clients subscribed to the same `(workspace, system)`, two different
//! users, one user running two sessions. A `graph_update` from one session
//! must reach every other subscribed client and skip only the originator.

use broadcast::{BroadcastServer, Envelope, Subscription, UpdateOrigin, UpdateSource};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect_and_subscribe(addr: std::net::SocketAddr, subscription: Subscription) -> WsStream {
    let (mut stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();

    loop {
        let Some(Ok(WsMessage::Text(text))) = stream.next().await else { panic!("socket closed before connected") };
        let envelope: Envelope = serde_json::from_str(&text).unwrap();
        if matches!(envelope, Envelope::Connected { .. }) {
            break;
        }
    }

    let subscribe = Envelope::Subscribe {
        workspace_id: subscription.workspace_id,
        system_id: subscription.system_id,
        user_id: subscription.user_id,
    };
    stream.send(WsMessage::Text(serde_json::to_string(&subscribe).unwrap())).await.unwrap();

    // Drain the `subscribed` ack.
    let Some(Ok(WsMessage::Text(text))) = stream.next().await else { panic!("no subscribed ack") };
    let envelope: Envelope = serde_json::from_str(&text).unwrap();
    assert!(matches!(envelope, Envelope::Subscribed { .. }));

    stream
}

async fn recv_update(stream: &mut WsStream) -> Option<Envelope> {
    match tokio::time::timeout(Duration::from_millis(500), stream.next()).await {
        Ok(Some(Ok(WsMessage::Text(text)))) => Some(serde_json::from_str(&text).unwrap()),
        _ => None,
    }
}

#[tokio::test]
async fn graph_update_reaches_other_sessions_but_not_the_originator() {
    let server = BroadcastServer::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = server.clone().router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let sub = |user_id: &str| Subscription { workspace_id: "W".into(), system_id: "S".into(), user_id: user_id.into() };

    let mut alpha = connect_and_subscribe(addr, sub("u1")).await; // u1, session alpha
    let mut beta = connect_and_subscribe(addr, sub("u1")).await; // u1, session beta
    let mut gamma = connect_and_subscribe(addr, sub("u2")).await; // u2, session gamma

    let update = Envelope::GraphUpdate {
        diff: "+ A.FUNC.001|x".into(),
        source: UpdateSource { user_id: "u1".into(), session_id: "alpha".into(), origin: UpdateOrigin::UserEdit },
        timestamp: chrono::Utc::now(),
    };
    alpha.send(WsMessage::Text(serde_json::to_string(&update).unwrap())).await.unwrap();

    let received_beta = recv_update(&mut beta).await;
    let received_gamma = recv_update(&mut gamma).await;
    let received_alpha = recv_update(&mut alpha).await;

    assert!(matches!(received_beta, Some(Envelope::GraphUpdate { .. })), "u1's other session must receive the update");
    assert!(matches!(received_gamma, Some(Envelope::GraphUpdate { .. })), "u2 in the same workspace/system must receive the update");
    assert!(received_alpha.is_none(), "the originating socket must not receive its own update back");
}

#[tokio::test]
async fn client_outside_the_workspace_system_pair_is_not_notified() {
    let server = BroadcastServer::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = server.clone().router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let mut same_pair = connect_and_subscribe(
        addr,
        Subscription { workspace_id: "W".into(), system_id: "S".into(), user_id: "u1".into() },
    )
    .await;
    let mut other_pair = connect_and_subscribe(
        addr,
        Subscription { workspace_id: "W".into(), system_id: "OTHER".into(), user_id: "u2".into() },
    )
    .await;

    let update = Envelope::GraphUpdate {
        diff: "+ A.FUNC.001|x".into(),
        source: UpdateSource { user_id: "u3".into(), session_id: "zeta".into(), origin: UpdateOrigin::UserEdit },
        timestamp: chrono::Utc::now(),
    };
    // A third, unsubscribed socket originates the update.
    let (mut unsubscribed, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let Some(Ok(WsMessage::Text(text))) = unsubscribed.next().await else { panic!("no connected envelope") };
    assert!(matches!(serde_json::from_str::<Envelope>(&text).unwrap(), Envelope::Connected { .. }));
    unsubscribed.send(WsMessage::Text(serde_json::to_string(&update).unwrap())).await.unwrap();

    // The unsubscribed socket never completed `subscribe`, so the server
    // has no `(workspace, system)` to fan out on and nobody is notified.
    assert!(recv_update(&mut same_pair).await.is_none());
    assert!(recv_update(&mut other_pair).await.is_none());
}
