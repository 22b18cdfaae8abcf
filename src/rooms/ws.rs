use std::sync::Arc;

use axum::{
    body::Bytes,
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::{sync::mpsc, time};
use tracing::{debug, warn};

use crate::config::{Config, Liveness};

use super::{
    msg::{ClientEvent, ServerEvent},
    relay::{Connection, Relay, RelayError},
};

#[debug_handler(state = crate::AppState)]
pub async fn room_ws(
    State(relay): State<Relay>,
    State(config): State<Arc<Config>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let liveness = config.liveness;
    ws.on_upgrade(move |stream| serve_socket(stream, relay, liveness))
}

async fn serve_socket(stream: WebSocket, relay: Relay, liveness: Liveness) {
    let (mut conn, rx) = relay.connect();
    let (sender, mut receiver) = stream.split();

    let mut writer = tokio::spawn(write_loop(sender, rx, liveness));

    loop {
        let next = tokio::select! {
            next = time::timeout(liveness.ping_timeout, receiver.next()) => next,
            _ = &mut writer => break,
        };
        let msg = match next {
            Err(_) => {
                debug!(conn = %conn.id(), "no traffic within ping timeout");
                break;
            }
            Ok(None) | Ok(Some(Err(_))) => break,
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            Message::Text(text) => handle_text(&relay, &mut conn, text.as_str()).await,
            Message::Close(_) => break,
            // pings, pongs and binary frames only count as liveness
            _ => {}
        }
    }

    writer.abort();
    relay.disconnect(conn);
}

async fn write_loop(
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<ServerEvent>,
    liveness: Liveness,
) {
    let mut ping = time::interval(liveness.ping_interval);
    ping.tick().await;

    loop {
        let msg = tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => {
                        warn!(error = %e, "could not encode event");
                        continue;
                    }
                }
            }
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };

        if sender.send(msg).await.is_err() {
            break;
        }
    }
    let _ = sender.close().await;
}

async fn handle_text(relay: &Relay, conn: &mut Connection, text: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            let error = RelayError::Malformed(e.to_string());
            warn!(conn = %conn.id(), %error, "dropping event");
            conn.report(&error);
            return;
        }
    };

    let result = match event {
        ClientEvent::JoinRoom(join) => relay.join(conn, join).await,
        relayable => match relayable.into_relay() {
            Some((routing, event)) => relay.forward(conn, &routing, event),
            None => Ok(()),
        },
    };

    if let Err(error) = result {
        warn!(conn = %conn.id(), %error, "event rejected");
        conn.report(&error);
    }
}
