//! NIP-01/NIP-42 WebSocket server.

use std::{collections::HashMap, future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::{
    connection::ConnId,
    message::{Inbound, Outbound, ProtocolError},
    relay::{Addressed, Relay},
};

/// Messages queued for one socket before it is treated as a slow consumer.
pub const OUTBOX_CAPACITY: usize = 1024;

/// Relay state plus the outbound queue of every open socket.
///
/// Guarded by a single lock so each message is handled to completion before
/// the next one, from any connection, is looked at.
pub struct Hub {
    relay: Relay,
    outboxes: HashMap<ConnId, mpsc::Sender<Outbound>>,
}

pub type SharedHub = Arc<Mutex<Hub>>;

impl Hub {
    pub fn shared(relay: Relay) -> SharedHub {
        Arc::new(Mutex::new(Self {
            relay,
            outboxes: HashMap::new(),
        }))
    }

    /// Queue each message on its connection's outbox.
    ///
    /// A connection whose outbox is full is dropped: its outbox closes and
    /// its subscriptions are removed so no further events are queued for it.
    fn dispatch(&mut self, out: Vec<Addressed>) {
        for (conn, msg) in out {
            let Some(tx) = self.outboxes.get(&conn) else {
                continue;
            };
            match tx.try_send(msg) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(conn, capacity = OUTBOX_CAPACITY, "dropping slow consumer");
                    self.outboxes.remove(&conn);
                    self.relay.disconnect(conn);
                }
                // The socket is going away.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }
}

/// Start the relay WebSocket server and the store eviction timer.
pub async fn serve_ws(
    addr: SocketAddr,
    hub: SharedHub,
    evict_interval: Duration,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "websocket relay listening");
    let evictor = tokio::spawn(evict_loop(hub.clone(), evict_interval));
    let app = Router::new().route("/", get(handler)).with_state(hub);
    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await;
    evictor.abort();
    served?;
    Ok(())
}

/// Clear the event store every `period`.
pub async fn evict_loop(hub: SharedHub, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let cleared = hub.lock().await.relay.clear_events();
        info!(cleared, "event store cleared");
    }
}

/// Handle the HTTP upgrade and spawn the connection processor.
async fn handler(ws: WebSocketUpgrade, State(hub): State<SharedHub>) -> impl IntoResponse {
    ws.on_upgrade(|socket| async move { process(socket, hub).await })
}

/// Run one connection: send the challenge, then handle messages until close.
async fn process(socket: WebSocket, hub: SharedHub) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOX_CAPACITY);

    let conn = {
        let mut guard = hub.lock().await;
        let (conn, challenge) = guard.relay.connect();
        // Queued before the outbox is visible to anyone else.
        let _ = tx.try_send(challenge);
        guard.outboxes.insert(conn, tx);
        conn
    };

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(Message::Text(msg.to_text())).await.is_err() {
                return;
            }
        }
        // Outbox closed by the hub.
        let _ = sink.send(Message::Close(None)).await;
    });

    while let Some(Ok(msg)) = stream.next().await {
        let txt = match msg {
            Message::Text(txt) => txt,
            Message::Close(_) => break,
            _ => continue,
        };
        match Inbound::parse(&txt) {
            Ok(inbound) => {
                let mut guard = hub.lock().await;
                if !guard.outboxes.contains_key(&conn) {
                    break;
                }
                let out = guard.relay.handle(conn, inbound);
                guard.dispatch(out);
            }
            Err(ProtocolError::UnknownType(verb)) => {
                debug!(conn, %verb, "ignoring unknown message type");
            }
            Err(err) => warn!(conn, %err, "dropping malformed message"),
        }
    }

    {
        let mut guard = hub.lock().await;
        guard.outboxes.remove(&conn);
        guard.relay.disconnect(conn);
    }
    writer.abort();
}
