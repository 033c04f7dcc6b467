use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};
use url::Url;

use super::base::{ChangeEvent, ChangeFeed, ChangeKind, Subscription};
use super::phoenix::{Message, EVENT_CLOSE, EVENT_ERROR};
use crate::config::{RealtimeConfig, SupabaseConfig};
use crate::error::{BackendError, BackendResult};
use crate::models::Session;

/// Delays between reconnection attempts; the last one repeats.
const RECONNECT_BACKOFF_SECS: [u64; 4] = [1, 2, 5, 10];

/// Supabase Realtime over its Phoenix websocket.
pub struct SupabaseFeed {
    base_url: String,
    anon_key: String,
    channel: String,
    heartbeat: Duration,
}

/// Everything a worker needs to (re)connect on its own.
#[derive(Clone)]
struct Channel {
    socket_url: Url,
    topic: String,
    table: String,
    access_token: String,
    heartbeat: Duration,
}

/// Why a connection ended without an error.
#[derive(Debug, PartialEq, Eq)]
enum Exit {
    /// We were asked to leave, or nobody is listening anymore.
    Left,
    /// The server went away.
    Dropped,
}

impl SupabaseFeed {
    pub fn new(config: &SupabaseConfig, realtime: &RealtimeConfig) -> Self {
        Self {
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            channel: realtime.channel.clone(),
            heartbeat: Duration::from_secs(realtime.heartbeat_secs.max(1)),
        }
    }
}

/// `https://x.supabase.co` becomes `wss://x.supabase.co/realtime/v1/websocket?apikey=..&vsn=1.0.0`.
pub fn socket_url(base_url: &str, anon_key: &str) -> BackendResult<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| BackendError::Config(format!("Invalid project url '{}': {}", base_url, e)))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(BackendError::Config(format!(
                "Unsupported scheme '{}' in project url",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| BackendError::Config(format!("Cannot use scheme '{}'", scheme)))?;
    url.set_path("/realtime/v1/websocket");
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}

impl ChangeFeed for SupabaseFeed {
    fn get_name(&self) -> &str {
        "supabase-realtime"
    }

    fn subscribe(&self, session: &Session, table: &str) -> Subscription {
        let topic = format!("realtime:{}", self.channel);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let socket_url = match socket_url(&self.base_url, &self.anon_key) {
            Ok(url) => url,
            Err(e) => {
                error!("Realtime disabled for '{}': {}", topic, e);
                return Subscription::new(topic, events_rx);
            }
        };

        info!("Subscribing to '{}' for table '{}'", topic, table);
        let channel = Channel {
            socket_url,
            topic: topic.clone(),
            table: table.to_string(),
            access_token: session.access_token.clone(),
            heartbeat: self.heartbeat,
        };
        let (leave_tx, leave_rx) = oneshot::channel();
        let worker = tokio::spawn(run_worker(channel, events_tx, leave_rx));
        Subscription::with_worker(topic, events_rx, worker, leave_tx)
    }
}

/// Keeps one channel joined until told to leave, reconnecting with backoff.
async fn run_worker(
    channel: Channel,
    events: mpsc::UnboundedSender<ChangeEvent>,
    mut leave: oneshot::Receiver<()>,
) {
    let mut joined_before = false;
    let mut attempt = 0usize;

    loop {
        match listen(&channel, &events, &mut leave, &mut joined_before).await {
            Ok(Exit::Left) => {
                debug!("Feed worker for '{}' finished", channel.topic);
                return;
            }
            Ok(Exit::Dropped) => {
                warn!("Realtime connection for '{}' dropped", channel.topic);
                attempt = 0;
            }
            Err(e) => warn!("Realtime connection for '{}' failed: {}", channel.topic, e),
        }

        let delay = RECONNECT_BACKOFF_SECS[attempt.min(RECONNECT_BACKOFF_SECS.len() - 1)];
        attempt += 1;
        debug!("Reconnecting '{}' in {}s", channel.topic, delay);
        tokio::select! {
            _ = sleep(Duration::from_secs(delay)) => {}
            _ = &mut leave => return,
        }
    }
}

/// One connection's lifetime: connect, join, then pump frames until it ends.
async fn listen(
    channel: &Channel,
    events: &mpsc::UnboundedSender<ChangeEvent>,
    leave: &mut oneshot::Receiver<()>,
    joined_before: &mut bool,
) -> BackendResult<Exit> {
    let (socket, _) = connect_async(channel.socket_url.as_str())
        .await
        .map_err(|e| BackendError::Network(e.to_string()))?;
    let (mut sink, mut stream) = socket.split();

    let mut next_ref = 1u64;
    let join = Message::join(&channel.topic, &channel.table, &channel.access_token, next_ref);
    let join_ref = join.reference.clone();
    send(&mut sink, &join).await?;

    let mut heartbeat = interval_at(Instant::now() + channel.heartbeat, channel.heartbeat);

    loop {
        tokio::select! {
            _ = &mut *leave => {
                next_ref += 1;
                // Best effort; the server drops the channel with the socket anyway.
                let _ = send(&mut sink, &Message::leave(&channel.topic, next_ref)).await;
                let _ = sink.close().await;
                return Ok(Exit::Left);
            }
            _ = heartbeat.tick() => {
                next_ref += 1;
                send(&mut sink, &Message::heartbeat(next_ref)).await?;
            }
            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => return Ok(Exit::Dropped),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(BackendError::Network(e.to_string())),
                };
                let message: Message = match serde_json::from_str(&text) {
                    Ok(message) => message,
                    Err(e) => {
                        debug!("Ignoring unreadable realtime frame: {}", e);
                        continue;
                    }
                };

                if message.reference.is_some() && message.reference == join_ref {
                    match message.reply_status() {
                        Some("ok") => {
                            info!("Joined '{}'", channel.topic);
                            if *joined_before {
                                let reconnected = ChangeEvent {
                                    kind: ChangeKind::Reconnected,
                                    table: channel.table.clone(),
                                    record_id: None,
                                };
                                if events.send(reconnected).is_err() {
                                    return Ok(Exit::Left);
                                }
                            }
                            *joined_before = true;
                        }
                        Some(status) => {
                            return Err(BackendError::Rejected {
                                status: 0,
                                message: format!("join {}: {}", status, message.payload),
                            })
                        }
                        None => {}
                    }
                    continue;
                }

                if let Some(event) = message.change_event() {
                    debug!(kind = event.kind.as_str(), table = %event.table, "change received");
                    if events.send(event).is_err() {
                        return Ok(Exit::Left);
                    }
                    continue;
                }

                if message.topic == channel.topic
                    && (message.event == EVENT_ERROR || message.event == EVENT_CLOSE)
                {
                    return Ok(Exit::Dropped);
                }
            }
        }
    }
}

async fn send<S>(sink: &mut S, message: &Message) -> BackendResult<()>
where
    S: futures::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(message)?;
    sink.send(WsMessage::Text(text))
        .await
        .map_err(|e| BackendError::Network(e.to_string()))
}
