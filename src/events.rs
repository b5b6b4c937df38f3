use chrono::{DateTime, SecondsFormat, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio_tungstenite::tungstenite::Message;

/// Detection event pushed by the device (`probe_request`, `connected`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DeviceEvent {
    #[serde(rename = "event")]
    pub event_type: String,
    #[serde(rename = "macAddr")]
    pub mac_addr: String,
}

impl DeviceEvent {
    /// One display line, stamped with the time the panel received it.
    pub fn log_line(&self, received: DateTime<Utc>) -> String {
        format!(
            "[{}] event: {}, mac: {}",
            received.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.event_type,
            self.mac_addr
        )
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EventLogView {
    pub lines: Vec<String>,
    pub capacity: usize,
    pub evicted: u64,
}

/// Recent activity: keeps the newest `capacity` lines, dropping the oldest.
#[derive(Clone, Debug)]
pub struct EventLog {
    lines: VecDeque<String>,
    capacity: usize,
    evicted: u64,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
            self.evicted += 1;
        }
        self.lines.push_back(line);
    }

    /// Decodes one inbound message and appends its line. Malformed messages
    /// are dropped.
    pub fn ingest(&mut self, raw: &str, received: DateTime<Utc>) -> Option<String> {
        let event: DeviceEvent = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!("Dropping malformed event {raw:?}: {err}");
                return None;
            }
        };
        let line = event.log_line(received);
        self.push(line.clone());
        Some(line)
    }

    pub fn lines(&self) -> impl Iterator<Item = &String> {
        self.lines.iter()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn view(&self) -> EventLogView {
        EventLogView {
            lines: self.lines.iter().cloned().collect(),
            capacity: self.capacity,
            evicted: self.evicted,
        }
    }
}

/// Shared handle the subscription writes into and the web layer reads from.
#[derive(Clone)]
pub struct EventMonitor {
    log: Arc<RwLock<EventLog>>,
    lines_tx: broadcast::Sender<String>,
}

impl EventMonitor {
    pub fn new(capacity: usize) -> Self {
        let (lines_tx, _) = broadcast::channel(64);
        Self {
            log: Arc::new(RwLock::new(EventLog::new(capacity))),
            lines_tx,
        }
    }

    pub fn log(&self) -> &Arc<RwLock<EventLog>> {
        &self.log
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.lines_tx.subscribe()
    }

    pub async fn ingest(&self, raw: &str) -> Option<String> {
        let line = self.log.write().await.ingest(raw, Utc::now())?;
        let _ = self.lines_tx.send(line.clone());
        Some(line)
    }

    /// Feeds every text message of `messages` into the log until it ends.
    pub async fn pump<S>(&self, messages: S) -> usize
    where
        S: Stream<Item = String>,
    {
        let mut accepted = 0;
        futures::pin_mut!(messages);
        while let Some(raw) = messages.next().await {
            if self.ingest(&raw).await.is_some() {
                accepted += 1;
            }
        }
        accepted
    }

    /// Stays subscribed to the device's event socket for the life of the
    /// process, reconnecting after `retry` whenever it drops.
    pub async fn run(self, url: String, retry: Duration) {
        loop {
            match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok((socket, _)) => {
                    tracing::info!("Subscribed to device events at {url}");
                    let texts = socket
                        .take_while(|msg| {
                            let open = match msg {
                                Ok(msg) => !msg.is_close(),
                                Err(err) => {
                                    tracing::warn!("Event socket error: {err}");
                                    false
                                }
                            };
                            futures::future::ready(open)
                        })
                        .filter_map(|msg| {
                            futures::future::ready(match msg {
                                Ok(Message::Text(text)) => Some(text.to_string()),
                                _ => None,
                            })
                        });
                    let accepted = self.pump(texts).await;
                    tracing::warn!("Event socket closed after {accepted} event(s)");
                }
                Err(err) => {
                    tracing::warn!("Unable to reach event socket {url}: {err}");
                }
            }
            tokio::time::sleep(retry).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::WebSocketUpgrade;
    use axum::extract::ws::Message as WsMessage;
    use axum::{Router, routing::get};
    use chrono::TimeZone;
    use tokio::net::TcpListener;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap()
    }

    #[test]
    fn formats_line_with_arrival_time() {
        let event = DeviceEvent {
            event_type: "connected".into(),
            mac_addr: "aa:bb:cc:dd:ee:ff".into(),
        };
        assert_eq!(
            event.log_line(at()),
            "[2026-03-01T12:30:05.000Z] event: connected, mac: aa:bb:cc:dd:ee:ff"
        );
    }

    #[test]
    fn malformed_message_adds_nothing() {
        let mut log = EventLog::new(10);
        let messages = [
            r#"{"event":"join","macAddr":"aa:bb:cc:dd:ee:ff"}"#,
            r#"{"foo":1}"#,
            "not json",
            r#"{"event":"leave","macAddr":"11:22:33:44:55:66"}"#,
        ];
        for raw in messages {
            log.ingest(raw, at());
        }
        let lines: Vec<_> = log.lines().cloned().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("join") && lines[0].contains("aa:bb:cc:dd:ee:ff"));
        assert!(lines[1].contains("leave") && lines[1].contains("11:22:33:44:55:66"));
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut log = EventLog::new(3);
        for i in 0..5 {
            log.push(format!("line {i}"));
        }
        let view = log.view();
        assert_eq!(view.lines, vec!["line 2", "line 3", "line 4"]);
        assert_eq!(view.evicted, 2);
        assert_eq!(view.capacity, 3);
    }

    #[test]
    fn zero_capacity_still_keeps_latest() {
        let mut log = EventLog::new(0);
        log.push("a".into());
        log.push("b".into());
        assert_eq!(log.view().lines, vec!["b"]);
    }

    #[tokio::test]
    async fn pump_relays_accepted_lines() {
        let monitor = EventMonitor::new(10);
        let mut rx = monitor.subscribe();
        let messages = futures::stream::iter(vec![
            r#"{"event":"probe_request","macAddr":"1:2:3:4:5:6"}"#.to_string(),
            r#"{"foo":1}"#.to_string(),
        ]);
        assert_eq!(monitor.pump(messages).await, 1);
        let relayed = rx.recv().await.unwrap();
        assert!(relayed.ends_with("event: probe_request, mac: 1:2:3:4:5:6"));
        assert_eq!(monitor.log().read().await.view().lines.len(), 1);
    }

    #[tokio::test]
    async fn run_reads_from_device_socket() {
        let router = Router::new().route(
            "/",
            get(|ws: WebSocketUpgrade| async move {
                ws.on_upgrade(|mut socket| async move {
                    for frame in [
                        r#"{"event":"join","macAddr":"aa:bb:cc:dd:ee:ff"}"#,
                        r#"{"foo":1}"#,
                        r#"{"event":"leave","macAddr":"11:22:33:44:55:66"}"#,
                    ] {
                        if socket.send(WsMessage::Text(frame.into())).await.is_err() {
                            return;
                        }
                    }
                    let _ = socket.send(WsMessage::Close(None)).await;
                })
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let monitor = EventMonitor::new(10);
        let mut rx = monitor.subscribe();
        let task = tokio::spawn(
            monitor
                .clone()
                .run(format!("ws://{addr}/"), Duration::from_secs(60)),
        );

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        task.abort();
        assert!(first.contains("event: join, mac: aa:bb:cc:dd:ee:ff"));
        assert!(second.contains("event: leave, mac: 11:22:33:44:55:66"));
    }
}
