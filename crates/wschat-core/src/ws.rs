//! WebSocket channel backed by tokio-tungstenite
//!
//! One background task owns the socket. The handle talks to it through an
//! outbound queue, and the task reports back through the event queue given
//! to [`Channel::open`].

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelError, ChannelEvent, ChannelOptions};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `shutdown` waits for the close handshake to be written
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

enum Connect {
    Ready(WsStream),
    Failed(String),
    Cancelled,
}

enum Session {
    /// Closed from our side, or the owner stopped listening
    Finished,
    Dropped(String),
}

pub struct WsChannel {
    endpoint: String,
    options: ChannelOptions,
    outbound: Option<UnboundedSender<Outbound>>,
    task: Option<JoinHandle<()>>,
    opened: bool,
}

impl WsChannel {
    pub fn new(endpoint: &str, options: ChannelOptions) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            options,
            outbound: None,
            task: None,
            opened: false,
        }
    }
}

impl Channel for WsChannel {
    fn open(&mut self, events: UnboundedSender<ChannelEvent>) {
        if self.opened {
            warn!(endpoint = %self.endpoint, "channel already opened");
            return;
        }
        self.opened = true;

        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        self.task = Some(tokio::spawn(run(
            self.endpoint.clone(),
            self.options,
            rx,
            events,
        )));
    }

    fn send(&mut self, text: &str) -> Result<(), ChannelError> {
        if !self.opened {
            return Err(ChannelError::NotOpen);
        }
        let outbound = self.outbound.as_ref().ok_or(ChannelError::Closed)?;
        outbound
            .send(Outbound::Text(text.to_string()))
            .map_err(|_| ChannelError::Closed)
    }

    fn close(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            // The task may already be gone; nothing left to release then.
            let _ = outbound.send(Outbound::Close);
        }
    }

    fn shutdown(&mut self) -> BoxFuture<'_, ()> {
        self.close();
        let task = self.task.take();
        let endpoint = self.endpoint.clone();
        async move {
            let Some(task) = task else { return };
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => debug!(%endpoint, "channel task finished"),
                Ok(Err(e)) => warn!(%endpoint, error = %e, "channel task failed"),
                Err(_) => warn!(%endpoint, "channel task did not finish in time"),
            }
        }
        .boxed()
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run(
    endpoint: String,
    options: ChannelOptions,
    mut outbound: UnboundedReceiver<Outbound>,
    events: UnboundedSender<ChannelEvent>,
) {
    let policy = options.reconnect;
    let mut attempt: u32 = 0;

    loop {
        let reason = match connect(&endpoint, &options, &mut outbound).await {
            Connect::Cancelled => {
                debug!(%endpoint, "connect abandoned by close request");
                let _ = events.send(ChannelEvent::Closed { reason: None });
                return;
            }
            Connect::Failed(reason) => {
                warn!(%endpoint, %reason, "connection attempt failed");
                reason
            }
            Connect::Ready(stream) => {
                info!(%endpoint, "websocket connected");
                attempt = 0;
                if events.send(ChannelEvent::Opened).is_err() {
                    return;
                }
                match pump(stream, &mut outbound, &events).await {
                    Session::Finished => {
                        info!(%endpoint, "websocket closed");
                        let _ = events.send(ChannelEvent::Closed { reason: None });
                        return;
                    }
                    Session::Dropped(reason) => {
                        warn!(%endpoint, %reason, "websocket dropped");
                        reason
                    }
                }
            }
        };

        if attempt >= policy.max_retries {
            let _ = events.send(ChannelEvent::Closed {
                reason: Some(reason),
            });
            return;
        }

        attempt += 1;
        let delay = policy.delay_for(attempt);
        info!(%endpoint, attempt, ?delay, "scheduling reconnect");
        if events.send(ChannelEvent::Retrying { attempt, delay }).is_err() {
            return;
        }

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                cmd = outbound.recv() => match cmd {
                    Some(Outbound::Text(text)) => {
                        warn!(bytes = text.len(), "dropping outbound message while disconnected");
                    }
                    Some(Outbound::Close) | None => {
                        let _ = events.send(ChannelEvent::Closed { reason: None });
                        return;
                    }
                },
            }
        }
    }
}

/// Perform the handshake, giving up early if the owner asks to close.
async fn connect(
    endpoint: &str,
    options: &ChannelOptions,
    outbound: &mut UnboundedReceiver<Outbound>,
) -> Connect {
    let handshake = tokio::time::timeout(options.connect_timeout, connect_async(endpoint));
    tokio::pin!(handshake);

    loop {
        tokio::select! {
            result = &mut handshake => {
                return match result {
                    Ok(Ok((stream, _response))) => Connect::Ready(stream),
                    Ok(Err(e)) => Connect::Failed(e.to_string()),
                    Err(_) => Connect::Failed(format!(
                        "timed out after {}s",
                        options.connect_timeout.as_secs_f32()
                    )),
                };
            }
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Text(text)) => {
                    warn!(bytes = text.len(), "dropping outbound message while connecting");
                }
                Some(Outbound::Close) | None => return Connect::Cancelled,
            },
        }
    }
}

/// Shuttle frames both ways until either side closes.
async fn pump(
    stream: WsStream,
    outbound: &mut UnboundedReceiver<Outbound>,
    events: &UnboundedSender<ChannelEvent>,
) -> Session {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Text(text)) => {
                    debug!(bytes = text.len(), "sending text frame");
                    if let Err(e) = sink.send(WsMessage::text(text)).await {
                        return Session::Dropped(e.to_string());
                    }
                }
                Some(Outbound::Close) | None => {
                    // Sends a single Close frame and flushes it
                    let _ = sink.close().await;
                    return Session::Finished;
                }
            },
            frame = source.next() => {
                let event = match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        debug!(bytes = text.len(), "received text frame");
                        ChannelEvent::Payload(text.as_str().to_owned())
                    }
                    Some(Ok(WsMessage::Binary(data))) => ChannelEvent::Rejected {
                        reason: format!("binary frame of {} bytes", data.len()),
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        let reason = match frame {
                            Some(frame) if !frame.reason.is_empty() => {
                                format!("closed by server ({}): {}", frame.code, frame.reason.as_str())
                            }
                            Some(frame) => format!("closed by server ({})", frame.code),
                            None => "closed by server".to_string(),
                        };
                        return Session::Dropped(reason);
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Session::Dropped(e.to_string()),
                    None => return Session::Dropped("connection ended".to_string()),
                };

                if events.send(event).is_err() {
                    let _ = sink.close().await;
                    return Session::Finished;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_before_open_is_refused() {
        let mut channel = WsChannel::new("ws://127.0.0.1:9/chat", ChannelOptions::default());
        assert_eq!(channel.send("hello"), Err(ChannelError::NotOpen));
    }

    #[tokio::test]
    async fn test_close_during_connect_reports_local_close() {
        // Never accepted, so the upgrade request gets no answer.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}/chat", listener.local_addr().unwrap());

        let options = ChannelOptions {
            connect_timeout: std::time::Duration::from_secs(30),
            ..ChannelOptions::default()
        };
        let mut channel = WsChannel::new(&endpoint, options);
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel.open(tx);
        channel.close();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(ChannelEvent::Closed { reason: None }));
        assert_eq!(channel.send("late"), Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_connect_timeout_is_reported_as_close_reason() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}/chat", listener.local_addr().unwrap());

        let options = ChannelOptions {
            connect_timeout: std::time::Duration::from_millis(200),
            ..ChannelOptions::default()
        };
        let mut channel = WsChannel::new(&endpoint, options);
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel.open(tx);

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        match event {
            Some(ChannelEvent::Closed { reason: Some(reason) }) => {
                assert!(reason.contains("timed out"), "unexpected reason: {reason}");
            }
            other => panic!("expected close with reason, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_task_and_is_repeatable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}/chat", listener.local_addr().unwrap());

        let mut channel = WsChannel::new(&endpoint, ChannelOptions::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel.open(tx);

        tokio::time::timeout(Duration::from_secs(5), channel.shutdown())
            .await
            .unwrap();
        // The task has exited, so its close notice is already queued.
        assert_eq!(rx.try_recv(), Ok(ChannelEvent::Closed { reason: None }));

        channel.shutdown().await;
        assert_eq!(channel.send("late"), Err(ChannelError::Closed));
    }
}
