//! Delivery of canonical events.
//!
//! Emission is fire-and-forget from the caller's point of view: `emit` never
//! fails and never blocks on the network. Ordering is preserved per emitter.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{EventcError, Result};
use crate::event::Event;

pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: Event);
}

/// Logs every event. Used when no notification host is configured.
#[derive(Debug, Default, Clone)]
pub struct LogEmitter;

impl EventEmitter for LogEmitter {
    fn emit(&self, event: Event) {
        let data = serde_json::to_string(&event).unwrap_or_default();
        info!(event = event.name(), "{}", data);
    }
}

/// Keeps events in memory, in emission order.
#[derive(Debug, Default, Clone)]
pub struct MemoryEmitter {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemoryEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(Event::name).collect()
    }
}

impl EventEmitter for MemoryEmitter {
    fn emit(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Publishes events to in-process subscribers (the SSE stream).
#[derive(Debug, Clone)]
pub struct BroadcastEmitter {
    sender: broadcast::Sender<Event>,
}

impl BroadcastEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventEmitter for BroadcastEmitter {
    fn emit(&self, event: Event) {
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }
}

/// Sends every event to all inner emitters.
#[derive(Default, Clone)]
pub struct FanoutEmitter {
    emitters: Vec<Arc<dyn EventEmitter>>,
}

impl FanoutEmitter {
    pub fn new(emitters: Vec<Arc<dyn EventEmitter>>) -> Self {
        Self { emitters }
    }
}

impl EventEmitter for FanoutEmitter {
    fn emit(&self, event: Event) {
        for emitter in &self.emitters {
            emitter.emit(event.clone());
        }
    }
}

/// Newline-delimited JSON over TCP to the notification daemon.
///
/// Events are queued and written by a background task, in order. A failed
/// write triggers one reconnection attempt; if that fails too the event is
/// dropped with a warning.
pub struct TcpEmitter {
    sender: mpsc::UnboundedSender<Event>,
}

pub struct TcpEmitterHandle {
    task: JoinHandle<()>,
}

impl TcpEmitter {
    /// Connects to `host` (`address:port`). Failing to connect here is fatal
    /// for the caller, which cannot deliver anything.
    pub async fn connect(host: &str, timeout: Duration) -> Result<(Self, TcpEmitterHandle)> {
        let stream = connect_with_timeout(host, timeout).await?;
        info!("Connected to notification host {}", host);

        let (sender, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_loop(host.to_string(), timeout, stream, receiver));

        Ok((Self { sender }, TcpEmitterHandle { task }))
    }
}

impl EventEmitter for TcpEmitter {
    fn emit(&self, event: Event) {
        if self.sender.send(event).is_err() {
            warn!("Notification writer stopped, event dropped");
        }
    }
}

impl TcpEmitterHandle {
    /// Waits until every queued event has been written. All `TcpEmitter`
    /// clones must have been dropped beforehand.
    pub async fn finish(self) {
        if let Err(e) = self.task.await {
            warn!("Notification writer failed: {}", e);
        }
    }
}

async fn connect_with_timeout(host: &str, timeout: Duration) -> Result<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect(host)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(EventcError::Transport(format!(
            "couldn't connect to {}: {}",
            host, e
        ))),
        Err(_) => Err(EventcError::Transport(format!(
            "timed out connecting to {}",
            host
        ))),
    }
}

async fn write_event(stream: &mut TcpStream, line: &[u8]) -> std::io::Result<()> {
    stream.write_all(line).await?;
    stream.flush().await
}

async fn write_loop(
    host: String,
    timeout: Duration,
    mut stream: TcpStream,
    mut receiver: mpsc::UnboundedReceiver<Event>,
) {
    while let Some(event) = receiver.recv().await {
        let mut line = match serde_json::to_vec(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!("Couldn't serialize {} event: {}", event.name(), e);
                continue;
            }
        };
        line.push(b'\n');

        if let Err(e) = write_event(&mut stream, &line).await {
            warn!("Lost connection to {}: {}, reconnecting", host, e);
            match connect_with_timeout(&host, timeout).await {
                Ok(new_stream) => {
                    stream = new_stream;
                    if let Err(e) = write_event(&mut stream, &line).await {
                        warn!("Dropping {} event: {}", event.name(), e);
                    }
                }
                Err(e) => warn!("Dropping {} event: {}", event.name(), e),
            }
        } else {
            debug!("Sent {} event", event.name());
        }
    }
}
