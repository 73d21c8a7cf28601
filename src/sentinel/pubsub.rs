use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::ChangeSubscription;
use super::Connection;
use crate::resp::RespValue;
use crate::Error;
use crate::ProtocolError;
use crate::Result;
use crate::SentinelOptions;

/// Subscription to one sentinel channel on a dedicated connection
///
/// A reader task owns the connection and forwards `message` payloads into a
/// bounded channel. [`close`](ChangeSubscription::close) cancels the reader
/// and waits for it; a dropped connection ends the stream the same way.
pub struct PubSub {
    addr: String,
    channel: String,
    messages: tokio::sync::Mutex<mpsc::Receiver<String>>,
    cancel: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl PubSub {
    /// Connects, issues `SUBSCRIBE <channel>` and starts the reader task
    pub async fn open(
        addr: &str,
        options: &SentinelOptions,
        channel: &str,
    ) -> Result<Self> {
        let mut conn = Connection::connect(addr, options).await?;
        let confirmation = conn.request(&["SUBSCRIBE", channel]).await?;
        check_subscribe_confirmation(&confirmation, channel)?;
        debug!("subscribed to {:?} on {:?}", channel, addr);

        let (tx, rx) = mpsc::channel(options.subscription_buffer_size);
        let cancel = CancellationToken::new();
        let reader = tokio::spawn(read_messages(conn, channel.to_string(), tx, cancel.clone()));

        Ok(Self {
            addr: addr.to_string(),
            channel: channel.to_string(),
            messages: tokio::sync::Mutex::new(rx),
            cancel,
            reader: Mutex::new(Some(reader)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl ChangeSubscription for PubSub {
    async fn receive(&self) -> Option<String> {
        let mut messages = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            guard = self.messages.lock() => guard,
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            message = messages.recv() => message,
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyClosed("subscription"));
        }
        self.cancel.cancel();

        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            if let Err(e) = reader.await {
                warn!("subscription reader for {:?} on {:?} failed: {}", self.channel, self.addr, e);
            }
        }
        Ok(())
    }
}

impl Drop for PubSub {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn read_messages(
    mut conn: Connection,
    channel: String,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = conn.read_value() => frame,
        };

        let value = match frame {
            Ok(value) => value,
            Err(e) => {
                warn!("subscription to {:?} on {:?} ended: {}", channel, conn.addr(), e);
                break;
            }
        };

        let Some(payload) = message_payload(value, &channel) else {
            continue;
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = tx.send(payload) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    if let Err(e) = conn.shutdown().await {
        debug!("shutdown of subscription connection to {:?} failed: {}", conn.addr(), e);
    }
}

/// Extracts the payload of a `["message", channel, payload]` push
pub(crate) fn message_payload(
    value: RespValue,
    channel: &str,
) -> Option<String> {
    let items = value.into_array()?;
    match items.as_slice() {
        [kind, from, payload]
            if kind.as_str().is_some_and(|k| k.eq_ignore_ascii_case("message"))
                && from.as_str() == Some(channel) =>
        {
            payload.as_str().map(str::to_string)
        }
        _ => None,
    }
}

fn check_subscribe_confirmation(
    reply: &RespValue,
    channel: &str,
) -> Result<()> {
    if let RespValue::Array(Some(items)) = reply {
        if let [kind, from, RespValue::Integer(_)] = items.as_slice() {
            if kind.as_str().is_some_and(|k| k.eq_ignore_ascii_case("subscribe"))
                && from.as_str() == Some(channel)
            {
                return Ok(());
            }
        }
    }
    Err(ProtocolError::UnexpectedReply {
        command: "SUBSCRIBE",
        reply: reply.to_string(),
    }
    .into())
}
