use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::AgentClient;
use super::AgentConnector;
use super::ChangeSubscription;
use super::Connection;
use super::PubSub;
use crate::resp::RespValue;
use crate::utils::net::join_host_port;
use crate::Error;
use crate::ProtocolError;
use crate::Result;
use crate::SentinelOptions;

/// Command connection to a single sentinel
///
/// The connection is established eagerly by [`connect`](SentinelClient::connect)
/// and re-established on the next command after a transport failure.
/// Subscriptions never share it; each one gets a dedicated connection.
pub struct SentinelClient {
    addr: String,
    options: SentinelOptions,
    conn: Mutex<Option<Connection>>,
    closed: AtomicBool,
}

impl SentinelClient {
    pub async fn connect(
        addr: impl Into<String>,
        options: SentinelOptions,
    ) -> Result<Self> {
        let addr = addr.into();
        let conn = Connection::connect(&addr, &options).await?;
        Ok(Self {
            addr,
            options,
            conn: Mutex::new(Some(conn)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// `PING`, mostly useful as a liveness probe
    pub async fn ping(&self) -> Result<()> {
        match self.request(&["PING"]).await? {
            RespValue::SimpleString(ref s) if s.eq_ignore_ascii_case("PONG") => Ok(()),
            other => Err(ProtocolError::UnexpectedReply {
                command: "PING",
                reply: other.to_string(),
            }
            .into()),
        }
    }

    async fn request(
        &self,
        args: &[&str],
    ) -> Result<RespValue> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::AlreadyClosed("sentinel client"));
        }

        let mut guard = self.conn.lock().await;
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => Connection::connect(&self.addr, &self.options).await?,
        };

        let reply = conn.request(args).await;
        match &reply {
            // An error reply leaves the connection in a clean state
            Ok(_) | Err(Error::Protocol(ProtocolError::Server(_))) => *guard = Some(conn),
            Err(e) => debug!("dropping connection to {:?} after error: {}", self.addr, e),
        }
        reply
    }
}

#[async_trait]
impl AgentClient for SentinelClient {
    async fn get_master_addr_by_name(
        &self,
        master_name: &str,
    ) -> Result<Option<String>> {
        let reply = self
            .request(&["SENTINEL", "get-master-addr-by-name", master_name])
            .await?;
        parse_master_addr_reply(reply)
    }

    async fn sentinels(
        &self,
        master_name: &str,
    ) -> Result<Vec<String>> {
        let reply = self.request(&["SENTINEL", "sentinels", master_name]).await?;
        parse_sentinels_reply(reply)
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<Arc<dyn ChangeSubscription>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::AlreadyClosed("sentinel client"));
        }
        let pubsub = PubSub::open(&self.addr, &self.options, channel).await?;
        Ok(Arc::new(pubsub))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyClosed("sentinel client"));
        }
        let conn = self.conn.lock().await.take();
        match conn {
            Some(mut conn) => conn.shutdown().await,
            None => Ok(()),
        }
    }
}

/// Reply to `get-master-addr-by-name`: `[ip, port]` or nil
pub(crate) fn parse_master_addr_reply(reply: RespValue) -> Result<Option<String>> {
    if reply.is_nil() {
        return Ok(None);
    }
    let description = reply.to_string();
    let unexpected = || {
        Error::from(ProtocolError::UnexpectedReply {
            command: "SENTINEL get-master-addr-by-name",
            reply: description.clone(),
        })
    };

    let items = reply.into_array().ok_or_else(unexpected)?;
    match items.as_slice() {
        [ip, port] => {
            let ip = ip.as_str().ok_or_else(unexpected)?;
            let port = port.as_str().ok_or_else(unexpected)?;
            Ok(Some(join_host_port(ip, port)))
        }
        _ => Err(unexpected()),
    }
}

/// Reply to `SENTINEL sentinels`: one flat field/value array per sentinel
pub(crate) fn parse_sentinels_reply(reply: RespValue) -> Result<Vec<String>> {
    if reply.is_nil() {
        return Ok(Vec::new());
    }
    let description = reply.to_string();
    let entries = reply.into_array().ok_or_else(|| ProtocolError::UnexpectedReply {
        command: "SENTINEL sentinels",
        reply: description,
    })?;

    let mut addrs = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(fields) = entry.into_array() else {
            continue;
        };
        let mut ip = None;
        let mut port = None;
        for pair in fields.chunks(2) {
            if let [key, value] = pair {
                match key.as_str() {
                    Some("ip") => ip = value.as_str(),
                    Some("port") => port = value.as_str(),
                    _ => {}
                }
            }
        }
        if let (Some(ip), Some(port)) = (ip, port) {
            addrs.push(join_host_port(ip, port));
        }
    }
    Ok(addrs)
}

/// Creates [`SentinelClient`]s over TCP
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    options: SentinelOptions,
}

impl TcpConnector {
    pub fn new(options: SentinelOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl AgentConnector for TcpConnector {
    async fn connect(
        &self,
        addr: &str,
    ) -> Result<Arc<dyn AgentClient>> {
        let client = SentinelClient::connect(addr, self.options.clone()).await?;
        Ok(Arc::new(client))
    }
}
