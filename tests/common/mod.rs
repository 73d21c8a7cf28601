//! A minimal sentinel speaking just enough RESP for the watcher: `AUTH`,
//! `PING`, `SENTINEL get-master-addr-by-name`, `SENTINEL sentinels` and
//! `SUBSCRIBE`. Each server binds an ephemeral port on localhost.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use sentinel_watch::resp::encode_command;
use sentinel_watch::resp::parse_value;
use sentinel_watch::resp::RespValue;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const SWITCH_MASTER: &str = "+switch-master";

struct ServerState {
    master_name: String,
    master: Mutex<Option<(String, String)>>,
    peers: Mutex<Vec<(String, String)>>,
    password: Option<String>,
    events: broadcast::Sender<(String, String)>,
    subscribers: AtomicUsize,
}

pub struct FakeSentinelServer {
    pub addr: String,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl FakeSentinelServer {
    /// Starts a sentinel monitoring `master_name`, currently at `master`
    pub async fn start(
        master_name: &str,
        master: Option<(&str, u16)>,
    ) -> Self {
        Self::start_with_password(master_name, master, None).await
    }

    pub async fn start_with_password(
        master_name: &str,
        master: Option<(&str, u16)>,
        password: Option<&str>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake sentinel");
        let addr = listener.local_addr().expect("local addr").to_string();
        let (events, _) = broadcast::channel(64);
        let state = Arc::new(ServerState {
            master_name: master_name.to_string(),
            master: Mutex::new(master.map(|(ip, port)| (ip.to_string(), port.to_string()))),
            peers: Mutex::new(Vec::new()),
            password: password.map(str::to_string),
            events,
            subscribers: AtomicUsize::new(0),
        });
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve(listener, state.clone(), shutdown.clone()));

        Self {
            addr,
            state,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn set_master(
        &self,
        master: Option<(&str, u16)>,
    ) {
        *self.state.master.lock() = master.map(|(ip, port)| (ip.to_string(), port.to_string()));
    }

    pub fn set_peers(
        &self,
        peers: &[(&str, u16)],
    ) {
        *self.state.peers.lock() = peers
            .iter()
            .map(|(ip, port)| (ip.to_string(), port.to_string()))
            .collect();
    }

    /// Publishes `payload` to every subscriber of `channel`
    pub fn publish(
        &self,
        channel: &str,
        payload: &str,
    ) {
        let _ = self.state.events.send((channel.to_string(), payload.to_string()));
    }

    pub fn subscribers(&self) -> usize {
        self.state.subscribers.load(Ordering::SeqCst)
    }

    pub async fn wait_for_subscribers(
        &self,
        count: usize,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.subscribers() == count {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        self.subscribers() == count
    }

    /// Stops accepting and drops every open connection
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for FakeSentinelServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Address nobody listens on
pub async fn closed_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr").to_string();
    drop(listener);
    addr
}

async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) {
    let mut connections = Vec::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    connections.push(tokio::spawn(handle_connection(stream, state.clone(), shutdown.clone())));
                }
                Err(e) => {
                    debug!("fake sentinel accept failed: {}", e);
                    break;
                }
            },
        }
    }
    for connection in connections {
        let _ = connection.await;
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) {
    let mut buffer = BytesMut::with_capacity(4096);
    let mut authenticated = state.password.is_none();

    loop {
        let command = match parse_value(&buffer) {
            Ok(Some((value, consumed))) => {
                let _ = buffer.split_to(consumed);
                command_args(value)
            }
            Ok(None) => {
                let read = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    read = stream.read_buf(&mut buffer) => read,
                };
                match read {
                    Ok(0) | Err(_) => return,
                    Ok(_) => continue,
                }
            }
            Err(_) => return,
        };

        let name = command.first().map(|c| c.to_ascii_uppercase()).unwrap_or_default();
        let reply = match name.as_str() {
            "AUTH" => {
                let given = command.last().cloned();
                if given.is_some() && given == state.password {
                    authenticated = true;
                    b"+OK\r\n".to_vec()
                } else {
                    b"-WRONGPASS invalid username-password pair\r\n".to_vec()
                }
            }
            _ if !authenticated => b"-NOAUTH Authentication required.\r\n".to_vec(),
            "PING" => b"+PONG\r\n".to_vec(),
            "SENTINEL" => sentinel_reply(&state, &command),
            "SUBSCRIBE" => {
                let channel = command.get(1).cloned().unwrap_or_default();
                serve_subscription(stream, state, shutdown, channel).await;
                return;
            }
            _ => format!("-ERR unknown command '{}'\r\n", name).into_bytes(),
        };

        if stream.write_all(&reply).await.is_err() {
            return;
        }
    }
}

fn sentinel_reply(
    state: &ServerState,
    command: &[String],
) -> Vec<u8> {
    let sub = command.get(1).map(|s| s.to_ascii_lowercase()).unwrap_or_default();
    let name = command.get(2).cloned().unwrap_or_default();
    match sub.as_str() {
        "get-master-addr-by-name" => match &*state.master.lock() {
            Some((ip, port)) if name == state.master_name => encode_command(&[ip.as_str(), port.as_str()]).to_vec(),
            _ => b"*-1\r\n".to_vec(),
        },
        "sentinels" if name == state.master_name => {
            let peers = state.peers.lock();
            let mut reply = format!("*{}\r\n", peers.len()).into_bytes();
            for (ip, port) in peers.iter() {
                reply.extend_from_slice(&encode_command(&["name", "peer", "ip", ip.as_str(), "port", port.as_str()]));
            }
            reply
        }
        "sentinels" => b"-ERR No such master with that name\r\n".to_vec(),
        _ => b"-ERR unknown sentinel subcommand\r\n".to_vec(),
    }
}

async fn serve_subscription(
    mut stream: TcpStream,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
    channel: String,
) {
    let mut events = state.events.subscribe();
    let mut confirmation = format!("*3\r\n$9\r\nsubscribe\r\n${}\r\n{}\r\n", channel.len(), channel).into_bytes();
    confirmation.extend_from_slice(b":1\r\n");
    if stream.write_all(&confirmation).await.is_err() {
        return;
    }

    state.subscribers.fetch_add(1, Ordering::SeqCst);
    let mut scratch = [0u8; 512];
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Ok((from, payload)) if from == channel => {
                    let frame = encode_command(&["message", channel.as_str(), payload.as_str()]);
                    if stream.write_all(&frame).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            read = stream.read(&mut scratch) => match read {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            },
        }
    }
    state.subscribers.fetch_sub(1, Ordering::SeqCst);
}

fn command_args(value: RespValue) -> Vec<String> {
    value
        .into_array()
        .unwrap_or_default()
        .iter()
        .filter_map(|arg| arg.as_str().map(str::to_string))
        .collect()
}
