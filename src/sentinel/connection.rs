use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::resp::encode_command;
use crate::resp::parse_value;
use crate::resp::ParseError;
use crate::resp::RespValue;
use crate::NetworkError;
use crate::ProtocolError;
use crate::Result;
use crate::SentinelOptions;

/// Maximum bytes buffered while waiting for a complete reply
const MAX_BUFFER_SIZE: usize = 1 << 20;

/// One TCP connection to a sentinel
pub(crate) struct Connection {
    addr: String,
    stream: TcpStream,
    buffer: BytesMut,
    request_timeout: Duration,
}

impl Connection {
    /// Connects under the connect timeout and authenticates when a password
    /// is configured
    pub(crate) async fn connect(
        addr: &str,
        options: &SentinelOptions,
    ) -> Result<Self> {
        debug!("connect sentinel, addr = {:?}", addr);
        let stream = match timeout(options.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(NetworkError::Connect {
                    addr: addr.to_string(),
                    source,
                }
                .into())
            }
            Err(_) => {
                return Err(NetworkError::ConnectTimeout {
                    addr: addr.to_string(),
                    duration: options.connect_timeout,
                }
                .into())
            }
        };
        stream.set_nodelay(true).map_err(NetworkError::Io)?;

        let mut conn = Self {
            addr: addr.to_string(),
            stream,
            buffer: BytesMut::with_capacity(4096),
            request_timeout: options.request_timeout,
        };

        if let Some(password) = &options.password {
            let mut args = vec!["AUTH"];
            if let Some(username) = &options.username {
                args.push(username.as_str());
            }
            args.push(password.as_str());
            match conn.request(&args).await? {
                RespValue::SimpleString(ref s) if s.eq_ignore_ascii_case("OK") => {}
                other => {
                    return Err(ProtocolError::UnexpectedReply {
                        command: "AUTH",
                        reply: other.to_string(),
                    }
                    .into())
                }
            }
        }

        Ok(conn)
    }

    pub(crate) fn addr(&self) -> &str {
        &self.addr
    }

    pub(crate) async fn send(
        &mut self,
        args: &[&str],
    ) -> Result<()> {
        let frame = encode_command(args);
        self.stream.write_all(&frame).await.map_err(NetworkError::Io)?;
        Ok(())
    }

    /// Reads the next complete value, waiting as long as it takes
    pub(crate) async fn read_value(&mut self) -> Result<RespValue> {
        loop {
            if let Some((value, consumed)) = parse_value(&self.buffer)? {
                let _ = self.buffer.split_to(consumed);
                return Ok(value);
            }

            if self.buffer.len() > MAX_BUFFER_SIZE {
                return Err(ParseError::Invalid("max buffer size exceeded".to_string()).into());
            }

            let n = self.stream.read_buf(&mut self.buffer).await.map_err(NetworkError::Io)?;
            if n == 0 {
                return Err(NetworkError::ConnectionClosed {
                    addr: self.addr.clone(),
                }
                .into());
            }
        }
    }

    /// Sends one command and reads its reply under the request timeout
    ///
    /// An error reply from the sentinel is returned as `ProtocolError::Server`.
    pub(crate) async fn request(
        &mut self,
        args: &[&str],
    ) -> Result<RespValue> {
        let duration = self.request_timeout;
        let addr = self.addr.clone();
        let reply = timeout(duration, async {
            self.send(args).await?;
            self.read_value().await
        })
        .await
        .map_err(|_| NetworkError::RequestTimeout { addr, duration })??;

        match reply {
            RespValue::Error(message) => Err(ProtocolError::Server(message).into()),
            other => Ok(other),
        }
    }

    /// Half-closes the stream; a peer that already went away is not an error
    pub(crate) async fn shutdown(&mut self) -> Result<()> {
        match self.stream.shutdown().await {
            Err(e) if e.kind() != std::io::ErrorKind::NotConnected => Err(NetworkError::Io(e).into()),
            _ => Ok(()),
        }
    }
}
