//! Client library for connecting to a MycoKV server
//!
//! The wire format carries no request identifiers, so a connection has at
//! most one command in flight. A background task reads response lines and
//! hands each one to the pending request, if there is one. Issuing a
//! command while another is pending fails with
//! [`MycoKvError::AlreadyAwaiting`] instead of being queued.

use crate::error::{MycoKvError, Result};
use crate::key::{self, KeyContext, KeyKind};
use crate::protocol::{parse_reply, Command};
use crate::value::{decode_nested, decode_value, encode_value, Nested, Tree, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Pause after the socket connects, for servers that accept before
    /// they are ready to read
    pub settle_delay: Duration,
    /// `None` waits for a response indefinitely
    pub response_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6922,
            settle_delay: Duration::from_millis(1000),
            response_timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// Result of a GET
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Value(Value),
    /// Subtree returned for a wildcard key
    Tree(Tree),
    /// Wildcard response that was not a tree
    Raw(String),
}

impl Entry {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Entry::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_tree(self) -> Option<Tree> {
        match self {
            Entry::Tree(tree) => Some(tree),
            _ => None,
        }
    }
}

impl From<Nested> for Entry {
    fn from(nested: Nested) -> Self {
        match nested {
            Nested::Tree(tree) => Entry::Tree(tree),
            Nested::Raw(raw) => Entry::Raw(raw),
        }
    }
}

/// The single response slot of a connection
enum ResponseSlot {
    Idle,
    Awaiting(oneshot::Sender<String>),
}

struct Shared {
    state: ConnectionState,
    slot: ResponseSlot,
    /// Replies still owed to commands that timed out
    stale: usize,
}

type Writer = BufWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// Client for connecting to a MycoKV server
pub struct Client {
    writer: Mutex<Writer>,
    shared: Arc<Mutex<Shared>>,
    reader: JoinHandle<()>,
    config: ClientConfig,
}

impl Client {
    /// Connect to a MycoKV server
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with(ClientConfig::new(host, port)).await
    }

    pub async fn connect_with(config: ClientConfig) -> Result<Self> {
        let addr = config.addr();
        let stream = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(|source| MycoKvError::Connection {
                addr: addr.clone(),
                source,
            })?;
        info!("Successfully connected to MycoKV at {}", addr);

        let settle_delay = config.settle_delay;
        let client = Self::start(stream, config, ConnectionState::Connecting);
        if !settle_delay.is_zero() {
            tokio::time::sleep(settle_delay).await;
        }

        let mut shared = client.shared.lock().await;
        if shared.state != ConnectionState::Connecting {
            return Err(MycoKvError::ConnectionClosed);
        }
        shared.state = ConnectionState::Connected;
        drop(shared);

        Ok(client)
    }

    /// Use a stream the caller has already connected
    pub fn from_stream<S>(stream: S, config: ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::start(stream, config, ConnectionState::Connected)
    }

    fn start<S>(stream: S, config: ClientConfig, state: ConnectionState) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let shared = Arc::new(Mutex::new(Shared {
            state,
            slot: ResponseSlot::Idle,
            stale: 0,
        }));
        let reader = tokio::spawn(read_responses(
            BufReader::new(read_half),
            Arc::clone(&shared),
        ));
        let write_half: Box<dyn AsyncWrite + Send + Unpin> = Box::new(write_half);

        Self {
            writer: Mutex::new(BufWriter::new(write_half)),
            shared,
            reader,
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.lock().await.state
    }

    /// Get a value, or a subtree when the key ends in a wildcard
    pub async fn get(&self, key: &str) -> Result<Entry> {
        let kind = key::validate(key, KeyContext::Read)?;
        let line = self
            .send_command(Command::Get {
                key: key.to_string(),
            })
            .await?;
        let body = parse_reply(&line)?;

        Ok(match kind {
            KeyKind::Wildcard { .. } => decode_nested(body).into(),
            KeyKind::Single => Entry::Value(decode_value(body)),
        })
    }

    /// Store a value and return the value the server echoed back
    pub async fn put(&self, key: &str, value: impl Into<Value>) -> Result<Value> {
        self.put_inner(key, value.into(), None).await
    }

    /// Store a value that expires after `ttl`
    pub async fn put_with_ttl(
        &self,
        key: &str,
        value: impl Into<Value>,
        ttl: Duration,
    ) -> Result<Value> {
        self.put_inner(key, value.into(), Some(ttl)).await
    }

    async fn put_inner(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<Value> {
        key::validate(key, KeyContext::Write)?;
        let encoded = encode_value(&value)?;
        let line = self
            .send_command(Command::Put {
                key: key.to_string(),
                value: encoded,
            })
            .await?;
        let echoed = decode_value(parse_reply(&line)?);

        if let Some(ttl) = ttl {
            self.expire(key, ttl).await?;
        }

        Ok(echoed)
    }

    /// Expire a key after `ttl`, rounded up to whole milliseconds
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        key::validate(key, KeyContext::Write)?;
        let ttl_ms = ttl_millis(ttl);
        let line = self
            .send_command(Command::Expire {
                key: key.to_string(),
                ttl_ms,
            })
            .await?;
        parse_reply(&line)?;
        Ok(())
    }

    /// Delete a key; deleting a key that does not exist succeeds
    pub async fn delete(&self, key: &str) -> Result<()> {
        key::validate(key, KeyContext::Write)?;
        let line = self
            .send_command(Command::Delete {
                key: key.to_string(),
            })
            .await?;

        match parse_reply(&line) {
            Ok(_) => Ok(()),
            Err(err) if err.is_key_not_found() => {
                debug!("DELETE {}: key not found, treating as deleted", key);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Remove every key and clear the server's log
    pub async fn purge(&self) -> Result<()> {
        let line = self.send_command(Command::Purge).await?;
        parse_reply(&line)?;
        Ok(())
    }

    /// Close the connection without waiting for an in-flight response
    pub async fn disconnect(&self) -> Result<()> {
        self.shared.lock().await.state = ConnectionState::Disconnecting;
        self.reader.abort();

        let shutdown = self.writer.lock().await.shutdown().await;

        let mut shared = self.shared.lock().await;
        shared.state = ConnectionState::Disconnected;
        shared.slot = ResponseSlot::Idle;
        shared.stale = 0;
        drop(shared);

        info!("MycoKV connection terminated.");
        shutdown.map_err(MycoKvError::from)
    }

    /// Write one command and wait for the one line that answers it
    async fn send_command(&self, command: Command) -> Result<String> {
        let rx = {
            let mut shared = self.shared.lock().await;
            if shared.state != ConnectionState::Connected {
                return Err(MycoKvError::NotConnected);
            }
            if let ResponseSlot::Awaiting(_) = shared.slot {
                return Err(MycoKvError::AlreadyAwaiting);
            }
            let (tx, rx) = oneshot::channel();
            shared.slot = ResponseSlot::Awaiting(tx);
            rx
        };

        let line = command.to_line();
        debug!("Sending: {:?}", line.trim_end());
        if let Err(e) = self.write_line(&line).await {
            self.shared.lock().await.slot = ResponseSlot::Idle;
            return Err(e);
        }

        let response = match self.config.response_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(response) => response,
                Err(_) => {
                    let mut shared = self.shared.lock().await;
                    // still awaiting: the reply is owed and must be skipped
                    if let ResponseSlot::Awaiting(_) = shared.slot {
                        shared.slot = ResponseSlot::Idle;
                        shared.stale += 1;
                    }
                    return Err(MycoKvError::Timeout(limit));
                }
            },
            None => rx.await,
        };

        response.map_err(|_| MycoKvError::ConnectionClosed)
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    let millis = ttl.as_nanos().div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX)
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Deliver each response line to the pending request
async fn read_responses<R>(mut reader: BufReader<R>, shared: Arc<Mutex<Shared>>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                info!("MycoKV connection terminated.");
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let mut shared = shared.lock().await;
                if shared.stale > 0 {
                    shared.stale -= 1;
                    debug!("Dropping late response: {:?}", line.trim_end());
                    continue;
                }
                match std::mem::replace(&mut shared.slot, ResponseSlot::Idle) {
                    ResponseSlot::Awaiting(tx) => {
                        let _ = tx.send(line.into_owned());
                    }
                    ResponseSlot::Idle => {
                        warn!("Dropping unsolicited response: {:?}", line.trim_end());
                    }
                }
            }
            Err(e) => {
                warn!("Failed to read from MycoKV: {}", e);
                break;
            }
        }
    }

    let mut shared = shared.lock().await;
    shared.state = ConnectionState::Disconnected;
    shared.slot = ResponseSlot::Idle;
    shared.stale = 0;
}
