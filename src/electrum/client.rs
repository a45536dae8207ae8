//! Reconnecting Electrum channel.
//!
//! A background Tokio task owns the socket. Handles talk to it through a
//! command queue (one oneshot responder per request) and can watch the
//! connection lifecycle through a broadcast stream of [`ChannelEvent`]s.
//!
//! # Lifecycle
//! * connect (TCP, optionally TLS) and send `server.version`
//! * serve requests, correlating responses by JSON-RPC id
//! * on socket loss, fail in-flight requests, wait `retry_period`, reconnect
//!
//! Requests issued while disconnected stay queued until the next connection
//! or until their timeout fires. A request whose caller already gave up is
//! dropped from the queue without reaching the server.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_native_tls::TlsConnector;

use std::collections::HashMap;
use std::time::Duration;

use crate::config::ElectrumConfig;
use crate::electrum::api::ElectrumApi;
use crate::electrum::types::{Balance, HeaderNotification, HistoryEntry, UtxoEntry};

// =====================================================================
// Types
// =====================================================================

/// Connection lifecycle, for observability only.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Handshake done; carries the `server.version` result.
    Connected { server_version: Value },
    Disconnected,
    Error(String),
}

struct Request {
    method: &'static str,
    params: Value,
    respond: oneshot::Sender<Result<Value>>,
}

trait ElectrumStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ElectrumStream for T {}

type Reader = Lines<BufReader<ReadHalf<Box<dyn ElectrumStream>>>>;
type Writer = WriteHalf<Box<dyn ElectrumStream>>;

const HANDSHAKE_ID: u64 = 0;
const COMMAND_QUEUE: usize = 256;
const EVENT_QUEUE: usize = 16;

// =====================================================================
// Public Client (handle)
// =====================================================================

/// Cloneable handle to the background Electrum task.
#[derive(Clone)]
pub struct ElectrumClient {
    commands: mpsc::Sender<Request>,
    events: broadcast::Sender<ChannelEvent>,
    request_timeout: Duration,
}

impl ElectrumClient {
    /// Spawns the connection task on the current Tokio runtime.
    ///
    /// Returns immediately; the first connection attempt happens in the
    /// background and requests wait for it.
    pub fn spawn(config: ElectrumConfig) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE);
        let (events, _) = broadcast::channel(EVENT_QUEUE);
        let request_timeout = config.request_timeout;

        tokio::spawn(run(config, rx, events.clone()));

        Self {
            commands,
            events,
            request_timeout,
        }
    }

    /// Subscribe to connect/disconnect/error notifications.
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    async fn call(&self, method: &'static str, params: Value) -> Result<Value> {
        let (respond, response) = oneshot::channel();
        let request = Request {
            method,
            params,
            respond,
        };

        let exchange = async {
            self.commands
                .send(request)
                .await
                .map_err(|_| anyhow!("electrum channel closed"))?;
            response
                .await
                .map_err(|_| anyhow!("electrum channel dropped {} request", method))?
        };

        match tokio::time::timeout(self.request_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "electrum request {} timed out after {:?}",
                method,
                self.request_timeout
            )),
        }
    }
}

/// Logs channel events until the client is gone; returns how many were seen.
///
/// A slow reader that falls behind skips the dropped events and keeps going.
pub async fn log_events(mut events: broadcast::Receiver<ChannelEvent>) -> usize {
    let mut seen = 0;
    loop {
        match events.recv().await {
            Ok(event) => {
                seen += 1;
                match event {
                    ChannelEvent::Connected { .. } => log::debug!("[CHANNEL] electrum connected"),
                    ChannelEvent::Disconnected => log::warn!("[CHANNEL] electrum disconnected, retrying"),
                    ChannelEvent::Error(e) => log::warn!("[CHANNEL] electrum error: {}", e),
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                log::debug!("[CHANNEL] event log lagged, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => return seen,
        }
    }
}

// =====================================================================
// ElectrumApi
// =====================================================================

#[async_trait]
impl ElectrumApi for ElectrumClient {
    async fn scripthash_get_balance(&self, scripthash: &str) -> Result<Balance> {
        let v = self
            .call("blockchain.scripthash.get_balance", json!([scripthash]))
            .await?;
        Ok(serde_json::from_value(v)?)
    }

    async fn scripthash_get_history(&self, scripthash: &str) -> Result<Vec<HistoryEntry>> {
        let v = self
            .call("blockchain.scripthash.get_history", json!([scripthash]))
            .await?;
        Ok(serde_json::from_value(v)?)
    }

    async fn scripthash_listunspent(&self, scripthash: &str) -> Result<Vec<UtxoEntry>> {
        let v = self
            .call("blockchain.scripthash.listunspent", json!([scripthash]))
            .await?;
        Ok(serde_json::from_value(v)?)
    }

    async fn transaction_get(&self, txid: &str, verbose: bool) -> Result<Value> {
        self.call("blockchain.transaction.get", json!([txid, verbose]))
            .await
    }

    async fn headers_subscribe(&self) -> Result<HeaderNotification> {
        let v = self.call("blockchain.headers.subscribe", json!([])).await?;
        Ok(serde_json::from_value(v)?)
    }
}

// =====================================================================
// Background Task
// =====================================================================

async fn run(
    config: ElectrumConfig,
    mut commands: mpsc::Receiver<Request>,
    events: broadcast::Sender<ChannelEvent>,
) {
    let endpoint = config.endpoint();

    loop {
        match connect(&config).await {
            Ok((reader, writer)) => {
                match serve(&config, reader, writer, &mut commands, &events).await {
                    Ok(()) => {
                        log::debug!("[CHANNEL] all handles dropped, closing {}", endpoint);
                        return;
                    }
                    Err(e) => {
                        log::info!("[CHANNEL] Disconnected from Electrum Server at {}", endpoint);
                        log::debug!("[CHANNEL] disconnect reason: {:#}", e);
                        let _ = events.send(ChannelEvent::Disconnected);
                    }
                }
            }
            Err(e) => {
                log::error!(
                    "[CHANNEL] Error connecting to Electrum Server at {}: {:#}",
                    endpoint,
                    e
                );
                let _ = events.send(ChannelEvent::Error(format!("{:#}", e)));
            }
        }

        tokio::time::sleep(config.retry_period).await;
    }
}

async fn connect(config: &ElectrumConfig) -> Result<(Reader, Writer)> {
    log::debug!("[CHANNEL] Connecting to {} (tls={}) ...", config.endpoint(), config.tls);

    let tcp = TcpStream::connect((config.host.as_str(), config.port)).await?;
    let stream: Box<dyn ElectrumStream> = if config.tls {
        let connector = TlsConnector::from(native_tls::TlsConnector::new()?);
        Box::new(connector.connect(&config.host, tcp).await?)
    } else {
        Box::new(tcp)
    };

    let (r, w) = tokio::io::split(stream);
    Ok((BufReader::new(r).lines(), w))
}

/// Runs one connection until it breaks (`Err`) or every handle is gone (`Ok`).
async fn serve(
    config: &ElectrumConfig,
    mut reader: Reader,
    mut writer: Writer,
    commands: &mut mpsc::Receiver<Request>,
    events: &broadcast::Sender<ChannelEvent>,
) -> Result<()> {
    let server_version = tokio::time::timeout(
        config.request_timeout,
        handshake(config, &mut reader, &mut writer),
    )
    .await
    .map_err(|_| anyhow!("server.version timed out"))??;

    log::info!(
        "[CHANNEL] Connected to Electrum Server at {} ({})",
        config.endpoint(),
        server_version
    );
    let _ = events.send(ChannelEvent::Connected { server_version });

    let mut pending = HashMap::new();
    let result = pump(&mut reader, &mut writer, commands, &mut pending).await;

    for (_, respond) in pending.drain() {
        let _ = respond.send(Err(anyhow!("electrum connection lost")));
    }

    result
}

async fn handshake(config: &ElectrumConfig, reader: &mut Reader, writer: &mut Writer) -> Result<Value> {
    send(
        writer,
        &json!({
            "jsonrpc": "2.0",
            "id": HANDSHAKE_ID,
            "method": "server.version",
            "params": [config.client_name, config.protocol_version]
        }),
    )
    .await?;

    loop {
        let line = reader
            .next_line()
            .await?
            .ok_or_else(|| anyhow!("socket closed during handshake"))?;

        if let Some((HANDSHAKE_ID, result)) = parse_response(&line)? {
            return result;
        }
    }
}

async fn pump(
    reader: &mut Reader,
    writer: &mut Writer,
    commands: &mut mpsc::Receiver<Request>,
    pending: &mut HashMap<u64, oneshot::Sender<Result<Value>>>,
) -> Result<()> {
    let mut next_id = HANDSHAKE_ID + 1;

    loop {
        tokio::select! {
            cmd = commands.recv() => {
                let Some(request) = cmd else {
                    return Ok(());
                };

                if request.respond.is_closed() {
                    log::trace!("[CHANNEL] skipping abandoned {} request", request.method);
                    continue;
                }

                let id = next_id;
                next_id = next_id.wrapping_add(1).max(HANDSHAKE_ID + 1);

                let payload = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "method": request.method,
                    "params": request.params
                });

                if let Err(e) = send(writer, &payload).await {
                    let _ = request.respond.send(Err(anyhow!("send {} failed: {}", request.method, e)));
                    return Err(e);
                }
                pending.insert(id, request.respond);
            }

            line = reader.next_line() => {
                let line = line?.ok_or_else(|| anyhow!("socket closed"))?;

                match parse_response(&line) {
                    Ok(Some((id, result))) => match pending.remove(&id) {
                        Some(respond) => {
                            let _ = respond.send(result);
                        }
                        None => log::debug!("[CHANNEL] response with unknown id {}", id),
                    },
                    Ok(None) => log::trace!("[CHANNEL] notification: {}", line.trim()),
                    Err(e) => log::error!("[CHANNEL] Electrum error: unparseable message ({:#})", e),
                }
            }
        }
    }
}

async fn send(writer: &mut Writer, v: &Value) -> Result<()> {
    let s = v.to_string();
    log::trace!("[CHANNEL] >>> {}", s);
    writer.write_all(s.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Splits one JSON-RPC line into `(id, result)`.
///
/// Notifications carry no id and yield `None`.
pub(crate) fn parse_response(line: &str) -> Result<Option<(u64, Result<Value>)>> {
    let mut msg: Value = serde_json::from_str(line)?;
    log::trace!("[CHANNEL] <<< {}", line.trim());

    let id = match msg.get("id") {
        None | Some(Value::Null) => return Ok(None),
        Some(id) => id
            .as_u64()
            .ok_or_else(|| anyhow!("response without numeric id"))?,
    };

    match msg.get("error") {
        Some(err) if !err.is_null() => {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            Ok(Some((id, Err(anyhow!("electrum error: {}", message)))))
        }
        _ => Ok(Some((id, Ok(msg["result"].take())))),
    }
}
