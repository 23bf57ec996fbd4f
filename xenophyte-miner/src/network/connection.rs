//! Connection lifecycle and the per-connection drain task.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::{rngs::OsRng, RngCore};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use super::constants::{CERTIFICATE_ALPHABET, CERTIFICATE_SEED, CERTIFICATE_SIZE, SEED_NODE_PORT};
use super::error::{DisconnectReason, NetworkError, NetworkResult};
use super::packet::{OutboundPacket, PacketCodec, PacketQueue};
use super::session::{self, EventSender, LastIndication, Session};
use super::NetworkEvent;
use crate::cpu_miner::{FoundShare, ShareSink};
use crate::crypto::cipher::{IV_LEN, TRANSPORT_KEY_LEN};
use crate::crypto::random::random_index;
use crate::crypto::{CryptoResult, Pbkdf1, TransportCipher};
use crate::tracing::prelude::*;

/// Host and port of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse `host`, `host:port` or `scheme://host[:port][/]`.
    ///
    /// The port defaults to the seed node port.
    pub fn parse(url: &str) -> NetworkResult<Self> {
        let invalid = || NetworkError::InvalidUrl(url.to_string());

        let rest = url.trim();
        let rest = rest.split_once("://").map_or(rest, |(_, rest)| rest);
        let rest = rest.trim_end_matches('/');

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, after) = bracketed.split_once(']').ok_or_else(invalid)?;
            (host, after.strip_prefix(':'))
        } else {
            match rest.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };

        if host.is_empty() || host.contains('/') {
            return Err(invalid());
        }

        let port = match port {
            Some(port) => port.parse().map_err(|_| invalid())?,
            None => SEED_NODE_PORT,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// What a [`Network`] needs to log in.
#[derive(Debug, Clone)]
pub struct NetworkSettings {
    pub endpoint: Endpoint,
    pub wallet: String,
    pub user_agent: String,
    /// Bound on connecting and on every request/reply exchange.
    pub timeout: Duration,
}

/// A running connection: its drain task and the token that stops it.
struct Connection {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owner of the node connection.
///
/// `connect` and `disconnect` are serialized; packets can be queued from any
/// thread through [`Network::send`].
pub struct Network {
    settings: NetworkSettings,
    connection: tokio::sync::Mutex<Option<Connection>>,
    queue: Arc<parking_lot::Mutex<Option<PacketQueue>>>,
    last_indication: LastIndication,
    events: EventSender,
}

impl Network {
    pub fn new(settings: NetworkSettings, events: mpsc::UnboundedSender<NetworkEvent>) -> Self {
        Self {
            settings,
            connection: tokio::sync::Mutex::new(None),
            queue: Arc::default(),
            last_indication: Arc::default(),
            events,
        }
    }

    pub fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    /// Open a connection and start the login handshake.
    ///
    /// Does nothing if a connection is already up. On failure a
    /// `Disconnected` event is emitted as well as the error returned.
    pub async fn connect(&self) -> NetworkResult<()> {
        let mut connection = self.connection.lock().await;

        // The drain task clears the queue before reporting a disconnect.
        if connection.is_some() && self.is_connected() {
            return Ok(());
        }
        if let Some(stale) = connection.take() {
            let _ = stale.task.await;
        }

        match self.open().await {
            Ok(opened) => {
                *connection = Some(opened);
                Ok(())
            }
            Err(e) => {
                let _ = self.events.send(NetworkEvent::Disconnected(e.reason()));
                Err(e)
            }
        }
    }

    /// Stop the connection, flushing packets that were already queued.
    pub async fn disconnect(&self) {
        let mut connection = self.connection.lock().await;
        if let Some(current) = connection.take() {
            current.cancel.cancel();
            if let Err(e) = current.task.await {
                error!(error = %e, "Connection task failed");
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.queue.lock().is_some()
    }

    /// Queue a packet on the live connection. Returns `false` when there is
    /// none.
    pub fn send(&self, packet: OutboundPacket) -> bool {
        self.queue
            .lock()
            .as_ref()
            .is_some_and(|queue| queue.send(packet))
    }

    async fn open(&self) -> NetworkResult<Connection> {
        let endpoint = &self.settings.endpoint;
        debug!(%endpoint, "Connecting");

        let stream = tokio::time::timeout(
            self.settings.timeout,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .map_err(|_| NetworkError::ConnectTimeout)?
        .map_err(NetworkError::Connect)?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        let certificate = generate_certificate(&mut OsRng);
        let cipher = transport_cipher(&certificate)?;
        Ok(self.start(stream, cipher, certificate))
    }

    /// Queue the handshake and spawn the drain task over `io`.
    fn start<T>(&self, io: T, cipher: TransportCipher, certificate: Vec<u8>) -> Connection
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (queue, rx) = PacketQueue::new();
        let session = Session::new(
            queue.clone(),
            self.events.clone(),
            Arc::clone(&self.last_indication),
        );

        queue.send(OutboundPacket::plain(certificate));
        queue.send(session.login(&self.settings.wallet));
        *self.queue.lock() = Some(queue);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(drain(
            Framed::new(io, PacketCodec::new(cipher)),
            rx,
            self.settings.timeout,
            cancel.clone(),
            Arc::clone(&self.queue),
            self.events.clone(),
        ));

        Connection { cancel, task }
    }
}

impl ShareSink for Network {
    fn submit(&self, share: FoundShare) -> bool {
        let packet = session::share_request(&share, &self.settings.user_agent, self.events.clone());
        self.send(packet)
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        if let Some(current) = self.connection.get_mut().as_ref() {
            current.cancel.cancel();
        }
    }
}

/// `XENOPHYTESEED` followed by random certificate characters.
pub fn generate_certificate<R: RngCore + ?Sized>(rng: &mut R) -> Vec<u8> {
    let upper = CERTIFICATE_ALPHABET.len() - 1;
    let mut certificate = Vec::with_capacity(CERTIFICATE_SEED.len() + CERTIFICATE_SIZE);
    certificate.extend_from_slice(CERTIFICATE_SEED.as_bytes());
    certificate.extend((0..CERTIFICATE_SIZE).map(|_| CERTIFICATE_ALPHABET[random_index(rng, upper)]));
    certificate
}

/// Derive the connection key and IV from a handshake certificate.
///
/// The salt is the uppercase hex of the first eight certificate bytes.
pub fn transport_cipher(certificate: &[u8]) -> CryptoResult<TransportCipher> {
    let salt = hex::encode_upper(certificate.get(..8).unwrap_or(certificate));
    let mut kdf = Pbkdf1::new(certificate, salt.as_bytes())?;

    let mut key = [0u8; TRANSPORT_KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    kdf.fill_bytes(&mut key)?;
    kdf.fill_bytes(&mut iv)?;
    Ok(TransportCipher::new(key, iv))
}

/// Execute queued packets one at a time until an error or cancellation.
async fn drain<T>(
    mut framed: Framed<T, PacketCodec>,
    mut rx: mpsc::UnboundedReceiver<OutboundPacket>,
    timeout: Duration,
    cancel: CancellationToken,
    queue: Arc<parking_lot::Mutex<Option<PacketQueue>>>,
    events: EventSender,
) where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let reason = loop {
        let packet = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                break flush(&mut framed, &mut rx, timeout, &queue).await;
            }
            packet = rx.recv() => packet,
        };

        let Some(packet) = packet else {
            break DisconnectReason::Requested;
        };

        if let Err(e) = packet.execute(&mut framed, timeout).await {
            debug!(error = %e, "Packet exchange failed");
            break e.reason();
        }
    };

    queue.lock().take();
    rx.close();
    let _ = events.send(NetworkEvent::Disconnected(reason));
}

/// Refuse new packets, then run the ones already queued.
async fn flush<T>(
    framed: &mut Framed<T, PacketCodec>,
    rx: &mut mpsc::UnboundedReceiver<OutboundPacket>,
    timeout: Duration,
    queue: &parking_lot::Mutex<Option<PacketQueue>>,
) -> DisconnectReason
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    queue.lock().take();
    rx.close();

    while let Some(packet) = rx.recv().await {
        if let Err(e) = packet.execute(framed, timeout).await {
            debug!(error = %e, "Flush stopped");
            break;
        }
    }
    DisconnectReason::Requested
}
