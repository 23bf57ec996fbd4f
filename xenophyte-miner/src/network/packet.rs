//! Packet framing and the outbound queue.
//!
//! After the plaintext certificate, every packet on the wire is
//! `base64(AES-256-CFB8(pkcs7(payload))) + '*'`. [`PacketCodec`] implements
//! that framing for `tokio_util::codec::Framed`, and [`OutboundPacket`] pairs
//! a payload with the handler for its single reply.

use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::{BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder, Framed};

use super::constants::{FRAME_END, MAX_FRAME_LENGTH};
use super::error::{NetworkError, NetworkResult};
use crate::crypto::{CryptoError, TransportCipher};
use crate::tracing::prelude::*;

/// An outbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Written to the socket as-is (the handshake certificate).
    Plain(Bytes),
    /// Encrypted, base64-encoded and terminated with `*`.
    Encrypted(Bytes),
}

/// Codec for the node connection.
///
/// Decoded items are decrypted payloads with the padding removed.
#[derive(Debug)]
pub struct PacketCodec {
    cipher: TransportCipher,
    /// Bytes of the buffer already searched for the end marker.
    next_index: usize,
}

impl PacketCodec {
    pub fn new(cipher: TransportCipher) -> Self {
        Self {
            cipher,
            next_index: 0,
        }
    }
}

impl Decoder for PacketCodec {
    type Item = Vec<u8>;
    type Error = NetworkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let end = src[self.next_index..]
            .iter()
            .position(|&b| b == FRAME_END)
            .map(|offset| self.next_index + offset);

        let Some(end) = end else {
            if src.len() >= MAX_FRAME_LENGTH {
                return Err(NetworkError::Framing(format!(
                    "no end marker within {} bytes",
                    MAX_FRAME_LENGTH
                )));
            }
            self.next_index = src.len();
            return Ok(None);
        };

        self.next_index = 0;
        if end + 1 > MAX_FRAME_LENGTH {
            return Err(NetworkError::Framing(format!("frame too large: {} bytes", end + 1)));
        }

        let frame = src.split_to(end + 1);
        let ciphertext = BASE64
            .decode(&frame[..end])
            .map_err(CryptoError::from)?;
        let payload = self.cipher.decrypt(ciphertext)?;

        trace!(len = payload.len(), "Received packet");
        Ok(Some(payload))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(NetworkError::Framing(format!(
                "stream ended inside a frame ({} bytes without end marker)",
                buf.len()
            ))),
        }
    }
}

impl Encoder<Frame> for PacketCodec {
    type Error = NetworkError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Frame::Plain(payload) => {
                trace!(len = payload.len(), "Sending plain packet");
                dst.extend_from_slice(&payload);
            }
            Frame::Encrypted(payload) => {
                trace!(len = payload.len(), "Sending packet");
                let encoded = BASE64.encode(self.cipher.encrypt(&payload));
                dst.reserve(encoded.len() + 1);
                dst.extend_from_slice(encoded.as_bytes());
                dst.put_u8(FRAME_END);
            }
        }
        Ok(())
    }
}

/// Callback for the reply to an outbound packet.
///
/// Receives the decrypted reply and the time since the request write began.
/// Returning an error tears the connection down.
pub type ReplyHandler = Box<dyn FnOnce(&[u8], Duration) -> NetworkResult<()> + Send>;

/// A packet waiting in the outbound queue.
pub struct OutboundPacket {
    payload: Bytes,
    encrypted: bool,
    handler: Option<ReplyHandler>,
}

impl OutboundPacket {
    /// Plaintext packet with no reply.
    pub fn plain(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            encrypted: false,
            handler: None,
        }
    }

    /// Encrypted packet with no reply.
    pub fn encrypted(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            encrypted: true,
            handler: None,
        }
    }

    /// Encrypted request whose single reply goes to `handler`.
    pub fn request<F>(payload: impl Into<Bytes>, handler: F) -> Self
    where
        F: FnOnce(&[u8], Duration) -> NetworkResult<()> + Send + 'static,
    {
        Self {
            payload: payload.into(),
            encrypted: true,
            handler: Some(Box::new(handler)),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Run the reply handler directly, bypassing the socket.
    #[cfg(test)]
    pub(crate) fn respond(self, reply: &[u8], round_trip: Duration) -> NetworkResult<()> {
        match self.handler {
            Some(handler) => handler(reply, round_trip),
            None => Ok(()),
        }
    }

    /// Write the packet and, if a handler is attached, read exactly one
    /// reply and hand it over. The whole exchange is bounded by `timeout`.
    pub async fn execute<T>(
        self,
        framed: &mut Framed<T, PacketCodec>,
        timeout: Duration,
    ) -> NetworkResult<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let Self {
            payload,
            encrypted,
            handler,
        } = self;
        let frame = if encrypted {
            Frame::Encrypted(payload)
        } else {
            Frame::Plain(payload)
        };

        tokio::time::timeout(timeout, exchange(framed, frame, handler, Instant::now()))
            .await
            .map_err(|_| NetworkError::Timeout)?
    }
}

async fn exchange<T>(
    framed: &mut Framed<T, PacketCodec>,
    frame: Frame,
    handler: Option<ReplyHandler>,
    started: Instant,
) -> NetworkResult<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    framed.send(frame).await?;

    let Some(handler) = handler else {
        return Ok(());
    };

    let reply = framed.next().await.ok_or(NetworkError::ConnectionClosed)??;
    handler(&reply, started.elapsed())
}

impl std::fmt::Debug for OutboundPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundPacket")
            .field("len", &self.payload.len())
            .field("encrypted", &self.encrypted)
            .field("expects_reply", &self.handler.is_some())
            .finish()
    }
}

/// Sending half of a connection's FIFO packet queue.
#[derive(Debug, Clone)]
pub struct PacketQueue(mpsc::UnboundedSender<OutboundPacket>);

impl PacketQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundPacket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    /// Enqueue a packet. Returns `false` once the connection stopped
    /// accepting packets.
    pub fn send(&self, packet: OutboundPacket) -> bool {
        self.0.send(packet).is_ok()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{encode_frame, test_cipher};
    use super::*;

    #[test]
    fn test_encoded_frame_shape() {
        let mut codec = PacketCodec::new(test_cipher());
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::Encrypted(Bytes::from_static(b"MINER|wallet")), &mut buf)
            .unwrap();

        assert_eq!(buf.last(), Some(&FRAME_END));
        let decoded = BASE64.decode(&buf[..buf.len() - 1]).unwrap();
        // 12 bytes pad to one block.
        assert_eq!(decoded.len(), 16);
    }

    #[test]
    fn test_plain_frame_written_raw() {
        let mut codec = PacketCodec::new(test_cipher());
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::Plain(Bytes::from_static(b"XENOPHYTESEEDabc")), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"XENOPHYTESEEDabc");
    }

    #[test]
    fn test_decode_round_trip_various_lengths() {
        let cipher = test_cipher();
        let mut codec = PacketCodec::new(cipher.clone());
        for len in [0usize, 1, 15, 16, 17, 300] {
            let payload: Vec<u8> = (0..len).map(|i| b'A' + (i % 26) as u8).collect();
            let mut buf = BytesMut::new();
            codec
                .encode(Frame::Encrypted(Bytes::from(payload.clone())), &mut buf)
                .unwrap();
            assert_eq!(codec.decode(&mut buf).unwrap(), Some(payload));
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_decode_waits_for_marker() {
        let cipher = test_cipher();
        let frame = encode_frame(&cipher, b"SEND-LOGIN-ACCEPTED");
        let mut codec = PacketCodec::new(cipher);

        let (head, tail) = frame.split_at(frame.len() / 2);
        let mut buf = BytesMut::from(head);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(tail);
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some(&b"SEND-LOGIN-ACCEPTED"[..])
        );
    }

    #[test]
    fn test_decode_two_frames_in_one_read() {
        let cipher = test_cipher();
        let mut bytes = encode_frame(&cipher, b"first");
        bytes.extend(encode_frame(&cipher, b"second"));
        let mut codec = PacketCodec::new(cipher);
        let mut buf = BytesMut::from(&bytes[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(&b"first"[..]));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(&b"second"[..]));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_missing_marker_at_eof_is_error() {
        let cipher = test_cipher();
        let mut frame = encode_frame(&cipher, b"payload");
        frame.pop();
        let mut codec = PacketCodec::new(cipher);
        let mut buf = BytesMut::from(&frame[..]);

        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(NetworkError::Framing(_))
        ));
    }

    #[test]
    fn test_garbage_frame_is_error() {
        let mut codec = PacketCodec::new(test_cipher());
        let mut buf = BytesMut::from(&b"!!not base64!!*"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(NetworkError::Crypto(_))));
    }

    #[test]
    fn test_wrong_key_fails_padding() {
        let frame = encode_frame(&test_cipher(), b"SEND-LOGIN-ACCEPTED");
        let other = TransportCipher::new([1; 32], [2; 16]);
        let mut codec = PacketCodec::new(other);
        let mut buf = BytesMut::from(&frame[..]);
        // A wrong key almost always yields invalid padding.
        match codec.decode(&mut buf) {
            Err(NetworkError::Crypto(_)) => {}
            Ok(Some(payload)) => assert_ne!(payload, b"SEND-LOGIN-ACCEPTED"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_oversize_frame_rejected() {
        let mut codec = PacketCodec::new(test_cipher());
        let mut buf = BytesMut::from(&vec![b'A'; MAX_FRAME_LENGTH][..]);
        assert!(matches!(codec.decode(&mut buf), Err(NetworkError::Framing(_))));
    }

    #[tokio::test]
    async fn test_execute_without_handler_does_not_read() {
        let (client, mut server) = tokio::io::duplex(4096);
        let mut framed = Framed::new(client, PacketCodec::new(test_cipher()));

        OutboundPacket::plain(&b"XENOPHYTESEED"[..])
            .execute(&mut framed, Duration::from_secs(1))
            .await
            .unwrap();

        let mut buf = [0u8; 13];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut buf)
            .await
            .unwrap();
        assert_eq!(&buf, b"XENOPHYTESEED");
    }

    #[tokio::test]
    async fn test_execute_times_out_without_reply() {
        let (client, _server) = tokio::io::duplex(4096);
        let mut framed = Framed::new(client, PacketCodec::new(test_cipher()));

        let result = OutboundPacket::request(&b"RECEIVE-ASK-CURRENT-BLOCK-MINING"[..], |_, _| Ok(()))
            .execute(&mut framed, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(NetworkError::Timeout)));
    }

    #[test]
    fn test_queue_refuses_after_close() {
        let (queue, mut rx) = PacketQueue::new();
        assert!(queue.send(OutboundPacket::encrypted(&b"a"[..])));
        rx.close();
        assert!(!queue.send(OutboundPacket::encrypted(&b"b"[..])));
    }
}
