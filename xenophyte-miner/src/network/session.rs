//! Solo mining session logic.
//!
//! After login the session keeps exactly one job request in flight: it asks
//! for the current block header, and only when the header announces a new
//! target does it ask for the block method. Every reply handler enqueues the
//! next request, so polling is paced by the node's round trip.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::constants::{
    MINER_LOGIN, RECEIVE_ASK_CONTENT_BLOCK_METHOD, RECEIVE_ASK_CURRENT_BLOCK_MINING, RECEIVE_JOB,
    SEND_LOGIN_ACCEPTED,
};
use super::error::{NetworkError, NetworkResult};
use super::packet::{OutboundPacket, PacketQueue};
use super::{NetworkEvent, ShareStatus};
use crate::cpu_miner::FoundShare;
use crate::job::{BlockHeader, BlockMethod, JobTemplate};
use crate::tracing::prelude::*;

pub(super) type EventSender = mpsc::UnboundedSender<NetworkEvent>;

/// Indication of the last template handed to the miner. Outlives single
/// connections so a reconnect does not republish the same job.
pub(super) type LastIndication = Arc<Mutex<Option<String>>>;

/// Per-connection session state shared by the reply handlers.
#[derive(Clone)]
pub(super) struct Session {
    queue: PacketQueue,
    events: EventSender,
    last_indication: LastIndication,
}

impl Session {
    pub fn new(queue: PacketQueue, events: EventSender, last_indication: LastIndication) -> Self {
        Self {
            queue,
            events,
            last_indication,
        }
    }

    fn emit(&self, event: NetworkEvent) {
        // The receiver only goes away during shutdown.
        let _ = self.events.send(event);
    }

    /// The `MINER|<wallet>` login request.
    pub fn login(&self, wallet: &str) -> OutboundPacket {
        let session = self.clone();
        OutboundPacket::request(format!("{MINER_LOGIN}|{wallet}"), move |reply, round_trip| {
            if reply != SEND_LOGIN_ACCEPTED.as_bytes() {
                return Err(NetworkError::LoginRejected);
            }
            debug!(?round_trip, "Login accepted");
            session.emit(NetworkEvent::Ready);
            session.request_header();
            Ok(())
        })
    }

    pub fn request_header(&self) {
        let session = self.clone();
        let packet = OutboundPacket::request(RECEIVE_ASK_CURRENT_BLOCK_MINING, move |reply, _| {
            session.on_header(reply)
        });
        if !self.queue.send(packet) {
            trace!("Queue closed, header poll dropped");
        }
    }

    fn on_header(&self, reply: &[u8]) -> NetworkResult<()> {
        let header = match BlockHeader::parse(reply) {
            Ok(header) => header,
            Err(e) => {
                debug!(error = %e, "Ignoring block header");
                self.request_header();
                return Ok(());
            }
        };

        if self.last_indication.lock().as_deref() == Some(header.indication.as_str()) {
            self.request_header();
            return Ok(());
        }

        trace!(height = header.height, method = %header.method, "New block header");
        let payload = format!("{RECEIVE_ASK_CONTENT_BLOCK_METHOD}|{}", header.method);
        let session = self.clone();
        let packet = OutboundPacket::request(payload, move |reply, _| session.on_method(header, reply));
        if !self.queue.send(packet) {
            trace!("Queue closed, method request dropped");
        }
        Ok(())
    }

    fn on_method(&self, header: BlockHeader, reply: &[u8]) -> NetworkResult<()> {
        match BlockMethod::parse(reply).and_then(|method| JobTemplate::build(header, method)) {
            Ok(template) => {
                *self.last_indication.lock() = Some(template.indication.clone());
                self.emit(NetworkEvent::NewJob(Arc::new(template)));
            }
            Err(e) => warn!(error = %e, "Rejected block method"),
        }

        self.request_header();
        Ok(())
    }
}

/// The `RECEIVE-JOB` submission for a winning share.
pub(super) fn share_request(
    share: &FoundShare,
    user_agent: &str,
    events: EventSender,
) -> OutboundPacket {
    let payload = format!(
        "{RECEIVE_JOB}|{}|{}|{} {} {}|{}|{}|{}",
        share.encrypted_share,
        share.solution,
        share.first,
        share.operator,
        share.second,
        share.hash,
        share.height,
        user_agent,
    );

    let height = share.height;
    let job_type = share.job_type;
    OutboundPacket::request(payload, move |reply, round_trip| {
        match ShareStatus::from_reply(reply) {
            Some(status) => {
                let _ = events.send(NetworkEvent::ShareResult {
                    height,
                    job_type,
                    status,
                    round_trip,
                });
            }
            None => debug!(
                reply = %String::from_utf8_lossy(reply),
                "Ignoring unknown share reply"
            ),
        }
        Ok(())
    })
}
