//! Drives a full solo session against a fake seed node on loopback.

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use xenophyte_miner::cpu_miner::{FoundShare, Operator, ShareSink};
use xenophyte_miner::network::{
    transport_cipher, DisconnectReason, Endpoint, Frame, Network, NetworkEvent, NetworkSettings,
    PacketCodec, ShareStatus,
};
use xenophyte_miner::types::JobType;

const CERTIFICATE_LEN: usize = 13 + 256;

const HEADER: &str = "SEND-CURRENT-BLOCK-MINING|ID=1050878&\
    HASH=8D67ED6841B2305E0B23A5D009015F466BCBCEA0B5541263E0682B2E576B0CB9&\
    ALGORITHM=AES&SIZE=256&METHOD=XENOPHYTE&\
    KEY=Uos4dc09b3pgQGnII985eLmfLRKW6gG5FC3J6ctarAnRe2Uhof0a5Rx5vBi0JekuKz1ufEzJmp1Zou&\
    JOB=2;10107&REWARD=10.00000000&DIFFICULTY=10107&TIMESTAMP=1654187614&\
    INDICATION=ECBC42F0E83175E174FA6AB566EBEA88D97C2195BDB6E19483CDAD1FFC8EAF2A\
    657BB8EF53E0D04FAFEF7539F7E9724F820517F560829288C0E04B4C58DD693B&\
    NETWORK_HASHRATE=12128&LIFETIME=360";

const METHOD: &str = "SEND-CONTENT-BLOCK-METHOD|1#256#128#XENOPHYTEXORKEY";

/// Accept one miner, complete the handshake and hand back the framed
/// stream.
async fn accept(listener: &TcpListener) -> Framed<TcpStream, PacketCodec> {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut certificate = vec![0u8; CERTIFICATE_LEN];
    stream.read_exact(&mut certificate).await.unwrap();
    assert!(certificate.starts_with(b"XENOPHYTESEED"));

    let cipher = transport_cipher(&certificate).unwrap();
    Framed::new(stream, PacketCodec::new(cipher))
}

async fn recv(node: &mut Framed<TcpStream, PacketCodec>) -> Option<String> {
    let packet = node.next().await?.ok()?;
    Some(String::from_utf8(packet).unwrap())
}

async fn reply(node: &mut Framed<TcpStream, PacketCodec>, payload: &str) {
    node.send(Frame::Encrypted(Bytes::copy_from_slice(payload.as_bytes())))
        .await
        .unwrap();
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<NetworkEvent>) -> NetworkEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event within timeout")
        .expect("event channel open")
}

async fn start(
    node: impl FnOnce(TcpListener) -> JoinHandle<Vec<String>>,
) -> (Network, mpsc::UnboundedReceiver<NetworkEvent>, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let node = node(listener);

    let settings = NetworkSettings {
        endpoint: Endpoint::parse(&format!("127.0.0.1:{port}")).unwrap(),
        wallet: "WALLET".into(),
        user_agent: "xenophyte-miner/test".into(),
        timeout: Duration::from_secs(5),
    };
    let (tx, events) = mpsc::unbounded_channel();
    (Network::new(settings, tx), events, node)
}

#[tokio::test]
async fn test_solo_session_job_and_share() {
    let (network, mut events, node) = start(|listener| {
        tokio::spawn(async move {
            let mut node = accept(&listener).await;
            let mut log = Vec::new();

            while let Some(packet) = recv(&mut node).await {
                log.push(packet.clone());
                if packet.starts_with("MINER|") {
                    reply(&mut node, "SEND-LOGIN-ACCEPTED").await;
                } else if packet == "RECEIVE-ASK-CURRENT-BLOCK-MINING" {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    reply(&mut node, HEADER).await;
                } else if packet.starts_with("RECEIVE-ASK-CONTENT-BLOCK-METHOD|") {
                    reply(&mut node, METHOD).await;
                } else if packet.starts_with("RECEIVE-JOB|") {
                    reply(&mut node, "SEND-JOB-STATUS|UNLOCK|1050878").await;
                }
            }
            log
        })
    })
    .await;

    network.connect().await.unwrap();
    assert!(matches!(next_event(&mut events).await, NetworkEvent::Ready));

    match next_event(&mut events).await {
        NetworkEvent::NewJob(job) => {
            assert_eq!(job.height, 1050878);
            assert_eq!(job.method, "XENOPHYTE");
            assert_eq!((job.min_range, job.max_range), (2, 10107));
            assert_eq!(job.aes_round, 1);
            assert_eq!(job.easy_values.len(), 256);
        }
        other => panic!("expected NewJob, got {other:?}"),
    }

    let share = FoundShare {
        height: 1050878,
        job_type: JobType::Random,
        first: 57,
        operator: Operator::Sub,
        second: 13,
        solution: 44,
        encrypted_share: "AB".repeat(64),
        hash: "CD".repeat(64),
    };
    assert!(network.submit(share));

    match next_event(&mut events).await {
        NetworkEvent::ShareResult {
            height,
            job_type,
            status,
            ..
        } => {
            assert_eq!(height, 1050878);
            assert_eq!(job_type, JobType::Random);
            assert_eq!(status, ShareStatus::Accepted);
        }
        other => panic!("expected ShareResult, got {other:?}"),
    }

    network.disconnect().await;
    assert!(matches!(
        next_event(&mut events).await,
        NetworkEvent::Disconnected(DisconnectReason::Requested)
    ));
    assert!(!network.is_connected());

    let log = node.await.unwrap();
    assert_eq!(log[0], "MINER|WALLET");
    assert_eq!(log[1], "RECEIVE-ASK-CURRENT-BLOCK-MINING");
    assert_eq!(log[2], "RECEIVE-ASK-CONTENT-BLOCK-METHOD|XENOPHYTE");

    // The method was only requested once; later polls saw the same block.
    let method_requests = log
        .iter()
        .filter(|p| p.starts_with("RECEIVE-ASK-CONTENT-BLOCK-METHOD"))
        .count();
    assert_eq!(method_requests, 1);

    let submitted = log
        .iter()
        .find(|p| p.starts_with("RECEIVE-JOB|"))
        .expect("share submitted");
    assert_eq!(
        *submitted,
        format!(
            "RECEIVE-JOB|{}|44|57 - 13|{}|1050878|xenophyte-miner/test",
            "AB".repeat(64),
            "CD".repeat(64)
        )
    );
}

#[tokio::test]
async fn test_login_rejected_disconnects() {
    let (network, mut events, node) = start(|listener| {
        tokio::spawn(async move {
            let mut node = accept(&listener).await;
            let mut log = Vec::new();
            if let Some(login) = recv(&mut node).await {
                log.push(login);
                reply(&mut node, "SEND-LOGIN-REFUSED").await;
            }
            // Wait for the miner to hang up.
            while recv(&mut node).await.is_some() {}
            log
        })
    })
    .await;

    network.connect().await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        NetworkEvent::Disconnected(DisconnectReason::LoginFailed)
    ));
    assert!(!network.is_connected());

    // The drain task is gone; dropping the network closes the socket.
    drop(network);
    let log = node.await.unwrap();
    assert_eq!(log, vec!["MINER|WALLET".to_string()]);
}

#[tokio::test]
async fn test_unreachable_node_reports_connection_failed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let settings = NetworkSettings {
        endpoint: Endpoint::parse(&format!("127.0.0.1:{port}")).unwrap(),
        wallet: "WALLET".into(),
        user_agent: "xenophyte-miner/test".into(),
        timeout: Duration::from_secs(5),
    };
    let (tx, mut events) = mpsc::unbounded_channel();
    let network = Network::new(settings, tx);

    assert!(network.connect().await.is_err());
    assert!(matches!(
        next_event(&mut events).await,
        NetworkEvent::Disconnected(DisconnectReason::ConnectionFailed)
    ));
}
