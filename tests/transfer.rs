//! End-to-end transfers between a sender and a receiver on loopback.
//!
//! Each test spins up both endpoints as separate tokio tasks so they can make
//! progress concurrently, and wraps the whole exchange in a timeout so a
//! protocol bug fails the test instead of hanging it.

use std::sync::Arc;
use std::time::Duration;

use reliable_udp::{
    simulator::{Fault, RandomFaults, Scripted},
    FaultConfig, ReceiveReport, Receiver, SenderSession, Socket, TransferConfig, TransferError,
    TransferReport, HEADER_LEN,
};

const TEST_DEADLINE: Duration = Duration::from_secs(20);

async fn ephemeral() -> Socket {
    Socket::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind failed")
}

fn config(payload: usize) -> TransferConfig {
    TransferConfig {
        packet_size: HEADER_LEN + payload,
        ack_timeout: Duration::from_millis(200),
        max_retries: 12,
        idle_timeout: Some(Duration::from_secs(10)),
    }
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Run one transfer and return what the receiver wrote plus both reports.
async fn run_transfer(
    input: Vec<u8>,
    config: TransferConfig,
    receiver_faults: Option<FaultConfig>,
    sender_faults: Option<FaultConfig>,
) -> (Vec<u8>, ReceiveReport, TransferReport) {
    let mut receiver = Receiver::new(ephemeral().await, config.clone());
    if let Some(faults) = receiver_faults {
        receiver = receiver.with_faults(Box::new(RandomFaults::new(faults)));
    }
    let receiver_addr = receiver.local_addr();

    let receiving = tokio::spawn(async move {
        let mut sink = Vec::new();
        let report = receiver.run(&mut sink).await.expect("receiver failed");
        (sink, report)
    });

    let sending = tokio::spawn(async move {
        let socket = Arc::new(ephemeral().await);
        let mut session = SenderSession::start(socket, receiver_addr, config).expect("start");
        if let Some(faults) = sender_faults {
            let delay = faults.reorder_delay;
            session = session.with_reordering(Box::new(RandomFaults::new(faults)), delay);
        }
        session.transfer(&input[..]).await.expect("sender failed")
    });

    let (received, sent) = tokio::time::timeout(TEST_DEADLINE, async {
        tokio::join!(receiving, sending)
    })
    .await
    .expect("transfer timed out");

    let (sink, receive_report) = received.unwrap();
    (sink, receive_report, sent.unwrap())
}

#[tokio::test]
async fn perfect_channel_roundtrip() {
    let input = sample(10_000);
    let (output, received, sent) = run_transfer(input.clone(), config(100), None, None).await;

    assert_eq!(output, input);
    // 100 full chunks plus the EOF packet.
    assert_eq!(sent.packets, 101);
    assert_eq!(sent.bytes, 10_000);
    assert_eq!(received.packets_accepted, 101);
    assert_eq!(received.bytes_written, 10_000);
}

#[tokio::test]
async fn partial_final_chunk_roundtrip() {
    let input = sample(1_234);
    let (output, _, sent) = run_transfer(input.clone(), config(500), None, None).await;

    assert_eq!(output, input);
    assert_eq!(sent.packets, 4); // 500 + 500 + 234 + EOF
}

#[tokio::test]
async fn empty_input_roundtrip() {
    let (output, received, sent) = run_transfer(Vec::new(), config(64), None, None).await;

    assert!(output.is_empty());
    assert_eq!(sent.packets, 1);
    assert_eq!(received.packets_accepted, 1);
}

#[tokio::test]
async fn survives_loss_and_reordering() {
    let input = sample(4_000);
    let loss = FaultConfig {
        loss_probability: 0.25,
        seed: Some(17),
        ..FaultConfig::none()
    };
    let reorder = FaultConfig {
        reorder_probability: 0.25,
        reorder_delay: Duration::from_millis(20),
        seed: Some(23),
        ..FaultConfig::none()
    };

    let cfg = TransferConfig {
        ack_timeout: Duration::from_millis(50),
        ..config(128)
    };
    let (output, received, sent) =
        run_transfer(input.clone(), cfg, Some(loss), Some(reorder)).await;

    assert_eq!(output, input);
    assert!(received.dropped > 0, "seeded loss should drop something");
    assert!(sent.retransmissions > 0);
    assert!(sent.delayed > 0, "seeded reorder should delay something");
}

#[tokio::test]
async fn corruption_preserves_length_and_order() {
    let input = vec![0u8; 3_000];
    let corrupt = FaultConfig {
        corruption_probability: 0.5,
        seed: Some(5),
        ..FaultConfig::none()
    };

    let (output, _, _) = run_transfer(input.clone(), config(100), Some(corrupt), None).await;

    // Payload bytes may be flipped, but no packet is lost, duplicated, or
    // misplaced: headers are never corrupted.
    assert_eq!(output.len(), input.len());
    assert!(output.iter().any(|&b| b == 0xff));
    for chunk in output.chunks(100) {
        assert!(chunk.iter().filter(|&&b| b == 0xff).count() <= 1);
    }
}

#[tokio::test]
async fn single_dropped_packet_is_retransmitted() {
    let cfg = config(8);
    let mut receiver = Receiver::new(ephemeral().await, cfg.clone())
        .with_faults(Box::new(Scripted::drop_nth(3)));
    let receiver_addr = receiver.local_addr();

    let receiving = tokio::spawn(async move {
        let mut sink = Vec::new();
        let report = receiver.run(&mut sink).await.expect("receiver failed");
        (sink, report)
    });

    let socket = Arc::new(ephemeral().await);
    let session = SenderSession::start(socket, receiver_addr, cfg).unwrap();
    let input = b"0123456789abcdefghijklmnopqrstuv".to_vec();
    let sent = tokio::time::timeout(TEST_DEADLINE, session.transfer(&input[..]))
        .await
        .expect("sender timed out")
        .expect("sender failed");

    let (output, received) = receiving.await.unwrap();
    assert_eq!(output, input);
    assert_eq!(received.dropped, 1);
    assert_eq!(sent.retransmissions, 1);
}

#[tokio::test]
async fn delayed_packet_arrives_as_duplicate() {
    let cfg = config(8);
    let mut receiver = Receiver::new(ephemeral().await, cfg.clone());
    let receiver_addr = receiver.local_addr();

    let receiving = tokio::spawn(async move {
        let mut sink = Vec::new();
        let report = receiver.run(&mut sink).await.expect("receiver failed");
        (sink, report)
    });

    // First transmission of packet 0 is held back; its retransmission goes
    // out normally and releases the held copy, which arrives late.
    let socket = Arc::new(ephemeral().await);
    let mut session = SenderSession::start(socket, receiver_addr, cfg)
        .unwrap()
        .with_reordering(Box::new(Scripted::new([Fault::Delay])), Duration::from_millis(5));

    let sent = tokio::time::timeout(TEST_DEADLINE, async {
        assert_eq!(session.send(b"first!!!", false).await.unwrap(), 0);
        // Give the held copy time to land before the receiver can finish.
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.send(b"second!!", false).await.unwrap();
        session.send(&[], true).await.unwrap();
        let report = session.report().clone();
        session.shutdown().await;
        report
    })
    .await
    .expect("sender timed out");

    let (output, received) = receiving.await.unwrap();
    assert_eq!(output, b"first!!!second!!".to_vec());
    assert_eq!(sent.delayed, 1);
    assert_eq!(sent.retransmissions, 1);
    assert_eq!(received.duplicates, 1);
    assert_eq!(received.packets_accepted, 3);
}

#[tokio::test]
async fn total_loss_aborts_with_sequence_number() {
    let cfg = TransferConfig {
        max_retries: 3,
        ack_timeout: Duration::from_millis(30),
        ..config(16)
    };
    let black_hole = FaultConfig {
        loss_probability: 1.0,
        ..FaultConfig::none()
    };
    let mut receiver = Receiver::new(ephemeral().await, cfg.clone())
        .with_faults(Box::new(RandomFaults::seeded(black_hole, 1)));
    let receiver_addr = receiver.local_addr();

    let socket = Arc::new(ephemeral().await);
    let session = SenderSession::start(socket, receiver_addr, cfg).unwrap();

    let mut sink = Vec::new();
    let (received, sent) = tokio::time::timeout(TEST_DEADLINE, async {
        tokio::select! {
            sent = session.transfer(&b"never arrives"[..]) => (None, Some(sent)),
            received = receiver.run(&mut sink) => (Some(received), None),
        }
    })
    .await
    .expect("sender did not give up");

    assert!(received.is_none(), "receiver must not finish");
    match sent.unwrap() {
        Err(TransferError::Aborted { seq, attempts }) => {
            assert_eq!(seq, 0);
            assert_eq!(attempts, 4);
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert!(sink.is_empty());
    assert_eq!(receiver.report().dropped, 4);
}

#[tokio::test]
async fn receiver_stops_after_eof() {
    let cfg = config(32);
    let mut receiver = Receiver::new(ephemeral().await, cfg.clone());
    let receiver_addr = receiver.local_addr();

    let socket = Arc::new(ephemeral().await);
    let session = SenderSession::start(socket, receiver_addr, cfg).unwrap();

    let mut sink = Vec::new();
    let (received, sent) = tokio::time::timeout(TEST_DEADLINE, async {
        tokio::join!(receiver.run(&mut sink), session.transfer(&b"done"[..]))
    })
    .await
    .expect("transfer timed out");

    received.unwrap();
    sent.unwrap();
    assert!(receiver.session().is_terminated());
    assert_eq!(sink, b"done".to_vec());
}
