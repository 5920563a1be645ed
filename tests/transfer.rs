//! Integration tests for the data path: segmentation, acknowledgement,
//! retransmission and congestion response.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use microtcp::segment::Control;
use microtcp::simulator::{MemoryTransport, Simulator, SimulatorConfig};
use microtcp::{Config, Connection, ConnectionState};

use common::{decode_all, establish, fast_config, RawPeer};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test(start_paused = true)]
async fn three_thousand_bytes_go_out_as_three_segments() {
    let (a, b) = MemoryTransport::pair();
    let client_sim = Simulator::capturing(a);
    let log = client_sim.controls();
    let mut client = Connection::new(client_sim, fast_config()).unwrap();
    let mut server = Connection::new(b, fast_config()).unwrap();
    server.listen().unwrap();
    establish(&mut client, &mut server).await;

    let base = client.seq_number();
    let data = pattern(3000);
    let mut buf = vec![0u8; 3000];
    let (sent, received) = tokio::join!(client.send(&data), server.recv(&mut buf));

    assert_eq!(sent.unwrap(), 3000);
    assert_eq!(received.unwrap(), 3000);
    assert_eq!(buf, data);

    // Skip SYN and the handshake ACK.
    let segments = decode_all(&log.transcript()[2..]);
    let lens: Vec<_> = segments.iter().map(|s| s.payload.len()).collect();
    assert_eq!(lens, vec![1400, 1400, 200]);
    let seqs: Vec<_> = segments.iter().map(|s| s.header.seq).collect();
    assert_eq!(
        seqs,
        vec![base, base.wrapping_add(1400), base.wrapping_add(2800)]
    );
    let checksums: HashSet<_> = segments.iter().map(|s| s.header.checksum).collect();
    assert_eq!(checksums.len(), 3);
    assert!(segments.iter().all(|s| s.header.control == Control::Ack));

    assert_eq!(client.seq_number(), base.wrapping_add(3000));
    assert_eq!(server.ack_number(), client.seq_number());
    assert_eq!(client.stats().packets_sent, 5);
}

#[tokio::test(start_paused = true)]
async fn data_flows_both_ways() {
    let (a, b) = MemoryTransport::pair();
    let mut client = Connection::new(a, fast_config()).unwrap();
    let mut server = Connection::new(b, fast_config()).unwrap();
    server.listen().unwrap();
    establish(&mut client, &mut server).await;

    let mut buf = [0u8; 4];
    let (sent, got) = tokio::join!(client.send(b"ping"), server.recv(&mut buf));
    assert_eq!((sent.unwrap(), got.unwrap()), (4, 4));
    assert_eq!(&buf, b"ping");

    let mut buf = [0u8; 4];
    let (sent, got) = tokio::join!(server.send(b"pong"), client.recv(&mut buf));
    assert_eq!((sent.unwrap(), got.unwrap()), (4, 4));
    assert_eq!(&buf, b"pong");

    assert_eq!(client.seq_number(), server.ack_number());
    assert_eq!(server.seq_number(), client.ack_number());
}

#[tokio::test(start_paused = true)]
async fn short_reads_keep_the_rest_buffered() {
    let (a, b) = MemoryTransport::pair();
    let mut client = Connection::new(a, fast_config()).unwrap();
    let mut server = Connection::new(b, fast_config()).unwrap();
    server.listen().unwrap();
    establish(&mut client, &mut server).await;

    let data = pattern(1000);
    let mut head = [0u8; 10];
    let (sent, got) = tokio::join!(client.send(&data), server.recv(&mut head));
    assert_eq!(sent.unwrap(), 1000);
    assert_eq!(got.unwrap(), 10);
    assert_eq!(&head[..], &data[..10]);

    // The remainder is already buffered; no traffic is needed.
    let mut rest = vec![0u8; 990];
    assert_eq!(server.recv(&mut rest).await.unwrap(), 990);
    assert_eq!(&rest[..], &data[10..]);
}

#[tokio::test(start_paused = true)]
async fn reliable_delivery_over_a_faulty_network() {
    let (a, b) = MemoryTransport::pair();
    let client_sim = Simulator::new(a, SimulatorConfig::default(), 0xC0FFEE);
    let server_sim = Simulator::new(b, SimulatorConfig::default(), 0xBEEF);
    let client_faults = client_sim.controls();
    let server_faults = server_sim.controls();

    let config = Config {
        max_retries: 32,
        ..fast_config()
    };
    let mut client = Connection::new(client_sim, config.clone()).unwrap();
    let mut server = Connection::new(server_sim, config).unwrap();
    server.listen().unwrap();
    establish(&mut client, &mut server).await;

    let faults = SimulatorConfig {
        loss_rate: 0.1,
        reorder_rate: 0.05,
        duplicate_rate: 0.05,
        corrupt_rate: 0.02,
        capture: false,
    };
    client_faults.set(faults.clone());
    server_faults.set(faults);

    let data = pattern(40_000);
    let client_side = async {
        let sent = client.send(&data).await.expect("send failed");
        // The final ACK of a close is never resent: only duplicate.
        let duplicating = SimulatorConfig {
            duplicate_rate: 0.05,
            ..SimulatorConfig::default()
        };
        client_faults.set(duplicating.clone());
        server_faults.set(duplicating);
        client.shutdown().await.expect("shutdown failed");
        sent
    };
    let server_side = async {
        let mut received = Vec::new();
        let mut buf = vec![0u8; 4096];
        while server.state() == ConnectionState::Established {
            let n = server.recv(&mut buf).await.expect("recv failed");
            received.extend_from_slice(&buf[..n]);
        }
        received
    };
    let (sent, received) = tokio::join!(client_side, server_side);

    assert_eq!(sent, data.len());
    assert_eq!(received.len(), data.len());
    assert!(received == data, "payload corrupted in transit");
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(server.state(), ConnectionState::Closed);

    let injected = client_faults.stats();
    assert!(injected.dropped > 0, "fault model never dropped anything");
    assert!(client.stats().packets_lost > 0);
}

#[tokio::test(start_paused = true)]
async fn triple_duplicate_ack_triggers_fast_retransmit() {
    let (a, b) = MemoryTransport::pair();
    let peer = RawPeer::new(b);
    let mut client = Connection::new(a, fast_config()).unwrap();

    let (c, (base, server_seq)) = tokio::join!(client.connect(peer.addr()), peer.accept(8192));
    c.unwrap();
    assert_eq!(client.seq_number(), base);

    let data = pattern(4200);
    let script = async {
        let mut flight = Vec::new();
        for _ in 0..3 {
            flight.push(peer.recv().await);
        }
        let seqs: Vec<_> = flight.iter().map(|s| s.header.seq).collect();
        assert_eq!(seqs, vec![base, base.wrapping_add(1400), base.wrapping_add(2800)]);

        // Pretend the first segment was lost.
        for _ in 0..3 {
            peer.send_control(Control::Ack, server_seq, base, 8192).await;
        }
        let resent = peer.recv().await;

        let mut next = base;
        if resent.header.seq == next {
            next = next.wrapping_add(resent.payload.len() as u32);
        }
        peer.send_control(Control::Ack, server_seq, next, 8192).await;
        while next != base.wrapping_add(4200) {
            let seg = peer.recv().await;
            if seg.header.seq == next {
                next = next.wrapping_add(seg.payload.len() as u32);
            }
            peer.send_control(Control::Ack, server_seq, next, 8192).await;
        }
        resent
    };
    let (sent, resent) = tokio::join!(client.send(&data), script);

    assert_eq!(sent.unwrap(), 4200);
    assert_eq!(resent.header.seq, base);
    assert_eq!(resent.payload, &data[..1400]);
    // ssthresh = 4200 / 2, cwnd restarted from one MSS.
    assert_eq!(client.ssthresh(), 2100);
    assert_eq!(client.cwnd(), 4060);
    assert_eq!(client.stats().packets_lost, 3);
    assert_eq!(client.seq_number(), base.wrapping_add(4200));
}

#[tokio::test(start_paused = true)]
async fn stale_ack_does_not_cut_a_round_short() {
    let (a, b) = MemoryTransport::pair();
    let peer = RawPeer::new(b);
    let mut client = Connection::new(a, fast_config()).unwrap();

    let (c, (base, server_seq)) = tokio::join!(client.connect(peer.addr()), peer.accept(8192));
    c.unwrap();

    let data = pattern(4200);
    let script = async {
        for _ in 0..3 {
            peer.recv().await;
        }
        // An ack from before this round, then the three real ones.
        peer.send_control(Control::Ack, server_seq, base.wrapping_sub(5), 8192)
            .await;
        for k in 1..=3u32 {
            peer.send_control(Control::Ack, server_seq, base.wrapping_add(1400 * k), 8192)
                .await;
        }
        peer.try_recv(Duration::from_millis(5)).await
    };
    let (sent, extra) = tokio::join!(client.send(&data), script);

    assert_eq!(sent.unwrap(), 4200);
    assert!(extra.is_none(), "unexpected retransmission");
    assert_eq!(client.stats().packets_lost, 0);
    assert_eq!(client.seq_number(), base.wrapping_add(4200));
}

#[tokio::test(start_paused = true)]
async fn timeout_shrinks_window_and_resends_from_last_ack() {
    let (a, b) = MemoryTransport::pair();
    let peer = RawPeer::new(b);
    let mut client = Connection::new(a, fast_config()).unwrap();

    let (c, (base, server_seq)) = tokio::join!(client.connect(peer.addr()), peer.accept(8192));
    c.unwrap();

    let data = pattern(2000);
    let script = async {
        // Swallow the first flight without answering.
        peer.recv().await;
        peer.recv().await;
        let resent = peer.recv().await;
        assert_eq!(resent.header.seq, base);
        assert_eq!(resent.payload.len(), 1400);
        peer.send_control(Control::Ack, server_seq, base.wrapping_add(1400), 8192)
            .await;
        let tail = peer.recv().await;
        assert_eq!(tail.header.seq, base.wrapping_add(1400));
        assert_eq!(tail.payload.len(), 600);
        peer.send_control(Control::Ack, server_seq, base.wrapping_add(2000), 8192)
            .await;
    };
    let (sent, ()) = tokio::join!(client.send(&data), script);

    assert_eq!(sent.unwrap(), 2000);
    assert_eq!(client.ssthresh(), 2100);
    assert_eq!(client.stats().packets_lost, 2);
}

#[tokio::test(start_paused = true)]
async fn receiver_discards_out_of_order_and_corrupt_segments() {
    let (a, b) = MemoryTransport::pair();
    let peer = RawPeer::new(a);
    let mut server = Connection::new(b, fast_config()).unwrap();
    server.listen().unwrap();

    let (accepted, (next, server_seq)) = tokio::join!(server.accept(), peer.connect(8192));
    accepted.unwrap();

    let script = async {
        let mut acks = Vec::new();

        peer.send_data(next + 5, server_seq, b"world").await;
        acks.push(peer.recv().await.header.ack);

        let mut garbage = microtcp::segment::Segment::new(
            microtcp::segment::Header::new(Control::Ack, next, server_seq, 8192),
            b"hello".to_vec(),
        )
        .encode();
        garbage[3] ^= 0x40;
        peer.send_raw(&garbage).await;

        peer.send_data(next, server_seq, b"hello").await;
        acks.push(peer.recv().await.header.ack);
        peer.send_data(next, server_seq, b"hello").await;
        acks.push(peer.recv().await.header.ack);
        peer.send_data(next + 5, server_seq, b"world").await;
        acks.push(peer.recv().await.header.ack);
        acks
    };
    let mut buf = [0u8; 10];
    let (got, acks) = tokio::join!(server.recv(&mut buf), script);

    assert_eq!(got.unwrap(), 10);
    assert_eq!(&buf, b"helloworld");
    assert_eq!(acks, vec![next, next + 5, next + 5, next + 10]);
    assert_eq!(server.ack_number(), next + 10);
    assert_eq!(server.stats().packets_lost, 1);
}

#[tokio::test(start_paused = true)]
async fn silent_peer_during_recv_is_not_fatal() {
    let (a, b) = MemoryTransport::pair();
    let mut client = Connection::new(a, fast_config()).unwrap();
    let mut server = Connection::new(b, fast_config()).unwrap();
    server.listen().unwrap();
    establish(&mut client, &mut server).await;

    let mut buf = [0u8; 8];
    let err = server.recv(&mut buf).await.unwrap_err();
    assert!(matches!(err, microtcp::ConnError::MaxRetriesExceeded(_)));
    assert_eq!(server.state(), ConnectionState::Established);

    let (sent, got) = tokio::join!(client.send(b"late"), server.recv(&mut buf[..4]));
    assert_eq!((sent.unwrap(), got.unwrap()), (4, 4));
}

#[tokio::test(start_paused = true)]
async fn unanswered_send_invalidates() {
    let (a, b) = MemoryTransport::pair();
    let peer = RawPeer::new(b);
    let mut client = Connection::new(a, fast_config()).unwrap();
    let (c, _) = tokio::join!(client.connect(peer.addr()), peer.accept(8192));
    c.unwrap();

    let err = client.send(b"into the void").await.unwrap_err();
    assert!(matches!(err, microtcp::ConnError::MaxRetriesExceeded(_)));
    assert_eq!(client.state(), ConnectionState::Invalid);
    drop(peer);
}
