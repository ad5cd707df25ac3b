use std::time::Duration;

use anyhow::{bail, Result};
use bytes::Bytes;
use tokio::net::UdpSocket;

use sawp_core::MAX_CHUNK_SIZE;
use sawp_services::{run_receiver, run_sender, Fault};

use crate::fault::Relay;
use crate::*;

async fn loopback_pair() -> Result<(UdpSocket, UdpSocket)> {
    let sender = UdpSocket::bind("127.0.0.1:0").await?;
    let receiver = UdpSocket::bind("127.0.0.1:0").await?;
    Ok((sender, receiver))
}

// ══════════════════════════════════════════════════════════════════════════════
//  Loopback UDP
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn multi_chunk_text_over_loopback() -> Result<()> {
    let (sender, receiver) = loopback_pair().await?;
    let dest = receiver.local_addr()?;
    let input = text_input(10_000, 1);

    let (report, output) = send_until_acked(
        &sender,
        dest,
        &receiver,
        input.clone(),
        &sender_config(200, MAX_CHUNK_SIZE),
    )
    .await?;

    assert_eq!(output, input);
    assert_eq!(report.chunks, 8);
    assert_eq!(report.bytes, 10_000);
    Ok(())
}

#[tokio::test]
async fn binary_stream_over_loopback() -> Result<()> {
    let (sender, receiver) = loopback_pair().await?;
    let dest = receiver.local_addr()?;
    let input = binary_input(5_000, 2);

    let (report, output) =
        send_until_acked(&sender, dest, &receiver, input.clone(), &sender_config(200, 512))
            .await?;

    assert_eq!(output, input);
    assert_eq!(report.bytes, 5_000);
    Ok(())
}

#[tokio::test]
async fn empty_input_sends_nothing() -> Result<()> {
    let (sender, receiver) = loopback_pair().await?;
    let dest = receiver.local_addr()?;

    let (report, output) =
        send_until_acked(&sender, dest, &receiver, Bytes::new(), &sender_config(200, 64)).await?;

    assert!(output.is_empty());
    assert_eq!(report.chunks, 0);
    assert_eq!(report.transmissions, 0);
    Ok(())
}

#[tokio::test]
async fn receiver_idle_timeout_returns_stats() -> Result<()> {
    let receiver = UdpSocket::bind("127.0.0.1:0").await?;
    let mut output = Vec::new();

    let stats = run_receiver(&receiver, &mut output, &receiver_config(1)).await?;

    assert!(output.is_empty());
    assert_eq!(stats.delivered_chunks, 0);
    assert_eq!(stats.peer, None);
    Ok(())
}

/// The sender keeps retransmitting while nobody is reading; once the
/// receiver starts, the queued copies arrive as duplicates and the transfer
/// completes.
#[tokio::test]
async fn sender_retries_until_receiver_starts() -> Result<()> {
    let (sender, receiver) = loopback_pair().await?;
    let dest = receiver.local_addr()?;
    let input = text_input(300, 3);
    let mut output = Vec::new();
    let send_config = sender_config(50, 100);
    let recv_config = receiver_config(0);

    let late_receiver = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        run_receiver(&receiver, &mut output, &recv_config).await
    };

    let report = tokio::select! {
        report = run_sender(&sender, dest, input.clone(), &send_config) => report?,
        stats = late_receiver => bail!("receiver stopped early: {stats:?}"),
    };

    assert_eq!(output, input);
    assert!(report.timeouts >= 1, "expected timeouts, got {report:?}");
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
//  Through the relay
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn scripted_faults_both_ways_still_deliver_in_order() -> Result<()> {
    let (sender, receiver) = loopback_pair().await?;
    let relay = Relay::bind(receiver.local_addr()?)
        .await?
        .toward_receiver([
            Fault::Drop,
            Fault::Corrupt,
            Fault::Duplicate,
            Fault::Delay,
            Fault::Pass,
            Fault::Drop,
        ])
        .toward_sender([Fault::Drop, Fault::Corrupt, Fault::Duplicate]);
    let relay_addr = relay.addr()?;
    let input = text_input(1_000, 4);
    let mut output = Vec::new();
    let send_config = sender_config(50, 64);
    let recv_config = receiver_config(0);

    let report = tokio::select! {
        report = run_sender(&sender, relay_addr, input.clone(), &send_config) => report?,
        stats = run_receiver(&receiver, &mut output, &recv_config) => {
            bail!("receiver stopped early: {stats:?}")
        }
        r = relay.run() => bail!("relay stopped: {r:?}"),
    };

    assert_eq!(output, input);
    assert_eq!(report.chunks, 16);
    assert!(report.retransmissions() >= 3, "too few retransmissions: {report:?}");
    Ok(())
}

#[tokio::test]
async fn corrupted_binary_chunk_is_nacked_and_resent() -> Result<()> {
    let (sender, receiver) = loopback_pair().await?;
    let relay = Relay::bind(receiver.local_addr()?)
        .await?
        .toward_receiver([Fault::Pass, Fault::Corrupt]);
    let relay_addr = relay.addr()?;
    let input = Bytes::from_static(&[0xff, 0xfe, 0x00, 0x01, 0x80, 0x7f]);
    let mut output = Vec::new();
    let send_config = sender_config(200, 3);
    let recv_config = receiver_config(0);

    let report = tokio::select! {
        report = run_sender(&sender, relay_addr, input.clone(), &send_config) => report?,
        stats = run_receiver(&receiver, &mut output, &recv_config) => {
            bail!("receiver stopped early: {stats:?}")
        }
        r = relay.run() => bail!("relay stopped: {r:?}"),
    };

    assert_eq!(output, input);
    assert_eq!(report.nacks, 1);
    assert_eq!(report.transmissions, 3);
    Ok(())
}
