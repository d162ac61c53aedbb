
use std::time::Duration;

use harness::{
    dead_addr, echo_roundtrip, observes_close, spawn_relay, wait_until, ClosingBackend,
    EchoBackend,
};
use rand::Rng;
use switchyard_relay::RelayHandle;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

async fn all_released(relay: &RelayHandle, expected_closed: u64) -> bool {
    let admission = relay.admission.clone();
    let stats = relay.stats.clone();
    wait_until(Duration::from_secs(3), || {
        admission.active() == 0 && stats.snapshot().connections_closed == expected_closed
    })
    .await
}

#[tokio::test]
async fn client_close_reaches_backend() {
    let mut backend = EchoBackend::spawn().await.unwrap();
    let relay = spawn_relay(backend.addr, 0).await.unwrap();

    let mut client = TcpStream::connect(relay.data_addr).await.unwrap();
    assert_eq!(echo_roundtrip(&mut client, b"hi").await.unwrap(), b"hi");
    drop(client);

    assert!(
        backend.wait_closed(Duration::from_secs(2)).await,
        "backend should observe EOF after the client closes"
    );
    assert!(all_released(&relay, 1).await);
    assert_eq!(relay.stats.snapshot().connections_accepted, 1);
}

#[tokio::test]
async fn client_half_close_tears_down_session() {
    let mut backend = EchoBackend::spawn().await.unwrap();
    let relay = spawn_relay(backend.addr, 0).await.unwrap();

    let mut client = TcpStream::connect(relay.data_addr).await.unwrap();
    assert_eq!(echo_roundtrip(&mut client, b"hi").await.unwrap(), b"hi");
    client.shutdown().await.unwrap();

    assert!(backend.wait_closed(Duration::from_secs(2)).await);
    assert!(observes_close(&mut client, Duration::from_secs(2)).await);
    assert!(all_released(&relay, 1).await);
}

#[tokio::test]
async fn backend_close_reaches_client() {
    let backend = ClosingBackend::spawn().await.unwrap();
    let relay = spawn_relay(backend.addr, 0).await.unwrap();

    let mut client = TcpStream::connect(relay.data_addr).await.unwrap();
    assert!(
        observes_close(&mut client, Duration::from_secs(2)).await,
        "client should observe close after the backend closes"
    );
    assert!(all_released(&relay, 1).await);
}

#[tokio::test]
async fn dial_failure_closes_client_and_releases_slot() {
    let relay = spawn_relay(dead_addr().await, 1).await.unwrap();

    let mut client = TcpStream::connect(relay.data_addr).await.unwrap();
    assert!(observes_close(&mut client, Duration::from_secs(3)).await);
    assert!(all_released(&relay, 1).await);
    assert_eq!(relay.stats.snapshot().dial_failures, 1);

    // The single slot is available again.
    let mut again = TcpStream::connect(relay.data_addr).await.unwrap();
    assert!(observes_close(&mut again, Duration::from_secs(3)).await);
    assert!(all_released(&relay, 2).await);
    assert_eq!(relay.stats.snapshot().connections_rejected, 0);
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    ClientClosesImmediately,
    ClientClosesAfterEcho,
    BackendClosesImmediately,
    BothCloseImmediately,
    DialFails,
}

#[tokio::test]
async fn mixed_outcomes_release_exactly_once() {
    let echo = EchoBackend::spawn().await.unwrap();
    let closing = ClosingBackend::spawn().await.unwrap();

    let echo_relay = spawn_relay(echo.addr, 4).await.unwrap();
    let closing_relay = spawn_relay(closing.addr, 4).await.unwrap();
    let dead_relay = spawn_relay(dead_addr().await, 4).await.unwrap();

    let scenarios: Vec<Scenario> = {
        let mut rng = rand::rng();
        (0..40)
            .map(|_| match rng.random_range(0..5) {
                0 => Scenario::ClientClosesImmediately,
                1 => Scenario::ClientClosesAfterEcho,
                2 => Scenario::BackendClosesImmediately,
                3 => Scenario::BothCloseImmediately,
                _ => Scenario::DialFails,
            })
            .collect()
    };

    let relays = [&echo_relay, &closing_relay, &dead_relay];
    let mut expected = [0u64; 3];

    for chunk in scenarios.chunks(4) {
        for scenario in chunk {
            let index = match scenario {
                Scenario::ClientClosesImmediately | Scenario::ClientClosesAfterEcho => 0,
                Scenario::BackendClosesImmediately | Scenario::BothCloseImmediately => 1,
                Scenario::DialFails => 2,
            };
            expected[index] += 1;
        }

        let tasks: Vec<_> = chunk
            .iter()
            .map(|scenario| {
                let scenario = *scenario;
                let echo_addr = echo_relay.data_addr;
                let closing_addr = closing_relay.data_addr;
                let dead_addr = dead_relay.data_addr;
                tokio::spawn(async move {
                    match scenario {
                        Scenario::ClientClosesImmediately => {
                            drop(TcpStream::connect(echo_addr).await.unwrap());
                        }
                        Scenario::ClientClosesAfterEcho => {
                            let mut client = TcpStream::connect(echo_addr).await.unwrap();
                            echo_roundtrip(&mut client, b"ping").await.ok();
                        }
                        Scenario::BackendClosesImmediately => {
                            let mut client = TcpStream::connect(closing_addr).await.unwrap();
                            observes_close(&mut client, Duration::from_secs(2)).await;
                        }
                        Scenario::BothCloseImmediately => {
                            drop(TcpStream::connect(closing_addr).await.unwrap());
                        }
                        Scenario::DialFails => {
                            let mut client = TcpStream::connect(dead_addr).await.unwrap();
                            observes_close(&mut client, Duration::from_secs(2)).await;
                        }
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        // Every session of this batch is accepted and finished before the next.
        for (relay, expected) in relays.iter().zip(expected) {
            let admission = relay.admission.clone();
            let stats = relay.stats.clone();
            assert!(
                wait_until(Duration::from_secs(3), || {
                    let snapshot = stats.snapshot();
                    snapshot.connections_accepted + snapshot.connections_rejected == expected
                        && snapshot.connections_closed == snapshot.connections_accepted
                        && admission.active() == 0
                })
                .await
            );
        }
    }

    for (relay, expected) in relays.iter().zip(expected) {
        let stats = relay.stats.snapshot();
        assert_eq!(relay.admission.active(), 0);
        assert_eq!(stats.connections_rejected, 0);
        assert_eq!(stats.connections_accepted, expected);
        assert_eq!(
            stats.connections_closed, stats.connections_accepted,
            "every admitted session must be released exactly once"
        );
        assert!(relay.admission.release().is_err(), "nothing left to release");
    }
}
