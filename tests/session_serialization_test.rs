// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! The session must never let two commands overlap on the transport, no
//! matter how many tasks use it at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ctp10_gateway::instrument::drivers::simulated::{SimulatedConnector, SimulatedCtp10};
use ctp10_gateway::instrument::{
    GatewayError, InstrumentError, InstrumentResult, InstrumentSession, ScpiTransport,
    TransportConnector,
};

/// Counts round trips in flight across every transport it opens and keeps
/// the order in which commands reached the wire.
#[derive(Default)]
struct Overlap {
    in_flight: AtomicUsize,
    max_seen: AtomicUsize,
    round_trips: AtomicUsize,
    wire: Mutex<Vec<String>>,
}

impl Overlap {
    fn enter(&self, command: &str) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        self.wire.lock().unwrap().push(command.to_string());
    }

    fn wire(&self) -> Vec<String> {
        self.wire.lock().unwrap().clone()
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct WatchedTransport {
    inner: Box<dyn ScpiTransport>,
    overlap: Arc<Overlap>,
}

impl WatchedTransport {
    fn watch<T>(&mut self, command: &str, f: impl FnOnce(&mut dyn ScpiTransport) -> T) -> T {
        self.overlap.enter(command);
        // Widen the window a concurrent command would have to slip in
        std::thread::sleep(Duration::from_micros(200));
        let result = f(self.inner.as_mut());
        self.overlap.leave();
        result
    }
}

impl ScpiTransport for WatchedTransport {
    fn write(&mut self, command: &str) -> InstrumentResult<()> {
        self.watch(command, |io| io.write(command))
    }

    fn query(&mut self, command: &str) -> InstrumentResult<String> {
        self.watch(command, |io| io.query(command))
    }

    fn query_block(&mut self, command: &str) -> InstrumentResult<Vec<u8>> {
        self.watch(command, |io| io.query_block(command))
    }

    fn close(&mut self) -> InstrumentResult<()> {
        self.inner.close()
    }
}

struct WatchedConnector {
    inner: SimulatedConnector,
    overlap: Arc<Overlap>,
}

impl TransportConnector for WatchedConnector {
    fn open(&self, address: &str, timeout: Duration) -> InstrumentResult<Box<dyn ScpiTransport>> {
        Ok(Box::new(WatchedTransport {
            inner: self.inner.open(address, timeout)?,
            overlap: Arc::clone(&self.overlap),
        }))
    }

    fn name(&self) -> &'static str {
        "watched"
    }
}

async fn watched_session() -> (Arc<InstrumentSession>, Arc<Overlap>) {
    let overlap = Arc::new(Overlap::default());
    let connector = WatchedConnector {
        inner: SimulatedConnector::new(SimulatedCtp10::new().with_trace_points(200)),
        overlap: Arc::clone(&overlap),
    };
    let session = Arc::new(InstrumentSession::new(
        Box::new(connector),
        "SIMULATED::WATCHED".to_string(),
        Duration::from_secs(5),
    ));
    session.connect(None, None).await.expect("connects");
    (session, overlap)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_never_overlap() {
    let (session, overlap) = watched_session().await;

    let mut tasks = Vec::new();
    for i in 0..24u8 {
        let session = Arc::clone(&session);
        tasks.push(tokio::spawn(async move {
            match i % 4 {
                0 => session.snapshot(4).await.map(|_| ()),
                1 => session
                    .execute(|ctp| ctp.detector(4, 1).trace(1))
                    .await
                    .map(|_| ()),
                2 => session
                    .execute(move |ctp| ctp.tls(1 + i % 4).set_power_dbm(1.0))
                    .await,
                _ => session.execute(|ctp| ctp.condition_register()).await.map(|_| ()),
            }
        }));
    }
    for task in tasks {
        task.await.expect("task joins").expect("command succeeds");
    }

    assert_eq!(overlap.max_seen.load(Ordering::SeqCst), 1);
    assert!(overlap.round_trips.load(Ordering::SeqCst) > 24);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshot_is_one_uninterrupted_group() {
    let (session, overlap) = watched_session().await;

    // Other clients keep hitting the same detector while snapshots are taken
    let mut writers = Vec::new();
    for w in 0..3 {
        let session = Arc::clone(&session);
        writers.push(tokio::spawn(async move {
            for n in 0..30 {
                let nm = if (n + w) % 2 == 0 { 1310.0 } else { 1550.0 };
                session
                    .execute(move |ctp| ctp.detector(4, 1).set_wavelength_nm(nm))
                    .await
                    .expect("write succeeds");
                session
                    .execute(|ctp| ctp.detector(4, 2).power())
                    .await
                    .expect("read succeeds");
            }
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..2 {
        let session = Arc::clone(&session);
        readers.push(tokio::spawn(async move {
            for _ in 0..15 {
                let snapshot = session.snapshot(4).await.expect("snapshot");
                assert_eq!(snapshot.unit, "dBm");
            }
        }));
    }
    for task in writers.into_iter().chain(readers) {
        task.await.expect("task joins");
    }

    let group = [
        ":CTP:SENS4:CHAN1:POW:WAV?",
        ":CTP:SENS4:CHAN1:POW:UNIT?",
        ":CTP:SENS4:CHAN1:POW?",
        ":CTP:SENS4:CHAN2:POW?",
        ":CTP:SENS4:CHAN3:POW?",
        ":CTP:SENS4:CHAN4:POW?",
    ];
    let wire = overlap.wire();
    let starts: Vec<usize> = wire
        .iter()
        .enumerate()
        .filter(|(_, command)| command.as_str() == group[0])
        .map(|(seq, _)| seq)
        .collect();
    assert_eq!(starts.len(), 30);
    for seq in starts {
        let seen: Vec<&str> = wire[seq..]
            .iter()
            .take(group.len())
            .map(String::as_str)
            .collect();
        assert_eq!(seen, group, "snapshot starting at #{} was interleaved", seq);
    }

    // Every concurrent write reached the wire
    let writes = wire.iter().filter(|c| c.ends_with("NM")).count();
    assert_eq!(writes, 90);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lock_is_released_after_a_failed_command() {
    let (session, _overlap) = watched_session().await;

    let err = session
        .execute(|ctp| -> InstrumentResult<()> {
            ctp.transport().write(":NOT:A:COMMAND")?;
            ctp.check_errors()
        })
        .await
        .unwrap_err();
    match err {
        GatewayError::Hardware(InstrumentError::Status(message)) => {
            assert!(message.contains("-113"), "{}", message)
        }
        other => panic!("unexpected error {:?}", other),
    }

    let id = tokio::time::timeout(Duration::from_secs(2), session.identify())
        .await
        .expect("lock released")
        .expect("identify");
    assert!(id.starts_with("EXFO,CTP10"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disconnect_is_idempotent_and_blocks_commands() {
    let (session, _overlap) = watched_session().await;

    assert!(session.disconnect().await.expect("first disconnect"));
    assert!(!session.disconnect().await.expect("second disconnect"));
    assert!(!session.is_connected());

    let err = session.snapshot(4).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotConnected));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_caller_does_not_break_the_session() {
    let (session, overlap) = watched_session().await;

    // Drop a long trace read while it is in flight
    let slow = session.execute(|ctp| ctp.detector(4, 1).trace(11));
    let _ = tokio::time::timeout(Duration::from_micros(50), slow).await;

    let snapshot = tokio::time::timeout(Duration::from_secs(5), session.snapshot(4))
        .await
        .expect("session usable")
        .expect("snapshot");
    assert_eq!(snapshot.module, 4);
    assert_eq!(overlap.max_seen.load(Ordering::SeqCst), 1);
}
