use rust_decimal_macros::dec;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use ticker_board::{Registry, pulse::Direction};
use ticker_data::{
    exchange::{Markets, binance::Binance},
    instrument::{ExchangeId, InstrumentId, InstrumentSpec},
    supervisor::{ConnectionState, FeedSupervisor, SupervisorConfig},
    transport::{
        TransportError,
        mock::{MockConnector, MockSession, MockStep},
    },
};
use tokio::{sync::watch, time::Instant};

fn binance() -> Binance {
    let markets = Markets::new(
        ExchangeId::Binance,
        [InstrumentSpec::new(
            InstrumentId::new(ExchangeId::Binance, "BTCUSDT"),
            "BTC",
            "USDT",
            Some(dec!(0.01)),
        )],
    )
    .unwrap();
    Binance::new(markets).unwrap()
}

fn ack(id: u64) -> MockStep {
    MockStep::text(format!(r#"{{"result":null,"id":{id}}}"#))
}

/// Ticker whose quote volume is always twice its price, so a torn read is detectable.
fn ticker(price: u32) -> MockStep {
    MockStep::text(format!(
        r#"{{"stream":"btcusdt@ticker","data":{{"e":"24hrTicker","E":1672515782136,"s":"BTCUSDT","c":"{price}","q":"{}"}}}}"#,
        price * 2
    ))
}

#[tokio::test(start_paused = true)]
async fn test_registry_survives_feed_reconnect() {
    let mut first = vec![ack(1)];
    first.extend((100..150).map(ticker));
    first.push(MockStep::Error(TransportError::Receive("connection reset".to_string())));

    let mut second = vec![ack(2)];
    second.extend((150..200).map(ticker));
    second.push(MockStep::Hang);

    let connector = MockConnector::new([MockSession::Accept(first), MockSession::Accept(second)]);
    let registry = Arc::new(Registry::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Reader snapshotting concurrently on its own thread
    let stop = Arc::new(AtomicBool::new(false));
    let reads = Arc::new(AtomicUsize::new(0));
    let reader = {
        let registry = Arc::clone(&registry);
        let stop = Arc::clone(&stop);
        let reads = Arc::clone(&reads);
        std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let snapshot = registry.snapshot(Instant::now(), Duration::from_secs(15));
                for instrument in snapshot.instruments {
                    assert_eq!(instrument.volume, Some(instrument.price * dec!(2)));
                }
                reads.fetch_add(1, Ordering::Relaxed);
                std::thread::yield_now();
            }
        })
    };

    let supervisor = FeedSupervisor::new(
        binance(),
        connector.clone(),
        Arc::clone(&registry),
        SupervisorConfig::default().with_ping_interval(None),
        shutdown_rx,
    );
    let mut status = supervisor.status();
    let handle = supervisor.spawn();

    let mut streaming = 0;
    let mut backing_off = 0;
    while streaming < 2 {
        match status.recv().await.unwrap().state {
            ConnectionState::Streaming => streaming += 1,
            ConnectionState::BackingOff => backing_off += 1,
            _ => {}
        }
    }
    assert_eq!(backing_off, 1);

    // Let the second session drain its scripted ticks
    while registry
        .snapshot(Instant::now(), Duration::from_secs(15))
        .instruments
        .first()
        .map(|instrument| instrument.price)
        != Some(dec!(199))
    {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown_tx.send(true).unwrap();
    assert_eq!(handle.await.unwrap(), Ok(()));

    stop.store(true, Ordering::Relaxed);
    reader.join().unwrap();
    assert!(reads.load(Ordering::Relaxed) > 0);

    assert_eq!(connector.connects(), 2);

    let snapshot = registry.snapshot(Instant::now(), Duration::from_secs(15));
    assert_eq!(snapshot.len(), 1);
    let instrument = &snapshot.instruments[0];
    assert_eq!(instrument.price, dec!(199));
    assert_eq!(instrument.previous, Some(dec!(198)));
    assert_eq!(instrument.volume, Some(dec!(398)));
    assert_eq!(instrument.last_move(), Some(Direction::Up));
}
