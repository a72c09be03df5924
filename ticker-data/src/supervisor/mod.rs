//! Stream Supervisor: owns the lifecycle of one live connection per exchange feed.
//!
//! ```text
//! connecting -> subscribing -> streaming -> (fault) backing-off -> connecting -> ...
//!                                                    any state -> closed
//! ```

use self::connection::{FeedConnection, Received};
use crate::{
    backoff::{Backoff, BackoffConfig},
    error::{FaultAction, FeedError},
    event::TickSink,
    exchange::FeedAdapter,
    instrument::ExchangeId,
    transport::Connector,
};
use derive_more::Display;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior, sleep, sleep_until},
};
use tracing::{debug, error, info, warn};

/// Adapter + transport composition for a single connection.
pub mod connection;

/// Default time allowed for every subscription to be acknowledged.
pub const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default silence after which a connection is considered dead.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default client keep-alive ping interval.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);

/// Default grace period for supervisors to exit after shutdown is requested.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// [`FeedSupervisor`] configuration.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct SupervisorConfig {
    /// Deadline for all subscriptions to be acknowledged after connecting.
    pub subscribe_timeout: Duration,
    /// Maximum silence tolerated while subscribed; exchanges are expected to heartbeat.
    pub idle_timeout: Duration,
    /// Client initiated ping interval, if any.
    pub ping_interval: Option<Duration>,
    pub backoff: BackoffConfig,
    /// Bound on how long shutdown may take.
    pub shutdown_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            subscribe_timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            ping_interval: Some(DEFAULT_PING_INTERVAL),
            backoff: BackoffConfig::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl SupervisorConfig {
    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Lifecycle state of one feed connection.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum ConnectionState {
    #[display("connecting")]
    Connecting,
    #[display("subscribing")]
    Subscribing,
    #[display("streaming")]
    Streaming,
    #[display("backing-off")]
    BackingOff,
    #[display("closed")]
    Closed,
}

impl ConnectionState {
    /// Determine if the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Subscribing | BackingOff | Closed)
                | (Subscribing, Streaming | BackingOff | Closed)
                | (Streaming, BackingOff | Closed)
                | (BackingOff, Connecting | Closed)
        )
    }
}

/// Connection state change broadcast by a [`FeedSupervisor`].
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
#[display("{exchange} feed {state}")]
pub struct FeedStatus {
    pub exchange: ExchangeId,
    pub state: ConnectionState,
}

/// Tracks the current [`ConnectionState`] and publishes every legal transition.
#[derive(Debug)]
struct StatusTx {
    exchange: ExchangeId,
    state: ConnectionState,
    tx: broadcast::Sender<FeedStatus>,
}

impl StatusTx {
    /// Broadcast the current state, eg/ the initial [`ConnectionState::Connecting`].
    fn announce(&self) {
        // No receivers is not an error
        let _ = self.tx.send(FeedStatus {
            exchange: self.exchange,
            state: self.state,
        });
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            warn!(exchange = %self.exchange, from = %self.state, to = %next, "illegal feed state transition");
            return;
        }

        debug!(exchange = %self.exchange, from = %self.state, to = %next, "feed state transition");
        self.state = next;
        self.announce();
    }

    /// Every subscription is confirmed; returns the streaming start time.
    fn start_streaming(&mut self) -> Instant {
        info!(exchange = %self.exchange, "subscriptions confirmed, streaming");
        self.transition(ConnectionState::Streaming);
        Instant::now()
    }
}

/// How a single connection attempt ended.
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    /// Retryable fault; `streamed` is how long the connection was streaming, if it got there.
    Fault {
        error: FeedError,
        streamed: Option<Duration>,
    },
    Fatal(FeedError),
}

impl SessionEnd {
    fn from_error(error: FeedError, streamed: Option<Duration>) -> Self {
        match error.action() {
            FaultAction::Fatal => SessionEnd::Fatal(error),
            FaultAction::Drop | FaultAction::Reconnect => SessionEnd::Fault { error, streamed },
        }
    }
}

/// Drives one exchange feed through connect, subscribe, stream & reconnect-with-backoff,
/// feeding every [`TickEvent`](crate::event::TickEvent) into a shared [`TickSink`].
///
/// Connection faults are retried indefinitely. Only a fatal [`FeedError`] (eg/ a rejected
/// subscription) ends the supervisor early, and it only ever ends this feed.
#[derive(Debug)]
pub struct FeedSupervisor<A, C, S> {
    adapter: A,
    connector: C,
    sink: Arc<S>,
    config: SupervisorConfig,
    shutdown: watch::Receiver<bool>,
    status: StatusTx,
}

impl<A, C, S> FeedSupervisor<A, C, S>
where
    A: FeedAdapter,
    C: Connector,
    S: TickSink,
{
    pub fn new(
        adapter: A,
        connector: C,
        sink: Arc<S>,
        config: SupervisorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            adapter,
            connector,
            sink,
            config,
            shutdown,
            status: StatusTx {
                exchange: A::ID,
                state: ConnectionState::Connecting,
                tx,
            },
        }
    }

    /// Subscribe to [`FeedStatus`] changes.
    pub fn status(&self) -> broadcast::Receiver<FeedStatus> {
        self.status.tx.subscribe()
    }

    /// Run the supervisor on a new tokio task.
    pub fn spawn(self) -> JoinHandle<Result<(), FeedError>> {
        tokio::spawn(self.run())
    }

    /// Run until shutdown is signalled (`Ok`) or a fatal error occurs (`Err`).
    pub async fn run(mut self) -> Result<(), FeedError> {
        let exchange = A::ID;
        let mut backoff = Backoff::new(self.config.backoff);
        info!(%exchange, instruments = self.adapter.markets().len(), "starting feed supervisor");
        self.status.announce();

        loop {
            match self.run_session().await {
                SessionEnd::Shutdown => break,
                SessionEnd::Fatal(error) => {
                    error!(%exchange, %error, "feed terminated by fatal error");
                    self.status.transition(ConnectionState::Closed);
                    return Err(error);
                }
                SessionEnd::Fault { error, streamed } => {
                    if streamed.is_some_and(|streamed| streamed >= backoff.config().stable_after) {
                        backoff.reset();
                    }

                    self.status.transition(ConnectionState::BackingOff);
                    let delay = backoff.next_delay();
                    warn!(
                        %exchange,
                        %error,
                        ?delay,
                        attempt = backoff.attempt(),
                        "feed fault, reconnecting after backoff"
                    );

                    tokio::select! {
                        biased;
                        _ = shutdown_requested(&mut self.shutdown) => break,
                        _ = sleep(delay) => {}
                    }
                }
            }
        }

        info!(%exchange, "feed supervisor shutdown");
        self.status.transition(ConnectionState::Closed);
        Ok(())
    }

    async fn run_session(&mut self) -> SessionEnd {
        let exchange = A::ID;
        self.status.transition(ConnectionState::Connecting);

        let connect = FeedConnection::connect(&mut self.adapter, &self.connector);
        let mut connection = tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown) => return SessionEnd::Shutdown,
            connection = connect => match connection {
                Ok(connection) => connection,
                Err(error) => return SessionEnd::from_error(error, None),
            },
        };

        self.status.transition(ConnectionState::Subscribing);
        if let Err(error) = connection.subscribe().await {
            connection.close().await;
            return SessionEnd::from_error(error, None);
        }

        let subscribe_deadline = Instant::now() + self.config.subscribe_timeout;
        let mut idle_deadline = Instant::now() + self.config.idle_timeout;
        let mut ping = self.config.ping_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let mut streaming_since = None;
        if connection.pending() == 0 {
            streaming_since = Some(self.status.start_streaming());
        }

        let end = loop {
            let received = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => break SessionEnd::Shutdown,
                _ = sleep_until(subscribe_deadline), if streaming_since.is_none() => {
                    Err(FeedError::SubscriptionTimeout(self.config.subscribe_timeout))
                }
                _ = sleep_until(idle_deadline) => {
                    Err(FeedError::IdleTimeout(self.config.idle_timeout))
                }
                _ = next_ping(&mut ping) => match connection.ping().await {
                    Ok(()) => continue,
                    Err(error) => Err(error),
                },
                received = connection.receive_next() => received,
            };

            let streamed = streaming_since.map(|since: Instant| since.elapsed());
            match received {
                Ok(received) => {
                    idle_deadline = Instant::now() + self.config.idle_timeout;
                    match received {
                        Received::Ticks(ticks) => {
                            ticks.into_iter().for_each(|tick| self.sink.apply_tick(tick))
                        }
                        Received::Acknowledged { remaining: 0 } if streaming_since.is_none() => {
                            streaming_since = Some(self.status.start_streaming());
                        }
                        Received::Acknowledged { remaining } => {
                            debug!(%exchange, remaining, "subscription acknowledged");
                        }
                        Received::Heartbeat | Received::Ignored => {}
                    }
                }
                Err(error) if !error.is_terminal() => {
                    idle_deadline = Instant::now() + self.config.idle_timeout;
                    warn!(%exchange, %error, "dropping message");
                }
                Err(error) => break SessionEnd::from_error(error, streamed),
            }
        };

        connection.close().await;
        end
    }
}

/// Resolves once shutdown is requested or every shutdown sender has gone away.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|requested| *requested).await;
}

async fn next_ping(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_can_transition_to() {
        use ConnectionState::*;

        struct TestCase {
            input: (ConnectionState, ConnectionState),
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: happy path
                input: (Connecting, Subscribing),
                expected: true,
            },
            TestCase {
                // TC1: acknowledged
                input: (Subscribing, Streaming),
                expected: true,
            },
            TestCase {
                // TC2: fault while streaming
                input: (Streaming, BackingOff),
                expected: true,
            },
            TestCase {
                // TC3: retry
                input: (BackingOff, Connecting),
                expected: true,
            },
            TestCase {
                // TC4: cannot stream without subscribing
                input: (Connecting, Streaming),
                expected: false,
            },
            TestCase {
                // TC5: cannot skip backoff
                input: (Streaming, Connecting),
                expected: false,
            },
            TestCase {
                // TC6: closed is terminal
                input: (Closed, Connecting),
                expected: false,
            },
            TestCase {
                // TC7: shutdown from any live state
                input: (Subscribing, Closed),
                expected: true,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let (from, to) = test.input;
            assert_eq!(from.can_transition_to(to), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_supervisor_config_builder() {
        let config = SupervisorConfig::default()
            .with_subscribe_timeout(Duration::from_secs(1))
            .with_ping_interval(None)
            .with_backoff(BackoffConfig::default().with_max(Duration::from_secs(5)));

        assert_eq!(config.subscribe_timeout, Duration::from_secs(1));
        assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        assert_eq!(config.ping_interval, None);
        assert_eq!(config.backoff.max, Duration::from_secs(5));
        assert_eq!(config.shutdown_grace, Duration::from_secs(2));
    }

    #[test]
    fn test_feed_status_display() {
        let status = FeedStatus {
            exchange: ExchangeId::HitBtc,
            state: ConnectionState::BackingOff,
        };
        assert_eq!(status.to_string(), "HitBTC feed backing-off");
    }
}
