use super::{Connector, Frame, Transport, TransportError};
use crate::event::{TickEvent, TickSink};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};
use url::Url;

/// One scripted step of a [`MockTransport`] session.
#[derive(Clone, Debug)]
pub enum MockStep {
    /// Deliver a frame.
    Frame(Frame),
    /// Fail the next receive.
    Error(TransportError),
    /// Peer disappears: `recv` yields `None`.
    End,
    /// Stay silent until the caller gives up (eg/ idle timeout or shutdown).
    Hang,
}

impl MockStep {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Frame(Frame::text(text))
    }
}

/// Scripted session outcome for a single `connect` call.
#[derive(Clone, Debug)]
pub enum MockSession {
    Refuse(TransportError),
    Accept(Vec<MockStep>),
}

/// Shared record of everything the connector observed.
#[derive(Debug, Default)]
pub struct MockJournal {
    pub connects: usize,
    pub sent: Vec<Frame>,
    pub closes: usize,
}

/// [`Connector`] that replays one [`MockSession`] per `connect` call, in order.
///
/// Once the script is exhausted every further `connect` is refused.
#[derive(Clone, Debug)]
pub struct MockConnector {
    sessions: Arc<Mutex<VecDeque<MockSession>>>,
    journal: Arc<Mutex<MockJournal>>,
}

impl MockConnector {
    pub fn new(sessions: impl IntoIterator<Item = MockSession>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(sessions.into_iter().collect())),
            journal: Arc::new(Mutex::new(MockJournal::default())),
        }
    }

    pub fn connects(&self) -> usize {
        self.journal.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.journal.lock().closes
    }

    /// Text payloads sent by the client, in order.
    pub fn sent_text(&self) -> Vec<String> {
        self.journal
            .lock()
            .sent
            .iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, _url: &Url) -> Result<Self::Transport, TransportError> {
        self.journal.lock().connects += 1;
        let session = self.sessions.lock().pop_front();
        match session {
            Some(MockSession::Accept(steps)) => Ok(MockTransport {
                steps: steps.into(),
                journal: Arc::clone(&self.journal),
            }),
            Some(MockSession::Refuse(error)) => Err(error),
            None => Err(TransportError::Connect("mock script exhausted".to_string())),
        }
    }
}

/// Transport half of [`MockConnector`].
#[derive(Debug)]
pub struct MockTransport {
    steps: VecDeque<MockStep>,
    journal: Arc<Mutex<MockJournal>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.journal.lock().sent.push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        // A hang is never consumed, so cancelled receives keep hanging
        if matches!(self.steps.front(), Some(MockStep::Hang) | None) {
            return std::future::pending().await;
        }

        match self.steps.pop_front()? {
            MockStep::Frame(frame) => Some(Ok(frame)),
            MockStep::Error(error) => Some(Err(error)),
            MockStep::End | MockStep::Hang => None,
        }
    }

    async fn close(&mut self) {
        self.journal.lock().closes += 1;
    }
}

/// [`TickSink`] that records every tick it is given.
#[derive(Debug, Default)]
pub struct RecordingSink {
    ticks: Mutex<Vec<TickEvent>>,
}

impl RecordingSink {
    pub fn ticks(&self) -> Vec<TickEvent> {
        self.ticks.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.ticks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.lock().is_empty()
    }
}

impl TickSink for RecordingSink {
    fn apply_tick(&self, tick: TickEvent) {
        self.ticks.lock().push(tick);
    }
}
