//! The triage conversation engine.
//!
//! A `TriageSession` owns one transcript. Submitting a message appends a user
//! turn and spawns exactly one classification; until that classification
//! completes (or fails) the session refuses further submissions. Completed
//! classifications append an assistant turn and update the current tier, then
//! notify registered host callbacks in submission order.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::{
    sync::{mpsc, watch},
    task::AbortHandle,
};
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::{
    base::types::{Assessment, SeverityTier, Turn, Void},
    service::classifier::Classifier,
};

// Types.

/// Host hook invoked once per finished classification.
pub type ReplyCallback = Box<dyn Fn(ReplyEvent) -> BoxFuture<'static, Void> + Send + Sync>;

type SharedCallback = Arc<dyn Fn(ReplyEvent) -> BoxFuture<'static, Void> + Send + Sync>;

/// Where the session is in its submit / classify cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    AwaitingClassification,
}

/// Why a submission was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Empty or whitespace-only text.
    InvalidInput,
    /// A classification is already in flight.
    Busy,
}

/// Result of `TriageSession::submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Ignored(Rejection),
}

/// Delivered to host callbacks when a classification finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    /// The assistant turn was appended and the tier updated.
    Ready(Assessment),
    /// The backend failed or timed out; no assistant turn was appended.
    ClassificationFailed { reason: String },
}

/// A point-in-time copy of the session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub tier: Option<SeverityTier>,
    pub transcript: Vec<Turn>,
}

#[derive(Debug)]
struct SessionState {
    transcript: Vec<Turn>,
    tier: Option<SeverityTier>,
    last_assessment: Option<Assessment>,
    phase: Phase,
    /// Reply events queued for the dispatcher so far.
    queued: u64,
}

/// Everything the classification task needs once spawned.
struct Completion {
    classifier: Classifier,
    timeout: Duration,
    state: Arc<Mutex<SessionState>>,
    phase: Arc<watch::Sender<Phase>>,
    events: mpsc::UnboundedSender<ReplyEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// Structs.

/// One in-memory triage conversation.
///
/// Must be created inside a tokio runtime: the session spawns a dispatcher
/// task for callbacks, and one task per accepted submission. Dropping the
/// session aborts any classification still in flight.
pub struct TriageSession {
    classifier: Classifier,
    timeout: Duration,
    state: Arc<Mutex<SessionState>>,
    phase: Arc<watch::Sender<Phase>>,
    delivered: Arc<watch::Sender<u64>>,
    events: mpsc::UnboundedSender<ReplyEvent>,
    callbacks: Arc<Mutex<Vec<SharedCallback>>>,
    in_flight: Mutex<Option<AbortHandle>>,
}

impl TriageSession {
    /// Create an idle session with an empty transcript.
    #[instrument(name = "TriageSession::new", skip_all)]
    pub fn new(classifier: Classifier, timeout: Duration) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        let callbacks = Arc::new(Mutex::new(Vec::new()));
        let delivered = Arc::new(watch::Sender::new(0));

        tokio::spawn(dispatch_replies(receiver, callbacks.clone(), delivered.clone()).in_current_span());

        info!("Started triage session with `{}` classifier.", classifier.name());

        Self {
            classifier,
            timeout,
            state: Arc::new(Mutex::new(SessionState {
                transcript: Vec::new(),
                tier: None,
                last_assessment: None,
                phase: Phase::Idle,
                queued: 0,
            })),
            phase: Arc::new(watch::Sender::new(Phase::Idle)),
            delivered,
            events,
            callbacks,
            in_flight: Mutex::new(None),
        }
    }

    /// Submit a user message.
    ///
    /// Blank text and submissions made while a classification is in flight are
    /// ignored; the transcript is left untouched in both cases.
    #[instrument(name = "TriageSession::submit", skip_all)]
    pub fn submit(&self, text: impl Into<String>) -> SubmitOutcome {
        let text = text.into();

        if text.trim().is_empty() {
            debug!("Ignoring blank submission.");
            return SubmitOutcome::Ignored(Rejection::InvalidInput);
        }

        {
            let mut state = lock(&self.state);

            if state.phase == Phase::AwaitingClassification {
                warn!("Ignoring submission while a classification is in flight.");
                return SubmitOutcome::Ignored(Rejection::Busy);
            }

            state.transcript.push(Turn::user(text.clone()));
            state.phase = Phase::AwaitingClassification;
            self.phase.send_replace(Phase::AwaitingClassification);
        }

        let completion = Completion {
            classifier: self.classifier.clone(),
            timeout: self.timeout,
            state: self.state.clone(),
            phase: self.phase.clone(),
            events: self.events.clone(),
        };

        let handle = tokio::spawn(completion.run(text).in_current_span());
        *lock(&self.in_flight) = Some(handle.abort_handle());

        SubmitOutcome::Accepted
    }

    /// Register a host callback for finished classifications.
    ///
    /// Callbacks run one at a time on the session's dispatcher task, in the
    /// order classifications finished. Events that finished before
    /// registration are not replayed.
    pub fn on_reply_ready(&self, callback: ReplyCallback) {
        lock(&self.callbacks).push(Arc::from(callback));
    }

    /// Wait until no classification is in flight and every reply event has
    /// been handed to the registered callbacks.
    pub async fn settled(&self) {
        // Both senders live in `self`, so neither channel can close here.
        let mut phase = self.phase.subscribe();
        let _ = phase.wait_for(|phase| *phase == Phase::Idle).await;

        let queued = lock(&self.state).queued;
        let mut delivered = self.delivered.subscribe();
        let _ = delivered.wait_for(|delivered| *delivered >= queued).await;
    }

    pub fn phase(&self) -> Phase {
        lock(&self.state).phase
    }

    pub fn is_awaiting(&self) -> bool {
        self.phase() == Phase::AwaitingClassification
    }

    /// The tier of the most recent successful classification.
    pub fn current_tier(&self) -> Option<SeverityTier> {
        lock(&self.state).tier
    }

    pub fn last_assessment(&self) -> Option<Assessment> {
        lock(&self.state).last_assessment.clone()
    }

    pub fn transcript(&self) -> Vec<Turn> {
        lock(&self.state).transcript.clone()
    }

    pub fn transcript_len(&self) -> usize {
        lock(&self.state).transcript.len()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = lock(&self.state);

        SessionSnapshot {
            phase: state.phase,
            tier: state.tier,
            transcript: state.transcript.clone(),
        }
    }
}

impl Drop for TriageSession {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.in_flight).take() {
            handle.abort();
        }
    }
}

impl Completion {
    /// Classify `text` and fold the result back into the session.
    #[instrument(name = "TriageSession::complete", skip_all)]
    async fn run(self, text: String) {
        let result = match tokio::time::timeout(self.timeout, self.classifier.classify(&text)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("classification timed out after {:?}", self.timeout)),
        };

        let mut state = lock(&self.state);

        let event = match result {
            Ok(assessment) => {
                info!("Classified message as `{}` (urgency {}).", assessment.tier, assessment.tier.urgency());

                state.transcript.push(Turn::assistant(assessment.reply.clone()));
                state.tier = Some(assessment.tier);
                state.last_assessment = Some(assessment.clone());

                ReplyEvent::Ready(assessment)
            }
            Err(err) => {
                error!("Classification failed: {err:#}");

                ReplyEvent::ClassificationFailed { reason: format!("{err:#}") }
            }
        };

        state.phase = Phase::Idle;

        // Queue under the lock so delivery order always matches completion order.
        if self.events.send(event).is_ok() {
            state.queued += 1;
        }
        self.phase.send_replace(Phase::Idle);
    }
}

/// Deliver reply events to the registered callbacks, one at a time.
async fn dispatch_replies(mut receiver: mpsc::UnboundedReceiver<ReplyEvent>, callbacks: Arc<Mutex<Vec<SharedCallback>>>, delivered: Arc<watch::Sender<u64>>) {
    while let Some(event) = receiver.recv().await {
        let current = lock(&callbacks).clone();

        for callback in current {
            if let Err(err) = callback(event.clone()).await {
                error!("Reply callback failed: {err:#}");
            }
        }

        delivered.send_modify(|delivered| *delivered += 1);
    }
}

// Tests.
