//! Mailbox monitoring: the controller state machine and its polling worker.
//!
//! A [`Monitor`] owns at most one worker task. Start and stop go through a
//! single async mutex, so a new worker can only be spawned after the
//! previous one has exited.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audit::{AuditRecord, AuditSink};
use crate::categorizer::{classify, PatternLibrary, Verdict};
use crate::error::{MailboxError, SetupError};
use crate::mail_reader::{MailboxConnector, MailboxSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum MonitorStatus {
    Idle,
    Running { category: String },
    Faulted { error: String },
}

impl MonitorStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, MonitorStatus::Running { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            MonitorStatus::Idle => "Status: Stopped".to_string(),
            MonitorStatus::Running { category } => format!("Status: Monitoring for '{}'", category),
            MonitorStatus::Faulted { error } => format!("Status: Stopped after error: {}", error),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Monitoring is already running for '{0}'. Please stop it first.")]
    AlreadyRunning(String),
}

/// What happened to one message in a batch.
#[derive(Debug)]
pub struct MessageOutcome {
    pub message_id: Option<String>,
    pub subject: String,
    pub reasons: Vec<String>,
    pub result: Result<Verdict, MailboxError>,
}

impl MessageOutcome {
    fn into_audit_record(self) -> AuditRecord {
        match self.result {
            Ok(verdict) => AuditRecord::verdict(
                self.message_id.as_deref().unwrap_or_default(),
                &self.subject,
                verdict,
                self.reasons,
            ),
            Err(e) => AuditRecord::failure(self.message_id.as_deref(), &self.subject, e),
        }
    }
}

/// Typed per-message results of one poll.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<MessageOutcome>,
}

impl BatchReport {
    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.result.as_ref().is_ok_and(Verdict::is_apply))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    fn lost_connection(&self) -> Option<String> {
        self.outcomes.iter().find_map(|o| match &o.result {
            Err(e) if e.is_fatal() => Some(e.to_string()),
            _ => None,
        })
    }

    /// Audits every outcome; returns the connection error if the mailbox went away.
    pub fn submit(self, audit: &dyn AuditSink) -> Result<(), MailboxError> {
        let lost = self.lost_connection();
        for outcome in self.outcomes {
            audit.record(outcome.into_audit_record());
        }
        match lost {
            Some(reason) => Err(MailboxError::Disconnected(reason)),
            None => Ok(()),
        }
    }
}

/// Fetches the unread messages once and applies the verdicts for `category`.
///
/// Failures of single messages end up in the report; only a failed fetch is
/// returned as an error.
pub async fn process_batch(
    mailbox: &mut dyn MailboxSource,
    category: &str,
    library: &PatternLibrary,
) -> Result<BatchReport, MailboxError> {
    let fetched = mailbox.fetch_unread().await?;
    let mut report = BatchReport {
        outcomes: Vec::with_capacity(fetched.len()),
    };

    for item in fetched {
        let message = match item {
            Ok(message) => message,
            Err(e) => {
                let message_id = match &e {
                    MailboxError::Parse { message_id, .. } => Some(message_id.clone()),
                    _ => None,
                };
                report.outcomes.push(MessageOutcome {
                    message_id,
                    subject: String::new(),
                    reasons: Vec::new(),
                    result: Err(e),
                });
                continue;
            }
        };

        if !message.attachments.is_empty() {
            debug!("Attachments found: {}", message.attachments.join(", "));
        }

        let classification = classify(&message, category, library);
        let result = match classification.verdict {
            Verdict::Apply(tags) => mailbox
                .apply_tags(&message.id, &tags)
                .await
                .map(|()| Verdict::Apply(tags)),
            verdict => Ok(verdict),
        };

        report.outcomes.push(MessageOutcome {
            message_id: Some(message.id),
            subject: message.subject,
            reasons: classification.reasons,
            result,
        });
    }

    Ok(report)
}

struct Worker {
    category: String,
    cancel: CancellationToken,
    handle: JoinHandle<Result<(), SetupError>>,
}

enum State {
    Idle,
    Running(Worker),
    Faulted(String),
}

async fn finish(worker: Worker) -> State {
    match worker.handle.await {
        Ok(Ok(())) => State::Idle,
        Ok(Err(e)) => State::Faulted(e.to_string()),
        Err(e) => State::Faulted(format!("monitor worker failed: {}", e)),
    }
}

/// Moves a worker that exited on its own into Idle or Faulted.
async fn settle(state: &mut State) {
    let finished = matches!(state, State::Running(worker) if worker.handle.is_finished());
    if finished {
        if let State::Running(worker) = std::mem::replace(state, State::Idle) {
            *state = finish(worker).await;
        }
    }
}

/// Everything the worker task owns.
struct MonitorRun {
    connector: Arc<dyn MailboxConnector>,
    library: Arc<PatternLibrary>,
    audit: Arc<dyn AuditSink>,
    category: String,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl MonitorRun {
    async fn run(self) -> Result<(), SetupError> {
        info!("Connecting to mailbox... Monitoring for '{}'", self.category);
        let connected = tokio::select! {
            _ = self.cancel.cancelled() => {
                info!("Stopped while connecting");
                return Ok(());
            }
            connected = self.connector.connect() => connected,
        };
        let mut mailbox = match connected {
            Ok(mailbox) => mailbox,
            Err(e) => {
                self.audit.record(AuditRecord::failure(None, "", &e));
                return Err(e);
            }
        };

        let result = self.poll(mailbox.as_mut()).await;
        mailbox.close().await;
        result
    }

    async fn poll(&self, mailbox: &mut dyn MailboxSource) -> Result<(), SetupError> {
        info!("Monitoring emails... Assigning category: {}", self.category);

        while !self.cancel.is_cancelled() {
            debug!("Checking unread emails...");
            match process_batch(mailbox, &self.category, &self.library).await {
                Ok(report) => {
                    debug!("Batch done: {} tagged, {} failed", report.applied(), report.failed());
                    // The failed message already carries the audit record
                    report.submit(self.audit.as_ref())?;
                }
                Err(e) => {
                    self.audit.record(AuditRecord::failure(None, "", &e));
                    if e.is_fatal() {
                        return Err(e.into());
                    }
                }
            }

            debug!("Checking again in {:?}...", self.poll_interval);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        Ok(())
    }
}

/// Controller for the single monitoring worker.
pub struct Monitor {
    state: Mutex<State>,
    connector: Arc<dyn MailboxConnector>,
    library: Arc<PatternLibrary>,
    audit: Arc<dyn AuditSink>,
    poll_interval: Duration,
}

impl Monitor {
    pub fn new(
        connector: Arc<dyn MailboxConnector>,
        library: Arc<PatternLibrary>,
        audit: Arc<dyn AuditSink>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(State::Idle),
            connector,
            library,
            audit,
            poll_interval,
        }
    }

    /// Starts monitoring for `category`. Rejected while a worker is running.
    pub async fn start(&self, category: &str) -> Result<(), MonitorError> {
        let mut state = self.state.lock().await;
        settle(&mut state).await;
        if let State::Running(worker) = &*state {
            return Err(MonitorError::AlreadyRunning(worker.category.clone()));
        }

        let cancel = CancellationToken::new();
        let run = MonitorRun {
            connector: Arc::clone(&self.connector),
            library: Arc::clone(&self.library),
            audit: Arc::clone(&self.audit),
            category: category.to_string(),
            poll_interval: self.poll_interval,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(run.run());

        info!("Monitoring started for '{}'", category);
        *state = State::Running(Worker {
            category: category.to_string(),
            cancel,
            handle,
        });
        Ok(())
    }

    /// Stops the worker after its current batch, or right away while it is still
    /// connecting. Returns false when nothing was running.
    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, State::Idle) {
            State::Running(worker) => {
                worker.cancel.cancel();
                *state = finish(worker).await;
                info!("Monitoring stopped.");
                true
            }
            other => {
                *state = other;
                false
            }
        }
    }

    pub async fn status(&self) -> MonitorStatus {
        let mut state = self.state.lock().await;
        settle(&mut state).await;
        match &*state {
            State::Idle => MonitorStatus::Idle,
            State::Running(worker) => MonitorStatus::Running {
                category: worker.category.clone(),
            },
            State::Faulted(error) => MonitorStatus::Faulted { error: error.clone() },
        }
    }
}
