//! Submission handle
//!
//! One handle per execution attempt. The lifecycle task is the only writer;
//! any number of readers may clone the handle and observe it concurrently.
//! Status moves one way: once terminal, later updates are dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use spark_status::{JobStatus, OutputEvent};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::poll::StatusSnapshot;
use crate::process::{OutputBuffer, ProcessSlot};

/// Lines of transcript attached to failure messages.
const MESSAGE_TAIL_LINES: usize = 20;

#[derive(Debug)]
pub(crate) struct HandleState {
    pub(crate) status: JobStatus,
    pub(crate) pid: Option<u32>,
    pub(crate) driver_id: Option<String>,
    pub(crate) application_id: Option<String>,
    pub(crate) driver_pod: Option<String>,
    pub(crate) reported_exit_code: Option<i32>,
    pub(crate) exit_code: Option<i32>,
    pub(crate) detached: bool,
    pub(crate) message: Option<String>,
    pub(crate) output: OutputBuffer,
    pub(crate) updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub(crate) struct HandleInner {
    pub(crate) id: Uuid,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) cancel: CancelToken,
    pub(crate) state: Mutex<HandleState>,
    pub(crate) process: Mutex<Option<ProcessSlot>>,
    pub(crate) signal_sent: AtomicBool,
    pub(crate) readers: Mutex<Vec<JoinHandle<()>>>,
}

/// Shared view of one in-flight or finished submission.
#[derive(Debug, Clone)]
pub struct SubmissionHandle {
    pub(crate) inner: Arc<HandleInner>,
}

/// Point-in-time copy of a handle, for reports and JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandleSnapshot {
    pub id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_pod: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubmissionHandle {
    pub(crate) fn new(output_capacity: usize, cancel: CancelToken) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                created_at: now,
                cancel,
                state: Mutex::new(HandleState {
                    status: JobStatus::Pending,
                    pid: None,
                    driver_id: None,
                    application_id: None,
                    driver_pod: None,
                    reported_exit_code: None,
                    exit_code: None,
                    detached: false,
                    message: None,
                    output: OutputBuffer::new(output_capacity),
                    updated_at: now,
                }),
                process: Mutex::new(None),
                signal_sent: AtomicBool::new(false),
                readers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, HandleState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attempt identifier; never shared between attempts.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn status(&self) -> JobStatus {
        self.state().status
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// OS process id while the submit process is alive.
    pub fn pid(&self) -> Option<u32> {
        self.state().pid
    }

    pub fn driver_id(&self) -> Option<String> {
        self.state().driver_id.clone()
    }

    pub fn application_id(&self) -> Option<String> {
        self.state().application_id.clone()
    }

    pub fn driver_pod(&self) -> Option<String> {
        self.state().driver_pod.clone()
    }

    /// Exit code of the submit process once it has been reaped.
    pub fn exit_code(&self) -> Option<i32> {
        self.state().exit_code
    }

    pub fn message(&self) -> Option<String> {
        self.state().message.clone()
    }

    /// Retained transcript (oldest lines may have been evicted).
    pub fn output(&self) -> String {
        self.state().output.contents()
    }

    pub fn output_tail(&self, lines: usize) -> String {
        self.state().output.tail(lines)
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.inner.cancel
    }

    pub fn snapshot(&self) -> HandleSnapshot {
        let state = self.state();
        HandleSnapshot {
            id: self.inner.id.to_string(),
            status: state.status,
            pid: state.pid,
            driver_id: state.driver_id.clone(),
            application_id: state.application_id.clone(),
            driver_pod: state.driver_pod.clone(),
            exit_code: state.exit_code,
            message: state.message.clone(),
            created_at: self.inner.created_at,
            updated_at: state.updated_at,
        }
    }

    /// Record the terminal status. Only the first call wins.
    pub(crate) fn finish(&self, status: JobStatus, message: Option<String>) -> bool {
        let mut state = self.state();
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        if message.is_some() {
            state.message = message;
        }
        state.updated_at = Utc::now();
        true
    }

    /// Apply a polled status snapshot.
    pub(crate) fn apply_snapshot(&self, snapshot: &StatusSnapshot) -> bool {
        if snapshot.status.is_terminal() {
            self.finish(snapshot.status, snapshot.message.clone())
        } else {
            let mut state = self.state();
            if state.status.is_terminal() {
                return false;
            }
            state.status = snapshot.status;
            if snapshot.message.is_some() {
                state.message = snapshot.message.clone();
            }
            state.updated_at = snapshot.observed_at;
            true
        }
    }

    pub(crate) fn record_line(&self, line: String, events: Vec<OutputEvent>) {
        let mut state = self.state();
        for event in events {
            match event {
                OutputEvent::DriverId(id) => state.driver_id = Some(id),
                OutputEvent::ApplicationId(id) => state.application_id = Some(id),
                OutputEvent::DriverPod(pod) => state.driver_pod = Some(pod),
                OutputEvent::ExitCode(code) => state.reported_exit_code = Some(code),
            }
        }
        state.output.push(line);
    }

    /// Failure message built from the transcript tail.
    pub(crate) fn failure_message(&self, headline: &str) -> String {
        let tail = self.output_tail(MESSAGE_TAIL_LINES);
        if tail.is_empty() {
            headline.to_string()
        } else {
            format!("{}\n{}", headline, tail)
        }
    }
}
