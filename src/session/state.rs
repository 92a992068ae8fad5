//! Session state machine
//!
//! All session-level mutation goes through the named transition methods
//! here. Callbacks and tasks never flip ad-hoc flags; they ask the state
//! object for a transition and get a typed rejection when it is illegal.

use serde_json::Value;

use crate::api::{EndInterviewSummary, Question};

/// Server-confirmed interview lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    AwaitingAnswer,
    Recording,
    Submitting,
    Ending,
    Complete,
}

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Candidate ended the interview themselves.
    Manual,
    /// Countdown reached zero.
    TimerExpired,
    /// Tab-switch violation threshold reached.
    IntegrityViolation,
    /// All questions answered; completion signalled by the server.
    Natural,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("operation not allowed in phase {0:?}")]
    WrongPhase(Phase),
    #[error("response id already set")]
    ResponseIdAlreadySet,
    #[error("screen sharing stopped; restart it before continuing")]
    ScreenBlocked,
    #[error("no committed transcript to submit")]
    EmptyTranscript,
}

/// Read-only view of the session for display and tests.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub response_id: Option<String>,
    pub question: Option<Question>,
    pub end_reason: Option<EndReason>,
    pub last_error: Option<String>,
}

/// Mutable session aggregate. Owned by the orchestrator behind a mutex;
/// nothing else writes to it.
#[derive(Debug)]
pub struct SessionState {
    phase: Phase,
    response_id: Option<String>,
    session_token: Option<String>,
    mode: Option<String>,
    question: Option<Question>,
    final_analysis: Option<Value>,
    end_summary: Option<EndInterviewSummary>,
    end_reason: Option<EndReason>,
    last_error: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Initializing,
            response_id: None,
            session_token: None,
            mode: None,
            question: None,
            final_analysis: None,
            end_summary: None,
            end_reason: None,
            last_error: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    pub fn question(&self) -> Option<&Question> {
        self.question.as_ref()
    }

    pub fn final_analysis(&self) -> Option<&Value> {
        self.final_analysis.as_ref()
    }

    pub fn end_summary(&self) -> Option<&EndInterviewSummary> {
        self.end_summary.as_ref()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_last_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            response_id: self.response_id.clone(),
            question: self.question.clone(),
            end_reason: self.end_reason,
            last_error: self.last_error.clone(),
        }
    }

    /// `Initializing` → session confirmed by the server. The response id
    /// is set exactly once and never cleared.
    pub fn confirm_started(
        &mut self,
        response_id: String,
        session_token: Option<String>,
        mode: Option<String>,
    ) -> Result<(), TransitionError> {
        if self.phase != Phase::Initializing {
            return Err(TransitionError::WrongPhase(self.phase));
        }
        if self.response_id.is_some() {
            return Err(TransitionError::ResponseIdAlreadySet);
        }
        self.response_id = Some(response_id);
        self.session_token = session_token;
        self.mode = mode;
        self.phase = Phase::AwaitingAnswer;
        Ok(())
    }

    pub fn set_question(&mut self, question: Question) {
        self.question = Some(question);
    }

    /// `AwaitingAnswer` → `Recording`.
    pub fn begin_recording(&mut self, screen_blocked: bool) -> Result<(), TransitionError> {
        if self.phase != Phase::AwaitingAnswer {
            return Err(TransitionError::WrongPhase(self.phase));
        }
        if screen_blocked {
            return Err(TransitionError::ScreenBlocked);
        }
        self.phase = Phase::Recording;
        Ok(())
    }

    /// `Recording` → `AwaitingAnswer`. The transcript buffer is retained
    /// for display and submission.
    pub fn finish_recording(&mut self) -> Result<(), TransitionError> {
        if self.phase != Phase::Recording {
            return Err(TransitionError::WrongPhase(self.phase));
        }
        self.phase = Phase::AwaitingAnswer;
        Ok(())
    }

    /// `AwaitingAnswer`/`Recording` → `Submitting`.
    pub fn begin_submit(
        &mut self,
        has_committed_transcript: bool,
        screen_blocked: bool,
    ) -> Result<(), TransitionError> {
        match self.phase {
            Phase::AwaitingAnswer | Phase::Recording => {}
            phase => return Err(TransitionError::WrongPhase(phase)),
        }
        if screen_blocked {
            return Err(TransitionError::ScreenBlocked);
        }
        if !has_committed_transcript {
            return Err(TransitionError::EmptyTranscript);
        }
        self.phase = Phase::Submitting;
        Ok(())
    }

    /// Submission accepted, more questions remain.
    pub fn answer_accepted(&mut self) -> Result<(), TransitionError> {
        if self.phase != Phase::Submitting {
            return Err(TransitionError::WrongPhase(self.phase));
        }
        self.question = None;
        self.phase = Phase::AwaitingAnswer;
        Ok(())
    }

    /// Submission failed; back to awaiting with the error recorded.
    pub fn submit_failed(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        if self.phase == Phase::Submitting {
            self.phase = Phase::AwaitingAnswer;
        }
    }

    /// Any non-complete phase → `Ending`.
    pub fn begin_ending(&mut self, reason: EndReason) -> Result<(), TransitionError> {
        match self.phase {
            Phase::Complete => Err(TransitionError::WrongPhase(Phase::Complete)),
            Phase::Ending => Err(TransitionError::WrongPhase(Phase::Ending)),
            _ => {
                self.end_reason = Some(reason);
                self.phase = Phase::Ending;
                Ok(())
            }
        }
    }

    /// Terminal transition. Local completion never depends on the server
    /// call having succeeded.
    pub fn complete(
        &mut self,
        final_analysis: Option<Value>,
        end_summary: Option<EndInterviewSummary>,
    ) {
        if final_analysis.is_some() {
            self.final_analysis = final_analysis;
        }
        if end_summary.is_some() {
            self.end_summary = end_summary;
        }
        if self.end_reason.is_none() {
            self.end_reason = Some(EndReason::Natural);
        }
        self.phase = Phase::Complete;
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
