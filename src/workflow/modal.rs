use thiserror::Error;

use crate::error::ValidationError;
use crate::model::{RecordId, ReviewDecision};

/// What a decision applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewTarget {
    Single(RecordId),
    Bulk(Vec<RecordId>),
}

impl ReviewTarget {
    pub fn len(&self) -> usize {
        match self {
            ReviewTarget::Single(_) => 1,
            ReviewTarget::Bulk(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModalError {
    #[error("no review is open")]
    NotOpen,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum ModalState {
    #[default]
    Closed,
    Open {
        target: ReviewTarget,
        reason: String,
        error: Option<ValidationError>,
    },
}

/// State and validation behind the approve/reject dialog.
///
/// `Closed -> Open -> Closed`; a produced decision closes the modal, a failed
/// rejection keeps it open with a field error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewModal {
    state: ModalState,
}

impl ReviewModal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts collecting a decision. Re-opening always resets the reason.
    pub fn open(&mut self, target: ReviewTarget) {
        self.state = ModalState::Open {
            target,
            reason: String::new(),
            error: None,
        };
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ModalState::Open { .. })
    }

    pub fn target(&self) -> Option<&ReviewTarget> {
        match &self.state {
            ModalState::Open { target, .. } => Some(target),
            ModalState::Closed => None,
        }
    }

    pub fn set_reason(&mut self, text: impl Into<String>) {
        if let ModalState::Open { reason, error, .. } = &mut self.state {
            *reason = text.into();
            *error = None;
        }
    }

    pub fn reason(&self) -> &str {
        match &self.state {
            ModalState::Open { reason, .. } => reason,
            ModalState::Closed => "",
        }
    }

    /// Field-level error from the last failed submission.
    pub fn field_error(&self) -> Option<&ValidationError> {
        match &self.state {
            ModalState::Open { error, .. } => error.as_ref(),
            ModalState::Closed => None,
        }
    }

    /// Approval ignores any typed reason.
    pub fn submit_approve(&mut self) -> Result<(ReviewTarget, ReviewDecision), ModalError> {
        match std::mem::take(&mut self.state) {
            ModalState::Open { target, .. } => Ok((target, ReviewDecision::approve())),
            ModalState::Closed => Err(ModalError::NotOpen),
        }
    }

    pub fn submit_reject(&mut self) -> Result<(ReviewTarget, ReviewDecision), ModalError> {
        match std::mem::take(&mut self.state) {
            ModalState::Open { target, reason, .. } => match ReviewDecision::reject(reason.clone()) {
                Ok(decision) => Ok((target, decision)),
                Err(err) => {
                    self.state = ModalState::Open {
                        target,
                        reason,
                        error: Some(err.clone()),
                    };
                    Err(ModalError::Invalid(err))
                }
            },
            ModalState::Closed => Err(ModalError::NotOpen),
        }
    }

    /// Convenience for callers that collect the reason elsewhere.
    pub fn submit_reject_with(
        &mut self,
        reason: impl Into<String>,
    ) -> Result<(ReviewTarget, ReviewDecision), ModalError> {
        self.set_reason(reason);
        self.submit_reject()
    }

    /// Cancel path; safe in any state.
    pub fn close(&mut self) {
        self.state = ModalState::Closed;
    }
}
