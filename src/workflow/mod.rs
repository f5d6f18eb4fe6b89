//! The moderation review workflow.
//!
//! One generic implementation serves every reviewable resource:
//! - `selection`: ids checked for bulk actions and the bulk menu they gate.
//! - `modal`: decision collection and rejection-reason validation.
//! - `orchestrator`: sends single/bulk reviews and invalidates cached views.
//! - `stats`: pending/approved/rejected counts with a derived fallback.
//! - `views`: cached reads and refetch of invalidated views.

pub mod modal;
pub mod orchestrator;
pub mod selection;
pub mod stats;
pub mod views;

pub use modal::{ModalError, ReviewModal, ReviewTarget};
pub use orchestrator::{ReviewOrchestrator, ReviewOutcome};
pub use selection::SelectionSet;
pub use stats::{badge, compute_counts, StatsPresenter};
pub use views::ViewLoader;
