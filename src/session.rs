//! Signed-in operator state shared by the client and the workflow.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tracing::{info, warn};

use crate::error::ReviewError;
use crate::model::{Role, SessionUser};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveSession {
    pub user: SessionUser,
    pub token: String,
}

/// Which records the operator may moderate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationScope {
    AllCampuses,
    Campus(String),
}

impl ModerationScope {
    pub fn campus_id(&self) -> Option<String> {
        match self {
            ModerationScope::AllCampuses => None,
            ModerationScope::Campus(id) => Some(id.clone()),
        }
    }
}

/// Process-wide session context, injected wherever a token or role is needed.
#[derive(Debug, Default)]
pub struct SessionContext {
    active: RwLock<Option<ActiveSession>>,
    signed_out: AtomicBool,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: ActiveSession) -> Self {
        let ctx = Self::new();
        ctx.login(session.user, session.token);
        ctx
    }

    pub fn login(&self, user: SessionUser, token: String) {
        info!(user_id = %user.id, role = ?user.role, "signed in");
        if let Ok(mut guard) = self.active.write() {
            *guard = Some(ActiveSession { user, token });
        }
        self.signed_out.store(false, Ordering::SeqCst);
    }

    pub fn logout(&self) {
        if let Ok(mut guard) = self.active.write() {
            *guard = None;
        }
    }

    /// Sign-out triggered by a rejected token; raises the redirect flag.
    pub fn expire(&self) {
        warn!("session rejected by server; signing out");
        self.logout();
        self.signed_out.store(true, Ordering::SeqCst);
    }

    /// Whether a server-side 401 forced a sign-out since the last login.
    pub fn signed_out(&self) -> bool {
        self.signed_out.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> Option<String> {
        self.snapshot().map(|s| s.token)
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        self.snapshot().map(|s| s.user)
    }

    pub fn role(&self) -> Option<Role> {
        self.current_user().map(|u| u.role)
    }

    pub fn snapshot(&self) -> Option<ActiveSession> {
        self.active.read().ok().and_then(|g| g.clone())
    }

    /// Resolve what the operator may moderate before any request is sent.
    pub fn moderation_scope(&self) -> Result<ModerationScope, ReviewError> {
        let user = self.current_user().ok_or(ReviewError::Forbidden)?;
        match user.role {
            Role::SuperAdmin => Ok(ModerationScope::AllCampuses),
            Role::CampusAdmin => match user.campus_id {
                Some(campus) if !campus.trim().is_empty() => Ok(ModerationScope::Campus(campus)),
                _ => Err(ReviewError::MissingPrerequisite(format!(
                    "campus admin {} has no campus assignment; ask a super admin to assign one",
                    user.email
                ))),
            },
            Role::Student => Err(ReviewError::Forbidden),
        }
    }
}

/// On-disk token storage; the only state this client keeps locally.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<Option<ActiveSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn save(&self, session: &ActiveSession) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(session)?)?;
        Ok(())
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
