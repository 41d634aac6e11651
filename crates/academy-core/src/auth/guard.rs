//! Route guard for protected pages.
//!
//! The guard is a pure function of the session status that yields a
//! [`GuardDecision`]: what to render and which navigation to perform. It
//! must never redirect before the session has settled, otherwise a page
//! reload would bounce to the login page while the stored token is still
//! being verified.

use tokio::sync::watch;
use tracing::debug;

use super::session::{Session, SessionStatus};

/// Login entry point
pub const DEFAULT_LOGIN_PATH: &str = "/auth/login";

/// Registration entry point
pub const REGISTER_PATH: &str = "/auth/register";

/// What a guarded route shows for the current render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Render {
    /// Neutral loading indicator
    Placeholder,
    /// The protected content, unmodified
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    None,
    RedirectTo(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardDecision {
    pub render: Render,
    pub side_effect: SideEffect,
}

/// Navigation capability used for redirects
pub trait Navigator: Send + Sync {
    fn redirect_to(&self, path: &str);
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_path: String,
}

impl RouteGuard {
    pub fn new(login_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Login and registration pages are reachable without a session
    pub fn is_public(&self, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        path == self.login_path.trim_end_matches('/') || path == REGISTER_PATH
    }

    pub fn evaluate(&self, status: SessionStatus) -> GuardDecision {
        match status {
            SessionStatus::Unresolved | SessionStatus::Resolving => GuardDecision {
                render: Render::Placeholder,
                side_effect: SideEffect::None,
            },
            SessionStatus::Unauthenticated => GuardDecision {
                render: Render::Placeholder,
                side_effect: SideEffect::RedirectTo(self.login_path.clone()),
            },
            SessionStatus::Authenticated => GuardDecision {
                render: Render::Content,
                side_effect: SideEffect::None,
            },
        }
    }

    /// Evaluate and perform the side effect
    pub fn apply(&self, status: SessionStatus, navigator: &dyn Navigator) -> Render {
        let decision = self.evaluate(status);
        if let SideEffect::RedirectTo(ref path) = decision.side_effect {
            debug!(%status, path = %path, "Redirecting unauthenticated visitor");
            navigator.redirect_to(path);
        }
        decision.render
    }

    /// Wait for the session to settle, then apply the decision once.
    ///
    /// If the store goes away first, the last published status is used.
    pub async fn settle(&self, mut session: watch::Receiver<Session>, navigator: &dyn Navigator) -> Render {
        let settled = session
            .wait_for(Session::is_settled)
            .await
            .map(|settled| settled.status());
        let status = match settled {
            Ok(status) => status,
            Err(_) => session.borrow().status(),
        };
        self.apply(status, navigator)
    }

    /// Re-evaluate on every published change until the store is dropped
    pub async fn watch<F>(&self, mut session: watch::Receiver<Session>, navigator: &dyn Navigator, mut on_render: F)
    where
        F: FnMut(Render) + Send,
    {
        loop {
            let status = session.borrow_and_update().status();
            on_render(self.apply(status, navigator));
            if session.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_PATH)
    }
}
