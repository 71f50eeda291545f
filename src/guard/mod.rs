//! Route guard: decides whether a protected view may render.
//!
//! The guard never fails. Every evaluation ends in [`GuardDecision::Loading`],
//! a redirect, or permission to render.

use serde::Serialize;

use crate::session::{Session, SessionStore};

pub const LOGIN_PATH: &str = "/login";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "to", rename_all = "lowercase")]
pub enum GuardDecision {
    Loading,
    Redirect(String),
    Render,
}

/// Outcome of [`RouteGuard::render`]: the children only exist on `Render`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    Loading,
    Redirect(String),
    Render(T),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unchecked,
    Checked,
}

/// One guard per mounted view.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    allowed_roles: Option<Vec<String>>,
    redirect_to: String,
    unauthorized_to: String,
    phase: Phase,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteGuard {
    pub fn new() -> Self {
        Self {
            allowed_roles: None,
            redirect_to: LOGIN_PATH.to_string(),
            unauthorized_to: UNAUTHORIZED_PATH.to_string(),
            phase: Phase::Unchecked,
        }
    }

    /// Restrict to these role names. An empty list means any role.
    pub fn allow_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        self.allowed_roles = if roles.is_empty() { None } else { Some(roles) };
        self
    }

    pub fn redirect_to(mut self, path: impl Into<String>) -> Self {
        self.redirect_to = path.into();
        self
    }

    pub fn unauthorized_to(mut self, path: impl Into<String>) -> Self {
        self.unauthorized_to = path.into();
        self
    }

    /// Mark the mount-time check as done.
    ///
    /// Until this is called the guard answers `Loading` whatever the session
    /// says, so a session still being rehydrated never causes a redirect.
    pub fn check(&mut self) {
        self.phase = Phase::Checked;
    }

    pub fn is_checked(&self) -> bool {
        self.phase == Phase::Checked
    }

    pub fn decide(&self, session: &Session) -> GuardDecision {
        if self.phase == Phase::Unchecked {
            return GuardDecision::Loading;
        }

        let user = match (&session.user, session.is_authenticated) {
            (Some(user), true) => user,
            _ => return GuardDecision::Redirect(self.redirect_to.clone()),
        };

        if let Some(allowed) = &self.allowed_roles {
            if !allowed.iter().any(|role| user.has_role(role)) {
                tracing::debug!(role = %user.role.name, ?allowed, "Role not allowed");
                return GuardDecision::Redirect(self.unauthorized_to.clone());
            }
        }

        // Organization-scoped views wait until the association is known
        if !user.has_organization() {
            return GuardDecision::Loading;
        }

        GuardDecision::Render
    }

    /// Check once if needed, then decide against the store's current session.
    pub fn evaluate(&mut self, store: &SessionStore) -> GuardDecision {
        self.check();
        self.decide(&store.snapshot())
    }

    pub fn render<T>(&self, session: &Session, children: impl FnOnce() -> T) -> Guarded<T> {
        match self.decide(session) {
            GuardDecision::Loading => Guarded::Loading,
            GuardDecision::Redirect(to) => Guarded::Redirect(to),
            GuardDecision::Render => Guarded::Render(children()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RawUser;
    use serde_json::json;

    fn session_for(user: serde_json::Value) -> Session {
        let store = SessionStore::in_memory();
        store
            .login(RawUser::from_value(user).unwrap(), "tok", None)
            .unwrap();
        store.snapshot()
    }

    fn checked() -> RouteGuard {
        let mut guard = RouteGuard::new();
        guard.check();
        guard
    }

    #[test]
    fn loading_before_check() {
        let guard = RouteGuard::new();
        assert_eq!(guard.decide(&Session::default()), GuardDecision::Loading);

        let mut rendered = false;
        let out = guard.render(&Session::default(), || rendered = true);
        assert_eq!(out, Guarded::Loading);
        assert!(!rendered);
    }

    #[test]
    fn unauthenticated_goes_to_login() {
        assert_eq!(
            checked().decide(&Session::default()),
            GuardDecision::Redirect("/login".into())
        );
    }

    #[test]
    fn custom_redirect_targets() {
        let mut guard = RouteGuard::new()
            .redirect_to("/signin")
            .unauthorized_to("/403")
            .allow_roles(["ADMIN"]);
        guard.check();

        assert_eq!(guard.decide(&Session::default()), GuardDecision::Redirect("/signin".into()));
        let viewer = session_for(json!({ "id": "u", "role": "VIEWER", "organizationId": "o" }));
        assert_eq!(guard.decide(&viewer), GuardDecision::Redirect("/403".into()));
    }

    #[test]
    fn wrong_role_goes_to_unauthorized() {
        let session = session_for(json!({ "id": "u", "role": "VIEWER", "organizationId": "o1" }));
        let guard = checked().allow_roles(["ADMIN"]);
        assert_eq!(guard.decide(&session), GuardDecision::Redirect("/unauthorized".into()));
    }

    #[test]
    fn role_match_ignores_case() {
        let session = session_for(json!({ "id": "u", "role": { "id": 1, "name": "admin" }, "organizationId": 1 }));
        let guard = checked().allow_roles(["ADMIN", "MANAGER"]);
        assert_eq!(guard.decide(&session), GuardDecision::Render);
    }

    #[test]
    fn missing_organization_keeps_loading() {
        let session = session_for(json!({ "id": "u", "role": "ADMIN" }));
        assert_eq!(checked().decide(&session), GuardDecision::Loading);
    }

    #[test]
    fn authorized_user_renders_children() {
        let session = session_for(json!({ "id": "u", "role": "ADMIN", "organizationId": "o1" }));
        assert_eq!(checked().render(&session, || "dashboard"), Guarded::Render("dashboard"));
    }

    #[test]
    fn empty_role_list_allows_any_role() {
        let session = session_for(json!({ "id": "u", "role": "VIEWER", "organizationId": "o1" }));
        let guard = checked().allow_roles(Vec::<String>::new());
        assert_eq!(guard.decide(&session), GuardDecision::Render);
    }

    #[test]
    fn evaluate_marks_checked() {
        let store = SessionStore::in_memory();
        let mut guard = RouteGuard::new();
        assert!(!guard.is_checked());
        assert_eq!(guard.evaluate(&store), GuardDecision::Redirect("/login".into()));
        assert!(guard.is_checked());
    }
}
