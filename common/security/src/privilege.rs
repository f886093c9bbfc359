use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use common_auth::{Claims, Deferred};
use common_http_errors::{ApiError, ApiResult};
use tracing::warn;

use crate::state::RequestAuthState;

pub const DEFAULT_PRIVILEGE_KEY: &str = "privilegeList";

/// Privilege names with their occurrence counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegeSet(HashMap<String, usize>);

impl PrivilegeSet {
    pub fn from_user(user: Option<&Claims>, key: &str) -> Self {
        user.map(|user| user.string_list(key))
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    pub fn contains(&self, privilege: &str) -> bool {
        self.count(privilege) > 0
    }

    pub fn count(&self, privilege: &str) -> usize {
        self.0.get(privilege).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for PrivilegeSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut counts = HashMap::new();
        for privilege in iter {
            *counts.entry(privilege.to_owned()).or_insert(0) += 1;
        }
        Self(counts)
    }
}

type Predicate = Arc<dyn Fn(&PrivilegeSet) -> bool + Send + Sync>;

/// A privilege name or a predicate over the user's privileges.
#[derive(Clone)]
pub enum PrivilegeCheck {
    Named(String),
    Predicate(Predicate),
}

impl PrivilegeCheck {
    pub fn predicate<F>(check: F) -> Self
    where
        F: Fn(&PrivilegeSet) -> bool + Send + Sync + 'static,
    {
        PrivilegeCheck::Predicate(Arc::new(check))
    }

    pub fn holds(&self, privileges: &PrivilegeSet) -> bool {
        match self {
            PrivilegeCheck::Named(name) => privileges.contains(name),
            PrivilegeCheck::Predicate(check) => check(privileges),
        }
    }
}

impl std::fmt::Debug for PrivilegeCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivilegeCheck::Named(name) => f.debug_tuple("Named").field(name).finish(),
            PrivilegeCheck::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for PrivilegeCheck {
    fn from(value: &str) -> Self {
        PrivilegeCheck::Named(value.to_owned())
    }
}

impl From<String> for PrivilegeCheck {
    fn from(value: String) -> Self {
        PrivilegeCheck::Named(value)
    }
}

type Resolver<T> = Arc<dyn Fn(&Parts) -> Deferred<T> + Send + Sync>;

/// A requirement fixed at build time or computed from each request.
#[derive(Clone)]
pub enum Requirement<T> {
    Literal(T),
    FromRequest(Resolver<T>),
}

impl<T: Clone> Requirement<T> {
    async fn resolve(&self, parts: &Parts) -> T {
        match self {
            Requirement::Literal(value) => value.clone(),
            Requirement::FromRequest(resolver) => resolver(parts).await,
        }
    }
}

fn checks<I, C>(items: I) -> Vec<PrivilegeCheck>
where
    I: IntoIterator<Item = C>,
    C: Into<PrivilegeCheck>,
{
    items.into_iter().map(Into::into).collect()
}

/// `has`, `has_all` and `has_any` requirements. Every present requirement
/// must hold; empty lists are ignored.
#[derive(Clone, Default)]
pub struct PrivilegeRequirements {
    has: Option<Requirement<PrivilegeCheck>>,
    has_all: Option<Requirement<Vec<PrivilegeCheck>>>,
    has_any: Option<Requirement<Vec<PrivilegeCheck>>>,
}

impl PrivilegeRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(mut self, check: impl Into<PrivilegeCheck>) -> Self {
        self.has = Some(Requirement::Literal(check.into()));
        self
    }

    pub fn has_all<I, C>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<PrivilegeCheck>,
    {
        self.has_all = Some(Requirement::Literal(checks(items)));
        self
    }

    pub fn has_any<I, C>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<PrivilegeCheck>,
    {
        self.has_any = Some(Requirement::Literal(checks(items)));
        self
    }

    pub fn has_from_request<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Parts) -> Deferred<PrivilegeCheck> + Send + Sync + 'static,
    {
        self.has = Some(Requirement::FromRequest(Arc::new(resolver)));
        self
    }

    pub fn has_all_from_request<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Parts) -> Deferred<Vec<PrivilegeCheck>> + Send + Sync + 'static,
    {
        self.has_all = Some(Requirement::FromRequest(Arc::new(resolver)));
        self
    }

    pub fn has_any_from_request<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Parts) -> Deferred<Vec<PrivilegeCheck>> + Send + Sync + 'static,
    {
        self.has_any = Some(Requirement::FromRequest(Arc::new(resolver)));
        self
    }

    /// Resolves request-dependent requirements, then evaluates them all.
    pub async fn authorizes(&self, parts: &Parts, privileges: &PrivilegeSet) -> bool {
        let mut authorized = true;
        if let Some(has) = &self.has {
            authorized = authorized && has.resolve(parts).await.holds(privileges);
        }
        if let Some(has_all) = &self.has_all {
            let all = has_all.resolve(parts).await;
            if !all.is_empty() {
                authorized = authorized && all.iter().all(|check| check.holds(privileges));
            }
        }
        if let Some(has_any) = &self.has_any {
            let any = has_any.resolve(parts).await;
            if !any.is_empty() {
                authorized = authorized && any.iter().any(|check| check.holds(privileges));
            }
        }
        authorized
    }
}

#[derive(Debug, Clone)]
pub struct PrivilegeConfig {
    pub privilege_key: String,
    pub error_message: Option<String>,
}

impl Default for PrivilegeConfig {
    fn default() -> Self {
        Self {
            privilege_key: DEFAULT_PRIVILEGE_KEY.to_string(),
            error_message: None,
        }
    }
}

impl PrivilegeConfig {
    pub fn with_privilege_key(mut self, key: impl Into<String>) -> Self {
        self.privilege_key = key.into();
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// State for `require_privilege`.
#[derive(Clone, Default)]
pub struct PrivilegeGuard {
    requirements: Arc<PrivilegeRequirements>,
    config: Arc<PrivilegeConfig>,
}

impl PrivilegeGuard {
    pub fn new(requirements: PrivilegeRequirements) -> Self {
        Self {
            requirements: Arc::new(requirements),
            config: Arc::default(),
        }
    }

    pub fn with_config(mut self, config: PrivilegeConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub async fn check(&self, parts: &Parts, state: Option<&RequestAuthState>) -> ApiResult<()> {
        let user = state.and_then(|state| state.user.as_ref());
        let privileges = PrivilegeSet::from_user(user, &self.config.privilege_key);
        if self.requirements.authorizes(parts, &privileges).await {
            return Ok(());
        }
        warn!(
            user = user.and_then(Claims::id_string).unwrap_or_default(),
            path = %parts.uri.path(),
            privileges = privileges.len(),
            "privilege_check_failed"
        );
        Err(ApiError::authorization(
            self.config.error_message.clone().unwrap_or_default(),
        ))
    }
}

/// `route_layer(middleware::from_fn_with_state(guard, require_privilege))`
pub async fn require_privilege(
    State(guard): State<PrivilegeGuard>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (parts, body) = req.into_parts();
    let state = parts.extensions.get::<RequestAuthState>();
    guard.check(&parts, state).await?;
    Ok(next.run(Request::from_parts(parts, body)).await)
}
