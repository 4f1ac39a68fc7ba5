//! Failure hooks and logger collaborator
//!
//! Two independently overridable strategies:
//!
//! - **Datastore-error hook** `(error, component, method, args)`: invoked by
//!   call sites around adapter operations when failover mode is enabled. Its
//!   result is discarded; it exists for observability and alerting.
//! - **Request filter** `(request) -> bool`: whether a request should be
//!   ignored (not recorded). The default flags bots that advertise a URL in
//!   their user agent.
//!
//! Unset slots fall back to the built-in defaults.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use tracing::Level;

use crate::Error;

/// Header key carrying the user agent in a request environment.
pub const USER_AGENT_KEY: &str = "HTTP_USER_AGENT";

/// Sink for leveled log lines.
pub trait LogSink: Send + Sync {
    /// Write `message` at `level`.
    fn log(&self, level: Level, message: &str);
}

/// Default sink forwarding to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(target: "trueno_ab", "{message}"),
            Level::WARN => tracing::warn!(target: "trueno_ab", "{message}"),
            Level::INFO => tracing::info!(target: "trueno_ab", "{message}"),
            Level::DEBUG => tracing::debug!(target: "trueno_ab", "{message}"),
            _ => tracing::trace!(target: "trueno_ab", "{message}"),
        }
    }
}

/// Handler for datastore errors in failover mode.
pub type DatastoreErrorHook = Arc<dyn Fn(&Error, &str, &str, &[Value]) + Send + Sync>;

/// Decides whether a request should be ignored.
pub type RequestFilter = Arc<dyn Fn(Option<&Request>) -> bool + Send + Sync>;

/// Minimal view of an inbound request: its environment mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    env: Option<BTreeMap<String, String>>,
}

impl Request {
    /// Request without an environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request with the given environment mapping.
    #[must_use]
    pub const fn with_env(env: BTreeMap<String, String>) -> Self {
        Self { env: Some(env) }
    }

    /// Request whose environment holds only a user agent.
    #[must_use]
    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        let mut env = BTreeMap::new();
        env.insert(USER_AGENT_KEY.to_string(), user_agent.into());
        Self::with_env(env)
    }

    /// Environment mapping, if the request exposes one.
    #[must_use]
    pub const fn env(&self) -> Option<&BTreeMap<String, String>> {
        self.env.as_ref()
    }

    /// User agent, if present.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.env.as_ref()?.get(USER_AGENT_KEY).map(String::as_str)
    }
}

fn bot_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\(.*https?://.*\)").ok())
        .as_ref()
}

/// Default request filter: true for user agents advertising a URL in
/// parentheses (`Mozilla/5.0 (+http://example.com/bot)`).
///
/// Missing request, environment, or header yields `false`.
#[must_use]
pub fn default_request_filter(request: Option<&Request>) -> bool {
    let Some(user_agent) = request.and_then(Request::user_agent) else {
        return false;
    };
    bot_pattern().is_some_and(|pattern| pattern.is_match(user_agent))
}

/// Default datastore-error handling: one structured error line.
pub fn default_datastore_error(
    logger: &dyn LogSink,
    error: &Error,
    component: &str,
    method: &str,
    args: &[Value],
) {
    let args = serde_json::to_string(args).unwrap_or_else(|_| "[]".to_string());
    logger.log(
        Level::ERROR,
        &format!(
            "[{}] trueno-ab: {component}#{method}: {error} args={args}",
            Utc::now().to_rfc3339()
        ),
    );
}

/// Overridable hook slots; `None` means "use the default".
#[derive(Default)]
pub struct FailureHooks {
    on_datastore_error: RwLock<Option<DatastoreErrorHook>>,
    request_filter: RwLock<Option<RequestFilter>>,
}

impl FailureHooks {
    /// Both slots unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicitly set datastore-error hook.
    #[must_use]
    pub fn on_datastore_error(&self) -> Option<DatastoreErrorHook> {
        self.on_datastore_error.read().clone()
    }

    /// Set (or with `None`, clear) the datastore-error hook.
    pub fn set_on_datastore_error(&self, hook: Option<DatastoreErrorHook>) {
        *self.on_datastore_error.write() = hook;
    }

    /// Explicitly set request filter.
    #[must_use]
    pub fn request_filter(&self) -> Option<RequestFilter> {
        self.request_filter.read().clone()
    }

    /// Set (or with `None`, clear) the request filter.
    pub fn set_request_filter(&self, filter: Option<RequestFilter>) {
        *self.request_filter.write() = filter;
    }
}

impl fmt::Debug for FailureHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureHooks")
            .field("on_datastore_error", &self.on_datastore_error.read().is_some())
            .field("request_filter", &self.request_filter.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CapturingSink(Mutex<Vec<(Level, String)>>);

    impl LogSink for CapturingSink {
        fn log(&self, level: Level, message: &str) {
            self.0.lock().push((level, message.to_string()));
        }
    }

    #[test]
    fn test_request_filter_flags_bots() {
        let bot = Request::with_user_agent("Mozilla/5.0 (+http://example.com/bot)");
        assert!(default_request_filter(Some(&bot)));

        let https_bot = Request::with_user_agent("Crawler (compatible; https://crawl.example.org)");
        assert!(default_request_filter(Some(&https_bot)));
    }

    #[test]
    fn test_request_filter_passes_browsers() {
        let browser = Request::with_user_agent(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15",
        );
        assert!(!default_request_filter(Some(&browser)));

        let url_outside_parens = Request::with_user_agent("http://example.com/bot");
        assert!(!default_request_filter(Some(&url_outside_parens)));
    }

    #[test]
    fn test_request_filter_tolerates_missing_parts() {
        assert!(!default_request_filter(None));
        assert!(!default_request_filter(Some(&Request::new())));
        assert!(!default_request_filter(Some(&Request::with_env(BTreeMap::new()))));
    }

    #[test]
    fn test_default_datastore_error_logs_one_line() {
        let sink = CapturingSink::default();
        let error = Error::Adapter("connection refused".to_string());

        default_datastore_error(
            &sink,
            &error,
            "Metric",
            "track",
            &[Value::from("signups"), Value::from(1)],
        );

        let lines = sink.0.lock();
        assert_eq!(lines.len(), 1);
        let (level, line) = &lines[0];
        assert_eq!(*level, Level::ERROR);
        assert!(line.contains("Metric#track"));
        assert!(line.contains("connection refused"));
        assert!(line.contains(r#"["signups",1]"#));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_hook_slots_start_unset() {
        let hooks = FailureHooks::new();
        assert!(hooks.on_datastore_error().is_none());
        assert!(hooks.request_filter().is_none());

        hooks.set_request_filter(Some(Arc::new(|_: Option<&Request>| true)));
        assert!(hooks.request_filter().is_some());
        hooks.set_request_filter(None);
        assert!(hooks.request_filter().is_none());
    }
}
