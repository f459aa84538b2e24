use std::cell::RefCell;
use std::rc::{Rc, Weak};

use latch_core::{CancelToken, Epoch, Generation, Signal, SubId, signal};
use serde::de::DeserializeOwned;

use crate::transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};

/// Why a fetch did not produce data. Surfaced through [`FetchState::error`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("HTTP error! status: {status}")]
    HttpStatus { status: u16 },
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status } => Some(*status),
            _ => None,
        }
    }
}

impl From<TransportError> for FetchError {
    fn from(e: TransportError) -> Self {
        FetchError::Transport(e.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchOptions {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: Method::Get,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: None,
        }
    }
}

impl FetchOptions {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets a header, replacing any existing one with the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn json_body(self, value: &impl serde::Serialize) -> Result<Self, serde_json::Error> {
        Ok(self.body(serde_json::to_vec(value)?))
    }
}

/// What to fetch: a URL plus request options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchTarget {
    pub url: String,
    pub options: FetchOptions,
}

impl FetchTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: FetchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    fn to_request(&self) -> HttpRequest {
        HttpRequest {
            method: self.options.method,
            url: self.url.clone(),
            headers: self.options.headers.clone(),
            body: self.options.body.clone(),
        }
    }
}

impl From<&str> for FetchTarget {
    fn from(url: &str) -> Self {
        FetchTarget::new(url)
    }
}

impl From<String> for FetchTarget {
    fn from(url: String) -> Self {
        FetchTarget::new(url)
    }
}

/// Observable result of a [`RequestCoordinator`].
///
/// While `loading`, `data` and `error` still describe the last settled
/// generation (except that `error` is cleared when a new request starts).
#[derive(Clone, Debug, PartialEq)]
pub struct FetchState<T> {
    pub data: Option<T>,
    pub error: Option<FetchError>,
    pub loading: bool,
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            loading: false,
        }
    }
}

/// Issues fetches and lets only the most recently issued one update state.
///
/// Completions of superseded requests are dropped without touching state,
/// regardless of the order the transport delivers them in. The handle is
/// cheap to clone; all clones share one generation counter.
pub struct RequestCoordinator<T: 'static> {
    inner: Rc<Inner<T>>,
}

struct Inner<T: 'static> {
    transport: Rc<dyn Transport>,
    state: Signal<FetchState<T>>,
    epoch: Epoch,
    target: RefCell<Option<FetchTarget>>,
}

impl<T> Clone for RequestCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: DeserializeOwned + 'static> RequestCoordinator<T> {
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        Self {
            inner: Rc::new(Inner {
                transport,
                state: signal(FetchState::default()),
                epoch: Epoch::new(),
                target: RefCell::new(None),
            }),
        }
    }

    /// Starts a new generation for `target`. Returns `None` once disposed.
    pub fn issue(&self, target: impl Into<FetchTarget>) -> Option<Generation> {
        let target = target.into();
        if self.inner.epoch.is_closed() {
            log::debug!("fetch: ignoring issue of {} after dispose", target.url);
            return None;
        }

        let token = self.inner.epoch.advance();
        let generation = token.generation();
        let request = target.to_request();
        *self.inner.target.borrow_mut() = Some(target);

        self.inner.state.update(|s| {
            s.loading = true;
            s.error = None;
        });

        log::debug!("fetch {generation}: {} {}", request.method, request.url);
        let weak: Weak<Inner<T>> = Rc::downgrade(&self.inner);
        self.inner.transport.send(
            request,
            Box::new(move |result| {
                if let Some(inner) = weak.upgrade() {
                    inner.settle(&token, result);
                }
            }),
        );
        Some(generation)
    }

    /// Re-issues the current target. `None` if nothing was issued yet.
    pub fn refetch(&self) -> Option<Generation> {
        let target = self.inner.target.borrow().clone()?;
        self.issue(target)
    }

    /// Issues only when `target` differs from the current one.
    pub fn set_target(&self, target: impl Into<FetchTarget>) -> Option<Generation> {
        let target = target.into();
        if self.inner.target.borrow().as_ref() == Some(&target) {
            return None;
        }
        self.issue(target)
    }
}

impl<T: 'static> RequestCoordinator<T> {
    pub fn state(&self) -> FetchState<T>
    where
        T: Clone,
    {
        self.inner.state.get()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&FetchState<T>) -> R) -> R {
        self.inner.state.with(f)
    }

    pub fn is_loading(&self) -> bool {
        self.with_state(|s| s.loading)
    }

    pub fn error(&self) -> Option<FetchError> {
        self.with_state(|s| s.error.clone())
    }

    pub fn target(&self) -> Option<FetchTarget> {
        self.inner.target.borrow().clone()
    }

    /// Generation of the most recent issue.
    pub fn latest(&self) -> Generation {
        self.inner.epoch.current()
    }

    pub fn subscribe(&self, f: impl Fn(&FetchState<T>) + 'static) -> SubId {
        self.inner.state.subscribe(f)
    }

    pub fn unsubscribe(&self, id: SubId) -> bool {
        self.inner.state.unsubscribe(id)
    }

    /// Tears the coordinator down: in-flight completions become no-ops and
    /// later issues are ignored.
    pub fn dispose(&self) {
        self.inner.epoch.close();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.epoch.is_closed()
    }
}

impl<T: DeserializeOwned + 'static> Inner<T> {
    fn settle(&self, token: &CancelToken, result: Result<HttpResponse, TransportError>) {
        if !token.is_current() {
            log::debug!(
                "fetch {}: stale response discarded (latest is {})",
                token.generation(),
                self.epoch.current()
            );
            return;
        }

        match decode::<T>(result) {
            Ok(data) => {
                log::debug!("fetch {}: settled", token.generation());
                self.state.set(FetchState {
                    data: Some(data),
                    error: None,
                    loading: false,
                });
            }
            Err(error) => {
                log::debug!("fetch {}: failed: {error}", token.generation());
                self.state.set(FetchState {
                    data: None,
                    error: Some(error),
                    loading: false,
                });
            }
        }
    }
}

fn decode<T: DeserializeOwned>(
    result: Result<HttpResponse, TransportError>,
) -> Result<T, FetchError> {
    let response = result?;
    if !response.is_success() {
        return Err(FetchError::HttpStatus {
            status: response.status,
        });
    }
    serde_json::from_slice(&response.body).map_err(|e| FetchError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ScriptedTransport;
    use serde::Deserialize;
    use serde_json::json;
    use std::cell::RefCell;

    #[derive(Clone, Debug, PartialEq, Deserialize)]
    struct Item {
        id: String,
    }

    fn setup() -> (Rc<ScriptedTransport>, RequestCoordinator<Item>) {
        let transport = Rc::new(ScriptedTransport::new());
        let coordinator = RequestCoordinator::new(transport.clone());
        (transport, coordinator)
    }

    #[test]
    fn latest_issue_wins_when_responses_reorder() {
        let (transport, fetch) = setup();

        let r1 = fetch.issue("/items/A").unwrap();
        let r2 = fetch.issue("/items/B").unwrap();
        assert!(r2 > r1);

        // R2 resolves first, R1 arrives late.
        transport.respond_json("/items/B", 200, &json!({"id": "B"}));
        transport.respond_json("/items/A", 200, &json!({"id": "A"}));

        let state = fetch.state();
        assert_eq!(state.data, Some(Item { id: "B".into() }));
        assert_eq!(state.error, None);
        assert!(!state.loading);
    }

    #[test]
    fn stale_response_leaves_loading_untouched() {
        let (transport, fetch) = setup();
        fetch.issue("/a");
        fetch.issue("/b");

        transport.respond_json("/a", 200, &json!({"id": "A"}));
        let state = fetch.state();
        assert!(state.loading);
        assert_eq!(state.data, None);
    }

    #[test]
    fn stale_failure_is_discarded_too() {
        let (transport, fetch) = setup();
        fetch.issue("/a");
        fetch.issue("/b");

        transport.respond_json("/b", 200, &json!({"id": "B"}));
        transport.fail("/a", "connection reset");

        assert_eq!(fetch.state().data, Some(Item { id: "B".into() }));
        assert_eq!(fetch.error(), None);
    }

    #[test]
    fn status_error_then_refetch_recovers() {
        let (transport, fetch) = setup();
        fetch.issue("/flaky");
        transport.respond_json("/flaky", 500, &json!({"message": "boom"}));

        let state = fetch.state();
        assert_eq!(state.error, Some(FetchError::HttpStatus { status: 500 }));
        assert!(state.error.unwrap().to_string().contains("500"));
        assert_eq!(state.data, None);
        assert!(!state.loading);

        fetch.refetch().unwrap();
        assert!(fetch.is_loading());
        assert_eq!(fetch.error(), None);

        transport.respond_json("/flaky", 200, &json!({"id": "ok"}));
        let state = fetch.state();
        assert_eq!(state.error, None);
        assert_eq!(state.data, Some(Item { id: "ok".into() }));
    }

    #[test]
    fn data_is_kept_while_reloading() {
        let (transport, fetch) = setup();
        fetch.issue("/x");
        transport.respond_json("/x", 200, &json!({"id": "1"}));

        fetch.refetch();
        let state = fetch.state();
        assert!(state.loading);
        assert_eq!(state.data, Some(Item { id: "1".into() }));
    }

    #[test]
    fn transport_failure_surfaces_as_error() {
        let (transport, fetch) = setup();
        fetch.issue("/down");
        transport.fail("/down", "dns lookup failed");

        assert_eq!(
            fetch.error(),
            Some(FetchError::Transport("dns lookup failed".into()))
        );
        assert_eq!(fetch.state().data, None);
    }

    #[test]
    fn undecodable_body_is_an_error() {
        let (transport, fetch) = setup();
        fetch.issue("/html");
        transport.resolve_next(Ok(HttpResponse::new(200, "<html>")));

        assert!(matches!(fetch.error(), Some(FetchError::Decode(_))));
    }

    #[test]
    fn refetch_supersedes_in_flight_request() {
        let (transport, fetch) = setup();
        fetch.issue("/same");
        let newest = fetch.refetch();
        assert_eq!(transport.pending(), 2);
        assert_eq!(Some(fetch.latest()), newest);

        // the newer request completes first, then the older one
        transport.resolve_last(Ok(HttpResponse::json(200, &json!({"id": "new"}))));
        transport.resolve_next(Ok(HttpResponse::json(200, &json!({"id": "old"}))));

        assert_eq!(fetch.state().data, Some(Item { id: "new".into() }));
    }

    #[test]
    fn refetch_without_target_is_noop() {
        let (transport, fetch) = setup();
        assert_eq!(fetch.refetch(), None);
        assert_eq!(transport.pending(), 0);
    }

    #[test]
    fn set_target_issues_only_on_change() {
        let (transport, fetch) = setup();
        assert!(fetch.set_target("/a").is_some());
        assert!(fetch.set_target("/a").is_none());
        assert!(fetch.set_target("/b").is_some());
        assert_eq!(transport.sent().len(), 2);
    }

    #[test]
    fn request_carries_json_content_type_and_options() {
        let (transport, fetch) = setup();
        let options = FetchOptions::default()
            .method(Method::Post)
            .header("Authorization", "Bearer t")
            .json_body(&json!({"q": 1}))
            .unwrap();
        fetch.issue(FetchTarget::new("/search").with_options(options));

        let sent = transport.sent();
        let req = &sent[0];
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("authorization"), Some("Bearer t"));
        assert_eq!(req.body.as_deref(), Some(br#"{"q":1}"#.as_slice()));
    }

    #[test]
    fn no_state_change_after_dispose() {
        let (transport, fetch) = setup();
        fetch.issue("/slow");
        fetch.dispose();

        transport.respond_json("/slow", 200, &json!({"id": "late"}));
        assert_eq!(fetch.state().data, None);
        assert_eq!(fetch.issue("/again"), None);
        assert_eq!(transport.pending(), 0);
    }

    #[test]
    fn completion_after_drop_is_harmless() {
        let (transport, fetch) = setup();
        fetch.issue("/gone");
        drop(fetch);
        assert!(transport.respond_json("/gone", 200, &json!({"id": "x"})));
    }

    #[test]
    fn subscribers_see_loading_then_settled() {
        let (transport, fetch) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        fetch.subscribe(move |st| s.borrow_mut().push((st.loading, st.data.is_some())));

        fetch.issue("/x");
        transport.respond_json("/x", 200, &json!({"id": "x"}));

        assert_eq!(*seen.borrow(), vec![(true, false), (false, true)]);
    }

    #[test]
    fn error_subscriber_can_retry() {
        let (transport, fetch) = setup();
        let retried = Rc::new(std::cell::Cell::new(false));
        let retry = fetch.clone();
        let r = retried.clone();
        fetch.subscribe(move |st| {
            if st.error.is_some() && !r.replace(true) {
                retry.refetch();
            }
        });

        fetch.issue("/x");
        transport.respond_json("/x", 500, &json!(null));
        assert!(retried.get());
        assert!(fetch.is_loading());
        assert_eq!(fetch.error(), None);
        assert_eq!(transport.pending(), 1);

        transport.respond_json("/x", 200, &json!({"id": "x"}));
        assert_eq!(fetch.state().data.map(|i| i.id), Some("x".to_string()));
    }
}
