//! Network boundary used by [`crate::RequestCoordinator`].
//!
//! A [`Transport`] takes a request and a completion callback. Completions may
//! run in any order and at any later point on the owning thread; they must
//! never run on another thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Response with a JSON-encoded body.
    pub fn json(status: u16, value: &impl Serialize) -> Self {
        // serializing plain data into a Vec cannot fail
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to issue or complete a request at the network level.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

pub type Completion = Box<dyn FnOnce(Result<HttpResponse, TransportError>)>;

pub trait Transport {
    fn send(&self, request: HttpRequest, done: Completion);
}

impl<T: Transport + ?Sized> Transport for std::rc::Rc<T> {
    fn send(&self, request: HttpRequest, done: Completion) {
        (**self).send(request, done)
    }
}

struct Outstanding {
    request: HttpRequest,
    done: Completion,
}

/// Transport that holds every request until the caller resolves it, in
/// whatever order the caller chooses.
#[derive(Default)]
pub struct ScriptedTransport {
    outstanding: RefCell<VecDeque<Outstanding>>,
    sent: RefCell<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests still waiting for a response.
    pub fn pending(&self) -> usize {
        self.outstanding.borrow().len()
    }

    pub fn pending_urls(&self) -> Vec<String> {
        self.outstanding
            .borrow()
            .iter()
            .map(|o| o.request.url.clone())
            .collect()
    }

    /// Every request ever sent, in send order.
    pub fn sent(&self) -> Vec<HttpRequest> {
        self.sent.borrow().clone()
    }

    /// Resolves the oldest outstanding request. Returns false if none.
    pub fn resolve_next(&self, result: Result<HttpResponse, TransportError>) -> bool {
        let next = self.outstanding.borrow_mut().pop_front();
        self.finish(next, result)
    }

    /// Resolves the newest outstanding request.
    pub fn resolve_last(&self, result: Result<HttpResponse, TransportError>) -> bool {
        let last = self.outstanding.borrow_mut().pop_back();
        self.finish(last, result)
    }

    /// Resolves the oldest outstanding request for `url`.
    pub fn resolve_url(&self, url: &str, result: Result<HttpResponse, TransportError>) -> bool {
        let found = {
            let mut outstanding = self.outstanding.borrow_mut();
            outstanding
                .iter()
                .position(|o| o.request.url == url)
                .and_then(|i| outstanding.remove(i))
        };
        self.finish(found, result)
    }

    pub fn respond_json(&self, url: &str, status: u16, value: &impl Serialize) -> bool {
        self.resolve_url(url, Ok(HttpResponse::json(status, value)))
    }

    pub fn fail(&self, url: &str, message: &str) -> bool {
        self.resolve_url(url, Err(TransportError(message.to_string())))
    }

    // The queue is not borrowed while the completion runs, so it may send again.
    fn finish(
        &self,
        entry: Option<Outstanding>,
        result: Result<HttpResponse, TransportError>,
    ) -> bool {
        match entry {
            Some(o) => {
                log::trace!("scripted: completing {} {}", o.request.method, o.request.url);
                (o.done)(result);
                true
            }
            None => false,
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: HttpRequest, done: Completion) {
        self.sent.borrow_mut().push(request.clone());
        self.outstanding
            .borrow_mut()
            .push_back(Outstanding { request, done });
    }
}
