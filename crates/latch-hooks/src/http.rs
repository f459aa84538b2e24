//! Blocking HTTP over `ureq`, completed on the owning thread.
//!
//! Each request runs on its own worker thread. Results come back over a
//! channel and are delivered to their completions only when the owner calls
//! [`UreqTransport::pump`], so completions never leave the owner thread.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::Read;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use url::Url;

use crate::transport::{Completion, HttpRequest, HttpResponse, Transport, TransportError};

type Delivery = (u64, Result<HttpResponse, TransportError>);

pub struct UreqTransport {
    agent: ureq::Agent,
    tx: Sender<Delivery>,
    rx: Receiver<Delivery>,
    waiting: RefCell<HashMap<u64, Completion>>,
    next_id: Cell<u64>,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::with_agent(
            ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(30))
                .build(),
        )
    }

    pub fn with_agent(agent: ureq::Agent) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            agent,
            tx,
            rx,
            waiting: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }

    /// Requests sent but not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.waiting.borrow().len()
    }

    /// Delivers every finished request. Returns how many were delivered.
    pub fn pump(&self) -> usize {
        let mut delivered = 0;
        while let Ok(delivery) = self.rx.try_recv() {
            self.deliver(delivery);
            delivered += 1;
        }
        delivered
    }

    /// Waits up to `timeout` for at least one result, then drains the rest.
    pub fn pump_wait(&self, timeout: Duration) -> usize {
        if self.in_flight() == 0 {
            return 0;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(delivery) => {
                self.deliver(delivery);
                1 + self.pump()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    fn deliver(&self, (id, result): Delivery) {
        let done = self.waiting.borrow_mut().remove(&id);
        match done {
            Some(done) => done(result),
            None => log::warn!("http: result for unknown request {id}"),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: HttpRequest, done: Completion) {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.waiting.borrow_mut().insert(id, done);

        let tx = self.tx.clone();
        let url = match Url::parse(&request.url) {
            Ok(url) => url,
            Err(e) => {
                let error = TransportError(format!("invalid url {}: {e}", request.url));
                let _ = tx.send((id, Err(error)));
                return;
            }
        };

        let agent = self.agent.clone();
        std::thread::spawn(move || {
            let result = execute(&agent, &url, &request);
            // the owner may be gone; nothing left to tell
            let _ = tx.send((id, result));
        });
    }
}

fn execute(
    agent: &ureq::Agent,
    url: &Url,
    request: &HttpRequest,
) -> Result<HttpResponse, TransportError> {
    let mut req = agent.request_url(request.method.as_str(), url);
    for (name, value) in &request.headers {
        req = req.set(name, value);
    }
    log::debug!("http: {} {}", request.method, url);

    let outcome = match &request.body {
        Some(body) => req.send_bytes(body),
        None => req.call(),
    };
    let response = match outcome {
        Ok(resp) => resp,
        // non-2xx is still a response; the coordinator decides what it means
        Err(ureq::Error::Status(_, resp)) => resp,
        Err(ureq::Error::Transport(err)) => return Err(TransportError(err.to_string())),
    };

    let status = response.status();
    let mut body = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut body)
        .map_err(|e| TransportError(format!("reading body: {e}")))?;
    Ok(HttpResponse { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, RequestCoordinator};
    use std::rc::Rc;

    #[test]
    fn invalid_url_is_delivered_as_transport_error() {
        let transport = Rc::new(UreqTransport::new());
        let fetch = RequestCoordinator::<serde_json::Value>::new(transport.clone());
        fetch.issue("not a url");

        assert_eq!(transport.in_flight(), 1);
        assert_eq!(transport.pump(), 1);
        assert!(matches!(fetch.error(), Some(FetchError::Transport(_))));
        assert!(!fetch.is_loading());
    }
}
