//! Search-as-you-type panel driven by a hand-rolled event loop.
//!
//! Keystrokes arrive on a virtual clock; the query is debounced, fetched,
//! counted in a persisted store and compared with the previous query.
//!
//! `LATCH_STORE=path.json` keeps the counter on disk. With `--features http`,
//! `LATCH_URL=https://host` sends real requests to `{LATCH_URL}/search?q=..`.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use latch_core::{Composition, ManualClock, Timer, TimerQueue};
use latch_hooks::{
    FileStore, KeyValueStore, MemoryStore, ScriptedTransport, Transport, remember_debounced,
    remember_fetch, remember_persisted, remember_previous,
};
use serde::{Deserialize, Serialize};

const QUIET: Duration = Duration::from_millis(250);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct SearchResult {
    query: String,
    hits: Vec<String>,
}

enum Backend {
    Scripted(Rc<ScriptedTransport>),
    #[cfg(feature = "http")]
    Http(Rc<latch_hooks::UreqTransport>),
}

impl Backend {
    fn transport(&self) -> Rc<dyn Transport> {
        match self {
            Backend::Scripted(t) => t.clone(),
            #[cfg(feature = "http")]
            Backend::Http(t) => t.clone(),
        }
    }

    /// Completes outstanding requests. The scripted backend answers newest
    /// first, so older responses always arrive late.
    fn drive(&self) {
        match self {
            Backend::Scripted(t) => {
                while t.pending() > 0 {
                    let urls = t.pending_urls();
                    let Some(url) = urls.last() else { break };
                    let query = url.rsplit("q=").next().unwrap_or_default().to_string();
                    let hits = CATALOG
                        .iter()
                        .filter(|name| !query.is_empty() && name.contains(query.as_str()))
                        .map(|name| name.to_string())
                        .collect();
                    t.respond_json(url, 200, &SearchResult { query, hits });
                }
            }
            #[cfg(feature = "http")]
            Backend::Http(t) => {
                t.pump_wait(Duration::from_secs(5));
            }
        }
    }
}

const CATALOG: &[&str] = &["rust", "rustls", "rusqlite", "ruby", "runtime", "serde"];

struct Env {
    base: String,
    timer: Rc<dyn Timer>,
    transport: Rc<dyn Transport>,
    store: Arc<dyn KeyValueStore>,
}

fn search_panel(env: &Env, typed: &str) -> String {
    let query = remember_debounced(typed.to_string(), QUIET, &env.timer);
    let previous = remember_previous(query.clone());
    let (searches, searches_setter) = remember_persisted("demo:searches", || 0u32, &env.store);

    if previous.as_ref().is_some_and(|p| *p != query) && !query.is_empty() {
        searches_setter.update(|n| n + 1);
    }

    let results = remember_fetch::<SearchResult>(
        format!("{}/search?q={query}", env.base),
        &env.transport,
    );

    let body = match (&results.data, &results.error) {
        (_, Some(e)) => format!("error: {e}"),
        (Some(r), None) => format!("{} -> {:?}", r.query, r.hits),
        (None, None) => "nothing yet".to_string(),
    };
    format!(
        "typed={typed:<6} query={query:<6} prev={:<8} searches={searches:<3} {}{}",
        format!("{previous:?}"),
        if results.loading { "[loading] " } else { "" },
        body
    )
}

fn open_store() -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match std::env::var("LATCH_STORE") {
        Ok(path) => {
            let store = FileStore::open(&path).with_context(|| format!("opening store {path}"))?;
            log::info!("using file store at {path}");
            Ok(Arc::new(store))
        }
        Err(_) => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(feature = "http")]
fn http_backend() -> Option<(Backend, String)> {
    let url = std::env::var("LATCH_URL").ok()?;
    let t = Rc::new(latch_hooks::UreqTransport::new());
    Some((Backend::Http(t), url.trim_end_matches('/').to_string()))
}

#[cfg(not(feature = "http"))]
fn http_backend() -> Option<(Backend, String)> {
    None
}

fn open_backend() -> (Backend, String) {
    if let Some(backend) = http_backend() {
        return backend;
    }
    (
        Backend::Scripted(Rc::new(ScriptedTransport::new())),
        "https://search.invalid".to_string(),
    )
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let clock = Rc::new(ManualClock::new());
    let timers = Rc::new(TimerQueue::new(clock.clone()));
    let (backend, base) = open_backend();
    let env = Env {
        base,
        timer: timers.clone(),
        transport: backend.transport(),
        store: open_store()?,
    };

    let comp = Composition::new();
    let dirty = Rc::new(Cell::new(true));
    {
        let dirty = dirty.clone();
        comp.on_invalidate(move |_| dirty.set(true));
    }

    // (milliseconds since previous event, text in the box)
    let keystrokes = [
        (0, "r"),
        (80, "ru"),
        (90, "rus"),
        (400, "rust"),
        (60, "rus"),
        (500, "ser"),
        (700, "ser"),
    ];

    let mut typed = "";
    for (delay, text) in keystrokes {
        // step the virtual clock in small ticks so timers fire on time
        let mut remaining = delay;
        while remaining > 0 {
            let tick = remaining.min(10);
            clock.advance(Duration::from_millis(tick));
            remaining -= tick;
            timers.run_due();
            backend.drive();
            if dirty.replace(false) {
                println!("{}", comp.compose(|| search_panel(&env, typed)));
            }
        }
        typed = text;
        dirty.set(false);
        println!("{}", comp.compose(|| search_panel(&env, typed)));
    }

    // typing is over; jump straight to each remaining deadline
    loop {
        if let Some(deadline) = timers.next_deadline() {
            clock.set(deadline);
        }
        timers.run_due();
        backend.drive();
        if dirty.replace(false) {
            println!("{}", comp.compose(|| search_panel(&env, typed)));
        } else if timers.is_empty() {
            break;
        }
    }

    comp.dispose();
    log::info!("panel unmounted");
    Ok(())
}
