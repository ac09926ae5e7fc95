use crate::body::BodyParserRegistry;
use crate::exchange::{CancelSignal, Exchange};
use crate::middlewares::{
    resolve_chain, run_http_chain, CallbackInfo, GlobalMiddlewares, Middleware,
};
use crate::req::HttpRequest;
use crate::res::HttpResponse;
use crate::session::driver::MemorySessionDriver;
use crate::session::manager::{SessionConfig, SessionManager};
use crate::types::SchemeFamily;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

fn test_exchange() -> Exchange {
    let sessions = Arc::new(SessionManager::new(SessionConfig {
        driver: Some(Arc::new(MemorySessionDriver::new())),
        ..Default::default()
    }));
    Exchange::bind(
        HttpRequest::new(),
        HttpResponse::new(),
        sessions,
        Arc::new(BodyParserRegistry::new()),
        CancelSignal::new(),
    )
}

struct Recorder {
    name: &'static str,
    order: Arc<Mutex<Vec<&'static str>>>,
    cancel: bool,
    family: Option<SchemeFamily>,
}

impl Recorder {
    fn new(name: &'static str, order: &Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            order: Arc::clone(order),
            cancel: false,
            family: None,
        })
    }

    fn cancelling(name: &'static str, order: &Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            order: Arc::clone(order),
            cancel: true,
            family: None,
        })
    }

    fn only_for(
        name: &'static str,
        order: &Arc<Mutex<Vec<&'static str>>>,
        family: SchemeFamily,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            order: Arc::clone(order),
            cancel: false,
            family: Some(family),
        })
    }
}

#[async_trait]
impl Middleware for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn applies_to(&self, family: SchemeFamily) -> bool {
        self.family.map(|f| f == family).unwrap_or(true)
    }

    async fn handle(&self, callback: &mut CallbackInfo, _exchange: &mut Exchange) {
        self.order.lock().push(self.name);
        if self.cancel {
            callback.cancel("denied");
        }
    }
}

#[tokio::test]
async fn chain_runs_globals_then_locals_in_registration_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let globals: Vec<Arc<dyn Middleware>> = vec![
        Recorder::new("g1", &order),
        Recorder::new("g2", &order),
    ];
    let locals: Vec<Arc<dyn Middleware>> = vec![
        Recorder::new("l1", &order),
        Recorder::new("l2", &order),
    ];

    let mut exchange = test_exchange();
    let callback = run_http_chain(&globals, &locals, &mut exchange).await;
    assert!(!callback.is_cancelled());
    assert_eq!(*order.lock(), vec!["g1", "g2", "l1", "l2"]);
}

#[tokio::test]
async fn cancel_lets_the_rest_of_the_chain_run() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let globals: Vec<Arc<dyn Middleware>> = vec![Recorder::cancelling("gate", &order)];
    let locals: Vec<Arc<dyn Middleware>> = vec![Recorder::new("after", &order)];

    let mut exchange = test_exchange();
    let callback = run_http_chain(&globals, &locals, &mut exchange).await;
    assert!(callback.is_cancelled());
    assert_eq!(callback.cancel_reason(), Some("denied"));
    assert_eq!(*order.lock(), vec!["gate", "after"]);
}

#[tokio::test]
async fn transport_cancel_stops_the_chain_immediately() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let globals: Vec<Arc<dyn Middleware>> = vec![Recorder::new("g1", &order)];
    let locals: Vec<Arc<dyn Middleware>> = vec![Recorder::new("l1", &order)];

    let sessions = Arc::new(SessionManager::new(SessionConfig {
        driver: Some(Arc::new(MemorySessionDriver::new())),
        ..Default::default()
    }));
    let cancel = CancelSignal::new();
    cancel.cancel();
    let mut exchange = Exchange::bind(
        HttpRequest::new(),
        HttpResponse::new(),
        sessions,
        Arc::new(BodyParserRegistry::new()),
        cancel,
    );

    let callback = run_http_chain(&globals, &locals, &mut exchange).await;
    assert!(!callback.is_cancelled());
    assert!(order.lock().is_empty());
}

#[tokio::test]
async fn cancel_signal_wakes_parked_waiters() {
    let signal = CancelSignal::new();
    let waiter = {
        let signal = signal.clone();
        tokio::spawn(async move { signal.cancelled().await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert!(!signal.is_cancelled());

    signal.cancel();
    waiter.await.unwrap();
    assert!(signal.is_cancelled());

    // An already-raised signal resolves immediately.
    signal.cancelled().await;
}

#[test]
fn resolution_drops_globals_and_foreign_families() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let globals = GlobalMiddlewares::new();
    globals.register(Recorder::new("shared", &order));

    let declared: Vec<Arc<dyn Middleware>> = vec![
        Recorder::new("shared", &order),
        Recorder::only_for("ws-only", &order, SchemeFamily::Ws),
        Recorder::new("local", &order),
    ];

    let resolved = resolve_chain(&declared, SchemeFamily::Http, &globals);
    let names: Vec<&str> = resolved.iter().map(|m| m.name()).collect();
    assert_eq!(names, vec!["local"]);

    let resolved_ws = resolve_chain(&declared, SchemeFamily::Ws, &globals);
    let names: Vec<&str> = resolved_ws.iter().map(|m| m.name()).collect();
    assert_eq!(names, vec!["ws-only", "local"]);
}

#[test]
fn globals_snapshot_is_per_family() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let globals = GlobalMiddlewares::new();
    globals.register(Recorder::only_for("http-only", &order, SchemeFamily::Http));
    globals.register(Recorder::new("everywhere", &order));

    let http: Vec<String> = globals
        .snapshot(SchemeFamily::Http)
        .iter()
        .map(|m| m.name().to_string())
        .collect();
    let ws: Vec<String> = globals
        .snapshot(SchemeFamily::Ws)
        .iter()
        .map(|m| m.name().to_string())
        .collect();
    assert_eq!(http, vec!["http-only", "everywhere"]);
    assert_eq!(ws, vec!["everywhere"]);
}
