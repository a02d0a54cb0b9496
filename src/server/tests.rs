//! End-to-end tests over a real loopback listener

use super::*;
use crate::context::TbarState;
use crate::mixer::{ConsoleMixer, SceneRef, TransitionRef};
use crate::transition::{HostActor, HostActorHandle, TransitionController};
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

struct Harness {
    server: TbarServer,
    host: HostActorHandle,
    mixer: Arc<ConsoleMixer>,
    _applied: mpsc::UnboundedReceiver<ServiceConfig>,
    rt: Runtime,
}

impl Harness {
    fn new(mixer: ConsoleMixer) -> Self {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        let mixer = Arc::new(mixer);
        let state = Arc::new(TbarState::default());
        let controller = TransitionController::new(mixer.clone(), Arc::clone(&state));
        let (host, _task) = {
            let _guard = rt.enter();
            HostActor::spawn(controller, 16)
        };

        let (apply_tx, applied) = mpsc::unbounded_channel();
        let ctx = Arc::new(ServiceContext::new(
            ServiceConfig::default(),
            None,
            state,
            host.clone(),
            apply_tx,
        ));

        let mut server = TbarServer::new(ctx);
        server.start_at(ephemeral()).unwrap();

        Self {
            server,
            host,
            mixer,
            _applied: applied,
            rt,
        }
    }

    fn addr(&self) -> SocketAddr {
        self.server.local_addr().unwrap()
    }

    /// Wait until every queued host task has run
    fn settle(&self) {
        self.rt.block_on(self.host.flush()).unwrap();
    }

    fn get(&self, path: &str) -> (u16, Value) {
        let (status, body) = send(
            self.addr(),
            &format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path),
        );
        (status, serde_json::from_str(&body).unwrap_or(Value::Null))
    }

    fn post(&self, path: &str, body: &str) -> (u16, Value) {
        let (status, body) = send(
            self.addr(),
            &format!(
                "POST {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                path,
                body.len(),
                body
            ),
        );
        (status, serde_json::from_str(&body).unwrap_or(Value::Null))
    }
}

fn ephemeral() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

/// Send a raw request, return status code and body
fn send(addr: SocketAddr, raw: &str) -> (u16, String) {
    let (status, _, body) = send_full(addr, raw);
    (status, body)
}

fn send_full(addr: SocketAddr, raw: &str) -> (u16, String, String) {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(raw.as_bytes()).unwrap();

    let mut out = String::new();
    stream.read_to_string(&mut out).unwrap();

    let status = out[9..12].parse().unwrap();
    let (head, body) = out.split_once("\r\n\r\n").unwrap();
    (status, head.to_string(), body.to_string())
}

#[test]
fn test_manual_transition_start_and_drive() {
    let h = Harness::new(ConsoleMixer::new());

    assert_eq!(h.post("/tbar", r#"{"position":0}"#), (200, json!({"ok": true})));
    std::thread::sleep(Duration::from_millis(260));
    assert_eq!(h.post("/tbar", r#"{"position":0.5}"#), (200, json!({"ok": true})));
    h.settle();

    let snapshot = h.mixer.snapshot();
    assert_eq!(snapshot.manual_target, Some(SceneRef::from("Scene 2")));
    assert_eq!(snapshot.progress, 0.5);

    let (status, body) = h.get("/status");
    assert_eq!(status, 200);
    assert_eq!(body["manual_active"], true);
    assert_eq!(body["last_position"].as_f64(), Some(0.5));
}

#[test]
fn test_release_at_top_commits_and_swaps_scenes() {
    let h = Harness::new(ConsoleMixer::new());

    h.post("/tbar", r#"{"position":0.5}"#);
    h.post("/tbar", r#"{"position":1.0,"release":true}"#);
    h.settle();

    let snapshot = h.mixer.snapshot();
    assert_eq!(snapshot.program, Some(SceneRef::from("Scene 2")));
    assert_eq!(snapshot.preview, Some(SceneRef::from("Scene 1")));
    assert_eq!(snapshot.manual_target, None);
    assert_eq!(snapshot.completed_transitions, 1);

    let (_, status) = h.get("/status");
    assert_eq!(status["manual_active"], false);
    assert_eq!(status["last_position"].as_f64(), Some(0.0));

    let (_, tbar) = h.get("/tbar");
    assert_eq!(tbar, json!({"position": 0.0, "source": "cached"}));
}

#[test]
fn test_missing_position_is_rejected_without_mutation() {
    let h = Harness::new(ConsoleMixer::new());

    h.post("/tbar", r#"{"position":0.25}"#);
    h.settle();
    let before = h.mixer.snapshot();

    let (status, body) = h.post("/tbar", r#"{"pos":0.9,"release":true}"#);
    assert_eq!(status, 400);
    assert_eq!(body, json!({"error": "invalid_json"}));
    h.settle();

    assert_eq!(h.mixer.snapshot(), before);
    let (_, tbar) = h.get("/tbar");
    assert_eq!(tbar["position"].as_f64(), Some(0.25));
}

#[test]
fn test_config_post_rejects_port_zero() {
    let h = Harness::new(ConsoleMixer::new());

    let (status, body) = h.post("/config", r#"{"port":0}"#);
    assert_eq!(status, 200);
    assert_eq!(body, json!({"ok": true, "enabled": true, "port": 4455}));

    assert_eq!(h.get("/config").1, json!({"enabled": true, "port": 4455}));
}

#[test]
fn test_cached_position_is_exact() {
    let h = Harness::new(ConsoleMixer::new().with_studio_mode(false));

    h.post("/tbar", r#"{"position":512}"#);
    let (_, tbar) = h.get("/tbar");
    assert_eq!(tbar["position"].as_f64(), Some(512.0 / 1023.0));
    assert_eq!(tbar["source"], "cached");
}

#[test]
fn test_not_in_studio_mode_still_answers_ok() {
    let h = Harness::new(ConsoleMixer::new().with_studio_mode(false));

    assert_eq!(h.post("/tbar", r#"{"position":0.7}"#).0, 200);
    h.settle();

    assert_eq!(h.mixer.snapshot().manual_target, None);
    assert_eq!(h.get("/status").1["manual_active"], false);
}

#[test]
fn test_fixed_transition_triggers_on_release() {
    let h = Harness::new(
        ConsoleMixer::new().with_transition(Some(TransitionRef::new("Cut", true))),
    );

    h.post("/tbar", r#"{"position":0.6}"#);
    h.settle();
    assert_eq!(h.mixer.snapshot().manual_target, None);

    h.post("/tbar", r#"{"position":1.0,"release":true}"#);
    h.settle();

    let snapshot = h.mixer.snapshot();
    assert_eq!(snapshot.instant_transitions, 1);
    assert_eq!(snapshot.program, Some(SceneRef::from("Scene 2")));
}

#[test]
fn test_preflight_and_routing_errors() {
    let h = Harness::new(ConsoleMixer::new());

    let (status, head, body) = send_full(
        h.addr(),
        "OPTIONS /tbar HTTP/1.1\r\nOrigin: http://example.test\r\n\r\n",
    );
    assert_eq!(status, 204);
    assert!(head.contains("Access-Control-Allow-Origin: *"));
    assert!(head.contains("Connection: close"));
    assert!(body.is_empty());

    assert_eq!(h.get("/missing"), (404, json!({"error": "not_found"})));
    assert_eq!(
        h.post("/status", "{}"),
        (405, json!({"error": "method_not_allowed"}))
    );
    assert_eq!(h.get("/favicon.ico").0, 204);
    let (status, _) = send(h.addr(), "DELETE /favicon.ico HTTP/1.1\r\n\r\n");
    assert_eq!(status, 204);
}

#[test]
fn test_control_page_is_served() {
    let h = Harness::new(ConsoleMixer::new());

    let (status, head, body) = send_full(h.addr(), "GET / HTTP/1.1\r\n\r\n");
    assert_eq!(status, 200);
    assert!(head.contains("Content-Type: text/html"));
    assert!(body.contains("/tbar"));
}

#[test]
fn test_malformed_request_line() {
    let h = Harness::new(ConsoleMixer::new());

    let (status, body) = send(h.addr(), "\r\n\r\n");
    assert_eq!(status, 400);
    assert_eq!(body, "bad request");
}

#[test]
fn test_stop_is_idempotent_and_releases_the_port() {
    let mut h = Harness::new(ConsoleMixer::new());
    let addr = h.addr();
    assert!(h.server.is_running());

    h.server.stop();
    assert!(!h.server.is_running());
    assert!(h.server.local_addr().is_none());
    assert!(TcpStream::connect(addr).is_err());

    h.server.stop();

    h.server.start_at(ephemeral()).unwrap();
    assert!(h.server.is_running());
    assert_eq!(h.get("/config").0, 200);
}

#[test]
fn test_restart_after_accept_loop_exited() {
    let mut h = Harness::new(ConsoleMixer::new());
    let addr = h.addr();

    // End the loop from underneath the server, as a fatal accept error would
    let worker = h.server.worker.as_ref().unwrap();
    worker.stop.store(true, Ordering::Release);
    TcpStream::connect(addr).unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while h.server.is_running() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(!h.server.is_running());
    assert!(h.server.local_addr().is_some());

    h.server.start_at(ephemeral()).unwrap();
    assert!(h.server.is_running());
    assert_ne!(h.server.local_addr(), Some(addr));
    assert_eq!(h.get("/config").0, 200);
}

#[test]
fn test_start_when_running_is_a_noop() {
    let mut h = Harness::new(ConsoleMixer::new());
    let addr = h.addr();

    h.server.start_at(ephemeral()).unwrap();
    assert_eq!(h.server.local_addr(), Some(addr));
}

#[test]
fn test_bind_conflict_is_reported() {
    let h = Harness::new(ConsoleMixer::new());
    let taken = h.addr();

    let mut other = TbarServer::new(Arc::clone(h.server.context()));
    let err = other.start_at(taken).unwrap_err();
    assert!(matches!(err, ServerError::Bind { .. }));
    assert!(!other.is_running());
}

#[test]
fn test_failed_apply_leaves_server_usable() {
    let h = Harness::new(ConsoleMixer::new());
    let taken = ServiceConfig {
        port: h.addr().port(),
        ..ServiceConfig::default()
    };

    let mut other = TbarServer::new(Arc::clone(h.server.context()));
    assert!(other.apply(&taken).is_err());
    assert!(!other.is_running());

    let port = {
        let free = TcpListener::bind(ephemeral()).unwrap();
        free.local_addr().unwrap().port()
    };
    let free = ServiceConfig {
        port,
        ..ServiceConfig::default()
    };
    other.apply(&free).unwrap();
    assert!(other.is_running());
    assert_eq!(other.port(), Some(port));
}

#[test]
fn test_apply_follows_config() {
    let mut h = Harness::new(ConsoleMixer::new());

    let disabled = ServiceConfig {
        enabled: false,
        ..ServiceConfig::default()
    };
    h.server.apply(&disabled).unwrap();
    assert!(!h.server.is_running());

    let port = {
        let free = TcpListener::bind(ephemeral()).unwrap();
        free.local_addr().unwrap().port()
    };
    let enabled = ServiceConfig {
        port,
        ..ServiceConfig::default()
    };
    h.server.apply(&enabled).unwrap();
    assert!(h.server.is_running());
    assert_eq!(h.server.port(), Some(port));
    assert_eq!(h.get("/config").0, 200);
}
