//! End-to-end poll loop tests.
//!
//! These tests drive the bridge's tick loop against an in-process
//! WebSocket service speaking the real wire protocol (`/state` queries and
//! mutations, `/action` instructions) and a scripted bus double standing in
//! for the controller. The service records every mutation and instruction
//! so tests can assert exactly which channel calls a reading produced.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;

use knobd::{Bridge, Config, TickOutcome, VolumeBus};

// ── Test service ───────────────────────────────────────────────────────────

/// Everything the service observed, for assertions.
#[derive(Default)]
struct ServiceLog {
    mutations: Vec<(String, Value)>,
    instructions: Vec<String>,
}

/// Handle to an in-process UI service on an ephemeral port.
struct TestService {
    url: String,
    log: Arc<Mutex<ServiceLog>>,
    /// When set, the next state-channel request is answered by dropping
    /// the connection instead — simulates a transport failure mid-call.
    fail_next_state: Arc<AtomicBool>,
    /// Same fault injection for the action channel.
    fail_next_action: Arc<AtomicBool>,
}

impl TestService {
    fn mutations(&self) -> Vec<(String, Value)> {
        self.log.lock().unwrap().mutations.clone()
    }

    fn instructions(&self) -> Vec<String> {
        self.log.lock().unwrap().instructions.clone()
    }
}

/// Spawn the service with the given initial state store.
async fn spawn_service(initial: &[(&str, Value)]) -> TestService {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test service");
    let addr = listener.local_addr().expect("local addr");

    let state: Arc<Mutex<HashMap<String, Value>>> = Arc::new(Mutex::new(
        initial
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect(),
    ));
    let log = Arc::new(Mutex::new(ServiceLog::default()));
    let fail_next_state = Arc::new(AtomicBool::new(false));
    let fail_next_action = Arc::new(AtomicBool::new(false));

    {
        let state = Arc::clone(&state);
        let log = Arc::clone(&log);
        let fail_next_state = Arc::clone(&fail_next_state);
        let fail_next_action = Arc::clone(&fail_next_action);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(serve_connection(
                    stream,
                    Arc::clone(&state),
                    Arc::clone(&log),
                    Arc::clone(&fail_next_state),
                    Arc::clone(&fail_next_action),
                ));
            }
        });
    }

    TestService {
        url: format!("ws://{addr}"),
        log,
        fail_next_state,
        fail_next_action,
    }
}

/// Serve one WebSocket connection, routed by request path.
async fn serve_connection(
    stream: TcpStream,
    state: Arc<Mutex<HashMap<String, Value>>>,
    log: Arc<Mutex<ServiceLog>>,
    fail_next_state: Arc<AtomicBool>,
    fail_next_action: Arc<AtomicBool>,
) {
    let mut path = String::new();
    let callback = |req: &Request, resp: Response| {
        path = req.uri().path().to_string();
        Ok(resp)
    };
    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };

    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(request) = serde_json::from_str::<Value>(&text) else {
            continue;
        };

        let reply = match path.as_str() {
            "/state" => {
                if fail_next_state.swap(false, Ordering::SeqCst) {
                    // Drop the socket without answering.
                    return;
                }
                match request {
                    // Query: array of keys; omit unset keys from the reply.
                    Value::Array(keys) => {
                        let state = state.lock().unwrap();
                        let mut reply = serde_json::Map::new();
                        for key in keys.iter().filter_map(Value::as_str) {
                            if let Some(value) = state.get(key) {
                                reply.insert(key.to_string(), value.clone());
                            }
                        }
                        Value::Object(reply)
                    }
                    // Mutation: object; apply, record, echo.
                    Value::Object(entries) => {
                        let mut state = state.lock().unwrap();
                        let mut log = log.lock().unwrap();
                        let mut reply = serde_json::Map::new();
                        for (key, value) in entries {
                            state.insert(key.clone(), value.clone());
                            log.mutations.push((key.clone(), value.clone()));
                            reply.insert(key, value);
                        }
                        Value::Object(reply)
                    }
                    _ => json!({}),
                }
            }
            "/action" => {
                if fail_next_action.swap(false, Ordering::SeqCst) {
                    return;
                }
                if let Some(instruction) = request
                    .as_array()
                    .and_then(|a| a.first())
                    .and_then(Value::as_str)
                {
                    log.lock().unwrap().instructions.push(instruction.to_string());
                }
                json!({ "ok": true })
            }
            _ => json!({}),
        };

        if ws.send(Message::Text(reply.to_string())).await.is_err() {
            return;
        }
    }
}

// ── Scripted bus ───────────────────────────────────────────────────────────

#[derive(Default)]
struct BusScript {
    reads: VecDeque<anyhow::Result<u8>>,
    written: Vec<u8>,
}

/// Bus double: plays back a scripted sequence of readings and records
/// every byte written to the device. Once the script runs out it reports
/// the idle sentinel forever.
#[derive(Clone, Default)]
struct ScriptedBus {
    inner: Arc<Mutex<BusScript>>,
}

impl ScriptedBus {
    fn with_reads(reads: impl IntoIterator<Item = u8>) -> Self {
        let bus = Self::default();
        bus.inner.lock().unwrap().reads = reads.into_iter().map(Ok).collect();
        bus
    }

    fn fail_next_read(&self, message: &str) {
        let owned = message.to_string();
        self.inner
            .lock()
            .unwrap()
            .reads
            .push_front(Err(anyhow!(owned)));
    }

    fn written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().written.clone()
    }
}

impl VolumeBus for ScriptedBus {
    fn read_byte(&mut self) -> anyhow::Result<u8> {
        self.inner
            .lock()
            .unwrap()
            .reads
            .pop_front()
            .unwrap_or(Ok(255))
    }

    fn write_byte(&mut self, value: u8) -> anyhow::Result<()> {
        self.inner.lock().unwrap().written.push(value);
        Ok(())
    }
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn test_config(url: &str) -> Config {
    let mut config = Config::default();
    config.server_url = url.to_string();
    config.poll_interval_ms = 1;
    config.bootstrap_retry_ms = 1;
    config
}

fn make_bridge(service: &TestService, bus: &ScriptedBus) -> Bridge {
    Bridge::new(test_config(&service.url), Box::new(bus.clone()))
}

async fn tick_n(bridge: &mut Bridge, n: usize) {
    for _ in 0..n {
        bridge.tick().await;
    }
}

// ── Bootstrap ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bootstrap_pulls_state_and_pushes_volume() {
    let service = spawn_service(&[("volume", json!(30)), ("mode", json!("Light"))]).await;
    let bus = ScriptedBus::default();
    let mut bridge = make_bridge(&service, &bus);

    assert_eq!(bridge.tick().await, TickOutcome::Polled);
    assert!(bridge.session.initialized);
    assert!(bridge.session.bright);
    assert_eq!(bus.written(), vec![30]);
    // Bootstrap queries only — nothing recorded as a mutation.
    assert!(service.mutations().is_empty());
}

#[tokio::test]
async fn test_bootstrap_is_idempotent() {
    let service = spawn_service(&[("volume", json!(30)), ("mode", json!("Dark"))]).await;
    let bus = ScriptedBus::default();
    let mut bridge = make_bridge(&service, &bus);

    bridge.bootstrap().await.expect("first bootstrap");
    let bright_first = bridge.session.bright;
    bridge.bootstrap().await.expect("second bootstrap");

    assert_eq!(bridge.session.bright, bright_first);
    assert!(!bridge.session.bright);
    assert_eq!(bus.written(), vec![30, 30]);
}

#[tokio::test]
async fn test_bootstrap_defaults_for_unset_keys() {
    // A service with nothing set answers queries with an empty object; the
    // bridge degrades to volume 0 / dark mode.
    let service = spawn_service(&[]).await;
    let bus = ScriptedBus::default();
    let mut bridge = make_bridge(&service, &bus);

    assert_eq!(bridge.tick().await, TickOutcome::Polled);
    assert!(bridge.session.initialized);
    assert!(!bridge.session.bright);
    assert_eq!(bus.written(), vec![0]);
}

#[tokio::test]
async fn test_bootstrap_failure_backs_off() {
    // Nothing is listening on port 1.
    let bus = ScriptedBus::default();
    let mut bridge = Bridge::new(test_config("ws://127.0.0.1:1"), Box::new(bus.clone()));

    assert_eq!(bridge.tick().await, TickOutcome::AwaitingBootstrap);
    assert!(!bridge.session.initialized);
    assert!(bus.written().is_empty());
}

#[tokio::test]
async fn test_bootstrap_recovers_after_transport_failure() {
    let service = spawn_service(&[("volume", json!(10)), ("mode", json!("Dark"))]).await;
    let bus = ScriptedBus::default();
    let mut bridge = make_bridge(&service, &bus);

    // First attempt dies mid-query; the held connection must be cleared.
    service.fail_next_state.store(true, Ordering::SeqCst);
    assert_eq!(bridge.tick().await, TickOutcome::AwaitingBootstrap);
    assert!(!bridge.session.initialized);

    // Next tick dials fresh and succeeds.
    assert_eq!(bridge.tick().await, TickOutcome::Polled);
    assert!(bridge.session.initialized);
    assert_eq!(bus.written(), vec![10]);
}

// ── Reading classification ─────────────────────────────────────────────────

#[tokio::test]
async fn test_volume_reading_mutates_service_once() {
    let service = spawn_service(&[("volume", json!(30)), ("mode", json!("Dark"))]).await;
    let bus = ScriptedBus::with_reads([42]);
    let mut bridge = make_bridge(&service, &bus);

    tick_n(&mut bridge, 2).await; // bootstrap, then the 42 reading
    assert_eq!(service.mutations(), vec![("volume".to_string(), json!(42))]);
}

#[tokio::test]
async fn test_volume_boundaries_pass_unchanged() {
    let service = spawn_service(&[("volume", json!(30)), ("mode", json!("Dark"))]).await;
    let bus = ScriptedBus::with_reads([0, 100]);
    let mut bridge = make_bridge(&service, &bus);

    tick_n(&mut bridge, 3).await;
    assert_eq!(
        service.mutations(),
        vec![
            ("volume".to_string(), json!(0)),
            ("volume".to_string(), json!(100)),
        ]
    );
}

#[tokio::test]
async fn test_sentinel_produces_no_channel_calls() {
    let service = spawn_service(&[("volume", json!(30)), ("mode", json!("Dark"))]).await;
    let bus = ScriptedBus::with_reads([255, 255, 255]);
    let mut bridge = make_bridge(&service, &bus);

    tick_n(&mut bridge, 4).await;
    assert!(service.mutations().is_empty());
    assert!(service.instructions().is_empty());
}

#[tokio::test]
async fn test_unknown_button_is_reported_not_fatal() {
    let service = spawn_service(&[("volume", json!(30)), ("mode", json!("Dark"))]).await;
    // 254 → code 154, far outside the map.
    let bus = ScriptedBus::with_reads([254, 42]);
    let mut bridge = make_bridge(&service, &bus);

    tick_n(&mut bridge, 3).await;
    // The unknown code produced no channel call and did not kill the loop:
    // the following volume reading still went through.
    assert_eq!(service.mutations(), vec![("volume".to_string(), json!(42))]);
    assert!(service.instructions().is_empty());
    assert!(bridge.session.initialized);
}

// ── Button actions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_toggle_mode_sends_cycle_page() {
    let service = spawn_service(&[("volume", json!(30)), ("mode", json!("Dark"))]).await;
    let bus = ScriptedBus::with_reads([101]);
    let mut bridge = make_bridge(&service, &bus);

    tick_n(&mut bridge, 2).await;
    assert_eq!(service.instructions(), vec!["cycle_page".to_string()]);
    assert!(service.mutations().is_empty());
}

#[tokio::test]
async fn test_placeholder_actions_produce_no_channel_traffic() {
    let service = spawn_service(&[("volume", json!(30)), ("mode", json!("Dark"))]).await;
    // previous_track, toggle_play, next_track
    let bus = ScriptedBus::with_reads([102, 103, 104]);
    let mut bridge = make_bridge(&service, &bus);

    tick_n(&mut bridge, 4).await;
    assert!(service.mutations().is_empty());
    assert!(service.instructions().is_empty());
    assert!(bridge.session.initialized);
}

#[tokio::test]
async fn test_toggle_brightness_twice_round_trips() {
    let service = spawn_service(&[("volume", json!(30)), ("mode", json!("Dark"))]).await;
    let bus = ScriptedBus::with_reads([105, 105]);
    let mut bridge = make_bridge(&service, &bus);

    tick_n(&mut bridge, 3).await;
    assert_eq!(
        service.mutations(),
        vec![
            ("mode".to_string(), json!("Light")),
            ("mode".to_string(), json!("Dark")),
        ]
    );
    // Back where we started.
    assert!(!bridge.session.bright);
}

#[tokio::test]
async fn test_scenario_sequence() {
    // 255, 255, 42, 103 → none, none, volume mutation, toggle_play
    // diagnostic only.
    let service = spawn_service(&[("volume", json!(30)), ("mode", json!("Dark"))]).await;
    let bus = ScriptedBus::with_reads([255, 255, 42, 103]);
    let mut bridge = make_bridge(&service, &bus);

    tick_n(&mut bridge, 5).await;
    assert_eq!(service.mutations(), vec![("volume".to_string(), json!(42))]);
    assert!(service.instructions().is_empty());
}

// ── Failure handling ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_state_channel_loss_forces_rebootstrap() {
    let service = spawn_service(&[("volume", json!(30)), ("mode", json!("Dark"))]).await;
    let bus = ScriptedBus::with_reads([42]);
    let mut bridge = make_bridge(&service, &bus);

    // Bootstrap over a healthy channel.
    assert_eq!(bridge.tick().await, TickOutcome::Polled);
    assert!(bridge.session.initialized);

    // The volume mutation dies mid-call; the bridge must fall back to
    // Uninitialized.
    service.fail_next_state.store(true, Ordering::SeqCst);
    bridge.tick().await;
    assert!(!bridge.session.initialized);
    assert!(service.mutations().is_empty());

    // Rebootstrap on the next tick, then a fresh reading goes through.
    assert_eq!(bridge.tick().await, TickOutcome::Polled);
    assert!(bridge.session.initialized);
    assert_eq!(bus.written(), vec![30, 30]);

    bus.inner.lock().unwrap().reads.push_back(Ok(50));
    bridge.tick().await;
    assert_eq!(service.mutations(), vec![("volume".to_string(), json!(50))]);
}

#[tokio::test]
async fn test_bus_read_error_is_transient() {
    let service = spawn_service(&[("volume", json!(30)), ("mode", json!("Dark"))]).await;
    let bus = ScriptedBus::with_reads([42]);
    let mut bridge = make_bridge(&service, &bus);

    assert_eq!(bridge.tick().await, TickOutcome::Polled); // bootstrap
    bus.fail_next_read("EREMOTEIO");

    // The failed read is a no-op tick: no channel call, no rebootstrap.
    bridge.tick().await;
    assert!(bridge.session.initialized);
    assert!(service.mutations().is_empty());

    // The following tick polls normally.
    bridge.tick().await;
    assert_eq!(service.mutations(), vec![("volume".to_string(), json!(42))]);
}

#[tokio::test]
async fn test_action_channel_failure_does_not_rebootstrap() {
    let service = spawn_service(&[("volume", json!(30)), ("mode", json!("Dark"))]).await;
    let bus = ScriptedBus::with_reads([101, 42]);
    let mut bridge = make_bridge(&service, &bus);

    assert_eq!(bridge.tick().await, TickOutcome::Polled); // bootstrap

    // The cycle_page instruction dies mid-call. Action-channel loss is
    // absorbed: no rebootstrap, and the state channel is untouched.
    service.fail_next_action.store(true, Ordering::SeqCst);
    bridge.tick().await;
    assert!(bridge.session.initialized);
    assert!(service.instructions().is_empty());

    // The state channel still works on the very next tick.
    bridge.tick().await;
    assert_eq!(service.mutations(), vec![("volume".to_string(), json!(42))]);
    assert!(bridge.session.initialized);
}
