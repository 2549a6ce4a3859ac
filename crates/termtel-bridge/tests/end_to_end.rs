#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::time::Duration;

use serde_json::json;

use common::{settle, Harness};
use termtel_bridge::config::BridgeConfig;
use termtel_bridge::render::RenderEvent;
use termtel_bridge::sessions::{CellMetrics, ConnectRequest, TermSize};
use termtel_bridge::{ConnectionState, DeviceView, PollState};

fn router1_renders(h: &Harness) -> usize {
    h.render.count(|e| {
        matches!(e, RenderEvent::DeviceInfo(DeviceView::Info(info))
            if info.hostname.as_deref() == Some("router1"))
    })
}

fn connected_renders(h: &Harness) -> usize {
    h.render
        .count(|e| matches!(e, RenderEvent::ConnectionState(_, ConnectionState::Connected)))
}

fn lab_device() -> ConnectRequest {
    ConnectRequest::new("10.0.0.1", "admin", "x").with_driver("ios")
}

#[tokio::test(start_paused = true)]
async fn connect_update_disconnect() {
    let h = Harness::new();

    h.ctx.connect("telemetry", lab_device()).await.unwrap();
    let connect = h
        .transport
        .sent_envelopes()
        .into_iter()
        .find(|e| e.action() == "connect")
        .unwrap();
    assert_eq!(connect.session_id(), "telemetry");
    assert_eq!(
        serde_json::Value::Object(connect.payload().clone()),
        json!({"host": "10.0.0.1", "username": "admin", "password": "x", "driver_type": "ios"})
    );
    assert_eq!(h.telemetry.connection_state(), ConnectionState::Discovering);
    assert_eq!(h.render.events()[0], RenderEvent::DeviceInfo(DeviceView::Discovering));

    h.push("telemetry", "connected", json!({}));
    settle().await;
    assert_eq!(h.telemetry.connection_state(), ConnectionState::Connected);
    assert_eq!(h.ctx.polling().state("telemetry"), PollState::Polling);

    h.push(
        "telemetry",
        "telemetry_update",
        json!({"device_info": {"hostname": "router1", "model": "ISR4331"}}),
    );
    settle().await;
    assert_eq!(router1_renders(&h), 1);
    assert_eq!(
        h.telemetry.widgets().device_info.current().and_then(|d| d.hostname.clone()),
        Some("router1".to_string())
    );

    h.push("telemetry", "disconnected", json!({}));
    settle().await;
    assert_eq!(h.telemetry.connection_state(), ConnectionState::Disconnected);
    assert_eq!(h.render.last_connection_state(), Some(ConnectionState::Disconnected));
    assert_eq!(h.ctx.polling().state("telemetry"), PollState::Idle);
    assert_eq!(h.ctx.polling().active_timers(), 0);
    assert_eq!(h.ctx.correlator().pending_len(), 0);

    let refreshes = h.transport.count_sent("get_device_info");
    tokio::time::sleep(Duration::from_secs(180)).await;
    assert_eq!(router1_renders(&h), 1);
    assert_eq!(h.transport.count_sent("get_device_info"), refreshes);
    assert_eq!(h.telemetry.connection_state(), ConnectionState::Disconnected);
    assert_eq!(connected_renders(&h), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_connected_event_falls_back_once() {
    let h = Harness::new();
    h.ctx.connect("telemetry", lab_device()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(h.telemetry.connection_state(), ConnectionState::Discovering);
    assert_eq!(h.ctx.polling().state("telemetry"), PollState::Idle);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.telemetry.connection_state(), ConnectionState::Connected);
    assert_eq!(h.ctx.polling().state("telemetry"), PollState::Polling);
    assert_eq!(connected_renders(&h), 1);
    // initial fetch went out
    assert_eq!(h.transport.count_sent("get_device_info"), 1);

    // a late connected is redundant
    h.push("telemetry", "connected", json!({}));
    settle().await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connected_renders(&h), 1);
    assert_eq!(h.ctx.polling().active_timers(), 1);
}

#[tokio::test(start_paused = true)]
async fn valid_device_info_ends_discovery() {
    let h = Harness::new();
    h.ctx.connect("telemetry", lab_device()).await.unwrap();

    h.push("telemetry", "telemetry_update", json!({"device_info": {"hostname": "router1"}}));
    settle().await;
    assert_eq!(h.telemetry.connection_state(), ConnectionState::Connected);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(connected_renders(&h), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_backend_stalls_and_is_nudged_once() {
    let h = Harness::new();
    h.ctx.connect("telemetry", lab_device()).await.unwrap();
    h.push("telemetry", "connected", json!({}));
    settle().await;
    // initial fetch
    assert_eq!(h.transport.count_sent("get_device_info"), 1);

    h.transport.clear_sent();

    // watchdog ticks at 30s (fine) and 60s (stalled)
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.ctx.polling().state("telemetry"), PollState::Stalled);
    assert_eq!(h.transport.count_sent("get_device_info"), 1);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.transport.count_sent("get_device_info"), 1);
    assert_eq!(h.telemetry.connection_state(), ConnectionState::Connected);

    let stalled_at = h.ctx.polling().last_update_at("telemetry").unwrap();
    h.push("telemetry", "telemetry_update", json!({"interfaces": []}));
    settle().await;
    assert_eq!(h.ctx.polling().state("telemetry"), PollState::Polling);
    assert!(h.ctx.polling().last_update_at("telemetry").unwrap() > stalled_at);
    assert_eq!(
        h.ctx.metrics().watchdog_stalls.get(&[("session", "telemetry")]),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn only_changed_facets_render() {
    let h = Harness::new();
    let gi0 = json!([{"name": "Gi0/0", "status": "up"}]);
    let gi0_down = json!([{"name": "Gi0/0", "status": "down"}]);

    h.push("telemetry", "telemetry_update", json!({"interfaces": gi0.clone()}));
    h.push("telemetry", "telemetry_update", json!({"interfaces": gi0}));
    settle().await;
    let interface_renders = |h: &Harness| h.render.count(|e| matches!(e, RenderEvent::Interfaces(_)));
    assert_eq!(interface_renders(&h), 1);

    h.push("telemetry", "telemetry_update", json!({"interfaces": gi0_down}));
    settle().await;
    assert_eq!(interface_renders(&h), 2);

    // device info renders on every receipt
    h.push("telemetry", "telemetry_update", json!({"device_info": {"hostname": "router1"}}));
    h.push("telemetry", "telemetry_update", json!({"device_info": {"hostname": "router1"}}));
    settle().await;
    assert_eq!(router1_renders(&h), 2);
}

#[tokio::test(start_paused = true)]
async fn empty_routing_table_keeps_previous() {
    let h = Harness::new();
    let routes = json!([{"network": "10.0.0.0", "mask": "255.0.0.0", "next_hop": "10.0.0.1"}]);

    h.push("telemetry", "telemetry_update", json!({"routing_table": routes}));
    h.push("telemetry", "telemetry_update", json!({"routing_table": []}));
    settle().await;

    let widgets = h.telemetry.widgets();
    assert_eq!(widgets.routing_table.current().map(Vec::len), Some(1));
    assert_eq!(
        h.render.count(|e| matches!(e, RenderEvent::RoutingTable(_))),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn bad_facet_does_not_poison_the_rest() {
    let h = Harness::new();
    h.push(
        "telemetry",
        "telemetry_update",
        json!({
            "interfaces": "not a list",
            "neighbors": [{"local_port": "Gi0/1", "neighbor": "core1", "remote_port": "Te1/1"}]
        }),
    );
    settle().await;

    assert_eq!(h.render.count(|e| matches!(e, RenderEvent::Interfaces(_))), 0);
    assert_eq!(h.render.count(|e| matches!(e, RenderEvent::Neighbors(_))), 1);
}

#[tokio::test(start_paused = true)]
async fn error_while_discovering_aborts_connect() {
    let h = Harness::new();
    h.ctx.connect("telemetry", lab_device()).await.unwrap();

    h.push("telemetry", "error", json!({"message": "authentication failed"}));
    settle().await;
    assert_eq!(h.telemetry.connection_state(), ConnectionState::Disconnected);
    assert!(h.render.events().contains(&RenderEvent::Error(
        "telemetry".into(),
        "authentication failed".into()
    )));

    // fallback was cancelled with the discovery
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.telemetry.connection_state(), ConnectionState::Disconnected);
    assert_eq!(connected_renders(&h), 0);
}

#[tokio::test(start_paused = true)]
async fn error_while_connected_keeps_polling() {
    let h = Harness::new();
    h.ctx.connect("telemetry", lab_device()).await.unwrap();
    h.push("telemetry", "connected", json!({}));
    h.push("telemetry", "error", json!({"message": "show environment failed"}));
    settle().await;

    assert_eq!(h.telemetry.connection_state(), ConnectionState::Connected);
    assert_eq!(h.ctx.polling().state("telemetry"), PollState::Polling);
}

#[tokio::test(start_paused = true)]
async fn repeated_invalid_device_info_is_fatal() {
    let mut cfg = BridgeConfig::default();
    cfg.telemetry.max_invalid_device_info = 3;
    let h = Harness::with_config(cfg);
    h.ctx.connect("telemetry", lab_device()).await.unwrap();
    h.push("telemetry", "connected", json!({}));
    settle().await;

    for _ in 0..2 {
        h.push("telemetry", "telemetry_update", json!({"device_info": {"hostname": "Unknown"}}));
    }
    settle().await;
    assert_eq!(h.telemetry.connection_state(), ConnectionState::Connected);
    assert_eq!(
        h.render.count(|e| matches!(e, RenderEvent::DeviceInfo(DeviceView::Unknown))),
        2
    );

    // a valid one resets the streak
    h.push("telemetry", "telemetry_update", json!({"device_info": {"hostname": "router1"}}));
    for _ in 0..2 {
        h.push("telemetry", "telemetry_update", json!({"device_info": {"hostname": ""}}));
    }
    settle().await;
    assert_eq!(h.telemetry.connection_state(), ConnectionState::Connected);

    h.push("telemetry", "telemetry_update", json!({"device_info": {"hostname": "Unknown"}}));
    settle().await;
    assert_eq!(h.telemetry.connection_state(), ConnectionState::Disconnected);
    assert_eq!(h.ctx.polling().state("telemetry"), PollState::Idle);
    assert_eq!(
        h.render.count(|e| matches!(e, RenderEvent::Error(s, _) if s == "telemetry")),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn connect_while_connected_is_ignored_and_disconnect_tears_down() {
    let h = Harness::new();
    h.ctx.connect("telemetry", ConnectRequest::new("10.0.0.1", "admin", "x")).await.unwrap();
    h.push("telemetry", "connected", json!({}));
    settle().await;

    h.ctx.connect("telemetry", lab_device()).await.unwrap();
    assert_eq!(h.transport.count_sent("connect"), 1);
    // default driver filled in
    let connect = h.transport.sent_envelopes().into_iter().find(|e| e.action() == "connect").unwrap();
    assert_eq!(connect.str_field("driver_type"), Some("ios"));

    h.ctx.disconnect("telemetry").await.unwrap();
    assert_eq!(h.transport.count_sent("disconnect"), 1);
    assert_eq!(h.telemetry.connection_state(), ConnectionState::Disconnected);
    assert_eq!(h.ctx.polling().state("telemetry"), PollState::Idle);
    assert_eq!(h.ctx.correlator().pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn terminal_round_trip() {
    let h = Harness::new();
    h.ctx.connect("terminal", ConnectRequest::new("10.0.0.1", "admin", "x").with_driver("ios")).await.unwrap();
    assert_eq!(h.render.terminal_text(), "Connecting...\r\n");
    let connect = h.transport.sent_envelopes().into_iter().find(|e| e.action() == "connect").unwrap();
    assert_eq!(connect.session_id(), "terminal");
    assert!(connect.field("driver_type").is_none());

    let size = TermSize { cols: 120, rows: 40 };
    assert!(h.terminal.resize(&h.ctx, size).unwrap());
    assert!(!h.terminal.resize(&h.ctx, size).unwrap());
    assert_eq!(h.transport.count_sent("resize"), 1);

    // connected re-sends the known geometry
    h.push("terminal", "connected", json!({}));
    settle().await;
    assert!(h.terminal.is_connected());
    assert_eq!(h.transport.count_sent("resize"), 2);

    h.terminal.send_input(&h.ctx, "show version\r").unwrap();
    let input = h.transport.sent_envelopes().into_iter().find(|e| e.action() == "data").unwrap();
    assert_eq!(input.str_field("text"), Some("show version\r"));

    h.push("terminal", "data", json!({"text": "Cisco IOS XE\r\n"}));
    h.push("terminal", "error", json!({"message": "session timeout"}));
    h.push("terminal", "disconnected", json!({}));
    settle().await;
    assert_eq!(
        h.render.terminal_text(),
        "Connecting...\r\nCisco IOS XE\r\n\r\nError: session timeout\r\n\r\nConnection closed.\r\n"
    );
    assert!(!h.terminal.is_connected());

    // pixel resize only sends on change
    let cell = CellMetrics { width: 10.0, height: 20.0 };
    assert!(h.terminal.resize_pixels(&h.ctx, 805.0, 419.0, cell).unwrap());
    assert_eq!(h.terminal.geometry(), Some(TermSize { cols: 80, rows: 20 }));
    assert!(!h.terminal.resize_pixels(&h.ctx, 809.0, 410.0, cell).unwrap());
}

#[tokio::test(start_paused = true)]
async fn theme_set_and_push() {
    let h = Harness::new();
    h.ui.request_theme(&h.ctx).unwrap();
    assert_eq!(h.transport.count_sent("get_theme"), 1);

    h.render.clear();
    h.ui.set_theme(&h.ctx, "amber").unwrap();
    let sent = h.transport.sent_envelopes().into_iter().find(|e| e.action() == "set_theme").unwrap();
    assert_eq!(sent.str_field("theme"), Some("amber"));
    assert_eq!(h.ui.current_theme().as_deref(), Some("amber"));

    // backend echo of the same theme is not re-rendered
    h.push("ui_state", "theme_changed", json!({"theme": "amber"}));
    h.push("ui_state", "theme_changed", json!({"theme": "nord"}));
    settle().await;
    let themes: Vec<String> = h
        .render
        .events()
        .into_iter()
        .filter_map(|e| match e {
            RenderEvent::ThemeChanged(t) => Some(t),
            _ => None,
        })
        .collect();
    assert_eq!(themes, vec!["amber", "nord"]);

    h.ui.set_theme(&h.ctx, "").unwrap();
    assert_eq!(h.transport.count_sent("set_theme"), 1);
}
