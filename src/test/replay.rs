use crate::config::PlaylistConfig;
use crate::flow::FlowState;
use crate::replay::{Replay, ReplayOptions, Side};

fn config(raw: &str) -> PlaylistConfig {
    PlaylistConfig::from_json_str(raw).expect("playlist builds")
}

fn traced() -> ReplayOptions {
    ReplayOptions {
        trace_packets: true,
        ..ReplayOptions::default()
    }
}

const REQUEST_RESPONSE: &str = r#"{
  "schema_version": 1,
  "kind": "stream",
  "flows": [ { "packets": [
    { "data": "6869", "client_tx": true },
    { "data": "6f6b", "client_tx": false }
  ] } ]
}"#;

#[test]
fn stream_request_response_completes_on_both_sides() {
    let replay = Replay::new(config(REQUEST_RESPONSE), traced());
    let report = replay.run_iteration(0).expect("replay runs");

    assert_eq!(report.flows_ok(), 2);
    assert_eq!(report.flows_failed(), 0);
    let server = report.last_result(Side::Server, 0).expect("server result");
    let client = report.last_result(Side::Client, 0).expect("client result");
    assert_eq!(server.state, FlowState::Done);
    assert_eq!(client.state, FlowState::Done);
    // 默认链路时延 1ms：请求 t=1 到达，应答 t=2 到达
    assert_eq!(server.at_ms, 1);
    assert_eq!(client.at_ms, 2);

    assert_eq!(report.sent_pkts, 2);
    assert_eq!(report.sent_bytes, 4);
    let sent: Vec<(Side, Vec<u8>)> = report
        .packets
        .iter()
        .map(|p| (p.side, p.bytes.clone()))
        .collect();
    assert_eq!(
        sent,
        vec![
            (Side::Client, b"hi".to_vec()),
            (Side::Server, b"ok".to_vec())
        ]
    );
}

#[test]
fn packets_are_not_recorded_without_tracing() {
    let replay = Replay::new(config(REQUEST_RESPONSE), ReplayOptions::default());
    let report = replay.run_iteration(0).expect("replay runs");
    assert!(report.packets.is_empty());
    assert_eq!(report.sent_pkts, 2);
}

#[test]
fn each_iteration_renders_its_own_modifier_value() {
    let raw = r#"{
      "schema_version": 1,
      "kind": "stream",
      "iterations": 3,
      "flows": [ {
        "packets": [ { "data": "aabb", "client_tx": true } ],
        "variables": [ { "default": "00", "targets": [ { "packet": 0, "offset": 1 } ] } ],
        "modifiers": [ { "var": 0, "kind": "range", "start": "05", "step": "01", "mask": "ff" } ]
      } ]
    }"#;
    let reports = Replay::new(config(raw), traced()).run().expect("replay runs");
    assert_eq!(reports.len(), 3);

    for (k, report) in reports.iter().enumerate() {
        assert_eq!(report.iteration, k as u64);
        assert_eq!(report.flows_ok(), 2, "iteration {k}");
        let client: Vec<&[u8]> = report
            .packets
            .iter()
            .filter(|p| p.side == Side::Client)
            .map(|p| p.bytes.as_slice())
            .collect();
        assert_eq!(client.len(), 1);
        assert_eq!(client[0], [0xaa, 0x05 + k as u8, 0xbb].as_slice());
    }
}

#[test]
fn attack_flows_run_back_to_back_with_default_responses() {
    let raw = r#"{
      "schema_version": 1,
      "kind": "attack",
      "defaults": { "wait_timeout_ms": 30 },
      "flows": [
        { "packets": [ { "data": "aa", "client_tx": true } ] },
        { "packets": [ { "data": "bb", "client_tx": true } ] }
      ]
    }"#;
    let report = Replay::new(config(raw), traced())
        .run_iteration(0)
        .expect("replay runs");

    assert_eq!(report.flows_ok(), 4);
    let first = report.last_result(Side::Client, 0).expect("flow 0");
    let second = report.last_result(Side::Client, 1).expect("flow 1");
    // 客户端首包等 wait/3，之后再等一个 wait 确认应答已到
    assert_eq!(first.at_ms, 40);
    assert_eq!(second.at_ms, 80);

    let responses: Vec<_> = report
        .packets
        .iter()
        .filter(|p| p.side == Side::Server)
        .collect();
    assert_eq!(responses.len(), 2);
    assert!(responses.iter().all(|p| p.pkt_idx.is_none()));
    assert!(responses.iter().all(|p| p.bytes == [0x0d, 0x0a]));
}

#[test]
fn attack_loop_repeats_its_span_before_moving_on() {
    let raw = r#"{
      "schema_version": 1,
      "kind": "attack",
      "defaults": { "wait_timeout_ms": 30 },
      "flows": [
        { "packets": [ { "data": "00", "client_tx": true } ] },
        { "packets": [ { "data": "01", "client_tx": true } ] },
        { "packets": [ { "data": "02", "client_tx": true } ] }
      ],
      "loops": [ { "begin": 0, "end": 1, "count": 2 } ]
    }"#;
    let report = Replay::new(config(raw), ReplayOptions::default())
        .run_iteration(0)
        .expect("replay runs");

    let client_order: Vec<usize> = report
        .flows
        .iter()
        .filter(|r| r.side == Side::Client)
        .map(|r| r.flow_idx)
        .collect();
    assert_eq!(client_order, vec![0, 1, 0, 1, 2]);
    assert_eq!(report.flows_failed(), 0);
    assert_eq!(report.loops.len(), 1);
    assert_eq!(report.loops[0].begin, 0);
    assert!(report.loops[0].successful);
    assert_eq!(report.loops[0].at_ms, 160);
}

#[test]
fn stream_loop_restarts_its_flows() {
    let raw = r#"{
      "schema_version": 1,
      "kind": "stream",
      "flows": [ { "packets": [
        { "data": "6869", "client_tx": true },
        { "data": "6f6b", "client_tx": false }
      ] } ],
      "loops": [ { "begin": 0, "end": 0, "count": 2 } ]
    }"#;
    let report = Replay::new(config(raw), ReplayOptions::default())
        .run_iteration(0)
        .expect("replay runs");

    assert_eq!(report.flows_ok(), 4);
    assert_eq!(report.sent_pkts, 4);
    assert_eq!(report.loops_ok(), 1);
    assert_eq!(report.loops_failed(), 0);
    // 第一轮在 t=2 结束，第二轮 10ms 后重启，同样耗时 2ms
    assert_eq!(report.loops[0].at_ms, 14);
}

#[test]
fn stop_after_aborts_flows_still_running() {
    let raw = r#"{
      "schema_version": 1,
      "kind": "stream",
      "flows": [ { "packets": [
        { "data": "aa", "delay_ms": 1000, "client_tx": true },
        { "data": "bb", "client_tx": true }
      ] } ]
    }"#;
    let opts = ReplayOptions {
        stop_after_ms: Some(100),
        ..ReplayOptions::default()
    };
    let report = Replay::new(config(raw), opts)
        .run_iteration(0)
        .expect("replay runs");

    assert_eq!(report.flows_ok(), 0);
    for side in [Side::Client, Side::Server] {
        let r = report.last_result(side, 0).expect("result");
        assert_eq!(r.state, FlowState::Aborted);
        assert!(!r.successful);
        assert_eq!(r.at_ms, 100);
    }
    assert_eq!(report.sent_pkts, 1);
}
