use super::MockPlaylist;
use crate::flow::{
    CloseType, Effect, FlowConfig, FlowEvent, FlowInstance, FlowState, FlowTiming, Layer,
    PlayType, StreamFlow, TimerToken,
};
use crate::modifier::{Modifier, RangeMode, RangeModifier};
use crate::packet::{PacketTemplate, Variable};
use std::sync::Arc;

const INACTIVITY: u64 = 100_000;

fn config(packets: Vec<PacketTemplate>, variables: Vec<Variable>) -> Arc<FlowConfig> {
    Arc::new(
        FlowConfig::new(Layer::Tcp, PlayType::Stream, packets, variables)
            .expect("valid stream config"),
    )
}

fn flow(is_client: bool, cfg: Arc<FlowConfig>) -> StreamFlow {
    StreamFlow::new(0, is_client, cfg, FlowTiming::default(), None)
}

fn tx_rx() -> Arc<FlowConfig> {
    config(
        vec![
            PacketTemplate::new(vec![0xaa], 0, true),
            PacketTemplate::new(vec![0xbb, 0xbb], 0, false),
        ],
        Vec::new(),
    )
}

fn sends(effects: &[Effect]) -> Vec<(Option<usize>, Vec<u8>)> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Send { pkt_idx, bytes } => Some((*pkt_idx, bytes.clone())),
            _ => None,
        })
        .collect()
}

fn armed(effects: &[Effect]) -> Vec<(TimerToken, u64)> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::ArmTimer { token, delay_ms } => Some((*token, *delay_ms)),
            _ => None,
        })
        .collect()
}

#[test]
fn client_start_sends_first_packet_and_arms_receive() {
    let api = MockPlaylist::default();
    let mut f = flow(true, tx_rx());

    let effects = f.handle_event(FlowEvent::Start, &api);
    assert_eq!(
        effects,
        vec![
            Effect::ArmTimer {
                token: TimerToken(0),
                delay_ms: INACTIVITY
            },
            Effect::Send {
                pkt_idx: Some(0),
                bytes: vec![0xaa]
            },
            Effect::Receive { expected_len: 2 },
        ]
    );
    assert_eq!(f.state(), FlowState::Started);
    assert_eq!(f.sends_outstanding(), 1);
}

#[test]
fn send_completion_leaves_receive_outstanding_and_receive_completes_flow() {
    let api = MockPlaylist::default();
    let mut f = flow(true, tx_rx());
    f.handle_event(FlowEvent::Start, &api);

    let effects = f.handle_event(FlowEvent::Sent, &api);
    assert_eq!(
        effects,
        vec![
            Effect::CancelTimer {
                token: TimerToken(0)
            },
            Effect::ArmTimer {
                token: TimerToken(1),
                delay_ms: INACTIVITY
            },
        ]
    );
    assert!(f.is_receiving());
    assert_eq!(f.state(), FlowState::Started);

    let effects = f.handle_event(FlowEvent::Received { len: 2 }, &api);
    assert_eq!(f.state(), FlowState::Done);
    assert_eq!(effects.last(), Some(&Effect::Finished { successful: true }));
    // 结束时不留下任何挂着的定时器
    assert!(effects.contains(&Effect::CancelTimer {
        token: TimerToken(2)
    }));
}

#[test]
fn short_receives_accumulate_until_expected_length() {
    let api = MockPlaylist::default();
    let mut f = flow(true, tx_rx());
    f.handle_event(FlowEvent::Start, &api);
    f.handle_event(FlowEvent::Sent, &api);

    f.handle_event(FlowEvent::Received { len: 1 }, &api);
    assert_eq!(f.state(), FlowState::Started);
    assert!(f.is_receiving());

    f.handle_event(FlowEvent::Received { len: 1 }, &api);
    assert_eq!(f.state(), FlowState::Done);
}

#[test]
fn server_receives_then_answers() {
    let api = MockPlaylist::default();
    let mut f = flow(false, tx_rx());

    let effects = f.handle_event(FlowEvent::Start, &api);
    assert_eq!(effects.last(), Some(&Effect::Receive { expected_len: 1 }));
    assert!(sends(&effects).is_empty());

    let effects = f.handle_event(FlowEvent::Received { len: 1 }, &api);
    assert_eq!(sends(&effects), vec![(Some(1), vec![0xbb, 0xbb])]);

    let effects = f.handle_event(FlowEvent::Sent, &api);
    assert_eq!(effects.last(), Some(&Effect::Finished { successful: true }));
}

#[test]
fn zero_delay_sends_are_pipelined() {
    let api = MockPlaylist::default();
    let cfg = config(
        vec![
            PacketTemplate::new(vec![1], 0, true),
            PacketTemplate::new(vec![2], 0, true),
            PacketTemplate::new(vec![3], 0, true),
        ],
        Vec::new(),
    );
    let mut f = flow(true, cfg);

    let effects = f.handle_event(FlowEvent::Start, &api);
    assert_eq!(sends(&effects).len(), 3);
    assert_eq!(f.sends_outstanding(), 3);

    f.handle_event(FlowEvent::Sent, &api);
    f.handle_event(FlowEvent::Sent, &api);
    assert_eq!(f.state(), FlowState::Started);
    let effects = f.handle_event(FlowEvent::Sent, &api);
    assert_eq!(effects.last(), Some(&Effect::Finished { successful: true }));
}

#[test]
fn inter_packet_delay_waits_for_sends_then_arms_timer() {
    let api = MockPlaylist::default();
    let cfg = config(
        vec![
            PacketTemplate::new(vec![1], 50, true),
            PacketTemplate::new(vec![2], 0, true),
        ],
        Vec::new(),
    );
    let mut f = flow(true, cfg);

    let effects = f.handle_event(FlowEvent::Start, &api);
    assert_eq!(sends(&effects).len(), 1);
    assert_eq!(armed(&effects), vec![(TimerToken(0), INACTIVITY)]);

    let effects = f.handle_event(FlowEvent::Sent, &api);
    assert_eq!(
        armed(&effects),
        vec![(TimerToken(1), INACTIVITY), (TimerToken(2), 50)]
    );

    let effects = f.handle_event(FlowEvent::TimerFired(TimerToken(2)), &api);
    assert_eq!(sends(&effects), vec![(Some(1), vec![2])]);

    let effects = f.handle_event(FlowEvent::Sent, &api);
    assert_eq!(effects.last(), Some(&Effect::Finished { successful: true }));
}

#[test]
fn min_delay_clamp_applies_to_zero_delays() {
    let api = MockPlaylist::default();
    let cfg = config(
        vec![
            PacketTemplate::new(vec![1], 0, true),
            PacketTemplate::new(vec![2], 500, true),
            PacketTemplate::new(vec![3], 0, true),
        ],
        Vec::new(),
    );
    let timing = FlowTiming {
        min_pkt_delay_ms: Some(20),
        max_pkt_delay_ms: Some(100),
        ..FlowTiming::default()
    };
    let mut f = StreamFlow::new(0, true, cfg, timing, None);

    f.handle_event(FlowEvent::Start, &api);
    let effects = f.handle_event(FlowEvent::Sent, &api);
    assert_eq!(armed(&effects).last(), Some(&(TimerToken(2), 20)));

    f.handle_event(FlowEvent::TimerFired(TimerToken(2)), &api);
    let effects = f.handle_event(FlowEvent::Sent, &api);
    assert_eq!(armed(&effects).last(), Some(&(TimerToken(4), 100)));
}

#[test]
fn packet_loop_repeats_sends() {
    let api = MockPlaylist::default();
    let cfg = config(
        vec![
            PacketTemplate::new(vec![1], 0, true).with_loop(0, 3),
            PacketTemplate::new(vec![2], 0, true),
        ],
        Vec::new(),
    );
    let mut f = flow(true, cfg);

    let effects = f.handle_event(FlowEvent::Start, &api);
    let idx: Vec<Option<usize>> = sends(&effects).into_iter().map(|(i, _)| i).collect();
    assert_eq!(idx, vec![Some(0), Some(0), Some(0), Some(1)]);
}

#[test]
fn sent_bytes_follow_the_modifier_cursor() {
    let mut api = MockPlaylist::default();
    api.modifiers
        .insert(
            0,
            0,
            Modifier::Range(
                RangeModifier::new(&[0x10], &[0x01], &[0xff], 0, 0, RangeMode::Incr)
                    .expect("valid range"),
            ),
        )
        .expect("insert");
    let cfg = config(
        vec![PacketTemplate::new(vec![0xee], 0, true)],
        vec![Variable::new(vec![0x00]).target(0, 1)],
    );

    let mut f = flow(true, Arc::clone(&cfg));
    let effects = f.handle_event(FlowEvent::Start, &api);
    assert_eq!(sends(&effects), vec![(Some(0), vec![0xee, 0x10])]);

    api.modifiers.set_cursor(3);
    let mut f = flow(true, cfg);
    let effects = f.handle_event(FlowEvent::Start, &api);
    assert_eq!(sends(&effects), vec![(Some(0), vec![0xee, 0x13])]);
}

#[test]
fn receive_while_expecting_to_send_aborts() {
    let api = MockPlaylist::default();
    let cfg = config(
        vec![
            PacketTemplate::new(vec![1], 50, true),
            PacketTemplate::new(vec![2], 0, true),
        ],
        Vec::new(),
    );
    let mut f = flow(true, cfg);
    f.handle_event(FlowEvent::Start, &api);

    let effects = f.handle_event(FlowEvent::Received { len: 4 }, &api);
    assert_eq!(f.state(), FlowState::Aborted);
    assert_eq!(effects.last(), Some(&Effect::Finished { successful: false }));
}

#[test]
fn inactivity_timeout_aborts_and_stale_tokens_are_ignored() {
    let api = MockPlaylist::default();
    let mut f = flow(true, tx_rx());
    f.handle_event(FlowEvent::Start, &api);
    f.handle_event(FlowEvent::Sent, &api);

    // 令牌 0 已被取消
    let effects = f.handle_event(FlowEvent::TimerFired(TimerToken(0)), &api);
    assert!(effects.is_empty());
    assert_eq!(f.state(), FlowState::Started);

    let effects = f.handle_event(FlowEvent::TimerFired(TimerToken(1)), &api);
    assert_eq!(f.state(), FlowState::Aborted);
    assert_eq!(effects.last(), Some(&Effect::Finished { successful: false }));
    assert!(sends(&effects).is_empty());
}

#[test]
fn stop_aborts_once_and_is_idempotent() {
    let api = MockPlaylist::default();
    let mut f = flow(true, tx_rx());
    f.handle_event(FlowEvent::Start, &api);

    let effects = f.handle_event(FlowEvent::Stop, &api);
    assert_eq!(f.state(), FlowState::Aborted);
    assert!(effects.contains(&Effect::CancelTimer {
        token: TimerToken(0)
    }));
    assert_eq!(effects.last(), Some(&Effect::Finished { successful: false }));

    assert!(f.handle_event(FlowEvent::Stop, &api).is_empty());
    assert_eq!(f.state(), FlowState::Aborted);
}

#[test]
fn stop_before_start_aborts() {
    let api = MockPlaylist::default();
    let mut f = flow(true, tx_rx());
    let effects = f.handle_event(FlowEvent::Stop, &api);
    assert_eq!(f.state(), FlowState::Aborted);
    assert_eq!(effects, vec![Effect::Finished { successful: false }]);
}

#[test]
fn empty_flow_completes_immediately() {
    let api = MockPlaylist::default();
    let mut f = flow(true, config(Vec::new(), Vec::new()));
    let effects = f.handle_event(FlowEvent::Start, &api);
    assert_eq!(effects, vec![Effect::Finished { successful: true }]);
    assert_eq!(f.state(), FlowState::Done);
}

#[test]
fn peer_close_mid_flow_aborts_and_connect_errors_fail_to_connect() {
    let api = MockPlaylist::default();
    let mut f = flow(true, tx_rx());
    f.handle_event(FlowEvent::Start, &api);
    f.handle_event(FlowEvent::Closed(CloseType::RxFin), &api);
    assert_eq!(f.state(), FlowState::Aborted);

    let mut f = flow(true, tx_rx());
    f.handle_event(FlowEvent::Closed(CloseType::ConErr), &api);
    assert_eq!(f.state(), FlowState::FailToConnect);

    let mut f = flow(true, tx_rx());
    f.handle_event(FlowEvent::Start, &api);
    let effects = f.handle_event(FlowEvent::ConnectFailed, &api);
    assert_eq!(f.state(), FlowState::FailToConnect);
    assert_eq!(effects.last(), Some(&Effect::Finished { successful: false }));
}

#[test]
fn restart_after_done_replays_from_the_beginning() {
    let api = MockPlaylist::default();
    let mut f = FlowInstance::new(0, true, tx_rx(), FlowTiming::default(), None);
    f.handle_event(FlowEvent::Start, &api);
    f.handle_event(FlowEvent::Sent, &api);
    f.handle_event(FlowEvent::Received { len: 2 }, &api);
    assert_eq!(f.state(), FlowState::Done);

    let effects = f.handle_event(FlowEvent::Start, &api);
    assert_eq!(f.state(), FlowState::Started);
    assert_eq!(sends(&effects), vec![(Some(0), vec![0xaa])]);
    // 重启后令牌继续递增，旧定时器不会被误认
    assert!(armed(&effects).iter().all(|(t, _)| t.0 > 2));
}
