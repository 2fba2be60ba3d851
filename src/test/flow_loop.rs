use crate::error::Error;
use crate::group::{
    DELAY_BETWEEN_STREAM_ITERATIONS_MS, FlowLoopHandler, LoopAction, LoopKind, LoopState,
};

fn counters(h: &FlowLoopHandler) -> (u32, usize, usize) {
    let s = h.status();
    (s.remaining_iterations, s.remaining_flows, s.current_flow)
}

#[test]
fn attack_loop_runs_flows_one_at_a_time_and_wraps() {
    let mut h = FlowLoopHandler::new(LoopKind::Attack, 1, 2, 2).expect("valid loop");

    assert_eq!(h.start_loop(1, 0), vec![LoopAction::ProcessFlow { flow_idx: 1 }]);
    assert_eq!(counters(&h), (2, 2, 1));

    assert_eq!(
        h.flow_in_loop_done(1, 10),
        vec![LoopAction::ProcessFlow { flow_idx: 2 }]
    );
    assert_eq!(counters(&h), (2, 1, 2));

    assert_eq!(
        h.flow_in_loop_done(2, 20),
        vec![LoopAction::ProcessFlow { flow_idx: 1 }]
    );
    assert_eq!(counters(&h), (1, 2, 1));

    assert_eq!(
        h.flow_in_loop_done(1, 30),
        vec![LoopAction::ProcessFlow { flow_idx: 2 }]
    );
    assert_eq!(counters(&h), (1, 1, 2));

    assert_eq!(h.flow_in_loop_done(2, 40), vec![LoopAction::LoopDone { begin: 1 }]);
    assert_eq!(h.state(), LoopState::Successful);
    assert_eq!(counters(&h), (2, 2, 3));
    assert_eq!(h.status().last_stop_ms, 40);
}

#[test]
fn attack_loop_ignores_reports_from_flows_that_are_not_current() {
    let mut h = FlowLoopHandler::new(LoopKind::Attack, 0, 2, 1).expect("valid loop");
    h.start_loop(0, 0);
    assert!(h.flow_in_loop_done(2, 5).is_empty());
    assert_eq!(counters(&h), (1, 3, 0));
}

#[test]
fn stream_loop_restarts_all_flows_with_recorded_offsets() {
    let mut h = FlowLoopHandler::new(LoopKind::Stream, 1, 3, 2).expect("valid loop");

    assert!(h.start_loop(1, 100).is_empty());
    assert_eq!(h.first_flow(), Some(1));
    h.record_flow_start(1, 100);
    h.record_flow_start(2, 105);
    h.record_flow_start(3, 130);
    assert_eq!(h.relative_delay_ms(3), Some(30));

    assert!(h.flow_in_loop_done(2, 200).is_empty());
    assert!(h.flow_in_loop_done(1, 210).is_empty());
    let restart = h.flow_in_loop_done(3, 220);

    assert_eq!(h.state(), LoopState::Started);
    assert_eq!(h.status().remaining_iterations, 1);
    assert_eq!(h.status().remaining_flows, 3);
    let d = DELAY_BETWEEN_STREAM_ITERATIONS_MS;
    assert_eq!(
        restart,
        vec![
            LoopAction::StartFlow {
                flow_idx: 1,
                delay_ms: d
            },
            LoopAction::StartFlow {
                flow_idx: 2,
                delay_ms: 5 + d
            },
            LoopAction::StartFlow {
                flow_idx: 3,
                delay_ms: 30 + d
            },
        ]
    );

    // 第二轮的启动不会覆盖首轮记录的偏移
    h.record_flow_start(3, 500);
    assert_eq!(h.relative_delay_ms(3), Some(30));

    assert!(h.flow_in_loop_done(1, 300).is_empty());
    assert!(h.flow_in_loop_done(2, 300).is_empty());
    let done = h.flow_in_loop_done(3, 310);
    assert_eq!(done, vec![LoopAction::LoopDone { begin: 1 }]);
    assert_eq!(h.state(), LoopState::Successful);

    // 成功之后的回报不再产生动作
    assert!(h.flow_in_loop_done(3, 320).is_empty());
}

#[test]
fn failure_ends_the_loop_immediately() {
    let mut h = FlowLoopHandler::new(LoopKind::Stream, 0, 1, 5).expect("valid loop");
    h.start_loop(0, 0);
    h.flow_in_loop_done(0, 1);

    assert_eq!(
        h.flow_in_loop_failed(1, 2),
        vec![LoopAction::LoopFailed { begin: 0 }]
    );
    assert_eq!(h.state(), LoopState::Failed);
    assert_eq!(counters(&h).0, 5);
    assert!(h.flow_in_loop_failed(0, 3).is_empty());
}

#[test]
fn closing_loop_ignores_reports() {
    let mut h = FlowLoopHandler::new(LoopKind::Attack, 0, 0, 3).expect("valid loop");
    h.start_loop(0, 0);
    h.set_closing();
    assert_eq!(h.state(), LoopState::Closing);
    assert!(h.flow_in_loop_done(0, 1).is_empty());
    assert!(h.flow_in_loop_failed(0, 1).is_empty());
}

#[test]
fn start_loop_only_starts_once_and_reset_rearms() {
    let mut h = FlowLoopHandler::new(LoopKind::Attack, 2, 3, 1).expect("valid loop");
    assert_eq!(h.start_loop(2, 0).len(), 1);
    assert!(h.start_loop(2, 0).is_empty());

    h.reset();
    assert_eq!(h.state(), LoopState::WaitToStart);
    assert_eq!(h.start_loop(2, 0), vec![LoopAction::ProcessFlow { flow_idx: 2 }]);
}

#[test]
fn invalid_loop_spans_are_rejected() {
    assert!(matches!(
        FlowLoopHandler::new(LoopKind::Stream, 3, 2, 1),
        Err(Error::InvalidLoop(_))
    ));
    assert!(matches!(
        FlowLoopHandler::new(LoopKind::Attack, 0, 2, 0),
        Err(Error::InvalidLoop(_))
    ));
    let h = FlowLoopHandler::new(LoopKind::Attack, 4, 6, 1).expect("valid loop");
    assert!(h.contains(4) && h.contains(6) && !h.contains(7) && !h.contains(3));
    assert_eq!(h.span_len(), 3);
}
