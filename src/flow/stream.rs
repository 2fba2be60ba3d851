//! Stream 流
//!
//! 双方共享同一个有序包序列：轮到本端发送的包就发，轮到对端发送的包就挂接收。
//! 相邻发送之间按上一个已处理包的延迟等待；延迟为 0 时直接流水发送。

use super::api::PlaylistApi;
use super::config::{FlowConfig, FlowTiming};
use super::common::{FlowCore, RxProgress};
use super::event::{CloseType, Effect, FlowEvent, FlowState, TimerToken};
use super::traversal::PktLoopTraversal;
use crate::group::LoopId;
use crate::packet::PacketFactory;
use std::sync::Arc;
use tracing::{trace, warn};

#[derive(Debug, Clone)]
pub struct StreamFlow {
    core: FlowCore,
    cfg: Arc<FlowConfig>,
    timing: FlowTiming,
    traversal: PktLoopTraversal,
    /// 在 `stream_seq` 中的位置
    cursor: usize,
    last_processed: Option<usize>,
    sends_outstanding: usize,
    rx: Option<RxProgress>,
    tx_timer: Option<TimerToken>,
}

pub(crate) fn factory<'a>(
    flow_idx: usize,
    cfg: &'a FlowConfig,
    api: &'a dyn PlaylistApi,
) -> PacketFactory<'a> {
    PacketFactory::new(
        flow_idx,
        &cfg.variables,
        api.var_values(flow_idx),
        api.modifiers(),
    )
}

impl StreamFlow {
    pub fn new(
        flow_idx: usize,
        is_client: bool,
        cfg: Arc<FlowConfig>,
        timing: FlowTiming,
        loop_id: Option<LoopId>,
    ) -> Self {
        Self {
            core: FlowCore::new(flow_idx, is_client, loop_id, timing.inactivity_timeout_ms),
            cfg,
            timing,
            traversal: PktLoopTraversal::default(),
            cursor: 0,
            last_processed: None,
            sends_outstanding: 0,
            rx: None,
            tx_timer: None,
        }
    }

    pub(crate) fn core(&self) -> &FlowCore {
        &self.core
    }

    pub fn state(&self) -> FlowState {
        self.core.state
    }

    pub fn sends_outstanding(&self) -> usize {
        self.sends_outstanding
    }

    pub fn is_receiving(&self) -> bool {
        self.rx.is_some()
    }

    #[tracing::instrument(skip(self, api), fields(flow_idx = self.core.flow_idx, client = self.core.is_client))]
    pub fn handle_event(&mut self, ev: FlowEvent, api: &dyn PlaylistApi) -> Vec<Effect> {
        match ev {
            FlowEvent::Start => self.start(api),
            FlowEvent::Stop => self.stop(),
            FlowEvent::TimerFired(token) => self.on_timer(token, api),
            FlowEvent::Sent => self.on_sent(api),
            FlowEvent::Received { len } => self.on_received(len, api),
            FlowEvent::ConnectFailed => {
                if self.core.state.is_active() {
                    self.abort(FlowState::FailToConnect, "connect failed");
                }
            }
            FlowEvent::Closed(kind) => self.on_closed(kind),
        }
        self.core.take_effects()
    }

    fn reset(&mut self) {
        let mut tx = self.tx_timer.take();
        self.core.cancel_timer(&mut tx);
        self.core.cancel_inactivity();
        self.core.state = FlowState::WaitToStart;
        self.traversal.reset();
        self.cursor = 0;
        self.last_processed = None;
        self.sends_outstanding = 0;
        self.rx = None;
    }

    fn start(&mut self, api: &dyn PlaylistApi) {
        self.reset();
        self.core.state = FlowState::Started;
        if self.cfg.is_empty() {
            self.core.complete();
            return;
        }
        self.core.setup_inactivity();
        self.process(api);
    }

    fn stop(&mut self) {
        if self.core.state.is_active() {
            self.abort(FlowState::Aborted, "stopped");
        }
    }

    fn abort(&mut self, state: FlowState, reason: &str) {
        let mut tx = self.tx_timer.take();
        self.core.cancel_timer(&mut tx);
        self.core.fail(state, reason);
    }

    fn on_timer(&mut self, token: TimerToken, api: &dyn PlaylistApi) {
        if self.core.state != FlowState::Started {
            return;
        }
        if self.core.is_inactivity(token) {
            self.abort(FlowState::Aborted, "inactivity timeout");
            return;
        }
        if self.tx_timer != Some(token) {
            trace!(?token, "过期定时器");
            return;
        }
        self.tx_timer = None;
        self.send_current(api);
        self.process(api);
    }

    fn on_sent(&mut self, api: &dyn PlaylistApi) {
        if self.core.state != FlowState::Started {
            return;
        }
        self.sends_outstanding = self.sends_outstanding.saturating_sub(1);
        self.core.setup_inactivity();
        self.process(api);
    }

    fn on_received(&mut self, len: usize, api: &dyn PlaylistApi) {
        if self.core.state != FlowState::Started {
            return;
        }
        let Some(rx) = self.rx.as_mut() else {
            self.abort(FlowState::Aborted, "packet received while expecting to send");
            return;
        };
        rx.received = rx.received.saturating_add(len);
        let complete = rx.received >= rx.expected;
        self.core.setup_inactivity();
        if complete {
            self.rx = None;
            self.process(api);
        }
    }

    fn on_closed(&mut self, kind: CloseType) {
        match self.core.state {
            FlowState::Started if kind == CloseType::RxFin && self.is_idle() => {
                self.core.complete()
            }
            FlowState::Started => self.abort(FlowState::Aborted, "connection closed mid-flow"),
            FlowState::WaitToStart if kind == CloseType::ConErr => {
                self.abort(FlowState::FailToConnect, "connection error")
            }
            _ => {}
        }
    }

    /// 序列已走完且没有任何挂起的收发或定时
    fn is_idle(&self) -> bool {
        self.cursor >= self.cfg.stream_seq.len()
            && self.sends_outstanding == 0
            && self.rx.is_none()
            && self.tx_timer.is_none()
    }

    fn advance(&mut self, pkt_idx: usize) {
        self.last_processed = Some(pkt_idx);
        self.cursor = self
            .traversal
            .next_index(&self.cfg.stream_seq, self.cursor, &self.cfg.packets);
    }

    fn send_current(&mut self, api: &dyn PlaylistApi) {
        let cfg = Arc::clone(&self.cfg);
        let Some(&pkt_idx) = cfg.stream_seq.get(self.cursor) else {
            return;
        };
        let built = factory(self.core.flow_idx, &cfg, api).build(pkt_idx, &cfg.packets[pkt_idx]);
        match built {
            Ok(bytes) => {
                self.sends_outstanding = self.sends_outstanding.saturating_add(1);
                self.core.send(Some(pkt_idx), bytes);
                self.advance(pkt_idx);
            }
            Err(err) => {
                warn!(pkt_idx, %err, "组包失败");
                self.abort(FlowState::Aborted, "packet build failed");
            }
        }
    }

    /// 尽可能向前推进，直到需要等待某个外部事件。
    fn process(&mut self, api: &dyn PlaylistApi) {
        let cfg = Arc::clone(&self.cfg);
        loop {
            if self.core.state != FlowState::Started {
                return;
            }
            let Some(&pkt_idx) = cfg.stream_seq.get(self.cursor) else {
                if self.is_idle() {
                    self.core.complete();
                }
                return;
            };
            let pkt = &cfg.packets[pkt_idx];

            if pkt.client_tx == self.core.is_client {
                if self.rx.is_some() || self.tx_timer.is_some() {
                    return;
                }
                if let Some(prev) = self.last_processed {
                    let delay_ms = self.timing.clamp_delay(cfg.packets[prev].delay_ms);
                    if delay_ms > 0 {
                        // 等在途发送全部完成后再开始计时
                        if self.sends_outstanding == 0 {
                            self.tx_timer = Some(self.core.arm_timer(delay_ms));
                        }
                        return;
                    }
                }
                self.send_current(api);
            } else {
                if self.rx.is_some() {
                    return;
                }
                let expected = factory(self.core.flow_idx, &cfg, api).calculate_size(pkt);
                self.rx = Some(RxProgress {
                    expected,
                    received: 0,
                });
                self.core.receive(expected);
                self.advance(pkt_idx);
            }
        }
    }
}
