//! Attack 流
//!
//! 客户端与服务端各自按自己的载荷表发送，互不等待对方的具体包：
//! 每次发送完成后等待 `wait_timeout` 再发下一个（客户端首包只等三分之一），
//! 接收则按对端载荷表逐个挂起，直到收满期望的应答数。

use super::api::PlaylistApi;
use super::config::{FlowConfig, FlowTiming, Layer};
use super::common::{FlowCore, RxProgress};
use super::event::{CloseType, Effect, FlowEvent, FlowState, TimerToken};
use super::stream::factory;
use super::traversal::PktLoopTraversal;
use crate::group::LoopId;
use crate::packet::ATTACK_DEFAULT_RESPONSE;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// TCP 客户端在应答未收齐时额外等待的倍数（仅一次）
const GRACE_PERIOD_FACTOR: u64 = 4;

/// 下一个要发送的内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outgoing {
    Template(usize),
    DefaultResponse,
}

/// 某一端发出的载荷下标表
fn payload_of(cfg: &FlowConfig, client: bool) -> &[usize] {
    if client {
        &cfg.client_payload
    } else {
        &cfg.server_payload
    }
}

#[derive(Debug, Clone)]
pub struct AttackFlow {
    core: FlowCore,
    cfg: Arc<FlowConfig>,
    timing: FlowTiming,
    wait_timer: Option<TimerToken>,
    tx_traversal: PktLoopTraversal,
    rx_traversal: PktLoopTraversal,
    /// 在本端载荷表中的位置
    tx_pos: usize,
    /// 在对端载荷表中的位置
    rx_pos: usize,
    pkts_to_send: usize,
    pkts_sent: usize,
    sends_outstanding: usize,
    responses_expected: usize,
    rx_armed: usize,
    received: usize,
    rx: Option<RxProgress>,
    grace_started: bool,
}

impl AttackFlow {
    pub fn new(
        flow_idx: usize,
        is_client: bool,
        cfg: Arc<FlowConfig>,
        timing: FlowTiming,
        loop_id: Option<LoopId>,
    ) -> Self {
        let pkts_to_send = if is_client {
            cfg.client_pkts_to_play
        } else {
            cfg.server_pkts_to_play
        };
        Self {
            core: FlowCore::new(flow_idx, is_client, loop_id, timing.inactivity_timeout_ms),
            cfg,
            timing,
            wait_timer: None,
            tx_traversal: PktLoopTraversal::default(),
            rx_traversal: PktLoopTraversal::default(),
            tx_pos: 0,
            rx_pos: 0,
            pkts_to_send,
            pkts_sent: 0,
            sends_outstanding: 0,
            responses_expected: 0,
            rx_armed: 0,
            received: 0,
            rx: None,
            grace_started: false,
        }
    }

    pub(crate) fn core(&self) -> &FlowCore {
        &self.core
    }

    pub fn state(&self) -> FlowState {
        self.core.state
    }

    pub fn responses_expected(&self) -> usize {
        self.responses_expected
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn grace_started(&self) -> bool {
        self.grace_started
    }

    #[tracing::instrument(skip(self, api), fields(flow_idx = self.core.flow_idx, client = self.core.is_client))]
    pub fn handle_event(&mut self, ev: FlowEvent, api: &dyn PlaylistApi) -> Vec<Effect> {
        match ev {
            FlowEvent::Start => self.start(api),
            FlowEvent::Stop => {
                if self.core.state.is_active() {
                    self.abort(FlowState::Aborted, "stopped");
                }
            }
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
        let mut wait = self.wait_timer.take();
        self.core.cancel_timer(&mut wait);
        self.core.cancel_inactivity();
        self.core.state = FlowState::WaitToStart;
        self.tx_traversal.reset();
        self.rx_traversal.reset();
        self.tx_pos = 0;
        self.rx_pos = 0;
        self.pkts_sent = 0;
        self.sends_outstanding = 0;
        self.rx_armed = 0;
        self.received = 0;
        self.rx = None;
        self.grace_started = false;
    }

    fn abort(&mut self, state: FlowState, reason: &str) {
        let mut wait = self.wait_timer.take();
        self.core.cancel_timer(&mut wait);
        self.core.fail(state, reason);
    }

    fn finish(&mut self) {
        let mut wait = self.wait_timer.take();
        self.core.cancel_timer(&mut wait);
        self.core.complete();
    }

    fn start(&mut self, api: &dyn PlaylistApi) {
        self.reset();
        self.core.state = FlowState::Started;
        if self.cfg.is_empty() || self.cfg.client_payload.is_empty() {
            warn!(flow_idx = self.core.flow_idx, "空攻击流");
            self.core.complete();
            return;
        }

        self.initialize();
        self.core.setup_inactivity();

        let wait = self.timing.wait_timeout_ms;
        match (self.cfg.layer, self.core.is_client) {
            (_, true) => self.wait_for_send(wait / 3, api),
            (Layer::Tcp, false) => self.wait_for_send(wait, api),
            // UDP 服务端收到第一个包后才开始发送
            (Layer::Udp, false) => {}
        }
        self.arm_next_receive(api);
    }

    /// 计算期望收到的应答数
    fn initialize(&mut self) {
        let cfg = &self.cfg;
        self.responses_expected = if self.core.is_client {
            match cfg.layer {
                Layer::Tcp
                    if !cfg.server_payload.is_empty()
                        && cfg.server_pkts_to_play < self.pkts_to_send =>
                {
                    cfg.server_pkts_to_play
                }
                Layer::Tcp => self.pkts_to_send,
                Layer::Udp => 0,
            }
        } else {
            cfg.client_pkts_to_play
        };
        if self.responses_expected == 0 {
            self.responses_expected = self.pkts_to_send;
        }
        debug!(
            pkts_to_send = self.pkts_to_send,
            responses_expected = self.responses_expected,
            "攻击流初始化"
        );
    }

    fn wait_for_send(&mut self, delay_ms: u64, api: &dyn PlaylistApi) {
        let mut old = self.wait_timer.take();
        self.core.cancel_timer(&mut old);
        if api.pre_stop() {
            trace!("已预告停止，不再挂发送定时器");
            return;
        }
        self.wait_timer = Some(self.core.arm_timer(delay_ms));
    }

    fn next_to_send(&mut self) -> Option<Outgoing> {
        if !self.core.is_client && self.cfg.server_payload.is_empty() {
            // 服务端没有载荷时，对每个期望的请求回一个默认应答
            if self.pkts_sent < self.responses_expected {
                return Some(Outgoing::DefaultResponse);
            }
            return None;
        }
        let cfg = Arc::clone(&self.cfg);
        let payload = payload_of(&cfg, self.core.is_client);
        let &pkt_idx = payload.get(self.tx_pos)?;
        self.tx_pos = self.tx_traversal.next_index(payload, self.tx_pos, &cfg.packets);
        Some(Outgoing::Template(pkt_idx))
    }

    /// 下一次接收的期望长度；None 表示无需再收。
    fn next_to_receive(&mut self, api: &dyn PlaylistApi) -> Option<usize> {
        if self.rx_armed >= self.responses_expected {
            return None;
        }
        let cfg = Arc::clone(&self.cfg);
        let payload = payload_of(&cfg, !self.core.is_client);
        match payload.get(self.rx_pos) {
            Some(&pkt_idx) => {
                self.rx_pos = self.rx_traversal.next_index(payload, self.rx_pos, &cfg.packets);
                Some(factory(self.core.flow_idx, &cfg, api).calculate_size(&cfg.packets[pkt_idx]))
            }
            // 对端载荷为空或已用完：客户端等待默认应答
            None if self.core.is_client => Some(ATTACK_DEFAULT_RESPONSE.len()),
            None => None,
        }
    }

    fn arm_next_receive(&mut self, api: &dyn PlaylistApi) {
        if self.rx.is_some() {
            return;
        }
        let Some(expected) = self.next_to_receive(api) else {
            return;
        };
        self.rx_armed += 1;
        self.rx = Some(RxProgress {
            expected,
            received: 0,
        });
        self.core.receive(expected);
    }

    fn on_timer(&mut self, token: TimerToken, api: &dyn PlaylistApi) {
        if self.core.state != FlowState::Started {
            return;
        }
        if self.core.is_inactivity(token) {
            self.abort(FlowState::Aborted, "inactivity timeout");
            return;
        }
        if self.wait_timer != Some(token) {
            trace!(?token, "过期定时器");
            return;
        }
        self.wait_timer = None;
        self.do_next_packet(api);
    }

    /// 等待超时到点：发下一个包，或者判断是否可以结束。
    fn do_next_packet(&mut self, api: &dyn PlaylistApi) {
        self.core.cancel_inactivity();

        if let Some(out) = self.next_to_send() {
            self.send(out, api);
            if self.core.state == FlowState::Started {
                self.core.setup_inactivity();
            }
            return;
        }

        let wait = self.timing.wait_timeout_ms;
        if self.core.is_client {
            if self.cfg.layer == Layer::Tcp
                && self.received < self.responses_expected
                && !self.grace_started
            {
                // 给大应答留一次宽限期
                self.grace_started = true;
                debug!(received = self.received, expected = self.responses_expected, "进入宽限期");
                self.wait_for_send(wait.saturating_mul(GRACE_PERIOD_FACTOR), api);
                self.core.setup_inactivity();
            } else {
                self.finish();
            }
        } else if self.cfg.layer == Layer::Udp && self.received >= self.responses_expected {
            // UDP 服务端等不到对端关闭
            self.finish();
        } else {
            self.core.setup_inactivity();
        }
    }

    fn send(&mut self, out: Outgoing, api: &dyn PlaylistApi) {
        let (pkt_idx, built) = match out {
            Outgoing::DefaultResponse => (None, Ok(ATTACK_DEFAULT_RESPONSE.to_vec())),
            Outgoing::Template(idx) => {
                let cfg = Arc::clone(&self.cfg);
                (
                    Some(idx),
                    factory(self.core.flow_idx, &cfg, api).build(idx, &cfg.packets[idx]),
                )
            }
        };
        match built {
            Ok(bytes) => {
                self.pkts_sent += 1;
                self.sends_outstanding += 1;
                self.core.send(pkt_idx, bytes);
            }
            Err(err) => {
                warn!(?pkt_idx, %err, "组包失败");
                self.abort(FlowState::Aborted, "packet build failed");
            }
        }
    }

    fn on_sent(&mut self, api: &dyn PlaylistApi) {
        if self.core.state != FlowState::Started {
            return;
        }
        self.sends_outstanding = self.sends_outstanding.saturating_sub(1);
        self.wait_for_send(self.timing.wait_timeout_ms, api);
    }

    fn on_received(&mut self, len: usize, api: &dyn PlaylistApi) {
        if self.core.state != FlowState::Started {
            return;
        }
        let Some(rx) = self.rx.as_mut() else {
            self.abort(FlowState::Aborted, "unexpected packet");
            return;
        };
        rx.received = rx.received.saturating_add(len);
        if rx.received < rx.expected {
            self.core.setup_inactivity();
            return;
        }
        self.rx = None;
        self.packet_received(api);
    }

    fn packet_received(&mut self, api: &dyn PlaylistApi) {
        self.core.setup_inactivity();
        self.received += 1;

        // UDP 服务端在收到第一个包时才开始发送，首包延迟为 0
        if !self.core.is_client
            && self.cfg.layer == Layer::Udp
            && self.pkts_sent == 0
            && self.wait_timer.is_none()
        {
            self.wait_for_send(0, api);
        }

        self.arm_next_receive(api);
    }

    fn on_closed(&mut self, kind: CloseType) {
        match (self.core.state, kind) {
            // 对端正常关闭：服务端本来就在等这个
            (FlowState::Started, CloseType::RxFin) => self.finish(),
            (FlowState::Started, _) => self.abort(FlowState::Aborted, "connection reset"),
            (FlowState::WaitToStart, CloseType::ConErr) => {
                self.abort(FlowState::FailToConnect, "connection error")
            }
            _ => {}
        }
    }
}
