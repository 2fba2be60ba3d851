//! 回放世界
//!
//! 把客户端与服务端两个 playlist 接到同一个仿真器上：流发出的效果在这里
//! 变成定时器事件和回环连接上的收发事件，事件再以 `FlowEvent` 的形式送回流。

use super::events::{Deliver, FlowStart, PeerClose, RecvReady, SendDone, StopAll, TimerFire};
use super::playlist::Playlist;
use super::report::{FlowResult, IterationReport, LoopResult, PacketRecord};
use super::socket::{LoopbackConn, Side};
use crate::config::PlaylistConfig;
use crate::error::Result;
use crate::flow::{CloseType, Effect, FlowEvent, FlowState, Layer, TimerToken};
use crate::group::LoopAction;
use crate::sim::{Simulator, World};
use std::any::Any;
use std::collections::HashSet;
use tracing::{debug, info, trace};

/// 单轮回放的运行参数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayOptions {
    /// 记录每一次发送的字节
    pub trace_packets: bool,
    /// 相对本轮开始的停止时间
    pub stop_after_ms: Option<u64>,
}

pub struct ReplayWorld {
    client: Playlist,
    server: Playlist,
    conns: Vec<LoopbackConn>,
    cancelled: HashSet<(Side, usize, TimerToken)>,
    latency_ms: u64,
    opts: ReplayOptions,
    stopped: bool,
    report: IterationReport,
}

impl World for ReplayWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ReplayWorld {
    /// 两侧各自持有一份修饰器副本，并定位到第 `iteration` 轮。
    pub fn new(cfg: &PlaylistConfig, iteration: u64, opts: ReplayOptions) -> Result<Self> {
        let mut client = Playlist::new(Side::Client, cfg)?;
        let mut server = Playlist::new(Side::Server, cfg)?;
        client.modifiers_mut().set_cursor(iteration);
        server.modifiers_mut().set_cursor(iteration);

        Ok(Self {
            conns: vec![LoopbackConn::default(); cfg.flows.len()],
            client,
            server,
            cancelled: HashSet::new(),
            latency_ms: cfg.link_latency_ms,
            opts,
            stopped: false,
            report: IterationReport {
                iteration,
                ..IterationReport::default()
            },
        })
    }

    pub fn playlist(&self, side: Side) -> &Playlist {
        match side {
            Side::Client => &self.client,
            Side::Server => &self.server,
        }
    }

    fn playlist_mut(&mut self, side: Side) -> &mut Playlist {
        match side {
            Side::Client => &mut self.client,
            Side::Server => &mut self.server,
        }
    }

    pub fn report(&self) -> &IterationReport {
        &self.report
    }

    pub fn into_report(self) -> IterationReport {
        self.report
    }

    /// 排入首批流的启动事件和可选的停止事件
    pub fn schedule_initial(&self, sim: &mut Simulator) {
        for (flow_idx, delay_ms) in self.client.initial_starts() {
            sim.schedule_in_millis(delay_ms, FlowStart { flow_idx });
        }
        if let Some(stop_ms) = self.opts.stop_after_ms {
            sim.schedule_in_millis(stop_ms, StopAll);
        }
    }

    /// 建立连接并启动一对流：服务端先就绪，再启动客户端。
    pub fn start_flow(&mut self, flow_idx: usize, sim: &mut Simulator) {
        if self.stopped {
            return;
        }
        let Some(conn) = self.conns.get_mut(flow_idx) else {
            return;
        };
        let epoch = conn.reopen();
        let now_ms = sim.now().as_millis();
        info!(flow_idx, epoch, now_ms, "启动流");

        let actions = self.client.on_flow_start(flow_idx, now_ms);
        self.dispatch(Side::Server, flow_idx, FlowEvent::Start, sim);
        self.dispatch(Side::Client, flow_idx, FlowEvent::Start, sim);
        self.apply_loop_actions(actions, sim);
    }

    pub fn on_timer(&mut self, side: Side, flow_idx: usize, token: TimerToken, sim: &mut Simulator) {
        if self.cancelled.remove(&(side, flow_idx, token)) {
            trace!(%side, flow_idx, ?token, "已取消的定时器");
            return;
        }
        self.dispatch(side, flow_idx, FlowEvent::TimerFired(token), sim);
    }

    pub fn on_send_done(&mut self, side: Side, flow_idx: usize, epoch: u64, sim: &mut Simulator) {
        if !self.is_current(flow_idx, epoch) {
            return;
        }
        self.dispatch(side, flow_idx, FlowEvent::Sent, sim);
    }

    pub fn on_deliver(
        &mut self,
        to: Side,
        flow_idx: usize,
        epoch: u64,
        len: usize,
        sim: &mut Simulator,
    ) {
        if !self.is_current(flow_idx, epoch) {
            return;
        }
        let ready = self
            .conns
            .get_mut(flow_idx)
            .and_then(|c| c.deliver(to, len));
        if let Some(len) = ready {
            self.dispatch(to, flow_idx, FlowEvent::Received { len }, sim);
        }
    }

    pub fn on_recv_ready(
        &mut self,
        side: Side,
        flow_idx: usize,
        epoch: u64,
        len: usize,
        sim: &mut Simulator,
    ) {
        if !self.is_current(flow_idx, epoch) {
            return;
        }
        self.dispatch(side, flow_idx, FlowEvent::Received { len }, sim);
    }

    pub fn on_peer_close(
        &mut self,
        to: Side,
        flow_idx: usize,
        epoch: u64,
        close: CloseType,
        sim: &mut Simulator,
    ) {
        if !self.is_current(flow_idx, epoch) {
            return;
        }
        if let Some(conn) = self.conns.get_mut(flow_idx) {
            conn.close(to);
        }
        self.dispatch(to, flow_idx, FlowEvent::Closed(close), sim);
    }

    /// 预告停止后停止两侧所有未结束的流
    pub fn stop_all(&mut self, sim: &mut Simulator) {
        info!(now_ms = sim.now().as_millis(), "停止全部流");
        self.stopped = true;
        self.client.set_closing();
        self.client.set_pre_stop();
        self.server.set_pre_stop();
        for side in [Side::Client, Side::Server] {
            let active: Vec<usize> = self
                .playlist(side)
                .flows()
                .iter()
                .enumerate()
                .filter(|(_, f)| f.state().is_active())
                .map(|(i, _)| i)
                .collect();
            for flow_idx in active {
                self.dispatch(side, flow_idx, FlowEvent::Stop, sim);
            }
        }
    }

    fn is_current(&self, flow_idx: usize, epoch: u64) -> bool {
        self.conns
            .get(flow_idx)
            .is_some_and(|c| c.epoch() == epoch)
    }

    fn dispatch(&mut self, side: Side, flow_idx: usize, ev: FlowEvent, sim: &mut Simulator) {
        trace!(%side, flow_idx, ?ev, "投递流事件");
        let effects = self.playlist_mut(side).handle(flow_idx, ev);
        self.apply_effects(side, flow_idx, effects, sim);
    }

    /// 按顺序执行流返回的效果；这里只入队事件，不会嵌套投递。
    fn apply_effects(
        &mut self,
        side: Side,
        flow_idx: usize,
        effects: Vec<Effect>,
        sim: &mut Simulator,
    ) {
        let epoch = self.conns.get(flow_idx).map_or(0, LoopbackConn::epoch);
        for effect in effects {
            match effect {
                Effect::ArmTimer { token, delay_ms } => {
                    sim.schedule_in_millis(
                        delay_ms,
                        TimerFire {
                            side,
                            flow_idx,
                            token,
                        },
                    );
                }
                Effect::CancelTimer { token } => {
                    self.cancelled.insert((side, flow_idx, token));
                }
                Effect::Send { pkt_idx, bytes } => {
                    let len = bytes.len();
                    self.report.sent_pkts += 1;
                    self.report.sent_bytes += len as u64;
                    if self.opts.trace_packets {
                        self.report.packets.push(PacketRecord {
                            side,
                            flow_idx,
                            pkt_idx,
                            bytes,
                            at_ms: sim.now().as_millis(),
                        });
                    }
                    sim.schedule_in_millis(
                        0,
                        SendDone {
                            side,
                            flow_idx,
                            epoch,
                        },
                    );
                    sim.schedule_in_millis(
                        self.latency_ms,
                        Deliver {
                            to: side.peer(),
                            flow_idx,
                            epoch,
                            len,
                        },
                    );
                }
                Effect::Receive { expected_len } => {
                    let ready = self
                        .conns
                        .get_mut(flow_idx)
                        .and_then(|c| c.arm_receive(side, expected_len));
                    if let Some(len) = ready {
                        sim.schedule_in_millis(
                            0,
                            RecvReady {
                                side,
                                flow_idx,
                                epoch,
                                len,
                            },
                        );
                    }
                }
                Effect::Finished { successful } => {
                    self.on_finished(side, flow_idx, successful, epoch, sim);
                }
            }
        }
    }

    fn on_finished(
        &mut self,
        side: Side,
        flow_idx: usize,
        successful: bool,
        epoch: u64,
        sim: &mut Simulator,
    ) {
        let now_ms = sim.now().as_millis();
        let state = self
            .playlist(side)
            .flow(flow_idx)
            .map_or(FlowState::Aborted, |f| f.state());
        debug!(%side, flow_idx, successful, ?state, now_ms, "流结束");
        self.report.flows.push(FlowResult {
            side,
            flow_idx,
            successful,
            state,
            at_ms: now_ms,
        });

        // 只有 TCP 有连接关闭；对端已先关闭时不再回发
        let is_tcp = self.playlist(side).layer(flow_idx) == Some(Layer::Tcp);
        let first_close = self
            .conns
            .get_mut(flow_idx)
            .is_some_and(|c| c.close(side));
        if is_tcp && first_close {
            let close = if successful {
                CloseType::RxFin
            } else {
                CloseType::RxRst
            };
            sim.schedule_in_millis(
                self.latency_ms,
                PeerClose {
                    to: side.peer(),
                    flow_idx,
                    epoch,
                    close,
                },
            );
        }

        if side.is_client() {
            let actions = self.client.on_flow_finished(flow_idx, successful, now_ms);
            self.apply_loop_actions(actions, sim);
        }
    }

    fn apply_loop_actions(&mut self, actions: Vec<LoopAction>, sim: &mut Simulator) {
        let now_ms = sim.now().as_millis();
        for action in actions {
            match action {
                LoopAction::StartFlow { flow_idx, delay_ms } => {
                    sim.schedule_in_millis(delay_ms, FlowStart { flow_idx });
                }
                LoopAction::ProcessFlow { flow_idx } => {
                    sim.schedule_in_millis(0, FlowStart { flow_idx });
                }
                LoopAction::LoopDone { begin } => self.report.loops.push(LoopResult {
                    begin,
                    successful: true,
                    at_ms: now_ms,
                }),
                LoopAction::LoopFailed { begin } => self.report.loops.push(LoopResult {
                    begin,
                    successful: false,
                    at_ms: now_ms,
                }),
            }
        }
    }
}
