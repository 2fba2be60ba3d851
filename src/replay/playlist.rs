//! 单侧 playlist
//!
//! 持有一侧（客户端或服务端）的全部流实例、修饰器副本和流级循环处理器，
//! 并决定流的启动顺序：stream 按各自的启动时间并发，attack 按下标串行。

use super::socket::Side;
use crate::config::PlaylistConfig;
use crate::error::Result;
use crate::flow::{Effect, FlowEvent, FlowInstance, Layer, PlayType, PlaylistApi};
use crate::group::{FlowLoopHandler, LoopAction, LoopId, LoopKind, LoopState};
use crate::modifier::ModifierBlock;
use crate::packet::VarValues;
use tracing::debug;

/// 流在处理事件时能看到的 playlist 状态
#[derive(Debug, Clone, Default)]
pub struct PlaylistContext {
    modifiers: ModifierBlock,
    var_values: Vec<VarValues>,
    no_values: VarValues,
    pre_stop: bool,
}

impl PlaylistApi for PlaylistContext {
    fn modifiers(&self) -> &ModifierBlock {
        &self.modifiers
    }

    fn var_values(&self, flow_idx: usize) -> &VarValues {
        self.var_values.get(flow_idx).unwrap_or(&self.no_values)
    }

    fn pre_stop(&self) -> bool {
        self.pre_stop
    }
}

#[derive(Debug, Clone)]
pub struct Playlist {
    side: Side,
    play_type: PlayType,
    ctx: PlaylistContext,
    flows: Vec<FlowInstance>,
    layers: Vec<Layer>,
    start_ms: Vec<u64>,
    loops: Vec<FlowLoopHandler>,
}

impl Playlist {
    /// 客户端一侧挂流级循环；服务端的流由连接驱动，不需要循环处理器。
    pub fn new(side: Side, cfg: &PlaylistConfig) -> Result<Self> {
        let kind = match cfg.play_type {
            PlayType::Stream => LoopKind::Stream,
            PlayType::Attack => LoopKind::Attack,
        };
        let loops = if side.is_client() {
            cfg.loops
                .iter()
                .map(|l| FlowLoopHandler::new(kind, l.begin, l.end, l.count))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        let flows = cfg
            .flows
            .iter()
            .enumerate()
            .map(|(flow_idx, entry)| {
                let loop_id = loops
                    .iter()
                    .position(|h| h.contains(flow_idx))
                    .map(LoopId);
                FlowInstance::new(
                    flow_idx,
                    side.is_client(),
                    entry.config.clone(),
                    entry.timing,
                    loop_id,
                )
            })
            .collect();

        Ok(Self {
            side,
            play_type: cfg.play_type,
            ctx: PlaylistContext {
                modifiers: cfg.modifiers.clone(),
                var_values: cfg.flows.iter().map(|f| f.var_values.clone()).collect(),
                no_values: VarValues::new(),
                pre_stop: false,
            },
            flows,
            layers: cfg.flows.iter().map(|f| f.config.layer).collect(),
            start_ms: cfg.flows.iter().map(|f| f.start_ms).collect(),
            loops,
        })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn play_type(&self) -> PlayType {
        self.play_type
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn flow(&self, flow_idx: usize) -> Option<&FlowInstance> {
        self.flows.get(flow_idx)
    }

    pub fn flows(&self) -> &[FlowInstance] {
        &self.flows
    }

    pub fn layer(&self, flow_idx: usize) -> Option<Layer> {
        self.layers.get(flow_idx).copied()
    }

    pub fn context(&self) -> &PlaylistContext {
        &self.ctx
    }

    pub fn loop_handler(&self, id: LoopId) -> Option<&FlowLoopHandler> {
        self.loops.get(id.0)
    }

    pub fn modifiers_mut(&mut self) -> &mut ModifierBlock {
        &mut self.ctx.modifiers
    }

    pub fn set_pre_stop(&mut self) {
        self.ctx.pre_stop = true;
    }

    /// 停止期间循环处理器不再接受流的回报
    pub fn set_closing(&mut self) {
        self.loops.iter_mut().for_each(FlowLoopHandler::set_closing);
    }

    /// 把事件交给流实例
    pub fn handle(&mut self, flow_idx: usize, ev: FlowEvent) -> Vec<Effect> {
        let Some(flow) = self.flows.get_mut(flow_idx) else {
            return Vec::new();
        };
        flow.handle_event(ev, &self.ctx)
    }

    /// 首批需要启动的流：(流下标, 延迟)
    pub fn initial_starts(&self) -> Vec<(usize, u64)> {
        match self.play_type {
            PlayType::Stream => self.start_ms.iter().copied().enumerate().collect(),
            PlayType::Attack => self
                .start_ms
                .first()
                .map(|&ms| vec![(0, ms)])
                .unwrap_or_default(),
        }
    }

    /// 流即将启动：第一次碰到循环区间时开启循环，并记录首轮的启动偏移。
    pub fn on_flow_start(&mut self, flow_idx: usize, now_ms: u64) -> Vec<LoopAction> {
        let Some(id) = self.flows.get(flow_idx).and_then(FlowInstance::loop_id) else {
            return Vec::new();
        };
        let Some(handler) = self.loops.get_mut(id.0) else {
            return Vec::new();
        };
        let mut actions = Vec::new();
        if handler.state() == LoopState::WaitToStart {
            actions = handler.start_loop(flow_idx, now_ms);
        }
        handler.record_flow_start(flow_idx, now_ms);
        // 正在启动的流本身不需要再次处理
        actions.retain(|a| *a != LoopAction::ProcessFlow { flow_idx });
        actions
    }

    /// 流结束后的编排动作
    pub fn on_flow_finished(
        &mut self,
        flow_idx: usize,
        successful: bool,
        now_ms: u64,
    ) -> Vec<LoopAction> {
        let loop_id = self.flows.get(flow_idx).and_then(FlowInstance::loop_id);
        let Some(handler) = loop_id.and_then(|id| self.loops.get_mut(id.0)) else {
            return self.next_attack_flow(flow_idx);
        };

        let mut actions = if successful {
            handler.flow_in_loop_done(flow_idx, now_ms)
        } else {
            handler.flow_in_loop_failed(flow_idx, now_ms)
        };
        let loop_end = handler.end();
        let loop_over = actions
            .iter()
            .any(|a| matches!(a, LoopAction::LoopDone { .. } | LoopAction::LoopFailed { .. }));
        if loop_over {
            debug!(side = %self.side, flow_idx, loop_end, "流循环结束");
            actions.extend(self.next_attack_flow(loop_end));
        }
        actions
    }

    /// attack playlist 在 `after` 之后继续处理下一个流
    fn next_attack_flow(&self, after: usize) -> Vec<LoopAction> {
        if self.play_type != PlayType::Attack || !self.side.is_client() {
            return Vec::new();
        }
        let next = after + 1;
        if next < self.flows.len() {
            vec![LoopAction::ProcessFlow { flow_idx: next }]
        } else {
            Vec::new()
        }
    }
}
