//! 流实例
//!
//! 按配置的播放类型选择 stream 或 attack 行为，对外只暴露一个事件入口。

use super::api::PlaylistApi;
use super::attack::AttackFlow;
use super::config::{FlowConfig, FlowTiming, PlayType};
use super::common::FlowCore;
use super::event::{Effect, FlowEvent, FlowState};
use super::stream::StreamFlow;
use crate::group::LoopId;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum FlowInstance {
    Stream(StreamFlow),
    Attack(AttackFlow),
}

impl FlowInstance {
    pub fn new(
        flow_idx: usize,
        is_client: bool,
        cfg: Arc<FlowConfig>,
        timing: FlowTiming,
        loop_id: Option<LoopId>,
    ) -> Self {
        match cfg.play_type {
            PlayType::Stream => {
                FlowInstance::Stream(StreamFlow::new(flow_idx, is_client, cfg, timing, loop_id))
            }
            PlayType::Attack => {
                FlowInstance::Attack(AttackFlow::new(flow_idx, is_client, cfg, timing, loop_id))
            }
        }
    }

    /// 处理一个事件，返回宿主需要依次执行的效果。
    pub fn handle_event(&mut self, ev: FlowEvent, api: &dyn PlaylistApi) -> Vec<Effect> {
        match self {
            FlowInstance::Stream(f) => f.handle_event(ev, api),
            FlowInstance::Attack(f) => f.handle_event(ev, api),
        }
    }

    fn core(&self) -> &FlowCore {
        match self {
            FlowInstance::Stream(f) => f.core(),
            FlowInstance::Attack(f) => f.core(),
        }
    }

    pub fn state(&self) -> FlowState {
        self.core().state
    }

    pub fn index(&self) -> usize {
        self.core().flow_idx
    }

    pub fn is_client(&self) -> bool {
        self.core().is_client
    }

    pub fn loop_id(&self) -> Option<LoopId> {
        self.core().loop_id
    }
}
