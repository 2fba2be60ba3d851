//! 流的公共部分
//!
//! 两种流共用：状态、定时器令牌分配、不活动定时器与效果缓冲。

use super::event::{Effect, FlowState, TimerToken};
use crate::group::LoopId;
use tracing::{debug, info, warn};

/// 一次接收的进度；短读会累加直到够数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RxProgress {
    pub(crate) expected: usize,
    pub(crate) received: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct FlowCore {
    pub(crate) flow_idx: usize,
    pub(crate) is_client: bool,
    pub(crate) loop_id: Option<LoopId>,
    pub(crate) state: FlowState,
    pub(crate) inactivity_timeout_ms: u64,
    inactivity: Option<TimerToken>,
    next_token: u64,
    out: Vec<Effect>,
}

impl FlowCore {
    pub(crate) fn new(
        flow_idx: usize,
        is_client: bool,
        loop_id: Option<LoopId>,
        inactivity_timeout_ms: u64,
    ) -> Self {
        Self {
            flow_idx,
            is_client,
            loop_id,
            state: FlowState::WaitToStart,
            inactivity_timeout_ms,
            inactivity: None,
            next_token: 0,
            out: Vec::new(),
        }
    }

    pub(crate) fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.out)
    }

    pub(crate) fn arm_timer(&mut self, delay_ms: u64) -> TimerToken {
        let token = TimerToken(self.next_token);
        self.next_token = self.next_token.wrapping_add(1);
        self.out.push(Effect::ArmTimer { token, delay_ms });
        token
    }

    /// 取消 `slot` 中的定时器（如有），之后 slot 为空。
    pub(crate) fn cancel_timer(&mut self, slot: &mut Option<TimerToken>) {
        if let Some(token) = slot.take() {
            self.out.push(Effect::CancelTimer { token });
        }
    }

    /// 重新计时：取消旧的不活动定时器，再挂一个新的。
    pub(crate) fn setup_inactivity(&mut self) {
        let mut old = self.inactivity.take();
        self.cancel_timer(&mut old);
        let token = self.arm_timer(self.inactivity_timeout_ms);
        self.inactivity = Some(token);
    }

    pub(crate) fn cancel_inactivity(&mut self) {
        let mut old = self.inactivity.take();
        self.cancel_timer(&mut old);
    }

    pub(crate) fn is_inactivity(&self, token: TimerToken) -> bool {
        self.inactivity == Some(token)
    }

    pub(crate) fn send(&mut self, pkt_idx: Option<usize>, bytes: Vec<u8>) {
        debug!(flow_idx = self.flow_idx, client = self.is_client, ?pkt_idx, len = bytes.len(), "发送");
        self.out.push(Effect::Send { pkt_idx, bytes });
    }

    pub(crate) fn receive(&mut self, expected_len: usize) {
        debug!(flow_idx = self.flow_idx, client = self.is_client, expected_len, "等待接收");
        self.out.push(Effect::Receive { expected_len });
    }

    /// 进入 Done 并上报成功。调用前需自行取消其余定时器。
    pub(crate) fn complete(&mut self) {
        self.cancel_inactivity();
        self.state = FlowState::Done;
        info!(flow_idx = self.flow_idx, client = self.is_client, "流完成");
        self.out.push(Effect::Finished { successful: true });
    }

    /// 进入失败终态（Aborted / FailToConnect）并上报。
    pub(crate) fn fail(&mut self, state: FlowState, reason: &str) {
        self.cancel_inactivity();
        self.state = state;
        warn!(flow_idx = self.flow_idx, client = self.is_client, ?state, reason, "流失败");
        self.out.push(Effect::Finished { successful: false });
    }
}
