//! 流级循环处理器
//!
//! stream 语义：区间内的流并发运行，一轮全部完成后按首轮记录的相对启动偏移整体重启。
//! attack 语义：区间内的流按下标依次串行运行，最后一个完成后回到区间开头。

use crate::error::{Error, Result};
use tracing::{debug, info, warn};

/// stream 循环两轮之间的固定间隔（毫秒）
pub const DELAY_BETWEEN_STREAM_ITERATIONS_MS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Stream,
    Attack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    WaitToStart,
    Started,
    Successful,
    Failed,
    /// playlist 正在关闭 socket，期间忽略所有回报
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopStatus {
    pub state: LoopState,
    pub remaining_iterations: u32,
    pub remaining_flows: usize,
    /// attack 语义下当前运行的流
    pub current_flow: usize,
    pub last_start_ms: u64,
    pub last_stop_ms: u64,
}

/// 处理器要求 playlist 执行的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// 延迟 `delay_ms` 后重新启动流（stream）
    StartFlow { flow_idx: usize, delay_ms: u64 },
    /// 立即处理该流（attack）
    ProcessFlow { flow_idx: usize },
    LoopDone { begin: usize },
    LoopFailed { begin: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowLoopHandler {
    kind: LoopKind,
    begin: usize,
    end: usize,
    max_count: u32,
    first_flow: Option<usize>,
    /// 区间内每个流相对首个启动流的启动偏移
    relative_delay_ms: Vec<u64>,
    status: LoopStatus,
}

impl FlowLoopHandler {
    pub fn new(kind: LoopKind, begin: usize, end: usize, max_count: u32) -> Result<Self> {
        if begin > end {
            return Err(Error::InvalidLoop(format!(
                "flow loop begins at {begin} after its end {end}"
            )));
        }
        if max_count == 0 {
            return Err(Error::InvalidLoop(format!(
                "flow loop [{begin}, {end}] has a zero count"
            )));
        }
        let span = end - begin + 1;
        Ok(Self {
            kind,
            begin,
            end,
            max_count,
            first_flow: None,
            relative_delay_ms: vec![0; span],
            status: LoopStatus {
                state: LoopState::WaitToStart,
                remaining_iterations: max_count,
                remaining_flows: span,
                current_flow: begin,
                last_start_ms: 0,
                last_stop_ms: 0,
            },
        })
    }

    pub fn kind(&self) -> LoopKind {
        self.kind
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    pub fn span_len(&self) -> usize {
        self.end - self.begin + 1
    }

    pub fn contains(&self, flow_idx: usize) -> bool {
        (self.begin..=self.end).contains(&flow_idx)
    }

    pub fn status(&self) -> LoopStatus {
        self.status
    }

    pub fn state(&self) -> LoopState {
        self.status.state
    }

    pub fn first_flow(&self) -> Option<usize> {
        self.first_flow
    }

    pub fn relative_delay_ms(&self, flow_idx: usize) -> Option<u64> {
        flow_idx
            .checked_sub(self.begin)
            .and_then(|i| self.relative_delay_ms.get(i).copied())
    }

    fn reset_counters(&mut self) {
        self.status.remaining_iterations = self.max_count;
        self.status.remaining_flows = self.span_len();
    }

    /// 回到初始状态，供 playlist 下一轮整体重放
    pub fn reset(&mut self) {
        self.reset_counters();
        self.status.state = LoopState::WaitToStart;
        self.status.current_flow = self.begin;
        self.first_flow = None;
        self.relative_delay_ms.iter_mut().for_each(|d| *d = 0);
    }

    pub fn set_closing(&mut self) {
        self.status.state = LoopState::Closing;
    }

    /// 第一个流启动时调用。
    pub fn start_loop(&mut self, flow_idx: usize, now_ms: u64) -> Vec<LoopAction> {
        if self.status.state != LoopState::WaitToStart {
            return Vec::new();
        }
        self.reset_counters();
        self.status.state = LoopState::Started;
        self.status.last_start_ms = now_ms;
        info!(begin = self.begin, end = self.end, count = self.max_count, ?self.kind, "流循环开始");

        match self.kind {
            LoopKind::Stream => {
                self.first_flow = Some(flow_idx);
                Vec::new()
            }
            LoopKind::Attack => {
                self.status.current_flow = self.begin;
                vec![LoopAction::ProcessFlow {
                    flow_idx: self.begin,
                }]
            }
        }
    }

    /// 记录首轮中各流的启动偏移（stream）
    pub fn record_flow_start(&mut self, flow_idx: usize, now_ms: u64) {
        if self.kind != LoopKind::Stream
            || self.status.state != LoopState::Started
            || self.status.remaining_iterations != self.max_count
        {
            return;
        }
        let offset = now_ms.saturating_sub(self.status.last_start_ms);
        if let Some(slot) = flow_idx
            .checked_sub(self.begin)
            .and_then(|i| self.relative_delay_ms.get_mut(i))
        {
            *slot = offset;
        }
    }

    pub fn flow_in_loop_done(&mut self, flow_idx: usize, now_ms: u64) -> Vec<LoopAction> {
        if self.status.state != LoopState::Started || !self.contains(flow_idx) {
            return Vec::new();
        }
        match self.kind {
            LoopKind::Stream => self.stream_flow_done(now_ms),
            LoopKind::Attack => self.attack_flow_done(flow_idx, now_ms),
        }
    }

    fn stream_flow_done(&mut self, now_ms: u64) -> Vec<LoopAction> {
        self.status.remaining_flows = self.status.remaining_flows.saturating_sub(1);
        if self.status.remaining_flows > 0 {
            return Vec::new();
        }
        if self.status.remaining_iterations <= 1 {
            return self.succeed(now_ms);
        }

        self.status.remaining_iterations -= 1;
        self.status.remaining_flows = self.span_len();
        self.status.last_start_ms = now_ms.saturating_add(DELAY_BETWEEN_STREAM_ITERATIONS_MS);
        debug!(
            begin = self.begin,
            remaining_iterations = self.status.remaining_iterations,
            "流循环进入下一轮"
        );
        (self.begin..=self.end)
            .zip(self.relative_delay_ms.iter())
            .map(|(flow_idx, rel)| LoopAction::StartFlow {
                flow_idx,
                delay_ms: rel.saturating_add(DELAY_BETWEEN_STREAM_ITERATIONS_MS),
            })
            .collect()
    }

    fn attack_flow_done(&mut self, flow_idx: usize, now_ms: u64) -> Vec<LoopAction> {
        if flow_idx != self.status.current_flow {
            warn!(flow_idx, current = self.status.current_flow, "非当前攻击流的完成回报");
            return Vec::new();
        }
        self.status.remaining_flows = self.status.remaining_flows.saturating_sub(1);
        self.status.current_flow += 1;
        if self.status.current_flow <= self.end {
            return vec![LoopAction::ProcessFlow {
                flow_idx: self.status.current_flow,
            }];
        }
        if self.status.remaining_iterations <= 1 {
            let actions = self.succeed(now_ms);
            self.status.current_flow = self.end + 1;
            return actions;
        }

        self.status.remaining_iterations -= 1;
        self.status.remaining_flows = self.span_len();
        self.status.current_flow = self.begin;
        vec![LoopAction::ProcessFlow {
            flow_idx: self.begin,
        }]
    }

    fn succeed(&mut self, now_ms: u64) -> Vec<LoopAction> {
        self.status.state = LoopState::Successful;
        self.status.last_stop_ms = now_ms;
        self.reset_counters();
        info!(begin = self.begin, end = self.end, "流循环成功");
        vec![LoopAction::LoopDone { begin: self.begin }]
    }

    /// 区间内任一流失败即整体失败
    pub fn flow_in_loop_failed(&mut self, flow_idx: usize, now_ms: u64) -> Vec<LoopAction> {
        if self.status.state != LoopState::Started || !self.contains(flow_idx) {
            return Vec::new();
        }
        self.status.state = LoopState::Failed;
        self.status.last_stop_ms = now_ms;
        self.reset_counters();
        warn!(begin = self.begin, end = self.end, flow_idx, "流循环失败");
        vec![LoopAction::LoopFailed { begin: self.begin }]
    }
}
