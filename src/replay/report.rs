//! 单轮回放的结果记录

use super::socket::Side;
use crate::flow::FlowState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowResult {
    pub side: Side,
    pub flow_idx: usize,
    pub successful: bool,
    pub state: FlowState,
    pub at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopResult {
    pub begin: usize,
    pub successful: bool,
    pub at_ms: u64,
}

/// 开启包追踪时记录的每一次发送
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRecord {
    pub side: Side,
    pub flow_idx: usize,
    /// `None` 表示攻击流的默认应答
    pub pkt_idx: Option<usize>,
    pub bytes: Vec<u8>,
    pub at_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    pub iteration: u64,
    pub flows: Vec<FlowResult>,
    pub loops: Vec<LoopResult>,
    pub packets: Vec<PacketRecord>,
    pub sent_pkts: u64,
    pub sent_bytes: u64,
    pub end_ms: u64,
}

impl IterationReport {
    pub fn flows_ok(&self) -> usize {
        self.flows.iter().filter(|r| r.successful).count()
    }

    pub fn flows_failed(&self) -> usize {
        self.flows.len() - self.flows_ok()
    }

    pub fn loops_ok(&self) -> usize {
        self.loops.iter().filter(|r| r.successful).count()
    }

    pub fn loops_failed(&self) -> usize {
        self.loops.len() - self.loops_ok()
    }

    /// 某一侧某个流最后一次上报的结果
    pub fn last_result(&self, side: Side, flow_idx: usize) -> Option<&FlowResult> {
        self.flows
            .iter()
            .rev()
            .find(|r| r.side == side && r.flow_idx == flow_idx)
    }
}
