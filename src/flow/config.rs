//! 流配置（运行期形态）
//!
//! 由配置文档构建，构建时完成所有校验；之后只读，由多个流实例通过 `Arc` 共享。

use super::traversal::count_plays;
use crate::error::{Error, Result};
use crate::packet::{PacketTemplate, Variable};
use serde::{Deserialize, Serialize};

/// 默认的流不活动超时（毫秒）
pub const DEFAULT_INACTIVITY_TIMEOUT_MS: u64 = 100_000;
/// 默认的攻击流等待超时（毫秒）
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    #[default]
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayType {
    #[default]
    Stream,
    Attack,
}

/// 单个流在 playlist 中的定时参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTiming {
    pub min_pkt_delay_ms: Option<u64>,
    pub max_pkt_delay_ms: Option<u64>,
    pub inactivity_timeout_ms: u64,
    pub wait_timeout_ms: u64,
}

impl Default for FlowTiming {
    fn default() -> Self {
        Self {
            min_pkt_delay_ms: None,
            max_pkt_delay_ms: None,
            inactivity_timeout_ms: DEFAULT_INACTIVITY_TIMEOUT_MS,
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
        }
    }
}

impl FlowTiming {
    /// 包间延迟夹到 [min, max]
    pub fn clamp_delay(&self, delay_ms: u64) -> u64 {
        let mut d = delay_ms;
        if let Some(min) = self.min_pkt_delay_ms {
            d = d.max(min);
        }
        if let Some(max) = self.max_pkt_delay_ms {
            d = d.min(max);
        }
        d
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    pub layer: Layer,
    pub play_type: PlayType,
    pub packets: Vec<PacketTemplate>,
    pub variables: Vec<Variable>,
    /// stream 流使用的完整下标序列 0..n
    pub stream_seq: Vec<usize>,
    /// 客户端发出的包下标
    pub client_payload: Vec<usize>,
    /// 服务端发出的包下标
    pub server_payload: Vec<usize>,
    pub client_pkts_to_play: usize,
    pub server_pkts_to_play: usize,
}

impl FlowConfig {
    /// 构建并校验：变量插入点落在模板内、包级循环合法且严格嵌套。
    pub fn new(
        layer: Layer,
        play_type: PlayType,
        mut packets: Vec<PacketTemplate>,
        variables: Vec<Variable>,
    ) -> Result<Self> {
        for (var_idx, var) in variables.iter().enumerate() {
            for &(pkt_idx, offset) in &var.targets {
                let Some(pkt) = packets.get_mut(pkt_idx) else {
                    return Err(Error::Config(format!(
                        "variable {var_idx} targets missing packet {pkt_idx}"
                    )));
                };
                if offset > pkt.data.len() {
                    return Err(Error::MalformedTemplate {
                        pkt_idx,
                        offset,
                        cursor: pkt.data.len(),
                    });
                }
                pkt.add_target(offset, var_idx);
            }
        }

        validate_loops(&packets)?;

        let stream_seq: Vec<usize> = (0..packets.len()).collect();
        let (client_payload, server_payload): (Vec<usize>, Vec<usize>) =
            stream_seq.iter().copied().partition(|&i| packets[i].client_tx);
        let client_pkts_to_play = count_plays(&client_payload, &packets);
        let server_pkts_to_play = count_plays(&server_payload, &packets);

        Ok(Self {
            layer,
            play_type,
            packets,
            variables,
            stream_seq,
            client_payload,
            server_payload,
            client_pkts_to_play,
            server_pkts_to_play,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

/// 循环区间 [begin, end] 两两之间只能不相交或包含；同一区间不能挂两次。
fn validate_loops(packets: &[PacketTemplate]) -> Result<()> {
    let spans: Vec<(usize, usize)> = packets
        .iter()
        .enumerate()
        .filter_map(|(end, p)| p.loop_info.map(|l| (l.begin, end)))
        .collect();

    for &(begin, end) in &spans {
        if begin > end {
            return Err(Error::InvalidLoop(format!(
                "packet loop at {end} begins after its end ({begin})"
            )));
        }
    }
    for (i, &(b1, e1)) in spans.iter().enumerate() {
        for &(b2, e2) in &spans[i + 1..] {
            let disjoint = e1 < b2 || e2 < b1;
            let nested = (b1 <= b2 && e2 <= e1) || (b2 <= b1 && e1 <= e2);
            if !disjoint && !nested {
                return Err(Error::InvalidLoop(format!(
                    "packet loops [{b1}, {e1}] and [{b2}, {e2}] overlap"
                )));
            }
        }
    }
    Ok(())
}
