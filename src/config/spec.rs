use crate::flow::{Layer, PlayType};
use crate::modifier::RangeMode;
use crate::packet::Endian;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistSpec {
    pub schema_version: u32,
    pub kind: PlayType,
    /// 随机修饰器的种子
    #[serde(default)]
    pub seed: Option<u64>,
    /// 回放轮数
    #[serde(default)]
    pub iterations: Option<u64>,
    #[serde(default)]
    pub defaults: Option<PlaylistDefaults>,
    pub flows: Vec<FlowSpec>,
    #[serde(default)]
    pub loops: Vec<LoopSpec>,
}

/// 各流未填写时使用的默认值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistDefaults {
    #[serde(default)]
    pub layer: Option<Layer>,
    #[serde(default)]
    pub min_pkt_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_pkt_delay_ms: Option<u64>,
    #[serde(default)]
    pub inactivity_timeout_ms: Option<u64>,
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
    #[serde(default)]
    pub link_latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSpec {
    #[serde(default)]
    pub layer: Option<Layer>,
    /// stream playlist 中该流的启动时间
    #[serde(default)]
    pub start_ms: Option<u64>,
    #[serde(default)]
    pub min_pkt_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_pkt_delay_ms: Option<u64>,
    #[serde(default)]
    pub inactivity_timeout_ms: Option<u64>,
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
    pub packets: Vec<PacketSpec>,
    #[serde(default)]
    pub variables: Vec<VariableSpec>,
    /// 本次运行的变量覆盖值：变量下标 -> hex
    #[serde(default)]
    pub var_values: Option<BTreeMap<usize, String>>,
    #[serde(default)]
    pub modifiers: Vec<ModifierSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketSpec {
    /// 模板字节（hex）
    pub data: String,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    pub client_tx: bool,
    #[serde(default, rename = "loop")]
    pub loop_info: Option<PacketLoopSpec>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PacketLoopSpec {
    pub begin: usize,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSpec {
    /// 默认值（hex）
    pub default: String,
    #[serde(default)]
    pub endian: Option<Endian>,
    #[serde(default)]
    pub fixed_length: Option<bool>,
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TargetSpec {
    pub packet: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifierSpec {
    pub var: usize,
    /// 驱动本修饰器的变量：只有它回卷时本修饰器才前进一步
    #[serde(default)]
    pub link: Option<usize>,
    #[serde(flatten)]
    pub kind: ModifierKindSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModifierKindSpec {
    Range {
        #[serde(default)]
        start: String,
        #[serde(default)]
        step: String,
        mask: String,
        #[serde(default)]
        recycle: u64,
        #[serde(default)]
        stutter: Option<u64>,
        #[serde(default)]
        mode: RangeMode,
    },
    Table {
        rows: Vec<String>,
        #[serde(default)]
        stutter: Option<u64>,
    },
}

/// 流级循环：[begin, end] 区间内的流作为整体重复 `count` 次
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoopSpec {
    pub begin: usize,
    pub end: usize,
    pub count: u32,
}
