//! 数据包模板
//!
//! 模板 = 字节 + 包间延迟 + 方向 + 可选的包级循环标记 + 变量插入点表。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 本次运行的变量覆盖值：变量下标 -> 字节
pub type VarValues = HashMap<usize, Vec<u8>>;

/// 攻击流在没有配置服务端载荷时使用的 2 字节默认应答。
pub const ATTACK_DEFAULT_RESPONSE: [u8; 2] = [0x0d, 0x0a];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endian {
    #[default]
    Big,
    Little,
}

impl Endian {
    pub fn is_little(self) -> bool {
        matches!(self, Endian::Little)
    }
}

/// 包级循环：挂在循环区间的最后一个包上。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopInfo {
    /// 回跳到的包下标
    pub begin: usize,
    /// 总共执行的次数（含第一次）
    pub count: u32,
}

/// 变量插入点：模板中 `offset` 处插入变量 `var_idx` 的取值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarTarget {
    pub offset: usize,
    pub var_idx: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PacketTemplate {
    pub data: Vec<u8>,
    /// 本包处理完后到下一次发送的延迟（毫秒）
    pub delay_ms: u64,
    /// 是否由客户端发出
    pub client_tx: bool,
    pub loop_info: Option<LoopInfo>,
    var_map: Vec<VarTarget>,
}

impl PacketTemplate {
    pub fn new(data: Vec<u8>, delay_ms: u64, client_tx: bool) -> Self {
        Self {
            data,
            delay_ms,
            client_tx,
            loop_info: None,
            var_map: Vec::new(),
        }
    }

    pub fn with_loop(mut self, begin: usize, count: u32) -> Self {
        self.loop_info = Some(LoopInfo { begin, count });
        self
    }

    /// 登记一个插入点。按偏移升序保存，偏移相同的保持登记顺序。
    pub fn add_target(&mut self, offset: usize, var_idx: usize) {
        let pos = self.var_map.partition_point(|t| t.offset <= offset);
        self.var_map.insert(pos, VarTarget { offset, var_idx });
    }

    pub fn targets(&self) -> &[VarTarget] {
        &self.var_map
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 模板变量。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Variable {
    pub default: Vec<u8>,
    pub endian: Endian,
    /// 覆盖值长度与默认值不同时，截断/补零到默认值长度
    pub fixed_length: bool,
    /// (包下标, 模板偏移)
    pub targets: Vec<(usize, usize)>,
}

impl Variable {
    pub fn new(default: Vec<u8>) -> Self {
        Self {
            default,
            ..Self::default()
        }
    }

    pub fn little_endian(mut self) -> Self {
        self.endian = Endian::Little;
        self
    }

    pub fn target(mut self, pkt_idx: usize, offset: usize) -> Self {
        self.targets.push((pkt_idx, offset));
        self
    }
}
