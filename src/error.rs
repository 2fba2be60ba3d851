//! 错误类型
//!
//! 构造期（配置/模板/修饰器）错误统一由 `Error` 表示；回放过程中的失败不走这里，
//! 而是体现为流的终止状态。

use crate::modifier::ModifierError;
use thiserror::Error;

/// crate 内统一的 Result 别名。
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// 配置不合法（缺字段、取值越界等）
    #[error("configuration error: {0}")]
    Config(String),

    /// 修饰器构造失败
    #[error("invalid modifier for flow {flow_idx} var {var_idx}: {source}")]
    InvalidModifier {
        flow_idx: usize,
        var_idx: usize,
        #[source]
        source: ModifierError,
    },

    /// 模板变量偏移乱序或越界
    #[error("malformed template in packet {pkt_idx}: target offset {offset} is out of order or out of bounds (cursor {cursor})")]
    MalformedTemplate {
        pkt_idx: usize,
        offset: usize,
        cursor: usize,
    },

    #[error("unknown variable {var_idx} referenced by packet {pkt_idx}")]
    UnknownVariable { pkt_idx: usize, var_idx: usize },

    /// 包级或流级循环定义不合法
    #[error("invalid loop: {0}")]
    InvalidLoop(String),

    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
