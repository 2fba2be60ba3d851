//! 流级循环
//!
//! 把 playlist 中一段连续的流当作一个整体重复执行，并向 playlist 汇报整体成败。

// 子模块声明
mod handler;

// 重新导出公共接口
pub use handler::{
    DELAY_BETWEEN_STREAM_ITERATIONS_MS, FlowLoopHandler, LoopAction, LoopKind, LoopState,
    LoopStatus,
};

/// 循环处理器在 playlist 中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoopId(pub usize);
