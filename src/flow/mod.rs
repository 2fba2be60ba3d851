//! 流回放状态机
//!
//! 每个流对象只通过 `handle_event(FlowEvent) -> Vec<Effect>` 与外界交互：
//! 定时器、socket 收发和结果上报都以效果的形式交给宿主执行，状态机本身不做 I/O。

// 子模块声明
mod api;
mod attack;
mod common;
mod config;
mod event;
mod instance;
mod stream;
mod traversal;

// 重新导出公共接口
pub use api::PlaylistApi;
pub use attack::AttackFlow;
pub use config::{
    DEFAULT_INACTIVITY_TIMEOUT_MS, DEFAULT_WAIT_TIMEOUT_MS, FlowConfig, FlowTiming, Layer,
    PlayType,
};
pub use event::{CloseType, Effect, FlowEvent, FlowState, TimerToken};
pub use instance::FlowInstance;
pub use stream::StreamFlow;
pub use traversal::{PktLoopTraversal, count_plays};
