//! 仿真核心模块
//!
//! 离散事件调度器：回放时充当定时器服务与 socket 完成回调的投递者。

// 子模块声明
mod event;
mod scheduled_event;
mod simulator;
mod time;
mod world;

// 重新导出公共接口
pub use event::Event;
pub use scheduled_event::ScheduledEvent;
pub use simulator::Simulator;
pub use time::SimTime;
pub use world::World;
