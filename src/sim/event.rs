//! 事件 trait
//!
//! 回放中的流启动、定时器到点、发送完成、数据到达和对端关闭都实现为事件。

use super::simulator::Simulator;
use super::world::World;

/// 可被调度执行的事件。`self: Box<Self>` 让事件执行时取回自身字段的所有权。
pub trait Event: 'static {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World);
}
