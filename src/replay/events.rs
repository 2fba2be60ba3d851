//! 回放事件
//!
//! 每个事件执行时取回 `ReplayWorld` 并调用对应的处理函数。

use super::socket::Side;
use super::world::ReplayWorld;
use crate::flow::{CloseType, TimerToken};
use crate::sim::{Event, Simulator, World};
use tracing::warn;

fn replay_world(world: &mut dyn World) -> Option<&mut ReplayWorld> {
    let w = world.as_any_mut().downcast_mut::<ReplayWorld>();
    if w.is_none() {
        warn!("world is not a ReplayWorld, event dropped");
    }
    w
}

/// 启动客户端流 `flow_idx`（连同对应的服务端流）
pub struct FlowStart {
    pub flow_idx: usize,
}

impl Event for FlowStart {
    #[tracing::instrument(skip(self, sim, world), fields(flow_idx = self.flow_idx))]
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let FlowStart { flow_idx } = *self;
        let Some(w) = replay_world(world) else {
            return;
        };
        w.start_flow(flow_idx, sim);
    }
}

pub struct TimerFire {
    pub side: Side,
    pub flow_idx: usize,
    pub token: TimerToken,
}

impl Event for TimerFire {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let TimerFire {
            side,
            flow_idx,
            token,
        } = *self;
        let Some(w) = replay_world(world) else {
            return;
        };
        w.on_timer(side, flow_idx, token, sim);
    }
}

pub struct SendDone {
    pub side: Side,
    pub flow_idx: usize,
    pub epoch: u64,
}

impl Event for SendDone {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let SendDone {
            side,
            flow_idx,
            epoch,
        } = *self;
        let Some(w) = replay_world(world) else {
            return;
        };
        w.on_send_done(side, flow_idx, epoch, sim);
    }
}

/// 经过链路时延后 `len` 字节到达 `to` 一端
pub struct Deliver {
    pub to: Side,
    pub flow_idx: usize,
    pub epoch: u64,
    pub len: usize,
}

impl Event for Deliver {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let Deliver {
            to,
            flow_idx,
            epoch,
            len,
        } = *self;
        let Some(w) = replay_world(world) else {
            return;
        };
        w.on_deliver(to, flow_idx, epoch, len, sim);
    }
}

/// 挂接收时缓冲已够数，下一拍交付
pub struct RecvReady {
    pub side: Side,
    pub flow_idx: usize,
    pub epoch: u64,
    pub len: usize,
}

impl Event for RecvReady {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let RecvReady {
            side,
            flow_idx,
            epoch,
            len,
        } = *self;
        let Some(w) = replay_world(world) else {
            return;
        };
        w.on_recv_ready(side, flow_idx, epoch, len, sim);
    }
}

pub struct PeerClose {
    pub to: Side,
    pub flow_idx: usize,
    pub epoch: u64,
    pub close: CloseType,
}

impl Event for PeerClose {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let PeerClose {
            to,
            flow_idx,
            epoch,
            close,
        } = *self;
        let Some(w) = replay_world(world) else {
            return;
        };
        w.on_peer_close(to, flow_idx, epoch, close, sim);
    }
}

/// 预告停止并停止两侧全部流
pub struct StopAll;

impl Event for StopAll {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let Some(w) = replay_world(world) else {
            return;
        };
        w.stop_all(sim);
    }
}
