//! 模拟回放
//!
//! 不碰真实 socket：客户端与服务端 playlist 通过回环连接对打，
//! 仿真器同时充当定时器服务。每一轮都从头构建世界，修饰器游标定位到轮次号。

// 子模块声明
mod events;
mod playlist;
mod report;
mod socket;
mod world;

// 重新导出公共接口
pub use playlist::{Playlist, PlaylistContext};
pub use report::{FlowResult, IterationReport, LoopResult, PacketRecord};
pub use socket::{LoopbackConn, Side};
pub use world::{ReplayOptions, ReplayWorld};

use crate::config::PlaylistConfig;
use crate::error::Result;
use crate::sim::Simulator;
use tracing::info;

/// 多轮回放驱动
#[derive(Debug, Clone)]
pub struct Replay {
    cfg: PlaylistConfig,
    opts: ReplayOptions,
}

impl Replay {
    pub fn new(cfg: PlaylistConfig, opts: ReplayOptions) -> Self {
        Self { cfg, opts }
    }

    pub fn config(&self) -> &PlaylistConfig {
        &self.cfg
    }

    /// 回放第 `iteration` 轮直到事件队列清空
    #[tracing::instrument(skip(self))]
    pub fn run_iteration(&self, iteration: u64) -> Result<IterationReport> {
        let mut sim = Simulator::default();
        let mut world = ReplayWorld::new(&self.cfg, iteration, self.opts)?;
        world.schedule_initial(&mut sim);
        let events = sim.run(&mut world);

        let mut report = world.into_report();
        report.end_ms = sim.now().as_millis();
        info!(
            iteration,
            events,
            flows_ok = report.flows_ok(),
            flows_failed = report.flows_failed(),
            "本轮回放结束"
        );
        Ok(report)
    }

    /// 依次回放配置中的全部轮次
    pub fn run(&self) -> Result<Vec<IterationReport>> {
        (0..self.cfg.iterations)
            .map(|k| self.run_iteration(k))
            .collect()
    }
}
