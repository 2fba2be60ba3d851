//! 仿真时间类型
//!
//! 定义仿真时间及其单位转换。回放层的定时器以毫秒计，这里统一换算为纳秒存储。

/// 仿真时间（纳秒）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    pub fn from_micros(us: u64) -> SimTime {
        SimTime(us.saturating_mul(1_000))
    }
    pub fn from_millis(ms: u64) -> SimTime {
        SimTime(ms.saturating_mul(1_000_000))
    }
    /// 向下取整到毫秒
    pub fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }
    /// 当前时间之后 `ms` 毫秒
    pub fn after_millis(self, ms: u64) -> SimTime {
        SimTime(self.0.saturating_add(ms.saturating_mul(1_000_000)))
    }
}
