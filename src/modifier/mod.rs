//! 字段修饰器
//!
//! 每个被标记的模板字段可挂一个修饰器，按“迭代游标”给出该字段本轮的取值。
//! 取值只依赖游标（以及随机模式下的种子），与调用历史无关，
//! 因此 `set_cursor(n)` 与连续 `next()` n 次结果一致。

// 子模块声明
mod block;
mod range;
mod table;

// 重新导出公共接口
pub use block::{ModKey, ModifierBlock};
pub use range::{RangeMode, RangeModifier};
pub use table::TableModifier;

use thiserror::Error;

/// 修饰器构造/联动错误，由调用方包装成 `crate::Error::InvalidModifier`。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModifierError {
    #[error("unsupported width {0} (expected 1, 2, 4 or 8 bytes)")]
    UnsupportedWidth(usize),
    #[error("{field} is {actual} bytes, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("mode {0:?} is not supported")]
    UnsupportedMode(RangeMode),
    #[error("a modifier is already registered for this variable")]
    Duplicate,
    #[error("no modifier registered for variable {0}")]
    Missing(usize),
    #[error("link to variable {0} would form a cycle")]
    LinkCycle(usize),
}

/// 单个修饰器：区间（递增/递减/随机）或表格。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
    Range(RangeModifier),
    Table(TableModifier),
}

impl Modifier {
    /// 给定有效游标时的输出宽度（字节）。0 表示本轮不改写。
    pub fn size_at(&self, cursor: u64) -> usize {
        match self {
            Modifier::Range(m) => m.width(),
            Modifier::Table(m) => m.row_at(cursor).map_or(0, <[u8]>::len),
        }
    }

    /// 把取值写入 `out`，返回写入字节数。`reverse` 为 true 时按小端摆放。
    pub fn write_at(&self, cursor: u64, draw_seed: u64, out: &mut [u8], reverse: bool) -> usize {
        match self {
            Modifier::Range(m) => m.write_at(cursor, draw_seed, out, reverse),
            Modifier::Table(m) => m.write_at(cursor, out, reverse),
        }
    }

    /// 掩码（大端顺序）；表格修饰器整体覆盖，没有掩码。
    pub fn mask(&self) -> Option<&[u8]> {
        match self {
            Modifier::Range(m) => Some(m.mask()),
            Modifier::Table(_) => None,
        }
    }

    /// 完整循环一次所需的游标步数；`None` 表示永不回卷，不会向被联动者进位。
    pub fn period(&self) -> Option<u64> {
        match self {
            Modifier::Range(m) => m.period(),
            Modifier::Table(m) => m.period(),
        }
    }
}

/// 把游标按 stutter 折算为取值序号
pub(crate) fn step_index(cursor: u64, stutter: u64, recycle: u64) -> u64 {
    let step = cursor / stutter.saturating_add(1);
    if recycle == 0 { step } else { step % recycle }
}

/// 取值的低 `width` 字节按大端写入；`reverse` 时反转。
pub(crate) fn write_be(value: u64, width: usize, out: &mut [u8], reverse: bool) -> usize {
    let be = value.to_be_bytes();
    let src = &be[be.len().saturating_sub(width)..];
    let n = src.len().min(out.len());
    if reverse {
        for (dst, b) in out.iter_mut().zip(src.iter().rev()).take(n) {
            *dst = *b;
        }
    } else {
        out[..n].copy_from_slice(&src[..n]);
    }
    n
}
