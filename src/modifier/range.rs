//! 区间修饰器
//!
//! 把字段视为 1/2/4/8 字节的大端无符号整数，按游标给出 start ± i·step，
//! 或者在随机模式下给出可复现的伪随机值。

use super::{ModifierError, step_index, write_be};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeMode {
    #[default]
    Incr,
    Decr,
    Random,
    /// 配置里存在，但没有确定的生成规则，构造时拒绝
    Shuffle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeModifier {
    width: usize,
    start: u64,
    step: u64,
    mask: Vec<u8>,
    recycle: u64,
    stutter: u64,
    mode: RangeMode,
}

fn check_width(width: usize) -> Result<(), ModifierError> {
    match width {
        1 | 2 | 4 | 8 => Ok(()),
        other => Err(ModifierError::UnsupportedWidth(other)),
    }
}

fn check_len(field: &'static str, bytes: &[u8], expected: usize) -> Result<(), ModifierError> {
    if bytes.len() == expected {
        Ok(())
    } else {
        Err(ModifierError::LengthMismatch {
            field,
            expected,
            actual: bytes.len(),
        })
    }
}

fn be_u64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0_u64, |acc, b| (acc << 8) | u64::from(*b))
}

impl RangeModifier {
    /// 构造区间修饰器。
    ///
    /// 递增/递减模式下宽度取自 `start`，`step` 与 `mask` 必须等长；
    /// 随机模式只看 `mask` 的长度，`start`/`step` 可以为空。
    pub fn new(
        start: &[u8],
        step: &[u8],
        mask: &[u8],
        recycle: u64,
        stutter: u64,
        mode: RangeMode,
    ) -> Result<Self, ModifierError> {
        let width = match mode {
            RangeMode::Shuffle => return Err(ModifierError::UnsupportedMode(mode)),
            RangeMode::Random => {
                check_width(mask.len())?;
                mask.len()
            }
            RangeMode::Incr | RangeMode::Decr => {
                check_width(start.len())?;
                check_len("step", step, start.len())?;
                check_len("mask", mask, start.len())?;
                start.len()
            }
        };

        let (start, step) = match mode {
            RangeMode::Random => (0, 0),
            _ => (be_u64(start), be_u64(step)),
        };

        Ok(Self {
            width,
            start,
            step,
            mask: mask.to_vec(),
            recycle,
            stutter,
            mode,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn mask(&self) -> &[u8] {
        &self.mask
    }

    pub fn mode(&self) -> RangeMode {
        self.mode
    }

    pub fn period(&self) -> Option<u64> {
        if self.recycle == 0 {
            None
        } else {
            Some(self.recycle.saturating_mul(self.stutter.saturating_add(1)))
        }
    }

    fn width_mask(&self) -> u64 {
        if self.width >= 8 {
            u64::MAX
        } else {
            (1_u64 << (self.width * 8)) - 1
        }
    }

    /// 有效游标 `cursor` 处的整数取值。`draw_seed` 仅随机模式使用。
    ///
    /// 随机模式下 `recycle == 0` 表示只抽一次：任何游标都给出第 0 次抽样。
    pub fn value_at(&self, cursor: u64, draw_seed: u64) -> u64 {
        let idx = step_index(cursor, self.stutter, self.recycle);
        let raw = match self.mode {
            RangeMode::Incr => self.start.wrapping_add(idx.wrapping_mul(self.step)),
            RangeMode::Decr => self.start.wrapping_sub(idx.wrapping_mul(self.step)),
            RangeMode::Random | RangeMode::Shuffle if self.recycle == 0 => {
                random_draw(draw_seed, 0)
            }
            RangeMode::Random | RangeMode::Shuffle => random_draw(draw_seed, idx),
        };
        raw & self.width_mask()
    }

    pub fn write_at(&self, cursor: u64, draw_seed: u64, out: &mut [u8], reverse: bool) -> usize {
        write_be(self.value_at(cursor, draw_seed), self.width, out, reverse)
    }
}

/// 每个取值序号独立播种一次，保证任意跳转后取值一致。
fn random_draw(draw_seed: u64, idx: u64) -> u64 {
    let mut rng = ChaCha8Rng::seed_from_u64(mix(draw_seed, idx));
    rng.next_u64()
}

/// splitmix64 风格的混合
pub(crate) fn mix(a: u64, b: u64) -> u64 {
    let mut z = a ^ b.wrapping_add(0x9e37_79b9_7f4a_7c15).rotate_left(17);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
