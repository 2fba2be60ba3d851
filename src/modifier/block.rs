//! 修饰器集合
//!
//! 持有一个 playlist 内全部修饰器，按 (flow, var) 索引；负责统一推进游标与联动进位。

use super::range::mix;
use super::{Modifier, ModifierError};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// 修饰器键：(flow 下标, 变量下标)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModKey {
    pub flow_idx: usize,
    pub var_idx: usize,
}

impl ModKey {
    pub fn new(flow_idx: usize, var_idx: usize) -> Self {
        Self { flow_idx, var_idx }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    modifier: Modifier,
    /// 驱动者（同一 flow 内的变量下标）：只有它回卷时本修饰器才前进一步
    driver: Option<usize>,
}

/// 修饰器块。
///
/// 联动只记录变量下标，`Clone` 出来的副本天然指向副本自己的修饰器。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifierBlock {
    seed: u64,
    cursor: u64,
    slots: BTreeMap<ModKey, Slot>,
}

impl ModifierBlock {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// 更换随机种子；只影响随机模式的取值
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, flow_idx: usize, var_idx: usize) -> bool {
        self.slots.contains_key(&ModKey::new(flow_idx, var_idx))
    }

    pub fn insert(
        &mut self,
        flow_idx: usize,
        var_idx: usize,
        modifier: Modifier,
    ) -> Result<(), ModifierError> {
        let key = ModKey::new(flow_idx, var_idx);
        if self.slots.contains_key(&key) {
            return Err(ModifierError::Duplicate);
        }
        self.slots.insert(
            key,
            Slot {
                modifier,
                driver: None,
            },
        );
        Ok(())
    }

    /// 让 `var_idx` 的修饰器只在 `driver_var` 的修饰器回卷时前进（里程表式进位）。
    pub fn link(
        &mut self,
        flow_idx: usize,
        var_idx: usize,
        driver_var: usize,
    ) -> Result<(), ModifierError> {
        let key = ModKey::new(flow_idx, var_idx);
        if !self.slots.contains_key(&ModKey::new(flow_idx, driver_var)) {
            return Err(ModifierError::Missing(driver_var));
        }
        if !self.slots.contains_key(&key) {
            return Err(ModifierError::Missing(var_idx));
        }

        // 沿驱动链向上走，回到自己即成环
        let mut walk = Some(driver_var);
        while let Some(v) = walk {
            if v == var_idx {
                return Err(ModifierError::LinkCycle(driver_var));
            }
            walk = self
                .slots
                .get(&ModKey::new(flow_idx, v))
                .and_then(|s| s.driver);
        }

        if let Some(slot) = self.slots.get_mut(&key) {
            slot.driver = Some(driver_var);
        }
        debug!(flow_idx, var_idx, driver_var, "修饰器联动");
        Ok(())
    }

    /// 推进一轮
    pub fn next(&mut self) {
        self.cursor = self.cursor.wrapping_add(1);
        trace!(cursor = self.cursor, "修饰器游标前进");
    }

    /// 直接定位到第 `n` 轮
    pub fn set_cursor(&mut self, n: u64) {
        self.cursor = n;
        trace!(cursor = n, "修饰器游标定位");
    }

    /// 字段宽度；0 表示该变量没有修饰器（或表格为空）。
    pub fn get_size(&self, flow_idx: usize, var_idx: usize) -> usize {
        let key = ModKey::new(flow_idx, var_idx);
        self.slots
            .get(&key)
            .map_or(0, |s| s.modifier.size_at(self.effective_cursor(key)))
    }

    /// 写入本轮取值，返回写入字节数。`reverse` 为 true 时最高字节写在最后（小端摆放）。
    pub fn get_value(&self, flow_idx: usize, var_idx: usize, out: &mut [u8], reverse: bool) -> usize {
        let key = ModKey::new(flow_idx, var_idx);
        let Some(slot) = self.slots.get(&key) else {
            return 0;
        };
        let cursor = self.effective_cursor(key);
        slot.modifier
            .write_at(cursor, self.draw_seed(key), out, reverse)
    }

    /// 掩码（大端顺序）；None 表示整体覆盖
    pub fn mask(&self, flow_idx: usize, var_idx: usize) -> Option<&[u8]> {
        self.slots
            .get(&ModKey::new(flow_idx, var_idx))
            .and_then(|s| s.modifier.mask())
    }

    /// 某个修饰器实际看到的游标：根修饰器即块游标，被联动者为驱动者游标除以驱动者周期。
    pub fn effective_cursor(&self, key: ModKey) -> u64 {
        let Some(driver) = self.slots.get(&key).and_then(|s| s.driver) else {
            return self.cursor;
        };
        let driver_key = ModKey::new(key.flow_idx, driver);
        let driver_cursor = self.effective_cursor(driver_key);
        match self.slots.get(&driver_key).and_then(|s| s.modifier.period()) {
            Some(period) if period > 0 => driver_cursor / period,
            _ => 0,
        }
    }

    fn draw_seed(&self, key: ModKey) -> u64 {
        mix(mix(self.seed, key.flow_idx as u64), key.var_idx as u64)
    }
}
