//! 表格修饰器
//!
//! 按顺序轮转若干行，每行保持 `stutter + 1` 轮；行长度可以互不相同。

use super::step_index;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableModifier {
    rows: Vec<Vec<u8>>,
    stutter: u64,
}

impl TableModifier {
    pub fn new(rows: Vec<Vec<u8>>, stutter: u64) -> Self {
        Self { rows, stutter }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 当前行；空表返回 None
    pub fn row_at(&self, cursor: u64) -> Option<&[u8]> {
        if self.rows.is_empty() {
            return None;
        }
        let idx = step_index(cursor, self.stutter, self.rows.len() as u64);
        self.rows.get(idx as usize).map(Vec::as_slice)
    }

    pub fn period(&self) -> Option<u64> {
        if self.rows.is_empty() {
            None
        } else {
            Some((self.rows.len() as u64).saturating_mul(self.stutter.saturating_add(1)))
        }
    }

    pub fn write_at(&self, cursor: u64, out: &mut [u8], reverse: bool) -> usize {
        let Some(row) = self.row_at(cursor) else {
            return 0;
        };
        let n = row.len().min(out.len());
        if reverse {
            for (dst, b) in out.iter_mut().zip(row.iter().rev()).take(n) {
                *dst = *b;
            }
        } else {
            out[..n].copy_from_slice(&row[..n]);
        }
        n
    }
}
