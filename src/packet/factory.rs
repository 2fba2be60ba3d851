//! 组包
//!
//! 纯函数：模板 + 变量表 + 覆盖值 + 修饰器 -> 一次发送的字节。

use super::template::{PacketTemplate, VarValues, Variable};
use crate::error::{Error, Result};
use crate::modifier::ModifierBlock;
use std::borrow::Cow;
use tracing::trace;

/// 绑定到某个 flow 的组包上下文。
#[derive(Debug, Clone, Copy)]
pub struct PacketFactory<'a> {
    flow_idx: usize,
    variables: &'a [Variable],
    var_values: &'a VarValues,
    modifiers: &'a ModifierBlock,
}

impl<'a> PacketFactory<'a> {
    pub fn new(
        flow_idx: usize,
        variables: &'a [Variable],
        var_values: &'a VarValues,
        modifiers: &'a ModifierBlock,
    ) -> Self {
        Self {
            flow_idx,
            variables,
            var_values,
            modifiers,
        }
    }

    /// 变量的源字节：覆盖值优先，其次默认值；定长变量的覆盖值对齐到默认长度。
    fn source(&self, var_idx: usize) -> Option<Cow<'a, [u8]>> {
        let var = self.variables.get(var_idx)?;
        let Some(value) = self.var_values.get(&var_idx) else {
            return Some(Cow::Borrowed(var.default.as_slice()));
        };
        if var.fixed_length && value.len() != var.default.len() {
            let mut v = value.clone();
            v.resize(var.default.len(), 0);
            return Some(Cow::Owned(v));
        }
        Some(Cow::Borrowed(value.as_slice()))
    }

    fn field_len(&self, var_idx: usize) -> usize {
        match self.modifiers.get_size(self.flow_idx, var_idx) {
            0 => self.source(var_idx).map_or(0, |s| s.len()),
            w => w,
        }
    }

    /// 预测 `build` 输出长度
    pub fn calculate_size(&self, pkt: &PacketTemplate) -> usize {
        pkt.targets()
            .iter()
            .fold(pkt.len(), |acc, t| acc.saturating_add(self.field_len(t.var_idx)))
    }

    /// 生成发送缓冲区。
    ///
    /// 插入点偏移落在已拷贝的模板字节之前（或超出模板）视为模板损坏，返回错误。
    pub fn build(&self, pkt_idx: usize, pkt: &PacketTemplate) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.calculate_size(pkt));
        let mut cursor = 0_usize;

        for t in pkt.targets() {
            if t.offset < cursor || t.offset > pkt.data.len() {
                return Err(Error::MalformedTemplate {
                    pkt_idx,
                    offset: t.offset,
                    cursor,
                });
            }
            out.extend_from_slice(&pkt.data[cursor..t.offset]);
            cursor = t.offset;

            let (Some(var), Some(src)) = (self.variables.get(t.var_idx), self.source(t.var_idx))
            else {
                return Err(Error::UnknownVariable {
                    pkt_idx,
                    var_idx: t.var_idx,
                });
            };
            let little = var.endian.is_little();

            let mut field: Vec<u8> = if little {
                src.iter().rev().copied().collect()
            } else {
                src.into_owned()
            };

            let width = self.modifiers.get_size(self.flow_idx, t.var_idx);
            if width > 0 {
                // 源宽度与修饰器宽度不一致时，按写出顺序截断或补零到修饰器宽度
                field.resize(width, 0);
                self.overlay(t.var_idx, &mut field, little);
            }

            trace!(pkt_idx, offset = t.offset, var_idx = t.var_idx, len = field.len(), "写入变量");
            out.extend_from_slice(&field);
        }

        out.extend_from_slice(&pkt.data[cursor..]);
        Ok(out)
    }

    /// 按掩码把修饰器取值叠加到字段上：`(b & !m) | (v & m)`
    fn overlay(&self, var_idx: usize, field: &mut [u8], little: bool) {
        let mut value = vec![0_u8; field.len()];
        self.modifiers
            .get_value(self.flow_idx, var_idx, &mut value, little);

        let mask: Vec<u8> = match self.modifiers.mask(self.flow_idx, var_idx) {
            Some(m) if little => m.iter().rev().copied().collect(),
            Some(m) => m.to_vec(),
            None => vec![0xff; field.len()],
        };

        for (i, b) in field.iter_mut().enumerate() {
            let m = mask.get(i).copied().unwrap_or(0xff);
            *b = (*b & !m) | (value[i] & m);
        }
    }
}
