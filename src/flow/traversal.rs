//! 包下标循环遍历
//!
//! 给定一个下标序列（stream 流为完整包序列，attack 流为单方向的载荷下标表）
//! 和包上的循环标记，计算“处理完位置 `pos` 之后的下一个位置”。
//! 用一个计数栈支持嵌套循环。

use crate::packet::PacketTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoopFrame {
    /// 循环结束包的下标
    loop_id: usize,
    remaining: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PktLoopTraversal {
    frames: Vec<LoopFrame>,
    current: Option<usize>,
}

impl PktLoopTraversal {
    pub fn reset(&mut self) {
        self.frames.clear();
        self.current = None;
    }

    /// 当前所在循环（结束包下标）
    pub fn current_loop(&self) -> Option<usize> {
        self.current
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// 处理完 `seq[pos]` 之后的下一个位置；返回值 >= `seq.len()` 表示序列结束。
    pub fn next_index(&mut self, seq: &[usize], pos: usize, packets: &[PacketTemplate]) -> usize {
        let plain = pos.saturating_add(1);
        let Some(&pkt_idx) = seq.get(pos) else {
            return plain;
        };
        let Some(info) = packets.get(pkt_idx).and_then(|p| p.loop_info) else {
            return plain;
        };

        if self.current != Some(pkt_idx) {
            // 首次到达该循环的结束包
            if info.count <= 1 {
                return plain;
            }
            self.frames.push(LoopFrame {
                loop_id: pkt_idx,
                remaining: info.count - 1,
            });
            self.current = Some(pkt_idx);
            return begin_pos(seq, info.begin, pos);
        }

        match self.frames.last_mut() {
            Some(top) if top.remaining > 1 => {
                top.remaining -= 1;
                begin_pos(seq, info.begin, pos)
            }
            _ => {
                self.frames.pop();
                self.current = self.frames.last().map(|f| f.loop_id);
                plain
            }
        }
    }
}

/// 循环起点包在序列中的位置：第一个包下标不小于 `begin` 的位置。
fn begin_pos(seq: &[usize], begin: usize, pos: usize) -> usize {
    seq.iter().position(|&i| i >= begin).unwrap_or(pos).min(pos)
}

/// 按循环展开后序列实际播放的包数
pub fn count_plays(seq: &[usize], packets: &[PacketTemplate]) -> usize {
    let mut traversal = PktLoopTraversal::default();
    let mut pos = 0;
    let mut plays = 0_usize;
    while pos < seq.len() {
        plays = plays.saturating_add(1);
        pos = traversal.next_index(seq, pos, packets);
    }
    plays
}
