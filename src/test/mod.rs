mod flow_loop;
mod replay;
mod sim_time;
mod stream_flow;

use crate::flow::PlaylistApi;
use crate::modifier::ModifierBlock;
use crate::packet::VarValues;

/// 流测试用的 playlist 替身：只提供只读状态，不做任何编排。
#[derive(Debug, Default)]
pub(crate) struct MockPlaylist {
    pub(crate) modifiers: ModifierBlock,
    pub(crate) values: VarValues,
    pub(crate) pre_stop: bool,
}

impl PlaylistApi for MockPlaylist {
    fn modifiers(&self) -> &ModifierBlock {
        &self.modifiers
    }

    fn var_values(&self, _flow_idx: usize) -> &VarValues {
        &self.values
    }

    fn pre_stop(&self) -> bool {
        self.pre_stop
    }
}
