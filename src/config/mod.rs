//! playlist 配置文档
//!
//! JSON 文档（`PlaylistSpec`）只描述数据；`build` 负责全部校验并生成运行期结构。

// 子模块声明
mod build;
mod spec;

// 重新导出公共接口
pub use build::{DEFAULT_LINK_LATENCY_MS, FlowEntry, LoopRange, PlaylistConfig};
pub use spec::{
    FlowSpec, LoopSpec, ModifierKindSpec, ModifierSpec, PacketLoopSpec, PacketSpec,
    PlaylistDefaults, PlaylistSpec, TargetSpec, VariableSpec,
};
