//! 数据包模板与组包
//!
//! 模板在配置期构建后不再修改；每次发送时由 `PacketFactory` 结合变量默认值、
//! 本次运行的覆盖值与修饰器生成最终字节。

// 子模块声明
mod factory;
mod template;

// 重新导出公共接口
pub use factory::PacketFactory;
pub use template::{
    ATTACK_DEFAULT_RESPONSE, Endian, LoopInfo, PacketTemplate, VarTarget, VarValues, Variable,
};
