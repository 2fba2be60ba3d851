//! 世界 trait
//!
//! 定义仿真世界接口。

use std::any::Any;

/// 仿真世界：由回放层实现，事件执行时通过 `as_any_mut` 向下转型取回具体类型。
pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
