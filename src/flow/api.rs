//! Read-only view of the owning playlist used by flows while handling events.

use crate::modifier::ModifierBlock;
use crate::packet::VarValues;

pub trait PlaylistApi {
    fn modifiers(&self) -> &ModifierBlock;
    fn var_values(&self, flow_idx: usize) -> &VarValues;
    /// True once a stop has been pre-announced; no new send timers are armed after that.
    fn pre_stop(&self) -> bool;
}
