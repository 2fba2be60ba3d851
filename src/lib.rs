pub mod config;
pub mod error;
pub mod flow;
pub mod group;
pub mod modifier;
pub mod packet;
pub mod replay;
pub mod sim;

pub use error::{Error, Result};

#[cfg(test)]
mod test;
