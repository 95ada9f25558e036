// src/commands/mod.rs
//! Command handlers for the romforge CLI

mod convert;
mod detect;
mod info;
mod tools;

pub use convert::cmd_convert;
pub use detect::cmd_detect;
pub use info::cmd_info;
pub use tools::cmd_tools;
