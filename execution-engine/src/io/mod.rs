//! Process edges used by the binary: CLI arguments, operator commands, paper replay.

pub mod admin;
pub mod args;
pub mod replay;
