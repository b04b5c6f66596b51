//! Inter-process communication: bounded message channels and the poll /
//! timer surface built on them.

pub mod channel;
pub mod poll;
