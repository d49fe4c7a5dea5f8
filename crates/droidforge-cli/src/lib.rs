//! Library half of the `droidforge` binary, so integration tests can drive
//! the commands without spawning a process.

pub mod commands;
