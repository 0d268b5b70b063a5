//! Side-effecting collaborators: config, audit files, and child processes.

pub mod audit;
pub mod config;
pub mod init;
pub mod invoker;
pub mod oracle;
pub mod process;
