pub mod compare;
pub mod completions;
pub mod config;
pub mod list;
pub mod session;
pub mod sync;
pub mod workflow;
