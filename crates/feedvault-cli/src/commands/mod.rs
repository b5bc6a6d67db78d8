pub mod config;
pub mod queue;
pub mod run;
pub mod session;
pub mod status;
pub mod sync;
