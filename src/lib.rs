pub mod cli;
pub mod config;
pub mod engine;
pub mod interpret;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod util;
