pub mod cli;
pub mod config;
pub mod core;
pub mod decision;
pub mod engine;
pub mod exit;
pub mod filter;
pub mod handler;
pub mod logs;
pub mod platform;
pub mod scanner;
pub mod server;
pub mod ui;
