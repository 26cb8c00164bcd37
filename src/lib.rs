pub mod api;
pub mod app;
pub mod config;
pub mod dashboard;
pub mod push;
pub mod runtime;
pub mod session;
pub mod shared;
pub mod tui;
