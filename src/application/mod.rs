pub mod bootstrap;
pub mod commands;
pub mod route_overlay;
pub mod schedule_store;
pub mod session;
