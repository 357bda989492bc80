pub mod models;
pub mod timeline;
