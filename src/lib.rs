pub mod ai;
pub mod app;
pub mod capture;
pub mod commands;
pub mod events;
pub mod scan;
pub mod settings;
pub mod signs;
pub mod store;
pub mod training;

pub use app::{App, AppOptions};
