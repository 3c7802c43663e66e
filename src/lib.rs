pub mod api;
pub mod config;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod routing;
pub mod server;
pub mod types;

pub use dispatcher::Dispatcher;
