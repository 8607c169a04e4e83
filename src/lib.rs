pub mod errors;
pub mod flags;
pub mod table;

pub mod database;
pub mod server;
pub mod services;
pub mod store;
