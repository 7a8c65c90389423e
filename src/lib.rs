pub mod core;
pub mod example;
pub mod inmemory_db;
pub mod server;
pub mod telemetry;
pub mod testing;
