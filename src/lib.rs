pub mod analysis;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod schema;
pub mod table;
