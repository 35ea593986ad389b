pub use rusqlite;

pub mod db;
pub mod history;
pub mod log_file;
pub mod models;
