pub mod db;
pub mod settings;
pub mod types;
