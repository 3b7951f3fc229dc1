pub mod config;
pub mod launcher;
pub mod python_env;
pub mod utils;
