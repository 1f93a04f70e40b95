pub mod config;
pub mod env_utils;
pub mod lead_structs;
pub mod utils;
