pub mod api;
pub mod attendance;
pub mod board;
pub mod db;
pub mod error;
pub mod kats_api;
pub mod models;
pub mod services;
pub mod session;
pub mod state;
