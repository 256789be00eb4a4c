pub mod app;
pub mod config;
pub mod discovery;
pub mod error;
pub mod favorites;
pub mod models;
pub mod overview;
pub mod storage;
pub mod tmdb;
pub mod utils;
