pub mod ai;
pub mod config;
pub mod db;
pub mod http;
pub mod model;
pub mod pipeline;
pub mod worker;
