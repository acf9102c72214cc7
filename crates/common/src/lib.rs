pub mod config;
pub mod db;
pub mod error;
pub mod observability;
pub mod subgraph;
pub mod types;
