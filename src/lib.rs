pub mod collaborators;
pub mod error;
pub mod funda;
pub mod identifier;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod reconcile;
pub mod repository;
pub mod tui;
