//! Health Butler backend library
//!
//! A Discord nutrition and fitness assistant: interactions arrive over HTTP,
//! a coordinator agent routes them to nutrition and fitness specialists
//! backed by a hosted multimodal model, and results are stored in Postgres.
//!
//! Modules are exposed for the binary and the integration tests.

pub mod agents;
pub mod cache;
pub mod config;
pub mod db;
pub mod discord;
pub mod error;
pub mod llm;
pub mod rag;
pub mod repositories;
pub mod routes;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod swarm;
pub mod vision;
