//! CRM AI Enhancement Library
//!
//! Adds AI analysis to CRM opportunities: k-means customer segmentation,
//! heuristic deal scoring, next best action recommendations and gift
//! suggestions for won deals, both generated through an OpenAI-compatible API.
//!
//! # Modules
//!
//! - `api`: HTTP handlers and the scheduler.
//! - `core`: Core business logic.
//! - `data`: Record store access.
//! - `integrations`: Text-generation client and prompts.
//! - `analysis`: Orchestration of one AI analysis run.
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Opportunity store trait and its Postgres implementation.
//! - `memory_store`: In-memory opportunity store.
//! - `errors`: Error handling types.
//! - `gifts`: Gift workflow for won deals.
//! - `handlers`: HTTP request handlers.
//! - `llm_client`: OpenAI chat completions client.
//! - `models`: Core data models.
//! - `prompts`: Prompt text.
//! - `recommendation`: Next best action generation.
//! - `scheduler`: Periodic analysis runs.
//! - `scoring`: Deal score.
//! - `segmentation`: Standard scaling and k-means.

pub mod api;
pub mod core;
pub mod data;
pub mod integrations;

pub mod analysis;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod gifts;
pub mod handlers;
pub mod llm_client;
pub mod memory_store;
pub mod models;
pub mod prompts;
pub mod recommendation;
pub mod scheduler;
pub mod scoring;
pub mod segmentation;
