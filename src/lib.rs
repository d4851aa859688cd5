//! # layershift: layered codebase converter
//!
//! Scans a Java codebase organized in layers (controllers, services, DAOs,
//! models), records a structural knowledge base of it, and converts each unit
//! to a Node.js module by delegating chunk translation to an LLM provider.
//!
//! ## Architecture
//!
//! - **[`config`]**: Configuration loading, validation, and environment overrides
//! - **[`analysis`]**: Source scanning, Tree-sitter classification, knowledge base
//! - **[`convert`]**: Chunking, retrying orchestration, response sanitizing, merging
//! - **[`provider`]**: LLM backends (Ollama, Gemini, scripted) behind one trait
//! - **[`pipeline`]**: Analyze and convert runs with per-unit failure reporting

pub mod analysis;
pub mod config;
pub mod convert;
pub mod pipeline;
pub mod provider;
