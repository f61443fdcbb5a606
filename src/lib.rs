//! # doc-inquiry
//!
//! A conversational front end for retrieval-augmented question answering
//! over a document corpus. Each user turn is rewritten against the
//! conversation, expanded into several search queries, grounded in the
//! retrieved passages, and answered either as a document search (where is
//! this covered?) or as an inquiry (what do the documents say?).
//!
//! ## Architecture
//!
//! One turn runs as a staged pipeline and commits all-or-nothing:
//!
//! ```text
//!                      ┌──────────────────────┐
//!                      │  User utterance      │
//!                      │  + mode              │
//!                      └──────────┬───────────┘
//!                                 │
//!                                 ▼
//!                      ┌──────────────────────┐
//!                      │  Query Rewriter      │  raw history
//!                      │  (LLM, skipped when  │◄─────────────
//!                      │   history is empty)  │
//!                      └──────────┬───────────┘
//!                                 │ standalone query
//!                                 ▼
//!                      ┌──────────────────────┐
//!                      │  Query Expansion     │
//!                      │  (LLM: N alt)        │
//!                      └──────────┬───────────┘
//!                                 │ original + N variants
//!            ┌────────────────────┼────────────────────┐
//!            ▼                    ▼                    ▼
//!     ┌─────────────┐      ┌─────────────┐      ┌─────────────┐
//!     │ Retrieve Q0 │      │ Retrieve Q1 │      │ Retrieve QN │
//!     │  (timeout)  │      │  (timeout)  │      │  (timeout)  │
//!     └──────┬──────┘      └──────┬──────┘      └──────┬──────┘
//!            └────────────────────┼────────────────────┘
//!                                 │ merged in issued order
//!                                 ▼
//!                      ┌──────────────────────┐
//!                      │  Dedup by            │
//!                      │  (text, source)      │
//!                      │  keep max score      │
//!                      └──────────┬───────────┘
//!                                 │ passages
//!                                 ▼
//!                      ┌──────────────────────┐
//!                      │  Answer Synthesizer  │  display history
//!                      │  mode template,      │◄─────────────
//!                      │  original utterance  │
//!                      └──────────┬───────────┘
//!                                 │
//!                                 ▼
//!                      ┌──────────────────────┐
//!                      │  Commit both         │
//!                      │  histories, or       │
//!                      │  nothing             │
//!                      └──────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, LLM and pipeline settings
//! - [`models`] - Shared data types: `Passage`, `PassageSet`, `Turn`, `LlmResponse`, request/response types
//! - [`error`] - Pipeline error taxonomy, turn stages and user-facing error messages
//! - [`session`] - Per-conversation state with paired histories and turn tickets
//! - [`orchestrator`] - Runs a turn through rewrite, retrieval and synthesis and commits it
//! - [`llm::rewrite`] - History-aware rewrite of follow-ups into standalone queries
//! - [`llm::query_expand`] - LLM-powered query expansion
//! - [`llm::synthesize`] - Grounded answer synthesis for both modes
//! - [`llm::client`] - Chat completions via Ollama or OpenAI-compatible APIs
//! - [`search::multi_query`] - Concurrent multi-query retrieval with deterministic merge
//! - [`search::vector`] - In-memory vector store with cosine similarity
//! - [`api`] - Axum HTTP handlers for sessions and turns
//! - [`state`] - Shared application state holding sessions, config and capabilities

pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod search;
pub mod session;
pub mod state;
