//! DivCon Oracle - LLM-backed implementation of the pipeline's text oracle.
//!
//! This crate provides:
//! - A chat-completion [`Provider`] abstraction with an OpenAI-compatible client
//! - Prompt templates for topic discovery, classification, axis discovery,
//!   anchor generation and scoring
//! - Lenient parsing of JSON replies into pipeline records
//! - [`LlmOracle`], which ties the three together behind `divcon_core::Oracle`

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod llm;
pub mod parse;
pub mod prompts;
pub mod provider;

pub use llm::LlmOracle;
pub use provider::{ChatRequest, ChatResponse, Message, OpenAIProvider, Provider, ProviderError};
