//! Buyer runtime for the negotiation simulator.
//!
//! This crate turns a conversation into the simulated buyer's next line:
//! - Builds prompts and calls the configured chat model (`llm`, `prompts`)
//! - Wraps the model behind a fallible `CandidateGenerator` (`generator`)
//! - Rewrites drafts through the deterministic guardrail pipeline (`guardrails`)
//! - Orchestrates one request end to end (`runtime`)
//!
//! The model only ever proposes text. Objection caps, acceptance and every rewrite are
//! decided by the rule layer in `pitchsim-core` and this crate's guardrails.

pub mod generator;
pub mod guardrails;
pub mod lines;
pub mod llm;
pub mod prompts;
pub mod runtime;

pub use generator::{CandidateGenerator, OfflineGenerator, ScriptedGenerator, Unavailable};
pub use guardrails::{GuardrailPipeline, GuardrailStage};
pub use runtime::{BuyerReply, BuyerRequest, BuyerRuntime};
