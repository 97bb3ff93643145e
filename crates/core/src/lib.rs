pub mod classifier;
pub mod config;
pub mod domain;
pub mod errors;
pub mod memory;
pub mod policy;
pub mod rules;

pub use classifier::{classify, Classification, Topic};
pub use domain::conversation::{Conversation, Speaker, Turn};
pub use domain::scenario::{Difficulty, Scenario, Vertical};
pub use errors::{ApplicationError, DomainError};
pub use memory::{build_memory, Memory};
pub use policy::{decide, CapTable, ObjectionCaps, PivotScope, PolicyDecision};
pub use rules::{RuleBook, RuleBookError};
