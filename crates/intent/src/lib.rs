//! Natural-language front half of the command pipeline: resolution,
//! multi-step planning, reasoning over plans, autocorrect and retrieval.

pub mod assist;
pub mod embedding;
pub mod graph;
pub mod reasoning;
pub mod resolver;
pub mod retrieval;
pub mod system;

pub use assist::{AutoCorrection, SmartAssist, levenshtein, similarity};
pub use embedding::{CachedHealth, Embedder, EmbeddingHealth, NoEmbedder};
pub use graph::{IntentGraph, IntentGraphPlanner, IntentStep, StepType};
pub use reasoning::{DecisionMode, ReasoningDecision, ReasoningEngine, ReasoningPlan};
pub use resolver::{IntentResolution, IntentResolver, ResolutionReason, normalize_shortcuts};
pub use retrieval::{ContextEntry, RetrievalOptimizer, TtlCache};
pub use system::{SystemIntentMapper, SystemPlan};
