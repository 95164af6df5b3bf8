//! Core domain for the Nexus agent.
//!
//! Everything the orchestration loop needs that is not wire-protocol or HTTP
//! routing lives here: the staged-action model and its validation, the
//! propose/approve/execute stores, the identity-context cache, the seam to the
//! upstream marketing API, the multi-step action executor, and configuration.
//!
//! # Safety Principle
//!
//! The LLM never mutates the upstream account directly. Every write is staged
//! as a [`actions::PendingAction`] and only executed after a human approves
//! the specific staged parameters.

pub mod actions;
pub mod config;
pub mod execution;
pub mod identity;
pub mod marketing;
pub mod store;

pub use actions::{
    ActionParams, ActionParamsError, ActionType, ApprovalId, PendingAction,
    DEFAULT_VIP_MIN_SPEND, DEFAULT_VIP_SEED_COUNT,
};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};
pub use execution::{ActionExecutor, ExecutionError, ExecutionOutcome};
pub use identity::{AccessToken, IdentityKey};
pub use marketing::{
    CampaignSpec, CreatedCampaign, CreatedList, CreatedProfile, CreatedTemplate, MarketingApi,
    SeedProfile, TemplateSpec, UpstreamError,
};
pub use store::{
    IdentityContextStore, InMemoryIdentityContextStore, InMemoryPendingActionStore,
    PendingActionStore,
};
