//! Resource graph builder
//!
//! Declares the resources of a stack in dependency order. Every
//! cross-reference is a typed handle handed out by the graph when the target
//! is declared, so referencing something that does not exist yet is rejected
//! at construction time instead of surfacing during provisioning.

pub mod asset;
pub mod builder;
pub mod handle;
pub mod resource;

pub use asset::{AssetError, HandlerCode};
pub use builder::{GraphShape, ResourceGraph};
pub use handle::{AlarmId, FunctionId, Handle, MetricId, RoleId, RuleId, TableId, TopicId};
pub use resource::{
    Alarm, AlarmAction, AttributeType, BillingMode, ComparisonOperator, ComputeUnit, EnvValue,
    EnvironmentBinding, ExecutionRole, Grant, KeyAttribute, MetricSeries, NotificationTopic,
    RemovalPolicy, Runtime, ScheduleRule, Statistic, Subscriber, Table, TableAccess,
};

/// Maximum function timeout accepted by the provider
pub const MAX_TIMEOUT_MINUTES: u32 = 15;

/// Graph construction errors
///
/// Every variant is a configuration error. None of them leave a usable graph
/// behind; callers abort the build and report the error as is.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("{entity}: required field '{field}' is empty")]
    EmptyField { entity: String, field: &'static str },

    #[error("'{id}': period of {period} minutes is out of range")]
    InvalidPeriod { id: String, period: u32 },

    #[error("Alarm '{id}': evaluation periods must be at least 1, got {periods}")]
    InvalidEvaluationPeriods { id: String, periods: u32 },

    #[error("Function '{id}': timeout must be between 1 and 15 minutes, got {minutes}")]
    InvalidTimeout { id: String, minutes: u32 },

    #[error("Invalid email address: '{0}'")]
    InvalidEmail(String),

    #[error("Unresolved {kind} reference #{index}")]
    UnresolvedReference { kind: &'static str, index: usize },

    #[error("Construct id '{0}' is already declared")]
    DuplicateId(String),

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),
}
