//! Resource declarations
//!
//! Plain data describing each cloud resource. Nothing here talks to a
//! provider; the values are assembled by [`ResourceGraph`](super::ResourceGraph)
//! and rendered later by the template module.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::asset::HandlerCode;
use super::handle::{FunctionId, MetricId, RoleId, TableId, TopicId};

/// What happens to a resource when the stack is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalPolicy {
    #[default]
    Destroy,
}

impl RemovalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "Delete",
        }
    }
}

/// Identity assumed by compute units
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRole {
    pub id: String,
    /// Service principal allowed to assume the role
    pub principal: String,
    /// Provider-managed policy names, e.g. `CloudWatchFullAccess`
    pub managed_policies: Vec<String>,
    pub removal: RemovalPolicy,
}

/// Function runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Runtime {
    #[default]
    #[serde(rename = "python3.8")]
    Python38,
    #[serde(rename = "python3.12")]
    Python312,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Python38 => "python3.8",
            Runtime::Python312 => "python3.12",
        }
    }
}

/// Value injected into a function's environment
#[derive(Debug, Clone, PartialEq)]
pub enum EnvValue {
    Literal(String),
    /// The generated name of a table, known only once the table is declared
    TableName(TableId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentBinding {
    pub key: String,
    pub value: EnvValue,
}

/// A named unit of logic
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeUnit {
    pub id: String,
    /// `module.function` entry point inside the code asset
    pub handler: String,
    pub code: HandlerCode,
    pub runtime: Runtime,
    pub role: RoleId,
    pub timeout_minutes: u32,
    pub environment: Vec<EnvironmentBinding>,
    pub removal: RemovalPolicy,
}

/// Recurring trigger with exactly one target
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRule {
    pub id: String,
    pub period_minutes: u32,
    pub target: FunctionId,
    pub removal: RemovalPolicy,
}

impl ScheduleRule {
    /// Rate expression understood by the event scheduler
    pub fn schedule_expression(&self) -> String {
        if self.period_minutes == 1 {
            "rate(1 minute)".to_string()
        } else {
            format!("rate({} minutes)", self.period_minutes)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::String => "S",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyAttribute {
    pub name: String,
    pub kind: AttributeType,
}

impl KeyAttribute {
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttributeType::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BillingMode {
    /// On-demand capacity, no provisioned throughput
    #[default]
    PayPerRequest,
}

impl BillingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingMode::PayPerRequest => "PAY_PER_REQUEST",
        }
    }
}

/// Level of table access handed to a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableAccess {
    Full,
    ReadWrite,
}

impl TableAccess {
    /// IAM actions covered by this access level
    pub fn actions(&self) -> Vec<&'static str> {
        match self {
            TableAccess::Full => vec!["dynamodb:*"],
            TableAccess::ReadWrite => vec![
                "dynamodb:BatchGetItem",
                "dynamodb:BatchWriteItem",
                "dynamodb:ConditionCheckItem",
                "dynamodb:DeleteItem",
                "dynamodb:DescribeTable",
                "dynamodb:GetItem",
                "dynamodb:PutItem",
                "dynamodb:Query",
                "dynamodb:Scan",
                "dynamodb:UpdateItem",
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    pub grantee: FunctionId,
    pub access: TableAccess,
}

/// Persistent keyed storage
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub id: String,
    pub partition_key: KeyAttribute,
    pub sort_key: KeyAttribute,
    pub billing_mode: BillingMode,
    pub grants: Vec<Grant>,
    pub removal: RemovalPolicy,
}

/// Receiver of topic notifications
#[derive(Debug, Clone, PartialEq)]
pub enum Subscriber {
    Email(String),
    Function(FunctionId),
}

impl Subscriber {
    pub fn protocol(&self) -> &'static str {
        match self {
            Subscriber::Email(_) => "email",
            Subscriber::Function(_) => "lambda",
        }
    }
}

/// Fan-out channel
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationTopic {
    pub id: String,
    pub subscribers: Vec<Subscriber>,
    pub removal: RemovalPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Statistic {
    #[default]
    Average,
    Sum,
    Minimum,
    Maximum,
    SampleCount,
}

impl Statistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Average => "Average",
            Statistic::Sum => "Sum",
            Statistic::Minimum => "Minimum",
            Statistic::Maximum => "Maximum",
            Statistic::SampleCount => "SampleCount",
        }
    }
}

/// Metric identified by namespace, name and dimensions
///
/// The monitored workload publishes the data points; the series is declared
/// here only so alarms can be attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub namespace: String,
    pub name: String,
    pub dimensions: BTreeMap<String, String>,
    pub statistic: Statistic,
    pub period_minutes: u32,
}

impl MetricSeries {
    pub fn new<K, V>(
        namespace: impl Into<String>,
        name: impl Into<String>,
        dimensions: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            dimensions: dimensions
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            statistic: Statistic::default(),
            period_minutes: 5,
        }
    }

    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = statistic;
        self
    }

    pub fn with_period_minutes(mut self, minutes: u32) -> Self {
        self.period_minutes = minutes;
        self
    }

    /// Period in seconds as rendered, `None` if it does not fit in `u32`
    pub fn period_seconds(&self) -> Option<u32> {
        self.period_minutes.checked_mul(60)
    }

    pub fn dimension(&self, key: &str) -> Option<&str> {
        self.dimensions.get(key).map(String::as_str)
    }

    /// Stable human-readable label, e.g. `WebHealth/url_latency[URL=https://example.com]`
    pub fn label(&self) -> String {
        let dims = self
            .dimensions
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}/{}[{}]", self.namespace, self.name, dims)
    }
}

/// Alarm comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    GreaterThanThreshold,
    GreaterThanOrEqualToThreshold,
    LessThanThreshold,
    LessThanOrEqualToThreshold,
}

impl ComparisonOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThanThreshold => "GreaterThanThreshold",
            ComparisonOperator::GreaterThanOrEqualToThreshold => "GreaterThanOrEqualToThreshold",
            ComparisonOperator::LessThanThreshold => "LessThanThreshold",
            ComparisonOperator::LessThanOrEqualToThreshold => "LessThanOrEqualToThreshold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmAction {
    PublishToTopic(TopicId),
}

/// Alarm watching one metric series
#[derive(Debug, Clone, PartialEq)]
pub struct Alarm {
    pub id: String,
    pub metric: MetricId,
    pub threshold: f64,
    pub operator: ComparisonOperator,
    /// Consecutive breaching periods required before firing
    pub evaluation_periods: u32,
    pub actions: Vec<AlarmAction>,
    pub removal: RemovalPolicy,
}
