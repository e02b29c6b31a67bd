use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::asset::HandlerCode;
use super::handle::{
    next_graph_id, resolve, resolve_mut, AlarmId, FunctionId, Handle, MetricId, RoleId, RuleId,
    TableId, TopicId,
};
use super::resource::{
    Alarm, AlarmAction, BillingMode, ComparisonOperator, ComputeUnit, EnvValue,
    EnvironmentBinding, ExecutionRole, Grant, KeyAttribute, MetricSeries, NotificationTopic,
    RemovalPolicy, Runtime, ScheduleRule, Subscriber, Table, TableAccess,
};
use super::{GraphError, MAX_TIMEOUT_MINUTES};

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
    })
}

/// Whether `address` looks like a deliverable email address
pub fn is_valid_email(address: &str) -> bool {
    email_regex().is_match(address)
}

/// Resource counts of a graph, independent of generated identifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphShape {
    pub roles: usize,
    pub functions: usize,
    pub rules: usize,
    pub tables: usize,
    pub grants: usize,
    pub environment_bindings: usize,
    pub topics: usize,
    pub subscriptions: usize,
    pub metrics: usize,
    pub alarms: usize,
    pub alarm_actions: usize,
}

/// In-memory declaration of a stack's resources
///
/// Built in a single forward pass. Each `build_*` call validates its inputs
/// and resolves every handle it is given before anything is recorded, so a
/// failed call leaves the graph unchanged.
#[derive(Debug)]
pub struct ResourceGraph {
    graph_id: u32,
    construct_ids: HashSet<String>,
    roles: Vec<ExecutionRole>,
    functions: Vec<ComputeUnit>,
    rules: Vec<ScheduleRule>,
    tables: Vec<Table>,
    topics: Vec<NotificationTopic>,
    metrics: Vec<MetricSeries>,
    alarms: Vec<Alarm>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self {
            graph_id: next_graph_id(),
            construct_ids: HashSet::new(),
            roles: Vec::new(),
            functions: Vec::new(),
            rules: Vec::new(),
            tables: Vec::new(),
            topics: Vec::new(),
            metrics: Vec::new(),
            alarms: Vec::new(),
        }
    }

    /// Check that a construct id is non-empty and not taken yet
    fn check_id(&self, entity: &str, id: &str) -> Result<(), GraphError> {
        if id.trim().is_empty() {
            return Err(GraphError::EmptyField {
                entity: entity.to_string(),
                field: "id",
            });
        }
        if self.construct_ids.contains(id) {
            return Err(GraphError::DuplicateId(id.to_string()));
        }
        Ok(())
    }

    /// Declare an execution role
    pub fn build_role<P>(
        &mut self,
        id: impl Into<String>,
        principal: impl Into<String>,
        managed_policies: impl IntoIterator<Item = P>,
    ) -> Result<RoleId, GraphError>
    where
        P: Into<String>,
    {
        let id = id.into();
        let principal = principal.into();
        self.check_id("Role", &id)?;
        if principal.trim().is_empty() {
            return Err(GraphError::EmptyField {
                entity: format!("Role '{}'", id),
                field: "principal",
            });
        }

        let managed_policies: Vec<String> = managed_policies.into_iter().map(Into::into).collect();
        tracing::debug!(role = %id, %principal, policies = managed_policies.len(), "Declared role");

        self.construct_ids.insert(id.clone());
        self.roles.push(ExecutionRole {
            id,
            principal,
            managed_policies,
            removal: RemovalPolicy::Destroy,
        });
        Ok(RoleId::new(self.graph_id, self.roles.len() - 1))
    }

    /// Declare a compute unit running `handler` from the code at `code_path`
    pub fn build_compute_unit(
        &mut self,
        id: impl Into<String>,
        handler: impl Into<String>,
        code_path: impl AsRef<Path>,
        role: RoleId,
        timeout_minutes: u32,
    ) -> Result<FunctionId, GraphError> {
        let id = id.into();
        let handler = handler.into();
        self.check_id("Function", &id)?;
        if handler.trim().is_empty() {
            return Err(GraphError::EmptyField {
                entity: format!("Function '{}'", id),
                field: "handler",
            });
        }
        resolve(self.graph_id, &self.roles, role)?;
        if timeout_minutes == 0 || timeout_minutes > MAX_TIMEOUT_MINUTES {
            return Err(GraphError::InvalidTimeout {
                id,
                minutes: timeout_minutes,
            });
        }

        let code = HandlerCode::from_asset(code_path)?;
        tracing::debug!(function = %id, %handler, asset = %code.hash, "Declared function");

        self.construct_ids.insert(id.clone());
        self.functions.push(ComputeUnit {
            id,
            handler,
            code,
            runtime: Runtime::default(),
            role,
            timeout_minutes,
            environment: Vec::new(),
            removal: RemovalPolicy::Destroy,
        });
        Ok(FunctionId::new(self.graph_id, self.functions.len() - 1))
    }

    /// Override the runtime of a declared function
    pub fn set_runtime(&mut self, unit: FunctionId, runtime: Runtime) -> Result<(), GraphError> {
        resolve_mut(self.graph_id, &mut self.functions, unit)?.runtime = runtime;
        Ok(())
    }

    /// Declare a recurring trigger for `target`
    pub fn build_schedule_rule(
        &mut self,
        id: impl Into<String>,
        period_minutes: u32,
        target: FunctionId,
    ) -> Result<RuleId, GraphError> {
        let id = id.into();
        self.check_id("Schedule", &id)?;
        if period_minutes == 0 {
            return Err(GraphError::InvalidPeriod {
                id,
                period: period_minutes,
            });
        }
        resolve(self.graph_id, &self.functions, target)?;

        let rule = ScheduleRule {
            id: id.clone(),
            period_minutes,
            target,
            removal: RemovalPolicy::Destroy,
        };
        tracing::debug!(
            rule = %id,
            schedule = %rule.schedule_expression(),
            "Declared schedule rule"
        );

        self.construct_ids.insert(id);
        self.rules.push(rule);
        Ok(RuleId::new(self.graph_id, self.rules.len() - 1))
    }

    /// Declare an on-demand table keyed by string partition and sort keys
    pub fn build_table(
        &mut self,
        id: impl Into<String>,
        partition_key: impl Into<String>,
        sort_key: impl Into<String>,
    ) -> Result<TableId, GraphError> {
        let id = id.into();
        let partition_key = partition_key.into();
        let sort_key = sort_key.into();
        self.check_id("Table", &id)?;
        for (field, value) in [("partition_key", &partition_key), ("sort_key", &sort_key)] {
            if value.trim().is_empty() {
                return Err(GraphError::EmptyField {
                    entity: format!("Table '{}'", id),
                    field,
                });
            }
        }

        tracing::debug!(table = %id, %partition_key, %sort_key, "Declared table");

        self.construct_ids.insert(id.clone());
        self.tables.push(Table {
            id,
            partition_key: KeyAttribute::string(partition_key),
            sort_key: KeyAttribute::string(sort_key),
            billing_mode: BillingMode::PayPerRequest,
            grants: Vec::new(),
            removal: RemovalPolicy::Destroy,
        });
        Ok(TableId::new(self.graph_id, self.tables.len() - 1))
    }

    /// Grant `grantee` full read/write access to `table`
    pub fn grant_full_access(
        &mut self,
        table: TableId,
        grantee: FunctionId,
    ) -> Result<(), GraphError> {
        self.grant(table, grantee, TableAccess::Full)
    }

    /// Grant `grantee` item-level read/write access to `table`
    pub fn grant_read_write(
        &mut self,
        table: TableId,
        grantee: FunctionId,
    ) -> Result<(), GraphError> {
        self.grant(table, grantee, TableAccess::ReadWrite)
    }

    fn grant(
        &mut self,
        table: TableId,
        grantee: FunctionId,
        access: TableAccess,
    ) -> Result<(), GraphError> {
        let function = resolve(self.graph_id, &self.functions, grantee)?.id.clone();
        let table = resolve_mut(self.graph_id, &mut self.tables, table)?;
        tracing::debug!(table = %table.id, %function, ?access, "Granted table access");
        table.grants.push(Grant { grantee, access });
        Ok(())
    }

    /// Inject `key = value` into the environment of `unit`
    pub fn bind_environment(
        &mut self,
        unit: FunctionId,
        key: impl Into<String>,
        value: EnvValue,
    ) -> Result<(), GraphError> {
        let key = key.into();
        if let EnvValue::TableName(table) = &value {
            resolve(self.graph_id, &self.tables, *table)?;
        }
        let function = resolve_mut(self.graph_id, &mut self.functions, unit)?;
        if key.trim().is_empty() {
            return Err(GraphError::EmptyField {
                entity: format!("Environment of '{}'", function.id),
                field: "key",
            });
        }

        tracing::debug!(function = %function.id, %key, "Bound environment value");
        function.environment.retain(|b| b.key != key);
        function.environment.push(EnvironmentBinding { key, value });
        Ok(())
    }

    /// Declare a notification topic
    pub fn build_topic(&mut self, id: impl Into<String>) -> Result<TopicId, GraphError> {
        let id = id.into();
        self.check_id("Topic", &id)?;

        tracing::debug!(topic = %id, "Declared topic");
        self.construct_ids.insert(id.clone());
        self.topics.push(NotificationTopic {
            id,
            subscribers: Vec::new(),
            removal: RemovalPolicy::Destroy,
        });
        Ok(TopicId::new(self.graph_id, self.topics.len() - 1))
    }

    /// Add a subscriber to `topic`
    ///
    /// A topic delivers to each endpoint once; subscribing the same address
    /// or function again is a `DuplicateId`.
    pub fn subscribe(&mut self, topic: TopicId, subscriber: Subscriber) -> Result<(), GraphError> {
        let endpoint = match &subscriber {
            Subscriber::Email(address) => {
                if !is_valid_email(address) {
                    return Err(GraphError::InvalidEmail(address.clone()));
                }
                address.clone()
            }
            Subscriber::Function(unit) => {
                resolve(self.graph_id, &self.functions, *unit)?.id.clone()
            }
        };
        let topic = resolve_mut(self.graph_id, &mut self.topics, topic)?;
        if topic.subscribers.contains(&subscriber) {
            return Err(GraphError::DuplicateId(format!("{}/{}", topic.id, endpoint)));
        }

        tracing::debug!(
            topic = %topic.id,
            protocol = subscriber.protocol(),
            %endpoint,
            "Subscribed to topic"
        );
        topic.subscribers.push(subscriber);
        Ok(())
    }

    /// Declare a metric series for alarms to watch
    pub fn build_metric<K, V>(
        &mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        dimensions: impl IntoIterator<Item = (K, V)>,
    ) -> MetricId
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.push_metric(MetricSeries::new(namespace, name, dimensions))
    }

    /// Register a fully specified metric series
    ///
    /// The period must be at least one minute and fit in `u32` seconds.
    pub fn add_metric(&mut self, metric: MetricSeries) -> Result<MetricId, GraphError> {
        if metric.period_seconds().filter(|s| *s > 0).is_none() {
            return Err(GraphError::InvalidPeriod {
                id: metric.label(),
                period: metric.period_minutes,
            });
        }
        Ok(self.push_metric(metric))
    }

    fn push_metric(&mut self, metric: MetricSeries) -> MetricId {
        tracing::debug!(metric = %metric.label(), "Declared metric");
        self.metrics.push(metric);
        MetricId::new(self.graph_id, self.metrics.len() - 1)
    }

    /// Declare an alarm on `metric`
    pub fn build_alarm(
        &mut self,
        id: impl Into<String>,
        metric: MetricId,
        threshold: f64,
        operator: ComparisonOperator,
        evaluation_periods: u32,
    ) -> Result<AlarmId, GraphError> {
        let id = id.into();
        self.check_id("Alarm", &id)?;
        if evaluation_periods == 0 {
            return Err(GraphError::InvalidEvaluationPeriods {
                id,
                periods: evaluation_periods,
            });
        }
        let label = resolve(self.graph_id, &self.metrics, metric)?.label();

        tracing::debug!(
            alarm = %id,
            metric = %label,
            operator = operator.as_str(),
            threshold,
            evaluation_periods,
            "Declared alarm"
        );
        self.construct_ids.insert(id.clone());
        self.alarms.push(Alarm {
            id,
            metric,
            threshold,
            operator,
            evaluation_periods,
            actions: Vec::new(),
            removal: RemovalPolicy::Destroy,
        });
        Ok(AlarmId::new(self.graph_id, self.alarms.len() - 1))
    }

    /// Run `action` when `alarm` fires
    pub fn attach_action(&mut self, alarm: AlarmId, action: AlarmAction) -> Result<(), GraphError> {
        match action {
            AlarmAction::PublishToTopic(topic) => {
                resolve(self.graph_id, &self.topics, topic)?;
            }
        }
        let alarm = resolve_mut(self.graph_id, &mut self.alarms, alarm)?;
        alarm.actions.push(action);
        Ok(())
    }

    pub fn role(&self, id: RoleId) -> Result<&ExecutionRole, GraphError> {
        resolve(self.graph_id, &self.roles, id)
    }

    pub fn function(&self, id: FunctionId) -> Result<&ComputeUnit, GraphError> {
        resolve(self.graph_id, &self.functions, id)
    }

    pub fn rule(&self, id: RuleId) -> Result<&ScheduleRule, GraphError> {
        resolve(self.graph_id, &self.rules, id)
    }

    pub fn table(&self, id: TableId) -> Result<&Table, GraphError> {
        resolve(self.graph_id, &self.tables, id)
    }

    pub fn topic(&self, id: TopicId) -> Result<&NotificationTopic, GraphError> {
        resolve(self.graph_id, &self.topics, id)
    }

    pub fn metric(&self, id: MetricId) -> Result<&MetricSeries, GraphError> {
        resolve(self.graph_id, &self.metrics, id)
    }

    pub fn alarm(&self, id: AlarmId) -> Result<&Alarm, GraphError> {
        resolve(self.graph_id, &self.alarms, id)
    }

    pub fn roles(&self) -> &[ExecutionRole] {
        &self.roles
    }

    pub fn functions(&self) -> &[ComputeUnit] {
        &self.functions
    }

    pub fn rules(&self) -> &[ScheduleRule] {
        &self.rules
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn topics(&self) -> &[NotificationTopic] {
        &self.topics
    }

    pub fn metrics(&self) -> &[MetricSeries] {
        &self.metrics
    }

    pub fn alarms(&self) -> &[Alarm] {
        &self.alarms
    }

    /// Count every declared resource and reference
    pub fn shape(&self) -> GraphShape {
        GraphShape {
            roles: self.roles.len(),
            functions: self.functions.len(),
            rules: self.rules.len(),
            tables: self.tables.len(),
            grants: self.tables.iter().map(|t| t.grants.len()).sum(),
            environment_bindings: self.functions.iter().map(|f| f.environment.len()).sum(),
            topics: self.topics.len(),
            subscriptions: self.topics.iter().map(|t| t.subscribers.len()).sum(),
            metrics: self.metrics.len(),
            alarms: self.alarms.len(),
            alarm_actions: self.alarms.iter().map(|a| a.actions.len()).sum(),
        }
    }

    /// Every cross-reference as `(from, to)` construct ids, in declaration order
    ///
    /// Metrics have no construct id and are named by their label.
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges = Vec::new();

        for function in &self.functions {
            if let Some(role) = self.roles.get(function.role.index()) {
                edges.push((function.id.clone(), role.id.clone()));
            }
            for binding in &function.environment {
                if let EnvValue::TableName(table) = &binding.value {
                    if let Some(table) = self.tables.get(table.index()) {
                        edges.push((function.id.clone(), table.id.clone()));
                    }
                }
            }
        }
        for rule in &self.rules {
            if let Some(target) = self.functions.get(rule.target.index()) {
                edges.push((rule.id.clone(), target.id.clone()));
            }
        }
        for table in &self.tables {
            for grant in &table.grants {
                if let Some(grantee) = self.functions.get(grant.grantee.index()) {
                    edges.push((table.id.clone(), grantee.id.clone()));
                }
            }
        }
        for topic in &self.topics {
            for subscriber in &topic.subscribers {
                let target = match subscriber {
                    Subscriber::Email(address) => address.clone(),
                    Subscriber::Function(unit) => match self.functions.get(unit.index()) {
                        Some(f) => f.id.clone(),
                        None => continue,
                    },
                };
                edges.push((topic.id.clone(), target));
            }
        }
        for alarm in &self.alarms {
            if let Some(metric) = self.metrics.get(alarm.metric.index()) {
                edges.push((alarm.id.clone(), metric.label()));
            }
            for action in &alarm.actions {
                let AlarmAction::PublishToTopic(topic) = action;
                if let Some(topic) = self.topics.get(topic.index()) {
                    edges.push((alarm.id.clone(), topic.id.clone()));
                }
            }
        }

        edges
    }
}

impl Default for ResourceGraph {
    fn default() -> Self {
        Self::new()
    }
}
