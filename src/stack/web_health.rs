//! Dependency-ordered construction of the web health stack

use std::path::Path;

use super::config::StackSettings;
use super::StackError;
use crate::graph::{
    AlarmAction, AlarmId, ComparisonOperator, EnvValue, FunctionId, GraphError, MetricId,
    ResourceGraph, RoleId, RuleId, Subscriber, TableId, TopicId,
};

pub const ROLE_ID: &str = "WebHealthAppLambdaRole";
pub const LAMBDA_PRINCIPAL: &str = "lambda.amazonaws.com";
pub const MANAGED_POLICIES: [&str; 3] = [
    "service-role/AWSLambdaBasicExecutionRole",
    "CloudWatchFullAccess",
    "AmazonDynamoDBFullAccess",
];

pub const POLL_FUNCTION_ID: &str = "WebHealthLambda";
pub const POLL_HANDLER: &str = "WebHealthAppLambda.lambda_handler";
pub const STORE_FUNCTION_ID: &str = "WebHealthDynamoLambda";
pub const STORE_HANDLER: &str = "WebHealthDynamoLambda.lambda_handler";

pub const RULE_ID: &str = "WebHealthLambdaRule";

pub const TABLE_ID: &str = "WebHealthDynamoTable";
pub const PARTITION_KEY: &str = "id";
pub const SORT_KEY: &str = "timestamp";
/// Environment key the persistence handler reads the table name from
pub const TABLE_NAME_ENV: &str = "tableName";

pub const TOPIC_ID: &str = "WebHealthAlarmTopic";

/// Metric dimension carrying the monitored endpoint
pub const URL_DIMENSION: &str = "URL";

/// Metrics and alarms declared for one monitored endpoint
#[derive(Debug, Clone)]
pub struct EndpointAlarms {
    pub url: String,
    pub availability_metric: MetricId,
    pub availability_alarm: AlarmId,
    pub latency_metric: MetricId,
    pub latency_alarm: AlarmId,
}

/// The declared stack plus handles to its notable resources
#[derive(Debug)]
pub struct WebHealthStack {
    pub graph: ResourceGraph,
    pub role: RoleId,
    pub poll_function: FunctionId,
    pub store_function: FunctionId,
    pub rule: RuleId,
    pub table: TableId,
    pub topic: TopicId,
    pub endpoints: Vec<EndpointAlarms>,
}

/// Declare the whole stack described by `settings`
///
/// Any error aborts the build; no partial stack is returned.
pub fn build_web_health_stack(settings: &StackSettings) -> Result<WebHealthStack, StackError> {
    settings.validate()?;

    tracing::info!(
        stack = %settings.stack_name,
        interval_minutes = settings.interval_minutes,
        endpoints = settings.urls.len(),
        "Building web health stack"
    );

    let mut graph = ResourceGraph::new();

    let role = graph.build_role(ROLE_ID, LAMBDA_PRINCIPAL, MANAGED_POLICIES)?;

    let poll_function = build_function(&mut graph, settings, POLL_FUNCTION_ID, POLL_HANDLER, role)?;
    let store_function =
        build_function(&mut graph, settings, STORE_FUNCTION_ID, STORE_HANDLER, role)?;

    let rule = graph.build_schedule_rule(RULE_ID, settings.interval_minutes, poll_function)?;

    let table = graph.build_table(TABLE_ID, PARTITION_KEY, SORT_KEY)?;
    graph.grant_full_access(table, store_function)?;
    graph.bind_environment(store_function, TABLE_NAME_ENV, EnvValue::TableName(table))?;

    let topic = graph.build_topic(TOPIC_ID)?;
    graph.subscribe(topic, Subscriber::Email(settings.alarm_email.clone()))?;
    graph.subscribe(topic, Subscriber::Function(store_function))?;

    let endpoints = settings
        .urls
        .iter()
        .map(|url| build_endpoint(&mut graph, settings, topic, url))
        .collect::<Result<Vec<_>, _>>()?;

    let shape = graph.shape();
    tracing::info!(
        functions = shape.functions,
        tables = shape.tables,
        metrics = shape.metrics,
        alarms = shape.alarms,
        "Web health stack declared"
    );

    Ok(WebHealthStack {
        graph,
        role,
        poll_function,
        store_function,
        rule,
        table,
        topic,
        endpoints,
    })
}

fn build_function(
    graph: &mut ResourceGraph,
    settings: &StackSettings,
    id: &str,
    handler: &str,
    role: RoleId,
) -> Result<FunctionId, GraphError> {
    let asset: &Path = &settings.asset_dir;
    let function =
        graph.build_compute_unit(id, handler, asset, role, settings.function_timeout_minutes)?;
    graph.set_runtime(function, settings.runtime)?;
    Ok(function)
}

/// Availability and latency alarms for `url`, both publishing to `topic`
fn build_endpoint(
    graph: &mut ResourceGraph,
    settings: &StackSettings,
    topic: TopicId,
    url: &str,
) -> Result<EndpointAlarms, GraphError> {
    let periods = settings.alarm_evaluation_periods();
    let dimensions = [(URL_DIMENSION, url)];

    let availability_metric =
        graph.build_metric(&settings.namespace, &settings.availability_metric, dimensions);
    let availability_alarm = graph.build_alarm(
        format!("{}_availability_errors", url),
        availability_metric,
        settings.availability_threshold,
        ComparisonOperator::LessThanThreshold,
        periods,
    )?;

    let latency_metric =
        graph.build_metric(&settings.namespace, &settings.latency_metric, dimensions);
    let latency_alarm = graph.build_alarm(
        format!("{}_latency_errors", url),
        latency_metric,
        settings.latency_threshold,
        ComparisonOperator::GreaterThanThreshold,
        periods,
    )?;

    graph.attach_action(availability_alarm, AlarmAction::PublishToTopic(topic))?;
    graph.attach_action(latency_alarm, AlarmAction::PublishToTopic(topic))?;

    tracing::debug!(%url, "Declared endpoint alarms");

    Ok(EndpointAlarms {
        url: url.to_string(),
        availability_metric,
        availability_alarm,
        latency_metric,
        latency_alarm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Handle;
    use crate::stack::ConfigError;

    fn settings_with(dir: &Path, urls: &[&str]) -> StackSettings {
        StackSettings {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            asset_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn asset_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in ["WebHealthAppLambda.py", "WebHealthDynamoLambda.py"] {
            std::fs::write(dir.path().join(name), "def lambda_handler(e, c): pass\n").unwrap();
        }
        dir
    }

    #[test]
    fn test_single_endpoint_scenario() {
        let dir = asset_dir();
        let mut settings = settings_with(dir.path(), &["https://example.com"]);
        settings.interval_minutes = 2;

        let stack = build_web_health_stack(&settings).unwrap();
        let graph = &stack.graph;
        let shape = graph.shape();

        assert_eq!(shape.rules, 1);
        assert_eq!(graph.rule(stack.rule).unwrap().period_minutes, 2);
        assert_eq!(graph.rule(stack.rule).unwrap().target, stack.poll_function);
        assert_eq!(shape.functions, 2);
        assert_eq!(shape.tables, 1);
        assert_eq!(shape.topics, 1);
        assert_eq!(shape.metrics, 2);
        assert_eq!(shape.alarms, 2);

        let names: Vec<&str> = graph.metrics().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["url_availability", "url_latency"]);
        for alarm in graph.alarms() {
            assert_eq!(alarm.actions, vec![AlarmAction::PublishToTopic(stack.topic)]);
            assert_eq!(alarm.evaluation_periods, 2);
        }
    }

    #[test]
    fn test_two_alarms_per_endpoint() {
        let dir = asset_dir();
        let urls = ["https://a.example", "https://b.example", "https://c.example"];
        let stack = build_web_health_stack(&settings_with(dir.path(), &urls)).unwrap();
        let graph = &stack.graph;

        assert_eq!(graph.alarms().len(), 2 * urls.len());
        assert_eq!(stack.endpoints.len(), urls.len());

        for endpoint in &stack.endpoints {
            for alarm_id in [endpoint.availability_alarm, endpoint.latency_alarm] {
                let alarm = graph.alarm(alarm_id).unwrap();
                let metric = graph.metric(alarm.metric).unwrap();
                assert_eq!(metric.dimension(URL_DIMENSION), Some(endpoint.url.as_str()));
                assert!(!alarm.actions.is_empty());
                assert!(alarm.actions.contains(&AlarmAction::PublishToTopic(stack.topic)));
            }

            let availability = graph.alarm(endpoint.availability_alarm).unwrap();
            assert_eq!(availability.operator, ComparisonOperator::LessThanThreshold);
            assert_eq!(availability.threshold, 1.0);

            let latency = graph.alarm(endpoint.latency_alarm).unwrap();
            assert_eq!(latency.operator, ComparisonOperator::GreaterThanThreshold);
            assert_eq!(latency.threshold, 0.3);
        }
    }

    #[test]
    fn test_grant_names_persistence_function() {
        let dir = asset_dir();
        let settings = settings_with(dir.path(), &["https://example.com"]);
        let stack = build_web_health_stack(&settings).unwrap();
        let table = stack.graph.table(stack.table).unwrap();

        assert_eq!(table.grants.len(), 1);
        assert_eq!(table.grants[0].grantee, stack.store_function);
        assert_ne!(table.grants[0].grantee, stack.poll_function);

        let store = stack.graph.function(stack.store_function).unwrap();
        assert_eq!(store.environment.len(), 1);
        assert_eq!(store.environment[0].key, TABLE_NAME_ENV);
        assert_eq!(store.environment[0].value, EnvValue::TableName(stack.table));

        let poll = stack.graph.function(stack.poll_function).unwrap();
        assert!(poll.environment.is_empty());
    }

    #[test]
    fn test_topic_subscribers() {
        let dir = asset_dir();
        let stack = build_web_health_stack(&settings_with(dir.path(), &[])).unwrap();
        let topic = stack.graph.topic(stack.topic).unwrap();

        assert_eq!(
            topic.subscribers,
            vec![
                Subscriber::Email("alerts@example.com".to_string()),
                Subscriber::Function(stack.store_function),
            ]
        );
    }

    #[test]
    fn test_empty_endpoint_list() {
        let dir = asset_dir();
        let stack = build_web_health_stack(&settings_with(dir.path(), &[])).unwrap();
        let shape = stack.graph.shape();

        assert_eq!(shape.metrics, 0);
        assert_eq!(shape.alarms, 0);
        assert_eq!(shape.roles, 1);
        assert_eq!(shape.functions, 2);
        assert_eq!(shape.tables, 1);
        assert_eq!(shape.topics, 1);
    }

    #[test]
    fn test_build_is_idempotent() {
        let dir = asset_dir();
        let settings = settings_with(dir.path(), &["https://a.example", "https://b.example"]);

        let first = build_web_health_stack(&settings).unwrap();
        let second = build_web_health_stack(&settings).unwrap();

        assert_eq!(first.graph.shape(), second.graph.shape());
        assert_eq!(first.graph.edges(), second.graph.edges());
        assert_eq!(
            first.graph.function(first.poll_function).unwrap().code,
            second.graph.function(second.poll_function).unwrap().code
        );
    }

    #[test]
    fn test_latency_periods_follow_interval_unless_set() {
        let dir = asset_dir();
        let mut settings = settings_with(dir.path(), &["https://example.com"]);
        settings.interval_minutes = 5;
        let stack = build_web_health_stack(&settings).unwrap();
        let latency = stack.graph.alarm(stack.endpoints[0].latency_alarm).unwrap();
        assert_eq!(latency.evaluation_periods, 5);

        settings.evaluation_periods = Some(1);
        let stack = build_web_health_stack(&settings).unwrap();
        let latency = stack.graph.alarm(stack.endpoints[0].latency_alarm).unwrap();
        assert_eq!(latency.evaluation_periods, 1);
    }

    #[test]
    fn test_errors_abort_build() {
        let dir = asset_dir();

        let mut settings = settings_with(dir.path(), &["https://example.com"]);
        settings.interval_minutes = 0;
        assert!(matches!(
            build_web_health_stack(&settings),
            Err(StackError::Config(ConfigError::Invalid(_)))
        ));

        let settings = settings_with(&dir.path().join("missing"), &["https://example.com"]);
        assert!(matches!(
            build_web_health_stack(&settings),
            Err(StackError::Graph(GraphError::Asset(_)))
        ));

        let settings = settings_with(dir.path(), &["https://example.com", "https://example.com"]);
        assert!(matches!(
            build_web_health_stack(&settings),
            Err(StackError::Graph(GraphError::DuplicateId(_)))
        ));
    }

    #[test]
    fn test_metric_handles_are_distinct() {
        let dir = asset_dir();
        let settings = settings_with(dir.path(), &["https://example.com"]);
        let stack = build_web_health_stack(&settings).unwrap();
        let endpoint = &stack.endpoints[0];
        assert_ne!(endpoint.availability_metric.index(), endpoint.latency_metric.index());
    }
}
