//! Graph to CloudFormation rendering

use serde_json::{json, Map, Value};

use super::logical_id::logical_id;
use super::TemplateError;
use crate::graph::{
    AlarmAction, EnvValue, FunctionId, GraphError, Handle, RemovalPolicy, ResourceGraph, RoleId,
    Subscriber, TableId, TopicId,
};

/// Asset bucket created by the default bootstrap stack
pub const DEFAULT_ASSET_BUCKET: &str = "cdk-hnb659fds-assets-${AWS::AccountId}-${AWS::Region}";
/// SSM parameter holding the bootstrap stack version
pub const DEFAULT_BOOTSTRAP_PARAMETER: &str = "/cdk-bootstrap/hnb659fds/version";

pub const METADATA_CONDITION: &str = "CDKMetadataAvailable";
pub const BOOTSTRAP_PARAMETER: &str = "BootstrapVersion";

const BOOTSTRAP_DESCRIPTION: &str = "Version of the CDK Bootstrap resources in this environment, \
     automatically retrieved from SSM Parameter Store. [cdk:skip]";
const BOOTSTRAP_ASSERT_DESCRIPTION: &str = "CDK bootstrap stack version 6 required. \
     Please run 'cdk bootstrap' with a recent version of the CDK CLI.";

/// Regions that accept the metadata resource
const METADATA_REGIONS: &[&str] = &[
    "af-south-1",
    "ap-east-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ca-central-1",
    "cn-north-1",
    "cn-northwest-1",
    "eu-central-1",
    "eu-north-1",
    "eu-south-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "me-south-1",
    "sa-east-1",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
];

/// `Fn::Or` accepts at most this many conditions
const MAX_OR_CONDITIONS: usize = 10;

/// Rendering options
#[derive(Debug, Clone)]
pub struct SynthOptions {
    pub stack_name: String,
    pub asset_bucket: String,
    pub bootstrap_parameter: String,
    /// Emit the metadata resource and its region condition
    pub include_metadata: bool,
}

impl SynthOptions {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, enabled: bool) -> Self {
        self.include_metadata = enabled;
        self
    }
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            stack_name: "web-health".to_string(),
            asset_bucket: DEFAULT_ASSET_BUCKET.to_string(),
            bootstrap_parameter: DEFAULT_BOOTSTRAP_PARAMETER.to_string(),
            include_metadata: true,
        }
    }
}

/// Logical IDs of every declared entity, indexed like the graph's lists
struct LogicalIds {
    roles: Vec<String>,
    functions: Vec<String>,
    tables: Vec<String>,
    topics: Vec<String>,
}

impl LogicalIds {
    fn allocate(graph: &ResourceGraph, stack: &str) -> Self {
        let id = |construct: &str| logical_id(stack, &[construct]);
        Self {
            roles: graph.roles().iter().map(|r| id(r.id.as_str())).collect(),
            functions: graph.functions().iter().map(|f| id(f.id.as_str())).collect(),
            tables: graph.tables().iter().map(|t| id(t.id.as_str())).collect(),
            topics: graph.topics().iter().map(|t| id(t.id.as_str())).collect(),
        }
    }

    fn role(&self, graph: &ResourceGraph, id: RoleId) -> Result<&str, GraphError> {
        graph.role(id)?;
        Ok(&self.roles[id.index()])
    }

    fn function(&self, graph: &ResourceGraph, id: FunctionId) -> Result<&str, GraphError> {
        graph.function(id)?;
        Ok(&self.functions[id.index()])
    }

    fn table(&self, graph: &ResourceGraph, id: TableId) -> Result<&str, GraphError> {
        graph.table(id)?;
        Ok(&self.tables[id.index()])
    }

    fn topic(&self, graph: &ResourceGraph, id: TopicId) -> Result<&str, GraphError> {
        graph.topic(id)?;
        Ok(&self.topics[id.index()])
    }
}

/// A single template resource before it is placed in the template
struct Resource {
    kind: &'static str,
    properties: Option<Value>,
    depends_on: Vec<String>,
    removal: RemovalPolicy,
}

impl Resource {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            properties: None,
            depends_on: Vec::new(),
            removal: RemovalPolicy::Destroy,
        }
    }

    fn properties(mut self, properties: Value) -> Self {
        self.properties = Some(properties);
        self
    }

    fn depends_on(mut self, mut ids: Vec<String>) -> Self {
        ids.sort();
        ids.dedup();
        self.depends_on = ids;
        self
    }

    fn removal(mut self, removal: RemovalPolicy) -> Self {
        self.removal = removal;
        self
    }
}

/// Accumulates the `Resources` section
struct Resources<'a> {
    stack_name: &'a str,
    entries: Map<String, Value>,
}

impl<'a> Resources<'a> {
    fn new(stack_name: &'a str) -> Self {
        Self {
            stack_name,
            entries: Map::new(),
        }
    }

    fn insert(&mut self, path: &[&str], resource: Resource) -> Result<String, TemplateError> {
        let id = logical_id(self.stack_name, path);
        if self.entries.contains_key(&id) {
            return Err(TemplateError::DuplicateLogicalId(id));
        }

        let mut entry = Map::new();
        entry.insert("Type".into(), json!(resource.kind));
        if let Some(properties) = resource.properties {
            entry.insert("Properties".into(), properties);
        }
        if !resource.depends_on.is_empty() {
            entry.insert("DependsOn".into(), json!(resource.depends_on));
        }
        entry.insert("UpdateReplacePolicy".into(), json!(resource.removal.as_str()));
        entry.insert("DeletionPolicy".into(), json!(resource.removal.as_str()));
        let cdk_path = format!("{}/{}/Resource", self.stack_name, path.join("/"));
        entry.insert("Metadata".into(), json!({ "aws:cdk:path": cdk_path }));

        tracing::trace!(logical_id = %id, kind = resource.kind, "Rendered resource");
        self.entries.insert(id.clone(), Value::Object(entry));
        Ok(id)
    }
}

fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

fn managed_policy_arn(name: &str) -> Value {
    let suffix = format!(":iam::aws:policy/{}", name);
    json!({ "Fn::Join": ["", ["arn:", { "Ref": "AWS::Partition" }, suffix]] })
}

/// Render `graph` as a CloudFormation template
pub fn render(graph: &ResourceGraph, options: &SynthOptions) -> Result<Value, TemplateError> {
    let ids = LogicalIds::allocate(graph, &options.stack_name);
    let mut resources = Resources::new(&options.stack_name);

    let policies = render_roles(graph, &ids, &mut resources)?;
    render_functions(graph, &ids, &policies, options, &mut resources)?;
    render_rules(graph, &ids, &mut resources)?;
    render_tables(graph, &mut resources)?;
    render_topics(graph, &ids, &mut resources)?;
    render_alarms(graph, &ids, &mut resources)?;

    let mut template = Map::new();

    if options.include_metadata {
        resources.entries.insert(
            "CDKMetadata".into(),
            json!({
                "Type": "AWS::CDK::Metadata",
                "Properties": {
                    "Analytics": format!("v2:webhealth:{}", env!("CARGO_PKG_VERSION")),
                },
                "Metadata": {
                    "aws:cdk:path": format!("{}/CDKMetadata/Default", options.stack_name),
                },
                "Condition": METADATA_CONDITION,
            }),
        );
        let mut conditions = Map::new();
        conditions.insert(METADATA_CONDITION.into(), region_condition(METADATA_REGIONS));
        template.insert("Conditions".into(), Value::Object(conditions));
    }

    tracing::info!(
        stack = %options.stack_name,
        resources = resources.entries.len(),
        "Rendered template"
    );

    template.insert("Resources".into(), Value::Object(resources.entries));
    template.insert(
        "Parameters".into(),
        json!({
            BOOTSTRAP_PARAMETER: {
                "Type": "AWS::SSM::Parameter::Value<String>",
                "Default": options.bootstrap_parameter,
                "Description": BOOTSTRAP_DESCRIPTION,
            }
        }),
    );
    template.insert(
        "Rules".into(),
        json!({
            "CheckBootstrapVersion": {
                "Assertions": [{
                    "Assert": {
                        "Fn::Not": [{
                            "Fn::Contains": [
                                ["1", "2", "3", "4", "5"],
                                { "Ref": BOOTSTRAP_PARAMETER }
                            ]
                        }]
                    },
                    "AssertDescription": BOOTSTRAP_ASSERT_DESCRIPTION,
                }]
            }
        }),
    );

    Ok(Value::Object(template))
}

/// Roles, plus one default policy per role that received table grants.
/// Returns the policy logical ID for each role index, if any.
fn render_roles(
    graph: &ResourceGraph,
    ids: &LogicalIds,
    resources: &mut Resources,
) -> Result<Vec<Option<String>>, TemplateError> {
    let mut statements: Vec<Vec<Value>> = vec![Vec::new(); graph.roles().len()];
    for (index, table) in graph.tables().iter().enumerate() {
        let table_id = &ids.tables[index];
        for grant in &table.grants {
            let function = graph.function(grant.grantee)?;
            graph.role(function.role)?;
            statements[function.role.index()].push(json!({
                "Action": grant.access.actions(),
                "Effect": "Allow",
                "Resource": [get_att(table_id, "Arn")],
            }));
        }
    }

    let mut policies = Vec::with_capacity(graph.roles().len());
    for (role, statements) in graph.roles().iter().zip(statements) {
        let mut properties = json!({
            "AssumeRolePolicyDocument": {
                "Statement": [{
                    "Action": "sts:AssumeRole",
                    "Effect": "Allow",
                    "Principal": { "Service": role.principal },
                }],
                "Version": "2012-10-17",
            }
        });
        if !role.managed_policies.is_empty() {
            properties["ManagedPolicyArns"] = Value::Array(
                role.managed_policies
                    .iter()
                    .map(|p| managed_policy_arn(p))
                    .collect(),
            );
        }
        let role_id = resources.insert(
            &[role.id.as_str()],
            Resource::new("AWS::IAM::Role")
                .properties(properties)
                .removal(role.removal),
        )?;

        if statements.is_empty() {
            policies.push(None);
            continue;
        }

        let policy_path = [role.id.as_str(), "DefaultPolicy"];
        let policy_id = logical_id(resources.stack_name, &policy_path);
        resources.insert(
            &policy_path,
            Resource::new("AWS::IAM::Policy").properties(json!({
                "PolicyDocument": {
                    "Statement": statements,
                    "Version": "2012-10-17",
                },
                "PolicyName": policy_id,
                "Roles": [reference(&role_id)],
            })),
        )?;
        policies.push(Some(policy_id));
    }

    Ok(policies)
}

fn render_functions(
    graph: &ResourceGraph,
    ids: &LogicalIds,
    policies: &[Option<String>],
    options: &SynthOptions,
    resources: &mut Resources,
) -> Result<(), TemplateError> {
    for function in graph.functions() {
        let role_id = ids.role(graph, function.role)?;

        let mut properties = json!({
            "Code": {
                "S3Bucket": { "Fn::Sub": options.asset_bucket },
                "S3Key": function.code.object_key(),
            },
            "Role": get_att(role_id, "Arn"),
            "Handler": function.handler,
            "Runtime": function.runtime.as_str(),
            "Timeout": function.timeout_minutes * 60,
        });

        if !function.environment.is_empty() {
            let mut variables = Map::new();
            for binding in &function.environment {
                let value = match &binding.value {
                    EnvValue::Literal(value) => json!(value),
                    EnvValue::TableName(table) => reference(ids.table(graph, *table)?),
                };
                variables.insert(binding.key.clone(), value);
            }
            properties["Environment"] = json!({ "Variables": variables });
        }

        let mut depends_on = vec![role_id.to_string()];
        if let Some(Some(policy_id)) = policies.get(function.role.index()) {
            depends_on.push(policy_id.clone());
        }

        resources.insert(
            &[function.id.as_str()],
            Resource::new("AWS::Lambda::Function")
                .properties(properties)
                .depends_on(depends_on)
                .removal(function.removal),
        )?;
    }
    Ok(())
}

fn render_rules(
    graph: &ResourceGraph,
    ids: &LogicalIds,
    resources: &mut Resources,
) -> Result<(), TemplateError> {
    for rule in graph.rules() {
        let target = graph.function(rule.target)?;
        let target_id = ids.function(graph, rule.target)?;

        let rule_id = resources.insert(
            &[rule.id.as_str()],
            Resource::new("AWS::Events::Rule")
                .properties(json!({
                    "ScheduleExpression": rule.schedule_expression(),
                    "State": "ENABLED",
                    "Targets": [{ "Arn": get_att(target_id, "Arn"), "Id": "Target0" }],
                }))
                .removal(rule.removal),
        )?;

        let permission = format!("AllowEventRule{}", target.id);
        resources.insert(
            &[rule.id.as_str(), permission.as_str()],
            Resource::new("AWS::Lambda::Permission").properties(json!({
                "Action": "lambda:InvokeFunction",
                "FunctionName": get_att(target_id, "Arn"),
                "Principal": "events.amazonaws.com",
                "SourceArn": get_att(&rule_id, "Arn"),
            })),
        )?;
    }
    Ok(())
}

fn render_tables(graph: &ResourceGraph, resources: &mut Resources) -> Result<(), TemplateError> {
    for table in graph.tables() {
        resources.insert(
            &[table.id.as_str()],
            Resource::new("AWS::DynamoDB::Table")
                .properties(json!({
                    "KeySchema": [
                        { "AttributeName": table.partition_key.name, "KeyType": "HASH" },
                        { "AttributeName": table.sort_key.name, "KeyType": "RANGE" },
                    ],
                    "AttributeDefinitions": [
                        {
                            "AttributeName": table.partition_key.name,
                            "AttributeType": table.partition_key.kind.as_str(),
                        },
                        {
                            "AttributeName": table.sort_key.name,
                            "AttributeType": table.sort_key.kind.as_str(),
                        },
                    ],
                    "BillingMode": table.billing_mode.as_str(),
                }))
                .removal(table.removal),
        )?;
    }
    Ok(())
}

fn render_topics(
    graph: &ResourceGraph,
    ids: &LogicalIds,
    resources: &mut Resources,
) -> Result<(), TemplateError> {
    for topic in graph.topics() {
        let topic_id = resources.insert(
            &[topic.id.as_str()],
            Resource::new("AWS::SNS::Topic").removal(topic.removal),
        )?;

        for subscriber in &topic.subscribers {
            match subscriber {
                Subscriber::Email(address) => {
                    resources.insert(
                        &[topic.id.as_str(), address.as_str()],
                        Resource::new("AWS::SNS::Subscription").properties(json!({
                            "Protocol": subscriber.protocol(),
                            "TopicArn": reference(&topic_id),
                            "Endpoint": address,
                        })),
                    )?;
                }
                Subscriber::Function(unit) => {
                    let function = graph.function(*unit)?;
                    let function_id = ids.function(graph, *unit)?;

                    resources.insert(
                        &[function.id.as_str(), topic.id.as_str()],
                        Resource::new("AWS::SNS::Subscription").properties(json!({
                            "Protocol": subscriber.protocol(),
                            "TopicArn": reference(&topic_id),
                            "Endpoint": get_att(function_id, "Arn"),
                        })),
                    )?;

                    let permission = format!("AllowInvoke{}", topic.id);
                    resources.insert(
                        &[function.id.as_str(), permission.as_str()],
                        Resource::new("AWS::Lambda::Permission").properties(json!({
                            "Action": "lambda:InvokeFunction",
                            "FunctionName": get_att(function_id, "Arn"),
                            "Principal": "sns.amazonaws.com",
                            "SourceArn": reference(&topic_id),
                        })),
                    )?;
                }
            }
        }
    }
    Ok(())
}

fn render_alarms(
    graph: &ResourceGraph,
    ids: &LogicalIds,
    resources: &mut Resources,
) -> Result<(), TemplateError> {
    for alarm in graph.alarms() {
        let metric = graph.metric(alarm.metric)?;
        let period = metric.period_seconds().ok_or_else(|| GraphError::InvalidPeriod {
            id: metric.label(),
            period: metric.period_minutes,
        })?;

        let actions = alarm
            .actions
            .iter()
            .map(|action| match action {
                AlarmAction::PublishToTopic(topic) => Ok(reference(ids.topic(graph, *topic)?)),
            })
            .collect::<Result<Vec<_>, GraphError>>()?;

        let mut properties = json!({
            "ComparisonOperator": alarm.operator.as_str(),
            "EvaluationPeriods": alarm.evaluation_periods,
            "Threshold": alarm.threshold,
            "MetricName": metric.name,
            "Namespace": metric.namespace,
            "Period": period,
            "Statistic": metric.statistic.as_str(),
        });
        if !metric.dimensions.is_empty() {
            properties["Dimensions"] = Value::Array(
                metric
                    .dimensions
                    .iter()
                    .map(|(name, value)| json!({ "Name": name, "Value": value }))
                    .collect(),
            );
        }
        if !actions.is_empty() {
            properties["AlarmActions"] = Value::Array(actions);
        }

        resources.insert(
            &[alarm.id.as_str()],
            Resource::new("AWS::CloudWatch::Alarm")
                .properties(properties)
                .removal(alarm.removal),
        )?;
    }
    Ok(())
}

/// `Fn::Or` over region equality checks, nested so no level exceeds the
/// intrinsic's operand limit
fn region_condition(regions: &[&str]) -> Value {
    let mut conditions: Vec<Value> = regions
        .iter()
        .map(|region| json!({ "Fn::Equals": [{ "Ref": "AWS::Region" }, region] }))
        .collect();

    while conditions.len() > MAX_OR_CONDITIONS {
        conditions = conditions
            .chunks(MAX_OR_CONDITIONS)
            .map(|chunk| match chunk {
                [single] => single.clone(),
                _ => json!({ "Fn::Or": chunk }),
            })
            .collect();
    }

    match conditions.as_slice() {
        [single] => single.clone(),
        _ => json!({ "Fn::Or": conditions }),
    }
}
