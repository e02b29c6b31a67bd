//! Template inspection
//!
//! Read-only queries over a rendered template, used to check resource counts
//! and property values without depending on generated logical IDs.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde_json::{Map, Value};

/// A rendered template under inspection
#[derive(Debug, Clone)]
pub struct Template {
    json: Value,
}

impl Template {
    pub fn from_json(json: Value) -> Self {
        Self { json }
    }

    pub fn as_json(&self) -> &Value {
        &self.json
    }

    /// All resources of `resource_type`, keyed by logical ID
    pub fn find_resources(&self, resource_type: &str) -> BTreeMap<&str, &Value> {
        self.json
            .get("Resources")
            .and_then(Value::as_object)
            .map(|resources| {
                resources
                    .iter()
                    .filter(|(_, r)| r.get("Type").and_then(Value::as_str) == Some(resource_type))
                    .map(|(id, r)| (id.as_str(), r))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resources of `resource_type` whose properties contain `properties`
    pub fn find_resources_with(
        &self,
        resource_type: &str,
        properties: &Value,
    ) -> BTreeMap<&str, &Value> {
        self.find_resources(resource_type)
            .into_iter()
            .filter(|(_, r)| match r.get("Properties") {
                Some(actual) => object_like(actual, properties),
                None => object_like(&Value::Object(Map::new()), properties),
            })
            .collect()
    }

    pub fn resource_count(&self, resource_type: &str) -> usize {
        self.find_resources(resource_type).len()
    }

    pub fn resource_count_is(&self, resource_type: &str, count: usize) -> bool {
        self.resource_count(resource_type) == count
    }

    /// Whether at least one resource of `resource_type` has matching properties
    pub fn has_resource_properties(&self, resource_type: &str, properties: &Value) -> bool {
        !self.find_resources_with(resource_type, properties).is_empty()
    }

    pub fn find_conditions(&self, name: &str) -> Option<&Value> {
        self.json.get("Conditions").and_then(|c| c.get(name))
    }

    pub fn find_parameters(&self, name: &str) -> Option<&Value> {
        self.json.get("Parameters").and_then(|p| p.get(name))
    }
}

impl FromStr for Template {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s).map(Self::from_json)
    }
}

/// Recursive subset match
///
/// Objects match when every expected key is present and matches; arrays must
/// have the same length and match element-wise; other values compare equal.
/// Numbers compare by value, so `1` matches `1.0`.
pub fn object_like(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => expected
            .iter()
            .all(|(key, value)| actual.get(key).is_some_and(|a| object_like(a, value))),
        (Value::Array(actual), Value::Array(expected)) => {
            actual.len() == expected.len()
                && actual.iter().zip(expected).all(|(a, e)| object_like(a, e))
        }
        (Value::Number(a), Value::Number(e)) => a.as_f64() == e.as_f64(),
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Template {
        json!({
            "Resources": {
                "FnA": {
                    "Type": "AWS::Lambda::Function",
                    "Properties": { "Handler": "a.main", "Timeout": 120 }
                },
                "FnB": { "Type": "AWS::Lambda::Function", "Properties": { "Handler": "b.main" } },
                "Topic": { "Type": "AWS::SNS::Topic" }
            },
            "Parameters": { "BootstrapVersion": { "Type": "String" } },
            "Conditions": { "Available": { "Fn::Equals": ["a", "a"] } }
        })
        .to_string()
        .parse()
        .unwrap()
    }

    #[test]
    fn test_counts() {
        let template = sample();
        assert_eq!(template.resource_count("AWS::Lambda::Function"), 2);
        assert!(template.resource_count_is("AWS::SNS::Topic", 1));
        assert!(template.resource_count_is("AWS::DynamoDB::Table", 0));
    }

    #[test]
    fn test_property_matching() {
        let template = sample();
        assert!(template.has_resource_properties(
            "AWS::Lambda::Function",
            &json!({ "Handler": "a.main", "Timeout": 120.0 })
        ));
        assert!(!template.has_resource_properties(
            "AWS::Lambda::Function",
            &json!({ "Handler": "c.main" })
        ));
        assert!(template.has_resource_properties("AWS::SNS::Topic", &json!({})));
    }

    #[test]
    fn test_object_like_arrays() {
        assert!(object_like(&json!([{ "a": 1, "b": 2 }]), &json!([{ "a": 1 }])));
        assert!(!object_like(&json!([1, 2]), &json!([1])));
    }

    #[test]
    fn test_sections() {
        let template = sample();
        assert!(template.find_parameters("BootstrapVersion").is_some());
        assert!(template.find_conditions("Available").is_some());
        assert!(template.find_conditions("Missing").is_none());
    }
}
