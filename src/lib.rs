//! Webhealth: Web Health Monitoring Stack
//!
//! Declares a small monitoring stack as a typed resource graph and renders it
//! as a CloudFormation template: a scheduled health-check function, a results
//! table written by a second function, and per-endpoint availability and
//! latency alarms that notify through a shared topic.
//!
//! # Features
//!
//! - **Typed references**: cross-resource links are handles issued by the
//!   graph, so forward references cannot be expressed
//! - **Construction-time validation**: empty keys, non-positive periods and
//!   foreign handles are rejected before anything is recorded
//! - **Deterministic synthesis**: logical IDs and asset keys are content
//!   hashes; identical settings give identical templates
//! - **Template assertions**: inspect rendered templates by resource type
//!
//! # Example
//!
//! ```no_run
//! use webhealth::stack::{build_web_health_stack, StackSettings};
//! use webhealth::template::{render, SynthOptions, Template};
//!
//! let settings = StackSettings {
//!     urls: vec!["https://example.com".to_string()],
//!     ..Default::default()
//! };
//! let stack = build_web_health_stack(&settings).unwrap();
//!
//! let json = render(&stack.graph, &SynthOptions::new(&settings.stack_name)).unwrap();
//! let template = Template::from_json(json);
//! assert!(template.resource_count_is("AWS::CloudWatch::Alarm", 2));
//! ```

pub mod graph;
pub mod stack;
pub mod template;

// Re-export commonly used types
pub use graph::{GraphError, ResourceGraph};
pub use stack::{build_web_health_stack, StackError, StackSettings};
pub use template::{render, SynthOptions, TemplateError};
