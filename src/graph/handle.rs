//! Typed handles for cross-resource references
//!
//! Handles are only ever issued by the [`ResourceGraph`](super::ResourceGraph)
//! that declared the target entity. Each one remembers which graph issued it,
//! so a handle carried over from another graph fails to resolve instead of
//! silently pointing at an unrelated resource.

use std::sync::atomic::{AtomicU32, Ordering};

use super::GraphError;

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(1);

/// Allocate an identifier for a new graph instance
pub(crate) fn next_graph_id() -> u32 {
    NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed)
}

/// Common behaviour of every resource handle
pub trait Handle: Copy {
    /// Resource kind, used in error messages
    const KIND: &'static str;

    fn graph(&self) -> u32;

    fn index(&self) -> usize;
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            graph: u32,
            index: usize,
        }

        impl $name {
            pub(crate) fn new(graph: u32, index: usize) -> Self {
                Self { graph, index }
            }
        }

        impl Handle for $name {
            const KIND: &'static str = $kind;

            fn graph(&self) -> u32 {
                self.graph
            }

            fn index(&self) -> usize {
                self.index
            }
        }
    };
}

handle!(
    /// Reference to an [`ExecutionRole`](super::ExecutionRole)
    RoleId,
    "role"
);
handle!(
    /// Reference to a [`ComputeUnit`](super::ComputeUnit)
    FunctionId,
    "function"
);
handle!(
    /// Reference to a [`ScheduleRule`](super::ScheduleRule)
    RuleId,
    "schedule rule"
);
handle!(
    /// Reference to a [`Table`](super::Table)
    TableId,
    "table"
);
handle!(
    /// Reference to a [`NotificationTopic`](super::NotificationTopic)
    TopicId,
    "topic"
);
handle!(
    /// Reference to a [`MetricSeries`](super::MetricSeries)
    MetricId,
    "metric"
);
handle!(
    /// Reference to an [`Alarm`](super::Alarm)
    AlarmId,
    "alarm"
);

/// Resolve a handle against the entity list of the graph `graph_id`
pub(crate) fn resolve<H: Handle, T>(
    graph_id: u32,
    items: &[T],
    handle: H,
) -> Result<&T, GraphError> {
    if handle.graph() != graph_id {
        return Err(GraphError::UnresolvedReference {
            kind: H::KIND,
            index: handle.index(),
        });
    }
    items.get(handle.index()).ok_or(GraphError::UnresolvedReference {
        kind: H::KIND,
        index: handle.index(),
    })
}

/// Mutable variant of [`resolve`]
pub(crate) fn resolve_mut<H: Handle, T>(
    graph_id: u32,
    items: &mut [T],
    handle: H,
) -> Result<&mut T, GraphError> {
    if handle.graph() != graph_id {
        return Err(GraphError::UnresolvedReference {
            kind: H::KIND,
            index: handle.index(),
        });
    }
    items.get_mut(handle.index()).ok_or(GraphError::UnresolvedReference {
        kind: H::KIND,
        index: handle.index(),
    })
}
