//! Node context for multi-node logging
//!
//! A simulation runs many flood nodes on one thread. [`NodeContextGuard`]
//! marks which node is active: it records the node in thread-local storage
//! and enters a `node` span carrying `node_id` and `instance_id`, so every
//! event logged while the guard lives is attributable to that node.

use std::cell::RefCell;

use ripple_core::PeerIdentity;
use tracing::span::EnteredSpan;
use uuid::Uuid;

/// Node context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContext {
    /// The node's address in short form
    pub node_id: String,
    /// Unique instance ID for this node session
    pub instance_id: Uuid,
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContext>> = const { RefCell::new(None) };
}

/// RAII guard for node context
///
/// When it's dropped, the previous context (if any) is restored and the
/// `node` span is exited.
///
/// # Example
///
/// ```ignore
/// use ripple_logging::NodeContextGuard;
/// use ripple_core::SimulationIdentity;
///
/// let node = SimulationIdentity::new('A').unwrap();
/// let _guard = NodeContextGuard::new(&node);
///
/// // Events in this scope are inside span `node{node_id=A}`
/// tracing::info!("Forwarded broadcast");
/// ```
pub struct NodeContextGuard {
    previous: Option<NodeContext>,
    _span: EnteredSpan,
}

impl NodeContextGuard {
    /// Enter the context of `node` with a fresh instance ID
    pub fn new<I: PeerIdentity>(node: &I) -> Self {
        Self::with_instance_id(node, Uuid::new_v4())
    }

    /// Enter the context of `node` with a specific instance ID
    ///
    /// Useful to keep one instance ID across repeated entries for the same node.
    pub fn with_instance_id<I: PeerIdentity>(node: &I, instance_id: Uuid) -> Self {
        let context = NodeContext {
            node_id: node.short_id(),
            instance_id,
        };
        let span = tracing::info_span!(
            "node",
            node_id = %context.node_id,
            instance_id = %context.instance_id
        )
        .entered();
        let previous = NODE_CONTEXT.with(|ctx| ctx.replace(Some(context)));

        Self {
            previous,
            _span: span,
        }
    }

    /// Get the current node context (if any)
    pub fn current() -> Option<NodeContext> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current node ID (if set)
    pub fn current_node_id() -> Option<String> {
        Self::current().map(|ctx| ctx.node_id)
    }

    /// Get the current instance ID (if set)
    pub fn current_instance_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.instance_id)
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Run a block inside a node context
///
/// # Example
///
/// ```ignore
/// with_node_context!(&node, {
///     tracing::info!("Processing frame");
/// });
/// ```
#[macro_export]
macro_rules! with_node_context {
    ($identity:expr, $body:block) => {{
        let _guard = $crate::context::NodeContextGuard::new($identity);
        $body
    }};
}
