use crate::fixed::Fixed64;
use crate::id::{ConnectionId, NodeId, TaskId};
use crate::resource::ResourceType;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Errors returned at the engine's registration and query boundary.
///
/// Structural errors (`UnknownNode`, `UnknownConnection`, `UnknownTask`,
/// `Configuration`) are returned synchronously to the caller and never enter
/// the scheduler. Runtime shortfalls during a tick are never returned as
/// errors -- they degrade to partial service and surface through events.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlowError {
    #[error("unknown node: {0:?}")]
    UnknownNode(NodeId),
    #[error("unknown connection: {0:?}")]
    UnknownConnection(ConnectionId),
    #[error("unknown task: {0:?}")]
    UnknownTask(TaskId),
    /// A ledger mutation would have driven `current` negative. The ledger
    /// is left untouched.
    #[error("{resource} amount out of range: attempted {attempted}")]
    OutOfRange {
        resource: ResourceType,
        attempted: Fixed64,
    },
    /// A request could not be fully served. The tick path never returns
    /// this; it exists for callers that treat a shortfall as fatal.
    #[error("insufficient {resource}: requested {requested}, available {available}")]
    InsufficientSupply {
        resource: ResourceType,
        requested: Fixed64,
        available: Fixed64,
    },
    /// Malformed registration input, rejected before it reaches any
    /// component (e.g. a non-positive interval).
    #[error("configuration error: {0}")]
    Configuration(String),
}
