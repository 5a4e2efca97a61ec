pub mod enums;
pub mod error;
pub mod limits;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{AgentKind, Direction, PositionStatus, SessionMode};
pub use error::CoreError;
pub use limits::RiskLimits;
pub use structs::{
    Action, CloseReason, Fill, Observation, OrderIntent, OrderRequest, Position, PositionView,
    RewardSignal, Transition,
};
