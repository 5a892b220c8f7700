pub mod commands;
pub mod conditions;
pub mod consumer;
pub mod cursor_store;
pub mod dispatcher;
pub mod engine;
pub mod identities;
pub mod overlay;
pub mod poller;
pub mod quest_registry;
pub mod shutdown;
pub mod snapshot;
pub mod stats;
pub mod triggers;

pub use commands::{CommandExecutor, ExecutionReport};
pub use conditions::{ConditionEvaluator, EvaluationOutcome};
pub use consumer::{ConsumerSettings, StreamConsumer};
pub use cursor_store::CursorStore;
pub use dispatcher::{ProcessOutcome, ProcessRequest, QuestDispatcher, WorkerPool};
pub use engine::{Engine, StreamKind};
pub use identities::IdentitySet;
pub use overlay::QuestOverlay;
pub use poller::PollService;
pub use quest_registry::{ImportMode, ImportResult, QuestRegistry};
pub use shutdown::Shutdown;
pub use snapshot::{EngineSnapshot, SnapshotStore};
pub use stats::{DispatchStats, StatsSnapshot};
