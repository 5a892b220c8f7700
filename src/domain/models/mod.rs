pub mod command;
pub mod condition;
pub mod config;
pub mod cursor;
pub mod event;
pub mod quest;
pub mod user;

pub use command::{CommandKind, CommandScope};
pub use condition::{Comparison, ConditionKind};
pub use config::{
    Config, DatabaseConfig, LoggingConfig, NetworkConfig, PartnerConfig, QuestsConfig,
    ReconnectConfig, StatsConfig, StreamsConfig, WorkerConfig,
};
pub use cursor::CursorRecord;
pub use event::{
    dedup_by_uri, did_of_uri, Author, EvaluationContext, PartnerResource, PostEvent, PostRecord, RecordEvent, ReplyEvent,
    ReplyRef, StrongRef, TriggerEvent, POST_COLLECTION,
};
pub use quest::{
    Command, Condition, ConditionOperator, MonitoredPhrase, Quest, QuestUpdate, TriggerConfig,
    TriggerType,
};
pub use user::{name_from_handle, normalize_name, NameClaim, NewUser, Profile, TimelineEntry, User};
