use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable resume position of one stream consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRecord {
    pub service_name: String,
    pub position: i64,
    pub events_processed: i64,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
