use crate::fields;
use crate::logger::Logger;
use crate::tracker;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name of document-store command records.
pub const COMMAND_EVENT: &str = "MONGO_COMMAND";

/// A command about to be sent to the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandStartedEvent {
    pub command_name: String,
    pub database_name: String,
    pub request_id: i64,
    pub command: Value,
}

/// Document-store command monitor: one info record per started command.
#[derive(Clone)]
pub struct CommandMonitor {
    logger: Logger,
}

impl CommandMonitor {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    #[track_caller]
    pub fn started(&self, event: &CommandStartedEvent) {
        let mut log = self.logger.event(COMMAND_EVENT);
        log.set_tracker_id(tracker::current());
        log.info_with_data(
            "command_info",
            fields! {
                "command" => event.command.to_string(),
                "command_name" => event.command_name.as_str(),
                "database_name" => event.database_name.as_str(),
                "request_id" => event.request_id,
            },
        );
    }
}
