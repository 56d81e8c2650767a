//! Events that drive a session

/// User commands and transport results, processed one at a time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // User commands
    UserMessage {
        text: String,
    },
    EditTurn {
        index: usize,
        content: String,
    },
    DeleteTurn {
        index: usize,
    },
    SummaryRequested {
        turns: usize,
    },

    // Streaming transport
    StreamChunk {
        text: String,
    },
    StreamComplete,
    StreamFailed {
        message: String,
    },

    // Summary transport
    SummaryComplete {
        text: String,
    },
    SummaryFailed {
        message: String,
    },
}

impl Event {
    /// Whether this event comes from the transport rather than the user
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Event::StreamChunk { .. }
                | Event::StreamComplete
                | Event::StreamFailed { .. }
                | Event::SummaryComplete { .. }
                | Event::SummaryFailed { .. }
        )
    }
}
