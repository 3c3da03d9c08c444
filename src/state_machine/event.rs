//! Events that can occur in a session

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    UserMessage {
        request_id: String,
        text: String,
    },
    Reset,

    // Generator events
    ResponseReady {
        request_id: String,
        reply: String,
    },
    ResponseFailed {
        request_id: String,
        message: String,
    },
}
