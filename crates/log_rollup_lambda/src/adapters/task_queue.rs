#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    /// 1 on first delivery.
    pub receive_count: u32,
}

pub trait TaskQueue: Send + Sync {
    fn send(&self, body: &str) -> Result<(), String>;

    /// Up to `max_messages` messages; leased until deleted or their lease lapses.
    fn receive(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>, String>;

    fn delete(&self, receipt_handle: &str) -> Result<(), String>;
}
