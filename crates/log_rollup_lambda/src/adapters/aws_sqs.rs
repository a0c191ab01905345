use aws_sdk_sqs::types::MessageSystemAttributeName;
use tokio::runtime::Handle;

use crate::adapters::task_queue::{ReceivedMessage, TaskQueue};

/// SQS caps a single receive at ten messages.
const MAX_RECEIVE_BATCH: usize = 10;

pub struct SqsTaskQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
    runtime: Handle,
}

impl SqsTaskQueue {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>, runtime: Handle) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            runtime,
        }
    }

    pub async fn resolve_queue_url(
        client: &aws_sdk_sqs::Client,
        queue_name: &str,
    ) -> Result<String, String> {
        let output = client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|error| format!("failed to resolve queue {queue_name}: {error}"))?;
        output
            .queue_url()
            .map(str::to_string)
            .ok_or_else(|| format!("queue {queue_name} has no URL"))
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

impl TaskQueue for SqsTaskQueue {
    fn send(&self, body: &str) -> Result<(), String> {
        let client = self.client.clone();
        let queue_url = self.queue_url.clone();
        let body = body.to_string();
        tokio::task::block_in_place(|| {
            self.runtime.block_on(async move {
                client
                    .send_message()
                    .queue_url(queue_url)
                    .message_body(body)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to enqueue task message: {error}"))
            })
        })
    }

    fn receive(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>, String> {
        let client = self.client.clone();
        let queue_url = self.queue_url.clone();
        let max_messages = max_messages.clamp(1, MAX_RECEIVE_BATCH) as i32;
        tokio::task::block_in_place(|| {
            self.runtime.block_on(async move {
                let output = client
                    .receive_message()
                    .queue_url(queue_url)
                    .max_number_of_messages(max_messages)
                    .message_system_attribute_names(
                        MessageSystemAttributeName::ApproximateReceiveCount,
                    )
                    .send()
                    .await
                    .map_err(|error| format!("failed to receive task messages: {error}"))?;

                Ok(output
                    .messages()
                    .iter()
                    .map(|message| ReceivedMessage {
                        message_id: message.message_id().unwrap_or_default().to_string(),
                        receipt_handle: message.receipt_handle().unwrap_or_default().to_string(),
                        body: message.body().unwrap_or_default().to_string(),
                        receive_count: message
                            .attributes()
                            .and_then(|attributes| {
                                attributes.get(&MessageSystemAttributeName::ApproximateReceiveCount)
                            })
                            .and_then(|value| value.parse().ok())
                            .unwrap_or(1),
                    })
                    .collect())
            })
        })
    }

    fn delete(&self, receipt_handle: &str) -> Result<(), String> {
        let client = self.client.clone();
        let queue_url = self.queue_url.clone();
        let receipt_handle = receipt_handle.to_string();
        tokio::task::block_in_place(|| {
            self.runtime.block_on(async move {
                client
                    .delete_message()
                    .queue_url(queue_url)
                    .receipt_handle(receipt_handle)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to delete task message: {error}"))
            })
        })
    }
}
