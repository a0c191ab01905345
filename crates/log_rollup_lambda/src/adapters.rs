pub mod aws_s3;
pub mod aws_sqs;
pub mod aws_sts;
pub mod credentials;
pub mod object_store;
pub mod task_queue;
