use std::sync::Arc;

use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use log_rollup_core::contract::ProducerRequest;
use log_rollup_lambda::config::RollupConfig;
use log_rollup_lambda::handlers::producer::run_producer;
use log_rollup_lambda::handlers::worker::{decode_queue_event, is_sqs_event, run_worker};
use log_rollup_lambda::logging::init_tracing;
use log_rollup_lambda::runtime::AwsServices;
use serde_json::Value;

async fn handle_request(
    event: LambdaEvent<Value>,
    services: Arc<AwsServices>,
) -> Result<Value, Error> {
    let (payload, _context) = event.into_parts();
    tokio::task::spawn_blocking(move || dispatch(payload, &services))
        .await
        .map_err(|error| Error::from(format!("handler task failed: {error}")))?
}

/// Queue events run the worker; any other payload is a producer request.
fn dispatch(payload: Value, services: &AwsServices) -> Result<Value, Error> {
    if is_sqs_event(&payload) {
        let records = decode_queue_event(&payload)?;
        let response = run_worker(
            &records,
            &services.config.archiver,
            &services.config.redrive,
            &services.archiver_deps(),
        )?;
        return serde_json::to_value(response)
            .map_err(|error| Error::from(format!("failed to serialize batch response: {error}")));
    }

    let request: ProducerRequest = serde_json::from_value(payload)
        .map_err(|error| Error::from(format!("malformed producer request: {error}")))?;
    let summary = run_producer(
        request,
        Utc::now().date_naive(),
        services.config.batch_limits,
        &services.producer_deps()?,
    )?;
    serde_json::to_value(summary)
        .map_err(|error| Error::from(format!("failed to serialize producer summary: {error}")))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = RollupConfig::from_env()?;
    init_tracing(&config.log_level);
    let services = Arc::new(AwsServices::load(config).await?);

    lambda_runtime::run(service_fn(move |event| {
        let services = Arc::clone(&services);
        async move { handle_request(event, services).await }
    }))
    .await
}
