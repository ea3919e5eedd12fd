//! AWS Lambda entry point.
//!
//! Build with: cargo lambda build --release --arm64 --bin lambda
//! Deploy artifact: target/lambda/lambda/bootstrap

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use logship::source::store::S3ObjectStore;
use logship::timestamp::trace_id_from_xray_header;
use logship::{build_client, Config, InvocationContext};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for CloudWatch Logs
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .json()
        .with_target(false)
        .without_time() // Lambda adds timestamps
        .init();

    info!("Lambda cold start - initializing");

    // Region clients are cached across invocations.
    let store = Arc::new(S3ObjectStore::new());

    run(service_fn(|event| handler(event, store.clone()))).await
}

async fn handler(event: LambdaEvent<JsonValue>, store: Arc<S3ObjectStore>) -> Result<(), Error> {
    let request_id = event.context.request_id.clone();
    let trace_id = event
        .context
        .xray_trace_id
        .as_deref()
        .and_then(trace_id_from_xray_header);

    let config = Config::from_env().map_err(|e| {
        error!(error = %e, request_id = %request_id, "invalid configuration");
        Error::from(e.to_string())
    })?;
    let client = build_client(&config, trace_id).map_err(|e| {
        error!(error = %e, request_id = %request_id, "failed to build delivery client");
        Error::from(e.to_string())
    })?;

    let context = InvocationContext {
        config,
        client: client.clone(),
        store,
    };

    let result = context.process(event.payload).await;
    if let Err(e) = &result {
        error!(error = %e, request_id = %request_id, "error processing event");
    }

    // Drain anything the client buffered even when processing failed partway.
    if let Err(e) = client.shutdown().await {
        error!(error = %e, request_id = %request_id, "error draining delivery client");
        return Err(Error::from(e.to_string()));
    }

    result.map_err(|e| Error::from(e.to_string()))
}
