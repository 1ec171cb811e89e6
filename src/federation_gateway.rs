use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::query_executor::QueryExecutor;
use crate::query_planner::QueryPlanner;
use crate::{GraphQLRequest, GraphQLResponse};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct FederationGateway {
    query_planner: Arc<Box<dyn QueryPlanner + Send + Sync>>,
    query_executor: Arc<Box<dyn QueryExecutor + Send + Sync>>,
    request_timeout: Duration,
}

impl FederationGateway {
    pub fn new(
        query_planner: Box<dyn QueryPlanner + Send + Sync>,
        query_executor: Box<dyn QueryExecutor + Send + Sync>,
    ) -> Self {
        FederationGateway {
            query_planner: Arc::new(query_planner),
            query_executor: Arc::new(query_executor),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Run one request to completion, or not at all.
    ///
    /// The whole execution shares `cancel` and the request deadline. When either
    /// fires, the execution future is dropped together with every backend call it
    /// still has in flight, and no partial response is produced.
    pub async fn process_request(
        &self,
        request: GraphQLRequest,
        cancel: CancellationToken,
    ) -> Result<GraphQLResponse, GatewayError> {
        tracing::debug!(operation = ?request.operation_name, "processing request");

        let plan = self.query_planner.plan_query(&request)?;
        let execution = tokio::time::timeout(
            self.request_timeout,
            self.query_executor.execute_plan(&plan),
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(operation = ?request.operation_name, "request cancelled");
                Err(GatewayError::Cancelled)
            }
            outcome = execution => match outcome {
                Ok(response) => {
                    if !response.errors.is_empty() {
                        tracing::debug!(errors = response.errors.len(), "response carries field errors");
                    }
                    Ok(response)
                }
                Err(_) => {
                    tracing::warn!(timeout = ?self.request_timeout, "request deadline exceeded");
                    Err(GatewayError::DeadlineExceeded(self.request_timeout))
                }
            },
        }
    }
}
