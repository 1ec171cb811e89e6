pub mod clients;
pub mod config;
pub mod error;
pub mod federation_gateway;
pub mod model;
pub mod pb;
pub mod query_executor;
pub mod query_planner;
pub mod resolver;
pub mod server;
pub mod timestamp;

pub use federation_gateway::FederationGateway;
pub use query_executor::FederatedQueryExecutor;
pub use query_planner::SimpleQueryPlanner;
pub use resolver::Resolver;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, ServiceError};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default)]
    pub variables: Option<Value>,
    #[serde(default, rename = "operationName")]
    pub operation_name: Option<String>,
}

/// One step in the path from the response root to a field.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorExtensions {
    pub code: ErrorKind,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct GraphQLError {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ErrorExtensions>,
}

impl GraphQLError {
    /// An error scoped to the field at `path`.
    pub fn at(err: &ServiceError, path: Vec<PathSegment>) -> Self {
        GraphQLError {
            message: err.message.clone(),
            path,
            extensions: Some(ErrorExtensions { code: err.kind }),
        }
    }

    /// A request-level error with no field path.
    pub fn request(message: impl Into<String>) -> Self {
        GraphQLError {
            message: message.into(),
            path: Vec::new(),
            extensions: None,
        }
    }
}

/// Data and field errors side by side; a failing branch never hides the others.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GraphQLResponse {
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

impl GraphQLResponse {
    pub fn error(message: impl Into<String>) -> Self {
        GraphQLResponse {
            data: None,
            errors: vec![GraphQLError::request(message)],
        }
    }
}
