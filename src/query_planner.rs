use std::collections::HashMap;

use graphql_parser::query::{
    Definition, FragmentDefinition, OperationDefinition, SelectionSet, Value as GqlValue,
    VariableDefinition, parse_query,
};
use serde_json::{Map, Number, Value};

use crate::GraphQLRequest;
use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    pub fn root_type(&self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
        }
    }
}

/// A parsed request narrowed down to the one operation that will run.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub kind: OperationKind,
    pub selection_set: SelectionSet<'static, String>,
    pub fragments: HashMap<String, FragmentDefinition<'static, String>>,
    pub variables: Map<String, Value>,
}

pub trait QueryPlanner {
    fn plan_query(&self, request: &GraphQLRequest) -> Result<QueryPlan, GatewayError>;
}

#[derive(Debug, Default)]
pub struct SimpleQueryPlanner;

impl SimpleQueryPlanner {
    pub fn new() -> Self {
        SimpleQueryPlanner
    }

    fn select_operation(
        &self,
        operations: Vec<OperationDefinition<'static, String>>,
        operation_name: Option<&str>,
    ) -> Result<OperationDefinition<'static, String>, GatewayError> {
        match operation_name {
            Some(wanted) => operations
                .into_iter()
                .find(|op| operation_name_of(op) == Some(wanted))
                .ok_or_else(|| {
                    GatewayError::InvalidRequest(format!("unknown operation named {wanted:?}"))
                }),
            None => {
                let mut operations = operations.into_iter();
                match (operations.next(), operations.next()) {
                    (Some(op), None) => Ok(op),
                    (None, _) => Err(GatewayError::InvalidRequest(
                        "document contains no operation".to_string(),
                    )),
                    (Some(_), Some(_)) => Err(GatewayError::InvalidRequest(
                        "operationName is required when the document has several operations"
                            .to_string(),
                    )),
                }
            }
        }
    }
}

impl QueryPlanner for SimpleQueryPlanner {
    fn plan_query(&self, request: &GraphQLRequest) -> Result<QueryPlan, GatewayError> {
        let document = parse_query::<String>(&request.query)
            .map_err(|e| GatewayError::InvalidRequest(format!("failed to parse query: {e}")))?
            .into_static();

        let mut operations = Vec::new();
        let mut fragments = HashMap::new();
        for definition in document.definitions {
            match definition {
                Definition::Operation(op) => operations.push(op),
                Definition::Fragment(fragment) => {
                    fragments.insert(fragment.name.clone(), fragment);
                }
            }
        }

        let operation = self.select_operation(operations, request.operation_name.as_deref())?;
        let (kind, definitions, selection_set) = match operation {
            OperationDefinition::SelectionSet(set) => (OperationKind::Query, Vec::new(), set),
            OperationDefinition::Query(q) => {
                (OperationKind::Query, q.variable_definitions, q.selection_set)
            }
            OperationDefinition::Mutation(m) => {
                (OperationKind::Mutation, m.variable_definitions, m.selection_set)
            }
            OperationDefinition::Subscription(_) => {
                return Err(GatewayError::InvalidRequest(
                    "subscriptions are not supported".to_string(),
                ));
            }
        };

        let variables = coerce_variables(&definitions, request.variables.as_ref())?;
        tracing::debug!(?kind, variables = variables.len(), "planned operation");

        Ok(QueryPlan {
            kind,
            selection_set,
            fragments,
            variables,
        })
    }
}

fn operation_name_of<'a>(op: &'a OperationDefinition<'static, String>) -> Option<&'a str> {
    match op {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(q) => q.name.as_deref(),
        OperationDefinition::Mutation(m) => m.name.as_deref(),
        OperationDefinition::Subscription(s) => s.name.as_deref(),
    }
}

/// Provided values win over declared defaults; undeclared variables are dropped.
fn coerce_variables(
    definitions: &[VariableDefinition<'static, String>],
    provided: Option<&Value>,
) -> Result<Map<String, Value>, GatewayError> {
    let provided = match provided {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(GatewayError::InvalidRequest(
                "variables must be a JSON object".to_string(),
            ));
        }
    };

    let empty = Map::new();
    let mut variables = Map::new();
    for definition in definitions {
        if let Some(value) = provided.get(&definition.name) {
            variables.insert(definition.name.clone(), value.clone());
        } else if let Some(default) = &definition.default_value {
            variables.insert(definition.name.clone(), value_to_json(default, &empty));
        }
    }
    Ok(variables)
}

/// Convert a literal from the query document, substituting variables.
pub(crate) fn value_to_json(value: &GqlValue<'static, String>, variables: &Map<String, Value>) -> Value {
    match value {
        GqlValue::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        GqlValue::Int(n) => n.as_i64().map(Value::from).unwrap_or(Value::Null),
        GqlValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        GqlValue::String(s) => Value::String(s.clone()),
        GqlValue::Boolean(b) => Value::Bool(*b),
        GqlValue::Null => Value::Null,
        GqlValue::Enum(e) => Value::String(e.clone()),
        GqlValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| value_to_json(item, variables))
                .collect(),
        ),
        GqlValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v, variables)))
                .collect(),
        ),
    }
}
