use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::SecondsFormat;
use futures::future::{BoxFuture, FutureExt, join_all};
use graphql_parser::query::{Directive, Field, Selection, SelectionSet, TypeCondition};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::error::ServiceError;
use crate::model::{Account, NewProduct, Order, OrderItemInput, OrderedProduct, Pagination, Product};
use crate::query_planner::{OperationKind, QueryPlan, value_to_json};
use crate::resolver::Resolver;
use crate::{GraphQLError, GraphQLResponse, PathSegment};

#[async_trait]
pub trait QueryExecutor {
    async fn execute_plan(&self, plan: &QueryPlan) -> GraphQLResponse;
}

/// Walks a plan's selection sets one field-resolution pass at a time, handing
/// every pass to the [`Resolver`] with all sibling parents at once.
pub struct FederatedQueryExecutor {
    resolver: Resolver,
}

impl FederatedQueryExecutor {
    pub fn new(resolver: Resolver) -> Self {
        FederatedQueryExecutor { resolver }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }
}

#[async_trait]
impl QueryExecutor for FederatedQueryExecutor {
    async fn execute_plan(&self, plan: &QueryPlan) -> GraphQLResponse {
        let root_type = plan.kind.root_type();
        let fields = collect_fields(plan, root_type, &plan.selection_set);

        let results = match plan.kind {
            OperationKind::Query => {
                join_all(fields.iter().map(|field| self.resolve_root(plan, field))).await
            }
            // Mutations have side effects and run in document order.
            OperationKind::Mutation => {
                let mut results = Vec::with_capacity(fields.len());
                for field in &fields {
                    results.push(self.resolve_root(plan, field).await);
                }
                results
            }
        };

        let mut data = Map::new();
        let mut errors = Vec::new();
        for (field, (value, field_errors)) in fields.iter().zip(results) {
            data.insert(response_key(field).to_string(), value);
            errors.extend(field_errors);
        }
        GraphQLResponse {
            data: Some(Value::Object(data)),
            errors,
        }
    }
}

/// What a relationship field resolved to for one parent.
enum Link {
    One(Option<Node>),
    Many(Vec<Node>),
}

#[derive(Clone)]
enum Node {
    Account(Arc<Account>),
    Order(Arc<Order>),
    OrderedProduct(Arc<OrderedProduct>),
    Product(Arc<Product>),
}

impl Node {
    fn type_name(&self) -> &'static str {
        match self {
            Node::Account(_) => "Account",
            Node::Order(_) => "Order",
            Node::OrderedProduct(_) => "OrderedProduct",
            Node::Product(_) => "Product",
        }
    }

    /// `None` for fields the type does not have or that need a backend call.
    fn scalar(&self, field: &str) -> Option<Value> {
        let value = match (self, field) {
            (node, "__typename") => json!(node.type_name()),

            (Node::Account(a), "id") => json!(a.id),
            (Node::Account(a), "name") => json!(a.name),

            (Node::Order(o), "id") => json!(o.id),
            (Node::Order(o), "createdAt") => {
                json!(o.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            (Node::Order(o), "totalPrice") => json!(o.total_price.minor_units()),
            (Node::Order(o), "accountId") => json!(o.account_id),

            (Node::OrderedProduct(p), "id") => json!(p.product_id),
            (Node::OrderedProduct(p), "quantity") => json!(p.quantity.get()),
            (Node::OrderedProduct(p), "name") => json!(p.snapshot.as_ref().map(|s| &s.name)),
            (Node::OrderedProduct(p), "description") => {
                json!(p.snapshot.as_ref().map(|s| &s.description))
            }
            (Node::OrderedProduct(p), "price") => {
                json!(p.snapshot.as_ref().map(|s| s.price.minor_units()))
            }
            (Node::OrderedProduct(p), "lineTotal") => {
                json!(p.line_total().map(|m| m.minor_units()))
            }

            (Node::Product(p), "id") => json!(p.id),
            (Node::Product(p), "name") => json!(p.name),
            (Node::Product(p), "description") => json!(p.description),
            (Node::Product(p), "price") => json!(p.price.minor_units()),
            (Node::Product(p), "stock") => json!(p.stock),

            _ => return None,
        };
        Some(value)
    }
}

#[derive(Deserialize)]
struct AccountInput {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderInput {
    account_id: String,
    products: Vec<OrderItemInput>,
}

impl FederatedQueryExecutor {
    async fn resolve_root(
        &self,
        plan: &QueryPlan,
        field: &Field<'static, String>,
    ) -> (Value, Vec<GraphQLError>) {
        let path = vec![PathSegment::Key(response_key(field).to_string())];
        if field.name == "__typename" {
            return (json!(plan.kind.root_type()), Vec::new());
        }

        let link = match self.root_link(plan, field).await {
            Ok(link) => link,
            Err(err) => {
                tracing::warn!(field = %field.name, error = %err, "root field failed");
                return (Value::Null, vec![GraphQLError::at(&err, path)]);
            }
        };
        let (mut values, errors) = self
            .complete(plan, vec![Ok(link)], vec![path], field)
            .await;
        (values.pop().unwrap_or(Value::Null), errors)
    }

    async fn root_link(
        &self,
        plan: &QueryPlan,
        field: &Field<'static, String>,
    ) -> Result<Link, ServiceError> {
        let args = arguments(field, plan);
        let resolver = &self.resolver;

        match (plan.kind, field.name.as_str()) {
            (OperationKind::Query, "account") => {
                let id: String = required_arg(&args, "id")?;
                let account = resolver.account(&id).await?;
                Ok(Link::One(Some(Node::Account(Arc::new(account)))))
            }
            (OperationKind::Query, "accounts") => {
                let page: Pagination = optional_arg(&args, "pagination")?.unwrap_or_default();
                let id: Option<String> = optional_arg(&args, "id")?;
                let accounts = resolver.accounts(page, id.as_deref()).await?;
                Ok(Link::Many(accounts.into_iter().map(|a| Node::Account(Arc::new(a))).collect()))
            }
            (OperationKind::Query, "product") => {
                let id: String = required_arg(&args, "id")?;
                let product = resolver.product(&id).await?;
                Ok(Link::One(Some(Node::Product(Arc::new(product)))))
            }
            (OperationKind::Query, "products") => {
                let page: Pagination = optional_arg(&args, "pagination")?.unwrap_or_default();
                let query: Option<String> = optional_arg(&args, "query")?;
                let mut ids: Vec<String> = optional_arg(&args, "ids")?.unwrap_or_default();
                if let Some(id) = optional_arg::<String>(&args, "id")? {
                    ids.insert(0, id);
                }
                let products = resolver.products(page, query.as_deref(), ids).await?;
                Ok(Link::Many(products.into_iter().map(|p| Node::Product(Arc::new(p))).collect()))
            }
            (OperationKind::Query, "orders") => {
                let account_id: String = required_arg(&args, "accountId")?;
                let orders = resolver.orders(&account_id).await?;
                Ok(Link::Many(orders.into_iter().map(|o| Node::Order(Arc::new(o))).collect()))
            }
            (OperationKind::Mutation, "createAccount") => {
                let input: AccountInput = required_arg(&args, "account")?;
                let account = resolver.create_account(&input.name).await?;
                Ok(Link::One(Some(Node::Account(Arc::new(account)))))
            }
            (OperationKind::Mutation, "createProduct") => {
                let input: NewProduct = required_arg(&args, "product")?;
                let product = resolver.create_product(&input).await?;
                Ok(Link::One(Some(Node::Product(Arc::new(product)))))
            }
            (OperationKind::Mutation, "createOrder") => {
                let input: OrderInput = required_arg(&args, "order")?;
                let order = resolver.create_order(&input.account_id, &input.products).await?;
                Ok(Link::One(Some(Node::Order(Arc::new(order)))))
            }
            (kind, name) => Err(ServiceError::invalid_argument(format!(
                "unknown field {name} on type {}",
                kind.root_type()
            ))),
        }
    }

    /// Resolve `set` for all sibling `nodes` of one type. Fields run concurrently;
    /// each relationship field is one pass over every sibling.
    fn resolve_objects<'a>(
        &'a self,
        plan: &'a QueryPlan,
        nodes: Vec<Node>,
        paths: Vec<Vec<PathSegment>>,
        set: &'a SelectionSet<'static, String>,
    ) -> BoxFuture<'a, (Vec<Value>, Vec<GraphQLError>)> {
        async move {
            let Some(first) = nodes.first() else {
                return (Vec::new(), Vec::new());
            };
            let fields = collect_fields(plan, first.type_name(), set);
            let results = join_all(
                fields
                    .iter()
                    .map(|field| self.resolve_field(plan, &nodes, &paths, field)),
            )
            .await;

            let mut objects = vec![Map::new(); nodes.len()];
            let mut errors = Vec::new();
            for (field, (values, field_errors)) in fields.iter().zip(results) {
                let key = response_key(field);
                for (object, value) in objects.iter_mut().zip(values) {
                    object.insert(key.to_string(), value);
                }
                errors.extend(field_errors);
            }
            (objects.into_iter().map(Value::Object).collect(), errors)
        }
        .boxed()
    }

    async fn resolve_field(
        &self,
        plan: &QueryPlan,
        nodes: &[Node],
        paths: &[Vec<PathSegment>],
        field: &Field<'static, String>,
    ) -> (Vec<Value>, Vec<GraphQLError>) {
        let key = response_key(field);
        let field_paths: Vec<Vec<PathSegment>> = paths
            .iter()
            .map(|path| {
                let mut path = path.clone();
                path.push(PathSegment::Key(key.to_string()));
                path
            })
            .collect();

        let links = match self.relationship(nodes, &field.name).await {
            Some(links) => links,
            None => return resolve_scalars(nodes, field_paths, field),
        };
        self.complete(plan, links, field_paths, field).await
    }

    /// Resolve a relationship for every sibling at once, or `None` if `name`
    /// is not a relationship of the siblings' type.
    async fn relationship(
        &self,
        nodes: &[Node],
        name: &str,
    ) -> Option<Vec<Result<Link, ServiceError>>> {
        let type_name = nodes.first()?.type_name();
        let links = match (type_name, name) {
            ("Account", "orders") => {
                let accounts: Vec<Arc<Account>> = nodes
                    .iter()
                    .filter_map(|n| match n {
                        Node::Account(a) => Some(a.clone()),
                        _ => None,
                    })
                    .collect();
                self.resolver
                    .account_orders(&accounts)
                    .await
                    .into_iter()
                    .map(|r| r.map(|orders| Link::Many(orders.into_iter().map(Node::Order).collect())))
                    .collect()
            }
            ("Order", "account") => {
                let orders = orders_of(nodes);
                self.resolver
                    .order_accounts(&orders)
                    .await
                    .into_iter()
                    .map(|r| r.map(|account| Link::One(account.map(Node::Account))))
                    .collect()
            }
            ("Order", "products") => orders_of(nodes)
                .iter()
                .map(|order| {
                    Ok(Link::Many(
                        order
                            .products
                            .iter()
                            .map(|p| Node::OrderedProduct(Arc::new(p.clone())))
                            .collect(),
                    ))
                })
                .collect(),
            ("OrderedProduct", "product") => {
                let items: Vec<Arc<OrderedProduct>> = nodes
                    .iter()
                    .filter_map(|n| match n {
                        Node::OrderedProduct(p) => Some(p.clone()),
                        _ => None,
                    })
                    .collect();
                self.resolver
                    .ordered_products(&items)
                    .await
                    .into_iter()
                    .map(|r| r.map(|product| Link::One(product.map(Node::Product))))
                    .collect()
            }
            _ => return None,
        };
        Some(links)
    }

    /// Turn per-parent links into response values, resolving the selected
    /// sub-fields of every linked child as one further pass.
    async fn complete(
        &self,
        plan: &QueryPlan,
        links: Vec<Result<Link, ServiceError>>,
        field_paths: Vec<Vec<PathSegment>>,
        field: &Field<'static, String>,
    ) -> (Vec<Value>, Vec<GraphQLError>) {
        let mut values = vec![Value::Null; links.len()];
        let mut errors = Vec::new();
        let mut children = Vec::new();
        let mut child_paths = Vec::new();
        let mut slots: Vec<(usize, Option<usize>)> = Vec::new();

        for (i, (link, path)) in links.into_iter().zip(field_paths).enumerate() {
            match link {
                Err(err) => {
                    tracing::warn!(field = %field.name, error = %err, "field failed");
                    errors.push(GraphQLError::at(&err, path));
                }
                Ok(Link::One(None)) => {}
                Ok(Link::One(Some(node))) => {
                    children.push(node);
                    child_paths.push(path);
                    slots.push((i, None));
                }
                Ok(Link::Many(nodes)) => {
                    values[i] = Value::Array(vec![Value::Null; nodes.len()]);
                    for (j, node) in nodes.into_iter().enumerate() {
                        let mut item_path = path.clone();
                        item_path.push(PathSegment::Index(j));
                        children.push(node);
                        child_paths.push(item_path);
                        slots.push((i, Some(j)));
                    }
                }
            }
        }

        let (child_values, child_errors) = self
            .resolve_objects(plan, children, child_paths, &field.selection_set)
            .await;
        errors.extend(child_errors);

        for ((i, j), value) in slots.into_iter().zip(child_values) {
            match j {
                None => values[i] = value,
                Some(j) => {
                    if let Some(slot) = values[i].get_mut(j) {
                        *slot = value;
                    }
                }
            }
        }
        (values, errors)
    }
}

fn orders_of(nodes: &[Node]) -> Vec<Arc<Order>> {
    nodes
        .iter()
        .filter_map(|n| match n {
            Node::Order(o) => Some(o.clone()),
            _ => None,
        })
        .collect()
}

fn resolve_scalars(
    nodes: &[Node],
    field_paths: Vec<Vec<PathSegment>>,
    field: &Field<'static, String>,
) -> (Vec<Value>, Vec<GraphQLError>) {
    let mut values = Vec::with_capacity(nodes.len());
    let mut errors = Vec::new();
    for (node, path) in nodes.iter().zip(field_paths) {
        match node.scalar(&field.name) {
            Some(value) => values.push(value),
            None => {
                let err = ServiceError::invalid_argument(format!(
                    "unknown field {} on type {}",
                    field.name,
                    node.type_name()
                ));
                errors.push(GraphQLError::at(&err, path));
                values.push(Value::Null);
            }
        }
    }
    (values, errors)
}

fn response_key<'f>(field: &'f Field<'static, String>) -> &'f str {
    field.alias.as_deref().unwrap_or(&field.name)
}

/// Flatten fragments into the fields that apply to `type_name`. Fields sharing
/// a response key are merged into one, their sub-selections concatenated in
/// document order.
fn collect_fields<'a>(
    plan: &'a QueryPlan,
    type_name: &str,
    set: &'a SelectionSet<'static, String>,
) -> Vec<Cow<'a, Field<'static, String>>> {
    let mut groups: Vec<Vec<&'a Field<'static, String>>> = Vec::new();
    let mut by_key = HashMap::new();
    let mut visited = HashSet::new();
    collect_into(plan, type_name, set, &mut groups, &mut by_key, &mut visited);

    groups
        .into_iter()
        .filter_map(|group| {
            let (first, rest) = group.split_first()?;
            if rest.is_empty() {
                return Some(Cow::Borrowed(*first));
            }
            let mut merged = Field::clone(first);
            for field in rest {
                merged
                    .selection_set
                    .items
                    .extend(field.selection_set.items.iter().cloned());
            }
            Some(Cow::Owned(merged))
        })
        .collect()
}

fn collect_into<'a>(
    plan: &'a QueryPlan,
    type_name: &str,
    set: &'a SelectionSet<'static, String>,
    groups: &mut Vec<Vec<&'a Field<'static, String>>>,
    by_key: &mut HashMap<&'a str, usize>,
    visited: &mut HashSet<&'a str>,
) {
    for selection in &set.items {
        match selection {
            Selection::Field(field) => {
                if !included(&field.directives, plan) {
                    continue;
                }
                match by_key.get(response_key(field)) {
                    Some(&index) => groups[index].push(field),
                    None => {
                        by_key.insert(response_key(field), groups.len());
                        groups.push(vec![field]);
                    }
                }
            }
            Selection::FragmentSpread(spread) => {
                if !included(&spread.directives, plan) || !visited.insert(spread.fragment_name.as_str())
                {
                    continue;
                }
                if let Some(fragment) = plan.fragments.get(&spread.fragment_name) {
                    if applies(&fragment.type_condition, type_name) {
                        collect_into(plan, type_name, &fragment.selection_set, groups, by_key, visited);
                    }
                }
            }
            Selection::InlineFragment(inline) => {
                let matches = inline
                    .type_condition
                    .as_ref()
                    .is_none_or(|condition| applies(condition, type_name));
                if matches && included(&inline.directives, plan) {
                    collect_into(plan, type_name, &inline.selection_set, groups, by_key, visited);
                }
            }
        }
    }
}

fn applies(condition: &TypeCondition<'static, String>, type_name: &str) -> bool {
    let TypeCondition::On(name) = condition;
    name == type_name
}

/// Honour `@skip(if:)` and `@include(if:)`.
fn included(directives: &[Directive<'static, String>], plan: &QueryPlan) -> bool {
    directives.iter().all(|directive| {
        let condition = directive
            .arguments
            .iter()
            .find(|(name, _)| name == "if")
            .map(|(_, value)| value_to_json(value, &plan.variables))
            .and_then(|value| value.as_bool());
        match (directive.name.as_str(), condition) {
            ("skip", Some(true)) => false,
            ("include", Some(false)) => false,
            _ => true,
        }
    })
}

fn arguments(field: &Field<'static, String>, plan: &QueryPlan) -> Map<String, Value> {
    field
        .arguments
        .iter()
        .map(|(name, value)| (name.clone(), value_to_json(value, &plan.variables)))
        .collect()
}

fn optional_arg<T: DeserializeOwned>(
    args: &Map<String, Value>,
    name: &str,
) -> Result<Option<T>, ServiceError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| ServiceError::invalid_argument(format!("argument {name}: {e}"))),
    }
}

fn required_arg<T: DeserializeOwned>(
    args: &Map<String, Value>,
    name: &str,
) -> Result<T, ServiceError> {
    optional_arg(args, name)?
        .ok_or_else(|| ServiceError::invalid_argument(format!("argument {name} is required")))
}
