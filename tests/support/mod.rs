#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use storefront_gateway::clients::{
    AccountBackend, AccountClient, CatalogBackend, CatalogClient, OrderBackend, OrderClient,
};
use storefront_gateway::pb::{account, catalog, order};
use storefront_gateway::resolver::BatchLimits;
use storefront_gateway::{
    FederatedQueryExecutor, FederationGateway, GraphQLRequest, GraphQLResponse, Resolver,
    SimpleQueryPlanner, timestamp,
};
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Knobs shared by every fake: an injected failure and an artificial latency.
#[derive(Default)]
pub struct Behavior {
    failure: Mutex<Option<Status>>,
    delay: Mutex<Option<Duration>>,
}

impl Behavior {
    pub fn fail_with(&self, status: Status) {
        *self.failure.lock().unwrap() = Some(status);
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn enter(&self) -> Result<(), Status> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failure.lock().unwrap().clone() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeAccountBackend {
    pub behavior: Behavior,
    accounts: Mutex<Vec<account::Account>>,
    pub get_account_calls: AtomicUsize,
    pub get_accounts_calls: AtomicUsize,
    pub post_calls: AtomicUsize,
    pub requested_ids: Mutex<Vec<Vec<String>>>,
    pub shutdowns: AtomicUsize,
}

impl FakeAccountBackend {
    pub fn with_accounts(accounts: &[(&str, &str)]) -> Self {
        let backend = FakeAccountBackend::default();
        *backend.accounts.lock().unwrap() = accounts
            .iter()
            .map(|(id, name)| account::Account {
                id: id.to_string(),
                name: name.to_string(),
            })
            .collect();
        backend
    }
}

#[async_trait]
impl AccountBackend for FakeAccountBackend {
    async fn post_account(
        &self,
        request: account::PostAccountRequest,
    ) -> Result<account::PostAccountResponse, Status> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        self.behavior.enter().await?;
        let mut accounts = self.accounts.lock().unwrap();
        let created = account::Account {
            id: format!("a{}", accounts.len() + 1),
            name: request.name,
        };
        accounts.push(created.clone());
        Ok(account::PostAccountResponse {
            account: Some(created),
        })
    }

    async fn get_account(
        &self,
        request: account::GetAccountRequest,
    ) -> Result<account::GetAccountResponse, Status> {
        self.get_account_calls.fetch_add(1, Ordering::SeqCst);
        self.behavior.enter().await?;
        let accounts = self.accounts.lock().unwrap();
        accounts
            .iter()
            .find(|a| a.id == request.id)
            .cloned()
            .map(|a| account::GetAccountResponse { account: Some(a) })
            .ok_or_else(|| Status::not_found(format!("account {} does not exist", request.id)))
    }

    async fn get_accounts(
        &self,
        request: account::GetAccountsRequest,
    ) -> Result<account::GetAccountsResponse, Status> {
        self.get_accounts_calls.fetch_add(1, Ordering::SeqCst);
        self.requested_ids
            .lock()
            .unwrap()
            .push(request.ids.clone());
        self.behavior.enter().await?;
        let accounts = self.accounts.lock().unwrap();
        let found = if request.ids.is_empty() {
            accounts
                .iter()
                .skip(request.skip as usize)
                .take(if request.take == 0 { usize::MAX } else { request.take as usize })
                .cloned()
                .collect()
        } else {
            // Deliberately answer in reverse so joins cannot rely on response order.
            accounts
                .iter()
                .rev()
                .filter(|a| request.ids.contains(&a.id))
                .cloned()
                .collect()
        };
        Ok(account::GetAccountsResponse { accounts: found })
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeCatalogBackend {
    pub behavior: Behavior,
    products: Mutex<Vec<catalog::Product>>,
    /// Any batch containing one of these ids fails with `Unavailable`.
    pub poisoned_ids: Mutex<HashSet<String>>,
    pub get_product_calls: AtomicUsize,
    pub get_products_calls: AtomicUsize,
    pub post_calls: AtomicUsize,
    pub requested_ids: Mutex<Vec<Vec<String>>>,
}

impl FakeCatalogBackend {
    /// Products `p1..=pN`, product `pi` priced at `i * 100` minor units.
    pub fn with_products(n: usize) -> Self {
        let backend = FakeCatalogBackend::default();
        *backend.products.lock().unwrap() = (1..=n)
            .map(|i| catalog::Product {
                id: format!("p{i}"),
                name: format!("Product {i}"),
                description: format!("Description {i}"),
                price: i as i64 * 100,
                stock: Some(i as u64),
            })
            .collect();
        backend
    }

    pub fn price_of(&self, id: &str) -> Option<(String, String, i64)> {
        self.products
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .map(|p| (p.name.clone(), p.description.clone(), p.price))
    }

    pub fn poison(&self, id: &str) {
        self.poisoned_ids.lock().unwrap().insert(id.to_string());
    }
}

#[async_trait]
impl CatalogBackend for FakeCatalogBackend {
    async fn post_product(
        &self,
        request: catalog::PostProductRequest,
    ) -> Result<catalog::PostProductResponse, Status> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        self.behavior.enter().await?;
        let mut products = self.products.lock().unwrap();
        let created = catalog::Product {
            id: format!("p{}", products.len() + 1),
            name: request.name,
            description: request.description,
            price: request.price,
            stock: None,
        };
        products.push(created.clone());
        Ok(catalog::PostProductResponse {
            product: Some(created),
        })
    }

    async fn get_product(
        &self,
        request: catalog::GetProductRequest,
    ) -> Result<catalog::GetProductResponse, Status> {
        self.get_product_calls.fetch_add(1, Ordering::SeqCst);
        self.behavior.enter().await?;
        let products = self.products.lock().unwrap();
        products
            .iter()
            .find(|p| p.id == request.id)
            .cloned()
            .map(|p| catalog::GetProductResponse { product: Some(p) })
            .ok_or_else(|| Status::not_found(format!("product {} does not exist", request.id)))
    }

    async fn get_products(
        &self,
        request: catalog::GetProductsRequest,
    ) -> Result<catalog::GetProductsResponse, Status> {
        self.get_products_calls.fetch_add(1, Ordering::SeqCst);
        self.requested_ids
            .lock()
            .unwrap()
            .push(request.ids.clone());
        self.behavior.enter().await?;
        {
            let poisoned = self.poisoned_ids.lock().unwrap();
            if request.ids.iter().any(|id| poisoned.contains(id)) {
                return Err(Status::unavailable("catalog shard unavailable"));
            }
        }

        let products = self.products.lock().unwrap();
        let found = if request.ids.is_empty() {
            products
                .iter()
                .filter(|p| request.query.is_empty() || p.name.contains(&request.query))
                .skip(request.skip as usize)
                .take(if request.take == 0 { usize::MAX } else { request.take as usize })
                .cloned()
                .collect()
        } else {
            products
                .iter()
                .rev()
                .filter(|p| request.ids.contains(&p.id))
                .cloned()
                .collect()
        };
        Ok(catalog::GetProductsResponse { products: found })
    }
}

pub struct FakeOrderBackend {
    pub behavior: Behavior,
    catalog: Arc<FakeCatalogBackend>,
    orders: Mutex<Vec<order::Order>>,
    pub post_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    /// Overrides the encoded `created_at` of every returned order.
    pub created_at_override: Mutex<Option<Vec<u8>>>,
    pub echo_products: Mutex<bool>,
}

impl FakeOrderBackend {
    /// Prices come from `catalog`, the way the real order service looks them up.
    pub fn new(catalog: Arc<FakeCatalogBackend>) -> Self {
        FakeOrderBackend {
            behavior: Behavior::default(),
            catalog,
            orders: Mutex::new(Vec::new()),
            post_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            created_at_override: Mutex::new(None),
            echo_products: Mutex::new(true),
        }
    }

    pub fn seed_order(&self, id: &str, account_id: &str, lines: &[(&str, u32)], at: DateTime<Utc>) {
        let products = self.enrich(lines.iter().map(|(p, q)| (p.to_string(), *q)));
        let total = products.iter().map(|p| p.price * i64::from(p.quantity)).sum();
        self.orders.lock().unwrap().push(order::Order {
            id: id.to_string(),
            created_at: timestamp::encode(&at),
            total_price: total,
            account_id: account_id.to_string(),
            products,
        });
    }

    fn enrich(&self, lines: impl Iterator<Item = (String, u32)>) -> Vec<order::OrderedProduct> {
        lines
            .map(|(id, quantity)| {
                let (name, description, price) = self.catalog.price_of(&id).unwrap_or_default();
                order::OrderedProduct {
                    id,
                    name,
                    description,
                    price,
                    quantity,
                }
            })
            .collect()
    }

    fn stamp(&self, mut order: order::Order) -> order::Order {
        if let Some(bytes) = self.created_at_override.lock().unwrap().clone() {
            order.created_at = bytes;
        }
        order
    }
}

#[async_trait]
impl OrderBackend for FakeOrderBackend {
    async fn post_order(
        &self,
        request: order::PostOrderRequest,
    ) -> Result<order::PostOrderResponse, Status> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        self.behavior.enter().await?;
        if request.products.is_empty() {
            return Err(Status::invalid_argument("order has no products"));
        }
        for line in &request.products {
            if self.catalog.price_of(&line.product_id).is_none() {
                return Err(Status::not_found(format!(
                    "product {} does not exist",
                    line.product_id
                )));
            }
        }

        let products = self.enrich(
            request
                .products
                .iter()
                .map(|p| (p.product_id.clone(), p.quantity)),
        );
        let total = products.iter().map(|p| p.price * i64::from(p.quantity)).sum();
        let mut orders = self.orders.lock().unwrap();
        let created = order::Order {
            id: format!("o{}", orders.len() + 1),
            created_at: timestamp::encode(&Utc::now()),
            total_price: total,
            account_id: request.account_id,
            products,
        };
        orders.push(created.clone());

        let mut echoed = self.stamp(created);
        if !*self.echo_products.lock().unwrap() {
            echoed.products.clear();
        }
        Ok(order::PostOrderResponse {
            order: Some(echoed),
        })
    }

    async fn get_orders_for_account(
        &self,
        request: order::GetOrdersForAccountRequest,
    ) -> Result<order::GetOrdersForAccountResponse, Status> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.behavior.enter().await?;
        let orders = self
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.account_id == request.account_id)
            .cloned()
            .map(|o| self.stamp(o))
            .collect();
        Ok(order::GetOrdersForAccountResponse { orders })
    }
}

pub struct Fixture {
    pub accounts: Arc<FakeAccountBackend>,
    pub catalog: Arc<FakeCatalogBackend>,
    pub orders: Arc<FakeOrderBackend>,
    pub limits: BatchLimits,
}

impl Fixture {
    /// Three accounts, 200 products and no orders.
    pub fn new() -> Self {
        let catalog = Arc::new(FakeCatalogBackend::with_products(200));
        Fixture {
            accounts: Arc::new(FakeAccountBackend::with_accounts(&[
                ("a1", "Ada"),
                ("a2", "Grace"),
                ("a3", "Barbara"),
            ])),
            orders: Arc::new(FakeOrderBackend::new(catalog.clone())),
            catalog,
            limits: BatchLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn account_client(&self) -> AccountClient {
        AccountClient::with_backend(self.accounts.clone())
    }

    pub fn catalog_client(&self) -> CatalogClient {
        CatalogClient::with_backend(self.catalog.clone())
    }

    pub fn order_client(&self) -> OrderClient {
        OrderClient::with_backend(self.orders.clone())
    }

    pub fn resolver(&self) -> Resolver {
        Resolver::new(self.account_client(), self.catalog_client(), self.order_client())
            .with_batch_limits(self.limits)
    }

    pub fn gateway(&self) -> FederationGateway {
        FederationGateway::new(
            Box::new(SimpleQueryPlanner::new()),
            Box::new(FederatedQueryExecutor::new(self.resolver())),
        )
    }

    pub async fn query(&self, query: &str, variables: Option<Value>) -> GraphQLResponse {
        self.gateway()
            .process_request(request(query, variables), CancellationToken::new())
            .await
            .expect("request should not fail as a whole")
    }
}

pub fn request(query: &str, variables: Option<Value>) -> GraphQLRequest {
    GraphQLRequest {
        query: query.to_string(),
        variables,
        operation_name: None,
    }
}

pub fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
