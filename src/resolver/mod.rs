//! Resolver layer: root lookups, mutations and the cross-service relationships.
//!
//! Root operations call exactly one backend. Relationship operations take every
//! sibling parent of one field-resolution pass at once, collect the identifiers
//! they reference, dispatch them in a single batch and join the results back per
//! parent. Nothing here outlives the pass that called it.

pub mod batch;

use std::sync::Arc;

use crate::clients::{AccountClient, CatalogClient, OrderClient};
use crate::error::ServiceError;
use crate::model::{Account, NewProduct, Order, OrderItemInput, OrderedProduct, Pagination, Product};

pub use batch::{BatchCollector, BatchResults, PassState};

/// Per-call caps on batched lookups; `None` sends each pass as one call.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchLimits {
    pub accounts: Option<usize>,
    pub catalog: Option<usize>,
}

#[derive(Clone)]
pub struct Resolver {
    accounts: AccountClient,
    catalog: CatalogClient,
    orders: OrderClient,
    limits: BatchLimits,
}

impl Resolver {
    pub fn new(accounts: AccountClient, catalog: CatalogClient, orders: OrderClient) -> Self {
        Resolver {
            accounts,
            catalog,
            orders,
            limits: BatchLimits::default(),
        }
    }

    pub fn with_batch_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn close(&self) {
        self.accounts.close();
        self.catalog.close();
        self.orders.close();
    }

    pub async fn account(&self, id: &str) -> Result<Account, ServiceError> {
        self.accounts.get_account(id).await
    }

    pub async fn accounts(
        &self,
        page: Pagination,
        id: Option<&str>,
    ) -> Result<Vec<Account>, ServiceError> {
        match id {
            Some(id) => Ok(vec![self.accounts.get_account(id).await?]),
            None => self.accounts.list_accounts(page).await,
        }
    }

    pub async fn product(&self, id: &str) -> Result<Product, ServiceError> {
        self.catalog.get_product(id).await
    }

    /// Either a lookup by ids (in the requested order, unknown ids skipped) or a
    /// page of the catalog filtered by `query`.
    pub async fn products(
        &self,
        page: Pagination,
        query: Option<&str>,
        ids: Vec<String>,
    ) -> Result<Vec<Product>, ServiceError> {
        if ids.is_empty() {
            return self.catalog.list_products(page, query).await;
        }

        let mut collector = BatchCollector::new(self.limits.catalog);
        for id in &ids {
            collector.push(id.clone());
        }
        let results = collector
            .dispatch(
                |chunk| async move { self.catalog.get_products(&chunk).await },
                |product: &Product| product.id.clone(),
            )
            .await;

        let mut products = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(product) = results.get(id)? {
                products.push(Product::clone(&product));
            }
        }
        Ok(products)
    }

    pub async fn orders(&self, account_id: &str) -> Result<Vec<Order>, ServiceError> {
        self.orders.list_orders(account_id).await
    }

    pub async fn create_account(&self, name: &str) -> Result<Account, ServiceError> {
        self.accounts.create_account(name).await
    }

    pub async fn create_product(&self, product: &NewProduct) -> Result<Product, ServiceError> {
        self.catalog.create_product(product).await
    }

    pub async fn create_order(
        &self,
        account_id: &str,
        items: &[OrderItemInput],
    ) -> Result<Order, ServiceError> {
        self.orders.create_order(account_id, items).await
    }

    /// `Account.orders` for every sibling account. The order backend has no batch
    /// lookup, so each distinct account id gets one concurrent call.
    pub async fn account_orders(
        &self,
        accounts: &[Arc<Account>],
    ) -> Vec<Result<Vec<Arc<Order>>, ServiceError>> {
        let mut collector = BatchCollector::new(None);
        for account in accounts {
            collector.push(account.id.clone());
        }
        let results = collector
            .dispatch_each(|account_id: String| async move {
                let orders = self.orders.list_orders(&account_id).await?;
                Ok::<_, ServiceError>(orders.into_iter().map(Arc::new).collect::<Vec<_>>())
            })
            .await;
        log_pass("Account.orders", &results);

        accounts
            .iter()
            .map(|account| {
                results
                    .get(&account.id)
                    .map(|orders| orders.map(|o| o.as_ref().clone()).unwrap_or_default())
            })
            .collect()
    }

    /// `Order.account` for every sibling order, joined by account id.
    pub async fn order_accounts(
        &self,
        orders: &[Arc<Order>],
    ) -> Vec<Result<Option<Arc<Account>>, ServiceError>> {
        let mut collector = BatchCollector::new(self.limits.accounts);
        for order in orders {
            collector.push(order.account_id.clone());
        }
        let results = collector
            .dispatch(
                |ids| async move { self.accounts.get_accounts(&ids).await },
                |account: &Account| account.id.clone(),
            )
            .await;
        log_pass("Order.account", &results);

        orders
            .iter()
            .map(|order| results.get(&order.account_id))
            .collect()
    }

    /// `OrderedProduct.product` for every ordered product in the pass, whatever
    /// order it belongs to, in a single catalog lookup.
    pub async fn ordered_products(
        &self,
        items: &[Arc<OrderedProduct>],
    ) -> Vec<Result<Option<Arc<Product>>, ServiceError>> {
        let mut collector = BatchCollector::new(self.limits.catalog);
        for item in items {
            collector.push(item.product_id.clone());
        }
        let results = collector
            .dispatch(
                |chunk| async move { self.catalog.get_products(&chunk).await },
                |product: &Product| product.id.clone(),
            )
            .await;
        log_pass("OrderedProduct.product", &results);

        items
            .iter()
            .map(|item| results.get(&item.product_id))
            .collect()
    }
}

fn log_pass<K, V>(field: &'static str, results: &BatchResults<K, V>)
where
    K: Eq + std::hash::Hash,
{
    match results.state() {
        PassState::Fulfilled => {
            tracing::debug!(field, calls = results.calls(), "relationship resolved")
        }
        state => {
            tracing::warn!(field, calls = results.calls(), ?state, "relationship resolved with failures")
        }
    }
}
