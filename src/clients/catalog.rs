use std::sync::Arc;

use async_trait::async_trait;
use tonic::{Response, Status};

use super::{ChannelSlot, CloseGuard, GrpcClientConfig, connect_channel, map_status};
use crate::error::{ConnectionError, ServiceError};
use crate::model::{Money, NewProduct, Pagination, Product};
use crate::pb::catalog as pb;

const SERVICE: &str = "catalog";

#[async_trait]
pub trait CatalogBackend: Send + Sync {
    async fn post_product(
        &self,
        request: pb::PostProductRequest,
    ) -> Result<pb::PostProductResponse, Status>;

    async fn get_product(
        &self,
        request: pb::GetProductRequest,
    ) -> Result<pb::GetProductResponse, Status>;

    async fn get_products(
        &self,
        request: pb::GetProductsRequest,
    ) -> Result<pb::GetProductsResponse, Status>;

    fn shutdown(&self) {}
}

pub struct GrpcCatalogBackend {
    slot: ChannelSlot,
}

#[async_trait]
impl CatalogBackend for GrpcCatalogBackend {
    async fn post_product(
        &self,
        request: pb::PostProductRequest,
    ) -> Result<pb::PostProductResponse, Status> {
        pb::CatalogServiceClient::new(self.slot.channel()?)
            .post_product(request)
            .await
            .map(Response::into_inner)
    }

    async fn get_product(
        &self,
        request: pb::GetProductRequest,
    ) -> Result<pb::GetProductResponse, Status> {
        pb::CatalogServiceClient::new(self.slot.channel()?)
            .get_product(request)
            .await
            .map(Response::into_inner)
    }

    async fn get_products(
        &self,
        request: pb::GetProductsRequest,
    ) -> Result<pb::GetProductsResponse, Status> {
        pb::CatalogServiceClient::new(self.slot.channel()?)
            .get_products(request)
            .await
            .map(Response::into_inner)
    }

    fn shutdown(&self) {
        self.slot.release();
    }
}

#[derive(Clone)]
pub struct CatalogClient {
    backend: Arc<dyn CatalogBackend>,
    guard: Arc<CloseGuard>,
}

impl CatalogClient {
    pub async fn connect(target: &str, cfg: &GrpcClientConfig) -> Result<Self, ConnectionError> {
        let channel = connect_channel(SERVICE, target, cfg).await?;
        Ok(Self::with_backend(Arc::new(GrpcCatalogBackend {
            slot: ChannelSlot::new(channel),
        })))
    }

    pub fn with_backend(backend: Arc<dyn CatalogBackend>) -> Self {
        CatalogClient {
            backend,
            guard: Arc::new(CloseGuard::new(SERVICE)),
        }
    }

    pub fn close(&self) {
        self.guard.close(|| self.backend.shutdown());
    }

    pub async fn create_product(&self, product: &NewProduct) -> Result<Product, ServiceError> {
        if product.name.trim().is_empty() {
            return Err(ServiceError::invalid_argument("product name must not be empty"));
        }
        if product.price < Money::ZERO {
            return Err(ServiceError::invalid_argument(format!(
                "product price must not be negative, got {}",
                product.price
            )));
        }
        self.guard.ensure_open()?;
        let response = self
            .backend
            .post_product(pb::PostProductRequest {
                name: product.name.clone(),
                description: product.description.clone(),
                price: product.price.minor_units(),
            })
            .await
            .map_err(|status| map_status(SERVICE, "PostProduct", status))?;
        response
            .product
            .map(decode_product)
            .ok_or_else(|| ServiceError::decode("PostProduct response carried no product"))
    }

    pub async fn get_product(&self, id: &str) -> Result<Product, ServiceError> {
        self.guard.ensure_open()?;
        let response = self
            .backend
            .get_product(pb::GetProductRequest { id: id.to_string() })
            .await
            .map_err(|status| map_status(SERVICE, "GetProduct", status))?;
        response
            .product
            .map(decode_product)
            .ok_or_else(|| ServiceError::not_found(format!("product {id} not found")))
    }

    /// A page of products, optionally filtered by a free-text query.
    pub async fn list_products(
        &self,
        page: Pagination,
        query: Option<&str>,
    ) -> Result<Vec<Product>, ServiceError> {
        self.guard.ensure_open()?;
        let response = self
            .backend
            .get_products(pb::GetProductsRequest {
                skip: page.skip,
                take: page.take,
                ids: Vec::new(),
                query: query.unwrap_or_default().to_string(),
            })
            .await
            .map_err(|status| map_status(SERVICE, "GetProducts", status))?;
        Ok(response.products.into_iter().map(decode_product).collect())
    }

    /// Batch lookup. Unknown ids are simply absent from the result.
    pub async fn get_products(&self, ids: &[String]) -> Result<Vec<Product>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.guard.ensure_open()?;
        let response = self
            .backend
            .get_products(pb::GetProductsRequest {
                skip: 0,
                take: ids.len() as u64,
                ids: ids.to_vec(),
                query: String::new(),
            })
            .await
            .map_err(|status| map_status(SERVICE, "GetProducts", status))?;
        Ok(response.products.into_iter().map(decode_product).collect())
    }
}

fn decode_product(product: pb::Product) -> Product {
    Product {
        id: product.id,
        name: product.name,
        description: product.description,
        price: Money::from_minor_units(product.price),
        stock: product.stock,
    }
}
