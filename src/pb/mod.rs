//! Wire contracts of the backend services, generated from `proto/*.proto`
//! (protobuf package `pb`).

mod generated {
    tonic::include_proto!("pb");
}

pub mod account {
    pub use super::generated::account_service_client::AccountServiceClient;
    pub use super::generated::account_service_server::{AccountService, AccountServiceServer};
    pub use super::generated::{
        Account, GetAccountRequest, GetAccountResponse, GetAccountsRequest, GetAccountsResponse,
        PostAccountRequest, PostAccountResponse,
    };
}

pub mod catalog {
    pub use super::generated::catalog_service_client::CatalogServiceClient;
    pub use super::generated::catalog_service_server::{CatalogService, CatalogServiceServer};
    pub use super::generated::{
        GetProductRequest, GetProductResponse, GetProductsRequest, GetProductsResponse,
        PostProductRequest, PostProductResponse, Product,
    };
}

pub mod order {
    pub use super::generated::order_service_client::OrderServiceClient;
    pub use super::generated::order_service_server::{OrderService, OrderServiceServer};
    pub use super::generated::{
        GetOrdersForAccountRequest, GetOrdersForAccountResponse, Order, OrderProduct,
        OrderedProduct, PostOrderRequest, PostOrderResponse,
    };
}
