use std::sync::Arc;

use async_trait::async_trait;
use tonic::{Response, Status};

use super::{ChannelSlot, CloseGuard, GrpcClientConfig, connect_channel, map_status};
use crate::error::{ConnectionError, ServiceError};
use crate::model::{Money, Order, OrderItemInput, OrderedProduct, ProductSnapshot, Quantity};
use crate::pb::order as pb;
use crate::timestamp;

const SERVICE: &str = "order";

#[async_trait]
pub trait OrderBackend: Send + Sync {
    async fn post_order(
        &self,
        request: pb::PostOrderRequest,
    ) -> Result<pb::PostOrderResponse, Status>;

    async fn get_orders_for_account(
        &self,
        request: pb::GetOrdersForAccountRequest,
    ) -> Result<pb::GetOrdersForAccountResponse, Status>;

    /// Release the underlying connection.
    fn shutdown(&self) {}
}

pub struct GrpcOrderBackend {
    slot: ChannelSlot,
}

#[async_trait]
impl OrderBackend for GrpcOrderBackend {
    async fn post_order(
        &self,
        request: pb::PostOrderRequest,
    ) -> Result<pb::PostOrderResponse, Status> {
        pb::OrderServiceClient::new(self.slot.channel()?)
            .post_order(request)
            .await
            .map(Response::into_inner)
    }

    async fn get_orders_for_account(
        &self,
        request: pb::GetOrdersForAccountRequest,
    ) -> Result<pb::GetOrdersForAccountResponse, Status> {
        pb::OrderServiceClient::new(self.slot.channel()?)
            .get_orders_for_account(request)
            .await
            .map(Response::into_inner)
    }

    fn shutdown(&self) {
        self.slot.release();
    }
}

#[derive(Clone)]
pub struct OrderClient {
    backend: Arc<dyn OrderBackend>,
    guard: Arc<CloseGuard>,
}

impl OrderClient {
    pub async fn connect(target: &str, cfg: &GrpcClientConfig) -> Result<Self, ConnectionError> {
        let channel = connect_channel(SERVICE, target, cfg).await?;
        Ok(Self::with_backend(Arc::new(GrpcOrderBackend {
            slot: ChannelSlot::new(channel),
        })))
    }

    pub fn with_backend(backend: Arc<dyn OrderBackend>) -> Self {
        OrderClient {
            backend,
            guard: Arc::new(CloseGuard::new(SERVICE)),
        }
    }

    pub fn close(&self) {
        self.guard.close(|| self.backend.shutdown());
    }

    /// Place an order. Input is validated locally before the backend sees it.
    pub async fn create_order(
        &self,
        account_id: &str,
        items: &[OrderItemInput],
    ) -> Result<Order, ServiceError> {
        if account_id.is_empty() {
            return Err(ServiceError::invalid_argument("account id must not be empty"));
        }
        if items.is_empty() {
            return Err(ServiceError::invalid_argument(
                "an order needs at least one product",
            ));
        }
        let requested = items
            .iter()
            .map(|item| {
                if item.product_id.is_empty() {
                    return Err(ServiceError::invalid_argument(
                        "product id must not be empty",
                    ));
                }
                let quantity = Quantity::try_from(item.quantity)?;
                Ok(OrderedProduct::requested(item.product_id.clone(), quantity))
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;
        self.guard.ensure_open()?;

        let request = pb::PostOrderRequest {
            account_id: account_id.to_string(),
            products: requested
                .iter()
                .map(|p| pb::OrderProduct {
                    product_id: p.product_id.clone(),
                    quantity: p.quantity.get(),
                })
                .collect(),
        };
        let response = self
            .backend
            .post_order(request)
            .await
            .map_err(|status| map_status(SERVICE, "PostOrder", status))?;
        let order = response
            .order
            .ok_or_else(|| ServiceError::decode("PostOrder response carried no order"))?;

        // A backend that does not echo the lines back leaves them in requested state.
        if order.products.is_empty() {
            decode_order_with(order, requested)
        } else {
            decode_order(order)
        }
    }

    /// Orders of one account, in the order the backend returned them.
    pub async fn list_orders(&self, account_id: &str) -> Result<Vec<Order>, ServiceError> {
        self.guard.ensure_open()?;
        let response = self
            .backend
            .get_orders_for_account(pb::GetOrdersForAccountRequest {
                account_id: account_id.to_string(),
            })
            .await
            .map_err(|status| map_status(SERVICE, "GetOrdersForAccount", status))?;

        response.orders.into_iter().map(decode_order).collect()
    }
}

fn decode_order(order: pb::Order) -> Result<Order, ServiceError> {
    let products = order
        .products
        .iter()
        .map(decode_ordered_product)
        .collect::<Result<Vec<_>, _>>()?;
    decode_order_with(order, products)
}

fn decode_order_with(
    order: pb::Order,
    products: Vec<OrderedProduct>,
) -> Result<Order, ServiceError> {
    let created_at = timestamp::decode(&order.created_at).map_err(|e| {
        ServiceError::decode(format!("order {}: {}", order.id, e.message))
    })?;
    Ok(Order {
        id: order.id,
        created_at,
        total_price: Money::from_minor_units(order.total_price),
        account_id: order.account_id,
        products,
    })
}

fn decode_ordered_product(product: &pb::OrderedProduct) -> Result<OrderedProduct, ServiceError> {
    let quantity = Quantity::try_from(i64::from(product.quantity)).map_err(|_| {
        ServiceError::decode(format!("product {} has quantity 0", product.id))
    })?;
    Ok(OrderedProduct::enriched(
        product.id.clone(),
        quantity,
        ProductSnapshot {
            name: product.name.clone(),
            description: product.description.clone(),
            price: Money::from_minor_units(product.price),
        },
    ))
}
