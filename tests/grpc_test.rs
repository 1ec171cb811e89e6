use std::net::SocketAddr;
use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use storefront_gateway::clients::{GrpcClientConfig, OrderClient};
use storefront_gateway::error::ErrorKind;
use storefront_gateway::model::{Money, OrderItemInput};
use storefront_gateway::pb::order::{
    GetOrdersForAccountRequest, GetOrdersForAccountResponse, Order, OrderService,
    OrderServiceServer, OrderedProduct, PostOrderRequest, PostOrderResponse,
};
use storefront_gateway::timestamp;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// Minimal order service: every product costs 250 minor units and all orders
/// are stamped with the same instant.
#[derive(Default)]
struct InMemoryOrderService {
    orders: Mutex<Vec<Order>>,
}

fn placed_at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 11, 14, 8, 15, 30).unwrap()
}

#[tonic::async_trait]
impl OrderService for InMemoryOrderService {
    async fn post_order(
        &self,
        request: Request<PostOrderRequest>,
    ) -> Result<Response<PostOrderResponse>, Status> {
        let request = request.into_inner();
        if let Some(line) = request.products.iter().find(|p| p.product_id == "missing") {
            return Err(Status::not_found(format!(
                "product {} does not exist",
                line.product_id
            )));
        }

        let products: Vec<OrderedProduct> = request
            .products
            .into_iter()
            .map(|line| OrderedProduct {
                id: line.product_id,
                name: "Widget".to_string(),
                description: String::new(),
                price: 250,
                quantity: line.quantity,
            })
            .collect();
        let mut orders = self.orders.lock().unwrap();
        let order = Order {
            id: format!("o{}", orders.len() + 1),
            created_at: timestamp::encode(&placed_at()),
            total_price: products.iter().map(|p| p.price * i64::from(p.quantity)).sum(),
            account_id: request.account_id,
            products,
        };
        orders.push(order.clone());
        Ok(Response::new(PostOrderResponse { order: Some(order) }))
    }

    async fn get_orders_for_account(
        &self,
        request: Request<GetOrdersForAccountRequest>,
    ) -> Result<Response<GetOrdersForAccountResponse>, Status> {
        let account_id = request.into_inner().account_id;
        let orders = self
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.account_id == account_id)
            .cloned()
            .collect();
        Ok(Response::new(GetOrdersForAccountResponse { orders }))
    }
}

async fn start_order_service() -> (SocketAddr, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();

    let signal = shutdown.clone();
    tokio::spawn(
        Server::builder()
            .add_service(OrderServiceServer::new(InMemoryOrderService::default()))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                signal.cancelled().await
            }),
    );
    (addr, shutdown)
}

fn line(product_id: &str, quantity: i64) -> OrderItemInput {
    OrderItemInput {
        product_id: product_id.to_string(),
        quantity,
    }
}

#[tokio::test]
async fn order_client_round_trips_over_grpc() {
    let (addr, shutdown) = start_order_service().await;
    let client = OrderClient::connect(&format!("http://{addr}"), &GrpcClientConfig::default())
        .await
        .unwrap();

    let created = client
        .create_order("a7", &[line("p1", 2), line("p2", 3)])
        .await
        .unwrap();
    assert_eq!(created.id, "o1");
    assert_eq!(created.account_id, "a7");
    assert_eq!(created.created_at, placed_at());
    assert_eq!(created.total_price, Money::from_minor_units(1250));
    let quantities: Vec<(String, u32)> = created
        .products
        .iter()
        .map(|p| (p.product_id.clone(), p.quantity.get()))
        .collect();
    assert_eq!(quantities, vec![("p1".to_string(), 2), ("p2".to_string(), 3)]);

    let listed = client.list_orders("a7").await.unwrap();
    assert_eq!(listed, vec![created]);
    assert!(client.list_orders("nobody").await.unwrap().is_empty());

    shutdown.cancel();
}

#[tokio::test]
async fn order_client_maps_status_codes_and_close() {
    let (addr, shutdown) = start_order_service().await;
    let client = OrderClient::connect(&format!("http://{addr}"), &GrpcClientConfig::default())
        .await
        .unwrap();

    let err = client
        .create_order("a7", &[line("missing", 1)])
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    client.close();
    client.close();
    let err = client.list_orders("a7").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unavailable);

    shutdown.cancel();
}
