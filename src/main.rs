use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use storefront_gateway::clients::{AccountClient, CatalogClient, OrderClient};
use storefront_gateway::config::{Cli, GatewayConfig};
use storefront_gateway::server::{self, App};
use storefront_gateway::{FederatedQueryExecutor, FederationGateway, Resolver, SimpleQueryPlanner};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "gateway failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::load(&cli)?;
    let services = &config.services;
    tracing::info!(
        account = %services.account.url,
        catalog = %services.catalog.url,
        order = %services.order.url,
        "starting gateway"
    );

    let grpc = config.grpc_client();
    let (accounts, catalog, orders) = tokio::try_join!(
        AccountClient::connect(&services.account.url, &grpc),
        CatalogClient::connect(&services.catalog.url, &grpc),
        OrderClient::connect(&services.order.url, &grpc),
    )?;

    let resolver = Resolver::new(accounts, catalog, orders).with_batch_limits(config.batch_limits());
    let gateway = FederationGateway::new(
        Box::new(SimpleQueryPlanner::new()),
        Box::new(FederatedQueryExecutor::new(resolver.clone())),
    )
    .with_request_timeout(config.request_timeout());
    let app = App::builder(Arc::new(gateway)).build();

    let listener = TcpListener::bind(config.listen).await?;
    tracing::info!("GraphQL endpoint available at http://{}/graphql", config.listen);
    tracing::info!("Playground available at http://{}/playground", config.listen);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
        }
        signal.cancel();
    });

    let served = server::serve(listener, app, shutdown).await;
    resolver.close();
    served?;
    Ok(())
}
