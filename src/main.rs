// src/main.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rabbit_fulfillment::config::{self, AppConfig, CONFIG_FILE_NAME};
use rabbit_fulfillment::env::apply_env_overrides;
use rabbit_fulfillment::message::{OrderCreated, StockConfirmed};
use rabbit_fulfillment::models::{Order, OrderItem, Product};
use rabbit_fulfillment::processing::{
    order_created_handlers, stock_confirmed_handlers, OrderProcess, UseCaseResult,
};
use rabbit_fulfillment::rabbitmq::{
    BrokerConnection, ConsumerRegistry, ConsumerSupervisor, EventPublisher, GenericEventProducer,
    Publisher,
};
use rabbit_fulfillment::store::{
    HttpStockClient, InMemoryOrderStore, InMemoryProductStore, OrderStore, ProductStockClient,
    ProductStore, StockClient,
};

/// What to do after the consumers are up.
enum Intake {
    None,
    /// Seed local products and place one order against them.
    Demo,
    /// Place the order read from a JSON file, checking stock over HTTP.
    OrderFile(PathBuf),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderRequest {
    customer_id: String,
    items: Vec<OrderItem>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--write-config") {
        config::create_default_config_file(Path::new(CONFIG_FILE_NAME))?;
        info!("Wrote default configuration to {}", CONFIG_FILE_NAME);
        return Ok(());
    }
    let intake = parse_intake(&args)?;

    let config = apply_env_overrides(config::load_config()?)?;
    run(config, intake).await
}

fn parse_intake(args: &[String]) -> Result<Intake> {
    if args.iter().any(|arg| arg == "--demo") {
        return Ok(Intake::Demo);
    }
    match args.iter().position(|arg| arg == "--order") {
        Some(index) => {
            let path = args
                .get(index + 1)
                .ok_or_else(|| anyhow!("--order needs a path to an order JSON file"))?;
            Ok(Intake::OrderFile(PathBuf::from(path)))
        }
        None => Ok(Intake::None),
    }
}

async fn run(config: AppConfig, intake: Intake) -> Result<()> {
    info!(broker = %config.broker.redacted_uri(), "Starting order fulfillment service");

    let connection = Arc::new(BrokerConnection::new(config.broker.clone()));
    connection
        .connect_with_retry()
        .await
        .context("Could not reach RabbitMQ at startup")?;

    // both boundaries share one process here, each with its own store
    let orders: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
    let products = InMemoryProductStore::new();
    let publisher: Arc<dyn EventPublisher> = Arc::new(Publisher::new(connection.clone()));

    let mut registry = ConsumerRegistry::new();
    registry
        .register_event::<OrderCreated>(
            connection.clone(),
            order_created_handlers(Arc::new(products.clone()), publisher.clone()),
        )
        .register_event::<StockConfirmed>(connection.clone(), stock_confirmed_handlers(orders.clone()));

    let supervisor = ConsumerSupervisor::new(
        registry,
        config.queues.clone(),
        config.supervisor.sweep_interval(),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor_task = tokio::spawn(supervisor.run(shutdown_rx));

    // the demo answers stock queries from its own seeded products,
    // everything else asks the inventory service
    let stock: Arc<dyn StockClient> = match intake {
        Intake::Demo => Arc::new(ProductStockClient::new(Arc::new(products.clone()))),
        _ => {
            info!(url = %config.stock_service.base_url, "Using inventory service for stock checks");
            Arc::new(HttpStockClient::new(&config.stock_service)?)
        }
    };
    let order_process = OrderProcess::new(orders.clone(), stock, GenericEventProducer::new(publisher));

    let placed = match intake {
        Intake::None => Ok(()),
        Intake::Demo => place_demo_order(&products, &order_process).await,
        Intake::OrderFile(path) => place_order_from_file(&path, &order_process).await,
    };
    if let Err(e) = placed {
        warn!("Order was not placed: {:#}", e);
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    match supervisor_task.await {
        Ok(stopped) => info!(stopped, "Consumers stopped"),
        Err(e) => error!("Supervisor task failed: {}", e),
    }

    connection.dispose().await?;
    info!("Order fulfillment service stopped");
    Ok(())
}

async fn place(order_process: &OrderProcess, order: Order) -> Result<()> {
    match order_process.handle_order(order).await {
        UseCaseResult::Success(order) => {
            info!(order_id = %order.order_id, total = order.total_amount, "Order placed");
            Ok(())
        }
        UseCaseResult::Fail(reason) => Err(anyhow!(reason)),
    }
}

async fn place_order_from_file(path: &Path, order_process: &OrderProcess) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read order file {}", path.display()))?;
    let request: OrderRequest =
        serde_json::from_str(&content).context("Order file is not a valid order request")?;

    place(order_process, Order::new(&request.customer_id, request.items)).await
}

async fn place_demo_order(products: &InMemoryProductStore, order_process: &OrderProcess) -> Result<()> {
    let widget = Product::new("Widget", 9.99, 20).with_description("Standard widget");
    let gadget = Product::new("Gadget", 24.50, 5).with_description("Deluxe gadget");
    let order = Order::new(
        "demo-customer",
        vec![
            OrderItem::new(widget.product_id, &widget.name, 5, widget.price),
            OrderItem::new(gadget.product_id, &gadget.name, 1, gadget.price),
        ],
    );
    products.add(widget).await?;
    products.add(gadget).await?;

    place(order_process, order).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn test_parse_intake() {
        assert!(matches!(parse_intake(&args(&[])).unwrap(), Intake::None));
        assert!(matches!(parse_intake(&args(&["--demo"])).unwrap(), Intake::Demo));
        match parse_intake(&args(&["--order", "order.json"])).unwrap() {
            Intake::OrderFile(path) => assert_eq!(path, PathBuf::from("order.json")),
            _ => panic!("expected an order file"),
        }
        assert!(parse_intake(&args(&["--order"])).is_err());
    }

    #[test]
    fn test_order_request_shape() {
        let request: OrderRequest = serde_json::from_str(
            r#"{"customerId": "c-1", "items": [{"productId": "0b7f0d5e-5d6c-4c1e-8f3a-2a9b8c7d6e5f", "productName": "Widget", "quantity": 2, "unitPrice": 3.5}]}"#,
        )
        .unwrap();
        let order = Order::new(&request.customer_id, request.items);
        assert_eq!(order.total_amount, 7.0);
    }
}
