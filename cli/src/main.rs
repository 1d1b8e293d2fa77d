use clap::{Parser, Subcommand};
use orderbook::{OrderType, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "hftx-cli")]
#[command(about = "Exchange CLI - command line client for the trading core")]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    server: String,
    #[arg(short = 'c', long, default_value = "cli-user")]
    client_id: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Place an order.
    Submit {
        #[arg(short, long)]
        symbol: String,
        #[arg(long, value_parser = parse_side)]
        side: Side,
        #[arg(long, value_parser = parse_order_type, default_value = "limit")]
        order_type: OrderType,
        #[arg(short, long)]
        quantity: Decimal,
        #[arg(short, long)]
        price: Option<Decimal>,
        /// Defaults to a fresh random key; pass a fixed value to test replay.
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// Cancel a resting order.
    Cancel {
        #[arg(short, long)]
        symbol: String,
        #[arg(short, long)]
        order_id: String,
    },
    /// Show the order book for a symbol.
    Orderbook {
        #[arg(short, long)]
        symbol: String,
        #[arg(short, long, default_value = "10")]
        depth: usize,
    },
    /// Deposit funds into an asset balance.
    Deposit {
        #[arg(short, long)]
        asset: String,
        #[arg(short = 'm', long)]
        amount: Decimal,
    },
    /// Show all asset balances.
    Balances,
    Health,
}

#[derive(Serialize)]
struct PlaceOrderBody {
    symbol: String,
    side: Side,
    #[serde(rename = "type")]
    order_type: OrderType,
    quantity: Decimal,
    price: Option<Decimal>,
}

#[derive(Deserialize)]
struct TradeView {
    price: Decimal,
    quantity: Decimal,
}

#[derive(Deserialize)]
struct OrderHttpResponse {
    #[serde(rename = "orderId")]
    order_id: String,
    status: String,
    #[serde(rename = "remainingQuantity")]
    remaining_quantity: Decimal,
    trades: Vec<TradeView>,
}

#[derive(Deserialize)]
struct PriceLevel {
    price: Decimal,
    quantity: Decimal,
    #[serde(rename = "orderCount")]
    order_count: usize,
}

#[derive(Deserialize)]
struct OrderBookView {
    symbol: String,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
}

#[derive(Deserialize)]
struct BalanceView {
    asset: String,
    available: Decimal,
    reserved: Decimal,
}

#[derive(Serialize)]
struct DepositBody {
    asset: String,
    amount: Decimal,
}

fn parse_side(s: &str) -> Result<Side, String> {
    match s.to_lowercase().as_str() {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        _ => Err(format!("invalid side: {s}. use 'buy' or 'sell'")),
    }
}

fn parse_order_type(s: &str) -> Result<OrderType, String> {
    match s.to_lowercase().as_str() {
        "limit" => Ok(OrderType::Limit),
        "market" => Ok(OrderType::Market),
        _ => Err(format!("invalid order type: {s}. use 'limit' or 'market'")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Submit { symbol, side, order_type, quantity, price, idempotency_key } => {
            let key = idempotency_key.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let body = PlaceOrderBody { symbol, side, order_type, quantity, price };

            let response = client
                .post(format!("{}/orders", cli.server))
                .header("X-Client-Id", &cli.client_id)
                .header("Idempotency-Key", key)
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() {
                let result: OrderHttpResponse = response.json().await?;
                println!("Order ID: {}", result.order_id);
                println!("Status: {}", result.status);
                println!("Remaining: {}", result.remaining_quantity);
                for trade in result.trades {
                    println!("  filled {} @ {}", trade.quantity, trade.price);
                }
            } else {
                println!("Error: {}", response.status());
                println!("{}", response.text().await?);
            }
        }

        Commands::Cancel { symbol, order_id } => {
            let response = client
                .delete(format!("{}/orders/{}/{}", cli.server, symbol, order_id))
                .send()
                .await?;

            if response.status().is_success() {
                println!("cancelled");
            } else {
                println!("Error: {}", response.status());
            }
        }

        Commands::Orderbook { symbol, depth } => {
            let response = client
                .get(format!("{}/orderbook/{}?depth={}", cli.server, symbol, depth))
                .send()
                .await?;

            if response.status().is_success() {
                let book: OrderBookView = response.json().await?;
                println!("Order book for {}", book.symbol);
                println!("\nAsks:");
                for level in book.asks.iter().rev() {
                    println!("  {} @ {} ({} orders)", level.quantity, level.price, level.order_count);
                }
                println!("\nBids:");
                for level in &book.bids {
                    println!("  {} @ {} ({} orders)", level.quantity, level.price, level.order_count);
                }
            } else {
                println!("Error: {}", response.status());
            }
        }

        Commands::Deposit { asset, amount } => {
            let response = client
                .post(format!("{}/wallets/deposit", cli.server))
                .header("X-Client-Id", &cli.client_id)
                .json(&DepositBody { asset, amount })
                .send()
                .await?;

            if response.status().is_success() {
                println!("deposited");
            } else {
                println!("Error: {}", response.status());
            }
        }

        Commands::Balances => {
            let response = client
                .get(format!("{}/wallets/balances", cli.server))
                .header("X-Client-Id", &cli.client_id)
                .send()
                .await?;

            if response.status().is_success() {
                let balances: Vec<BalanceView> = response.json().await?;
                for balance in balances {
                    println!("{}: available={} reserved={}", balance.asset, balance.available, balance.reserved);
                }
            } else {
                println!("Error: {}", response.status());
            }
        }

        Commands::Health => {
            let response = client.get(format!("{}/health", cli.server)).send().await?;
            if response.status().is_success() {
                let health: serde_json::Value = response.json().await?;
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("Error: {}", response.status());
            }
        }
    }

    Ok(())
}
