use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use folio::core::log::init_logging;
use folio::core::position::{AssetClass, Position, Trade, TradeSide};
use folio::core::quote::HistorySpan;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Value the portfolio and display the full snapshot
    Summary,
    /// Display risk and performance KPIs
    Kpis,
    /// Display recorded portfolio value history
    History {
        /// Number of days to look back
        #[arg(long, default_value_t = 365)]
        days: u32,
    },
    /// Display the price history of a single asset
    Asset {
        ticker: String,
        /// Asset class: stock, etf or crypto
        #[arg(long, default_value = "stock")]
        class: String,
        /// History span: 1m, 3m, 6m, 1y, 5y or max
        #[arg(long, default_value = "1y")]
        span: String,
    },
    /// Manage ledger positions
    #[command(subcommand)]
    Position(PositionCommands),
    /// Record a buy or sell trade against the ledger
    #[command(subcommand)]
    Trade(TradeCommands),
}

#[derive(Subcommand)]
enum PositionCommands {
    /// List all positions
    List,
    /// Add a new position
    Add {
        ticker: String,
        quantity: f64,
        avg_price: f64,
        #[arg(long, default_value = "stock")]
        class: String,
        #[arg(long, default_value = "EUR")]
        currency: String,
        #[arg(long)]
        broker: String,
    },
    /// Update quantity and/or average price of a position
    Update {
        ticker: String,
        #[arg(long)]
        quantity: Option<f64>,
        #[arg(long)]
        avg_price: Option<f64>,
    },
    /// Delete a position
    Delete { ticker: String },
}

#[derive(Subcommand)]
enum TradeCommands {
    Buy {
        ticker: String,
        quantity: f64,
        price: f64,
        #[arg(long)]
        broker: String,
    },
    Sell {
        ticker: String,
        quantity: f64,
        price: f64,
        #[arg(long)]
        broker: String,
    },
}

fn to_app_command(cmd: Commands) -> Result<folio::AppCommand> {
    let command = match cmd {
        Commands::Setup => unreachable!("Setup command should be handled separately"),
        Commands::Summary => folio::AppCommand::Summary,
        Commands::Kpis => folio::AppCommand::Kpis,
        Commands::History { days } => folio::AppCommand::History { days },
        Commands::Asset {
            ticker,
            class,
            span,
        } => folio::AppCommand::Asset {
            ticker,
            asset_class: class.parse::<AssetClass>()?,
            span: span.parse::<HistorySpan>()?,
        },
        Commands::Position(position) => match position {
            PositionCommands::List => folio::AppCommand::ListPositions,
            PositionCommands::Add {
                ticker,
                quantity,
                avg_price,
                class,
                currency,
                broker,
            } => folio::AppCommand::AddPosition(Position {
                ticker: ticker.to_uppercase(),
                quantity,
                avg_price,
                asset_class: class.parse::<AssetClass>()?,
                currency: currency.to_uppercase(),
                broker,
            }),
            PositionCommands::Update {
                ticker,
                quantity,
                avg_price,
            } => folio::AppCommand::UpdatePosition {
                ticker,
                quantity,
                avg_price,
            },
            PositionCommands::Delete { ticker } => folio::AppCommand::DeletePosition { ticker },
        },
        Commands::Trade(trade) => {
            let (side, ticker, quantity, price, broker) = match trade {
                TradeCommands::Buy {
                    ticker,
                    quantity,
                    price,
                    broker,
                } => (TradeSide::Buy, ticker, quantity, price, broker),
                TradeCommands::Sell {
                    ticker,
                    quantity,
                    price,
                    broker,
                } => (TradeSide::Sell, ticker, quantity, price, broker),
            };
            folio::AppCommand::Trade(Trade {
                side,
                ticker,
                quantity,
                price,
                broker,
            })
        }
    };
    Ok(command)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => folio::run_command(to_app_command(cmd)?, cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> Result<()> {
    use anyhow::Context;

    let path = folio::core::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
base_currency: "EUR"

providers:
  equity:
    base_url: "https://query1.finance.yahoo.com"
  crypto:
    base_url: "https://api.coingecko.com/api/v3"
  fx:
    base_url: "https://api.exchangerate-api.com"
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
