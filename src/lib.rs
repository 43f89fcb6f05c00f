pub mod cli;
pub mod core;
pub mod providers;
pub mod service;

use crate::core::config::AppConfig;
use crate::core::position::{AssetClass, Position, Trade};
use crate::core::quote::HistorySpan;
use crate::service::PortfolioService;
use anyhow::Result;
use tracing::info;

/// Everything the CLI can ask the library to do.
pub enum AppCommand {
    Summary,
    Kpis,
    History { days: u32 },
    Asset { ticker: String, asset_class: AssetClass, span: HistorySpan },
    ListPositions,
    AddPosition(Position),
    UpdatePosition { ticker: String, quantity: Option<f64>, avg_price: Option<f64> },
    DeletePosition { ticker: String },
    Trade(Trade),
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    let service = PortfolioService::from_config(config)?;

    match command {
        AppCommand::Summary => {
            let snapshot = service.value_portfolio().await?;
            println!("{}", snapshot.display_as_table());
        }
        AppCommand::Kpis => {
            let kpis = service.get_kpis()?;
            println!("{}", kpis.display_as_table());
        }
        AppCommand::History { days } => {
            let points = service.get_history(days)?;
            println!("{}", cli::kpis::display_history(&points));
        }
        AppCommand::Asset { ticker, asset_class, span } => {
            let history = service.get_asset_history(&ticker, asset_class, span).await?;
            let points: Vec<core::history::HistoryPoint> = history
                .into_iter()
                .map(|p| core::history::HistoryPoint {
                    date: p.date,
                    value: p.close,
                })
                .collect();
            println!("{}", cli::kpis::display_history(&points));
        }
        AppCommand::ListPositions => {
            let positions = service.position_store().load()?;
            for position in positions {
                println!(
                    "{}\t{:.4} @ {:.2} {}\t{}\t{}",
                    position.ticker,
                    position.quantity,
                    position.avg_price,
                    position.currency,
                    position.asset_class,
                    position.broker
                );
            }
        }
        AppCommand::AddPosition(position) => {
            let ticker = position.ticker.clone();
            service.position_store().add(position)?;
            info!("Added position {ticker}");
        }
        AppCommand::UpdatePosition { ticker, quantity, avg_price } => {
            service.position_store().update(&ticker, quantity, avg_price)?;
            info!("Updated position {ticker}");
        }
        AppCommand::DeletePosition { ticker } => {
            service.position_store().delete(&ticker)?;
            info!("Deleted position {ticker}");
        }
        AppCommand::Trade(trade) => {
            service.position_store().apply_trade(&trade)?;
            info!("Recorded {:?} of {}", trade.side, trade.ticker);
        }
    }
    Ok(())
}
