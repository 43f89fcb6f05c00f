//! Terminal rendering for the portfolio commands.

pub mod kpis;
pub mod summary;
pub mod ui;
