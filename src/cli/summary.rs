use super::ui;
use crate::core::valuation::{Allocation, PortfolioSnapshot};
use comfy_table::Cell;
use std::collections::BTreeMap;

impl PortfolioSnapshot {
    pub fn display_as_table(&self) -> String {
        let base = &self.base_currency;

        if self.positions.is_empty() {
            return format!(
                "Portfolio ({})\n\n{}\n",
                ui::style_text(base, ui::StyleType::Title),
                ui::style_text("No positions in the ledger", ui::StyleType::Error)
            );
        }

        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Ticker"),
            ui::header_cell("Qty"),
            ui::header_cell("Price"),
            ui::header_cell(&format!("Value ({base})")),
            ui::header_cell("P/L (%)"),
            ui::header_cell("Day (%)"),
            ui::header_cell("Weight (%)"),
        ]);

        for position in &self.positions {
            table.add_row(vec![
                Cell::new(&position.ticker),
                ui::value_cell(format!("{:.4}", position.quantity)),
                ui::value_cell(format!("{:.2} {}", position.current_price, position.currency)),
                ui::value_cell(format!("{:.2}", position.market_value_base)),
                ui::change_cell(
                    position.gain_loss_pct,
                    format!("{:+.2}", position.gain_loss_pct),
                ),
                ui::change_cell(
                    position.day_change_pct,
                    format!("{:+.2}", position.day_change_pct),
                ),
                ui::value_cell(format!("{:.2}", position.weight)),
            ]);
        }

        let mut output = format!(
            "Portfolio ({})\n\n{}\n",
            ui::style_text(base, ui::StyleType::Title),
            table
        );

        output.push_str(&format!(
            "\n{}: {} {base}  ({:+.2} today, {:+.2}%)\n",
            ui::style_text("Total Value", ui::StyleType::TotalLabel),
            ui::style_text(&format!("{:.2}", self.total_value), ui::StyleType::TotalValue),
            self.daily_change,
            self.daily_change_pct,
        ));
        output.push_str(&format!(
            "{}: {:+.2} {base} ({:+.2}%)\n",
            ui::style_text("Unrealized P/L", ui::StyleType::TotalLabel),
            self.total_gain_loss,
            self.total_gain_loss_pct,
        ));

        for (label, buckets) in [
            ("By type", &self.by_type),
            ("By broker", &self.by_broker),
            ("By currency", &self.by_currency),
        ] {
            output.push('\n');
            output.push_str(&allocation_table(label, base, buckets));
        }

        output
    }
}

fn allocation_table(label: &str, base: &str, buckets: &BTreeMap<String, Allocation>) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell(label),
        ui::header_cell(&format!("Value ({base})")),
        ui::header_cell("P/L (%)"),
        ui::header_cell("Weight (%)"),
        ui::header_cell("#"),
    ]);

    for (name, bucket) in buckets {
        table.add_row(vec![
            Cell::new(name),
            ui::value_cell(format!("{:.2}", bucket.value)),
            ui::change_cell(bucket.gain_loss_pct, format!("{:+.2}", bucket.gain_loss_pct)),
            ui::value_cell(format!("{:.2}", bucket.weight)),
            ui::value_cell(bucket.count.to_string()),
        ]);
    }

    format!("{table}\n")
}
