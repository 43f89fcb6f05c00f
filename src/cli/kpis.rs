use super::ui;
use crate::core::history::HistoryPoint;
use crate::core::kpi::KpiSet;
use comfy_table::Cell;

impl KpiSet {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![ui::header_cell("KPI"), ui::header_cell("Value")]);

        table.add_row(vec![
            Cell::new("CAGR"),
            ui::change_cell(self.cagr, format!("{:+.2}%", self.cagr)),
        ]);
        table.add_row(vec![
            Cell::new("Max drawdown"),
            ui::value_cell(match self.max_drawdown_date {
                Some(date) => format!("{:.2}% (on {date})", self.max_drawdown),
                None => format!("{:.2}%", self.max_drawdown),
            }),
        ]);
        table.add_row(vec![
            Cell::new("Best day"),
            ui::change_cell(self.best_day, format!("{:+.2}%", self.best_day)),
        ]);
        table.add_row(vec![
            Cell::new("Worst day"),
            ui::change_cell(self.worst_day, format!("{:+.2}%", self.worst_day)),
        ]);
        table.add_row(vec![
            Cell::new("Volatility (ann.)"),
            ui::value_cell(format!("{:.2}%", self.volatility)),
        ]);
        table.add_row(vec![
            Cell::new("Sharpe ratio"),
            ui::value_cell(format!("{:.2}", self.sharpe_ratio)),
        ]);
        table.add_row(vec![
            Cell::new("Days tracked"),
            ui::value_cell(self.days_tracked.to_string()),
        ]);

        table.to_string()
    }
}

pub fn display_history(points: &[HistoryPoint]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Date"), ui::header_cell("Value")]);
    for point in points {
        table.add_row(vec![
            Cell::new(point.date.to_string()),
            ui::value_cell(format!("{:.2}", point.value)),
        ]);
    }
    table.to_string()
}
