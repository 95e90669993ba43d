use crate::performance::metrics::PortfolioMetrics;
use prettytable::{Cell, Row, Table, row};

/// Renders a metrics object as rows of a display table.
pub trait TableBuilder {
    fn titles(&self) -> Row;
    fn row(&self) -> Row;

    fn table(&self, id_cell: &str) -> Table {
        let mut table = Table::new();

        let mut titles = self.titles();
        titles.insert_cell(0, Cell::new(""));
        table.set_titles(titles);

        let mut row = self.row();
        row.insert_cell(0, Cell::new(id_cell));
        table.add_row(row);

        table
    }
}

/// Combine many builders into one table, keyed by an id column.
pub fn combine<Iter, T>(builders: Iter) -> Table
where
    Iter: IntoIterator<Item = (String, T)>,
    T: TableBuilder,
{
    builders
        .into_iter()
        .enumerate()
        .fold(Table::new(), |mut table, (index, (id, builder))| {
            if index == 0 {
                let mut titles = builder.titles();
                titles.insert_cell(0, Cell::new(""));
                table.set_titles(titles);
            }

            let mut row = builder.row();
            row.insert_cell(0, Cell::new(&id));
            table.add_row(row);

            table
        })
}

impl TableBuilder for PortfolioMetrics {
    fn titles(&self) -> Row {
        row![
            "CAGR 3yr",
            "CAGR 5yr",
            "CAGR 10yr",
            "Std. Dev.",
            "Downside Dev.",
            "Max Drawdown",
            "Avg. Drawdown",
            "Sharpe",
            "Sortino",
            "Ulcer Avg",
            "Ulcer P90",
            "Tax Adj. Return",
        ]
    }

    fn row(&self) -> Row {
        row![
            format!("{:.2}%", self.cagr_3yr * 100.0),
            format!("{:.2}%", self.cagr_5yr * 100.0),
            format!("{:.2}%", self.cagr_10yr * 100.0),
            format!("{:.4}", self.std_dev),
            format!("{:.4}", self.downside_deviation),
            self.max_drawdown
                .as_ref()
                .map(|dd| format!("{:.2}%", dd.loss_percent))
                .unwrap_or_else(|| "-".to_string()),
            format!("{:.2}%", self.avg_drawdown),
            format!("{:.3}", self.sharpe_ratio),
            format!("{:.3}", self.sortino_ratio),
            format!("{:.3}", self.ulcer_index_avg),
            format!("{:.3}", self.ulcer_index_p90),
            format!("{:.2}%", self.tax_adjusted_return * 100.0),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_table_renders() {
        let metrics = PortfolioMetrics {
            cagr_3yr: 0.08,
            sharpe_ratio: 1.25,
            ..Default::default()
        };

        let table = metrics.table("adm");
        let rendered = table.to_string();

        assert!(rendered.contains("adm"));
        assert!(rendered.contains("8.00%"));
        assert!(rendered.contains("1.250"));
    }

    #[test]
    fn test_combine_stacks_rows() {
        let table = combine(vec![
            ("adm".to_string(), PortfolioMetrics::default()),
            ("daa".to_string(), PortfolioMetrics::default()),
        ]);
        let rendered = table.to_string();

        assert!(rendered.contains("adm"));
        assert!(rendered.contains("daa"));
    }
}
