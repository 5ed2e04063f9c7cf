//! Stats command - statistical analysis of a sales CSV

use super::{print_json, print_table, read_sales};
use clap::{Args, ValueEnum};
use proptax::core::statistics::{CorrelationMatrix, DistributionAnalysis};
use proptax::core::{
    AnovaOutcome, Column, CorrelationResult, OutlierMethod, RegressionOutcome, SaleRow,
    StatisticalAnalyzer, TTestOutcome,
};
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Sales CSV file. Reads from stdin if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Column for outlier detection and ANOVA
    #[arg(short, long, default_value = "price_per_sqft")]
    column: Column,

    /// List outlying sales in COLUMN
    #[arg(long)]
    outliers: bool,

    /// Outlier detection method
    #[arg(long, value_enum, default_value_t = MethodArg::Iqr)]
    method: MethodArg,

    /// IQR multiplier or z-score threshold (default 1.5 / 3.0)
    #[arg(long)]
    threshold: Option<f64>,

    /// Welch t-test of COLUMN between two municipalities
    #[arg(long, num_args = 2, value_names = ["FIRST", "SECOND"])]
    ttest: Vec<String>,

    /// Regress the second column on the first
    #[arg(long, num_args = 2, value_names = ["X", "Y"])]
    regress: Vec<Column>,

    /// Print the correlation matrix of the numeric columns
    #[arg(long)]
    matrix: bool,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum MethodArg {
    #[default]
    Iqr,
    Zscore,
}

impl StatsCommand {
    fn outlier_method(&self) -> OutlierMethod {
        match self.method {
            MethodArg::Iqr => OutlierMethod::Iqr(self.threshold.unwrap_or(1.5)),
            MethodArg::Zscore => OutlierMethod::ZScore(self.threshold.unwrap_or(3.0)),
        }
    }
}

#[derive(Tabled)]
struct OutlierRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Municipality")]
    municipality: String,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct MatrixRow {
    #[tabled(rename = "Column")]
    column: String,
    #[tabled(rename = "Correlations")]
    values: String,
}

#[derive(Serialize)]
struct StatsOutput {
    records: usize,
    distributions: Vec<DistributionAnalysis>,
    price_tax_correlation: CorrelationResult,
    anova: AnovaOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    outliers: Option<Vec<SaleRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    t_test: Option<TTestOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    regression: Option<RegressionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_matrix: Option<CorrelationMatrix>,
}

impl StatsCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let sales = read_sales(&self.file)?;
        let analyzer = StatisticalAnalyzer::new(&sales);

        let outliers = self
            .outliers
            .then(|| analyzer.detect_outliers(self.column, self.outlier_method()));
        let t_test = match self.ttest.as_slice() {
            [first, second] => {
                Some(analyzer.municipality_comparison_test(first, second, self.column))
            }
            _ => None,
        };
        let regression = match self.regress.as_slice() {
            [x, y] => Some(analyzer.regression_analysis(*x, *y)),
            _ => None,
        };
        let matrix = self.matrix.then(|| analyzer.correlation_matrix());

        if self.json {
            return print_json(&StatsOutput {
                records: sales.len(),
                distributions: [Column::PricePerSqft, Column::TaxPerSqft, Column::EffectiveTaxRate]
                    .into_iter()
                    .map(|c| analyzer.analyze_distribution(c))
                    .collect(),
                price_tax_correlation: analyzer.price_tax_correlation(),
                anova: analyzer.anova_municipalities(self.column),
                outliers: outliers
                    .map(|records| records.into_iter().map(SaleRow::from).collect()),
                t_test,
                regression,
                correlation_matrix: matrix,
            });
        }

        println!("{}", analyzer.generate_report());

        if let Some(outliers) = outliers {
            println!();
            println!("OUTLIERS IN {} ({} found)", self.column, outliers.len());
            if !outliers.is_empty() {
                print_table(outliers.iter().map(|r| OutlierRow {
                    address: r.address().to_string(),
                    municipality: r.municipality().to_string(),
                    date: r.sale_date().to_string(),
                    value: self
                        .column
                        .value(r)
                        .map_or("-".to_string(), |v| format!("{:.2}", v)),
                }));
            }
        }

        if let Some(outcome) = t_test {
            println!();
            match outcome {
                TTestOutcome::InsufficientData { first_n, second_n } => println!(
                    "T-test: insufficient data ({} and {} values, need at least 2 each)",
                    first_n, second_n
                ),
                TTestOutcome::Completed(t) => {
                    println!("T-TEST: {} vs {} ({})", t.first, t.second, t.column);
                    println!("  Means:      {:.2} vs {:.2}", t.first_mean, t.second_mean);
                    println!("  Difference: {:.2}", t.difference);
                    println!(
                        "  t = {:.3}, df = {:.1}, p = {:.4}",
                        t.t_statistic, t.degrees_of_freedom, t.p_value
                    );
                    println!("  Cohen's d:  {:.3} ({:?} effect)", t.cohens_d, t.effect_size);
                }
            }
        }

        if let Some(outcome) = regression {
            println!();
            match outcome {
                RegressionOutcome::InsufficientData { n } => {
                    println!("Regression: insufficient data ({} usable sales)", n)
                }
                RegressionOutcome::Completed(r) => {
                    println!("REGRESSION: {} on {} (n = {})", r.y, r.x, r.n);
                    println!("  {}", r.interpretation);
                    println!(
                        "  slope = {:.4}, intercept = {:.4}, p = {:.4}",
                        r.slope, r.intercept, r.p_value
                    );
                }
            }
        }

        if let Some(matrix) = matrix {
            println!();
            println!("CORRELATION MATRIX ({})", column_list(&matrix.columns));
            print_table(matrix.columns.iter().zip(&matrix.values).map(|(column, row)| {
                MatrixRow {
                    column: column.to_string(),
                    values: row
                        .iter()
                        .map(|v| v.map_or("-".to_string(), |v| format!("{:.2}", v)))
                        .collect::<Vec<_>>()
                        .join("  "),
                }
            }));
        }
        Ok(())
    }
}

fn column_list(columns: &[Column]) -> String {
    columns
        .iter()
        .map(Column::name)
        .collect::<Vec<_>>()
        .join(", ")
}
