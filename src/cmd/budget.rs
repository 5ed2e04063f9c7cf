//! Budget command - per-capita service costs from a budgets JSON file

use super::{print_json, print_table};
use clap::Args;
use proptax::core::{read_budgets_json, BudgetComparison, CombinedBudget, PerCapita, ServiceBudget};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tabled::Tabled;

#[derive(Args, Debug)]
pub struct BudgetCommand {
    /// Budgets JSON file (see `proptax schema budgets`)
    file: PathBuf,

    /// Budget name to use as the baseline, repeatable to combine several
    #[arg(short, long)]
    baseline: Vec<String>,

    /// Budget name to compare against the baseline, repeatable to combine several
    #[arg(short, long)]
    compare: Vec<String>,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Tabled)]
struct BudgetRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Service")]
    kind: String,
    #[tabled(rename = "Year")]
    fiscal_year: String,
    #[tabled(rename = "Budget")]
    total_budget: String,
    #[tabled(rename = "Served")]
    served: u32,
    #[tabled(rename = "Per Capita")]
    per_capita: String,
}

impl From<&ServiceBudget> for BudgetRow {
    fn from(b: &ServiceBudget) -> Self {
        BudgetRow {
            name: b.name.clone(),
            kind: format!("{:?}", b.kind),
            fiscal_year: b.fiscal_year.clone(),
            total_budget: format!("${:.0}", b.total_budget),
            served: b.served,
            per_capita: format!("${:.2}", b.per_capita()),
        }
    }
}

#[derive(Serialize)]
struct ComparisonOutput<'a> {
    #[serde(flatten)]
    comparison: &'a BudgetComparison,
    /// Baseline then comparison
    weighted_average_per_capita: [Decimal; 2],
    per_capita_difference: Decimal,
    per_capita_difference_pct: Decimal,
    total_budget_difference: Decimal,
    concern: bool,
}

impl BudgetCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let file = File::open(&self.file)?;
        let budgets = read_budgets_json(BufReader::new(file))?;

        if self.baseline.is_empty() && self.compare.is_empty() {
            if self.json {
                return print_json(&budgets);
            }
            println!();
            print_table(budgets.iter().map(BudgetRow::from));
            return Ok(());
        }

        if self.baseline.is_empty() || self.compare.is_empty() {
            anyhow::bail!("Both --baseline and --compare are required for a comparison");
        }

        let baseline = combine(&budgets, &self.baseline)?;
        let comparison = combine(&budgets, &self.compare)?;
        let result = BudgetComparison::new(&baseline, &comparison);

        if self.json {
            return print_json(&ComparisonOutput {
                comparison: &result,
                weighted_average_per_capita: [
                    baseline.weighted_average_per_capita(),
                    comparison.weighted_average_per_capita(),
                ],
                per_capita_difference: result.per_capita_difference(),
                per_capita_difference_pct: result.per_capita_difference_pct(),
                total_budget_difference: result.total_budget_difference(),
                concern: result.concern(),
            });
        }

        println!();
        print_table(
            baseline
                .budgets
                .iter()
                .chain(&comparison.budgets)
                .map(BudgetRow::from),
        );
        println!();
        println!("{}", result.summary());
        Ok(())
    }
}

/// Named budgets combined into one; a single name keeps that budget's label
fn combine(budgets: &[ServiceBudget], names: &[String]) -> anyhow::Result<CombinedBudget> {
    let mut selected = Vec::new();
    for name in names {
        let budget = budgets
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                let available: Vec<&str> = budgets.iter().map(|b| b.name.as_str()).collect();
                anyhow::anyhow!("Budget '{}' not found. Available: {}", name, available.join(", "))
            })?;
        selected.push(budget.clone());
    }
    let label = selected
        .iter()
        .map(|b| b.name.as_str())
        .collect::<Vec<_>>()
        .join(" + ");
    Ok(CombinedBudget::new(label, selected))
}
