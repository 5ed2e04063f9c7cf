use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

/// Property tax and home value comparison across Westchester municipalities
#[derive(Parser, Debug)]
#[command(name = "proptax", version, about)]
struct Cli {
    /// Municipality configuration (JSON). Defaults to the built-in Westchester table.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Itemised tax bill for one home value across municipalities
    Tax(cmd::tax::TaxCommand),
    /// Full comparison report from a sales CSV
    Report(cmd::report::ReportCommand),
    /// Statistical analysis of a sales CSV
    Stats(cmd::stats::StatsCommand),
    /// Home value an annual tax budget buys in each municipality
    Afford(cmd::afford::AffordCommand),
    /// Tax on one hypothetical home in every municipality with sales
    Scenarios(cmd::scenarios::ScenariosCommand),
    /// Per-capita fire, school and town service costs
    Budget(cmd::budget::BudgetCommand),
    /// Print expected input formats
    Schema(cmd::schema::SchemaCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    let registry = || cmd::load_registry(cli.config.as_deref());

    match &cli.command {
        Command::Tax(tax) => tax.exec(registry()?),
        Command::Report(report) => report.exec(registry()?),
        Command::Stats(stats) => stats.exec(),
        Command::Afford(afford) => afford.exec(registry()?),
        Command::Scenarios(scenarios) => scenarios.exec(registry()?),
        Command::Budget(budget) => budget.exec(),
        Command::Schema(schema) => schema.exec(),
    }
}
