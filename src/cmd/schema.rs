//! Schema command - print expected input formats

use super::print_json;
use clap::{Args, ValueEnum};
use proptax::core::{BudgetInput, RegistryInput, SALE_ROW_FIELDS};
use schemars::schema_for;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// Which input to describe
    #[arg(value_enum, default_value = "municipalities")]
    format: SchemaFormat,

    /// Output CSV field descriptions as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SchemaFormat {
    /// JSON Schema for a municipality configuration file (--config)
    Municipalities,
    /// JSON Schema for a service budgets file
    Budgets,
    /// CSV header row for sales data
    CsvHeader,
    /// CSV column descriptions for sales data
    CsvFields,
}

#[derive(Serialize)]
struct FieldDescription {
    name: &'static str,
    kind: &'static str,
    description: &'static str,
}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self.format {
            SchemaFormat::Municipalities => print_json(&schema_for!(RegistryInput)),
            SchemaFormat::Budgets => print_json(&schema_for!(BudgetInput)),
            SchemaFormat::CsvHeader => {
                let names: Vec<&str> = SALE_ROW_FIELDS.iter().map(|(name, _, _)| *name).collect();
                if self.json {
                    print_json(&names)
                } else {
                    println!("{}", names.join(","));
                    Ok(())
                }
            }
            SchemaFormat::CsvFields => self.print_csv_fields(),
        }
    }

    fn print_csv_fields(&self) -> anyhow::Result<()> {
        if self.json {
            let fields: Vec<FieldDescription> = SALE_ROW_FIELDS
                .iter()
                .map(|(name, kind, description)| FieldDescription {
                    name,
                    kind,
                    description,
                })
                .collect();
            return print_json(&fields);
        }

        println!("Sales CSV Format");
        println!("================");
        println!();
        for (name, kind, description) in SALE_ROW_FIELDS {
            println!("{:16} ({:7})  {}", name, kind, description);
        }
        println!();
        println!("Rows with non-positive sqft or sale_price, or a malformed date, are skipped.");
        Ok(())
    }
}
