//! E2E tests driving the proptax binary

use serde_json::Value;
use std::process::{Command, Output};

const SALES: &str = "tests/data/westchester_sales.csv";

fn proptax(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_proptax"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn stdout_of(output: &Output) -> String {
    assert!(output.status.success(), "Command failed: {:?}", output);
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn json_of(output: &Output) -> Value {
    serde_json::from_str(&stdout_of(output)).expect("valid JSON output")
}

fn decimal_field(value: &Value) -> f64 {
    // rust_decimal serializes as a string
    value.as_str().expect("decimal string").parse().expect("number")
}

#[test]
fn tax_table_names_the_lowest() {
    let output = proptax(&["tax", "1000000", "-m", "bronxville", "-m", "tuckahoe"]);
    let stdout = stdout_of(&output);

    assert!(stdout.contains("Bronxville"));
    assert!(stdout.contains("Tuckahoe"));
    assert!(stdout.contains("$28800"));
    assert!(stdout.contains("Lowest: Tuckahoe ($8031/year)"));
}

#[test]
fn tax_json_single_municipality() {
    let json = json_of(&proptax(&[
        "tax",
        "1000000",
        "-m",
        "eastchester_unincorp",
        "--star",
        "--json",
    ]));

    assert_eq!(json["lowest"], "eastchester_unincorp");
    let entry = &json["municipalities"][0];
    assert_eq!(entry["key"], "eastchester_unincorp");
    assert_eq!(entry["municipality"], "Eastchester (Unincorporated)");
    assert!((decimal_field(&entry["total_tax"]) - 10784.752).abs() < 1e-6);
    assert!((decimal_field(&entry["assessed_value"]) - 8800.0).abs() < 1e-9);
    // $30,000 at a 0.0088 ratio is 264 assessed, times 850 per 1000
    assert!((decimal_field(&entry["star"]["school_tax_savings"]) - 224.4).abs() < 1e-9);
}

#[test]
fn tax_unknown_municipality_fails() {
    let output = proptax(&["tax", "500000", "-m", "atlantis"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("atlantis"));
    assert!(stderr.contains("bronxville"));
}

#[test]
fn tax_with_custom_config() {
    let json = json_of(&proptax(&[
        "--config",
        "tests/data/municipalities.json",
        "tax",
        "500000",
        "--json",
    ]));

    assert_eq!(json["municipalities"].as_array().unwrap().len(), 2);
    assert_eq!(json["lowest"], "hillside");
    // riverbend has a village rate but no village levy
    let riverbend = &json["municipalities"][1];
    assert!((decimal_field(&riverbend["village_tax"])).abs() < 1e-9);
    assert!((decimal_field(&riverbend["total_tax"]) - 10000.0).abs() < 1e-9);
}

#[test]
fn report_text() {
    let stdout = stdout_of(&proptax(&["report", SALES]));

    assert!(stdout.contains("WESTCHESTER PROPERTY TAX & VALUE COMPARISON REPORT"));
    assert!(stdout.contains("Total Sales Analyzed: 11"));
    assert!(stdout.contains("Premium of 78% between highest and lowest value municipalities"));
    assert!(stdout.contains("Population-weighted median value: $609/sqft"));
}

#[test]
fn report_json_with_filter() {
    let json = json_of(&proptax(&[
        "report",
        SALES,
        "-m",
        "bronxville",
        "-m",
        "tuckahoe",
        "--json",
    ]));

    assert_eq!(json["total_sales_analyzed"], 6);
    assert_eq!(json["value_ranking"][0][0], "bronxville");
    assert_eq!(json["metrics"]["tuckahoe"]["tax_source"], "measured");
    // base municipality was filtered out, so no area comparison
    assert!(json["area_comparison"].as_object().unwrap().is_empty());
}

#[test]
fn stats_report_and_ttest() {
    let stdout = stdout_of(&proptax(&["stats", SALES]));
    assert!(stdout.contains("STATISTICAL ANALYSIS REPORT"));
    assert!(stdout.contains("ANOVA"));

    let json = json_of(&proptax(&[
        "stats",
        SALES,
        "--ttest",
        "bronxville",
        "tuckahoe",
        "--regress",
        "sqft",
        "sale_price",
        "--json",
    ]));
    assert_eq!(json["records"], 11);
    assert_eq!(json["t_test"]["status"], "completed");
    assert_eq!(json["t_test"]["significant_05"], true);
    assert_eq!(json["regression"]["status"], "completed");
    assert_eq!(json["anova"]["status"], "completed");
}

#[test]
fn stats_rejects_unknown_column() {
    let output = proptax(&["stats", SALES, "--column", "price"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("price_per_sqft"));
}

#[test]
fn afford_with_sales() {
    let json = json_of(&proptax(&["afford", "20000", "--sales", SALES, "--json"]));
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0]["municipality"], "tuckahoe");
    let bronxville = rows.iter().find(|r| r["municipality"] == "bronxville").unwrap();
    assert_eq!(bronxville["typical_value_per_sqft"], 800.0);
}

#[test]
fn scenarios_lowest_first() {
    let json = json_of(&proptax(&["scenarios", SALES, "--value", "1000000", "--json"]));
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0]["municipality"], "tuckahoe");
    assert_eq!(rows[3]["municipality"], "bronxville");
    assert!((decimal_field(&rows[3]["tax_per_sqft"]) - 14.4).abs() < 1e-9);
}

#[test]
fn budget_comparison() {
    let stdout = stdout_of(&proptax(&[
        "budget",
        "tests/data/budgets.json",
        "-b",
        "Eastchester Fire District",
        "-c",
        "Scarsdale Fire Department",
    ]));
    assert!(stdout.contains("Per Capita Difference: $66.67"));
    assert!(stdout.contains("Per-capita spending differs by more than 10%"));

    let listing = stdout_of(&proptax(&["budget", "tests/data/budgets.json"]));
    assert!(listing.contains("Bronxville UFSD"));
    assert!(listing.contains("$37500.00"));
}

#[test]
fn schema_outputs() {
    let header = stdout_of(&proptax(&["schema", "csv-header"]));
    assert!(header.starts_with("address,municipality,sqft,sale_price,sale_date"));

    let schema = json_of(&proptax(&["schema"]));
    assert!(schema["properties"]["municipalities"].is_object());

    let fields = json_of(&proptax(&["schema", "csv-fields", "--json"]));
    assert_eq!(fields[0]["name"], "address");
}
