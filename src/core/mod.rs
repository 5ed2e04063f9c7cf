pub mod budget;
pub mod comparison;
pub mod descriptive;
pub mod distribution;
pub mod metrics;
pub mod municipality;
pub mod sale;
pub mod statistics;
pub mod tax;

// Flat public surface for domain types and functions.
pub use budget::{
    read_budgets_json, BudgetComparison, BudgetInput, CombinedBudget, PerCapita, ServiceBudget,
    ServiceKind,
};
pub use comparison::{
    compare_eastchester_area, quick_compare, Affordability, AreaFocus, ComparisonEngine,
    ComparisonReport, TaxScenario,
};
pub use metrics::{
    MetricsCalculator, MunicipalityMetrics, PropertyMetrics, TaxSource, ValueTaxAnalysis,
};
pub use municipality::{
    ConfigError, Municipality, MunicipalityKind, MunicipalityRegistry, RegistryInput,
    SchoolDistrict, TaxRates, COMPARISON_TOWNS, EASTCHESTER_AREA,
};
pub use sale::{
    read_sales_csv, PropertyType, SaleDataset, SaleRecord, SaleRecordError, SaleRow,
    SALE_ROW_FIELDS,
};
pub use statistics::{
    AnovaOutcome, Column, CorrelationResult, OutlierMethod, RegressionOutcome,
    StatisticalAnalyzer, StatisticalSummary, StatisticsError, TTestOutcome,
};
pub use tax::{
    StarExemption, TaxBreakdown, TaxBreakdownRecord, TaxCalculator, TaxImpact, REFERENCE_SQFT,
};
