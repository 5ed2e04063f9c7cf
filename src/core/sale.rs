use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::convert::TryFrom;
use std::io::Read;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SaleRecordError {
    #[error("square footage must be positive, got {0}")]
    NonPositiveSqft(Decimal),
    #[error("sale price must be positive, got {0}")]
    NonPositivePrice(Decimal),
    #[error("invalid sale date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("{0} is out of range for this sale")]
    OutOfRange(&'static str),
}

/// Type of residential property
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    #[default]
    SingleFamily,
    Condo,
    Coop,
    Townhouse,
    MultiFamily,
    Other,
}

impl PropertyType {
    /// Lenient parse of listing-site labels; anything unrecognised is `Other`
    pub fn parse_lenient(s: &str) -> Self {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "single_family" | "single_family_residential" | "house" | "sfr" => {
                PropertyType::SingleFamily
            }
            "condo" | "condominium" => PropertyType::Condo,
            "coop" | "co_op" | "cooperative" => PropertyType::Coop,
            "townhouse" | "townhome" => PropertyType::Townhouse,
            "multi_family" | "multifamily" | "2_family" | "3_family" => PropertyType::MultiFamily,
            _ => PropertyType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::SingleFamily => "single_family",
            PropertyType::Condo => "condo",
            PropertyType::Coop => "coop",
            PropertyType::Townhouse => "townhouse",
            PropertyType::MultiFamily => "multi_family",
            PropertyType::Other => "other",
        }
    }
}

/// A single observed property sale.
///
/// Square footage and sale price are always positive, and every derived
/// ratio is representable; construction fails otherwise. The municipality
/// key is not checked against any registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleRecord {
    address: String,
    municipality: String,
    sqft: Decimal,
    sale_price: Decimal,
    sale_date: NaiveDate,
    assessed_value: Decimal,
    annual_taxes: Decimal,
    lot_sqft: Option<Decimal>,
    bedrooms: u32,
    bathrooms: Decimal,
    year_built: Option<i32>,
    property_type: PropertyType,
    source: String,
    listing_url: Option<String>,
}

impl SaleRecord {
    pub fn new(
        address: impl Into<String>,
        municipality: impl Into<String>,
        sqft: Decimal,
        sale_price: Decimal,
        sale_date: NaiveDate,
        assessed_value: Decimal,
        annual_taxes: Decimal,
    ) -> Result<Self, SaleRecordError> {
        if sqft <= Decimal::ZERO {
            return Err(SaleRecordError::NonPositiveSqft(sqft));
        }
        if sale_price <= Decimal::ZERO {
            return Err(SaleRecordError::NonPositivePrice(sale_price));
        }
        let derived = [
            ("price_per_sqft", sale_price.checked_div(sqft)),
            ("tax_per_sqft", annual_taxes.checked_div(sqft)),
            (
                "effective_tax_rate",
                annual_taxes
                    .checked_div(sale_price)
                    .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED)),
            ),
            ("assessed_to_sale_ratio", assessed_value.checked_div(sale_price)),
        ];
        if let Some((name, _)) = derived.iter().find(|(_, value)| value.is_none()) {
            return Err(SaleRecordError::OutOfRange(*name));
        }
        Ok(SaleRecord {
            address: address.into(),
            municipality: municipality.into(),
            sqft,
            sale_price,
            sale_date,
            assessed_value,
            annual_taxes,
            lot_sqft: None,
            bedrooms: 0,
            bathrooms: Decimal::ZERO,
            year_built: None,
            property_type: PropertyType::default(),
            source: "unknown".to_string(),
            listing_url: None,
        })
    }

    pub fn with_lot_sqft(mut self, lot_sqft: Decimal) -> Self {
        self.lot_sqft = Some(lot_sqft);
        self
    }

    pub fn with_rooms(mut self, bedrooms: u32, bathrooms: Decimal) -> Self {
        self.bedrooms = bedrooms;
        self.bathrooms = bathrooms;
        self
    }

    pub fn with_year_built(mut self, year: i32) -> Self {
        self.year_built = Some(year);
        self
    }

    pub fn with_property_type(mut self, property_type: PropertyType) -> Self {
        self.property_type = property_type;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>, url: Option<String>) -> Self {
        self.source = source.into();
        self.listing_url = url;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn municipality(&self) -> &str {
        &self.municipality
    }

    pub fn sqft(&self) -> Decimal {
        self.sqft
    }

    pub fn sale_price(&self) -> Decimal {
        self.sale_price
    }

    pub fn sale_date(&self) -> NaiveDate {
        self.sale_date
    }

    pub fn assessed_value(&self) -> Decimal {
        self.assessed_value
    }

    pub fn annual_taxes(&self) -> Decimal {
        self.annual_taxes
    }

    pub fn lot_sqft(&self) -> Option<Decimal> {
        self.lot_sqft
    }

    pub fn bedrooms(&self) -> u32 {
        self.bedrooms
    }

    pub fn bathrooms(&self) -> Decimal {
        self.bathrooms
    }

    pub fn year_built(&self) -> Option<i32> {
        self.year_built
    }

    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn listing_url(&self) -> Option<&str> {
        self.listing_url.as_deref()
    }

    /// Sale price per square foot
    pub fn price_per_sqft(&self) -> Decimal {
        self.sale_price / self.sqft
    }

    /// Annual taxes per square foot
    pub fn tax_per_sqft(&self) -> Decimal {
        self.annual_taxes / self.sqft
    }

    /// Annual taxes as a percentage of sale price
    pub fn effective_tax_rate(&self) -> Decimal {
        self.annual_taxes / self.sale_price * Decimal::ONE_HUNDRED
    }

    /// Assessed value over sale price, an indicator of assessment accuracy
    pub fn assessed_to_sale_ratio(&self) -> Decimal {
        self.assessed_value / self.sale_price
    }

    pub fn has_taxes(&self) -> bool {
        self.annual_taxes > Decimal::ZERO
    }
}

/// Canonical CSV shape of a sale record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRow {
    pub address: String,
    pub municipality: String,
    pub sqft: Decimal,
    pub sale_price: Decimal,
    pub sale_date: String,
    #[serde(default)]
    pub assessed_value: Option<Decimal>,
    #[serde(default)]
    pub annual_taxes: Option<Decimal>,
    #[serde(default)]
    pub lot_sqft: Option<Decimal>,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub bathrooms: Option<Decimal>,
    #[serde(default)]
    pub year_built: Option<i32>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub listing_url: Option<String>,
}

/// Field descriptions for the sales CSV, in column order
pub const SALE_ROW_FIELDS: &[(&str, &str, &str)] = &[
    ("address", "string", "Street address"),
    ("municipality", "string", "Municipality key, e.g. bronxville"),
    ("sqft", "decimal", "Living area in square feet, must be positive"),
    ("sale_price", "decimal", "Sale price in dollars, must be positive"),
    ("sale_date", "date", "Sale date, YYYY-MM-DD"),
    ("assessed_value", "decimal", "Assessed value (optional, default 0)"),
    ("annual_taxes", "decimal", "Annual taxes paid (optional, default 0)"),
    ("lot_sqft", "decimal", "Lot size in square feet (optional)"),
    ("bedrooms", "integer", "Bedrooms (optional)"),
    ("bathrooms", "decimal", "Bathrooms (optional)"),
    ("year_built", "integer", "Year built (optional)"),
    (
        "property_type",
        "string",
        "single_family, condo, coop, townhouse, multi_family or other (optional)",
    ),
    ("source", "string", "Data source, e.g. redfin (optional)"),
    ("listing_url", "string", "Listing URL (optional)"),
];

impl TryFrom<SaleRow> for SaleRecord {
    type Error = SaleRecordError;

    fn try_from(row: SaleRow) -> Result<Self, Self::Error> {
        let sale_date = NaiveDate::parse_from_str(row.sale_date.trim(), DATE_FORMAT)
            .map_err(|_| SaleRecordError::InvalidDate(row.sale_date.clone()))?;

        let mut record = SaleRecord::new(
            row.address,
            row.municipality,
            row.sqft,
            row.sale_price,
            sale_date,
            row.assessed_value.unwrap_or_default(),
            row.annual_taxes.unwrap_or_default(),
        )?
        .with_rooms(
            row.bedrooms.unwrap_or_default(),
            row.bathrooms.unwrap_or_default(),
        );

        if let Some(lot) = row.lot_sqft {
            record = record.with_lot_sqft(lot);
        }
        if let Some(year) = row.year_built {
            record = record.with_year_built(year);
        }
        if let Some(property_type) = row.property_type.as_deref() {
            record = record.with_property_type(PropertyType::parse_lenient(property_type));
        }
        if let Some(source) = row.source {
            record = record.with_source(source, row.listing_url);
        }
        Ok(record)
    }
}

impl From<&SaleRecord> for SaleRow {
    fn from(record: &SaleRecord) -> Self {
        SaleRow {
            address: record.address.clone(),
            municipality: record.municipality.clone(),
            sqft: record.sqft,
            sale_price: record.sale_price,
            sale_date: record.sale_date.format(DATE_FORMAT).to_string(),
            assessed_value: Some(record.assessed_value),
            annual_taxes: Some(record.annual_taxes),
            lot_sqft: record.lot_sqft,
            bedrooms: Some(record.bedrooms),
            bathrooms: Some(record.bathrooms),
            year_built: record.year_built,
            property_type: Some(record.property_type.as_str().to_string()),
            source: Some(record.source.clone()),
            listing_url: record.listing_url.clone(),
        }
    }
}

/// Ordered collection of sales. Duplicates are kept.
#[derive(Debug, Clone, Default)]
pub struct SaleDataset {
    records: Vec<SaleRecord>,
}

impl SaleDataset {
    pub fn new(records: Vec<SaleRecord>) -> Self {
        SaleDataset { records }
    }

    pub fn add(&mut self, record: SaleRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SaleRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[SaleRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<SaleRecord> {
        self.records
    }

    /// Records for one municipality, exact case-sensitive key match
    pub fn filter_by_municipality(&self, key: &str) -> SaleDataset {
        self.records
            .iter()
            .filter(|r| r.municipality == key)
            .cloned()
            .collect()
    }

    /// Distinct municipality keys present, sorted
    pub fn municipalities(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.municipality.as_str()).collect()
    }
}

impl FromIterator<SaleRecord> for SaleDataset {
    fn from_iter<I: IntoIterator<Item = SaleRecord>>(iter: I) -> Self {
        SaleDataset {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SaleDataset {
    type Item = &'a SaleRecord;
    type IntoIter = std::slice::Iter<'a, SaleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for SaleDataset {
    type Item = SaleRecord;
    type IntoIter = std::vec::IntoIter<SaleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Read sales in the canonical CSV shape.
///
/// Rows that fail to parse or validate are skipped with a warning.
pub fn read_sales_csv<R: Read>(reader: R) -> SaleDataset {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut dataset = SaleDataset::default();
    for (i, result) in rdr.deserialize::<SaleRow>().enumerate() {
        // header is line 1
        let line = i + 2;
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                log::warn!("skipping sales row {}: {}", line, e);
                continue;
            }
        };
        match SaleRecord::try_from(row) {
            Ok(sale) => dataset.add(sale),
            Err(e) => log::warn!("skipping sales row {}: {}", line, e),
        }
    }
    dataset
}
