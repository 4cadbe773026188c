use crate::models::FundamentalRecord;
use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, NaiveDate};
use futures::future::try_join_all;
use log::debug;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Identifier keys carried by statement records that are never features.
pub const IGNORED_KEYS: [&str; 11] = [
    "symbol",
    "reportedCurrency",
    "calendarYear",
    "fillingDate",
    "acceptedDate",
    "period",
    "cik",
    "link",
    "finalLink",
    "pbRatio",
    "ptbRatio",
];

/// Fundamentals used for ratio expansion.
pub const FUNDAMENTAL_RATIO_COLUMNS: [&str; 21] = [
    "revenue",
    "costOfRevenue",
    "grossProfit",
    "netIncome",
    "operatingIncome",
    "operatingExpenses",
    "researchAndDevelopmentExpenses",
    "ebitda",
    "freeCashFlow",
    "incomeBeforeTax",
    "incomeTaxExpense",
    "operatingCashFlow",
    "cashAndCashEquivalents",
    "totalEquity",
    "otherCurrentLiabilities",
    "totalCurrentLiabilities",
    "totalDebt",
    "totalLiabilitiesAndStockholdersEquity",
    "totalStockholdersEquity",
    "totalInvestments",
    "totalAssets",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatementCategory {
    Ratios,
    KeyMetrics,
    CashFlow,
    Income,
    BalanceSheet,
    IncomeGrowth,
    BalanceSheetGrowth,
    CashFlowGrowth,
    OwnerEarnings,
}

impl StatementCategory {
    pub const ALL: [StatementCategory; 9] = [
        StatementCategory::Ratios,
        StatementCategory::KeyMetrics,
        StatementCategory::CashFlow,
        StatementCategory::Income,
        StatementCategory::BalanceSheet,
        StatementCategory::IncomeGrowth,
        StatementCategory::BalanceSheetGrowth,
        StatementCategory::CashFlowGrowth,
        StatementCategory::OwnerEarnings,
    ];

    /// Order in which categories write into a merged record. The first
    /// category to provide a field owns it.
    pub const MERGE_ORDER: [StatementCategory; 9] = [
        StatementCategory::Ratios,
        StatementCategory::KeyMetrics,
        StatementCategory::Income,
        StatementCategory::BalanceSheet,
        StatementCategory::CashFlow,
        StatementCategory::OwnerEarnings,
        StatementCategory::IncomeGrowth,
        StatementCategory::BalanceSheetGrowth,
        StatementCategory::CashFlowGrowth,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            StatementCategory::Ratios => "ratios",
            StatementCategory::KeyMetrics => "key-metrics",
            StatementCategory::CashFlow => "cash-flow-statement",
            StatementCategory::Income => "income-statement",
            StatementCategory::BalanceSheet => "balance-sheet-statement",
            StatementCategory::IncomeGrowth => "income-statement-growth",
            StatementCategory::BalanceSheetGrowth => "balance-sheet-statement-growth",
            StatementCategory::CashFlowGrowth => "cash-flow-statement-growth",
            StatementCategory::OwnerEarnings => "owner-earnings",
        }
    }

    /// Known numeric fields of the category.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            StatementCategory::Ratios => &[
                "currentRatio",
                "quickRatio",
                "cashRatio",
                "daysOfSalesOutstanding",
                "grossProfitMargin",
                "operatingProfitMargin",
                "netProfitMargin",
                "returnOnAssets",
                "returnOnEquity",
                "debtRatio",
                "debtEquityRatio",
                "interestCoverage",
                "assetTurnover",
                "inventoryTurnover",
                "priceEarningsRatio",
                "priceToSalesRatio",
                "dividendYield",
                "payoutRatio",
            ],
            StatementCategory::KeyMetrics => &[
                "revenuePerShare",
                "netIncomePerShare",
                "operatingCashFlowPerShare",
                "freeCashFlowPerShare",
                "cashPerShare",
                "bookValuePerShare",
                "marketCap",
                "enterpriseValue",
                "peRatio",
                "evToSales",
                "enterpriseValueOverEBITDA",
                "earningsYield",
                "freeCashFlowYield",
                "debtToEquity",
                "workingCapital",
                "roic",
                "dividendYield",
                "payoutRatio",
            ],
            StatementCategory::CashFlow => &[
                "netIncome",
                "depreciationAndAmortization",
                "stockBasedCompensation",
                "changeInWorkingCapital",
                "operatingCashFlow",
                "capitalExpenditure",
                "freeCashFlow",
                "dividendsPaid",
                "commonStockRepurchased",
                "netCashUsedForInvestingActivites",
                "netChangeInCash",
            ],
            StatementCategory::Income => &[
                "revenue",
                "costOfRevenue",
                "grossProfit",
                "researchAndDevelopmentExpenses",
                "sellingGeneralAndAdministrativeExpenses",
                "operatingExpenses",
                "operatingIncome",
                "interestExpense",
                "ebitda",
                "incomeBeforeTax",
                "incomeTaxExpense",
                "netIncome",
                "eps",
                "epsdiluted",
                "weightedAverageShsOut",
            ],
            StatementCategory::BalanceSheet => &[
                "cashAndCashEquivalents",
                "shortTermInvestments",
                "netReceivables",
                "inventory",
                "totalCurrentAssets",
                "propertyPlantEquipmentNet",
                "goodwill",
                "totalAssets",
                "accountPayables",
                "otherCurrentLiabilities",
                "totalCurrentLiabilities",
                "longTermDebt",
                "totalLiabilities",
                "totalStockholdersEquity",
                "totalEquity",
                "totalLiabilitiesAndStockholdersEquity",
                "totalInvestments",
                "totalDebt",
                "netDebt",
            ],
            StatementCategory::IncomeGrowth => &[
                "growthRevenue",
                "growthGrossProfit",
                "growthOperatingIncome",
                "growthNetIncome",
                "growthEPS",
                "growthEBITDA",
            ],
            StatementCategory::BalanceSheetGrowth => &[
                "growthTotalAssets",
                "growthTotalLiabilities",
                "growthTotalStockholdersEquity",
                "growthTotalDebt",
                "growthCashAndCashEquivalents",
                "growthInventory",
            ],
            StatementCategory::CashFlowGrowth => &[
                "growthOperatingCashFlow",
                "growthFreeCashFlow",
                "growthCapitalExpenditure",
                "growthDividendsPaid",
                "growthNetChangeInCash",
            ],
            StatementCategory::OwnerEarnings => &[
                "averagePPE",
                "maintenanceCapex",
                "ownersEarnings",
                "growthCapex",
                "ownersEarningsPerShare",
            ],
        }
    }
}

/// Union of every category's fields, without duplicates, in merge order.
pub fn fundamental_schema() -> Vec<&'static str> {
    let mut seen = BTreeSet::new();
    let mut fields = Vec::new();
    for category in StatementCategory::MERGE_ORDER {
        for field in category.fields() {
            if seen.insert(*field) {
                fields.push(*field);
            }
        }
    }
    fields
}

/// Source of raw statement records for one ticker and category.
#[allow(async_fn_in_trait)]
pub trait StatementLoader {
    async fn load_raw(&self, ticker: &str, category: StatementCategory) -> Result<Vec<Value>>;
}

/// Reads `{root}/financial-statements/{category}/quarter/{ticker}.json`.
#[derive(Debug, Clone)]
pub struct FileStatementLoader {
    root: PathBuf,
}

impl FileStatementLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn statement_path(&self, ticker: &str, category: StatementCategory) -> PathBuf {
        self.root
            .join("financial-statements")
            .join(category.dir_name())
            .join("quarter")
            .join(format!("{}.json", ticker))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl StatementLoader for FileStatementLoader {
    async fn load_raw(&self, ticker: &str, category: StatementCategory) -> Result<Vec<Value>> {
        let path = self.statement_path(ticker, category);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value: Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid statement JSON in {}", path.display()))?;
        match value {
            Value::Array(items) => Ok(items),
            _ => Err(anyhow!("Expected a record list in {}", path.display())),
        }
    }
}

/// Records of every category for one ticker, validated against the schema.
#[derive(Debug, Clone, Default)]
pub struct StatementSet {
    pub by_category: BTreeMap<StatementCategory, Vec<FundamentalRecord>>,
    pub unknown_fields: BTreeSet<String>,
}

impl StatementSet {
    pub fn count(&self, category: StatementCategory) -> usize {
        self.by_category.get(&category).map_or(0, Vec::len)
    }

    /// Merges categories by report date, first writer wins per field.
    pub fn merged(&self) -> Vec<FundamentalRecord> {
        let mut by_date: BTreeMap<NaiveDate, FundamentalRecord> = BTreeMap::new();
        for category in StatementCategory::MERGE_ORDER {
            let Some(records) = self.by_category.get(&category) else {
                continue;
            };
            for record in records {
                let merged = by_date
                    .entry(record.report_date)
                    .or_insert_with(|| FundamentalRecord::new(&record.entity_id, record.report_date));
                for (field, value) in &record.values {
                    merged.values.entry(field.clone()).or_insert(*value);
                }
            }
        }
        by_date.into_values().collect()
    }
}

/// Parses the raw records of one category. Identifier keys are dropped,
/// records dated before `min_year` are dropped, unknown keys are collected in
/// `unknown` and never kept.
pub fn parse_statement_records(
    ticker: &str,
    category: StatementCategory,
    raw: &[Value],
    min_year: i32,
    unknown: &mut BTreeSet<String>,
) -> Vec<FundamentalRecord> {
    let known = category.fields();
    let mut records = Vec::with_capacity(raw.len());
    for item in raw {
        let Some(object) = item.as_object() else {
            continue;
        };
        let Some(report_date) = object
            .get("date")
            .and_then(Value::as_str)
            .and_then(|raw_date| NaiveDate::parse_from_str(raw_date.get(..10)?, "%Y-%m-%d").ok())
        else {
            continue;
        };
        if report_date.year() < min_year {
            continue;
        }

        let mut record = FundamentalRecord::new(ticker, report_date);
        for (key, value) in object {
            if key == "date" || IGNORED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if !known.contains(&key.as_str()) {
                unknown.insert(format!("{}.{}", category.dir_name(), key));
                continue;
            }
            if let Some(number) = value.as_f64().filter(|number| number.is_finite()) {
                record.values.insert(key.clone(), number);
            }
        }
        records.push(record);
    }
    records
}

/// Loads every category concurrently. Any category failing to load fails the
/// whole set.
pub async fn load_statements<L: StatementLoader>(
    loader: &L,
    ticker: &str,
    min_year: i32,
) -> Result<StatementSet> {
    let raw = try_join_all(StatementCategory::ALL.iter().map(|category| async move {
        loader
            .load_raw(ticker, *category)
            .await
            .map(|items| (*category, items))
    }))
    .await?;

    let mut set = StatementSet::default();
    for (category, items) in raw {
        let records =
            parse_statement_records(ticker, category, &items, min_year, &mut set.unknown_fields);
        set.by_category.insert(category, records);
    }
    if !set.unknown_fields.is_empty() {
        debug!(
            "{}: ignored {} unknown statement field(s)",
            ticker,
            set.unknown_fields.len()
        );
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_drops_identifiers_old_records_and_unknown_keys() {
        let raw = vec![
            json!({"date": "1999-12-31", "symbol": "AAA", "revenue": 1.0}),
            json!({"date": "2001-03-31", "symbol": "AAA", "revenue": 10.0, "mystery": 3.0, "netIncome": null}),
            json!({"symbol": "AAA", "revenue": 5.0}),
        ];
        let mut unknown = BTreeSet::new();
        let records =
            parse_statement_records("AAA", StatementCategory::Income, &raw, 2000, &mut unknown);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.values.get("revenue"), Some(&10.0));
        assert!(!record.values.contains_key("symbol"));
        assert!(!record.values.contains_key("netIncome"));
        assert!(unknown.contains("income-statement.mystery"));
    }

    #[test]
    fn merge_is_first_writer_wins_in_merge_order() {
        let date = NaiveDate::from_ymd_opt(2020, 3, 31).unwrap();
        let mut ratios = FundamentalRecord::new("AAA", date);
        ratios.values.insert("dividendYield".into(), 0.01);
        let mut metrics = FundamentalRecord::new("AAA", date);
        metrics.values.insert("dividendYield".into(), 0.99);
        metrics.values.insert("marketCap".into(), 5.0);

        let mut set = StatementSet::default();
        set.by_category.insert(StatementCategory::KeyMetrics, vec![metrics]);
        set.by_category.insert(StatementCategory::Ratios, vec![ratios]);

        let merged = set.merged();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].values.get("dividendYield"), Some(&0.01));
        assert_eq!(merged[0].values.get("marketCap"), Some(&5.0));
    }

    #[test]
    fn schema_contains_every_ratio_column_once() {
        let schema = fundamental_schema();
        for column in FUNDAMENTAL_RATIO_COLUMNS {
            assert_eq!(schema.iter().filter(|field| **field == column).count(), 1);
        }
    }
}
