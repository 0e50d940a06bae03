//! Normalization engine: resolve canonical metrics for each company-year
//! from the winning filing's facts.

use crate::connection::Store;
use crate::normalization::{LatestFiling, UpsertOutcome};
use finloom::error::Result;
use finloom::types::{ConceptMapping, Fact, NormalizedFinancial, PeriodType, StandardizedMetric};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Confidence multiplier applied per priority step below the best mapping.
const PRIORITY_DECAY: f64 = 0.95;

/// Report of one engine run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizationReport {
    /// Filings considered (one per company-year)
    pub filings: usize,
    /// Rows inserted
    pub inserted: usize,
    /// Rows updated
    pub updated: usize,
    /// Rows skipped by the confidence rule
    pub skipped: usize,
    /// Metrics with no matching concept in a filing
    pub unmatched: usize,
}

/// Canonical metric taxonomy with the default vendor-concept mappings.
///
/// `(metric, label, category, [(concept, priority, confidence)])`
#[allow(clippy::type_complexity)]
const STANDARD_METRICS: &[(&str, &str, &str, &[(&str, i32, f64)])] = &[
    (
        "revenue",
        "Revenue",
        "income_statement",
        &[
            ("us-gaap:RevenueFromContractWithCustomerExcludingAssessedTax", 1, 0.95),
            ("us-gaap:Revenues", 2, 0.90),
            ("us-gaap:SalesRevenueNet", 3, 0.85),
        ],
    ),
    (
        "net_income",
        "Net Income",
        "income_statement",
        &[("us-gaap:NetIncomeLoss", 1, 0.95), ("us-gaap:ProfitLoss", 2, 0.85)],
    ),
    (
        "operating_income",
        "Operating Income",
        "income_statement",
        &[("us-gaap:OperatingIncomeLoss", 1, 0.95)],
    ),
    (
        "total_assets",
        "Total Assets",
        "balance_sheet",
        &[("us-gaap:Assets", 1, 0.95)],
    ),
    (
        "total_liabilities",
        "Total Liabilities",
        "balance_sheet",
        &[
            ("us-gaap:Liabilities", 1, 0.95),
            ("us-gaap:LiabilitiesAndStockholdersEquity", 2, 0.70),
        ],
    ),
    (
        "stockholders_equity",
        "Stockholders' Equity",
        "balance_sheet",
        &[
            ("us-gaap:StockholdersEquity", 1, 0.95),
            ("us-gaap:StockholdersEquityIncludingPortionAttributableToNoncontrollingInterest", 2, 0.90),
        ],
    ),
    (
        "cash_and_equivalents",
        "Cash and Cash Equivalents",
        "balance_sheet",
        &[("us-gaap:CashAndCashEquivalentsAtCarryingValue", 1, 0.95)],
    ),
    (
        "eps_basic",
        "Earnings Per Share (Basic)",
        "per_share",
        &[("us-gaap:EarningsPerShareBasic", 1, 0.95)],
    ),
    (
        "eps_diluted",
        "Earnings Per Share (Diluted)",
        "per_share",
        &[("us-gaap:EarningsPerShareDiluted", 1, 0.95)],
    ),
];

/// Seed the standard metric taxonomy and its default concept mappings.
pub fn seed_standard_metrics(store: &Store) -> Result<()> {
    let repo = store.normalization();
    for (metric_id, label, category, mappings) in STANDARD_METRICS {
        repo.upsert_standardized_metric(&StandardizedMetric {
            metric_id: (*metric_id).to_string(),
            label: (*label).to_string(),
            category: (*category).to_string(),
            data_type: if *category == "per_share" { "per_share" } else { "monetary" }.to_string(),
            description: None,
            calculation: None,
        })?;
        for (concept, priority, confidence) in *mappings {
            repo.upsert_concept_mapping(&ConceptMapping {
                metric_id: (*metric_id).to_string(),
                concept_name: (*concept).to_string(),
                priority: *priority,
                confidence: *confidence,
                industry_filter: None,
            })?;
        }
    }
    Ok(())
}

/// Run normalization over every winning filing.
pub fn normalize_all(store: &Store, ticker: Option<&str>) -> Result<NormalizationReport> {
    let repo = store.normalization();
    let winners = repo.latest_filing_per_fiscal_year(&["10-K", "10-K/A"], ticker)?;

    // Group mappings per metric, ascending priority
    let mut by_metric: BTreeMap<String, Vec<ConceptMapping>> = BTreeMap::new();
    for mapping in repo.concept_mappings(None)? {
        by_metric.entry(mapping.metric_id.clone()).or_default().push(mapping);
    }
    for mappings in by_metric.values_mut() {
        mappings.sort_by_key(|m| m.priority);
    }

    let mut report = NormalizationReport { filings: winners.len(), ..Default::default() };

    for winner in &winners {
        let facts = store.facts().get(&winner.accession_number, None)?;
        for (metric_id, mappings) in &by_metric {
            match resolve_metric(winner, metric_id, mappings, &facts) {
                Some(row) => match repo.upsert_normalized(&row)? {
                    UpsertOutcome::Inserted(_) => report.inserted += 1,
                    UpsertOutcome::Updated(_) => report.updated += 1,
                    UpsertOutcome::Skipped(_) => report.skipped += 1,
                },
                None => {
                    report.unmatched += 1;
                    debug!(metric = %metric_id, accession = %winner.accession_number, "no concept matched");
                }
            }
        }
    }

    info!(
        filings = report.filings,
        inserted = report.inserted,
        updated = report.updated,
        skipped = report.skipped,
        unmatched = report.unmatched,
        "normalization run complete"
    );
    Ok(report)
}

/// Walk a metric's mappings in priority order; the first concept present
/// in the filing's facts supplies the value. Confidence decays for
/// below-best-priority matches.
fn resolve_metric(
    winner: &LatestFiling,
    metric_id: &str,
    mappings: &[ConceptMapping],
    facts: &[Fact],
) -> Option<NormalizedFinancial> {
    for (rank, mapping) in mappings.iter().enumerate() {
        if let Some(fact) = best_fact_for_concept(&mapping.concept_name, winner.fiscal_year, facts) {
            let value = fact.value.as_numeric()?;
            let priority_factor = PRIORITY_DECAY.powi(rank as i32);
            return Some(NormalizedFinancial {
                company_ticker: winner.ticker.clone(),
                fiscal_year: winner.fiscal_year,
                fiscal_quarter: None,
                metric_id: metric_id.to_string(),
                value,
                source_concept: mapping.concept_name.clone(),
                source_accession: Some(winner.accession_number.clone()),
                confidence: mapping.confidence * priority_factor,
            });
        }
    }
    None
}

/// Pick the undimensioned numeric fact for `concept` matching the fiscal
/// year: an instant at the period end or a duration ending there. The
/// longest duration (the annual figure, not a quarter) wins ties.
fn best_fact_for_concept<'f>(concept: &str, fiscal_year: i32, facts: &'f [Fact]) -> Option<&'f Fact> {
    use chrono::Datelike;

    facts
        .iter()
        .filter(|f| f.concept_qname == concept)
        .filter(|f| f.dimensions.is_none())
        .filter(|f| f.value.as_numeric().is_some())
        .filter(|f| f.period_end.is_some_and(|end| end.year() == fiscal_year))
        .max_by_key(|f| {
            let duration_days = match (f.period_type, f.period_start, f.period_end) {
                (PeriodType::Duration, Some(start), Some(end)) => {
                    end.signed_duration_since(start).num_days()
                }
                _ => 0,
            };
            (f.period_end, duration_days)
        })
}
