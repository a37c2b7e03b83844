use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::{NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::datetime::{ParseKind, Remaining, remaining_days};
use crate::listing::Listable;

pub const DEFAULT_EXPIRING_WITHIN_DAYS: i64 = 30;
pub const DEFAULT_INSPECTION_WITHIN_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Active,
    Pending,
    Terminated,
    Expired,
    #[serde(other)]
    Other,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Active => "active",
            ContractStatus::Pending => "pending",
            ContractStatus::Terminated => "terminated",
            ContractStatus::Expired => "expired",
            ContractStatus::Other => "other",
        }
    }

    /// Contracts that can still run out.
    pub fn is_running(&self) -> bool {
        matches!(self, ContractStatus::Active | ContractStatus::Pending)
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: String,

    #[serde(default)]
    pub unit: Option<String>,

    #[serde(default)]
    pub tenant: Option<String>,

    #[serde(default = "default_status")]
    pub status: ContractStatus,

    #[serde(default)]
    pub start_date: Option<String>,

    #[serde(default, alias = "expiryDate")]
    pub end_date: Option<String>,

    #[serde(default)]
    pub inspection_date: Option<String>,
}

fn default_status() -> ContractStatus {
    ContractStatus::Active
}

impl Listable for Contract {
    fn status_key(&self) -> String {
        self.status.as_str().to_string()
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.id.as_str()];
        fields.extend(self.unit.as_deref());
        fields.extend(self.tenant.as_deref());
        fields
    }
}

/// REST list endpoints answer either with a bare array or a `data` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContractFeed {
    List(Vec<Contract>),
    Envelope { data: Vec<Contract> },
}

pub fn parse_contracts(raw: &str) -> anyhow::Result<Vec<Contract>> {
    let feed: ContractFeed =
        serde_json::from_str(raw).context("contract feed is not a JSON array or data envelope")?;
    Ok(match feed {
        ContractFeed::List(contracts) => contracts,
        ContractFeed::Envelope { data } => data,
    })
}

#[instrument]
pub fn load_contracts(path: &Path) -> anyhow::Result<Vec<Contract>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let contracts =
        parse_contracts(&raw).with_context(|| format!("failed to parse {}", path.display()))?;
    info!(count = contracts.len(), "loaded contracts");
    Ok(contracts)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewPolicy {
    pub expiring_within_days: i64,
    pub inspection_within_days: i64,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            expiring_within_days: DEFAULT_EXPIRING_WITHIN_DAYS,
            inspection_within_days: DEFAULT_INSPECTION_WITHIN_DAYS,
        }
    }
}

impl ReviewPolicy {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            expiring_within_days: cfg
                .get_parsed("contracts.expiring_within_days")?
                .unwrap_or(defaults.expiring_within_days),
            inspection_within_days: cfg
                .get_parsed("contracts.inspection_within_days")?
                .unwrap_or(defaults.inspection_within_days),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewFlags {
    pub expiring_soon: bool,
    pub needs_inspection: bool,
    pub expired: bool,
    /// End date missing or unreadable.
    pub unknown_expiry: bool,
}

impl ReviewFlags {
    pub fn any_attention(&self) -> bool {
        self.expiring_soon || self.needs_inspection || self.expired
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractReview {
    pub contract_id: String,
    pub status: ContractStatus,
    pub end: Option<Remaining>,
    pub inspection: Option<Remaining>,
    pub flags: ReviewFlags,
}

impl ContractReview {
    pub fn used_fallback(&self) -> bool {
        [self.end, self.inspection]
            .iter()
            .flatten()
            .any(|r| r.kind == ParseKind::Fallback)
    }
}

pub fn review<Z: TimeZone>(
    contract: &Contract,
    today: NaiveDate,
    zone: &Z,
    policy: &ReviewPolicy,
) -> ContractReview {
    let end = contract
        .end_date
        .as_deref()
        .and_then(|raw| remaining_days(raw, today, zone));
    let inspection = contract
        .inspection_date
        .as_deref()
        .and_then(|raw| remaining_days(raw, today, zone));

    let mut flags = ReviewFlags {
        unknown_expiry: end.is_none(),
        ..ReviewFlags::default()
    };

    if let Some(end) = end {
        flags.expired = end.is_past();
        flags.expiring_soon =
            contract.status.is_running() && end.is_within(policy.expiring_within_days);
    }

    if let Some(inspection) = inspection
        && contract.status != ContractStatus::Terminated
    {
        flags.needs_inspection = inspection.days <= policy.inspection_within_days;
    }

    if contract.end_date.is_some() && end.is_none() {
        warn!(contract = %contract.id, "end date unreadable; treating expiry as unknown");
    }

    debug!(contract = %contract.id, ?flags, "reviewed contract");

    ContractReview {
        contract_id: contract.id.clone(),
        status: contract.status,
        end,
        inspection,
        flags,
    }
}

pub fn review_all<Z: TimeZone>(
    contracts: &[Contract],
    today: NaiveDate,
    zone: &Z,
    policy: &ReviewPolicy,
) -> Vec<ContractReview> {
    contracts
        .iter()
        .map(|contract| review(contract, today, zone, policy))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContractSummary {
    pub total: usize,
    pub active: usize,
    pub expiring_soon: usize,
    pub needing_inspection: usize,
    pub expired: usize,
    pub unknown_expiry: usize,
    pub fallback_parsed: usize,
}

impl ContractSummary {
    pub fn from_reviews(reviews: &[ContractReview]) -> Self {
        let mut summary = Self {
            total: reviews.len(),
            ..Self::default()
        };
        for review in reviews {
            summary.active += usize::from(review.status == ContractStatus::Active);
            summary.expiring_soon += usize::from(review.flags.expiring_soon);
            summary.needing_inspection += usize::from(review.flags.needs_inspection);
            summary.expired += usize::from(review.flags.expired);
            summary.unknown_expiry += usize::from(review.flags.unknown_expiry);
            summary.fallback_parsed += usize::from(review.used_fallback());
        }
        summary
    }
}

#[instrument(skip(contracts, zone), fields(count = contracts.len()))]
pub fn summarize<Z: TimeZone>(
    contracts: &[Contract],
    today: NaiveDate,
    zone: &Z,
    policy: &ReviewPolicy,
) -> ContractSummary {
    ContractSummary::from_reviews(&review_all(contracts, today, zone, policy))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
    }

    fn contract(
        id: &str,
        status: ContractStatus,
        end: Option<&str>,
        inspection: Option<&str>,
    ) -> Contract {
        Contract {
            id: id.to_string(),
            unit: Some(format!("Unit {id}")),
            tenant: None,
            status,
            start_date: Some("2024-07-01".to_string()),
            end_date: end.map(str::to_string),
            inspection_date: inspection.map(str::to_string),
        }
    }

    fn check(contract: Contract) -> ContractReview {
        review(&contract, today(), &Utc, &ReviewPolicy::default())
    }

    #[test]
    fn parses_array_and_envelope_feeds() {
        let array = r#"[{"id": "c1", "status": "active", "endDate": "2025-07-01"}]"#;
        let envelope = r#"{"data": [{
            "id": "c2",
            "status": "archived",
            "expiryDate": "2025-07-01T00:00:00Z",
            "inspectionDate": null
        }]}"#;

        let from_array = parse_contracts(array).unwrap();
        assert_eq!(from_array.len(), 1);
        assert_eq!(from_array[0].status, ContractStatus::Active);
        assert_eq!(from_array[0].end_date.as_deref(), Some("2025-07-01"));

        let from_envelope = parse_contracts(envelope).unwrap();
        assert_eq!(from_envelope[0].status, ContractStatus::Other);
        assert_eq!(from_envelope[0].end_date.as_deref(), Some("2025-07-01T00:00:00Z"));
        assert!(from_envelope[0].inspection_date.is_none());

        assert!(parse_contracts(r#"{"items": []}"#).is_err());
    }

    #[test]
    fn flags_expiring_and_expired() {
        let soon = check(contract("a", ContractStatus::Active, Some("2025-07-10"), None));
        let later = check(contract("b", ContractStatus::Active, Some("2025-07-11"), None));
        let gone = check(contract("c", ContractStatus::Active, Some("2025-06-09"), None));

        assert!(soon.flags.expiring_soon);
        assert!(!later.flags.expiring_soon);
        assert!(gone.flags.expired);
        assert!(!gone.flags.expiring_soon);
    }

    #[test]
    fn terminated_contracts_are_not_expiring_or_inspected() {
        let got = check(contract(
            "t",
            ContractStatus::Terminated,
            Some("2025-06-12"),
            Some("2025-06-11"),
        ));
        assert!(!got.flags.expiring_soon);
        assert!(!got.flags.needs_inspection);
    }

    #[test]
    fn overdue_inspections_need_attention() {
        let overdue = check(contract("o", ContractStatus::Active, None, Some("2025-05-01")));
        let far = check(contract("f", ContractStatus::Active, None, Some("2025-08-01")));
        assert!(overdue.flags.needs_inspection);
        assert!(!far.flags.needs_inspection);
    }

    #[test]
    fn unreadable_end_dates_are_unknown_not_expiring() {
        let got = check(contract("u", ContractStatus::Active, Some("soon-ish"), None));
        assert!(got.flags.unknown_expiry);
        assert!(!got.flags.expiring_soon);
        assert!(!got.flags.expired);
        assert!(!got.flags.any_attention());
    }

    #[test]
    fn summary_counts_each_flag() {
        let contracts = vec![
            contract("1", ContractStatus::Active, Some("2025-06-20"), Some("2025-06-12")),
            contract("2", ContractStatus::Active, Some("2026-06-20"), None),
            contract("3", ContractStatus::Pending, Some("2025/06/30"), None),
            contract("4", ContractStatus::Expired, Some("2025-01-01"), None),
            contract("5", ContractStatus::Active, None, None),
        ];
        let summary = summarize(&contracts, today(), &Utc, &ReviewPolicy::default());
        assert_eq!(
            summary,
            ContractSummary {
                total: 5,
                active: 3,
                expiring_soon: 2,
                needing_inspection: 1,
                expired: 1,
                unknown_expiry: 1,
                fallback_parsed: 1,
            }
        );
    }

    #[test]
    fn contracts_are_searchable_by_unit_and_tenant() {
        let mut c = contract("77", ContractStatus::Active, None, None);
        c.tenant = Some("Maria Lopez".to_string());
        assert!(c.matches_search("lopez"));
        assert!(c.matches_search("unit 77"));
        assert!(!c.matches_search("tower b"));
        assert_eq!(c.status_key(), "active");
    }
}
