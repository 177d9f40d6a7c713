//! Vendor activity rules: transaction-source tagging, eligibility priorities
//! and the windowed aggregates.
//!
//! The query builders render their SQL from the same tables used here, so
//! the in-memory evaluation and the generated SQL cannot drift apart in
//! precedence or priority order.

use super::RuleSet;
use bigdecimal::{BigDecimal, Zero};
use chrono::{Months, NaiveDate};

/// Boolean facts driving the transaction-source tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrxFlags {
    /// Open invoice/debit document created more than 2 years ago.
    pub has_old_open_invoice: bool,
    pub has_invoice_1y: bool,
    pub has_invoice_2y: bool,
    pub has_purchase_order_2y: bool,
}

/// Transaction-source classification; exactly one applies per vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrxSourceTag {
    InvoiceOpen,
    Invoice1Y,
    Invoice2Y,
    PurchaseOrder2Y,
    NoTransactions,
}

impl TrxSourceTag {
    /// Flag-driven tags in evaluation order. `NoTransactions` is the fallback.
    pub const PRECEDENCE: [TrxSourceTag; 4] = [
        TrxSourceTag::InvoiceOpen,
        TrxSourceTag::Invoice1Y,
        TrxSourceTag::Invoice2Y,
        TrxSourceTag::PurchaseOrder2Y,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TrxSourceTag::InvoiceOpen => "INV_OP",
            TrxSourceTag::Invoice1Y => "INV_1Y",
            TrxSourceTag::Invoice2Y => "INV_2Y",
            TrxSourceTag::PurchaseOrder2Y => "POH_OP",
            TrxSourceTag::NoTransactions => "NO_TRX_AT_ALL",
        }
    }

    /// Name of the boolean column carrying the tag's flag in generated SQL.
    pub fn flag_column(self) -> Option<&'static str> {
        match self {
            TrxSourceTag::InvoiceOpen => Some("has_inv_op_old"),
            TrxSourceTag::Invoice1Y => Some("has_inv_1y"),
            TrxSourceTag::Invoice2Y => Some("has_inv_2y"),
            TrxSourceTag::PurchaseOrder2Y => Some("has_po_2y"),
            TrxSourceTag::NoTransactions => None,
        }
    }

    fn is_flagged(self, flags: &TrxFlags) -> bool {
        match self {
            TrxSourceTag::InvoiceOpen => flags.has_old_open_invoice,
            TrxSourceTag::Invoice1Y => flags.has_invoice_1y,
            TrxSourceTag::Invoice2Y => flags.has_invoice_2y,
            TrxSourceTag::PurchaseOrder2Y => flags.has_purchase_order_2y,
            TrxSourceTag::NoTransactions => false,
        }
    }

    pub fn classify(flags: TrxFlags) -> Self {
        Self::PRECEDENCE
            .into_iter()
            .find(|tag| tag.is_flagged(&flags))
            .unwrap_or(TrxSourceTag::NoTransactions)
    }
}

/// Facts a vendor (or site) is judged on.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorActivity {
    pub open_balance: BigDecimal,
    /// Purchase order created within 2 years.
    pub has_recent_po: bool,
    /// Invoice/debit documents created within 2 years.
    pub doc_count_2y: i64,
    /// Document of the qualifying set created within 2 years.
    pub has_qualifying_recent_doc: bool,
    /// Any document of the excluded category.
    pub has_excluded_doc: bool,
}

impl VendorActivity {
    /// First priority that holds, in [`Priority::ALL`] order.
    pub fn satisfied_priority(&self) -> Option<Priority> {
        Priority::ALL.into_iter().find(|p| p.holds(self))
    }

    /// Excluded documents veto every priority.
    pub fn is_eligible(&self) -> bool {
        !self.has_excluded_doc && self.satisfied_priority().is_some()
    }
}

/// Inclusion priorities, combined by OR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    PositiveOpenBalance,
    RecentPurchaseOrder,
    QualifyingRecentDocs,
}

impl Priority {
    pub const ALL: [Priority; 3] = [
        Priority::PositiveOpenBalance,
        Priority::RecentPurchaseOrder,
        Priority::QualifyingRecentDocs,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Priority::PositiveOpenBalance => "priority 1: positive open balance",
            Priority::RecentPurchaseOrder => "priority 2: purchase order within 2 years",
            Priority::QualifyingRecentDocs => "priority 3: recurring documents within 2 years",
        }
    }

    pub fn holds(self, activity: &VendorActivity) -> bool {
        match self {
            Priority::PositiveOpenBalance => activity.open_balance > BigDecimal::zero(),
            Priority::RecentPurchaseOrder => activity.has_recent_po,
            Priority::QualifyingRecentDocs => {
                activity.doc_count_2y > 1 && activity.has_qualifying_recent_doc
            }
        }
    }
}

/// One ERP document as seen by the aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub doc_type: String,
    pub amount: BigDecimal,
    pub balance: BigDecimal,
    pub created: NaiveDate,
    /// Status `'0'` in the ERP; ignored by every aggregate.
    pub cancelled: bool,
}

impl Document {
    pub fn new(doc_type: &str, amount: BigDecimal, balance: BigDecimal, created: NaiveDate) -> Self {
        Self {
            doc_type: doc_type.to_string(),
            amount,
            balance,
            created,
            cancelled: false,
        }
    }

    fn is_open(&self) -> bool {
        self.balance > BigDecimal::zero()
    }
}

/// Window boundaries relative to a reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Windows {
    pub since_1y: NaiveDate,
    pub since_2y: NaiveDate,
}

impl Windows {
    pub fn at(as_of: NaiveDate) -> Self {
        Self {
            since_1y: as_of.checked_sub_months(Months::new(12)).unwrap_or(NaiveDate::MIN),
            since_2y: as_of.checked_sub_months(Months::new(24)).unwrap_or(NaiveDate::MIN),
        }
    }

    pub fn within_1y(&self, date: NaiveDate) -> bool {
        date >= self.since_1y
    }

    /// The year before the trailing year.
    pub fn within_year_two(&self, date: NaiveDate) -> bool {
        date >= self.since_2y && date < self.since_1y
    }

    pub fn within_2y(&self, date: NaiveDate) -> bool {
        date >= self.since_2y
    }
}

/// Aggregate columns of one vendor (or site), computed in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySummary {
    pub trx_1y_amount: BigDecimal,
    pub trx_2y_amount: BigDecimal,
    pub open_balance: BigDecimal,
    pub trx_1y_count: i64,
    pub trx_2y_count: i64,
    pub open_count: i64,
    pub min_trx_date: Option<NaiveDate>,
    pub max_trx_date: Option<NaiveDate>,
    pub po_1y_open_count: i64,
    pub po_2y_open_count: i64,
    pub po_open_count: i64,
    pub min_po_date: Option<NaiveDate>,
    pub max_po_date: Option<NaiveDate>,
    pub agreement_count: i64,
    pub flags: TrxFlags,
    pub activity: VendorActivity,
}

impl ActivitySummary {
    /// Evaluates the report aggregates over `documents`, all scoped to one
    /// vendor or site. Amounts are scaled by the rate per document.
    pub fn evaluate(documents: &[Document], rules: &RuleSet, as_of: NaiveDate) -> Self {
        let types = rules.document_types();
        let rate = rules.conversion_rate();
        let windows = Windows::at(as_of);

        let mut summary = ActivitySummary {
            trx_1y_amount: BigDecimal::zero(),
            trx_2y_amount: BigDecimal::zero(),
            open_balance: BigDecimal::zero(),
            trx_1y_count: 0,
            trx_2y_count: 0,
            open_count: 0,
            min_trx_date: None,
            max_trx_date: None,
            po_1y_open_count: 0,
            po_2y_open_count: 0,
            po_open_count: 0,
            min_po_date: None,
            max_po_date: None,
            agreement_count: 0,
            flags: TrxFlags::default(),
            activity: VendorActivity {
                open_balance: BigDecimal::zero(),
                has_recent_po: false,
                doc_count_2y: 0,
                has_qualifying_recent_doc: false,
                has_excluded_doc: false,
            },
        };

        for doc in documents.iter().filter(|d| !d.cancelled) {
            let code = doc.doc_type.as_str();
            let is_invoice = types.invoice_debit().contains(code);
            let is_po = types.purchase_orders().contains(code);

            if types.all_transactional().contains(code) {
                let signed_amount = if is_invoice {
                    &doc.amount * rate
                } else if types.credit_notes().contains(code) {
                    -(&doc.amount * rate)
                } else {
                    BigDecimal::zero()
                };

                if windows.within_1y(doc.created) {
                    summary.trx_1y_amount += &signed_amount;
                    summary.trx_1y_count += 1;
                } else if windows.within_year_two(doc.created) {
                    summary.trx_2y_amount += &signed_amount;
                    summary.trx_2y_count += 1;
                }

                if doc.is_open() {
                    if types.balance_positive().contains(code) {
                        summary.open_balance += &doc.balance * rate;
                    } else if types.balance_negative().contains(code) {
                        summary.open_balance -= &doc.balance * rate;
                    }
                    summary.open_count += 1;
                }

                summary.min_trx_date = earliest(summary.min_trx_date, doc.created);
                summary.max_trx_date = latest(summary.max_trx_date, doc.created);
            }

            if is_po && doc.is_open() {
                summary.po_open_count += 1;
                if windows.within_1y(doc.created) {
                    summary.po_1y_open_count += 1;
                }
                if windows.within_2y(doc.created) {
                    summary.po_2y_open_count += 1;
                }
                summary.min_po_date = earliest(summary.min_po_date, doc.created);
                summary.max_po_date = latest(summary.max_po_date, doc.created);
            }
            if types.agreements().contains(code) && doc.is_open() {
                summary.agreement_count += 1;
            }

            if is_invoice {
                if windows.within_1y(doc.created) {
                    summary.flags.has_invoice_1y = true;
                }
                if windows.within_2y(doc.created) {
                    summary.flags.has_invoice_2y = true;
                    summary.activity.doc_count_2y += 1;
                } else if doc.is_open() {
                    summary.flags.has_old_open_invoice = true;
                }
            }
            if is_po && windows.within_2y(doc.created) {
                summary.flags.has_purchase_order_2y = true;
                summary.activity.has_recent_po = true;
            }
            if types.qualifying_recent().contains(code) && windows.within_2y(doc.created) {
                summary.activity.has_qualifying_recent_doc = true;
            }
            if types.excluded().contains(code) {
                summary.activity.has_excluded_doc = true;
            }
        }

        summary.activity.open_balance = summary.open_balance.clone();
        summary
    }

    pub fn source_tag(&self) -> TrxSourceTag {
        TrxSourceTag::classify(self.flags)
    }

    pub fn is_eligible(&self) -> bool {
        self.activity.is_eligible()
    }
}

fn earliest(current: Option<NaiveDate>, candidate: NaiveDate) -> Option<NaiveDate> {
    Some(current.map_or(candidate, |c| c.min(candidate)))
}

fn latest(current: Option<NaiveDate>, candidate: NaiveDate) -> Option<NaiveDate> {
    Some(current.map_or(candidate, |c| c.max(candidate)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RulesConfig;
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn as_of() -> NaiveDate {
        date(2025, 6, 30)
    }

    fn rules_with_rate(rate: &str) -> RuleSet {
        let config = RulesConfig {
            conversion_rate: rate.to_string(),
            ..RulesConfig::default()
        };
        RuleSet::from_config(&config).unwrap()
    }

    fn scenario_rules() -> RuleSet {
        let mut config = RulesConfig {
            conversion_rate: "0.5".to_string(),
            ..RulesConfig::default()
        };
        config.document_types.invoice_debit = vec!["FE".to_string()];
        config.document_types.credit_notes = vec!["NP".to_string()];
        RuleSet::from_config(&config).unwrap()
    }

    #[test]
    fn tag_precedence_covers_every_flag_combination() {
        for bits in 0u8..16 {
            let flags = TrxFlags {
                has_old_open_invoice: bits & 1 != 0,
                has_invoice_1y: bits & 2 != 0,
                has_invoice_2y: bits & 4 != 0,
                has_purchase_order_2y: bits & 8 != 0,
            };
            let expected = if flags.has_old_open_invoice {
                TrxSourceTag::InvoiceOpen
            } else if flags.has_invoice_1y {
                TrxSourceTag::Invoice1Y
            } else if flags.has_invoice_2y {
                TrxSourceTag::Invoice2Y
            } else if flags.has_purchase_order_2y {
                TrxSourceTag::PurchaseOrder2Y
            } else {
                TrxSourceTag::NoTransactions
            };
            assert_eq!(TrxSourceTag::classify(flags), expected, "flags {:04b}", bits);
        }
    }

    #[test]
    fn tag_labels_are_fixed() {
        let labels: Vec<_> = TrxSourceTag::PRECEDENCE.iter().map(|t| t.label()).collect();
        assert_eq!(labels, vec!["INV_OP", "INV_1Y", "INV_2Y", "POH_OP"]);
        assert_eq!(TrxSourceTag::NoTransactions.label(), "NO_TRX_AT_ALL");
        assert!(TrxSourceTag::NoTransactions.flag_column().is_none());
    }

    #[test]
    fn one_year_amount_nets_credit_notes_after_scaling() {
        let rules = scenario_rules();
        let docs = vec![
            Document::new("FE", dec("100"), dec("0"), date(2025, 3, 1)),
            Document::new("NP", dec("20"), dec("0"), date(2025, 4, 1)),
        ];
        let summary = ActivitySummary::evaluate(&docs, &rules, as_of());
        assert_eq!(summary.trx_1y_amount, dec("40"));
        assert_eq!(summary.trx_1y_count, 2);
        assert_eq!(summary.trx_2y_amount, dec("0"));
    }

    #[test]
    fn year_two_window_excludes_trailing_year() {
        let rules = scenario_rules();
        let docs = vec![
            Document::new("FE", dec("10"), dec("0"), date(2024, 6, 30)),
            Document::new("FE", dec("30"), dec("0"), date(2024, 1, 15)),
            Document::new("FE", dec("99"), dec("0"), date(2022, 1, 15)),
        ];
        let summary = ActivitySummary::evaluate(&docs, &rules, as_of());
        // 2024-06-30 is exactly one year back and belongs to the trailing year
        assert_eq!(summary.trx_1y_amount, dec("5"));
        assert_eq!(summary.trx_2y_amount, dec("15"));
        assert_eq!(summary.trx_2y_count, 1);
        assert_eq!(summary.min_trx_date, Some(date(2022, 1, 15)));
        assert_eq!(summary.max_trx_date, Some(date(2024, 6, 30)));
    }

    #[test]
    fn open_balance_is_signed_and_order_independent() {
        let rules = rules_with_rate("0.000210699");
        let docs = vec![
            Document::new("FE", dec("1000"), dec("1000000"), date(2020, 1, 1)),
            Document::new("NP", dec("50"), dec("250000"), date(2021, 2, 1)),
            Document::new("C2", dec("1"), dec("123456.78"), date(2025, 1, 1)),
            Document::new("M2", dec("1"), dec("0.01"), date(2024, 12, 1)),
            Document::new("FD", dec("1"), dec("-5"), date(2024, 12, 1)),
        ];
        let rate = rules.conversion_rate();
        let expected = (dec("1000000") + dec("123456.78")) * rate - (dec("250000") + dec("0.01")) * rate;

        let forward = ActivitySummary::evaluate(&docs, &rules, as_of());
        let mut reversed = docs.clone();
        reversed.reverse();
        let backward = ActivitySummary::evaluate(&reversed, &rules, as_of());

        assert_eq!(forward.open_balance, expected);
        assert_eq!(backward.open_balance, forward.open_balance);
        // negative balances are not open
        assert_eq!(forward.open_count, 4);
    }

    #[test]
    fn counts_are_never_scaled() {
        let rules = rules_with_rate("0.000210699");
        let docs = vec![
            Document::new("FE", dec("100"), dec("100"), date(2025, 5, 1)),
            Document::new("FE", dec("100"), dec("100"), date(2025, 5, 2)),
        ];
        let summary = ActivitySummary::evaluate(&docs, &rules, as_of());
        assert_eq!(summary.trx_1y_count, 2);
        assert_eq!(summary.open_count, 2);
    }

    #[test]
    fn cancelled_documents_are_ignored() {
        let rules = scenario_rules();
        let mut cancelled = Document::new("FE", dec("100"), dec("100"), date(2025, 5, 1));
        cancelled.cancelled = true;
        let summary = ActivitySummary::evaluate(&[cancelled], &rules, as_of());
        assert_eq!(summary.trx_1y_count, 0);
        assert_eq!(summary.source_tag(), TrxSourceTag::NoTransactions);
        assert!(!summary.is_eligible());
    }

    #[test]
    fn single_recent_document_does_not_meet_priority_three() {
        let rules = rules_with_rate("1");
        let docs = vec![Document::new("FE", dec("100"), dec("0"), date(2025, 1, 10))];
        let summary = ActivitySummary::evaluate(&docs, &rules, as_of());
        assert_eq!(summary.open_balance, dec("0"));
        assert!(!summary.activity.has_recent_po);
        assert_eq!(summary.activity.doc_count_2y, 1);
        assert!(!summary.is_eligible());

        let docs = vec![
            Document::new("FE", dec("100"), dec("0"), date(2025, 1, 10)),
            Document::new("FE", dec("100"), dec("0"), date(2024, 1, 10)),
        ];
        let summary = ActivitySummary::evaluate(&docs, &rules, as_of());
        assert_eq!(
            summary.activity.satisfied_priority(),
            Some(Priority::QualifyingRecentDocs)
        );
        assert!(summary.is_eligible());
    }

    #[test]
    fn excluded_document_vetoes_all_priorities() {
        let activity = VendorActivity {
            open_balance: dec("10"),
            has_recent_po: true,
            doc_count_2y: 5,
            has_qualifying_recent_doc: true,
            has_excluded_doc: true,
        };
        for priority in Priority::ALL {
            assert!(priority.holds(&activity));
        }
        assert!(!activity.is_eligible());

        let rules = rules_with_rate("1");
        let docs = vec![
            Document::new("OC", dec("100"), dec("100"), date(2025, 1, 10)),
            Document::new("EC", dec("1"), dec("0"), date(2019, 1, 10)),
        ];
        let summary = ActivitySummary::evaluate(&docs, &rules, as_of());
        assert!(summary.activity.has_recent_po);
        assert!(!summary.is_eligible());
    }

    #[test]
    fn purchase_order_metrics_only_count_open_documents() {
        let rules = rules_with_rate("1");
        let docs = vec![
            Document::new("OC", dec("1"), dec("5"), date(2025, 2, 1)),
            Document::new("OS", dec("1"), dec("5"), date(2024, 2, 1)),
            Document::new("OC", dec("1"), dec("0"), date(2025, 3, 1)),
            Document::new("OC", dec("1"), dec("5"), date(2018, 3, 1)),
            Document::new("CX", dec("1"), dec("5"), date(2018, 3, 1)),
            Document::new("CX", dec("1"), dec("0"), date(2018, 3, 1)),
        ];
        let summary = ActivitySummary::evaluate(&docs, &rules, as_of());
        assert_eq!(summary.po_1y_open_count, 1);
        assert_eq!(summary.po_2y_open_count, 2);
        assert_eq!(summary.po_open_count, 3);
        assert_eq!(summary.min_po_date, Some(date(2018, 3, 1)));
        assert_eq!(summary.max_po_date, Some(date(2025, 2, 1)));
        assert_eq!(summary.agreement_count, 1);
        assert_eq!(summary.source_tag(), TrxSourceTag::PurchaseOrder2Y);
    }

    #[test]
    fn old_open_invoice_takes_precedence() {
        let rules = rules_with_rate("1");
        let docs = vec![
            Document::new("FE", dec("100"), dec("40"), date(2020, 1, 1)),
            Document::new("FE", dec("100"), dec("0"), date(2025, 5, 1)),
        ];
        let summary = ActivitySummary::evaluate(&docs, &rules, as_of());
        assert!(summary.flags.has_invoice_1y);
        assert_eq!(summary.source_tag(), TrxSourceTag::InvoiceOpen);
        assert_eq!(
            summary.activity.satisfied_priority(),
            Some(Priority::PositiveOpenBalance)
        );
    }
}
