use super::Report;
use crate::db::{supplier_site_query, ReportQuery};
use crate::rules::{CodeCategory, RuleSet};
use std::num::NonZeroU32;

/// One row per vendor location with site-level metrics and payment usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupplierSiteReport;

const REQUIRED: &[CodeCategory] = &[
    CodeCategory::InvoiceDebit,
    CodeCategory::BalancePositive,
    CodeCategory::PurchaseOrders,
    CodeCategory::QualifyingRecent,
    CodeCategory::ValidOrigins,
];

impl Report for SupplierSiteReport {
    fn name(&self) -> &str {
        "supplier_site"
    }

    fn required_categories(&self) -> &[CodeCategory] {
        REQUIRED
    }

    fn build_query(&self, rules: &RuleSet, limit: Option<NonZeroU32>) -> ReportQuery {
        supplier_site_query(rules, limit)
    }
}
