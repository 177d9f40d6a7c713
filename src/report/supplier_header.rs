use super::Report;
use crate::db::{supplier_header_query, ReportQuery};
use crate::rules::{CodeCategory, RuleSet};
use std::num::NonZeroU32;

/// Vendor-level master data: identity, tax ids, primary address, windowed
/// transaction and purchase-order metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupplierHeaderReport;

const REQUIRED: &[CodeCategory] = &[
    CodeCategory::InvoiceDebit,
    CodeCategory::BalancePositive,
    CodeCategory::PurchaseOrders,
    CodeCategory::QualifyingRecent,
    CodeCategory::ValidOrigins,
];

impl Report for SupplierHeaderReport {
    fn name(&self) -> &str {
        "supplier_header"
    }

    fn required_categories(&self) -> &[CodeCategory] {
        REQUIRED
    }

    fn build_query(&self, rules: &RuleSet, limit: Option<NonZeroU32>) -> ReportQuery {
        supplier_header_query(rules, limit)
    }
}
