//! Business-rule configuration shared by every report.
//!
//! A [`RuleSet`] is built once from [`RulesConfig`], validated, and then only
//! read. Report builders receive it by reference.

pub mod activity;

use crate::config::RulesConfig;
use crate::error::ConfigError;
use bigdecimal::{BigDecimal, Zero};
use indexmap::IndexSet;
use std::str::FromStr;

pub use activity::{ActivitySummary, Document, Priority, TrxFlags, TrxSourceTag, VendorActivity};

/// Ordered, duplicate-free set of short codes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeSet(IndexSet<String>);

impl CodeSet {
    /// Builds a set from configured codes. Blank codes are rejected,
    /// duplicates are dropped with a warning.
    pub fn from_codes<I, S>(category: &'static str, codes: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = IndexSet::new();
        for code in codes {
            let code = code.as_ref().trim();
            if code.is_empty() {
                return Err(ConfigError::BlankCode(category));
            }
            if !set.insert(code.to_string()) {
                tracing::warn!("duplicate code `{}` in `{}` ignored", code, category);
            }
        }
        Ok(Self(set))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }

    /// Union preserving the order of `self` followed by new codes of `other`.
    pub fn union(&self, other: &CodeSet) -> CodeSet {
        CodeSet(self.0.union(&other.0).cloned().collect())
    }

    fn first_common<'a>(&'a self, other: &'a CodeSet) -> Option<&'a str> {
        self.0.intersection(&other.0).next().map(String::as_str)
    }
}

/// Named code sets a report may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeCategory {
    InvoiceDebit,
    CreditNotes,
    BalancePositive,
    BalanceNegative,
    PurchaseOrders,
    Agreements,
    Excluded,
    QualifyingRecent,
    AllTransactional,
    ValidOrigins,
    ExcludedVendors,
}

impl CodeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            CodeCategory::InvoiceDebit => "invoice_debit",
            CodeCategory::CreditNotes => "credit_notes",
            CodeCategory::BalancePositive => "balance_positive",
            CodeCategory::BalanceNegative => "balance_negative",
            CodeCategory::PurchaseOrders => "purchase_orders",
            CodeCategory::Agreements => "agreements",
            CodeCategory::Excluded => "excluded",
            CodeCategory::QualifyingRecent => "qualifying_recent",
            CodeCategory::AllTransactional => "all_transactional",
            CodeCategory::ValidOrigins => "valid_origins",
            CodeCategory::ExcludedVendors => "excluded_vendors",
        }
    }
}

/// Document type classification.
#[derive(Debug, Clone)]
pub struct DocumentTypes {
    invoice_debit: CodeSet,
    credit_notes: CodeSet,
    balance_positive: CodeSet,
    balance_negative: CodeSet,
    purchase_orders: CodeSet,
    agreements: CodeSet,
    excluded: CodeSet,
    qualifying_recent: CodeSet,
    all_transactional: CodeSet,
}

impl DocumentTypes {
    pub fn invoice_debit(&self) -> &CodeSet {
        &self.invoice_debit
    }

    pub fn credit_notes(&self) -> &CodeSet {
        &self.credit_notes
    }

    pub fn balance_positive(&self) -> &CodeSet {
        &self.balance_positive
    }

    pub fn balance_negative(&self) -> &CodeSet {
        &self.balance_negative
    }

    pub fn purchase_orders(&self) -> &CodeSet {
        &self.purchase_orders
    }

    pub fn agreements(&self) -> &CodeSet {
        &self.agreements
    }

    pub fn excluded(&self) -> &CodeSet {
        &self.excluded
    }

    pub fn qualifying_recent(&self) -> &CodeSet {
        &self.qualifying_recent
    }

    /// `balance_positive ∪ balance_negative`.
    pub fn all_transactional(&self) -> &CodeSet {
        &self.all_transactional
    }
}

/// Immutable rule configuration.
#[derive(Debug, Clone)]
pub struct RuleSet {
    document_types: DocumentTypes,
    valid_origins: CodeSet,
    excluded_vendors: CodeSet,
    conversion_rate: BigDecimal,
}

impl RuleSet {
    pub fn from_config(config: &RulesConfig) -> Result<Self, ConfigError> {
        let raw = &config.document_types;
        let balance_positive = CodeSet::from_codes("balance_positive", &raw.balance_positive)?;
        let balance_negative = CodeSet::from_codes("balance_negative", &raw.balance_negative)?;
        let all_transactional = balance_positive.union(&balance_negative);

        let document_types = DocumentTypes {
            invoice_debit: CodeSet::from_codes("invoice_debit", &raw.invoice_debit)?,
            credit_notes: CodeSet::from_codes("credit_notes", &raw.credit_notes)?,
            balance_positive,
            balance_negative,
            purchase_orders: CodeSet::from_codes("purchase_orders", &raw.purchase_orders)?,
            agreements: CodeSet::from_codes("agreements", &raw.agreements)?,
            excluded: CodeSet::from_codes("excluded", &raw.excluded)?,
            qualifying_recent: CodeSet::from_codes("qualifying_recent", &raw.qualifying_recent)?,
            all_transactional,
        };
        check_disjoint(&document_types)?;

        Ok(Self {
            document_types,
            valid_origins: CodeSet::from_codes("valid_origins", &config.valid_origins)?,
            excluded_vendors: CodeSet::from_codes("excluded_vendors", &config.excluded_vendors)?,
            conversion_rate: parse_rate(&config.conversion_rate)?,
        })
    }

    pub fn document_types(&self) -> &DocumentTypes {
        &self.document_types
    }

    pub fn valid_origins(&self) -> &CodeSet {
        &self.valid_origins
    }

    pub fn excluded_vendors(&self) -> &CodeSet {
        &self.excluded_vendors
    }

    pub fn conversion_rate(&self) -> &BigDecimal {
        &self.conversion_rate
    }

    pub fn codes(&self, category: CodeCategory) -> &CodeSet {
        let types = &self.document_types;
        match category {
            CodeCategory::InvoiceDebit => &types.invoice_debit,
            CodeCategory::CreditNotes => &types.credit_notes,
            CodeCategory::BalancePositive => &types.balance_positive,
            CodeCategory::BalanceNegative => &types.balance_negative,
            CodeCategory::PurchaseOrders => &types.purchase_orders,
            CodeCategory::Agreements => &types.agreements,
            CodeCategory::Excluded => &types.excluded,
            CodeCategory::QualifyingRecent => &types.qualifying_recent,
            CodeCategory::AllTransactional => &types.all_transactional,
            CodeCategory::ValidOrigins => &self.valid_origins,
            CodeCategory::ExcludedVendors => &self.excluded_vendors,
        }
    }

    /// Returns the category, or fails when it is empty and `report` needs it.
    pub fn require(&self, category: CodeCategory, report: &str) -> Result<&CodeSet, ConfigError> {
        let codes = self.codes(category);
        if codes.is_empty() {
            return Err(ConfigError::EmptyCodeSet {
                category: category.as_str(),
                report: report.to_string(),
            });
        }
        Ok(codes)
    }
}

fn parse_rate(value: &str) -> Result<BigDecimal, ConfigError> {
    let rate = BigDecimal::from_str(value.trim()).map_err(|e| ConfigError::InvalidRate {
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if rate <= BigDecimal::zero() {
        return Err(ConfigError::InvalidRate {
            value: value.to_string(),
            reason: "must be positive".to_string(),
        });
    }
    Ok(rate)
}

fn check_disjoint(types: &DocumentTypes) -> Result<(), ConfigError> {
    let mut pairs: Vec<(&'static str, &CodeSet, &'static str, &CodeSet)> = vec![
        ("invoice_debit", &types.invoice_debit, "credit_notes", &types.credit_notes),
        ("balance_positive", &types.balance_positive, "balance_negative", &types.balance_negative),
    ];

    // document kinds that must never share a code
    let kinds = [
        ("all_transactional", &types.all_transactional),
        ("purchase_orders", &types.purchase_orders),
        ("agreements", &types.agreements),
        ("excluded", &types.excluded),
    ];
    for (i, &(left_name, left)) in kinds.iter().enumerate() {
        for &(right_name, right) in &kinds[i + 1..] {
            pairs.push((left_name, left, right_name, right));
        }
    }

    for (left_name, left, right_name, right) in pairs {
        if let Some(code) = left.first_common(right) {
            return Err(ConfigError::OverlappingCodes {
                code: code.to_string(),
                left: left_name,
                right: right_name,
            });
        }
    }
    Ok(())
}
