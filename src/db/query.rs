use crate::rules::{CodeCategory, RuleSet};
use bigdecimal::BigDecimal;
use std::num::NonZeroU32;

/// Value bound to a `$n` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// Bound as `TEXT[]`, matched with `= ANY($n)` / `<> ALL($n)`.
    Codes(Vec<String>),
    Decimal(BigDecimal),
    Int(i64),
}

/// SQL text plus its bound parameters; `$n` refers to `params[n - 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportQuery {
    sql: String,
    params: Vec<QueryParam>,
}

impl ReportQuery {
    pub fn new(sql: impl Into<String>, params: Vec<QueryParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Query without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }
}

/// Assigns placeholders; an equal value is bound once and its placeholder
/// handed out again.
#[derive(Debug, Default)]
pub(crate) struct ParamBinder {
    params: Vec<QueryParam>,
}

impl ParamBinder {
    pub(crate) fn bind(&mut self, param: QueryParam) -> String {
        let index = match self.params.iter().position(|p| *p == param) {
            Some(pos) => pos,
            None => {
                self.params.push(param);
                self.params.len() - 1
            }
        };
        format!("${}", index + 1)
    }

    pub(crate) fn finish(self, sql: String) -> ReportQuery {
        ReportQuery::new(sql, self.params)
    }
}

/// Builder state shared by the SQL fragments of one report query.
pub(crate) struct SqlContext<'a> {
    rules: &'a RuleSet,
    binder: ParamBinder,
}

impl<'a> SqlContext<'a> {
    pub(crate) fn new(rules: &'a RuleSet) -> Self {
        Self {
            rules,
            binder: ParamBinder::default(),
        }
    }

    /// Placeholder of a code set, e.g. `$3`.
    pub(crate) fn codes(&mut self, category: CodeCategory) -> String {
        let codes = self.rules.codes(category).to_vec();
        self.binder.bind(QueryParam::Codes(codes))
    }

    pub(crate) fn rate(&mut self) -> String {
        self.binder
            .bind(QueryParam::Decimal(self.rules.conversion_rate().clone()))
    }

    /// Server-side row cap; empty without a limit.
    pub(crate) fn limit_clause(&mut self, limit: Option<NonZeroU32>) -> String {
        match limit {
            Some(n) => format!("LIMIT {}", self.binder.bind(QueryParam::Int(i64::from(n.get())))),
            None => String::new(),
        }
    }

    pub(crate) fn finish(self, sql: String) -> ReportQuery {
        self.binder.finish(sql)
    }
}
