//! SQL pieces shared by the supplier queries.
//!
//! A [`Scope`] renders the correlation predicate restricting `DocCab <alias>`
//! to the documents of the current vendor (header) or site (site report).

use super::query::SqlContext;
use crate::rules::{CodeCategory, Priority, TrxSourceTag};

pub(crate) type Scope<'s> = &'s dyn Fn(&str) -> String;

/// `w`: conversion rate and the window boundaries, evaluated once.
pub(crate) fn windows_cte(ctx: &mut SqlContext) -> String {
    format!(
        "w AS (
    SELECT {rate}::numeric AS chf_rate,
           LOCALTIMESTAMP - INTERVAL '1 year' AS since_1y,
           LOCALTIMESTAMP - INTERVAL '2 years' AS since_2y
)",
        rate = ctx.rate()
    )
}

/// Invoice/debit amounts minus credit notes, scaled, for documents matching `window`.
fn signed_amount_sum(ctx: &mut SqlContext, window: &str) -> String {
    let invoice = ctx.codes(CodeCategory::InvoiceDebit);
    let credit = ctx.codes(CodeCategory::CreditNotes);
    format!(
        "COALESCE(SUM(CASE
            WHEN {window} THEN
                CASE
                    WHEN dc.DocTipCod = ANY({invoice}) THEN dc.DocMto * w.chf_rate
                    WHEN dc.DocTipCod = ANY({credit}) THEN -dc.DocMto * w.chf_rate
                    ELSE 0
                END
            ELSE 0
        END), 0)"
    )
}

fn signed_balance_sum(ctx: &mut SqlContext) -> String {
    let positive = ctx.codes(CodeCategory::BalancePositive);
    let negative = ctx.codes(CodeCategory::BalanceNegative);
    format!(
        "COALESCE(SUM(CASE
            WHEN dc.DocSld > 0 THEN
                CASE
                    WHEN dc.DocTipCod = ANY({positive}) THEN dc.DocSld * w.chf_rate
                    WHEN dc.DocTipCod = ANY({negative}) THEN -dc.DocSld * w.chf_rate
                    ELSE 0
                END
            ELSE 0
        END), 0)"
    )
}

/// Lateral `m`: windowed amounts, counts and date range of transactional
/// documents. `m.trx_op_bal_chf` doubles as the open balance of priority 1.
pub(crate) fn trx_metrics(ctx: &mut SqlContext, scope: Scope) -> String {
    let amount_1y = signed_amount_sum(ctx, "dc.DocFecCre >= w.since_1y");
    let amount_2y = signed_amount_sum(ctx, "dc.DocFecCre >= w.since_2y AND dc.DocFecCre < w.since_1y");
    let balance = signed_balance_sum(ctx);
    let all = ctx.codes(CodeCategory::AllTransactional);
    format!(
        "CROSS JOIN LATERAL (
    SELECT
        {amount_1y} AS trx_1y_amount_chf,
        {amount_2y} AS trx_2y_amount_chf,
        {balance} AS trx_op_bal_chf,
        COUNT(*) FILTER (WHERE dc.DocFecCre >= w.since_1y) AS trx_1y_count,
        COUNT(*) FILTER (WHERE dc.DocFecCre >= w.since_2y AND dc.DocFecCre < w.since_1y) AS trx_2y_count,
        COUNT(*) FILTER (WHERE dc.DocSld > 0 AND dc.DocTipCod = ANY({all})) AS trx_op_count,
        MIN(dc.DocFecCre) AS min_trx_date,
        MAX(dc.DocFecCre) AS max_trx_date,
        CAST(EXTRACT(YEAR FROM MIN(dc.DocFecCre)) AS INTEGER) AS min_trx_year,
        CAST(EXTRACT(YEAR FROM MAX(dc.DocFecCre)) AS INTEGER) AS max_trx_year
    FROM DocCab dc
    WHERE {scope}
      AND dc.DocTipCod = ANY({all})
      AND dc.DocEst <> '0'
) m",
        scope = scope("dc")
    )
}

/// Lateral `po`: open purchase orders and agreements.
pub(crate) fn po_metrics(ctx: &mut SqlContext, scope: Scope) -> String {
    let po = ctx.codes(CodeCategory::PurchaseOrders);
    let agreements = ctx.codes(CodeCategory::Agreements);
    let open_po = format!("dc.DocTipCod = ANY({po}) AND dc.DocSld > 0");
    format!(
        "CROSS JOIN LATERAL (
    SELECT
        COUNT(*) FILTER (WHERE {open_po} AND dc.DocFecCre >= w.since_1y) AS po_1y_op_count,
        COUNT(*) FILTER (WHERE {open_po} AND dc.DocFecCre >= w.since_2y) AS po_2y_op_count,
        COUNT(*) FILTER (WHERE {open_po}) AS po_op_count,
        MIN(dc.DocFecCre) FILTER (WHERE {open_po}) AS min_po_date,
        MAX(dc.DocFecCre) FILTER (WHERE {open_po}) AS max_po_date,
        COUNT(*) FILTER (WHERE dc.DocSld > 0 AND dc.DocTipCod = ANY({agreements})) AS po_agreement_count
    FROM DocCab dc
    WHERE {scope}
      AND dc.DocEst <> '0'
) po",
        scope = scope("dc")
    )
}

fn flag_condition(ctx: &mut SqlContext, tag: TrxSourceTag) -> Option<String> {
    let condition = match tag {
        TrxSourceTag::InvoiceOpen => format!(
            "d.DocTipCod = ANY({}) AND d.DocSld > 0 AND d.DocFecCre < w.since_2y",
            ctx.codes(CodeCategory::InvoiceDebit)
        ),
        TrxSourceTag::Invoice1Y => format!(
            "d.DocTipCod = ANY({}) AND d.DocFecCre >= w.since_1y",
            ctx.codes(CodeCategory::InvoiceDebit)
        ),
        TrxSourceTag::Invoice2Y => format!(
            "d.DocTipCod = ANY({}) AND d.DocFecCre >= w.since_2y",
            ctx.codes(CodeCategory::InvoiceDebit)
        ),
        TrxSourceTag::PurchaseOrder2Y => format!(
            "d.DocTipCod = ANY({}) AND d.DocFecCre >= w.since_2y",
            ctx.codes(CodeCategory::PurchaseOrders)
        ),
        TrxSourceTag::NoTransactions => return None,
    };
    Some(condition)
}

/// Lateral `f`: one boolean column per flag-driven tag.
pub(crate) fn trx_flags(ctx: &mut SqlContext, scope: Scope) -> String {
    let mut columns = Vec::new();
    for tag in TrxSourceTag::PRECEDENCE {
        if let (Some(column), Some(condition)) = (tag.flag_column(), flag_condition(ctx, tag)) {
            columns.push(format!(
                "        EXISTS (
            SELECT 1 FROM DocCab d
            WHERE {scope} AND d.DocEst <> '0' AND {condition}
        ) AS {column}",
                scope = scope("d")
            ));
        }
    }
    format!("CROSS JOIN LATERAL (\n    SELECT\n{}\n) f", columns.join(",\n"))
}

/// `CASE` over the flags of `f`, in tag precedence order.
pub(crate) fn source_tag_case() -> String {
    let mut arms = String::from("CASE");
    for tag in TrxSourceTag::PRECEDENCE {
        if let Some(column) = tag.flag_column() {
            arms.push_str(&format!("\n        WHEN f.{} THEN '{}'", column, tag.label()));
        }
    }
    arms.push_str(&format!(
        "\n        ELSE '{}'\n    END",
        TrxSourceTag::NoTransactions.label()
    ));
    arms
}

/// Lateral `trans`: invoice/debit documents created within 2 years.
pub(crate) fn doc_count_2y(ctx: &mut SqlContext, scope: Scope) -> String {
    format!(
        "CROSS JOIN LATERAL (
    SELECT COUNT(*) AS doc_count_2y
    FROM DocCab d
    WHERE {scope}
      AND d.DocTipCod = ANY({invoice})
      AND d.DocEst <> '0'
      AND d.DocFecCre >= w.since_2y
) trans",
        scope = scope("d"),
        invoice = ctx.codes(CodeCategory::InvoiceDebit)
    )
}

fn priority_predicate(ctx: &mut SqlContext, priority: Priority, scope: Scope) -> String {
    match priority {
        Priority::PositiveOpenBalance => "m.trx_op_bal_chf > 0".to_string(),
        Priority::RecentPurchaseOrder => format!(
            "EXISTS (
            SELECT 1 FROM DocCab oc
            WHERE {scope}
              AND oc.DocFecCre >= w.since_2y
              AND oc.DocTipCod = ANY({po})
              AND oc.DocEst <> '0'
        )",
            scope = scope("oc"),
            po = ctx.codes(CodeCategory::PurchaseOrders)
        ),
        Priority::QualifyingRecentDocs => format!(
            "(trans.doc_count_2y > 1 AND EXISTS (
            SELECT 1 FROM DocCab qd
            WHERE {scope}
              AND qd.DocFecCre >= w.since_2y
              AND qd.DocTipCod = ANY({qualifying})
              AND qd.DocEst <> '0'
        ))",
            scope = scope("qd"),
            qualifying = ctx.codes(CodeCategory::QualifyingRecent)
        ),
    }
}

/// Priorities OR-ed, followed by the excluded-document veto.
///
/// Needs `m` and `trans` in scope.
pub(crate) fn eligibility_clause(
    ctx: &mut SqlContext,
    doc_scope: Scope,
    exclusion_scope: Scope,
) -> String {
    let predicates: Vec<String> = Priority::ALL
        .into_iter()
        .map(|p| format!("/* {} */\n        {}", p.label(), priority_predicate(ctx, p, doc_scope)))
        .collect();
    format!(
        "AND (\n        {}\n  )\n  AND NOT EXISTS (
        SELECT 1 FROM DocCab x
        WHERE {scope}
          AND x.DocEst <> '0'
          AND x.DocTipCod = ANY({excluded})
  )",
        predicates.join("\n     OR "),
        scope = exclusion_scope("x"),
        excluded = ctx.codes(CodeCategory::Excluded)
    )
}

/// Vendor-level filters common to both reports. Starts with `WHERE`.
pub(crate) fn vendor_filter(ctx: &mut SqlContext) -> String {
    format!(
        "WHERE ct.OriCod = ANY({origins})
  AND ct.CiaEst = '1'
  AND b.IndGrp = '6'
  AND b.IndCod = '2'
  AND ct.CiaCod <> ALL({excluded})
  AND ct.CiaIdeNum NOT LIKE 'F%'",
        origins = ctx.codes(CodeCategory::ValidOrigins),
        excluded = ctx.codes(CodeCategory::ExcludedVendors)
    )
}

/// Contact channel types of `TelTab`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Contact {
    Phone,
    Email,
    Url,
}

impl Contact {
    fn type_code(self) -> u8 {
        match self {
            Contact::Phone => 1,
            Contact::Email => 3,
            Contact::Url => 4,
        }
    }

    fn alias(self) -> &'static str {
        match self {
            Contact::Phone => "phone",
            Contact::Email => "email",
            Contact::Url => "url",
        }
    }
}

/// First active contact of the kind at location `lt`, lowest `TelCod` first.
pub(crate) fn contact(kind: Contact) -> String {
    format!(
        "LEFT JOIN LATERAL (
    SELECT t.TelNum
    FROM TelTab t
    WHERE t.CiaCod = lt.CiaCod
      AND t.OriCod = ot.OriCod
      AND t.TelEst = '1'
      AND t.LocCod = lt.LocCod
      AND t.TelTipCod = {code}
    ORDER BY t.TelCod ASC
    LIMIT 1
) {alias} ON TRUE",
        code = kind.type_code(),
        alias = kind.alias()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_case_follows_precedence() {
        let case = source_tag_case();
        let positions: Vec<usize> = ["INV_OP", "INV_1Y", "INV_2Y", "POH_OP", "NO_TRX_AT_ALL"]
            .iter()
            .map(|label| case.find(label).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(case.contains("WHEN f.has_inv_op_old THEN 'INV_OP'"));
    }

    #[test]
    fn contact_picks_lowest_active_entry() {
        let sql = contact(Contact::Email);
        assert!(sql.contains("t.TelTipCod = 3"));
        assert!(sql.contains("ORDER BY t.TelCod ASC"));
        assert!(sql.ends_with(") email ON TRUE"));
    }
}
