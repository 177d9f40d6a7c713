use super::fragments::{self, Contact};
use super::query::{ReportQuery, SqlContext};
use crate::rules::{CodeCategory, RuleSet};
use std::num::NonZeroU32;

/// Documents of vendor `ct` at one of its valid locations.
fn vendor_docs(alias: &str) -> String {
    format!(
        "{a}.CiaCod = ct.CiaCod
      AND {a}.OriCod = ct.OriCod
      AND {a}.LocCod IN (
          SELECT v.LocCod FROM valid_locs v
          WHERE v.OriCod = {a}.OriCod AND v.CiaCod = {a}.CiaCod
      )",
        a = alias
    )
}

/// One row per eligible vendor, addressed through its primary active location.
pub fn supplier_header_query(rules: &RuleSet, limit: Option<NonZeroU32>) -> ReportQuery {
    let mut ctx = SqlContext::new(rules);
    let scope: fragments::Scope = &vendor_docs;

    let windows = fragments::windows_cte(&mut ctx);
    let all = ctx.codes(CodeCategory::AllTransactional);
    let trx_metrics = fragments::trx_metrics(&mut ctx, scope);
    let po_metrics = fragments::po_metrics(&mut ctx, scope);
    let flags = fragments::trx_flags(&mut ctx, scope);
    let doc_count = fragments::doc_count_2y(&mut ctx, scope);
    let filter = fragments::vendor_filter(&mut ctx);
    let eligibility = fragments::eligibility_clause(&mut ctx, scope, scope);
    let limit = ctx.limit_clause(limit);

    let sql = format!(
        r#"WITH {windows},
valid_locs AS (
    SELECT lt.OriCod, lt.CiaCod, lt.LocCod
    FROM LocTab lt
    WHERE lt.LocEst = '1'
    UNION
    SELECT lt.OriCod, lt.CiaCod, lt.LocCod
    FROM LocTab lt
    WHERE lt.LocEst = '0'
      AND EXISTS (
          SELECT 1
          FROM DocCab dc
          WHERE dc.OriCod = lt.OriCod
            AND dc.CiaCod = lt.CiaCod
            AND dc.LocCod = lt.LocCod
            AND dc.DocSld > 0
            AND dc.DocTipCod = ANY({all})
            AND dc.DocEst <> '0'
      )
)
SELECT
    ct.CiaDes AS "VENDOR_NAME (M)",
    ct.CiaIdeNum AS "VENDOR_NUM (M)",
    ct.CiaCod AS "VENDOR_ID (M)",
    ct.CiaSig AS "VENDOR_NAME_ALT (M)",
    cp.CiaParVal AS "SIC",
    '' AS "EMPLOYEE_ID",
    '' AS "VENDOR_TYPE_LOOKUP_CODE (M)",
    '' AS "CEO_TITLE",
    CONCAT(ctt.CttNom, ctt.CttApePat) AS "CEO_NAME",
    '' AS "PRINCIPAL_TITLE",
    '' AS "PRINCIPAL_NAME",
    ct.CiaIdeNum AS "TAX_REGISTRATION_NUM (M)",
    ct.CiaIdeNum AS "TAXPAYER_ID (M)",
    email.TelNum AS "REMITTANCE_EMAIL",
    ot.PaiCod AS "DEFAULT_REP_COUNTRY_CODE",
    ct.CiaIdeNum AS "DEFAULT_REP_REG_NUMBER",
    rt.CiaParVal AS "DEFAULT_REP_TAX_REG_TYPE",
    '' AS "PARENT_PARTY_ID",
    '' AS "PARENT_VENDOR_ID",
    ct.CiaSig AS "PARTY_ALIAS",
    url.TelNum AS "URL",
    ct.CiaCod AS "PARTY_ID (M)",
    ct.CiaIdeNum AS "REGISTRY_ID (M)",
    ct.CiaDes AS "PARTY_NAME (M)",
    it.IdeTipDes AS "PARTY_TYPE (M)",
    '' AS "TAX_NAME",
    pt.PaiDes AS "COUNTRY (M)",
    lt.LocDir AS "ADDRESS1 (M)",
    '' AS "ADDRESS2",
    '' AS "ADDRESS3",
    '' AS "ADDRESS4",
    dt.DstDes AS "CITY (M)",
    dt.DstPstCod AS "POSTAL_CODE (M)",
    dpt.DptDes AS "STATE",
    pvt.PvnDes AS "PROVINCE",
    m.trx_1y_amount_chf AS "TRX_1Y_AMOUNT_CHF (M)",
    m.trx_2y_amount_chf AS "TRX_2Y_AMOUNT_CHF (M)",
    m.trx_op_bal_chf AS "TRX_OP_BAL_CHF (M)",
    m.trx_1y_count AS "TRX_1Y_COUNT (M)",
    m.trx_2y_count AS "TRX_2Y_COUNT (M)",
    m.trx_op_count AS "TRX_OP_COUNT (M)",
    m.min_trx_date AS "MIN_TRX_DATE (M)",
    m.max_trx_date AS "MAX_TRX_DATE (M)",
    m.min_trx_year AS "MIN_TRX_YEAR (M)",
    m.max_trx_year AS "MAX_TRX_YEAR (M)",
    ct.CiaFehCre AS "VENDOR_CREATION_DATE (M)",
    {tag_case} AS "SUPPLIER_TRX_SOURCE_LIST (M)",
    po.po_1y_op_count AS "PO_1Y_OP_COUNT (M)",
    po.po_2y_op_count AS "PO_2Y_OP_COUNT (M)",
    po.po_op_count AS "PO_OP_COUNT (M)",
    po.min_po_date AS "MIN_PO_DATE (M)",
    po.max_po_date AS "MAX_PO_DATE (M)",
    po.po_agreement_count AS "PO_Agreement_COUNT (M)"
FROM CiaTab ct
CROSS JOIN w
LEFT JOIN Cid b ON b.OriCod = ct.OriCod
   AND b.CiaCod = ct.CiaCod
LEFT JOIN IdeTip c ON c.OriCod = ct.OriCod
   AND c.IdeTipCod = ct.IdeTipCod
LEFT JOIN OriTab ot ON ot.OriCod = ct.OriCod
LEFT JOIN CiaPar cp ON cp.CiaCod = ct.CiaCod
   AND cp.ParCod = '7941'
CROSS JOIN LATERAL (
    SELECT l.*
    FROM LocTab l
    WHERE l.CiaCod = ct.CiaCod
      AND l.OriCod = ct.OriCod
      AND l.LocEst = '1'
    ORDER BY l.LocCod ASC
    LIMIT 1
) lt
LEFT JOIN CiaPar rt ON rt.CiaCod = ct.CiaCod
   AND rt.OriCod = '011'
   AND rt.ParCod = '140'
LEFT JOIN PaiTab pt ON pt.PaiCod = lt.PaiCod
LEFT JOIN DstTab dt ON dt.DstCod = lt.DstCod
   AND dt.PaiCod = pt.PaiCod
   AND dt.DptCod = lt.DptCod
   AND dt.PvnCod = lt.PvnCod
   AND dt.OriCod = ot.OriCod
LEFT JOIN DptTab dpt ON dpt.DptCod = lt.DptCod
   AND dpt.OriCod = ot.OriCod
   AND dpt.PaiCod = lt.PaiCod
   AND dpt.DptEst = '1'
LEFT JOIN PvnTab pvt ON pvt.PvnCod = lt.PvnCod
   AND pvt.OriCod = ot.OriCod
   AND pvt.PaiCod = lt.PaiCod
   AND pvt.DptCod = dpt.DptCod
LEFT JOIN IdeTip it ON it.IdeTipCod = ct.IdeTipCod
   AND it.OriCod = '011'
LEFT JOIN CttTab ctt ON ctt.CiaCod = ct.CiaCod
   AND ctt.LocCod = lt.LocCod
   AND ctt.CrgDes = 'Director Ejecutivo'
{email}
{url}
LEFT JOIN CiaCtaTab cct ON cct.CiaCod = ct.CiaCod
   AND cct.OriCod = ct.OriCod
{trx_metrics}
{po_metrics}
{flags}
{doc_count}
{filter}
  {eligibility}
ORDER BY ct.CiaCod ASC
{limit}"#,
        tag_case = fragments::source_tag_case(),
        email = fragments::contact(Contact::Email),
        url = fragments::contact(Contact::Url),
    );

    ctx.finish(sql)
}
