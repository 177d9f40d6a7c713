use super::fragments::{self, Contact};
use super::query::{ReportQuery, SqlContext};
use crate::rules::RuleSet;
use std::num::NonZeroU32;

fn site_docs(alias: &str) -> String {
    format!(
        "{a}.CiaCod = lt.CiaCod AND {a}.OriCod = lt.OriCod AND {a}.LocCod = lt.LocCod",
        a = alias
    )
}

/// All locations of the vendor: the recurring-documents count and the
/// excluded-document veto look at the vendor as a whole.
fn vendor_docs(alias: &str) -> String {
    format!("{a}.CiaCod = ct.CiaCod AND {a}.OriCod = ct.OriCod", a = alias)
}

/// One row per vendor location, with site-scoped aggregates.
pub fn supplier_site_query(rules: &RuleSet, limit: Option<NonZeroU32>) -> ReportQuery {
    let mut ctx = SqlContext::new(rules);
    let site: fragments::Scope = &site_docs;
    let vendor: fragments::Scope = &vendor_docs;

    let windows = fragments::windows_cte(&mut ctx);
    let trx_metrics = fragments::trx_metrics(&mut ctx, site);
    let po_metrics = fragments::po_metrics(&mut ctx, site);
    let flags = fragments::trx_flags(&mut ctx, site);
    let doc_count = fragments::doc_count_2y(&mut ctx, vendor);
    let filter = fragments::vendor_filter(&mut ctx);
    let eligibility = fragments::eligibility_clause(&mut ctx, site, vendor);
    let limit = ctx.limit_clause(limit);

    let sql = format!(
        r#"WITH {windows}
SELECT
    CASE
        WHEN ot.OriCod = '011' THEN 'F490101'
        ELSE ot.OriCod
    END AS "ORG_NAME (M)",
    '' AS "ORGANIZATION_ID (M)",
    '' AS "BUSINESS_GROUP_ID (M)",
    ct.CiaDes AS "VENDOR_NAME (M)",
    ct.CiaIdeNum AS "VENDOR_NUM (M)",
    ind.IndDes AS "VENDOR_SITE_CODE (M)",
    ct.CiaFehCre AS "VENDOR_CREATION_DATE (M)",
    '' AS "VENDOR_SITE_CREATION_DATE (M)",
    '' AS "ADDRESS_STYLE (M)",
    '' AS "LANGUAGE",
    pvt.PvnDes AS "PROVINCE",
    pt.PaiDes AS "COUNTRY (M)",
    '' AS "AREA_CODE",
    phone.TelNum AS "PHONE",
    email.TelNum AS "EMAIL_ADDRESS",
    '' AS "CUSTOMER_NUM",
    '' AS "VENDOR_SITE_CODE_ALT",
    lt.LocDir AS "ADDRESS_LINE1 (M)",
    '' AS "ADDRESS_LINE2",
    '' AS "ADDRESS_LINE3",
    '' AS "ADDRESS_LINES_ALT",
    dt.DstDes AS "CITY",
    dpt.DptDes AS "STATE",
    dt.DstPstCod AS "ZIP",
    '' AS "ADDRESS_LINE4",
    '' AS "VAT_REGISTRATION_NUM",
    '' AS "VAT_CODE",
    ot.PaiCod AS "DEFAULT_REP_COUNTRY_CODE",
    ct.CiaIdeNum AS "DEFAULT_REP_REG_NUMBER",
    '' AS "DEFAULT_REP_TAX_REG_TYPE",
    '' AS "PARTY_SITE_ID (M)",
    '' AS "PARTY_ID (M)",
    ct.CiaCod AS "VENDOR_ID (M)",
    CONCAT(RTRIM(lt.CiaCod), lt.LocCod) AS "VENDOR_SITE_ID (M)",
    lt.LocCod AS "LOCATION_ID (M)",
    CONCAT(RTRIM(lt.CiaCod), lt.LocCod) AS "VENDOR_SITE_ID_2 (M)",
    '' AS "ADDRESS_NAME (M)",
    '' AS "ADDRESSEE",
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
    {tag_case} AS "SUPPLIER_TRX_SOURCE_LIST (M)",
    po.po_2y_op_count AS "PO_2Y_OP_COUNT (M)",
    po.po_1y_op_count AS "PO_1Y_OP_COUNT (M)",
    po.po_op_count AS "PO_OP_COUNT (M)",
    po.min_po_date AS "MIN_PO_DATE (M)",
    po.max_po_date AS "MAX_PO_DATE (M)",
    po.po_agreement_count AS "PO_Agreement_COUNT (M)",
    CASE
        WHEN lid.IndCod = 7 THEN 'Purchasing, Payment'
        WHEN lid.IndCod = 3 THEN 'Payment'
        ELSE NULL
    END AS "PO_Usage"
FROM CiaTab ct
CROSS JOIN w
INNER JOIN LocTab lt ON lt.CiaCod = ct.CiaCod
   AND lt.OriCod = ct.OriCod
LEFT JOIN LID lid ON lid.CiaCod = lt.CiaCod
   AND lid.LocCod = lt.LocCod
   AND lid.OriCod = lt.OriCod
LEFT JOIN IndTip ind ON ind.IndGrp = lid.IndGrp
   AND ind.IndCod = lid.IndCod
   AND ind.OriCod = lt.OriCod
   AND ind.IndGrp = 9
LEFT JOIN Cid b ON b.OriCod = ct.OriCod
   AND b.CiaCod = ct.CiaCod
LEFT JOIN IdeTip c ON c.OriCod = ct.OriCod
   AND c.IdeTipCod = ct.IdeTipCod
LEFT JOIN OriTab ot ON ot.OriCod = lt.OriCod
LEFT JOIN CiaPar cp ON cp.CiaCod = lt.CiaCod
   AND cp.ParCod = '7941'
LEFT JOIN PaiTab pt ON pt.PaiCod = lt.PaiCod
LEFT JOIN DstTab dt ON dt.DstCod = lt.DstCod
   AND dt.PaiCod = lt.PaiCod
   AND dt.DptCod = lt.DptCod
   AND dt.PvnCod = lt.PvnCod
   AND dt.OriCod = lt.OriCod
LEFT JOIN DptTab dpt ON dpt.DptCod = lt.DptCod
   AND dpt.OriCod = lt.OriCod
   AND dpt.PaiCod = lt.PaiCod
   AND dpt.DptEst = '1'
LEFT JOIN PvnTab pvt ON pvt.PvnCod = lt.PvnCod
   AND pvt.OriCod = lt.OriCod
   AND pvt.PaiCod = lt.PaiCod
   AND pvt.DptCod = dpt.DptCod
{phone}
{email}
LEFT JOIN CiaCtaTab cct ON cct.CiaCod = ct.CiaCod
   AND cct.OriCod = ct.OriCod
{trx_metrics}
{po_metrics}
{flags}
{doc_count}
{filter}
  AND (
      lt.LocEst = '1'
      OR (lt.LocEst <> '1' AND m.trx_op_bal_chf > 0)
  )
  {eligibility}
ORDER BY ct.CiaCod ASC
{limit}"#,
        tag_case = fragments::source_tag_case(),
        phone = fragments::contact(Contact::Phone),
        email = fragments::contact(Contact::Email),
    );

    ctx.finish(sql)
}
