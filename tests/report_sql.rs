//! Runs the report queries against a fixture schema and checks them against
//! the in-memory rule evaluation.
//!
//! Needs a PostgreSQL instance: set `DATABASE_URL`, otherwise the tests are
//! skipped.

use bigdecimal::BigDecimal;
use chrono::{Days, Local, NaiveDate};
use futures::TryStreamExt;
use std::collections::BTreeSet;
use std::num::NonZeroU32;
use vendor_export::config::{DatabaseConfig, RulesConfig};
use vendor_export::db::{supplier_header_query, supplier_site_query, ReportQuery};
use vendor_export::models::{CellValue, ResultBatch};
use vendor_export::rules::{ActivitySummary, Document};
use vendor_export::{Database, RuleSet};

struct FixtureDoc {
    doc_type: &'static str,
    amount: i64,
    balance: i64,
    age_days: u64,
}

struct FixtureVendor {
    id: &'static str,
    docs: Vec<FixtureDoc>,
}

fn doc(doc_type: &'static str, amount: i64, balance: i64, age_days: u64) -> FixtureDoc {
    FixtureDoc {
        doc_type,
        amount,
        balance,
        age_days,
    }
}

fn vendors() -> Vec<FixtureVendor> {
    vec![
        // invoice and credit note in the trailing year, both open
        FixtureVendor {
            id: "1000000001",
            docs: vec![doc("FE", 100, 100, 30), doc("NP", 20, 20, 60)],
        },
        // one settled invoice: no balance, no PO, not recurring
        FixtureVendor {
            id: "1000000002",
            docs: vec![doc("FE", 100, 0, 200)],
        },
        // open invoice vetoed by an excluded document
        FixtureVendor {
            id: "1000000003",
            docs: vec![doc("FE", 100, 100, 30), doc("EC", 10, 0, 30)],
        },
        // purchase order only
        FixtureVendor {
            id: "1000000004",
            docs: vec![doc("OC", 500, 500, 100)],
        },
        // two settled invoices in the second year
        FixtureVendor {
            id: "1000000005",
            docs: vec![doc("FE", 100, 0, 500), doc("FE", 50, 0, 420)],
        },
    ]
}

fn rules() -> RuleSet {
    let config = RulesConfig {
        conversion_rate: "0.5".to_string(),
        ..RulesConfig::default()
    };
    RuleSet::from_config(&config).unwrap()
}

fn database_url() -> Option<String> {
    let url = std::env::var("DATABASE_URL").ok()?;
    if url.contains("sslmode=") {
        return Some(url);
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    Some(format!("{}{}sslmode=prefer", url, separator))
}

const TABLES: &[&str] = &[
    "CREATE TABLE CiaTab (CiaCod VARCHAR(15), OriCod VARCHAR(10), CiaDes VARCHAR(100), \
     CiaIdeNum VARCHAR(20), CiaSig VARCHAR(50), CiaEst CHAR(1), IdeTipCod VARCHAR(5), CiaFehCre TIMESTAMP)",
    "CREATE TABLE Cid (OriCod VARCHAR(10), CiaCod VARCHAR(15), IndGrp VARCHAR(5), IndCod VARCHAR(5))",
    "CREATE TABLE IdeTip (OriCod VARCHAR(10), IdeTipCod VARCHAR(5), IdeTipDes VARCHAR(50))",
    "CREATE TABLE OriTab (OriCod VARCHAR(10), PaiCod VARCHAR(5))",
    "CREATE TABLE CiaPar (CiaCod VARCHAR(15), OriCod VARCHAR(10), ParCod VARCHAR(10), CiaParVal VARCHAR(50))",
    "CREATE TABLE LocTab (OriCod VARCHAR(10), CiaCod VARCHAR(15), LocCod VARCHAR(5), LocEst CHAR(1), \
     LocDir VARCHAR(100), PaiCod VARCHAR(5), DstCod VARCHAR(5), DptCod VARCHAR(5), PvnCod VARCHAR(5))",
    "CREATE TABLE PaiTab (PaiCod VARCHAR(5), PaiDes VARCHAR(50))",
    "CREATE TABLE DstTab (OriCod VARCHAR(10), PaiCod VARCHAR(5), DptCod VARCHAR(5), PvnCod VARCHAR(5), \
     DstCod VARCHAR(5), DstDes VARCHAR(50), DstPstCod VARCHAR(10))",
    "CREATE TABLE DptTab (OriCod VARCHAR(10), PaiCod VARCHAR(5), DptCod VARCHAR(5), DptDes VARCHAR(50), DptEst CHAR(1))",
    "CREATE TABLE PvnTab (OriCod VARCHAR(10), PaiCod VARCHAR(5), DptCod VARCHAR(5), PvnCod VARCHAR(5), PvnDes VARCHAR(50))",
    "CREATE TABLE CttTab (CiaCod VARCHAR(15), LocCod VARCHAR(5), CrgDes VARCHAR(50), CttNom VARCHAR(50), CttApePat VARCHAR(50))",
    "CREATE TABLE TelTab (CiaCod VARCHAR(15), OriCod VARCHAR(10), LocCod VARCHAR(5), TelCod INTEGER, \
     TelTipCod INTEGER, TelNum VARCHAR(100), TelEst CHAR(1))",
    "CREATE TABLE CiaCtaTab (CiaCod VARCHAR(15), OriCod VARCHAR(10))",
    "CREATE TABLE DocCab (OriCod VARCHAR(10), CiaCod VARCHAR(15), LocCod VARCHAR(5), DocTipCod VARCHAR(5), \
     DocMto NUMERIC(18, 2), DocSld NUMERIC(18, 2), DocFecCre TIMESTAMP, DocEst CHAR(1))",
    "CREATE TABLE LID (OriCod VARCHAR(10), CiaCod VARCHAR(15), LocCod VARCHAR(5), IndGrp INTEGER, IndCod INTEGER)",
    "CREATE TABLE IndTip (OriCod VARCHAR(10), IndGrp INTEGER, IndCod INTEGER, IndDes VARCHAR(50))",
];

fn fixture_rows(vendors: &[FixtureVendor]) -> Vec<String> {
    let mut statements = vec![
        "INSERT INTO OriTab VALUES ('011', 'PE')".to_string(),
        "INSERT INTO TelTab VALUES ('1000000001', '011', '001', 1, 3, 'ap@vendor1.example', '1')".to_string(),
        "INSERT INTO TelTab VALUES ('1000000001', '011', '001', 2, 3, 'old@vendor1.example', '1')".to_string(),
        "INSERT INTO LID VALUES ('011', '1000000004', '001', 9, 7)".to_string(),
    ];
    for (n, vendor) in vendors.iter().enumerate() {
        statements.push(format!(
            "INSERT INTO CiaTab VALUES ('{id}', '011', 'Vendor {n}', '2010000000{n}', 'V{n}', '1', '6', LOCALTIMESTAMP)",
            id = vendor.id
        ));
        statements.push(format!(
            "INSERT INTO Cid VALUES ('011', '{}', '6', '2')",
            vendor.id
        ));
        statements.push(format!(
            "INSERT INTO LocTab VALUES ('011', '{}', '001', '1', 'Av. Principal {}', 'PE', '01', '15', '01')",
            vendor.id, n
        ));
        for doc in &vendor.docs {
            statements.push(format!(
                "INSERT INTO DocCab VALUES ('011', '{}', '001', '{}', {}, {}, \
                 LOCALTIMESTAMP - INTERVAL '{} days', '1')",
                vendor.id, doc.doc_type, doc.amount, doc.balance, doc.age_days
            ));
        }
    }
    statements
}

/// Connected session with the fixture loaded into its own schema.
async fn fixture(tag: &str) -> Option<(Database, String)> {
    let Some(url) = database_url() else {
        eprintln!("DATABASE_URL not set; skipping");
        return None;
    };
    let mut db = Database::new(DatabaseConfig {
        url: Some(url),
        ..DatabaseConfig::default()
    });
    db.connect().await.unwrap();

    let schema = format!("vendor_export_it_{}_{}", tag, std::process::id());
    let mut statements = vec![
        format!("DROP SCHEMA IF EXISTS {} CASCADE", schema),
        format!("CREATE SCHEMA {}", schema),
        format!("SET search_path TO {}", schema),
    ];
    statements.extend(TABLES.iter().map(|t| t.to_string()));
    statements.extend(fixture_rows(&vendors()));
    for statement in statements {
        db.execute(&ReportQuery::raw(statement)).await.unwrap();
    }
    Some((db, schema))
}

async fn teardown(mut db: Database, schema: &str) {
    db.execute(&ReportQuery::raw(format!("DROP SCHEMA {} CASCADE", schema)))
        .await
        .unwrap();
    db.close().await;
}

fn column(batch: &ResultBatch, label: &str) -> Vec<CellValue> {
    let index = batch
        .column_index(label)
        .unwrap_or_else(|| panic!("missing column {}", label));
    batch.rows.iter().map(|row| row[index].clone()).collect()
}

fn text(value: &CellValue) -> String {
    value.render()
}

fn decimal(value: &CellValue) -> BigDecimal {
    match value {
        CellValue::Decimal(d) => d.clone(),
        other => panic!("expected a decimal, got {:?}", other),
    }
}

fn evaluate(vendor: &FixtureVendor, rules: &RuleSet, today: NaiveDate) -> ActivitySummary {
    let docs: Vec<Document> = vendor
        .docs
        .iter()
        .map(|d| {
            Document::new(
                d.doc_type,
                BigDecimal::from(d.amount),
                BigDecimal::from(d.balance),
                today.checked_sub_days(Days::new(d.age_days)).unwrap(),
            )
        })
        .collect();
    ActivitySummary::evaluate(&docs, rules, today)
}

#[tokio::test]
async fn header_rows_agree_with_rule_evaluation() {
    let Some((db, schema)) = fixture("header").await else {
        return;
    };
    let rules = rules();
    let batch = db.execute(&supplier_header_query(&rules, None)).await.unwrap();

    let ids: Vec<String> = column(&batch, "VENDOR_ID (M)").iter().map(text).collect();
    assert_eq!(ids, vec!["1000000001", "1000000004", "1000000005"]);

    let today = Local::now().date_naive();
    let expected: Vec<String> = vendors()
        .iter()
        .filter(|v| evaluate(v, &rules, today).is_eligible())
        .map(|v| v.id.to_string())
        .collect();
    assert_eq!(ids, expected);

    let tags = column(&batch, "SUPPLIER_TRX_SOURCE_LIST (M)");
    let amounts_1y = column(&batch, "TRX_1Y_AMOUNT_CHF (M)");
    let amounts_2y = column(&batch, "TRX_2Y_AMOUNT_CHF (M)");
    let balances = column(&batch, "TRX_OP_BAL_CHF (M)");
    for (row, id) in ids.iter().enumerate() {
        let vendor = vendors().into_iter().find(|v| v.id == id.as_str()).unwrap();
        let summary = evaluate(&vendor, &rules, today);
        assert_eq!(text(&tags[row]), summary.source_tag().label(), "tag of {}", id);
        assert_eq!(decimal(&amounts_1y[row]), summary.trx_1y_amount, "1y amount of {}", id);
        assert_eq!(decimal(&amounts_2y[row]), summary.trx_2y_amount, "2y amount of {}", id);
        assert_eq!(decimal(&balances[row]), summary.open_balance, "balance of {}", id);
    }

    // FE 100 and NP 20 at rate 0.5
    assert_eq!(decimal(&amounts_1y[0]), BigDecimal::from(40));
    assert_eq!(text(&tags[0]), "INV_1Y");
    assert_eq!(text(&tags[1]), "POH_OP");
    assert_eq!(text(&tags[2]), "INV_2Y");
    assert_eq!(
        text(&column(&batch, "REMITTANCE_EMAIL")[0]),
        "ap@vendor1.example"
    );

    teardown(db, &schema).await;
}

#[tokio::test]
async fn site_rows_follow_the_same_eligibility() {
    let Some((db, schema)) = fixture("site").await else {
        return;
    };
    let batch = db.execute(&supplier_site_query(&rules(), None)).await.unwrap();

    let ids: Vec<String> = column(&batch, "VENDOR_ID (M)").iter().map(text).collect();
    assert_eq!(ids, vec!["1000000001", "1000000004", "1000000005"]);

    let site_ids: Vec<String> = column(&batch, "VENDOR_SITE_ID (M)").iter().map(text).collect();
    assert_eq!(site_ids[0], "1000000001001");

    let usage = column(&batch, "PO_Usage");
    assert_eq!(usage[0], CellValue::Null);
    assert_eq!(text(&usage[1]), "Purchasing, Payment");
    assert_eq!(decimal(&column(&batch, "TRX_1Y_AMOUNT_CHF (M)")[0]), BigDecimal::from(40));

    teardown(db, &schema).await;
}

#[tokio::test]
async fn limit_caps_executed_rows_and_chunks_match() {
    let Some((db, schema)) = fixture("limit").await else {
        return;
    };
    let rules = rules();

    for limit in [1, 2] {
        let cap = NonZeroU32::new(limit);
        let header = db.execute(&supplier_header_query(&rules, cap)).await.unwrap();
        let site = db.execute(&supplier_site_query(&rules, cap)).await.unwrap();
        assert_eq!(header.len(), limit as usize);
        assert_eq!(site.len(), limit as usize);
    }

    let query = supplier_header_query(&rules, None);
    let whole = db.execute(&query).await.unwrap();
    let chunks: Vec<ResultBatch> = db
        .execute_chunked(&query, 2)
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(chunks.iter().map(ResultBatch::len).collect::<Vec<_>>(), vec![2, 1]);
    let streamed: Vec<_> = chunks.into_iter().flat_map(|b| b.rows).collect();
    assert_eq!(streamed, whole.rows);

    let distinct: BTreeSet<String> = column(&whole, "VENDOR_ID (M)").iter().map(text).collect();
    assert_eq!(distinct.len(), whole.len());

    teardown(db, &schema).await;
}
