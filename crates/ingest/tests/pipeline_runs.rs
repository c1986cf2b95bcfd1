//! End-to-end pipeline runs over in-memory fakes: every load strategy,
//! the failure/compensation paths, audit, and job dispatch.

mod common;

use chrono::NaiveDate;
use common::{text, MapLookup, MemoryAudit, MemoryStore, RecordingQueue};
use finback_core::registry::{find_report_type, RefKind};
use finback_core::rows::FieldValue;
use finback_ingest::error::ImportError;
use finback_ingest::store::{Scope, StoredRow};
use finback_ingest::{run_import, ImportRequest, PipelineDeps};

struct Harness {
    store: MemoryStore,
    lookup: MapLookup,
    queue: RecordingQueue,
    audit: MemoryAudit,
}

impl Harness {
    fn new(lookup: MapLookup) -> Self {
        Self {
            store: MemoryStore::new(),
            lookup,
            queue: RecordingQueue::new(),
            audit: MemoryAudit::new(),
        }
    }

    fn deps(&self) -> PipelineDeps<'_> {
        PipelineDeps {
            store: &self.store,
            lookup: &self.lookup,
            queue: &self.queue,
            audit: &self.audit,
        }
    }
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn request(
    report_type: &str,
    file_name: &str,
    content: &str,
    scope: Scope,
) -> ImportRequest {
    ImportRequest {
        config: find_report_type(report_type).unwrap(),
        file_name: file_name.to_string(),
        bytes: content.as_bytes().to_vec(),
        scope,
        business_date: date("2024-07-15"),
    }
}

fn reference_lookup() -> MapLookup {
    MapLookup::new()
        .with(RefKind::Client, "C0001", 1001)
        .with(RefKind::Client, "C0002", 1002)
        .with(RefKind::Scrip, "S001", 2001)
        .with(RefKind::Scrip, "S002", 2002)
}

fn trades_scope() -> Scope {
    vec![
        ("financial_year".to_string(), "2024-25".to_string()),
        ("region".to_string(), "west".to_string()),
    ]
}

const TRADES_HEADER: &str = "TRADE DATE,CLIENT CODE,SCRIP CODE,BUY/SELL,QTY,RATE\n";
const TRADES_THREE: &str = "TRADE DATE,CLIENT CODE,SCRIP CODE,BUY/SELL,QTY,RATE\n\
    2024-07-15,C0001,S001,BUY,10,99.5\n\
    2024-07-15,C0001,S002,SELL,5,42\n\
    2024-07-15,C0002,S001,BUY,7,99.5\n";

/// A stored trade row in trade_reports insert column order.
fn stored_trade(trade_date: &str, client: &str, region: &str) -> StoredRow {
    vec![
        text(trade_date),
        text(client),
        FieldValue::Int(1001),
        text("S001"),
        FieldValue::Int(2001),
        text("BUY"),
        FieldValue::Float(10.0),
        FieldValue::Float(99.5),
        text("2024-25"),
        text(region),
    ]
}

// ── replace-all ──────────────────────────────────────────────────────

#[tokio::test]
async fn replace_all_supersedes_previous_contents() {
    let harness = Harness::new(reference_lookup());
    harness.store.seed(
        "holdings_snapshot",
        &[
            "client_code",
            "client_id",
            "scrip_code",
            "scrip_id",
            "quantity",
            "market_value",
        ],
        vec![
            vec![
                text("OLD1"),
                FieldValue::Int(9),
                text("S001"),
                FieldValue::Int(2001),
                FieldValue::Float(1.0),
                FieldValue::Null,
            ],
            vec![
                text("OLD2"),
                FieldValue::Int(9),
                text("S002"),
                FieldValue::Int(2002),
                FieldValue::Float(2.0),
                FieldValue::Null,
            ],
        ],
    );

    let content = "CLIENT CODE,SCRIP CODE,QTY,MARKET VALUE\n\
        C0001,S001,10,1000\n\
        C0001,S002,20,2000\n\
        C0002,S001,30,\n";
    let result = run_import(
        &harness.deps(),
        request("holdings", "holdings.csv", content, Vec::new()),
    )
    .await
    .unwrap();

    assert_eq!(result.total_rows, 3);
    assert_eq!(result.inserted_count, 3);
    assert_eq!(result.updated_count, 0);
    assert_eq!(result.error_count, 0);
    assert_eq!(result.db_count_after, 3);

    // Old contents are gone, only the upload remains.
    let rows = harness.store.rows_of("holdings_snapshot");
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r[0].as_text() != Some("OLD1")));
    // Reference ids resolved into the stored rows.
    assert_eq!(rows[0][1], FieldValue::Int(1001));
    assert_eq!(rows[0][3], FieldValue::Int(2001));
    // Optional numeric field left empty comes out as Null.
    assert_eq!(rows[2][5], FieldValue::Null);
}

#[tokio::test]
async fn unknown_reference_rows_are_excluded_not_fatal() {
    let harness = Harness::new(reference_lookup());
    let content = "CLIENT CODE,SCRIP CODE,QTY,MARKET VALUE\n\
        C0001,S001,10,1000\n\
        C0001,UNKNOWN,20,2000\n\
        C0002,S002,30,3000\n";

    let result = run_import(
        &harness.deps(),
        request("holdings", "holdings.csv", content, Vec::new()),
    )
    .await
    .unwrap();

    assert_eq!(result.total_rows, 3);
    assert_eq!(result.inserted_count, 2);
    assert_eq!(result.error_count, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].row, 3);
    assert!(result.errors[0].fields[0].contains("unknown scrip: UNKNOWN"));
    assert_eq!(harness.store.rows_of("holdings_snapshot").len(), 2);
}

#[tokio::test]
async fn batch_boundary_commits_two_transactions() {
    let harness = Harness::new(reference_lookup());

    // One row over the batch size forces a second, single-row transaction.
    let mut content = String::from("CLIENT CODE,SCRIP CODE,QTY,MARKET VALUE\n");
    for i in 0..1001 {
        content.push_str(&format!("C0001,S001,{i},100\n"));
    }

    let result = run_import(
        &harness.deps(),
        request("holdings", "holdings.csv", &content, Vec::new()),
    )
    .await
    .unwrap();

    assert_eq!(result.total_rows, 1001);
    assert_eq!(result.inserted_count, 1001);
    assert_eq!(harness.store.insert_calls(), 2);
    assert_eq!(harness.store.rows_of("holdings_snapshot").len(), 1001);
}

// ── scoped-replace ───────────────────────────────────────────────────

#[tokio::test]
async fn scoped_replace_reupload_is_identity() {
    let harness = Harness::new(reference_lookup());

    let first = run_import(
        &harness.deps(),
        request("trades", "trades.csv", TRADES_THREE, trades_scope()),
    )
    .await
    .unwrap();
    assert_eq!(first.inserted_count, 3);
    assert_eq!(first.db_count_after, 3);

    let second = run_import(
        &harness.deps(),
        request("trades", "trades.csv", TRADES_THREE, trades_scope()),
    )
    .await
    .unwrap();
    assert_eq!(second.inserted_count, 3);
    assert_eq!(second.error_count, 0);
    assert_eq!(second.db_count_after, 3);
    assert_eq!(harness.store.rows_of("trade_reports").len(), 3);
}

#[tokio::test]
async fn scoped_replace_leaves_other_scopes_untouched() {
    let harness = Harness::new(reference_lookup());
    let columns = find_report_type("trades").unwrap().columns;
    harness.store.seed(
        "trade_reports",
        columns,
        vec![
            stored_trade("2024-07-01", "C0001", "WEST"),
            stored_trade("2024-07-01", "C0002", "EAST"),
        ],
    );

    let result = run_import(
        &harness.deps(),
        request("trades", "trades.csv", TRADES_THREE, trades_scope()),
    )
    .await
    .unwrap();

    // 2 before - 1 in scope + 3 inserted.
    assert_eq!(result.db_count_after, 4);
    let rows = harness.store.rows_of("trade_reports");
    assert!(rows
        .iter()
        .any(|r| r[9].as_text() == Some("EAST") && r[1].as_text() == Some("C0002")));
    // The old WEST row was superseded.
    assert!(!rows
        .iter()
        .any(|r| r[0].as_text() == Some("2024-07-01") && r[9].as_text() == Some("WEST")));
}

#[tokio::test]
async fn scoped_replace_dedups_across_whole_run() {
    let harness = Harness::new(reference_lookup());
    // Rows 2 and 4 collide on (date, client, scrip, side); first wins.
    let content = "TRADE DATE,CLIENT CODE,SCRIP CODE,BUY/SELL,QTY,RATE\n\
        2024-07-15,C0001,S001,BUY,10,99.5\n\
        2024-07-15,C0002,S001,BUY,7,99.5\n\
        2024-07-15,C0001,S001,BUY,99,1.0\n";

    let result = run_import(
        &harness.deps(),
        request("trades", "trades.csv", content, trades_scope()),
    )
    .await
    .unwrap();

    assert_eq!(result.total_rows, 3);
    assert_eq!(result.inserted_count, 2);
    assert_eq!(result.error_count, 1);
    assert_eq!(result.duplicates.len(), 1);
    assert_eq!(result.duplicates[0].row, 4);
    assert_eq!(
        result.duplicates[0].key,
        "2024-07-15|C0001|S001|BUY|2024-25|WEST"
    );

    // First occurrence won: qty 10, not 99.
    let rows = harness.store.rows_of("trade_reports");
    let kept = rows
        .iter()
        .find(|r| r[1].as_text() == Some("C0001") && r[3].as_text() == Some("S001"))
        .unwrap();
    assert_eq!(kept[6], FieldValue::Float(10.0));
}

#[tokio::test]
async fn scoped_replace_write_failure_restores_snapshot() {
    let harness = Harness::new(reference_lookup());
    let columns = find_report_type("trades").unwrap().columns;
    harness.store.seed(
        "trade_reports",
        columns,
        vec![
            stored_trade("2024-07-01", "C0001", "WEST"),
            stored_trade("2024-07-02", "C0001", "WEST"),
            stored_trade("2024-07-01", "C0002", "EAST"),
        ],
    );
    // The first insert is the batch load; the second is the restoration.
    harness.store.fail_insert_call(1);

    let err = run_import(
        &harness.deps(),
        request("trades", "trades.csv", TRADES_THREE, trades_scope()),
    )
    .await
    .unwrap_err();

    match err {
        ImportError::BatchTransaction { batch, message } => {
            assert_eq!(batch, 1);
            assert!(message.contains("injected"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Scope rolled back to its pre-run contents, other scope untouched.
    let rows = harness.store.rows_of("trade_reports");
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().any(|r| r[0].as_text() == Some("2024-07-01")
        && r[9].as_text() == Some("WEST")));
    assert!(rows.iter().any(|r| r[0].as_text() == Some("2024-07-02")));
    assert!(rows.iter().any(|r| r[9].as_text() == Some("EAST")));
    // Nothing dispatched and nothing audited for a failed run.
    assert!(harness.queue.jobs.lock().unwrap().is_empty());
    assert!(harness.audit.entries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn scoped_replace_count_mismatch_restores_and_fails() {
    let harness = Harness::new(reference_lookup());
    let columns = find_report_type("trades").unwrap().columns;
    harness
        .store
        .seed("trade_reports", columns, vec![stored_trade("2024-07-01", "C0001", "WEST")]);
    // Verification sees one phantom row beyond what the run accounts for.
    harness.store.skew_counts_after_first(1);

    let err = run_import(
        &harness.deps(),
        request("trades", "trades.csv", TRADES_THREE, trades_scope()),
    )
    .await
    .unwrap_err();

    match err {
        ImportError::CountMismatch { expected, actual } => {
            // 1 before - 1 deleted + 3 inserted = 3 expected; skew makes 4.
            assert_eq!(expected, 3);
            assert_eq!(actual, 4);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Snapshot restored: only the pre-run row remains in scope.
    let rows = harness.store.rows_of("trade_reports");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0].as_text(), Some("2024-07-01"));
    assert!(harness.audit.entries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_scope_parameter_is_rejected_before_parsing() {
    let harness = Harness::new(reference_lookup());

    let err = run_import(
        &harness.deps(),
        request("trades", "trades.csv", TRADES_THREE, Vec::new()),
    )
    .await
    .unwrap_err();

    match err {
        ImportError::FileFormat(message) => {
            assert!(message.contains("financial_year"));
            assert!(message.contains("region"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(harness.store.insert_calls(), 0);
}

// ── dedup-upsert ─────────────────────────────────────────────────────

const REVENUE_WITH_DUP: &str = "DATE,CLIENT CODE,BROKERAGE,OTHER CHARGES\n\
    2024-04-01,C0001,120.5,10\n\
    2024-04-01,C0002,80,5\n\
    2024-04-01,C0001,999,99\n";

#[tokio::test]
async fn dedup_upsert_reports_in_file_duplicates() {
    let harness = Harness::new(reference_lookup());

    let result = run_import(
        &harness.deps(),
        request("daily-revenue", "revenue.csv", REVENUE_WITH_DUP, Vec::new()),
    )
    .await
    .unwrap();

    assert_eq!(result.total_rows, 3);
    assert_eq!(result.inserted_count, 2);
    assert_eq!(result.updated_count, 0);
    assert_eq!(result.error_count, 1);
    assert_eq!(result.duplicates.len(), 1);
    assert_eq!(result.duplicates[0].row, 4);
    assert_eq!(result.duplicates[0].key, "2024-04-01|C0001");
    assert_eq!(result.db_count_after, 2);

    // First occurrence won.
    let rows = harness.store.rows_of("daily_revenue");
    let kept = rows
        .iter()
        .find(|r| r[1].as_text() == Some("C0001"))
        .unwrap();
    assert_eq!(kept[3], FieldValue::Float(120.5));
}

#[tokio::test]
async fn dedup_upsert_rerun_updates_instead_of_inserting() {
    let harness = Harness::new(reference_lookup());

    let first = run_import(
        &harness.deps(),
        request("daily-revenue", "revenue.csv", REVENUE_WITH_DUP, Vec::new()),
    )
    .await
    .unwrap();
    assert_eq!(first.inserted_count, 2);
    assert_eq!(first.updated_count, 0);

    let second = run_import(
        &harness.deps(),
        request("daily-revenue", "revenue.csv", REVENUE_WITH_DUP, Vec::new()),
    )
    .await
    .unwrap();
    assert_eq!(second.inserted_count, 0);
    assert_eq!(second.updated_count, 2);
    assert_eq!(second.db_count_after, 2);
    assert_eq!(harness.store.rows_of("daily_revenue").len(), 2);
}

// ── audit & dispatch ─────────────────────────────────────────────────

#[tokio::test]
async fn completed_run_writes_one_audit_entry() {
    let harness = Harness::new(reference_lookup());

    run_import(
        &harness.deps(),
        request("daily-revenue", "revenue.csv", REVENUE_WITH_DUP, Vec::new()),
    )
    .await
    .unwrap();

    let entries = harness.audit.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.report_type, "daily-revenue");
    assert_eq!(entry.file_label, "revenue.csv");
    assert_eq!(entry.total_rows, 3);
    assert_eq!(entry.db_count_before, 0);
    assert_eq!(entry.db_count_after, 2);
    assert_eq!(entry.inserted_count, 2);
    assert_eq!(entry.error_count, 1);
}

#[tokio::test]
async fn repeat_runs_do_not_duplicate_downstream_jobs() {
    let harness = Harness::new(reference_lookup());

    run_import(
        &harness.deps(),
        request("trades", "trades.csv", TRADES_THREE, trades_scope()),
    )
    .await
    .unwrap();
    run_import(
        &harness.deps(),
        request("trades", "trades.csv", TRADES_THREE, trades_scope()),
    )
    .await
    .unwrap();

    // Same scope + business date, so the second run's jobs deduplicate.
    assert_eq!(
        harness.queue.job_names(),
        vec!["client-daily-aggregates".to_string(), "not-traded-days".to_string()]
    );

    // A different business date fans out fresh jobs.
    let mut next_day = request("trades", "trades.csv", TRADES_THREE, trades_scope());
    next_day.business_date = date("2024-07-16");
    run_import(&harness.deps(), next_day).await.unwrap();
    assert_eq!(harness.queue.jobs.lock().unwrap().len(), 4);
}

// ── structural rejection ─────────────────────────────────────────────

#[tokio::test]
async fn missing_required_column_fails_before_any_write() {
    let harness = Harness::new(reference_lookup());
    harness.store.seed(
        "holdings_snapshot",
        &["client_code"],
        vec![vec![text("KEEP")]],
    );

    let content = "CLIENT CODE,QTY\nC0001,10\n";
    let err = run_import(
        &harness.deps(),
        request("holdings", "holdings.csv", content, Vec::new()),
    )
    .await
    .unwrap_err();

    match err {
        ImportError::FileFormat(message) => {
            assert!(message.contains("SCRIP CODE"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // Rejection happens before the replace-all truncate.
    assert_eq!(harness.store.rows_of("holdings_snapshot").len(), 1);
}

#[tokio::test]
async fn empty_data_section_completes_with_zero_counts() {
    let harness = Harness::new(reference_lookup());

    let result = run_import(
        &harness.deps(),
        request("trades", "trades.csv", TRADES_HEADER, trades_scope()),
    )
    .await
    .unwrap();

    assert_eq!(result.total_rows, 0);
    assert_eq!(result.inserted_count, 0);
    assert_eq!(result.db_count_after, 0);
    // An empty-but-valid file still audits and dispatches.
    assert_eq!(harness.audit.entries.lock().unwrap().len(), 1);
    assert_eq!(harness.queue.jobs.lock().unwrap().len(), 2);
}
