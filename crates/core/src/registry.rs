//! Declarative report-type registry.
//!
//! Each upload names a report type; everything the pipeline needs to load
//! it -- column mapping, required fields, composite unique key, scope
//! partitioning, load strategy, downstream jobs -- lives in one immutable
//! [`ReportTypeConfig`] looked up explicitly by key. Adding a report type
//! means adding an entry here plus a migration for its table.

/// How a report type's rows are committed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategyKind {
    /// Truncate the target table before the first batch, then plain inserts.
    /// For datasets fully superseded by every upload.
    ReplaceAll,
    /// Snapshot + delete all rows in the upload's scope (e.g. financial
    /// year + region), insert with per-run dedup, verify counts afterwards
    /// and restore the snapshot on mismatch.
    ScopedReplace,
    /// Per-batch dedup, then insert-or-update on the composite unique key.
    /// For incrementally refreshed feeds.
    DedupUpsert,
}

impl LoadStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReplaceAll => "replace_all",
            Self::ScopedReplace => "scoped_replace",
            Self::DedupUpsert => "dedup_upsert",
        }
    }
}

/// Which reference table a source field resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Scrip,
    Client,
}

/// A reference lookup the transformer performs for each row:
/// `source_field` (a cleaned code) resolves to an internal id stored in
/// `target_field`. An unresolvable code marks the row as errored.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceField {
    pub source_field: &'static str,
    pub target_field: &'static str,
    pub kind: RefKind,
}

/// A downstream recomputation job enqueued after a successful run.
#[derive(Debug, Clone, Copy)]
pub struct JobTemplate {
    pub name: &'static str,
    /// Soft ordering between chained jobs: schedule this many seconds in
    /// the future so a prerequisite job has likely completed.
    pub delay_secs: i64,
    pub max_attempts: i32,
    pub backoff_secs: i64,
}

/// Immutable per-report-type configuration. One entry per report type;
/// stable for the whole duration of an import run.
#[derive(Debug, Clone, Copy)]
pub struct ReportTypeConfig {
    /// URL/selector key, e.g. `"trades"`.
    pub key: &'static str,
    /// Human-readable label used in audit log messages.
    pub label: &'static str,
    /// Target table name.
    pub table: &'static str,
    /// Source column header -> canonical field name. Headers are compared
    /// after cell cleaning (so matching is case/whitespace insensitive).
    pub column_map: &'static [(&'static str, &'static str)],
    /// Canonical fields that must be present and non-empty per row.
    pub required: &'static [&'static str],
    /// Ordered fields forming the composite unique key.
    pub unique_key: &'static [&'static str],
    /// Scope fields for scoped-replace types (empty otherwise). Values
    /// come from the upload request, not from the file.
    pub scope_fields: &'static [&'static str],
    /// Insert column order for the target table.
    pub columns: &'static [&'static str],
    /// Reference lookups performed during transform.
    pub reference_fields: &'static [ReferenceField],
    /// Fields coerced to numbers during transform; an unparsable value
    /// marks the row as errored.
    pub numeric_fields: &'static [&'static str],
    pub strategy: LoadStrategyKind,
    /// Downstream jobs dispatched after a successful run.
    pub jobs: &'static [JobTemplate],
}

impl ReportTypeConfig {
    /// The source headers that must be present for the file to be
    /// structurally acceptable (the mapped headers of required fields).
    pub fn required_source_columns(&self) -> Vec<&'static str> {
        self.column_map
            .iter()
            .filter(|(_, canonical)| self.required.contains(canonical))
            .map(|(source, _)| *source)
            .collect()
    }
}

/// All known report types.
pub const REPORT_TYPES: &[ReportTypeConfig] = &[
    // Daily holdings snapshot: the file is always the full picture, so the
    // previous contents are wholly superseded.
    ReportTypeConfig {
        key: "holdings",
        label: "Holdings Snapshot",
        table: "holdings_snapshot",
        column_map: &[
            ("CLIENT CODE", "client_code"),
            ("SCRIP CODE", "scrip_code"),
            ("QTY", "quantity"),
            ("MARKET VALUE", "market_value"),
        ],
        required: &["client_code", "scrip_code", "quantity"],
        unique_key: &["client_code", "scrip_code"],
        scope_fields: &[],
        columns: &[
            "client_code",
            "client_id",
            "scrip_code",
            "scrip_id",
            "quantity",
            "market_value",
        ],
        reference_fields: &[
            ReferenceField {
                source_field: "client_code",
                target_field: "client_id",
                kind: RefKind::Client,
            },
            ReferenceField {
                source_field: "scrip_code",
                target_field: "scrip_id",
                kind: RefKind::Scrip,
            },
        ],
        numeric_fields: &["quantity", "market_value"],
        strategy: LoadStrategyKind::ReplaceAll,
        jobs: &[],
    },
    // Exchange trade report, partitioned by financial year + region.
    ReportTypeConfig {
        key: "trades",
        label: "Trade Report",
        table: "trade_reports",
        column_map: &[
            ("TRADE DATE", "trade_date"),
            ("CLIENT CODE", "client_code"),
            ("SCRIP CODE", "scrip_code"),
            ("BUY/SELL", "side"),
            ("QTY", "quantity"),
            ("RATE", "price"),
        ],
        required: &["trade_date", "client_code", "scrip_code", "quantity", "price"],
        unique_key: &["trade_date", "client_code", "scrip_code", "side"],
        scope_fields: &["financial_year", "region"],
        columns: &[
            "trade_date",
            "client_code",
            "client_id",
            "scrip_code",
            "scrip_id",
            "side",
            "quantity",
            "price",
            "financial_year",
            "region",
        ],
        reference_fields: &[
            ReferenceField {
                source_field: "client_code",
                target_field: "client_id",
                kind: RefKind::Client,
            },
            ReferenceField {
                source_field: "scrip_code",
                target_field: "scrip_id",
                kind: RefKind::Scrip,
            },
        ],
        numeric_fields: &["quantity", "price"],
        strategy: LoadStrategyKind::ScopedReplace,
        jobs: &[
            JobTemplate {
                name: "client-daily-aggregates",
                delay_secs: 0,
                max_attempts: 3,
                backoff_secs: 60,
            },
            // Depends on the aggregates above; delay is advisory ordering,
            // not a hard guarantee.
            JobTemplate {
                name: "not-traded-days",
                delay_secs: 300,
                max_attempts: 3,
                backoff_secs: 60,
            },
        ],
    },
    // Daily revenue feed, incrementally refreshed.
    ReportTypeConfig {
        key: "daily-revenue",
        label: "Daily Revenue",
        table: "daily_revenue",
        column_map: &[
            ("DATE", "revenue_date"),
            ("CLIENT CODE", "client_code"),
            ("BROKERAGE", "brokerage"),
            ("OTHER CHARGES", "charges"),
        ],
        required: &["revenue_date", "client_code"],
        unique_key: &["revenue_date", "client_code"],
        scope_fields: &[],
        columns: &[
            "revenue_date",
            "client_code",
            "client_id",
            "brokerage",
            "charges",
        ],
        reference_fields: &[ReferenceField {
            source_field: "client_code",
            target_field: "client_id",
            kind: RefKind::Client,
        }],
        numeric_fields: &["brokerage", "charges"],
        strategy: LoadStrategyKind::DedupUpsert,
        jobs: &[JobTemplate {
            name: "monthly-client-summary",
            delay_secs: 600,
            max_attempts: 3,
            backoff_secs: 120,
        }],
    },
    // Client master: incremental refresh keyed on the client code alone.
    ReportTypeConfig {
        key: "clients",
        label: "Client Master",
        table: "clients",
        column_map: &[
            ("CLIENT CODE", "client_code"),
            ("CLIENT NAME", "client_name"),
            ("PAN", "pan"),
            ("BRANCH CODE", "branch_code"),
        ],
        required: &["client_code", "client_name"],
        unique_key: &["client_code"],
        scope_fields: &[],
        columns: &["client_code", "client_name", "pan", "branch_code"],
        reference_fields: &[],
        numeric_fields: &[],
        strategy: LoadStrategyKind::DedupUpsert,
        jobs: &[],
    },
];

/// Look up a report type by its selector key. Returns `None` for unknown
/// keys; the API layer maps that to a 404.
pub fn find_report_type(key: &str) -> Option<&'static ReportTypeConfig> {
    REPORT_TYPES.iter().find(|c| c.key == key)
}
