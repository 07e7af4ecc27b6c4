//! Structured reports of synchronization failures.
//!
//! Failures the client cannot fix on its own (a refused connect, a subscription that no longer
//! matches the server's schema, a reducer call that could not be sent) are described as a
//! [`SyncViolation`] and handed to a [`ViolationObserver`]. The default observer writes them to
//! `tracing`; tests install a [`CollectingObserver`] and assert on what was reported.
//!
//! ```
//! use lurelands_sync::telemetry::{CollectingObserver, ViolationKind};
//! use std::sync::Arc;
//!
//! let observer = Arc::new(CollectingObserver::new());
//! // hand `observer.clone()` to ClientBuilder::with_violation_observer, then play
//! assert!(!observer.has_violation(ViolationKind::Schema));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::TableName;

/// How bad it is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// The client recovered on its own, e.g. by reverting an expired speculative edit.
    Warning,
    /// The operation failed; the client is degraded until the caller acts.
    Error,
    /// The session is over until the client or server is redeployed.
    Critical,
}

impl ViolationSeverity {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which part of the client noticed the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// Connect refused or connection lost.
    Connection,
    /// The server could not apply a subscription query.
    Subscription,
    /// Snapshot rows did not decode into the expected row shape.
    Schema,
    /// A reducer call could not be dispatched.
    Mutation,
    /// A speculative edit was never confirmed and got reverted.
    Optimistic,
    /// The diff stream did something the mirror did not expect.
    Mirror,
    /// The identity token could not be loaded or saved.
    Storage,
}

impl ViolationKind {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Subscription => "subscription",
            Self::Schema => "schema",
            Self::Mutation => "mutation",
            Self::Optimistic => "optimistic",
            Self::Mirror => "mirror",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported failure.
///
/// ```
/// use lurelands_sync::telemetry::{SyncViolation, ViolationKind, ViolationSeverity};
/// use lurelands_sync::TableName;
///
/// let violation = SyncViolation::new(
///     ViolationSeverity::Critical,
///     ViolationKind::Schema,
///     "row shape mismatch",
///     "mirror.rs:42",
/// )
/// .with_table(TableName::Inventory)
/// .with_context("rows", "12");
///
/// let json = violation.to_json().unwrap();
/// assert!(json.contains(r#""kind":"schema""#));
/// assert!(json.contains(r#""table":"inventory""#));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct SyncViolation {
    /// How bad it is.
    pub severity: ViolationSeverity,
    /// Which part of the client noticed.
    pub kind: ViolationKind,
    /// What went wrong.
    pub message: String,
    /// `file:line` of the report.
    pub location: &'static str,
    /// The table involved, when there is one.
    pub table: Option<TableName>,
    /// Extra key-value detail.
    pub context: BTreeMap<String, String>,
}

impl SyncViolation {
    /// A violation without table or context.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
            table: None,
            context: BTreeMap::new(),
        }
    }

    /// Names the table involved. `None` leaves it unset.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<Option<TableName>>) -> Self {
        self.table = table.into();
        self
    }

    /// Adds one piece of detail.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// The violation as one line of JSON.
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl fmt::Display for SyncViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {} (at {}", self.severity, self.kind, self.message, self.location)?;
        if let Some(table) = self.table {
            write!(f, ", table={table}")?;
        }
        for (key, value) in &self.context {
            write!(f, ", {key}={value}")?;
        }
        f.write_str(")")
    }
}

/// Receives every [`SyncViolation`] the client reports.
///
/// Called on the thread that pumps the client, so keep it quick.
///
/// ```
/// use lurelands_sync::telemetry::{SyncViolation, ViolationObserver};
///
/// struct Counter;
///
/// impl ViolationObserver for Counter {
///     fn on_violation(&self, violation: &SyncViolation) {
///         let _label = violation.kind.as_str();
///     }
/// }
/// ```
pub trait ViolationObserver: Send + Sync {
    /// Called once per violation.
    fn on_violation(&self, violation: &SyncViolation);
}

/// Writes violations to `tracing`: warnings at `warn`, the rest at `error`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &SyncViolation) {
        let table = violation.table.map_or("-", |table| table.as_str());
        let context = format!("{:?}", violation.context);
        if violation.severity == ViolationSeverity::Warning {
            tracing::warn!(
                kind = violation.kind.as_str(),
                location = violation.location,
                table,
                context = %context,
                "{}",
                violation.message
            );
        } else {
            tracing::error!(
                severity = violation.severity.as_str(),
                kind = violation.kind.as_str(),
                location = violation.location,
                table,
                context = %context,
                "{}",
                violation.message
            );
        }
    }
}

/// Keeps every violation in memory, for tests.
///
/// ```
/// use lurelands_sync::telemetry::{
///     CollectingObserver, SyncViolation, ViolationKind, ViolationObserver, ViolationSeverity,
/// };
///
/// let observer = CollectingObserver::new();
/// observer.on_violation(&SyncViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::Optimistic,
///     "edit expired",
///     "test.rs:1",
/// ));
/// assert!(observer.has_violation(ViolationKind::Optimistic));
/// ```
#[derive(Debug, Default)]
pub struct CollectingObserver {
    seen: Mutex<Vec<SyncViolation>>,
}

impl CollectingObserver {
    /// An observer that has seen nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything seen so far, oldest first.
    #[must_use]
    pub fn violations(&self) -> Vec<SyncViolation> {
        self.seen.lock().clone()
    }

    /// How many violations were seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Whether nothing was seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    /// Whether a violation of `kind` was seen.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.seen.lock().iter().any(|seen| seen.kind == kind)
    }

    /// The violations of `kind`, oldest first.
    #[must_use]
    pub fn violations_of_kind(&self, kind: ViolationKind) -> Vec<SyncViolation> {
        self.seen
            .lock()
            .iter()
            .filter(|seen| seen.kind == kind)
            .cloned()
            .collect()
    }

    /// Forgets everything seen.
    pub fn clear(&self) {
        self.seen.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &SyncViolation) {
        self.seen.lock().push(violation.clone());
    }
}

/// Hands `violation` to `observer`, or to [`TracingObserver`] when there is none.
pub fn report_to_observer<O: ViolationObserver + ?Sized>(
    observer: Option<&Arc<O>>,
    violation: &SyncViolation,
) {
    match observer {
        Some(observer) => observer.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Builds a [`SyncViolation`] stamped with the call site and reports it to an
/// `Option<Arc<dyn ViolationObserver>>`.
///
/// ```text
/// report_violation_to!(observer, severity, kind, "format {}", args);
/// report_violation_to!(observer, table = table; severity, kind, "format {}", args);
/// ```
///
/// The `table` form accepts a `TableName` or an `Option<TableName>`.
///
/// ```
/// use lurelands_sync::report_violation_to;
/// use lurelands_sync::telemetry::{CollectingObserver, ViolationKind, ViolationObserver, ViolationSeverity};
/// use std::sync::Arc;
///
/// let observer: Option<Arc<dyn ViolationObserver>> = Some(Arc::new(CollectingObserver::new()));
/// report_violation_to!(observer, ViolationSeverity::Error, ViolationKind::Mutation,
///     "could not dispatch {}", "buy_item");
/// ```
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, table = $table:expr; $severity:expr, $kind:expr, $($fmt:tt)+) => {{
        let violation = $crate::telemetry::SyncViolation::new(
            $severity,
            $kind,
            format!($($fmt)+),
            concat!(file!(), ":", line!()),
        )
        .with_table($table);
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, $severity:expr, $kind:expr, $($fmt:tt)+) => {{
        let violation = $crate::telemetry::SyncViolation::new(
            $severity,
            $kind,
            format!($($fmt)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};
}

/// Asserts that a [`CollectingObserver`] saw a violation of the given kind.
///
/// # Panics
///
/// Panics with everything the observer did see when no violation matches.
#[macro_export]
macro_rules! assert_violation {
    ($observer:expr, $kind:expr) => {{
        assert!(
            $observer.has_violation($kind),
            "no {:?} violation among {:#?}",
            $kind,
            $observer.violations()
        );
    }};
}
