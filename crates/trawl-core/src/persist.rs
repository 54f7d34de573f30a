//! Turns extractor output into stored records.
//!
//! Deduplication hinges on a stable external id per source item. When the
//! extractor did not supply one it is derived from the item URL; if that
//! fails too, a time-based id is used and the record will not deduplicate.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::Regex;
use url::Url;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewRecord, RawRecord, RecordType, UpsertOutcome};
use crate::traits::RecordStore;
use crate::util::host_of;

static RE_GLINTS_JOB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/jobs/(\d+)").expect("valid regex"));
static RE_TRAILING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d+)/?$").expect("valid regex"));
static RE_TC_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d{4}/\d{2}/\d{2}/[^/]+)").expect("valid regex"));

/// Derive a stable id for the item behind `url`, if the URL carries one.
pub fn derive_external_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let path = parsed.path();

    if is_site(&host, "glints.com") {
        let digits = RE_GLINTS_JOB
            .captures(path)
            .or_else(|| RE_TRAILING_DIGITS.captures(path))
            .map(|c| c[1].to_string());
        if let Some(digits) = digits {
            return Some(format!("glints-{digits}"));
        }
    } else if is_site(&host, "techcrunch.com")
        && let Some(c) = RE_TC_SLUG.captures(path)
    {
        return Some(format!("tc-{}", &c[1]));
    }

    // Tokopedia product URLs end in the product slug; the same rule is the
    // generic fallback for everything else.
    path.split('/')
        .rev()
        .find(|s| !s.is_empty())
        .map(String::from)
}

/// Time-based id: `<prefix>-<millis>-<random>`. Unique but not stable.
pub fn fallback_external_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{prefix}-{}-{suffix}", Utc::now().timestamp_millis())
}

/// `tokopedia` for `www.tokopedia.com`, `record` when the host is unknown.
fn source_prefix(url: &str) -> String {
    host_of(url)
        .map(|h| h.trim_start_matches("www.").to_string())
        .and_then(|h| h.split('.').next().map(String::from))
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "record".to_string())
}

fn is_site(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Build the row payload for a raw record.
pub fn to_new_record(
    job_id: Uuid,
    record_type: RecordType,
    raw: &RawRecord,
    captured_at: DateTime<Utc>,
) -> NewRecord {
    let external_id = raw
        .external_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .or_else(|| derive_external_id(&raw.url))
        .unwrap_or_else(|| fallback_external_id(&source_prefix(&raw.url)));

    NewRecord {
        job_id,
        record_type,
        external_id: Some(external_id),
        title: raw.title.clone(),
        description: raw.description.clone(),
        price: raw.price,
        currency: raw.currency.clone(),
        source_url: raw.url.clone(),
        image_url: raw.image_url.clone(),
        metadata: serde_json::Value::Object(raw.metadata.clone()),
        captured_at,
    }
}

/// Tally of a batch write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub inserted: u32,
    pub updated: u32,
    pub failed: u32,
}

impl WriteSummary {
    pub fn written(&self) -> u32 {
        self.inserted + self.updated
    }
}

/// Idempotent record persistence on top of a [`RecordStore`].
#[derive(Clone)]
pub struct RecordWriter<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> RecordWriter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Insert or update one record, keyed on `(job_id, external_id)`.
    pub async fn upsert(
        &self,
        job_id: Uuid,
        record_type: RecordType,
        raw: &RawRecord,
    ) -> Result<UpsertOutcome, AppError> {
        let record = to_new_record(job_id, record_type, raw, Utc::now());
        self.store.upsert_record(&record).await
    }

    /// Upsert every record. Failures are handed to `on_failure` and skipped.
    pub async fn write_all<H>(
        &self,
        job_id: Uuid,
        record_type: RecordType,
        records: &[RawRecord],
        mut on_failure: H,
    ) -> WriteSummary
    where
        H: FnMut(&RawRecord, &AppError),
    {
        let mut summary = WriteSummary::default();
        for raw in records {
            match self.upsert(job_id, record_type, raw).await {
                Ok(UpsertOutcome::Inserted(_)) => summary.inserted += 1,
                Ok(UpsertOutcome::Updated(_)) => summary.updated += 1,
                Err(e) => {
                    summary.failed += 1;
                    on_failure(raw, &e);
                }
            }
        }
        summary
    }
}
