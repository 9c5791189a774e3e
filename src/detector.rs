//! The detector orchestrator: validation → embedding (cached) → bloom →
//! candidate retrieval → multi-signal re-ranking → decision → indexing →
//! attribution update → persistence. This module is the composition root —
//! every other module in this crate exists to be called from here.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::attribution::AttributionGraph;
use crate::bloom::BloomFilter;
use crate::cache::{ArgumentCache, CompositeCache};
use crate::config::DetectorConfig;
use crate::embedder::Embedder;
use crate::error::{DetectorError, Result};
use crate::fingerprint::content_fingerprint;
use crate::ranker::{self, DecisionKind, ScoreBreakdown, Thresholds, Weights};
use crate::storage::{Record, SearchHit as StorageSearchHit, SnapshotDocument, Storage};

const MAX_TITLE_CHARS: usize = 500;
const MAX_DESCRIPTION_CHARS: usize = 10_000;
const MAX_FILES: usize = 1000;
const MAX_FILE_PATH_CHARS: usize = 500;
const MAX_DIFF_CHARS: usize = 500_000;
const MAX_BATCH_SIZE: usize = 1000;

/// A pull-request descriptor submitted for a duplicate check or indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub files: Vec<String>,
    #[serde(default)]
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CheckOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub kind: DecisionKind,
    pub confidence: f32,
    pub original_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedCheckResult {
    pub result: CheckResult,
    pub breakdown: Option<ScoreBreakdown>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCheckItem {
    pub id: i64,
    pub result: CheckResult,
    pub processing_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub id: i64,
    pub score: f32,
    pub title: String,
    pub description: String,
    pub created_at: i64,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub total_prs: usize,
    pub bloom_size: usize,
    pub duplicate_pairs: usize,
    pub storage_backend_name: String,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Strips disallowed control bytes from a text field. Operates on chars
/// rather than raw bytes so multi-byte UTF-8 sequences are never torn.
fn sanitize_text(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            let code = c as u32;
            !((0x00..=0x08).contains(&code)
                || code == 0x0B
                || code == 0x0C
                || (0x0E..=0x1F).contains(&code)
                || code == 0x7F)
        })
        .collect()
}

/// Removes leading slashes, normalizes `\` to `/`, and drops any `..`
/// segment to prevent path traversal.
fn sanitize_file_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let segments: Vec<&str> = unified
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != "..")
        .collect();
    segments.join("/")
}

fn validate_descriptor(d: &Descriptor) -> Result<()> {
    if d.id <= 0 {
        return Err(DetectorError::invalid_input("id must be a strictly positive integer"));
    }
    if d.title.is_empty() {
        return Err(DetectorError::invalid_input("title must not be empty"));
    }
    if d.title.chars().count() > MAX_TITLE_CHARS {
        return Err(DetectorError::invalid_input(format!(
            "title exceeds {MAX_TITLE_CHARS} characters"
        )));
    }
    if d.description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(DetectorError::invalid_input(format!(
            "description exceeds {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    if d.files.len() > MAX_FILES {
        return Err(DetectorError::invalid_input(format!("files exceeds {MAX_FILES} entries")));
    }
    for f in &d.files {
        if f.is_empty() {
            return Err(DetectorError::invalid_input("file path must not be empty"));
        }
        if f.chars().count() > MAX_FILE_PATH_CHARS {
            return Err(DetectorError::invalid_input(format!(
                "file path exceeds {MAX_FILE_PATH_CHARS} characters"
            )));
        }
    }
    if let Some(diff) = &d.diff {
        if diff.chars().count() > MAX_DIFF_CHARS {
            return Err(DetectorError::invalid_input(format!("diff exceeds {MAX_DIFF_CHARS} characters")));
        }
    }
    Ok(())
}

struct Sanitized {
    title: String,
    description: String,
    diff: String,
    files: Vec<String>,
}

fn sanitize_descriptor(d: &Descriptor) -> Sanitized {
    let mut files: Vec<String> = d.files.iter().map(|f| sanitize_file_path(f)).collect();
    let mut seen = HashSet::new();
    files.retain(|f| seen.insert(f.clone()));
    Sanitized {
        title: sanitize_text(&d.title),
        description: sanitize_text(&d.description),
        diff: d.diff.as_deref().map(sanitize_text).unwrap_or_default(),
        files,
    }
}

/// Orchestrates the full duplicate-detection pipeline over a pluggable
/// embedder and an optional pluggable storage back-end.
pub struct Detector {
    config: DetectorConfig,
    embedder: Arc<dyn Embedder>,
    storage: Option<Arc<dyn Storage>>,
    text_cache: ArgumentCache,
    diff_cache: ArgumentCache,
    composite_cache: CompositeCache,
    bloom: std::sync::Mutex<BloomFilter>,
    attribution: AttributionGraph,
    mirror: RwLock<HashMap<i64, Record>>,
    weights: RwLock<Weights>,
    thresholds: RwLock<Thresholds>,
}

impl Detector {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        storage: Option<Arc<dyn Storage>>,
        config: DetectorConfig,
    ) -> Result<Self> {
        let config = config.validated()?;
        let bloom = BloomFilter::new(config.bloom_filter_size, config.bloom_hash_count);
        let cache_size = if config.enable_cache { config.cache_size } else { 1 };
        Ok(Self {
            weights: RwLock::new(config.weights),
            thresholds: RwLock::new(config.thresholds),
            text_cache: ArgumentCache::new(cache_size),
            diff_cache: ArgumentCache::new(cache_size),
            composite_cache: CompositeCache::new(cache_size),
            bloom: std::sync::Mutex::new(bloom),
            attribution: AttributionGraph::new(),
            mirror: RwLock::new(HashMap::new()),
            embedder,
            storage,
            config,
        })
    }

    /// Loads every record from the configured storage into the in-memory
    /// mirror and rebuilds the bloom. A no-op when no storage is configured.
    /// Storage failures are logged and leave the detector in degraded mode
    /// with an empty mirror.
    #[instrument(skip(self))]
    pub async fn init(&self) -> Result<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        match storage.get_all().await {
            Ok(records) => {
                let mut mirror = self.mirror.write().unwrap();
                let mut bloom = self.bloom.lock().unwrap();
                for record in records {
                    // Raw diff text is never persisted, so the rebuilt
                    // fingerprint only covers title+description; the bloom
                    // is never relied on for similarity correctness.
                    let fp = content_fingerprint(&record.title, &record.description, "");
                    bloom.add(&fp);
                    mirror.insert(record.id, record);
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "init: storage load failed, proceeding with an empty mirror");
                Ok(())
            }
        }
    }

    pub async fn check(&self, descriptor: &Descriptor, options: CheckOptions) -> Result<CheckResult> {
        Ok(self.check_detailed(descriptor, options).await?.result)
    }

    #[instrument(skip(self, descriptor), fields(id = descriptor.id))]
    pub async fn check_detailed(
        &self,
        descriptor: &Descriptor,
        options: CheckOptions,
    ) -> Result<DetailedCheckResult> {
        // 1. Validation.
        validate_descriptor(descriptor)?;

        // 2. Sanitization.
        let sanitized = sanitize_descriptor(descriptor);
        let file_set: HashSet<String> = sanitized.files.iter().cloned().collect();

        // 3. Embedding (cache-consulted).
        let composite_key = CompositeCache::key(&sanitized.title, &sanitized.description, &sanitized.diff);
        let (text_vec, diff_vec) = if self.config.enable_cache {
            if let Some(hit) = self.composite_cache.get(composite_key) {
                hit
            } else {
                let vecs = self.embed_both(&sanitized).await?;
                self.composite_cache.insert(composite_key, vecs.clone());
                vecs
            }
        } else {
            self.embed_both(&sanitized).await?
        };

        // 4. Fingerprint (bloom bookkeeping only; not used to reject here).
        let fingerprint = content_fingerprint(&sanitized.title, &sanitized.description, &sanitized.diff);
        self.bloom.lock().unwrap().add(&fingerprint);

        // 5. Candidate retrieval.
        let candidates = self.retrieve_candidates(&text_vec).await;

        // 6. Re-ranking.
        let weights = *self.weights.read().unwrap();
        let scored: Vec<(i64, ScoreBreakdown)> = candidates
            .par_iter()
            .map(|(id, candidate)| {
                let s_text = crate::vector_math::cosine(&text_vec, &candidate.text_embedding);
                let s_diff = crate::vector_math::cosine(&diff_vec, &candidate.diff_embedding);
                let candidate_files: HashSet<String> = candidate.files.iter().cloned().collect();
                let s_file = crate::vector_math::jaccard(&file_set, &candidate_files);
                (*id, ranker::score(s_text, s_diff, s_file, weights))
            })
            .collect();

        let best = scored
            .iter()
            .max_by(|a, b| {
                a.1.final_score
                    .partial_cmp(&b.1.final_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.0.cmp(&a.0)) // ties: lowest identifier wins
            })
            .cloned();

        // 7. Decision.
        let thresholds = *self.thresholds.read().unwrap();
        let (result, breakdown) = match &best {
            Some((original_id, breakdown)) => {
                let kind = ranker::decide(breakdown.final_score, thresholds);
                let original_id = if kind == DecisionKind::Unique { None } else { Some(*original_id) };
                (
                    CheckResult {
                        kind,
                        confidence: breakdown.final_score,
                        original_id,
                    },
                    Some(breakdown.clone()),
                )
            }
            None => (
                CheckResult {
                    kind: DecisionKind::Unique,
                    confidence: 0.0,
                    original_id: None,
                },
                None,
            ),
        };

        if !options.dry_run {
            // 8. Indexing.
            let record = Record {
                id: descriptor.id,
                title: sanitized.title,
                description: sanitized.description,
                files: sanitized.files,
                text_embedding: text_vec,
                diff_embedding: diff_vec,
                created_at: now_millis(),
            };
            self.mirror.write().unwrap().insert(record.id, record.clone());
            if let Some(storage) = &self.storage {
                if let Err(e) = storage.save(&record).await {
                    warn!(id = record.id, error = %e, "check: storage save failed, in-memory mirror remains authoritative");
                }
            }
            if result.kind == DecisionKind::Duplicate {
                if let Some(original_id) = result.original_id {
                    self.attribution.add_edge(descriptor.id, original_id);
                }
            }

            // 9. Analytics.
            if let Some(storage) = &self.storage {
                let check_record = crate::storage::CheckRecord {
                    id: descriptor.id,
                    result_type: result_type_name(result.kind).to_string(),
                    original_id: result.original_id,
                    confidence: result.confidence,
                    timestamp_ms: now_millis(),
                };
                if let Err(e) = storage.save_check(&check_record).await {
                    debug!(id = descriptor.id, error = %e, "check: save_check failed (non-fatal)");
                }
            }
        }

        Ok(DetailedCheckResult { result, breakdown })
    }

    async fn embed_both(&self, sanitized: &Sanitized) -> Result<(Vec<f32>, Vec<f32>)> {
        let text_input = format!("{}\n{}", sanitized.title, sanitized.description);
        let text_vec = if self.config.enable_cache {
            if let Some(hit) = self.text_cache.get(&text_input) {
                hit
            } else {
                let v = self.embedder.embed_text(&text_input).await?;
                if v.is_empty() {
                    return Err(DetectorError::embedding("text embedder returned an empty vector"));
                }
                self.text_cache.insert(text_input, v.clone());
                v
            }
        } else {
            let v = self.embedder.embed_text(&text_input).await?;
            if v.is_empty() {
                return Err(DetectorError::embedding("text embedder returned an empty vector"));
            }
            v
        };

        let diff_vec = if self.config.enable_cache {
            if let Some(hit) = self.diff_cache.get(&sanitized.diff) {
                hit
            } else {
                let v = self.embedder.embed_diff(&sanitized.diff).await?;
                if v.is_empty() {
                    return Err(DetectorError::embedding("diff embedder returned an empty vector"));
                }
                self.diff_cache.insert(sanitized.diff.clone(), v.clone());
                v
            }
        } else {
            let v = self.embedder.embed_diff(&sanitized.diff).await?;
            if v.is_empty() {
                return Err(DetectorError::embedding("diff embedder returned an empty vector"));
            }
            v
        };

        Ok((text_vec, diff_vec))
    }

    /// Storage search when available, falling back to an in-memory full
    /// scan on absence or on a storage error (logged).
    async fn retrieve_candidates(&self, text_vec: &[f32]) -> Vec<(i64, Record)> {
        let k = self.config.max_candidates;
        if let Some(storage) = &self.storage {
            match storage.search(text_vec, k).await {
                Ok(hits) => return self.hydrate_hits(hits).await,
                Err(e) => {
                    warn!(error = %e, "candidate retrieval: storage search failed, degrading to in-memory scan");
                }
            }
        }
        self.full_scan_candidates(text_vec, k)
    }

    fn full_scan_candidates(&self, text_vec: &[f32], k: usize) -> Vec<(i64, Record)> {
        let mirror = self.mirror.read().unwrap();
        let mut scored: Vec<(i64, f32)> = mirror
            .par_iter()
            .map(|(id, record)| (*id, crate::vector_math::cosine(text_vec, &record.text_embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(k)
            .filter_map(|(id, _)| mirror.get(&id).map(|r| (id, r.clone())))
            .collect()
    }

    async fn hydrate_hits(&self, hits: Vec<StorageSearchHit>) -> Vec<(i64, Record)> {
        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Some(record) = self.mirror.read().unwrap().get(&hit.id).cloned() {
                out.push((hit.id, record));
                continue;
            }
            if let Some(storage) = &self.storage {
                if let Ok(Some(record)) = storage.get(hit.id).await {
                    out.push((hit.id, record));
                }
            }
        }
        out
    }

    /// Upper bound of 1000 descriptors per call. Descriptors are processed
    /// in input order and the result ordering mirrors it; a failed item is
    /// captured as a zero-confidence unique result rather than aborting.
    #[instrument(skip(self, descriptors))]
    pub async fn check_many(
        &self,
        descriptors: &[Descriptor],
        options: CheckOptions,
    ) -> Result<Vec<BatchCheckItem>> {
        if descriptors.len() > MAX_BATCH_SIZE {
            return Err(DetectorError::invalid_input(format!(
                "check_many accepts at most {MAX_BATCH_SIZE} descriptors"
            )));
        }
        let mut out = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let start = Instant::now();
            let result = match self.check(descriptor, options).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(id = descriptor.id, error = %e, "check_many: item failed, recorded as unique/0");
                    CheckResult {
                        kind: DecisionKind::Unique,
                        confidence: 0.0,
                        original_id: None,
                    }
                }
            };
            out.push(BatchCheckItem {
                id: descriptor.id,
                result,
                processing_ms: start.elapsed().as_millis() as u64,
            });
        }
        Ok(out)
    }

    /// Embeds the query via `embed_text` only (the diff embedder is not
    /// used), then delegates to candidate retrieval and hydrates each hit.
    pub async fn search(&self, query_text: &str, k: usize) -> Result<Vec<SearchResultItem>> {
        let text_vec = if self.config.enable_cache {
            if let Some(hit) = self.text_cache.get(query_text) {
                hit
            } else {
                let v = self.embedder.embed_text(query_text).await?;
                if v.is_empty() {
                    return Err(DetectorError::embedding("text embedder returned an empty vector"));
                }
                self.text_cache.insert(query_text.to_string(), v.clone());
                v
            }
        } else {
            let v = self.embedder.embed_text(query_text).await?;
            if v.is_empty() {
                return Err(DetectorError::embedding("text embedder returned an empty vector"));
            }
            v
        };

        let k = k.max(1);
        let candidates = self.retrieve_candidates_for_search(&text_vec, k).await;
        let mut results = Vec::with_capacity(candidates.len());
        for (id, record, score) in candidates {
            results.push(SearchResultItem {
                id,
                score,
                title: record.title,
                description: record.description,
                created_at: record.created_at,
                files: record.files,
            });
        }
        Ok(results)
    }

    async fn retrieve_candidates_for_search(&self, text_vec: &[f32], k: usize) -> Vec<(i64, Record, f32)> {
        if let Some(storage) = &self.storage {
            match storage.search(text_vec, k).await {
                Ok(hits) => {
                    let mut out = Vec::with_capacity(hits.len());
                    for hit in hits {
                        if let Some(record) = self.mirror.read().unwrap().get(&hit.id).cloned() {
                            out.push((hit.id, record, hit.score));
                            continue;
                        }
                        if let Ok(Some(record)) = storage.get(hit.id).await {
                            out.push((hit.id, record, hit.score));
                        }
                    }
                    return out;
                }
                Err(e) => {
                    warn!(error = %e, "search: storage search failed, degrading to in-memory scan");
                }
            }
        }
        let mirror = self.mirror.read().unwrap();
        let mut scored: Vec<(i64, f32)> = mirror
            .par_iter()
            .map(|(id, record)| (*id, crate::vector_math::cosine(text_vec, &record.text_embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(k)
            .filter_map(|(id, score)| mirror.get(&id).map(|r| (id, r.clone(), score)))
            .collect()
    }

    pub fn set_weights(&self, weights: Weights) -> Result<()> {
        let validated = weights.validated()?;
        *self.weights.write().unwrap() = validated;
        Ok(())
    }

    pub fn get_weights(&self) -> Weights {
        *self.weights.read().unwrap()
    }

    pub fn get_thresholds(&self) -> Thresholds {
        *self.thresholds.read().unwrap()
    }

    /// Independent of the storage back-end: records currently mirrored plus
    /// the bloom export.
    pub fn export_state(&self) -> SnapshotDocument {
        let records: Vec<Record> = self.mirror.read().unwrap().values().cloned().collect();
        let bloom = self.bloom.lock().unwrap().export();
        SnapshotDocument { records, bloom }
    }

    /// Repopulates the mirror and the bloom only; never writes to storage.
    pub fn import_state(&self, doc: SnapshotDocument) -> Result<()> {
        let mut mirror = self.mirror.write().unwrap();
        mirror.clear();
        for record in doc.records {
            mirror.insert(record.id, record);
        }
        drop(mirror);
        self.bloom.lock().unwrap().import(&doc.bloom)
    }

    pub fn get_stats(&self) -> Stats {
        let bloom = self.bloom.lock().unwrap();
        Stats {
            total_prs: self.mirror.read().unwrap().len(),
            bloom_size: bloom.len_bits(),
            duplicate_pairs: self.attribution.edge_count(),
            storage_backend_name: self
                .storage
                .as_ref()
                .map(|s| s.backend_name().to_string())
                .unwrap_or_else(|| "none".to_string()),
        }
    }

    pub fn attribution(&self) -> &AttributionGraph {
        &self.attribution
    }

    pub async fn close(&self) -> Result<()> {
        if let Some(storage) = &self.storage {
            storage.close().await?;
        }
        Ok(())
    }
}

fn result_type_name(kind: DecisionKind) -> &'static str {
    match kind {
        DecisionKind::Duplicate => "duplicate",
        DecisionKind::Possible => "possible",
        DecisionKind::Unique => "unique",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::LocalEmbedder;
    use crate::storage::MemoryStorage;

    fn descriptor(id: i64, title: &str, description: &str, files: &[&str]) -> Descriptor {
        Descriptor {
            id,
            title: title.to_string(),
            description: description.to_string(),
            files: files.iter().map(|s| s.to_string()).collect(),
            diff: Some(String::new()),
        }
    }

    async fn fresh_detector() -> Detector {
        let embedder = Arc::new(LocalEmbedder::new(128));
        let storage = Arc::new(MemoryStorage::new());
        let detector = Detector::new(embedder, Some(storage), DetectorConfig::default()).unwrap();
        detector.init().await.unwrap();
        detector
    }

    #[tokio::test]
    async fn first_ever_descriptor_is_unique() {
        let d = fresh_detector().await;
        let result = d
            .check(
                &descriptor(1, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
                CheckOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.kind, DecisionKind::Unique);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(d.get_stats().total_prs, 1);
    }

    #[tokio::test]
    async fn exact_replay_is_flagged_duplicate() {
        let d = fresh_detector().await;
        d.check(
            &descriptor(1, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
            CheckOptions::default(),
        )
        .await
        .unwrap();
        let result = d
            .check(
                &descriptor(2, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
                CheckOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.kind, DecisionKind::Duplicate);
        assert_eq!(result.original_id, Some(1));
        assert!(result.confidence >= 0.90);
        assert_eq!(d.attribution().root(2), 1);
    }

    #[tokio::test]
    async fn unrelated_descriptor_is_unique() {
        let d = fresh_detector().await;
        d.check(
            &descriptor(1, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
            CheckOptions::default(),
        )
        .await
        .unwrap();
        let result = d
            .check(
                &descriptor(4, "Add dark mode to dashboard", "CSS variables and toggle", &["ui/theme.css", "components/Navbar.tsx"]),
                CheckOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.kind, DecisionKind::Unique);
        assert!(result.confidence < 0.82);
    }

    #[tokio::test]
    async fn dry_run_preserves_state() {
        let d = fresh_detector().await;
        d.check(
            &descriptor(1, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
            CheckOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(d.get_stats().total_prs, 1);

        d.check(&descriptor(5, "Test", "x", &["a.ts"]), CheckOptions { dry_run: true })
            .await
            .unwrap();
        assert_eq!(d.get_stats().total_prs, 1);
    }

    #[tokio::test]
    async fn invalid_input_does_not_mutate_state() {
        let d = fresh_detector().await;
        let bad = descriptor(1, "", "d", &[]);
        let err = d.check(&bad, CheckOptions::default()).await.unwrap_err();
        assert!(matches!(err, DetectorError::InvalidInput(_)));
        assert_eq!(d.get_stats().total_prs, 0);
    }

    #[tokio::test]
    async fn negative_id_is_rejected() {
        let d = fresh_detector().await;
        let bad = descriptor(-1, "t", "d", &[]);
        assert!(d.check(&bad, CheckOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn title_of_500_is_accepted_501_is_rejected() {
        let d = fresh_detector().await;
        let ok = descriptor(1, &"a".repeat(500), "d", &[]);
        assert!(d.check(&ok, CheckOptions::default()).await.is_ok());
        let too_long = descriptor(2, &"a".repeat(501), "d", &[]);
        assert!(d.check(&too_long, CheckOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn files_over_1000_is_rejected() {
        let d = fresh_detector().await;
        let files: Vec<String> = (0..1001).map(|i| format!("f{i}.rs")).collect();
        let bad = Descriptor {
            id: 1,
            title: "t".into(),
            description: "d".into(),
            files,
            diff: None,
        };
        assert!(d.check(&bad, CheckOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn check_many_rejects_over_1000_items() {
        let d = fresh_detector().await;
        let items: Vec<Descriptor> = (0..1001).map(|i| descriptor(i + 1, "t", "d", &[])).collect();
        assert!(d.check_many(&items, CheckOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn check_many_preserves_order_and_survives_bad_items() {
        let d = fresh_detector().await;
        let items = vec![
            descriptor(1, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
            Descriptor {
                id: 2,
                title: String::new(),
                description: String::new(),
                files: vec![],
                diff: None,
            },
            descriptor(3, "Add dark mode", "css", &["ui/theme.css"]),
        ];
        let results = d.check_many(&items, CheckOptions::default()).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, 1);
        assert_eq!(results[1].id, 2);
        assert_eq!(results[1].result.kind, DecisionKind::Unique);
        assert_eq!(results[1].result.confidence, 0.0);
        assert_eq!(results[2].id, 3);
    }

    #[tokio::test]
    async fn search_ranks_by_semantic_similarity() {
        let d = fresh_detector().await;
        d.check(
            &descriptor(1, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
            CheckOptions::default(),
        )
        .await
        .unwrap();
        d.check(
            &descriptor(4, "Add dark mode to dashboard", "CSS variables", &["ui/theme.css"]),
            CheckOptions::default(),
        )
        .await
        .unwrap();
        let hits = d.search("login password bug", 5).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].id, 1);
    }

    #[tokio::test]
    async fn snapshot_round_trip_preserves_decision_outcomes() {
        let d = fresh_detector().await;
        d.check(
            &descriptor(1, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
            CheckOptions::default(),
        )
        .await
        .unwrap();
        d.check(
            &descriptor(4, "Add dark mode to dashboard", "CSS variables and toggle", &["ui/theme.css"]),
            CheckOptions::default(),
        )
        .await
        .unwrap();

        let snapshot = d.export_state();
        let total_before = d.get_stats().total_prs;

        let fresh_embedder = Arc::new(LocalEmbedder::new(128));
        let restored = Detector::new(fresh_embedder, None, DetectorConfig::default()).unwrap();
        restored.import_state(snapshot).unwrap();

        assert_eq!(restored.get_stats().total_prs, total_before);

        let replay = restored
            .check(
                &descriptor(2, "Fix login bug", "Handle empty passwords", &["auth/login.ts"]),
                CheckOptions { dry_run: true },
            )
            .await
            .unwrap();
        assert_eq!(replay.kind, DecisionKind::Duplicate);
        assert_eq!(replay.original_id, Some(1));
    }

    #[tokio::test]
    async fn set_weights_rejects_all_zero() {
        let d = fresh_detector().await;
        assert!(d
            .set_weights(Weights {
                text: 0.0,
                diff: 0.0,
                file: 0.0
            })
            .is_err());
    }

    #[tokio::test]
    async fn set_weights_normalizes_and_get_weights_reflects_it() {
        let d = fresh_detector().await;
        d.set_weights(Weights {
            text: 1.0,
            diff: 1.0,
            file: 0.0,
        })
        .unwrap();
        let w = d.get_weights();
        assert!((w.text + w.diff + w.file - 1.0).abs() < 1e-3);
        assert!((w.text - 0.5).abs() < 1e-6);
    }

    #[test]
    fn sanitize_file_path_strips_traversal_and_backslashes() {
        assert_eq!(sanitize_file_path("/a/../b\\c.rs"), "a/b/c.rs");
        assert_eq!(sanitize_file_path("../../etc/passwd"), "etc/passwd");
    }

    #[test]
    fn sanitize_text_strips_control_bytes_only() {
        let dirty = "title\u{0001}\u{007F}ok";
        assert_eq!(sanitize_text(dirty), "titleok");
    }
}
