//! In-memory stand-ins for every collaborator, shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use crate::background::brand_refresh::RefreshQueue;
use crate::context::models::RawGenerationInput;
use crate::context::sources::CatalogSource;
use crate::generation::quota::{QuotaDecision, QuotaPolicy, QuotaStore};
use crate::generation::usage::UsageLedger;
use crate::generation::store::{GenerationStore, GenerationUpdate, NewGeneration};
use crate::jobs::state::JobState;
use crate::jobs::store::{FinalizedJob, JobFinal, JobStore};
use crate::media::{MediaBlob, MediaStore};
use crate::model_client::{
    GenerativeModel, ModelError, ModelOutput, ModelRequest, PatternExtraction, ProviderJobState,
    ProviderJobStatus,
};
use crate::models::application::{ApplicationHistoryRow, NewApplication};
use crate::models::catalog::{BrandDnaRow, BrandProfileRow, ProductRow, TemplateRow};
use crate::models::generation::{GenerationJobRow, GenerationRecord, GenerationStatus, MediaKind};
use crate::models::pattern::{
    ColorPattern, ContrastLevel, EngagementTier, ExtractedPatternData, HookPattern, HookType,
    ImageStyle, LayoutPattern, LayoutStructure, LearnedPattern, NewLearnedPattern, VisualPattern,
};
use crate::models::performance::PerformanceRecord;
use crate::models::upload::{UploadRecord, UploadStatus};
use crate::models::user::UserTier;
use crate::patterns::store::{NewUpload, PatternStore, UploadStore, UploadUpdate};
use crate::performance::store::{NewPerformanceRecord, PerformanceStore};
use crate::publish::credentials::{CredentialSource, PlatformCredential};
use crate::publish::transport::{
    PlatformRequest, PlatformResponse, PlatformTransport, TransportError,
};

// ────────────────────────────────────────────────────────────────────────────
// Fixtures
// ────────────────────────────────────────────────────────────────────────────

/// A structural description with no literal copy in it.
pub fn sample_pattern_data() -> ExtractedPatternData {
    ExtractedPatternData {
        layout: LayoutPattern {
            structure: LayoutStructure::SplitScreen,
            text_placement: "Headline top left, logo bottom right".to_string(),
            visual_hierarchy: "Product first, then headline, then call to action".to_string(),
        },
        color: ColorPattern {
            palette: vec![
                "soft peach".to_string(),
                "cream".to_string(),
                "deep green".to_string(),
            ],
            mood: "calm and premium".to_string(),
            contrast: ContrastLevel::Medium,
        },
        hook: HookPattern {
            hook_type: HookType::Benefit,
            headline_style: "Short benefit-led statement in sentence case".to_string(),
            cta_style: "Understated text link under the headline".to_string(),
        },
        visual: VisualPattern {
            image_style: ImageStyle::StudioProduct,
            human_presence: false,
            product_prominence: "Product fills the right half".to_string(),
            composition_notes: "Generous negative space around the bottle".to_string(),
        },
    }
}

/// An active instagram/skincare pattern in the top-5 tier that has never been used.
pub fn sample_pattern(user_id: Uuid) -> LearnedPattern {
    let data = sample_pattern_data();
    let now = Utc::now();
    LearnedPattern {
        id: Uuid::new_v4(),
        user_id,
        category: "skincare".to_string(),
        platform: "instagram".to_string(),
        industry: Some("beauty".to_string()),
        layout_pattern: Json(data.layout),
        color_pattern: Json(data.color),
        hook_pattern: Json(data.hook),
        visual_pattern: Json(data.visual),
        engagement_tier: EngagementTier::Top5.as_str().to_string(),
        confidence_score: 0.9,
        source_hash: Uuid::new_v4().simple().to_string(),
        usage_count: 0,
        last_used_at: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn raw_input(user_id: Uuid, product_id: Uuid, platform: &str) -> RawGenerationInput {
    RawGenerationInput {
        user_id,
        product_id,
        template_id: None,
        platform: platform.to_string(),
        media_type: MediaKind::Image,
        aspect_ratio: None,
        resolution: None,
        uploaded_images: Vec::new(),
        pattern_ids: Vec::new(),
        use_learned_patterns: None,
        user_prompt: None,
    }
}

fn tier_rank(tier: &str) -> u8 {
    match EngagementTier::parse(tier) {
        EngagementTier::Top1 => 0,
        EngagementTier::Top5 => 1,
        EngagementTier::Top10 => 2,
        EngagementTier::Top25 => 3,
        EngagementTier::Average => 4,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MemoryStore
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Tables {
    products: HashMap<Uuid, ProductRow>,
    templates: HashMap<Uuid, TemplateRow>,
    brand_profiles: HashMap<Uuid, BrandProfileRow>,
    brand_dna: HashMap<Uuid, BrandDnaRow>,
    tiers: HashMap<Uuid, UserTier>,
    patterns: Vec<LearnedPattern>,
    applications: Vec<ApplicationHistoryRow>,
    uploads: HashMap<Uuid, UploadRecord>,
    generations: Vec<GenerationRecord>,
    jobs: Vec<GenerationJobRow>,
    performance: Vec<PerformanceRecord>,
    credentials: HashMap<Uuid, PlatformCredential>,
    media: HashMap<String, MediaBlob>,
}

/// One in-memory database behind every store trait.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    pub fail_brand_dna: AtomicBool,
    pub fail_patterns: AtomicBool,
    pub fail_create_job: AtomicBool,
    /// Number of upcoming terminal job writes that fail.
    pub fail_finalize: AtomicUsize,
}

impl MemoryStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    pub fn add_product(&self, user_id: Uuid) -> ProductRow {
        let product = ProductRow {
            id: Uuid::new_v4(),
            user_id,
            name: "Hydra Serum".to_string(),
            description: Some("Lightweight hydrating serum with hyaluronic acid".to_string()),
            category: Some("skincare".to_string()),
            image_url: Some("https://cdn.example.com/products/serum.png".to_string()),
        };
        self.tables().products.insert(product.id, product.clone());
        product
    }

    pub fn add_brand_profile(&self, user_id: Uuid) -> BrandProfileRow {
        let profile = BrandProfileRow {
            user_id,
            brand_name: "Lumen".to_string(),
            voice: Some("warm and confident".to_string()),
            colors: vec!["#F4E1D2".to_string(), "#1F3A2E".to_string()],
            industry: Some("beauty".to_string()),
            target_audience: Some("women in their thirties".to_string()),
        };
        self.tables().brand_profiles.insert(user_id, profile.clone());
        profile
    }

    pub fn add_brand_dna(&self, user_id: Uuid) -> BrandDnaRow {
        let dna = BrandDnaRow {
            user_id,
            summary: "Clean studio shots, muted palette, calm benefit-led headlines".to_string(),
            computed_at: Utc::now(),
        };
        self.tables().brand_dna.insert(user_id, dna.clone());
        dna
    }

    pub fn add_pattern(&self, pattern: LearnedPattern) -> LearnedPattern {
        self.tables().patterns.push(pattern.clone());
        pattern
    }

    pub fn pattern(&self, pattern_id: Uuid) -> Option<LearnedPattern> {
        self.tables()
            .patterns
            .iter()
            .find(|p| p.id == pattern_id)
            .cloned()
    }

    pub fn applications(&self) -> Vec<ApplicationHistoryRow> {
        self.tables().applications.clone()
    }

    /// Inserts a generation directly in `status`. Completed ones carry an image URL.
    pub fn add_generation(&self, user_id: Uuid, status: GenerationStatus) -> GenerationRecord {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let record = GenerationRecord {
            id,
            user_id,
            product_id: Uuid::new_v4(),
            template_id: None,
            platform: "instagram".to_string(),
            media_kind: MediaKind::Image.as_str().to_string(),
            prompt: "prompt".to_string(),
            status: status.as_str().to_string(),
            result_url: (status == GenerationStatus::Completed)
                .then(|| format!("https://cdn.example.com/generated/{id}.png")),
            result_text: None,
            error_message: None,
            applied_pattern_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.tables().generations.push(record.clone());
        record
    }

    pub fn generation(&self, generation_id: Uuid) -> Option<GenerationRecord> {
        self.tables()
            .generations
            .iter()
            .find(|g| g.id == generation_id)
            .cloned()
    }

    pub fn generations(&self) -> Vec<GenerationRecord> {
        self.tables().generations.clone()
    }

    pub fn job(&self, job_id: Uuid) -> Option<GenerationJobRow> {
        self.tables().jobs.iter().find(|j| j.id == job_id).cloned()
    }

    pub fn upload(&self, upload_id: Uuid) -> Option<UploadRecord> {
        self.tables().uploads.get(&upload_id).cloned()
    }

    pub fn performance_records(&self) -> Vec<PerformanceRecord> {
        self.tables().performance.clone()
    }

    pub fn add_credential(&self, credential: PlatformCredential) {
        self.tables()
            .credentials
            .insert(credential.account_id, credential);
    }

    pub fn add_media(&self, locator: &str, bytes: &[u8]) {
        self.tables().media.insert(
            locator.to_string(),
            MediaBlob {
                bytes: Bytes::copy_from_slice(bytes),
                content_type: "image/png".to_string(),
            },
        );
    }

    pub fn has_media(&self, locator: &str) -> bool {
        self.tables().media.contains_key(locator)
    }
}

#[async_trait]
impl CatalogSource for MemoryStore {
    async fn product(&self, user_id: Uuid, product_id: Uuid) -> Result<Option<ProductRow>> {
        Ok(self
            .tables()
            .products
            .get(&product_id)
            .filter(|p| p.user_id == user_id)
            .cloned())
    }

    async fn template(&self, template_id: Uuid) -> Result<Option<TemplateRow>> {
        Ok(self.tables().templates.get(&template_id).cloned())
    }

    async fn brand_profile(&self, user_id: Uuid) -> Result<Option<BrandProfileRow>> {
        Ok(self.tables().brand_profiles.get(&user_id).cloned())
    }

    async fn brand_dna(&self, user_id: Uuid) -> Result<Option<BrandDnaRow>> {
        if self.fail_brand_dna.load(Ordering::SeqCst) {
            return Err(anyhow!("brand_dna table unavailable"));
        }
        Ok(self.tables().brand_dna.get(&user_id).cloned())
    }

    async fn user_tier(&self, user_id: Uuid) -> Result<UserTier> {
        Ok(self
            .tables()
            .tiers
            .get(&user_id)
            .copied()
            .unwrap_or_default())
    }
}

#[async_trait]
impl PatternStore for MemoryStore {
    async fn insert_pattern(&self, new: &NewLearnedPattern) -> Result<LearnedPattern> {
        let now = Utc::now();
        let pattern = LearnedPattern {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            category: new.category.clone(),
            platform: new.platform.clone(),
            industry: new.industry.clone(),
            layout_pattern: Json(new.data.layout.clone()),
            color_pattern: Json(new.data.color.clone()),
            hook_pattern: Json(new.data.hook.clone()),
            visual_pattern: Json(new.data.visual.clone()),
            engagement_tier: new.engagement_tier.as_str().to_string(),
            confidence_score: new.confidence_score,
            source_hash: new.source_hash.clone(),
            usage_count: 0,
            last_used_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.tables().patterns.push(pattern.clone());
        Ok(pattern)
    }

    async fn find_by_hash(
        &self,
        user_id: Uuid,
        source_hash: &str,
    ) -> Result<Option<LearnedPattern>> {
        Ok(self
            .tables()
            .patterns
            .iter()
            .find(|p| p.user_id == user_id && p.is_active && p.source_hash == source_hash)
            .cloned())
    }

    async fn get_pattern(&self, user_id: Uuid, pattern_id: Uuid) -> Result<Option<LearnedPattern>> {
        if self.fail_patterns.load(Ordering::SeqCst) {
            return Err(anyhow!("learned_patterns table unavailable"));
        }
        Ok(self
            .tables()
            .patterns
            .iter()
            .find(|p| p.id == pattern_id && p.user_id == user_id)
            .cloned())
    }

    async fn active_patterns(
        &self,
        user_id: Uuid,
        platform: &str,
        category: Option<&str>,
        limit: i64,
    ) -> Result<Vec<LearnedPattern>> {
        if self.fail_patterns.load(Ordering::SeqCst) {
            return Err(anyhow!("learned_patterns table unavailable"));
        }
        let mut found: Vec<LearnedPattern> = self
            .tables()
            .patterns
            .iter()
            .filter(|p| p.user_id == user_id && p.is_active && p.platform == platform)
            .filter(|p| category.map_or(true, |c| p.category == c))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            tier_rank(&a.engagement_tier)
                .cmp(&tier_rank(&b.engagement_tier))
                .then(b.confidence_score.total_cmp(&a.confidence_score))
                .then(b.usage_count.cmp(&a.usage_count))
        });
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn list_patterns(&self, user_id: Uuid) -> Result<Vec<LearnedPattern>> {
        Ok(self
            .tables()
            .patterns
            .iter()
            .filter(|p| p.user_id == user_id && p.is_active)
            .cloned()
            .collect())
    }

    async fn update_pattern_data(
        &self,
        user_id: Uuid,
        pattern_id: Uuid,
        data: &ExtractedPatternData,
    ) -> Result<Option<LearnedPattern>> {
        let mut tables = self.tables();
        let Some(pattern) = tables
            .patterns
            .iter_mut()
            .find(|p| p.id == pattern_id && p.user_id == user_id && p.is_active)
        else {
            return Ok(None);
        };
        pattern.layout_pattern = Json(data.layout.clone());
        pattern.color_pattern = Json(data.color.clone());
        pattern.hook_pattern = Json(data.hook.clone());
        pattern.visual_pattern = Json(data.visual.clone());
        pattern.updated_at = Utc::now();
        Ok(Some(pattern.clone()))
    }

    async fn deactivate_pattern(&self, user_id: Uuid, pattern_id: Uuid) -> Result<bool> {
        let mut tables = self.tables();
        match tables
            .patterns
            .iter_mut()
            .find(|p| p.id == pattern_id && p.user_id == user_id && p.is_active)
        {
            Some(pattern) => {
                pattern.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn increment_usage(&self, pattern_ids: &[Uuid]) -> Result<()> {
        let now = Utc::now();
        for pattern in self
            .tables()
            .patterns
            .iter_mut()
            .filter(|p| pattern_ids.contains(&p.id))
        {
            pattern.usage_count += 1;
            pattern.last_used_at = Some(now);
        }
        Ok(())
    }

    async fn record_application(&self, new: &NewApplication) -> Result<ApplicationHistoryRow> {
        let row = ApplicationHistoryRow {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            pattern_id: new.pattern_id,
            generation_id: new.generation_id,
            product_id: new.product_id,
            platform: new.platform.clone(),
            prompt_used: new.prompt_used.clone(),
            rating: None,
            feedback: None,
            rated_at: None,
            created_at: Utc::now(),
        };
        self.tables().applications.push(row.clone());
        Ok(row)
    }

    async fn latest_application(
        &self,
        user_id: Uuid,
        pattern_id: Uuid,
    ) -> Result<Option<ApplicationHistoryRow>> {
        Ok(self
            .tables()
            .applications
            .iter()
            .rev()
            .find(|a| a.user_id == user_id && a.pattern_id == pattern_id)
            .cloned())
    }

    async fn rate_application(
        &self,
        application_id: Uuid,
        rating: i16,
        feedback: Option<&str>,
    ) -> Result<bool> {
        let mut tables = self.tables();
        match tables
            .applications
            .iter_mut()
            .find(|a| a.id == application_id && a.rating.is_none())
        {
            Some(row) => {
                row.rating = Some(rating);
                row.feedback = feedback.map(str::to_string);
                row.rated_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl UploadStore for MemoryStore {
    async fn create_upload(&self, new: &NewUpload) -> Result<UploadRecord> {
        let now = Utc::now();
        let record = UploadRecord {
            id: new.id,
            user_id: new.user_id,
            storage_key: new.storage_key.clone(),
            original_filename: new.original_filename.clone(),
            size_bytes: new.size_bytes,
            mime_type: new.mime_type.clone(),
            status: UploadStatus::Pending.as_str().to_string(),
            privacy_scan: None,
            pattern_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            expires_at: new.expires_at,
        };
        self.tables().uploads.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_upload(&self, upload_id: Uuid) -> Result<Option<UploadRecord>> {
        Ok(self.tables().uploads.get(&upload_id).cloned())
    }

    async fn transition_upload(
        &self,
        upload_id: Uuid,
        from: UploadStatus,
        to: UploadStatus,
        update: UploadUpdate,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let mut tables = self.tables();
        let Some(record) = tables
            .uploads
            .get_mut(&upload_id)
            .filter(|r| r.status == from.as_str())
        else {
            return Ok(false);
        };
        record.status = to.as_str().to_string();
        if update.pattern_id.is_some() {
            record.pattern_id = update.pattern_id;
        }
        if update.privacy_scan.is_some() {
            record.privacy_scan = update.privacy_scan;
        }
        if update.error_message.is_some() {
            record.error_message = update.error_message;
        }
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<UploadRecord>> {
        let mut tables = self.tables();
        let expired: Vec<Uuid> = tables
            .uploads
            .values()
            .filter(|r| r.expires_at <= now && r.status != UploadStatus::Complete.as_str())
            .map(|r| r.id)
            .collect();
        Ok(expired
            .iter()
            .filter_map(|id| tables.uploads.remove(id))
            .collect())
    }
}

#[async_trait]
impl GenerationStore for MemoryStore {
    async fn create_generation(&self, new: &NewGeneration) -> Result<GenerationRecord> {
        let now = Utc::now();
        let record = GenerationRecord {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            product_id: new.product_id,
            template_id: new.template_id,
            platform: new.platform.clone(),
            media_kind: new.media_kind.as_str().to_string(),
            prompt: new.prompt.clone(),
            status: GenerationStatus::Generating.as_str().to_string(),
            result_url: None,
            result_text: None,
            error_message: None,
            applied_pattern_ids: new.applied_pattern_ids.clone(),
            created_at: now,
            updated_at: now,
        };
        self.tables().generations.push(record.clone());
        Ok(record)
    }

    async fn get_generation(&self, generation_id: Uuid) -> Result<Option<GenerationRecord>> {
        Ok(self.generation(generation_id))
    }

    async fn update_generation(
        &self,
        generation_id: Uuid,
        status: GenerationStatus,
        update: GenerationUpdate,
    ) -> Result<()> {
        let mut tables = self.tables();
        if let Some(record) = tables.generations.iter_mut().find(|g| g.id == generation_id) {
            record.status = status.as_str().to_string();
            if update.result_url.is_some() {
                record.result_url = update.result_url;
            }
            if update.result_text.is_some() {
                record.result_text = update.result_text;
            }
            if update.error_message.is_some() {
                record.error_message = update.error_message;
            }
            record.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(
        &self,
        generation_id: Uuid,
        provider_job_id: &str,
        poll_interval_ms: i64,
    ) -> Result<GenerationJobRow> {
        if self.fail_create_job.load(Ordering::SeqCst) {
            return Err(anyhow!("job store unavailable"));
        }
        let now = Utc::now();
        let job = GenerationJobRow {
            id: Uuid::new_v4(),
            generation_id,
            provider_job_id: provider_job_id.to_string(),
            state: JobState::Queued.as_str().to_string(),
            poll_attempts: 0,
            poll_interval_ms,
            result_url: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.tables().jobs.push(job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<GenerationJobRow>> {
        Ok(self.job(job_id))
    }

    async fn open_jobs(&self) -> Result<Vec<GenerationJobRow>> {
        Ok(self
            .tables()
            .jobs
            .iter()
            .filter(|j| JobState::parse(&j.state).is_some_and(|s| !s.is_terminal()))
            .cloned()
            .collect())
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<bool> {
        let mut tables = self.tables();
        match tables
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.state == JobState::Queued.as_str())
        {
            Some(job) => {
                job.state = JobState::Processing.as_str().to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_poll(
        &self,
        job_id: Uuid,
        poll_attempts: i32,
        poll_interval_ms: i64,
    ) -> Result<()> {
        if let Some(job) = self.tables().jobs.iter_mut().find(|j| j.id == job_id) {
            job.poll_attempts = poll_attempts;
            job.poll_interval_ms = poll_interval_ms;
        }
        Ok(())
    }

    async fn finalize_job(&self, job_id: Uuid, outcome: &JobFinal) -> Result<Option<FinalizedJob>> {
        if self
            .fail_finalize
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(anyhow!("job store unavailable"));
        }
        let mut tables = self.tables();
        let Some(job) = tables
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id && JobState::parse(&j.state).is_some_and(|s| !s.is_terminal()))
        else {
            return Ok(None);
        };
        job.state = outcome.state.as_str().to_string();
        job.result_url = outcome.result_url.clone();
        job.error_message = outcome.error_message.clone();
        let generation_id = job.generation_id;

        let generation = tables
            .generations
            .iter_mut()
            .find(|g| g.id == generation_id)
            .ok_or_else(|| anyhow!("generation {generation_id} missing"))?;
        generation.status = outcome.generation_status().as_str().to_string();
        generation.result_url = outcome.result_url.clone();
        generation.error_message = outcome.error_message.clone();
        Ok(Some(FinalizedJob {
            generation_id,
            user_id: generation.user_id,
            applied_pattern_ids: generation.applied_pattern_ids.clone(),
            requested_at: generation.created_at,
        }))
    }
}

#[async_trait]
impl PerformanceStore for MemoryStore {
    async fn append_performance(&self, new: &NewPerformanceRecord) -> Result<PerformanceRecord> {
        let record = PerformanceRecord {
            id: Uuid::new_v4(),
            generation_id: new.generation_id,
            platform: new.platform.clone(),
            impressions: new.impressions,
            engagement_rate: new.engagement_rate,
            clicks: new.clicks,
            conversions: new.conversions,
            fetched_at: Utc::now(),
        };
        self.tables().performance.push(record.clone());
        Ok(record)
    }

    async fn users_pending_brand_refresh(&self) -> Result<Vec<Uuid>> {
        let tables = self.tables();
        let mut users = Vec::new();
        for record in &tables.performance {
            let Some(user_id) = tables
                .generations
                .iter()
                .find(|g| g.id == record.generation_id)
                .map(|g| g.user_id)
            else {
                continue;
            };
            let stale = tables
                .brand_dna
                .get(&user_id)
                .map_or(true, |dna| record.fetched_at > dna.computed_at);
            if stale && !users.contains(&user_id) {
                users.push(user_id);
            }
        }
        Ok(users)
    }
}

#[async_trait]
impl CredentialSource for MemoryStore {
    async fn credential(&self, account_id: Uuid) -> Result<Option<PlatformCredential>> {
        Ok(self.tables().credentials.get(&account_id).cloned())
    }
}

#[async_trait]
impl MediaStore for MemoryStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        self.tables().media.insert(
            key.to_string(),
            MediaBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.tables().media.remove(key);
        Ok(())
    }

    async fn presigned_url(&self, key: &str) -> Result<String> {
        Ok(format!("https://media.test/{key}?signature=test"))
    }

    async fn fetch(&self, locator: &str) -> Result<MediaBlob> {
        self.tables()
            .media
            .get(locator)
            .cloned()
            .ok_or_else(|| anyhow!("no media stored at {locator}"))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ScriptedModel
// ────────────────────────────────────────────────────────────────────────────

enum GenerateStep {
    Output(ModelOutput),
    ApiError(u16, String),
    Hang,
}

enum StatusStep {
    Status(ProviderJobStatus),
    ApiError(u16, String),
}

/// Answers each call with the next scripted step.
///
/// An exhausted `generate` script fails with empty content. An exhausted
/// `job_status` script reports the job as still processing.
#[derive(Default)]
pub struct ScriptedModel {
    generate: Mutex<VecDeque<GenerateStep>>,
    statuses: Mutex<VecDeque<StatusStep>>,
    extraction: Mutex<Option<PatternExtraction>>,
    hang_status: AtomicBool,
    generate_calls: AtomicUsize,
    job_status_calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn push_output(&self, output: ModelOutput) {
        self.generate.lock().unwrap().push_back(GenerateStep::Output(output));
    }

    pub fn push_api_error(&self, status: u16, message: &str) {
        self.generate
            .lock()
            .unwrap()
            .push_back(GenerateStep::ApiError(status, message.to_string()));
    }

    pub fn push_hang(&self) {
        self.generate.lock().unwrap().push_back(GenerateStep::Hang);
    }

    pub fn push_job_status(&self, status: ProviderJobStatus) {
        self.statuses.lock().unwrap().push_back(StatusStep::Status(status));
    }

    pub fn push_job_status_error(&self, status: u16, message: &str) {
        self.statuses
            .lock()
            .unwrap()
            .push_back(StatusStep::ApiError(status, message.to_string()));
    }

    /// Every `job_status` call from now on never answers.
    pub fn hang_job_status(&self) {
        self.hang_status.store(true, Ordering::SeqCst);
    }

    pub fn set_extraction(&self, extraction: PatternExtraction) {
        *self.extraction.lock().unwrap() = Some(extraction);
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn job_status_calls(&self) -> usize {
        self.job_status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, _request: &ModelRequest) -> Result<ModelOutput, ModelError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.generate.lock().unwrap().pop_front();
        match step {
            Some(GenerateStep::Output(output)) => Ok(output),
            Some(GenerateStep::ApiError(status, message)) => {
                Err(ModelError::Api { status, message })
            }
            Some(GenerateStep::Hang) => std::future::pending().await,
            None => Err(ModelError::EmptyContent),
        }
    }

    async fn job_status(&self, _provider_job_id: &str) -> Result<ProviderJobStatus, ModelError> {
        self.job_status_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_status.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        let step = self.statuses.lock().unwrap().pop_front();
        match step {
            Some(StatusStep::Status(status)) => Ok(status),
            Some(StatusStep::ApiError(status, message)) => {
                Err(ModelError::Api { status, message })
            }
            None => Ok(ProviderJobStatus {
                status: ProviderJobState::Processing,
                output_url: None,
                error: None,
            }),
        }
    }

    async fn extract_pattern(
        &self,
        _image_url: &str,
        _system: &str,
        _prompt: &str,
    ) -> Result<PatternExtraction, ModelError> {
        self.extraction
            .lock()
            .unwrap()
            .clone()
            .ok_or(ModelError::EmptyContent)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quota, refresh queue, platform transport
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryQuotaStore {
    counters: Mutex<HashMap<String, u32>>,
}

impl MemoryQuotaStore {
    /// Units held by the user across every window.
    pub fn used_by(&self, user_id: Uuid) -> u32 {
        let needle = user_id.to_string();
        self.counters
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.contains(&needle))
            .map(|(_, used)| *used)
            .sum()
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn try_consume(&self, key: &str, limit: u32, _window: Duration) -> Result<QuotaDecision> {
        let mut counters = self.counters.lock().unwrap();
        let used = counters.entry(key.to_string()).or_insert(0);
        if *used >= limit {
            return Ok(QuotaDecision::Exceeded);
        }
        *used += 1;
        Ok(QuotaDecision::Granted { used: *used })
    }

    async fn release(&self, key: &str) -> Result<()> {
        if let Some(used) = self.counters.lock().unwrap().get_mut(key) {
            *used = used.saturating_sub(1);
        }
        Ok(())
    }
}

/// Ledger over the in-memory stores with the default quota policy.
pub fn usage_ledger(store: &Arc<MemoryStore>, quota: &Arc<MemoryQuotaStore>) -> UsageLedger {
    UsageLedger::new(quota.clone(), store.clone(), QuotaPolicy::default())
}

#[derive(Default)]
pub struct MemoryRefreshQueue {
    queued: Mutex<Vec<Uuid>>,
    held: Mutex<HashSet<Uuid>>,
}

impl MemoryRefreshQueue {
    pub fn queued(&self) -> Vec<Uuid> {
        self.queued.lock().unwrap().clone()
    }

    /// Drops every hold, as if their markers expired.
    pub fn release_holds(&self) {
        self.held.lock().unwrap().clear();
    }
}

#[async_trait]
impl RefreshQueue for MemoryRefreshQueue {
    async fn enqueue(&self, user_ids: &[Uuid]) -> Result<usize> {
        let mut held = self.held.lock().unwrap();
        let mut queued = self.queued.lock().unwrap();
        let before = queued.len();
        for user_id in user_ids {
            if held.insert(*user_id) {
                queued.push(*user_id);
            }
        }
        Ok(queued.len() - before)
    }
}

pub enum Reply {
    Status { status: u16, body: String },
    Hang,
    Network(String),
}

impl Reply {
    pub fn status(status: u16, body: &str) -> Self {
        Reply::Status {
            status,
            body: body.to_string(),
        }
    }
}

/// Records every request and answers with the next scripted reply.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<PlatformRequest>>,
}

impl ScriptedTransport {
    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<PlatformRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformTransport for ScriptedTransport {
    async fn send(&self, request: PlatformRequest) -> Result<PlatformResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Status { status, body }) => Ok(PlatformResponse { status, body }),
            Some(Reply::Hang) => std::future::pending().await,
            Some(Reply::Network(message)) => Err(TransportError::Network(message)),
            None => Err(TransportError::Other("no scripted reply".to_string())),
        }
    }
}
