//! In-memory doubles for handler tests.

use super::admin::SharedSecretChecker;
use crate::{
    api::state::{AppConfig, AppState},
    captcha::{CaptchaError, CaptchaOutcome, CaptchaVerifier},
    rate_limit::{ManualClock, MemoryRateLimiter},
    storage::{
        AnalyticsStore, AnalyticsSummary, AuditEntry, AuditRecord, AuditStore, CaseRecord,
        CaseStore, CaseUpdate, CaseUpsert, ConsentRecord, ConsentStore, ContentEntry,
        ContentStore, LabelCount, NewConsent, NewEvent, Stores,
    },
    BoxFuture,
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};
use uuid::Uuid;

pub const CLIENT_IP: &str = "203.0.113.7";
pub const ADMIN_SECRET: &str = "correct-horse-battery-staple";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct FakeStore {
    consents: Mutex<Vec<ConsentRecord>>,
    cases: Mutex<Vec<CaseRecord>>,
    content: Mutex<BTreeMap<String, ContentEntry>>,
    audit: Mutex<Vec<AuditRecord>>,
    events: Mutex<Vec<NewEvent>>,
    fail_case_lookup: AtomicBool,
    fail_case_link: AtomicBool,
    fail_consent_insert: AtomicBool,
    fail_audit: AtomicBool,
    fail_events: AtomicBool,
}

impl FakeStore {
    pub fn add_case(&self, numero_processo: &str, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        lock(&self.cases).push(CaseRecord {
            id,
            numero_processo: numero_processo.to_string(),
            reu: "Banco Exemplo S.A.".to_string(),
            nome: None,
            email: Some(email.to_string()),
            consent_id: None,
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub fn set_content(&self, key: &str, value: &str) {
        lock(&self.content).insert(
            key.to_string(),
            ContentEntry {
                key: key.to_string(),
                value: value.to_string(),
                updated_at: Utc::now(),
            },
        );
    }

    pub fn fail_case_lookup(&self, fail: bool) {
        self.fail_case_lookup.store(fail, Ordering::SeqCst);
    }

    pub fn fail_case_link(&self, fail: bool) {
        self.fail_case_link.store(fail, Ordering::SeqCst);
    }

    pub fn fail_consent_insert(&self, fail: bool) {
        self.fail_consent_insert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_audit(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_events(&self, fail: bool) {
        self.fail_events.store(fail, Ordering::SeqCst);
    }

    pub fn consents(&self) -> Vec<ConsentRecord> {
        lock(&self.consents).clone()
    }

    pub fn cases(&self) -> Vec<CaseRecord> {
        lock(&self.cases).clone()
    }

    pub fn linked_consent(&self, case_id: Uuid) -> Option<Uuid> {
        lock(&self.cases)
            .iter()
            .find(|case| case.id == case_id)
            .and_then(|case| case.consent_id)
    }

    pub fn audit_entries(&self) -> Vec<AuditRecord> {
        lock(&self.audit).clone()
    }

    pub fn audit_outcomes(&self) -> Vec<String> {
        lock(&self.audit)
            .iter()
            .map(|record| record.outcome.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<NewEvent> {
        lock(&self.events).clone()
    }
}

impl ConsentStore for FakeStore {
    fn insert<'a>(&'a self, consent: &'a NewConsent) -> BoxFuture<'a, Result<Uuid>> {
        Box::pin(async move {
            if self.fail_consent_insert.load(Ordering::SeqCst) {
                return Err(anyhow!("consent insert failed"));
            }
            let id = Uuid::now_v7();
            lock(&self.consents).push(ConsentRecord {
                id,
                cpf: consent.cpf.clone(),
                name: consent.name.clone(),
                email: consent.email.clone(),
                phone: consent.phone.clone(),
                accepted_terms: true,
                terms_version: consent.terms_version.clone(),
                terms_hash: consent.terms_hash.clone(),
                ip: consent.ip.clone(),
                user_agent: consent.user_agent.clone(),
                source_campaign: consent.source_campaign.clone(),
                created_at: Utc::now(),
            });
            Ok(id)
        })
    }

    fn list(&self, limit: i64, offset: i64) -> BoxFuture<'_, Result<Vec<ConsentRecord>>> {
        Box::pin(async move {
            let mut all = lock(&self.consents).clone();
            all.reverse();
            Ok(page(all, limit, offset))
        })
    }

    fn export(&self) -> BoxFuture<'_, Result<Vec<ConsentRecord>>> {
        Box::pin(async move { Ok(lock(&self.consents).clone()) })
    }
}

impl CaseStore for FakeStore {
    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<CaseRecord>>> {
        Box::pin(async move {
            if self.fail_case_lookup.load(Ordering::SeqCst) {
                return Err(anyhow!("case lookup failed"));
            }
            Ok(lock(&self.cases)
                .iter()
                .find(|case| {
                    case.email
                        .as_deref()
                        .is_some_and(|stored| stored.eq_ignore_ascii_case(email))
                })
                .cloned())
        })
    }

    fn link_consent(&self, case_id: Uuid, consent_id: Uuid) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.fail_case_link.load(Ordering::SeqCst) {
                return Err(anyhow!("case link failed"));
            }
            if let Some(case) = lock(&self.cases).iter_mut().find(|case| case.id == case_id) {
                case.consent_id = Some(consent_id);
            }
            Ok(())
        })
    }

    fn list(&self, limit: i64, offset: i64) -> BoxFuture<'_, Result<Vec<CaseRecord>>> {
        Box::pin(async move {
            let mut all = lock(&self.cases).clone();
            all.sort_by(|a, b| a.numero_processo.cmp(&b.numero_processo));
            Ok(page(all, limit, offset))
        })
    }

    fn update<'a>(
        &'a self,
        numero_processo: &'a str,
        update: &'a CaseUpdate,
    ) -> BoxFuture<'a, Result<Option<CaseRecord>>> {
        Box::pin(async move {
            let mut cases = lock(&self.cases);
            let Some(case) = cases
                .iter_mut()
                .find(|case| case.numero_processo == numero_processo)
            else {
                return Ok(None);
            };
            if let Some(reu) = &update.reu {
                case.reu.clone_from(reu);
            }
            if let Some(nome) = &update.nome {
                case.nome = Some(nome.clone());
            }
            if let Some(email) = &update.email {
                case.email = Some(email.clone());
            }
            case.updated_at = Utc::now();
            Ok(Some(case.clone()))
        })
    }

    fn upsert_batch<'a>(&'a self, rows: &'a [CaseUpsert]) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let rows = crate::storage::dedupe_batch(rows);
            let mut cases = lock(&self.cases);
            let now = Utc::now();
            for row in &rows {
                if let Some(case) = cases
                    .iter_mut()
                    .find(|case| case.numero_processo == row.numero_processo)
                {
                    case.reu.clone_from(&row.reu);
                    case.nome.clone_from(&row.nome);
                    case.email.clone_from(&row.email);
                    case.updated_at = now;
                } else {
                    cases.push(CaseRecord {
                        id: Uuid::new_v4(),
                        numero_processo: row.numero_processo.clone(),
                        reu: row.reu.clone(),
                        nome: row.nome.clone(),
                        email: row.email.clone(),
                        consent_id: None,
                        created_at: now,
                        updated_at: now,
                    });
                }
            }
            Ok(u64::try_from(rows.len()).unwrap_or(u64::MAX))
        })
    }

    fn delete<'a>(&'a self, numero_processo: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut cases = lock(&self.cases);
            let before = cases.len();
            cases.retain(|case| case.numero_processo != numero_processo);
            Ok(cases.len() != before)
        })
    }
}

impl ContentStore for FakeStore {
    fn list(&self) -> BoxFuture<'_, Result<Vec<ContentEntry>>> {
        Box::pin(async move { Ok(lock(&self.content).values().cloned().collect()) })
    }

    fn upsert<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a, Result<ContentEntry>> {
        Box::pin(async move {
            let entry = ContentEntry {
                key: key.to_string(),
                value: value.to_string(),
                updated_at: Utc::now(),
            };
            lock(&self.content).insert(key.to_string(), entry.clone());
            Ok(entry)
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(lock(&self.content).remove(key).is_some()) })
    }
}

impl AuditStore for FakeStore {
    fn append<'a>(&'a self, entry: &'a AuditEntry) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.fail_audit.load(Ordering::SeqCst) {
                return Err(anyhow!("audit insert failed"));
            }
            let mut audit = lock(&self.audit);
            let id = i64::try_from(audit.len()).unwrap_or(i64::MAX) + 1;
            audit.push(AuditRecord {
                id,
                action: entry.action.clone(),
                outcome: entry.outcome.as_str().to_string(),
                ip: entry.ip.clone(),
                user_agent: entry.user_agent.clone(),
                details: entry.details.clone(),
                created_at: Utc::now(),
            });
            Ok(())
        })
    }

    fn list(&self, limit: i64) -> BoxFuture<'_, Result<Vec<AuditRecord>>> {
        Box::pin(async move {
            let mut all = lock(&self.audit).clone();
            all.reverse();
            Ok(page(all, limit, 0))
        })
    }
}

impl AnalyticsStore for FakeStore {
    fn record_event<'a>(&'a self, event: &'a NewEvent) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.fail_events.load(Ordering::SeqCst) {
                return Err(anyhow!("event insert failed"));
            }
            lock(&self.events).push(event.clone());
            Ok(())
        })
    }

    fn summary(&self, since: DateTime<Utc>) -> BoxFuture<'_, Result<AnalyticsSummary>> {
        Box::pin(async move {
            let consents: Vec<ConsentRecord> = lock(&self.consents)
                .iter()
                .filter(|consent| consent.created_at >= since)
                .cloned()
                .collect();
            let events = lock(&self.events).clone();

            let mut by_campaign: BTreeMap<String, i64> = BTreeMap::new();
            for consent in &consents {
                *by_campaign.entry(consent.source_campaign.clone()).or_default() += 1;
            }
            let mut by_type: BTreeMap<String, i64> = BTreeMap::new();
            for event in &events {
                *by_type.entry(event.evento_tipo.clone()).or_default() += 1;
            }

            Ok(AnalyticsSummary {
                total_consents: i64::try_from(consents.len()).unwrap_or(i64::MAX),
                total_events: i64::try_from(events.len()).unwrap_or(i64::MAX),
                consents_by_campaign: labelled(by_campaign),
                events_by_type: labelled(by_type),
                ..AnalyticsSummary::default()
            })
        })
    }
}

fn labelled(counts: BTreeMap<String, i64>) -> Vec<LabelCount> {
    counts
        .into_iter()
        .map(|(label, total)| LabelCount { label, total })
        .collect()
}

fn page<T>(all: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(0);
    let limit = usize::try_from(limit).unwrap_or(0);
    all.into_iter().skip(offset).take(limit).collect()
}

/// Captcha double that answers with a preset outcome and counts calls.
pub struct FakeCaptcha {
    outcome: Mutex<Result<CaptchaOutcome, CaptchaError>>,
    calls: AtomicUsize,
}

impl Default for FakeCaptcha {
    fn default() -> Self {
        Self {
            outcome: Mutex::new(Ok(CaptchaOutcome::Verified)),
            calls: AtomicUsize::new(0),
        }
    }
}

impl FakeCaptcha {
    pub fn set(&self, outcome: Result<CaptchaOutcome, CaptchaError>) {
        *lock(&self.outcome) = outcome;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CaptchaVerifier for FakeCaptcha {
    fn verify<'a>(
        &'a self,
        _token: &'a str,
        _remote_ip: Option<&'a str>,
    ) -> BoxFuture<'a, Result<CaptchaOutcome, CaptchaError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = lock(&self.outcome).clone();
        Box::pin(async move { outcome })
    }
}

pub struct TestContext {
    pub state: Arc<AppState>,
    pub store: Arc<FakeStore>,
    pub captcha: Arc<FakeCaptcha>,
    pub limiter: Arc<MemoryRateLimiter>,
    pub clock: ManualClock,
}

impl TestContext {
    pub fn new() -> Self {
        Self::build(|config| config, Some(ADMIN_SECRET))
    }

    pub fn with_config(configure: impl FnOnce(AppConfig) -> AppConfig) -> Self {
        Self::build(configure, Some(ADMIN_SECRET))
    }

    pub fn without_admin_secret() -> Self {
        Self::build(|config| config, None)
    }

    fn build(configure: impl FnOnce(AppConfig) -> AppConfig, admin_secret: Option<&str>) -> Self {
        let store = Arc::new(FakeStore::default());
        let captcha = Arc::new(FakeCaptcha::default());
        let clock = ManualClock::default();
        let limiter = Arc::new(MemoryRateLimiter::with_clock(Arc::new(clock.clone())));
        let stores = Stores {
            consents: store.clone(),
            cases: store.clone(),
            content: store.clone(),
            audit: store.clone(),
            analytics: store.clone(),
        };
        let credentials = SharedSecretChecker::new(
            admin_secret.map(|secret| SecretString::from(secret.to_string())),
        );
        let state = Arc::new(AppState::new(
            configure(AppConfig::new()),
            stores,
            captcha.clone(),
            limiter.clone(),
            Arc::new(credentials),
        ));
        Self {
            state,
            store,
            captcha,
            limiter,
            clock,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

/// Poll until `check` holds; background tasks finish on their own schedule.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
