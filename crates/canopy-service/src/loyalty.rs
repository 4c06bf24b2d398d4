//! Loyalty service: configuration caching, accrual, redemption and reads.
//!
//! The engine in `canopy_core` is pure; this layer loads the scope's program
//! (cache first, CMS on miss), reads balances from the store, and persists
//! ledger rows through [`Store::apply_transaction`], which re-checks the
//! balance atomically.

use std::sync::Arc;

use serde::Serialize;

use canopy_core::{
    authorize_redemption, calculate_accrual, next_tier, resolve_tier, Accrual, LoyaltyAccount,
    LoyaltyConfig, LoyaltyError, LoyaltyEvent, LoyaltyTransaction, TenantScope, UserId,
};
use canopy_store::{Store, StoreError};

use crate::cache::{balance_key, config_key, TieredCache, CONFIG_PREFIX};
use crate::cms::{ContentError, ContentSource};

/// Maximum page size for ledger listings.
pub const MAX_PAGE_SIZE: usize = 100;

/// Errors from loyalty operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Business rule refusal.
    #[error(transparent)]
    Loyalty(#[from] LoyaltyError),

    /// Persistence failure (including duplicate events).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// CMS failure while loading configuration.
    #[error(transparent)]
    Content(#[from] ContentError),
}

/// Result of a successful accrual.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualOutcome {
    /// Ledger row as stored.
    pub transaction: LoyaltyTransaction,
    /// How the points were computed.
    pub accrual: Accrual,
}

/// Tier summary for status responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierSummary {
    /// Tier id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Threshold.
    pub min_points: i64,
    /// Accrual multiplier.
    pub multiplier: f64,
}

/// Next tier and the distance to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextTierSummary {
    /// Tier id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Threshold.
    pub min_points: i64,
    /// Points still needed.
    pub points_needed: i64,
}

/// A reward with the caller's eligibility.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardStatus {
    /// Reward id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Price in points.
    pub cost_points: i64,
    /// Tier gate, if any.
    pub min_tier_id: Option<String>,
    /// Whether the caller could redeem it now (ignoring terms acceptance).
    pub eligible: bool,
}

/// Account overview for one scope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyStatus {
    /// Account owner.
    pub user_id: UserId,
    /// Spendable balance.
    pub points: i64,
    /// Total ever credited.
    pub lifetime_earned: i64,
    /// Total ever redeemed.
    pub lifetime_redeemed: i64,
    /// Current tier.
    pub tier: Option<TierSummary>,
    /// Next tier up.
    pub next_tier: Option<NextTierSummary>,
    /// Active rewards in the scope.
    pub rewards: Vec<RewardStatus>,
    /// Terms version redemptions must accept.
    pub terms_version: Option<String>,
}

/// One page of ledger rows, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    /// Rows on this page.
    pub items: Vec<LoyaltyTransaction>,
    /// Page size used.
    pub limit: usize,
    /// Rows skipped.
    pub offset: usize,
    /// Whether older rows exist.
    pub has_more: bool,
}

/// Event id used for quiz completions, one payout per user and quiz.
#[must_use]
pub fn quiz_event_id(user_id: &UserId, quiz_id: &str) -> String {
    format!("quiz:{user_id}:{quiz_id}")
}

/// Loyalty operations over a store, a content source and a cache.
#[derive(Clone)]
pub struct LoyaltyService {
    store: Arc<dyn Store>,
    content: Arc<dyn ContentSource>,
    cache: Arc<TieredCache>,
}

impl LoyaltyService {
    /// Create the service.
    pub fn new(
        store: Arc<dyn Store>,
        content: Arc<dyn ContentSource>,
        cache: Arc<TieredCache>,
    ) -> Self {
        Self {
            store,
            content,
            cache,
        }
    }

    /// The program for `scope`, from cache or the CMS.
    pub async fn config(&self, scope: &TenantScope) -> Result<LoyaltyConfig, ServiceError> {
        let key = config_key(scope);
        if let Some(config) = self.cache.get::<LoyaltyConfig>(&key).await {
            return Ok(config);
        }

        let config = self.content.loyalty_config(scope).await?;
        tracing::debug!(
            scope = %scope.cache_segment(),
            tiers = config.tiers.len(),
            rules = config.rules.len(),
            rewards = config.rewards.len(),
            "Loyalty config loaded from CMS"
        );
        self.cache.set(&key, &config).await;
        Ok(config)
    }

    /// The user's account; a zero-balance account if none exists yet.
    pub async fn account(&self, user_id: &UserId) -> Result<LoyaltyAccount, ServiceError> {
        let key = balance_key(user_id);
        if let Some(account) = self.cache.get::<LoyaltyAccount>(&key).await {
            return Ok(account);
        }

        let account = self
            .store
            .get_account(user_id)?
            .unwrap_or_else(|| LoyaltyAccount::new(*user_id));
        self.cache.set(&key, &account).await;

        // A write that landed between the read and the cache fill may have
        // invalidated before we set; drop the entry rather than serve it.
        let current = self.store.get_account(user_id)?;
        if current.as_ref().is_some_and(|c| c != &account) {
            self.cache.invalidate(&key).await;
        }
        Ok(account)
    }

    /// Award points for an event.
    ///
    /// `event_id` makes the call idempotent: a repeat fails with
    /// `StoreError::DuplicateEvent` and changes nothing.
    pub async fn accrue(
        &self,
        user_id: UserId,
        scope: TenantScope,
        event: &LoyaltyEvent,
        event_id: &str,
    ) -> Result<AccrualOutcome, ServiceError> {
        if self.store.has_event(event_id)? {
            return Err(StoreError::DuplicateEvent {
                event_id: event_id.to_string(),
            }
            .into());
        }

        let config = self.config(&scope).await?;
        let balance = self
            .store
            .get_account(&user_id)?
            .map_or(0, |account| account.points);
        let accrual = calculate_accrual(&config, balance, event);

        let metadata = serde_json::json!({
            "eventId": event_id,
            "event": event,
            "tierId": accrual.tier_id,
            "multiplier": accrual.multiplier,
        });
        let tx = LoyaltyTransaction::accrual(user_id, accrual.points, scope, event.describe(), metadata);
        let transaction = self.store.apply_transaction(&tx, Some(event_id))?;
        self.cache.invalidate(&balance_key(&user_id)).await;

        tracing::info!(
            user_id = %user_id,
            event_id = %event_id,
            points = accrual.points,
            balance = transaction.balance_after,
            "Points accrued"
        );

        Ok(AccrualOutcome {
            transaction,
            accrual,
        })
    }

    /// Award quiz points once per user and quiz.
    pub async fn complete_quiz(
        &self,
        user_id: UserId,
        scope: TenantScope,
        quiz_id: &str,
    ) -> Result<AccrualOutcome, ServiceError> {
        let event = LoyaltyEvent::Quiz {
            quiz_id: quiz_id.to_string(),
        };
        self.accrue(user_id, scope, &event, &quiz_event_id(&user_id, quiz_id))
            .await
    }

    /// Spend points on a reward.
    pub async fn redeem(
        &self,
        user_id: UserId,
        scope: TenantScope,
        reward_id: &str,
        accepted_terms_version: Option<&str>,
    ) -> Result<LoyaltyTransaction, ServiceError> {
        let config = self.config(&scope).await?;
        let balance = self
            .store
            .get_account(&user_id)?
            .map_or(0, |account| account.points);

        let reward = authorize_redemption(&config, balance, reward_id, accepted_terms_version)
            .map_err(|e| {
                tracing::info!(user_id = %user_id, reward_id = %reward_id, code = e.code(), "Redemption refused");
                e
            })?;

        let tx = LoyaltyTransaction::redemption(
            user_id,
            reward.cost_points,
            scope,
            &reward.id,
            &reward.name,
        );
        let transaction = self
            .store
            .apply_transaction(&tx, None)
            .map_err(lift_insufficient)?;
        self.cache.invalidate(&balance_key(&user_id)).await;

        tracing::info!(
            user_id = %user_id,
            reward_id = %reward.id,
            cost = reward.cost_points,
            balance = transaction.balance_after,
            "Reward redeemed"
        );

        Ok(transaction)
    }

    /// Balance, tiers and reward eligibility for `scope`.
    pub async fn status(
        &self,
        user_id: UserId,
        scope: &TenantScope,
    ) -> Result<LoyaltyStatus, ServiceError> {
        let config = self.config(scope).await?;
        let account = self.account(&user_id).await?;
        let points = account.points;

        let tier = resolve_tier(&config.tiers, points).map(|t| TierSummary {
            id: t.id.clone(),
            name: t.name.clone(),
            min_points: t.min_points,
            multiplier: t.multiplier,
        });
        let next_tier = next_tier(&config.tiers, points).map(|t| NextTierSummary {
            id: t.id.clone(),
            name: t.name.clone(),
            min_points: t.min_points,
            points_needed: t.min_points - points,
        });

        let rewards = config
            .rewards
            .iter()
            .filter(|r| r.active)
            .map(|r| RewardStatus {
                id: r.id.clone(),
                name: r.name.clone(),
                cost_points: r.cost_points,
                min_tier_id: r.min_tier_id.clone(),
                eligible: authorize_redemption(
                    &config,
                    points,
                    &r.id,
                    config.terms_version.as_deref(),
                )
                .is_ok(),
            })
            .collect();

        Ok(LoyaltyStatus {
            user_id,
            points,
            lifetime_earned: account.lifetime_earned,
            lifetime_redeemed: account.lifetime_redeemed,
            tier,
            next_tier,
            rewards,
            terms_version: config.terms_version.clone(),
        })
    }

    /// Ledger rows, newest first. `limit` is clamped to `1..=MAX_PAGE_SIZE`.
    pub fn transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<TransactionPage, ServiceError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let mut items = self
            .store
            .list_transactions_by_user(user_id, limit + 1, offset)?;
        let has_more = items.len() > limit;
        items.truncate(limit);

        Ok(TransactionPage {
            items,
            limit,
            offset,
            has_more,
        })
    }

    /// Manual signed correction by an admin.
    pub async fn adjust(
        &self,
        user_id: UserId,
        points: i64,
        reason: String,
        admin_id: &str,
    ) -> Result<LoyaltyTransaction, ServiceError> {
        let tx = LoyaltyTransaction::adjustment(user_id, points, reason, admin_id);
        let transaction = self
            .store
            .apply_transaction(&tx, None)
            .map_err(lift_insufficient)?;
        self.cache.invalidate(&balance_key(&user_id)).await;

        tracing::info!(
            user_id = %user_id,
            admin_id = %admin_id,
            points,
            balance = transaction.balance_after,
            "Points adjusted"
        );

        Ok(transaction)
    }

    /// Drop every cached program. Returns the number of local entries removed.
    pub async fn invalidate_configs(&self) -> usize {
        self.cache
            .invalidate_pattern(&format!("{CONFIG_PREFIX}*"))
            .await
    }

    /// Drop one user's cached account.
    pub async fn invalidate_balance(&self, user_id: &UserId) {
        self.cache.invalidate(&balance_key(user_id)).await;
    }
}

fn lift_insufficient(err: StoreError) -> ServiceError {
    match err {
        StoreError::InsufficientPoints { balance, required } => {
            LoyaltyError::InsufficientPoints { balance, required }.into()
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use canopy_core::{LoyaltyReward, LoyaltyRule, LoyaltyTier, RuleKind, TransactionKind};
    use canopy_store::MemoryStore;

    use crate::cms::{ContentFixture, ScopedConfig, StaticContent};

    fn program() -> LoyaltyConfig {
        LoyaltyConfig {
            tiers: vec![
                LoyaltyTier {
                    id: "bronze".into(),
                    name: "Bronze".into(),
                    min_points: 0,
                    multiplier: 1.0,
                    perks: vec![],
                },
                LoyaltyTier {
                    id: "gold".into(),
                    name: "Gold".into(),
                    min_points: 500,
                    multiplier: 1.5,
                    perks: vec![],
                },
            ],
            rules: vec![
                LoyaltyRule {
                    id: "dollars".into(),
                    name: "Points per dollar".into(),
                    active: true,
                    kind: RuleKind::Dollar {
                        points_per_dollar: 1.0,
                    },
                },
                LoyaltyRule {
                    id: "quiz".into(),
                    name: "Any quiz".into(),
                    active: true,
                    kind: RuleKind::Quiz {
                        quiz_id: None,
                        points: 25,
                    },
                },
            ],
            rewards: vec![
                LoyaltyReward {
                    id: "hat".into(),
                    name: "Hat".into(),
                    cost_points: 100,
                    min_tier_id: None,
                    active: true,
                },
                LoyaltyReward {
                    id: "vip".into(),
                    name: "VIP tour".into(),
                    cost_points: 50,
                    min_tier_id: Some("gold".into()),
                    active: true,
                },
            ],
            terms_version: None,
        }
    }

    fn service_with(config: LoyaltyConfig) -> (LoyaltyService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let content = StaticContent::new(ContentFixture {
            loyalty_configs: vec![ScopedConfig {
                scope: TenantScope::default(),
                config,
            }],
            ..ContentFixture::default()
        });
        let service = LoyaltyService::new(
            store.clone(),
            Arc::new(content),
            Arc::new(TieredCache::new(Duration::from_secs(60))),
        );
        (service, store)
    }

    fn order(total_cents: i64) -> LoyaltyEvent {
        LoyaltyEvent::Order {
            order_total_cents: total_cents,
            product_ids: vec![],
        }
    }

    #[tokio::test]
    async fn accrual_floors_after_multiplier() {
        let (service, _store) = service_with(program());
        let user = UserId::generate();

        service
            .adjust(user, 500, "seed".into(), "admin")
            .await
            .unwrap();
        // Gold: floor(12.99 * 1.5) = 19
        let outcome = service
            .accrue(user, TenantScope::default(), &order(1299), "o-1")
            .await
            .unwrap();

        assert_eq!(outcome.accrual.points, 19);
        assert_eq!(outcome.transaction.balance_after, 519);
        assert_eq!(outcome.transaction.kind, TransactionKind::Accrual);
    }

    #[tokio::test]
    async fn duplicate_event_is_rejected() {
        let (service, store) = service_with(program());
        let user = UserId::generate();

        service
            .accrue(user, TenantScope::default(), &order(1000), "o-dup")
            .await
            .unwrap();
        let err = service
            .accrue(user, TenantScope::default(), &order(1000), "o-dup")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Store(StoreError::DuplicateEvent { .. })
        ));
        assert_eq!(store.get_account(&user).unwrap().unwrap().points, 10);
    }

    #[tokio::test]
    async fn quiz_pays_once() {
        let (service, _store) = service_with(program());
        let user = UserId::generate();

        let first = service
            .complete_quiz(user, TenantScope::default(), "strains-101")
            .await
            .unwrap();
        assert_eq!(first.accrual.points, 25);

        let again = service
            .complete_quiz(user, TenantScope::default(), "strains-101")
            .await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn redemption_checks_balance_and_tier() {
        let (service, store) = service_with(program());
        let user = UserId::generate();
        service.adjust(user, 120, "seed".into(), "admin").await.unwrap();

        let err = service
            .redeem(user, TenantScope::default(), "vip", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Loyalty(LoyaltyError::TierNotEligible { .. })
        ));

        let tx = service
            .redeem(user, TenantScope::default(), "hat", None)
            .await
            .unwrap();
        assert_eq!(tx.points, -100);
        assert_eq!(tx.balance_after, 20);

        let err = service
            .redeem(user, TenantScope::default(), "hat", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Loyalty(LoyaltyError::InsufficientPoints {
                balance: 20,
                required: 100
            })
        ));
        assert_eq!(store.get_account(&user).unwrap().unwrap().points, 20);
    }

    #[tokio::test]
    async fn terms_version_must_match() {
        let mut config = program();
        config.terms_version = Some("2024-06".into());
        let (service, _store) = service_with(config);
        let user = UserId::generate();
        service.adjust(user, 500, "seed".into(), "admin").await.unwrap();

        let err = service
            .redeem(user, TenantScope::default(), "hat", Some("2023-01"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Loyalty(LoyaltyError::LegalVersionMismatch { .. })
        ));

        assert!(service
            .redeem(user, TenantScope::default(), "hat", Some("2024-06"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn status_reflects_fresh_balance_after_accrual() {
        let (service, _store) = service_with(program());
        let user = UserId::generate();

        let before = service.status(user, &TenantScope::default()).await.unwrap();
        assert_eq!(before.points, 0);
        assert_eq!(before.tier.as_ref().map(|t| t.id.as_str()), Some("bronze"));
        assert_eq!(before.next_tier.as_ref().map(|t| t.points_needed), Some(500));

        service
            .accrue(user, TenantScope::default(), &order(15_000), "o-big")
            .await
            .unwrap();

        let after = service.status(user, &TenantScope::default()).await.unwrap();
        assert_eq!(after.points, 150);
        let hat = after.rewards.iter().find(|r| r.id == "hat").unwrap();
        let vip = after.rewards.iter().find(|r| r.id == "vip").unwrap();
        assert!(hat.eligible);
        assert!(!vip.eligible);
    }

    #[tokio::test]
    async fn negative_adjustment_cannot_overdraw() {
        let (service, _store) = service_with(program());
        let user = UserId::generate();
        service.adjust(user, 30, "seed".into(), "admin").await.unwrap();

        let err = service
            .adjust(user, -31, "oops".into(), "admin")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Loyalty(LoyaltyError::InsufficientPoints { .. })
        ));
    }

    #[tokio::test]
    async fn transactions_page_reports_has_more() {
        let (service, _store) = service_with(program());
        let user = UserId::generate();
        for i in 0..3 {
            service
                .accrue(user, TenantScope::default(), &order(100), &format!("o-{i}"))
                .await
                .unwrap();
        }

        let page = service.transactions(&user, 2, 0).unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more);

        let last = service.transactions(&user, 2, 2).unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_more);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_redemptions_never_overdraw() {
        let (service, store) = service_with(program());
        let user = UserId::generate();
        service
            .adjust(user, 150, "seed".into(), "admin")
            .await
            .unwrap();

        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .redeem(user, TenantScope::default(), "hat", None)
                        .await
                })
            })
            .collect();

        let mut succeeded = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(err) => assert!(matches!(
                    err,
                    ServiceError::Loyalty(LoyaltyError::InsufficientPoints { .. })
                )),
            }
        }

        assert_eq!(succeeded, 1);
        let account = store.get_account(&user).unwrap().unwrap();
        assert_eq!(account.points, 50);
        let redemptions = store
            .list_transactions_by_user(&user, 100, 0)
            .unwrap()
            .into_iter()
            .filter(|t| t.kind == TransactionKind::Redemption)
            .count();
        assert_eq!(redemptions, 1);
    }

    /// Lands a credit right after the first account read, without touching
    /// the cache, the way a concurrent accrual on another request would.
    struct RacingStore {
        inner: MemoryStore,
        pending: std::sync::Mutex<Option<LoyaltyTransaction>>,
    }

    impl Store for RacingStore {
        fn get_account(&self, user_id: &UserId) -> canopy_store::Result<Option<LoyaltyAccount>> {
            let account = self.inner.get_account(user_id)?;
            let pending = self.pending.lock().unwrap().take();
            if let Some(tx) = pending {
                self.inner.apply_transaction(&tx, None)?;
            }
            Ok(account)
        }

        fn get_transaction(
            &self,
            transaction_id: &canopy_core::TransactionId,
        ) -> canopy_store::Result<Option<LoyaltyTransaction>> {
            self.inner.get_transaction(transaction_id)
        }

        fn list_transactions_by_user(
            &self,
            user_id: &UserId,
            limit: usize,
            offset: usize,
        ) -> canopy_store::Result<Vec<LoyaltyTransaction>> {
            self.inner.list_transactions_by_user(user_id, limit, offset)
        }

        fn has_event(&self, event_id: &str) -> canopy_store::Result<bool> {
            self.inner.has_event(event_id)
        }

        fn apply_transaction(
            &self,
            transaction: &LoyaltyTransaction,
            event_id: Option<&str>,
        ) -> canopy_store::Result<LoyaltyTransaction> {
            self.inner.apply_transaction(transaction, event_id)
        }

        fn put_admin_user(&self, user: &canopy_core::AdminUser) -> canopy_store::Result<()> {
            self.inner.put_admin_user(user)
        }

        fn update_admin_user(&self, user: &canopy_core::AdminUser) -> canopy_store::Result<()> {
            self.inner.update_admin_user(user)
        }

        fn get_admin_user(
            &self,
            admin_id: &canopy_core::AdminUserId,
        ) -> canopy_store::Result<Option<canopy_core::AdminUser>> {
            self.inner.get_admin_user(admin_id)
        }

        fn list_admin_users(&self) -> canopy_store::Result<Vec<canopy_core::AdminUser>> {
            self.inner.list_admin_users()
        }

        fn delete_admin_user(
            &self,
            admin_id: &canopy_core::AdminUserId,
        ) -> canopy_store::Result<()> {
            self.inner.delete_admin_user(admin_id)
        }
    }

    #[tokio::test]
    async fn write_during_cache_fill_is_not_served_stale() {
        let user = UserId::generate();
        let store = Arc::new(RacingStore {
            inner: MemoryStore::new(),
            pending: std::sync::Mutex::new(Some(LoyaltyTransaction::adjustment(
                user,
                40,
                "bonus".into(),
                "admin",
            ))),
        });
        let service = LoyaltyService::new(
            store,
            Arc::new(StaticContent::new(ContentFixture::default())),
            Arc::new(TieredCache::new(Duration::from_secs(300))),
        );

        let first = service.account(&user).await.unwrap();
        assert_eq!(first.points, 0);

        let second = service.account(&user).await.unwrap();
        assert_eq!(second.points, 40);
    }
}
