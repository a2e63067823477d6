//! Identity service: users, their roles and credentials, and free-form
//! claims attached to a user.

use crate::error::{ServiceError, ServiceResult};
use crate::paging::collect_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storekit_crypto::{CredentialHash, CredentialHasher, HashParams, Zeroizing};
use storekit_manager::{
    require, Compensation, ConfigurationError, DisposeError, ManagedStore, Manager,
    ManagerOptions, StoreSet,
};
use storekit_model::{
    AuditFields, AuditHandler, CacheProxy, Entity, EntitySchema, HandlerProxy, HasAudit,
    HasConcurrencyStamp, HasIdentity, HasPartitionKey, IndexedField, MemoryCache,
};
use storekit_storage::{
    BackingContext, Context, Database, Page, PageRequest, Query, StorageResult, Store, StoreError,
};
use storekit_types::{enumeration, ConcurrencyStamp, EntityId, PartitionKey};
use tracing::{debug, info, warn, Span};

enumeration! {
    /// Coarse authorization level carried by every user.
    pub enum Role: "role" {
        Member = 1 => "Member",
        Operator = 2 => "Operator",
        Administrator = 3 => "Administrator",
    }
}

/// Case- and padding-insensitive form used for user-name lookups.
pub fn normalize_user_name(user_name: &str) -> String {
    user_name.trim().to_uppercase()
}

/// A sign-in identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub concurrency_stamp: Option<ConcurrencyStamp>,
    pub user_name: String,
    pub normalized_user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<CredentialHash>,
    #[serde(default)]
    pub audit: AuditFields,
}

impl User {
    pub fn new(user_name: &str, role: Role) -> Self {
        Self {
            id: None,
            concurrency_stamp: None,
            user_name: user_name.into(),
            normalized_user_name: normalize_user_name(user_name),
            email: None,
            role,
            password_hash: None,
            audit: AuditFields::default(),
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.into());
        self
    }
}

impl HasIdentity for User {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }
}

impl HasConcurrencyStamp for User {
    fn concurrency_stamp(&self) -> Option<&ConcurrencyStamp> {
        self.concurrency_stamp.as_ref()
    }

    fn set_concurrency_stamp(&mut self, stamp: ConcurrencyStamp) {
        self.concurrency_stamp = Some(stamp);
    }
}

impl HasAudit for User {
    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}

impl Entity for User {
    const ENTITY_TYPE: &'static str = "user";

    fn schema() -> EntitySchema {
        EntitySchema::new(Self::ENTITY_TYPE)
            .table("users")
            .describe("Sign-in identities")
            .index(
                IndexedField::text("/normalized_user_name")
                    .unique()
                    .comment("upper-cased, trimmed user name"),
            )
            .index(IndexedField::text("/email"))
            .index(IndexedField::enumeration::<Role>("/role"))
    }

    fn audit_fields(&self) -> Option<&AuditFields> {
        Some(self.audit())
    }

    fn audit_fields_mut(&mut self) -> Option<&mut AuditFields> {
        Some(self.audit_mut())
    }
}

/// A `(type, value)` statement about a user, partitioned by the user's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaim {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub concurrency_stamp: Option<ConcurrencyStamp>,
    user: PartitionKey,
    pub user_id: EntityId,
    pub claim_type: String,
    pub claim_value: String,
}

impl UserClaim {
    pub fn new(user_id: EntityId, claim_type: &str, claim_value: &str) -> ServiceResult<Self> {
        Ok(Self {
            id: None,
            concurrency_stamp: None,
            user: user_partition(user_id)?,
            user_id,
            claim_type: claim_type.into(),
            claim_value: claim_value.into(),
        })
    }
}

fn user_partition(user_id: EntityId) -> ServiceResult<PartitionKey> {
    PartitionKey::new(user_id.to_string()).map_err(|e| ServiceError::Rejected(e.to_string()))
}

impl HasIdentity for UserClaim {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }
}

impl HasConcurrencyStamp for UserClaim {
    fn concurrency_stamp(&self) -> Option<&ConcurrencyStamp> {
        self.concurrency_stamp.as_ref()
    }

    fn set_concurrency_stamp(&mut self, stamp: ConcurrencyStamp) {
        self.concurrency_stamp = Some(stamp);
    }
}

impl HasPartitionKey for UserClaim {
    fn partition_key(&self) -> &PartitionKey {
        &self.user
    }
}

impl Entity for UserClaim {
    const ENTITY_TYPE: &'static str = "user_claim";

    fn schema() -> EntitySchema {
        EntitySchema::new(Self::ENTITY_TYPE)
            .table("user_claims")
            .partitioned()
            .index(IndexedField::reference("/user_id"))
            .index(IndexedField::text("/claim_type"))
    }

    fn partition(&self) -> Option<&PartitionKey> {
        Some(self.partition_key())
    }
}

/// Stores owned by an [`IdentityManager`], released users first.
pub struct IdentityStores<C: BackingContext = Context> {
    pub users: Store<User, C>,
    pub claims: Store<UserClaim, C>,
}

impl<C: BackingContext> StoreSet for IdentityStores<C> {
    fn stores(&self) -> Vec<&dyn ManagedStore> {
        vec![&self.users, &self.claims]
    }

    fn stores_mut(&mut self) -> Vec<&mut dyn ManagedStore> {
        vec![&mut self.users, &mut self.claims]
    }
}

/// Assembles an [`IdentityManager`] from explicit parts.
pub struct IdentityManagerBuilder<C: BackingContext = Context> {
    users: Option<Store<User, C>>,
    claims: Option<Store<UserClaim, C>>,
    user_handler: Option<Arc<dyn HandlerProxy<User>>>,
    user_cache: Option<Arc<dyn CacheProxy<User>>>,
    claim_cache: Option<Arc<dyn CacheProxy<UserClaim>>>,
    options: ManagerOptions,
    hash_params: HashParams,
    logger: Option<Span>,
}

impl<C: BackingContext> Default for IdentityManagerBuilder<C> {
    fn default() -> Self {
        Self {
            users: None,
            claims: None,
            user_handler: None,
            user_cache: None,
            claim_cache: None,
            options: ManagerOptions::default(),
            hash_params: HashParams::default(),
            logger: None,
        }
    }
}

impl<C: BackingContext> IdentityManagerBuilder<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn users(mut self, store: Store<User, C>) -> Self {
        self.users = Some(store);
        self
    }

    pub fn claims(mut self, store: Store<UserClaim, C>) -> Self {
        self.claims = Some(store);
        self
    }

    /// Replaces whatever handler the users store was built with.
    pub fn user_handler(mut self, handler: Arc<dyn HandlerProxy<User>>) -> Self {
        self.user_handler = Some(handler);
        self
    }

    /// Replaces whatever cache the users store was built with.
    pub fn user_cache(mut self, cache: Arc<dyn CacheProxy<User>>) -> Self {
        self.user_cache = Some(cache);
        self
    }

    pub fn claim_cache(mut self, cache: Arc<dyn CacheProxy<UserClaim>>) -> Self {
        self.claim_cache = Some(cache);
        self
    }

    pub fn options(mut self, options: ManagerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn hash_params(mut self, params: HashParams) -> Self {
        self.hash_params = params;
        self
    }

    pub fn logger(mut self, span: Span) -> Self {
        self.logger = Some(span);
        self
    }

    pub fn build(self) -> Result<IdentityManager<C>, ConfigurationError> {
        let mut users = require(self.users, "users")?;
        let mut claims = require(self.claims, "claims")?;
        if let Some(handler) = self.user_handler {
            users = users.with_handler(handler);
        }
        if let Some(cache) = self.user_cache {
            users = users.with_cache(cache);
        }
        if let Some(cache) = self.claim_cache {
            claims = claims.with_cache(cache);
        }
        let hasher = CredentialHasher::new(self.hash_params)
            .map_err(|e| ConfigurationError::InvalidOptions(e.to_string()))?;
        let mut manager = Manager::new(IdentityStores { users, claims }, self.options)?;
        if let Some(span) = self.logger {
            manager = manager.with_logger(span);
        }
        Ok(IdentityManager { manager, hasher })
    }
}

/// User accounts, passwords and claims for one request scope.
pub struct IdentityManager<C: BackingContext = Context> {
    manager: Manager<IdentityStores<C>>,
    hasher: CredentialHasher,
}

impl IdentityManager<Context> {
    /// Registers the identity entity types with an engine.
    pub fn register(db: &Database) -> StorageResult<()> {
        db.register_entity::<User>()?;
        db.register_entity::<UserClaim>()
    }

    /// A manager over a fresh context, stamping audit fields as `actor`.
    ///
    /// `cache` is usually one instance shared by every scope.
    pub fn for_scope(
        db: &Database,
        actor: Option<&str>,
        options: ManagerOptions,
        hash_params: HashParams,
        cache: Option<Arc<MemoryCache>>,
    ) -> Result<Self, ConfigurationError> {
        let context = Arc::new(db.context());
        let audit = Arc::new(AuditHandler::new());
        let mut users: Store<User> = Store::new(Arc::clone(&context)).with_handler(audit.clone());
        let mut claims: Store<UserClaim> = Store::new(context).with_handler(audit);
        if let Some(actor) = actor {
            users = users.with_actor(actor);
            claims = claims.with_actor(actor);
        }
        if let Some(cache) = cache {
            users = users.with_cache(cache.clone());
            claims = claims.with_cache(cache);
        }
        IdentityManagerBuilder::new()
            .users(users)
            .claims(claims)
            .options(options)
            .hash_params(hash_params)
            .build()
    }
}

impl<C: BackingContext> IdentityManager<C> {
    pub fn stores(&self) -> &IdentityStores<C> {
        self.manager.stores()
    }

    pub fn options(&self) -> &ManagerOptions {
        self.manager.options()
    }

    // ── Users ────────────────────────────────────────────────────────

    /// Creates a user with an initial password. User names are unique
    /// ignoring case and surrounding whitespace.
    pub async fn create_user(&self, mut user: User, password: Zeroizing<String>) -> ServiceResult<User> {
        if user.user_name.trim().is_empty() {
            return Err(ServiceError::Rejected("user name must not be blank".into()));
        }
        if password.is_empty() {
            return Err(ServiceError::Rejected("password must not be empty".into()));
        }
        user.normalized_user_name = normalize_user_name(&user.user_name);
        if self.find_by_name(&user.user_name).await?.is_some() {
            return Err(ServiceError::Rejected(format!(
                "user name '{}' is already taken",
                user.user_name
            )));
        }
        user.password_hash = Some(self.hasher.hash(&password)?);

        let user = self.stores().users.create(user).await?;
        info!(user_id = ?user.id, role = %user.role, "Created user");
        Ok(user)
    }

    pub async fn read_user(&self, id: &EntityId) -> ServiceResult<User> {
        Ok(self.stores().users.read(id).await?)
    }

    pub async fn find_by_name(&self, user_name: &str) -> ServiceResult<Option<User>> {
        let normalized = normalize_user_name(user_name);
        let page = self
            .stores()
            .users
            .query(
                Query::all()
                    .filter(move |u: &User| u.normalized_user_name == normalized)
                    .page(PageRequest::first().with_size(1)),
            )
            .await?;
        Ok(page.into_iter().next())
    }

    pub async fn list_users(&self, page: PageRequest) -> ServiceResult<Page<User>> {
        Ok(self
            .stores()
            .users
            .query(
                Query::all()
                    .order_by(|a: &User, b: &User| a.normalized_user_name.cmp(&b.normalized_user_name))
                    .page(page),
            )
            .await?)
    }

    pub async fn set_role(&self, mut user: User, role: Role) -> ServiceResult<User> {
        user.role = role;
        Ok(self.stores().users.update(user).await?)
    }

    // ── Credentials ──────────────────────────────────────────────────

    /// Checks a password without side effects.
    pub fn check_password(&self, user: &User, candidate: &str) -> bool {
        user.password_hash
            .as_ref()
            .is_some_and(|hash| CredentialHasher::verify(hash, candidate))
    }

    /// Verifies a user name and password and returns the current user.
    ///
    /// A digest made under older parameters is replaced with one made under
    /// the current set. If that rewrite loses a concurrency race the
    /// sign-in still succeeds and the upgrade waits for next time.
    pub async fn sign_in(&self, user_name: &str, password: &str) -> ServiceResult<User> {
        let Some(user) = self.find_by_name(user_name).await? else {
            debug!("Sign-in for unknown user name");
            return Err(ServiceError::InvalidCredentials);
        };
        if !self.check_password(&user, password) {
            debug!(user_id = ?user.id, "Sign-in with wrong password");
            return Err(ServiceError::InvalidCredentials);
        }

        let stale = user
            .password_hash
            .as_ref()
            .is_some_and(|hash| self.hasher.needs_rehash(hash));
        if !stale {
            return Ok(user);
        }
        let mut upgraded = user.clone();
        upgraded.password_hash = Some(self.hasher.hash(password)?);
        match self.stores().users.update(upgraded).await {
            Ok(upgraded) => {
                info!(user_id = ?upgraded.id, "Upgraded password digest");
                Ok(upgraded)
            }
            Err(e) => {
                warn!(user_id = ?user.id, error = %e, "Password digest upgrade skipped");
                Ok(user)
            }
        }
    }

    pub async fn change_password(
        &self,
        mut user: User,
        current: &str,
        new_password: Zeroizing<String>,
    ) -> ServiceResult<User> {
        if !self.check_password(&user, current) {
            return Err(ServiceError::InvalidCredentials);
        }
        if new_password.is_empty() {
            return Err(ServiceError::Rejected("password must not be empty".into()));
        }
        user.password_hash = Some(self.hasher.hash(&new_password)?);
        Ok(self.stores().users.update(user).await?)
    }

    // ── Claims ───────────────────────────────────────────────────────

    pub async fn add_claim(&self, user: &User, claim_type: &str, value: &str) -> ServiceResult<UserClaim> {
        let user_id = saved_id(user)?;
        let claim = UserClaim::new(user_id, claim_type, value)?;
        Ok(self.stores().claims.create(claim).await?)
    }

    pub async fn claims_of(&self, user_id: EntityId) -> ServiceResult<Vec<UserClaim>> {
        let partition = user_partition(user_id)?;
        Ok(collect_all(&self.stores().claims, || Query::all().in_partition(partition.clone())).await?)
    }

    pub async fn remove_claim(&self, claim: &UserClaim) -> ServiceResult<()> {
        let (id, stamp) = fence(claim)?;
        Ok(self.stores().claims.delete(&id, &stamp).await?)
    }

    /// Deletes a user and every claim attached to it.
    ///
    /// Claims go first. If a later step fails the removed claims are
    /// recreated; anything that cannot be recreated is reported through
    /// [`ServiceError::PartiallyApplied`].
    pub async fn delete_user(&self, user: &User) -> ServiceResult<()> {
        let (id, stamp) = fence(user)?;
        let claims = self.claims_of(id).await?;

        let mut undo = Compensation::new();
        match self.delete_user_steps(id, &stamp, claims, &mut undo).await {
            Ok(()) => {
                undo.commit();
                info!(user_id = %id, "Deleted user");
                Ok(())
            }
            Err(source) => {
                let store = &self.stores().claims;
                let report = undo
                    .compensate(move |claim: UserClaim| async move {
                        store.create(claim).await?;
                        Ok::<(), anyhow::Error>(())
                    })
                    .await;
                if report.is_clean() {
                    Err(source.into())
                } else {
                    Err(ServiceError::PartiallyApplied {
                        source,
                        unrecovered: report.failures.len(),
                    })
                }
            }
        }
    }

    async fn delete_user_steps(
        &self,
        id: EntityId,
        stamp: &ConcurrencyStamp,
        claims: Vec<UserClaim>,
        undo: &mut Compensation<UserClaim>,
    ) -> Result<(), StoreError> {
        for claim in claims {
            if let (Some(claim_id), Some(claim_stamp)) = (claim.id, claim.concurrency_stamp.as_ref()) {
                self.stores().claims.delete(&claim_id, claim_stamp).await?;
                undo.record(claim);
            }
        }
        self.stores().users.delete(&id, stamp).await
    }

    /// Releases the stores; see [`Manager::dispose`].
    pub async fn dispose(self) -> Result<(), DisposeError> {
        self.manager.dispose().await
    }
}

fn saved_id<E: Entity>(entity: &E) -> ServiceResult<EntityId> {
    entity
        .id()
        .ok_or_else(|| ServiceError::Rejected(format!("this {} has not been saved", E::ENTITY_TYPE)))
}

/// Id and stamp of a saved entity.
pub(crate) fn fence<E: Entity>(entity: &E) -> ServiceResult<(EntityId, ConcurrencyStamp)> {
    let id = saved_id(entity)?;
    let stamp = entity.concurrency_stamp().cloned().ok_or_else(|| {
        ServiceError::Rejected(format!("{} {id} carries no concurrency stamp", E::ENTITY_TYPE))
    })?;
    Ok((id, stamp))
}
