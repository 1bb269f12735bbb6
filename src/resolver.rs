//! Resolution orchestration with per-user refresh guards, cached handles, and retry-once
//! auth recovery.
//!
//! The resolver exposes [`ServiceResolver::resolve_and_invoke`] so callers can run an
//! operation against an authenticated service handle without worrying about token expiry or
//! stale cache entries. Each resolution fetches the stored credential, refreshes it under a
//! per-user guard when it is expired or inside the preemptive window, builds (or reuses) the
//! cached handle, and invokes the operation. An authentication-class operation failure
//! evicts the cache entry and repeats the cycle exactly once; a second auth failure
//! surfaces as [`Error::Authentication`].

mod metrics;

pub use metrics::ResolveMetrics;

// self
use crate::{
	_prelude::*,
	auth::{ApiVersion, Credential, ScopeSet, ServiceName, UserId},
	cache::{CacheKey, ServiceCache},
	error::{AuthRefreshError, BoxError, ServiceBuildError},
	obs::{self, StageKind, StageOutcome, StageSpan},
	refresh::TokenRefresher,
	store::CredentialStore,
};

/// Boxed future returned by [`ClientBuilder::build`].
pub type BuildFuture<'a, H> =
	Pin<Box<dyn Future<Output = Result<H, ServiceBuildError>> + 'a + Send>>;

/// Contract for constructing an authenticated service handle from a credential.
///
/// Builders must be idempotent: constructing twice for the same inputs yields two equally
/// usable handles, so a lost singleflight race wastes work but never corrupts state.
pub trait ClientBuilder
where
	Self: Send + Sync,
{
	/// Opaque service handle type the builder produces.
	type Handle;

	/// Constructs a handle bound to the credential's access token.
	fn build<'a>(
		&'a self,
		credential: &'a Credential,
		service: &'a ServiceName,
		version: &'a ApiVersion,
		scope: &'a ScopeSet,
	) -> BuildFuture<'a, Self::Handle>;
}

/// One resolution request: which user wants which service at which version and scopes.
#[derive(Clone, Debug)]
pub struct ServiceRequest {
	/// User the handle must be authenticated for.
	pub user: UserId,
	/// Service to resolve.
	pub service: ServiceName,
	/// API version to resolve.
	pub version: ApiVersion,
	/// Normalized scopes the handle must carry.
	pub scope: ScopeSet,
	/// Tokens expiring within this window of now are refreshed before use.
	pub preemptive_window: Duration,
}
impl ServiceRequest {
	/// Default preemptive refresh window.
	pub const DEFAULT_PREEMPTIVE_WINDOW: Duration = Duration::seconds(60);

	/// Creates a request with the default preemptive window.
	pub fn new(user: UserId, service: ServiceName, version: ApiVersion, scope: ScopeSet) -> Self {
		Self {
			user,
			service,
			version,
			scope,
			preemptive_window: Self::DEFAULT_PREEMPTIVE_WINDOW,
		}
	}

	/// Overrides the preemptive refresh window.
	pub fn with_preemptive_window(mut self, window: Duration) -> Self {
		self.preemptive_window = window;

		self
	}

	/// Cache key identifying the handle this request resolves to.
	pub fn cache_key(&self) -> CacheKey {
		CacheKey::new(&self.user, &self.service, &self.version, &self.scope)
	}

	/// Returns `true` if the credential must be refreshed before a handle is built.
	pub fn needs_refresh(&self, credential: &Credential, now: OffsetDateTime) -> bool {
		credential.is_expired_at(now) || credential.expires_within(now, self.preemptive_window)
	}
}

/// Failure raised by an operation running against a resolved handle.
///
/// Only [`Auth`](Self::Auth) participates in the resolver's invalidate-and-retry cycle;
/// everything else passes through to the caller untouched.
#[derive(Debug, ThisError)]
pub enum OperationError {
	/// The upstream API rejected the call as unauthenticated or unauthorized.
	#[error("Upstream rejected the call as unauthenticated: {message}.")]
	Auth {
		/// HTTP status code, when the failure came from an HTTP API.
		status: Option<u16>,
		/// Human-readable failure summary.
		message: String,
	},
	/// Any other operation failure.
	#[error("{message}")]
	Other {
		/// Human-readable failure summary.
		message: String,
		/// Underlying failure, when one exists.
		#[source]
		source: Option<BoxError>,
	},
}
impl OperationError {
	/// Creates an authentication-class failure without an HTTP status.
	pub fn auth(message: impl Into<String>) -> Self {
		Self::Auth { status: None, message: message.into() }
	}

	/// Creates an authentication-class failure carrying the HTTP status that triggered it.
	pub fn auth_with_status(status: u16, message: impl Into<String>) -> Self {
		Self::Auth { status: Some(status), message: message.into() }
	}

	/// Creates a non-auth failure without an underlying source.
	pub fn other(message: impl Into<String>) -> Self {
		Self::Other { message: message.into(), source: None }
	}

	/// Attaches the underlying failure to a non-auth error.
	pub fn with_source(mut self, src: impl 'static + Send + Sync + StdError) -> Self {
		if let Self::Other { source, .. } = &mut self {
			*source = Some(Box::new(src));
		}

		self
	}

	/// Returns `true` if this failure should trigger cache invalidation and a retry.
	pub fn is_auth_class(&self) -> bool {
		matches!(self, Self::Auth { .. })
	}
}

/// Coordinates credential refresh, handle caching, and auth-failure recovery.
///
/// The resolver owns the credential store, token refresher, client builder, and handle
/// cache so callers only deal with [`ServiceRequest`] + operation closures. Refreshes for
/// the same user are serialized through a per-user guard; distinct users proceed in
/// parallel.
pub struct ServiceResolver<B>
where
	B: ?Sized + ClientBuilder,
{
	/// Credential store consulted for every resolution.
	pub store: Arc<dyn CredentialStore>,
	/// Token refresher used when a credential is expired or about to expire.
	pub refresher: Arc<dyn TokenRefresher>,
	/// Builder that constructs authenticated handles on cache misses.
	pub builder: Arc<B>,
	/// Cache of previously constructed handles.
	pub cache: ServiceCache<B::Handle>,
	/// Shared metrics recorder for resolution outcomes.
	pub metrics: Arc<ResolveMetrics>,
	refresh_guards: Arc<Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>>,
}
impl<B> ServiceResolver<B>
where
	B: ?Sized + ClientBuilder,
{
	/// Creates a resolver with a default-TTL cache.
	pub fn new(
		store: Arc<dyn CredentialStore>,
		refresher: Arc<dyn TokenRefresher>,
		builder: impl Into<Arc<B>>,
	) -> Self {
		Self {
			store,
			refresher,
			builder: builder.into(),
			cache: ServiceCache::new(),
			metrics: Default::default(),
			refresh_guards: Default::default(),
		}
	}

	/// Replaces the handle cache, e.g. to change its TTL or share it between resolvers.
	pub fn with_cache(mut self, cache: ServiceCache<B::Handle>) -> Self {
		self.cache = cache;

		self
	}

	/// Resolves an authenticated handle for `request` and runs `operation` against it.
	///
	/// On an authentication-class [`OperationError`] the cached handle is evicted and the
	/// resolve-and-invoke cycle repeats exactly once with a freshly resolved handle. A second
	/// auth-class failure evicts again and surfaces as [`Error::Authentication`]; non-auth
	/// failures pass through as [`Error::Operation`] without touching the cache.
	pub async fn resolve_and_invoke<Op, Fut, T>(
		&self,
		request: &ServiceRequest,
		mut operation: Op,
	) -> Result<T>
	where
		Op: FnMut(Arc<B::Handle>) -> Fut,
		Fut: Future<Output = Result<T, OperationError>>,
	{
		const KIND: StageKind = StageKind::Resolve;

		let span = StageSpan::new(KIND, "resolve_and_invoke");

		obs::record_stage_outcome(KIND, StageOutcome::Attempt);
		self.metrics.record_attempt();

		let result = span
			.instrument(async move {
				let key = request.cache_key();
				let handle = self.acquire_handle(request).await?;

				match operation(handle).await {
					Ok(value) => return Ok(value),
					Err(e) if e.is_auth_class() => (),
					Err(e) => return Err(e.into()),
				}

				// The handle carries a token the upstream no longer accepts; evict it and
				// resolve once more from the stored credential.
				self.cache.invalidate(&key);
				obs::record_stage_outcome(KIND, StageOutcome::Retry);
				self.metrics.record_retry();

				let handle = self.acquire_handle(request).await?;

				match operation(handle).await {
					Ok(value) => Ok(value),
					Err(e) if e.is_auth_class() => {
						self.cache.invalidate(&key);

						Err(Error::Authentication { reason: e.to_string() })
					},
					Err(e) => Err(e.into()),
				}
			})
			.await;

		match &result {
			Ok(_) => {
				obs::record_stage_outcome(KIND, StageOutcome::Success);
				self.metrics.record_success();
			},
			Err(_) => {
				obs::record_stage_outcome(KIND, StageOutcome::Failure);
				self.metrics.record_failure();
			},
		}

		result
	}

	/// Returns the cached handle for `request`, refreshing credentials and building a new
	/// handle as needed.
	pub async fn acquire_handle(&self, request: &ServiceRequest) -> Result<Arc<B::Handle>> {
		self.cache
			.get_or_create(request.cache_key(), || async {
				let credential = self.current_credential(request).await?;
				let span = StageSpan::new(StageKind::Build, "acquire_handle");

				obs::record_stage_outcome(StageKind::Build, StageOutcome::Attempt);
				self.metrics.record_build();

				let built = span
					.instrument(self.builder.build(
						&credential,
						&request.service,
						&request.version,
						&request.scope,
					))
					.await;

				match built {
					Ok(handle) => {
						obs::record_stage_outcome(StageKind::Build, StageOutcome::Success);

						Ok(handle)
					},
					Err(e) => {
						obs::record_stage_outcome(StageKind::Build, StageOutcome::Failure);

						Err(e.into())
					},
				}
			})
			.await
	}

	/// Returns a usable credential for the request's user, refreshing and persisting it
	/// when expired or inside the preemptive window.
	async fn current_credential(&self, request: &ServiceRequest) -> Result<Credential> {
		let guard = self.refresh_guard(&request.user);
		let _refresh = guard.lock().await;
		let now = OffsetDateTime::now_utc();
		let current = self
			.store
			.fetch(&request.user)
			.await?
			.filter(|credential| !credential.is_revoked())
			.ok_or_else(|| Error::CredentialMissing { user: request.user.to_string() })?;

		if !request.needs_refresh(&current, now) {
			return Ok(current);
		}

		let span = StageSpan::new(StageKind::Refresh, "current_credential");

		obs::record_stage_outcome(StageKind::Refresh, StageOutcome::Attempt);
		self.metrics.record_refresh();

		let refreshed = match span.instrument(self.refresher.refresh(&current)).await {
			Ok(credential) => credential,
			Err(e) => {
				// A rejected refresh token is dead for good; mark the stored credential so
				// later resolutions report CredentialMissing instead of retrying the exchange.
				if matches!(e, AuthRefreshError::Rejected { .. }) {
					let mut revoked = current;

					revoked.revoke(now);

					let _ = self.store.save(revoked).await;
				}

				obs::record_stage_outcome(StageKind::Refresh, StageOutcome::Failure);

				return Err(e.into());
			},
		};

		self.store.save(refreshed.clone()).await?;
		obs::record_stage_outcome(StageKind::Refresh, StageOutcome::Success);

		Ok(refreshed)
	}

	fn refresh_guard(&self, user: &UserId) -> Arc<AsyncMutex<()>> {
		let mut guards = self.refresh_guards.lock();

		guards.entry(user.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
impl<B> Clone for ServiceResolver<B>
where
	B: ?Sized + ClientBuilder,
{
	fn clone(&self) -> Self {
		Self {
			store: self.store.clone(),
			refresher: self.refresher.clone(),
			builder: self.builder.clone(),
			cache: self.cache.clone(),
			metrics: self.metrics.clone(),
			refresh_guards: self.refresh_guards.clone(),
		}
	}
}
impl<B> Debug for ServiceResolver<B>
where
	B: ?Sized + ClientBuilder,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceResolver").field("cache", &self.cache).finish()
	}
}
