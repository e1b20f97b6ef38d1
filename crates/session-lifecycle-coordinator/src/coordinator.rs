//! Session reconciler.
//!
//! [`SessionCoordinator`] decides the authentication state by combining an
//! explicit backend lookup, the backend's session event stream, and the token
//! cached in the credential store. It is the only owner of the state; every
//! change goes through one transition function under one lock, which also
//! publishes the snapshot and re-arms the side-effect timer.
//!
//! Every operation takes a generation number when it starts. Its result is
//! applied only if no operation started later has already applied, so late
//! responses can never overwrite newer state.

use crate::auth_fsm::{MachineInput, MachineState, SessionMachine};
use crate::enrichment::ProfileEnrichmentLoader;
use crate::persistence::{Completion, PersistenceWriter, StorageRecord};
use crate::scheduler::{SideEffectCallback, SideEffectScheduler};
use crate::subscription::{Broadcaster, Subscription};
use crate::{AuthError, AuthPhase, AuthResult, AuthState, CoordinatorConfig};
use credential_store::{CredentialStore, StorageKeys, StorageResult};
use identity_backend::{
    IdentityBackend, Profile, ProfileSource, Session, SessionEvent, SignIn, User,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Where a session being installed came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    SignIn,
    Restore,
    Event,
}

/// How a transition changes the installed identity.
enum Identity {
    Keep,
    Replace { session: Session, user: User },
    UpdateUser(User),
    Clear,
}

struct Core {
    machine: SessionMachine,
    session: Option<Session>,
    user: Option<User>,
    /// Generation of the newest operation whose result was applied.
    applied_generation: u64,
    /// Generation that installed the current user identity.
    identity_generation: u64,
}

impl Core {
    fn new() -> Self {
        Self {
            machine: SessionMachine::new(),
            session: None,
            user: None,
            applied_generation: 0,
            identity_generation: 0,
        }
    }

    fn phase(&self) -> AuthPhase {
        AuthPhase::from(self.machine.state())
    }

    fn snapshot(&self) -> AuthState {
        match self.machine.state() {
            MachineState::Unauthenticated => AuthState::Unauthenticated,
            MachineState::Restoring => AuthState::Restoring,
            MachineState::SigningOut => AuthState::SigningOut,
            MachineState::Authenticated => match (&self.session, &self.user) {
                (Some(session), Some(user)) => AuthState::Authenticated {
                    session: session.clone(),
                    user: user.clone(),
                },
                // Identity is always set together with Authenticated.
                _ => AuthState::Unauthenticated,
            },
        }
    }

    /// Record `generation` as applied unless a later one already was.
    fn admit(&mut self, generation: u64) -> bool {
        if generation < self.applied_generation {
            return false;
        }
        self.applied_generation = generation;
        true
    }
}

/// Credentials read from the store at bootstrap.
#[derive(Default)]
struct CachedCredentials {
    access_token: Option<String>,
    user_id: Option<String>,
    refresh_token: Option<String>,
}

fn cached_value(key: &str, result: StorageResult<Option<String>>) -> Option<String> {
    match result {
        Ok(value) => value.filter(|value| !value.is_empty()),
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to read cached credential");
            None
        }
    }
}

async fn read_cached_credentials(store: Arc<dyn CredentialStore>) -> CachedCredentials {
    let (access_token, user_id, refresh_token) = tokio::join!(
        store.get(StorageKeys::AUTH_TOKEN),
        store.get(StorageKeys::USER_ID),
        store.get(StorageKeys::REFRESH_TOKEN),
    );

    CachedCredentials {
        access_token: cached_value(StorageKeys::AUTH_TOKEN, access_token),
        user_id: cached_value(StorageKeys::USER_ID, user_id),
        refresh_token: cached_value(StorageKeys::REFRESH_TOKEN, refresh_token),
    }
}

/// Owns the authentication state of one client.
///
/// Create one per process with [`SessionCoordinator::new`] and share the
/// returned `Arc`.
pub struct SessionCoordinator {
    backend: Arc<dyn IdentityBackend>,
    store: Arc<dyn CredentialStore>,
    enrichment: Arc<ProfileEnrichmentLoader>,
    writer: PersistenceWriter,
    scheduler: SideEffectScheduler,
    broadcaster: Broadcaster,
    config: CoordinatorConfig,
    core: Mutex<Core>,
    next_generation: AtomicU64,
    initialized: AtomicBool,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl SessionCoordinator {
    /// Create a coordinator. Must be called inside a Tokio runtime.
    pub fn new(
        backend: Arc<dyn IdentityBackend>,
        profiles: Arc<dyn ProfileSource>,
        store: Arc<dyn CredentialStore>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            writer: PersistenceWriter::spawn(Arc::clone(&store)),
            store,
            enrichment: Arc::new(ProfileEnrichmentLoader::new(profiles)),
            scheduler: SideEffectScheduler::new(config.prompt_interval),
            broadcaster: Broadcaster::default(),
            config,
            core: Mutex::new(Core::new()),
            next_generation: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
            event_loop: Mutex::new(None),
        })
    }

    /// Current state snapshot.
    pub fn state(&self) -> AuthState {
        self.core.lock().snapshot()
    }

    pub fn phase(&self) -> AuthPhase {
        self.core.lock().phase()
    }

    /// Call `listener` with every state transition, in order.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        self.broadcaster.subscribe(listener)
    }

    /// Ordered stream of state transitions. Dropping the receiver unsubscribes.
    pub fn watch(&self) -> mpsc::UnboundedReceiver<AuthState> {
        self.broadcaster.channel().1
    }

    /// Register the callback fired periodically while authenticated.
    pub fn set_side_effect_callback(&self, callback: SideEffectCallback) {
        self.scheduler.set_callback(callback);
    }

    fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Apply `input` and publish the resulting snapshot.
    fn commit(&self, core: &mut Core, input: MachineInput, identity: Identity) -> bool {
        let from = core.phase();
        if core.machine.consume(&input).is_err() {
            warn!(from = %from, input = ?input, "Rejected session transition");
            return false;
        }

        match identity {
            Identity::Keep => {}
            Identity::Replace { session, user } => {
                core.session = Some(session);
                core.user = Some(user);
            }
            Identity::UpdateUser(user) => core.user = Some(user),
            Identity::Clear => {
                core.session = None;
                core.user = None;
            }
        }

        let state = core.snapshot();
        debug!(from = %from, to = %state.phase(), input = ?input, "Session transition");
        self.broadcaster.publish(&state);
        self.scheduler.arm(&state);
        true
    }

    /// Install a session produced by the operation tagged `generation`.
    ///
    /// Returns false if the result was not applied.
    fn install(
        self: &Arc<Self>,
        generation: u64,
        session: Session,
        user: User,
        origin: Origin,
    ) -> bool {
        let mut core = self.core.lock();
        let phase = core.phase();

        if origin == Origin::Event && phase == AuthPhase::SigningOut {
            debug!(generation, "Ignoring session event while signing out");
            return false;
        }
        if !core.admit(generation) {
            debug!(
                generation,
                applied = core.applied_generation,
                "StaleGenerationIgnored: install"
            );
            return false;
        }

        if let Some(current) = core.session.as_ref() {
            if current.is_same_credential(&session) {
                debug!(generation, user_id = %session.user_id, "Session already installed");
                return true;
            }

            if current.user_id == session.user_id {
                // Same user, new tokens: keep the enriched user.
                let mut kept = core.user.clone().unwrap_or_else(|| session.minimal_user());
                kept.merge_from(&user);
                let record = StorageRecord::new(&session, &kept);
                info!(generation, user_id = %session.user_id, "Session replaced");
                self.commit(
                    &mut core,
                    MachineInput::SessionReplaced,
                    Identity::Replace {
                        session,
                        user: kept,
                    },
                );
                let _ = self.writer.persist(generation, record);
                return true;
            }
        }

        let input = match (phase, origin) {
            (AuthPhase::Restoring, Origin::Restore | Origin::Event) => MachineInput::SessionRestored,
            _ => MachineInput::SignedIn,
        };
        let record = StorageRecord::new(&session, &user);
        let user_id = session.user_id.clone();
        let access_token = session.access_token.clone();

        if !self.commit(&mut core, input, Identity::Replace { session, user }) {
            return false;
        }
        core.identity_generation = generation;
        let _ = self.writer.persist(generation, record);
        drop(core);

        info!(generation, user_id = %user_id, origin = ?origin, "Session installed");
        self.spawn_enrichment(generation, user_id, access_token);
        true
    }

    /// Drop the local session under `generation` and clear the store.
    fn clear_local(&self, generation: u64, input: MachineInput) -> Option<Completion> {
        let mut core = self.core.lock();
        if !core.admit(generation) {
            debug!(
                generation,
                applied = core.applied_generation,
                "StaleGenerationIgnored: clear"
            );
            return None;
        }
        if !self.commit(&mut core, input, Identity::Clear) {
            return None;
        }
        Some(self.writer.clear(generation))
    }

    fn spawn_enrichment(self: &Arc<Self>, tag: u64, user_id: String, access_token: String) {
        let loader = Arc::clone(&self.enrichment);
        let coordinator = Arc::downgrade(self);

        tokio::spawn(async move {
            match loader.load(&user_id, &access_token).await {
                Ok(Some(user)) => {
                    if let Some(coordinator) = coordinator.upgrade() {
                        coordinator.merge_enriched(tag, &user);
                    }
                }
                Ok(None) => debug!(user_id = %user_id, "No profile to merge"),
                Err(e) => warn!(
                    user_id = %user_id,
                    error = %e,
                    "Profile enrichment failed, keeping minimal user"
                ),
            }
        });
    }

    /// Merge an enrichment result if it still belongs to the installed identity.
    fn merge_enriched(&self, tag: u64, incoming: &User) -> bool {
        let mut core = self.core.lock();
        if core.identity_generation != tag || core.phase() != AuthPhase::Authenticated {
            debug!(tag, current = core.identity_generation, "StaleGenerationIgnored: enrichment");
            return false;
        }
        let Some(mut user) = core.user.clone() else {
            return false;
        };
        if !user.merge_from(incoming) {
            return false;
        }
        debug!(user_id = %user.id, "Profile merged");
        self.update_installed_user(&mut core, user)
    }

    fn update_installed_user(&self, core: &mut Core, user: User) -> bool {
        let Some(session) = core.session.clone() else {
            return false;
        };
        let previous_locale = core.user.as_ref().and_then(|u| u.profile.locale.clone());
        let record = StorageRecord::new(&session, &user);
        let locale_changed = user.profile.locale != previous_locale;

        if !self.commit(core, MachineInput::UserUpdated, Identity::UpdateUser(user)) {
            return false;
        }
        if locale_changed {
            let _ = self.writer.persist(core.applied_generation, record);
        }
        true
    }

    /// Restore the session at process start.
    ///
    /// Resolves once the state has left `Restoring`. Can only be called once.
    pub async fn initialize(self: &Arc<Self>) -> AuthResult<AuthState> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(AuthError::AlreadyInitialized);
        }

        let generation = self.next_generation();
        {
            let mut core = self.core.lock();
            core.admit(generation);
            self.commit(&mut core, MachineInput::BootstrapStarted, Identity::Keep);
        }
        info!(generation, "Restoring session");

        // Migration runs in the writer ahead of any session write; the cache
        // is read after it so a migrated token is visible.
        let migrated = self.writer.migrate();
        let store = Arc::clone(&self.store);
        let cached = tokio::spawn(async move {
            migrated.wait().await;
            read_cached_credentials(store).await
        });

        // Listen before asking, so a session reported in between is not missed.
        self.start_event_loop(self.backend.on_session_change());

        let backend = Arc::clone(&self.backend);
        let lookup = tokio::spawn(async move { backend.get_current_session().await });
        let remote = match timeout(self.config.bootstrap_timeout, lookup).await {
            Ok(Ok(Ok(session))) => session,
            Ok(Ok(Err(e))) => {
                warn!(error = %e, transient = e.is_transient(), "Session lookup failed");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Session lookup task failed");
                None
            }
            Err(_) => {
                info!(
                    timeout_ms = self.config.bootstrap_timeout.as_millis() as u64,
                    "Session lookup timed out"
                );
                None
            }
        };

        match remote {
            Some(session) => {
                let user = session.minimal_user();
                self.install(generation, session, user, Origin::Restore);
            }
            None => {
                let cached = match timeout(self.config.cached_restore_timeout, cached).await {
                    Ok(Ok(cached)) => cached,
                    Ok(Err(e)) => {
                        warn!(error = %e, "Cached credential read failed");
                        CachedCredentials::default()
                    }
                    Err(_) => {
                        warn!("Cached credential read timed out, treating as nothing cached");
                        CachedCredentials::default()
                    }
                };
                self.restore_from_cache(generation, cached).await;
            }
        }

        self.finish_restoring();
        let state = self.state();
        info!(state = %state.phase(), "Session restore finished");
        Ok(state)
    }

    async fn restore_from_cache(self: &Arc<Self>, generation: u64, cached: CachedCredentials) {
        let (Some(access_token), Some(user_id)) = (cached.access_token, cached.user_id) else {
            debug!("No cached credentials");
            let mut core = self.core.lock();
            if core.phase() == AuthPhase::Restoring && core.admit(generation) {
                self.commit(&mut core, MachineInput::NoSessionFound, Identity::Keep);
            }
            return;
        };

        let resolved = timeout(
            self.config.cached_restore_timeout,
            self.backend.get_user_by_token(&access_token),
        )
        .await;

        let reason = match resolved {
            Ok(Ok(Some(user))) if user.id == user_id => {
                let mut session = Session::new(access_token, user_id);
                if let Some(refresh_token) = cached.refresh_token {
                    session = session.with_refresh_token(refresh_token);
                }
                if self.install(generation, session.clone(), user, Origin::Restore) {
                    self.backend.adopt_session(&session);
                }
                return;
            }
            Ok(Ok(Some(_))) => "token belongs to another user".to_string(),
            Ok(Ok(None)) => "token rejected".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(_) => "user lookup timed out".to_string(),
        };

        warn!(reason = %reason, "Cached credentials are stale, clearing");
        let _ = self.clear_local(generation, MachineInput::NoSessionFound);
    }

    fn finish_restoring(&self) {
        let mut core = self.core.lock();
        if core.phase() == AuthPhase::Restoring {
            warn!("Bootstrap ended without a decision, treating as signed out");
            self.commit(&mut core, MachineInput::NoSessionFound, Identity::Keep);
        }
    }

    fn start_event_loop(self: &Arc<Self>, mut events: broadcast::Receiver<SessionEvent>) {
        let coordinator = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let mut lagged = false;
            loop {
                let received = events.recv().await;
                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                match received {
                    Ok(event) => coordinator.handle_event(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Session events lagged, will resync");
                        lagged = true;
                    }
                    Err(RecvError::Closed) => break,
                }
                // Resync once the retained backlog is drained, so the lookup
                // result is newer than anything still queued.
                if lagged && events.is_empty() {
                    lagged = false;
                    coordinator.resync().await;
                }
            }
            debug!("Session event loop stopped");
        });

        if let Some(previous) = self.event_loop.lock().replace(handle) {
            previous.abort();
        }
    }

    fn handle_event(self: &Arc<Self>, event: SessionEvent) {
        let generation = self.next_generation();

        match event {
            SessionEvent::Active(session) => {
                debug!(generation, user_id = %session.user_id, "Session event: active");
                let user = session.minimal_user();
                self.install(generation, session, user, Origin::Event);
            }
            SessionEvent::Cleared => {
                debug!(generation, "Session event: cleared");
                self.apply_cleared(generation);
            }
        }
    }

    fn apply_cleared(&self, generation: u64) {
        let mut core = self.core.lock();
        // Bootstrap and sign-out settle their own outcome.
        if core.phase() != AuthPhase::Authenticated {
            return;
        }
        if core.admit(generation)
            && self.commit(&mut core, MachineInput::SessionCleared, Identity::Clear)
        {
            info!(generation, "Session cleared by backend");
            let _ = self.writer.clear(generation);
        }
    }

    /// Ask the backend for its current session after missed events and
    /// reconcile with it.
    async fn resync(self: &Arc<Self>) {
        let generation = self.next_generation();
        match timeout(self.config.bootstrap_timeout, self.backend.get_current_session()).await {
            Ok(Ok(Some(session))) => {
                debug!(generation, user_id = %session.user_id, "Resync: backend has a session");
                let user = session.minimal_user();
                self.install(generation, session, user, Origin::Event);
            }
            Ok(Ok(None)) => {
                debug!(generation, "Resync: backend has no session");
                self.apply_cleared(generation);
            }
            Ok(Err(e)) => warn!(generation, error = %e, "Resync lookup failed, keeping state"),
            Err(_) => warn!(generation, "Resync lookup timed out, keeping state"),
        }
    }

    /// Sign in with an identifier and secret.
    ///
    /// Returns once the session is installed; credential persistence and
    /// profile enrichment continue in the background. If an operation started
    /// later has already applied, the session is returned but not installed.
    pub async fn sign_in(self: &Arc<Self>, identifier: &str, secret: &str) -> AuthResult<Session> {
        let generation = self.next_generation();
        debug!(generation, "Sign-in requested");

        let SignIn { session, user } = self
            .backend
            .sign_in_with_password(identifier, secret)
            .await
            .map_err(|e| {
                warn!(generation, error = %e, "Sign-in failed");
                AuthError::from(e)
            })?;

        if !self.install(generation, session.clone(), user, Origin::SignIn) {
            info!(generation, "Sign-in result superseded, not installed");
        }
        Ok(session)
    }

    /// Sign out.
    ///
    /// Local state and every stored key are cleared before the backend is
    /// told. A backend failure is returned, but the client is signed out
    /// locally either way.
    pub async fn sign_out(&self) -> AuthResult<()> {
        let generation = self.next_generation();
        info!(generation, "Sign-out requested");

        let Some(cleared) = self.clear_local(generation, MachineInput::SignOutRequested) else {
            return Ok(());
        };
        cleared.wait().await;

        let result = self.backend.sign_out().await;
        if let Err(e) = &result {
            warn!(generation, error = %e, "Backend sign-out failed, local session already cleared");
        }

        {
            let mut core = self.core.lock();
            if core.admit(generation) {
                self.commit(&mut core, MachineInput::SignOutComplete, Identity::Keep);
            } else {
                debug!(generation, "StaleGenerationIgnored: sign-out completion");
            }
        }

        result.map_err(AuthError::from)
    }

    /// Re-run profile enrichment for the current user and return the result.
    pub async fn refresh(&self) -> AuthResult<User> {
        let (tag, user_id, access_token) = {
            let core = self.core.lock();
            match (&core.session, core.phase()) {
                (Some(session), AuthPhase::Authenticated) => (
                    core.identity_generation,
                    session.user_id.clone(),
                    session.access_token.clone(),
                ),
                _ => return Err(AuthError::NotAuthenticated),
            }
        };

        if let Some(user) = self.enrichment.load(&user_id, &access_token).await? {
            self.merge_enriched(tag, &user);
        }

        self.state()
            .user()
            .cloned()
            .ok_or(AuthError::NotAuthenticated)
    }

    /// Merge `patch` into the current user without clearing any field.
    pub fn update_user(&self, patch: &Profile) -> AuthResult<User> {
        let mut core = self.core.lock();
        if core.phase() != AuthPhase::Authenticated {
            return Err(AuthError::NotAuthenticated);
        }
        let Some(mut user) = core.user.clone() else {
            return Err(AuthError::NotAuthenticated);
        };

        if user.profile.merge(patch) {
            self.update_installed_user(&mut core, user.clone());
        }
        Ok(user)
    }

    /// Wait for every queued credential write to finish.
    pub async fn flush_persistence(&self) {
        self.writer.flush().await;
    }

    /// Stop background work: event loop, timer, and writer.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.event_loop.lock().take() {
            handle.abort();
        }
        self.scheduler.cancel();
        self.writer.flush().await;
        self.writer.shutdown();
        info!("Session coordinator stopped");
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop.lock().take() {
            handle.abort();
        }
    }
}
