//! Command implementations. Each command builds its own coordinator and
//! shuts it down before returning.

use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use credential_store::create_store;
use identity_backend::SupabaseBackend;
use session_config_and_utils::{Config, Paths};
use session_lifecycle_coordinator::{AuthError, CoordinatorConfig, SessionCoordinator};
use std::sync::Arc;
use tracing::{debug, info};

/// Wire the coordinator to the configured store and backend.
pub fn build_coordinator(config: &Config, paths: &Paths) -> Result<Arc<SessionCoordinator>> {
    let store = create_store(config.store_backend, paths, &config.keychain_service)?;
    let backend = Arc::new(SupabaseBackend::new(
        config.supabase_url.clone(),
        config.supabase_publishable_key.clone(),
    ));
    debug!(supabase_url = %config.supabase_url, "Identity backend configured");

    Ok(SessionCoordinator::new(
        backend.clone(),
        backend,
        store,
        CoordinatorConfig::from(config),
    ))
}

/// Report an auth failure the way an end user should see it.
fn fail(err: AuthError, format: OutputFormat) -> Result<()> {
    debug!(error = %err, "Command failed");
    output::print_error(err.user_message(), format);
    bail!(err)
}

/// Restore the session and print the resulting state.
pub async fn status(coordinator: Arc<SessionCoordinator>, format: OutputFormat) -> Result<()> {
    let state = match coordinator.initialize().await {
        Ok(state) => state,
        Err(err) => return fail(err, format),
    };
    coordinator.shutdown().await;
    output::print_state(&state, format);
    Ok(())
}

/// Sign in with email and password.
pub async fn login(
    coordinator: Arc<SessionCoordinator>,
    email: &str,
    password: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let Some(password) = password.filter(|p| !p.is_empty()) else {
        output::print_error("Password is required", format);
        bail!("missing password");
    };
    if email.trim().is_empty() {
        output::print_error("Email is required", format);
        bail!("missing email");
    }

    if let Err(err) = coordinator.initialize().await {
        return fail(err, format);
    }
    if let Some(user) = coordinator.state().user() {
        info!(user_id = %user.id, "Replacing existing session");
    }

    let result = coordinator.sign_in(email.trim(), &password).await;
    coordinator.shutdown().await;
    match result {
        Ok(_) => {
            output::print_state(&coordinator.state(), format);
            Ok(())
        }
        Err(err) => fail(err, format),
    }
}

/// Sign out, clearing every stored credential.
pub async fn logout(coordinator: Arc<SessionCoordinator>, format: OutputFormat) -> Result<()> {
    if let Err(err) = coordinator.initialize().await {
        return fail(err, format);
    }
    let result = coordinator.sign_out().await;
    coordinator.shutdown().await;
    match result {
        Ok(()) => {
            output::print_success("Logged out", format);
            Ok(())
        }
        // Local credentials are gone either way.
        Err(err @ AuthError::BackendUnavailable(_)) => {
            output::print_success("Logged out on this device", format);
            debug!(error = %err, "Server sign-out did not complete");
            Ok(())
        }
        Err(err) => fail(err, format),
    }
}

/// Print every state transition until Ctrl-C.
pub async fn watch(coordinator: Arc<SessionCoordinator>, format: OutputFormat) -> Result<()> {
    let subscription = coordinator.subscribe(move |state| output::print_state(state, format));
    if let Err(err) = coordinator.initialize().await {
        subscription.unsubscribe();
        return fail(err, format);
    }
    coordinator.set_side_effect_callback(Arc::new(|| {
        info!("Session still active");
    }));

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, stopping");
    subscription.unsubscribe();
    coordinator.shutdown().await;
    Ok(())
}
