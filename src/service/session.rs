use crate::config::{FetchFailurePolicy, SessionConfig};
use crate::database::record_store::{RecordStore, collections, fetch_optional_record, fetch_record, put_record};
use crate::error::app_error::{AppError, AuthError, FetchError};
use crate::models::company::CompanyProfile;
use crate::models::identity::Identity;
use crate::models::session::{SessionPhase, SessionSnapshot};
use crate::models::user::{SignUpRequest, UserProfile};
use crate::service::identity::IdentityProvider;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use validator::Validate;

/// Keeps the published session in step with the identity provider.
///
/// A single listener task owns the phase and profile fields of the snapshot.
/// Each identity event starts a fetch chain (user, then company); a newer
/// event drops the running chain before it can publish anything.
pub struct SessionSynchronizer {
    identity: Arc<dyn IdentityProvider>,
    records: Arc<dyn RecordStore>,
    ack_timeout: Duration,
    state: Arc<watch::Sender<SessionSnapshot>>,
    shutdown: watch::Sender<bool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionSynchronizer {
    /// Creates the synchronizer and spawns its listener on the current runtime.
    pub fn start(identity: Arc<dyn IdentityProvider>, records: Arc<dyn RecordStore>, config: &SessionConfig) -> Arc<Self> {
        let (state, _) = watch::channel(SessionSnapshot::default());
        let state = Arc::new(state);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let listener = tokio::spawn(listen(
            identity.subscribe(),
            shutdown_rx,
            Arc::clone(&state),
            Arc::clone(&records),
            config.fetch_failure_policy,
        ));

        Arc::new(Self {
            identity,
            records,
            ack_timeout: Duration::from_millis(config.identity_ack_timeout_ms),
            state,
            shutdown,
            listener: Mutex::new(Some(listener)),
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Signs in through the identity provider.
    ///
    /// Returns once the listener has picked up the new identity, so the
    /// session reports loading from the call until the fetch chain ends.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let _in_flight = InFlight::enter(&self.state);
        let seen = self.state.borrow().observed_events;
        let identity = self.identity.sign_in(email, password).await?;
        self.await_observed(seen, Some(&identity.id)).await;
        Ok(())
    }

    /// Creates an account with its user profile, then signs it in.
    ///
    /// The profile is written before the sign-in so the identity event never
    /// races the record it depends on.
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<(), AppError> {
        let _in_flight = InFlight::enter(&self.state);
        request.validate()?;

        let company: Option<CompanyProfile> = fetch_optional_record(self.records.as_ref(), collections::COMPANIES, &request.company_id).await?;
        if company.is_none() {
            return Err(AppError::BadRequest(format!("Company {} does not exist", request.company_id)));
        }

        let identity = self.identity.sign_up(&request.email, &request.password).await?;
        let profile = UserProfile::new(
            &identity.id,
            &identity.email,
            request.first_name.trim(),
            request.last_name.trim(),
            request.role.unwrap_or_default(),
            &request.company_id,
        );
        if let Err(e) = put_record(self.records.as_ref(), collections::USERS, &identity.id, &profile).await {
            error!(identity_id = %identity.id, error = %e, "account created but user profile could not be written");
            return Err(e.into());
        }
        info!(user_id = %profile.id, company_id = %profile.company_id, role = ?profile.role, "user profile created");

        self.sign_in(&request.email, &request.password).await?;
        Ok(())
    }

    /// Signs out. Returns once the listener has cleared the session.
    pub async fn sign_out(&self) -> Result<(), AppError> {
        let _in_flight = InFlight::enter(&self.state);
        let seen = self.state.borrow().observed_events;
        self.identity.sign_out().await?;
        self.await_observed(seen, None).await;
        Ok(())
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), AppError> {
        self.identity.reset_password(email).await
    }

    pub async fn confirm_password_reset(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        self.identity.confirm_password_reset(token, new_password).await
    }

    /// The signed-in user together with their company, for operations that
    /// act on behalf of the session.
    pub fn authenticated_member(&self) -> Result<(UserProfile, CompanyProfile), AppError> {
        let snapshot = self.state.borrow();
        match (&snapshot.current_user, &snapshot.current_company) {
            (Some(user), Some(company)) => Ok((user.clone(), company.clone())),
            (Some(_), None) => Err(AppError::Forbidden("Company profile is not available".to_string())),
            (None, _) => Err(AppError::Unauthorized),
        }
    }

    /// Stops the listener. The last published snapshot stays readable.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.listener.lock().ok().and_then(|mut listener| listener.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "session listener ended abnormally");
            }
            info!("session listener stopped");
        }
    }

    /// Waits for an identity event newer than `seen` that carries `expected`.
    async fn await_observed(&self, seen: u64, expected: Option<&str>) {
        let mut rx = self.state.subscribe();
        let observed = rx.wait_for(|s| s.observed_events > seen && s.observed_identity_id.as_deref() == expected);
        match tokio::time::timeout(self.ack_timeout, observed).await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => warn!("session listener is gone; not waiting for identity"),
            Err(_) => warn!(
                expected = ?expected,
                timeout_ms = self.ack_timeout.as_millis() as u64,
                "identity change not observed in time"
            ),
        }
    }
}

impl Drop for SessionSynchronizer {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().ok().and_then(|listener| listener.take()) {
            handle.abort();
        }
    }
}

/// Counts an auth call for as long as it is alive.
struct InFlight<'a> {
    state: &'a watch::Sender<SessionSnapshot>,
}

impl<'a> InFlight<'a> {
    fn enter(state: &'a watch::Sender<SessionSnapshot>) -> Self {
        state.send_modify(|s| s.auth_calls_in_flight += 1);
        Self { state }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|s| s.auth_calls_in_flight = s.auth_calls_in_flight.saturating_sub(1));
    }
}

async fn listen(
    mut identities: watch::Receiver<Option<Identity>>,
    mut shutdown: watch::Receiver<bool>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    records: Arc<dyn RecordStore>,
    policy: FetchFailurePolicy,
) {
    let mut current = identities.borrow_and_update().clone();
    debug!("session listener started");

    loop {
        let chain = sync_identity(current.clone(), &state, records.as_ref(), policy);
        tokio::pin!(chain);
        let mut chain_done = false;
        let mut provider_closed = false;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                changed = identities.changed() => {
                    match changed {
                        Ok(()) => current = identities.borrow_and_update().clone(),
                        Err(_) => provider_closed = true,
                    }
                    break;
                }
                _ = &mut chain, if !chain_done => chain_done = true,
            }
        }

        if provider_closed {
            // Let the running chain land, then stop.
            if !chain_done {
                chain.await;
            }
            warn!("identity provider closed its event stream");
            return;
        }
        if !chain_done {
            debug!("dropping stale fetch chain");
        }
    }
}

/// Applies one identity event: clears the session, or fetches the user and
/// then the company for it.
async fn sync_identity(identity: Option<Identity>, state: &watch::Sender<SessionSnapshot>, records: &dyn RecordStore, policy: FetchFailurePolicy) {
    let Some(identity) = identity else {
        state.send_modify(|s| {
            s.phase = SessionPhase::LoggedOut;
            s.current_user_id = None;
            s.current_user = None;
            s.current_company = None;
            s.last_error = None;
            s.observed_identity_id = None;
            s.observed_events += 1;
        });
        info!("session cleared");
        return;
    };

    state.send_modify(|s| {
        s.phase = SessionPhase::LoadingProfile;
        s.current_user_id = Some(identity.id.clone());
        s.current_user = None;
        s.current_company = None;
        s.last_error = None;
        s.observed_identity_id = Some(identity.id.clone());
        s.observed_events += 1;
    });

    let user: UserProfile = match fetch_record(records, collections::USERS, &identity.id).await {
        Ok(user) => user,
        Err(e) => {
            let last_error = report_fetch_failure(&e, policy, "user profile");
            state.send_modify(|s| {
                s.phase = SessionPhase::LoggedOut;
                s.current_user_id = None;
                s.last_error = last_error;
            });
            return;
        }
    };

    let company_id = user.company_id.clone();
    state.send_modify(|s| {
        s.phase = SessionPhase::LoadingCompany;
        s.current_user = Some(user);
    });

    let company: Result<CompanyProfile, FetchError> = fetch_record(records, collections::COMPANIES, &company_id).await;
    let (company, last_error) = match company {
        Ok(company) => (Some(company), None),
        Err(e) => (None, report_fetch_failure(&e, policy, "company profile")),
    };
    state.send_modify(|s| {
        s.phase = SessionPhase::Authenticated;
        s.current_company = company;
        s.last_error = last_error;
    });
    info!(user_id = %identity.id, company_id = %company_id, "session authenticated");
}

/// Logs a fetch failure and returns what the snapshot should publish for it.
fn report_fetch_failure(e: &FetchError, policy: FetchFailurePolicy, what: &str) -> Option<String> {
    if e.is_not_found() {
        warn!(error = %e, record = what, "record missing during session sync");
    } else {
        error!(error = ?e, record = what, "failed to fetch record during session sync");
    }
    match policy {
        FetchFailurePolicy::Suppress => None,
        FetchFailurePolicy::Surface => Some(format!("Failed to load {}: {}", what, e)),
    }
}
