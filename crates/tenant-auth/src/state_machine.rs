//! Auth state machine: the single writer of the published [`AuthSnapshot`].
//!
//! [`AuthCore`] owns the transition table. It consumes a finite set of named
//! inputs (startup outcome, provider event, resolver completion, explicit
//! sign-out, reload) and is synchronous, so the table can be exercised without
//! a runtime. [`AuthStateMachine`] drives it: it relays provider events, runs
//! the startup read and executes the resolutions the core asks for.
//!
//! Ordering guarantee: a resolution commits only if, at completion time, the
//! machine is alive, no newer subject change happened (epoch) and the tracked
//! user id still equals the one the resolution was issued for.

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthPhase};
use crate::capability::Capabilities;
use crate::error::{AuthError, AuthResult, ResolveError};
use crate::profile_resolver::ProfileResolver;
use crate::session_store::{AuthChange, SessionStore};
use crate::types::{Organization, Profile, Role, Session, SignUpMetadata, TenantContext, User};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The single externally visible view of authentication state.
///
/// Snapshots are immutable: every change publishes a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSnapshot {
    pub phase: AuthPhase,
    pub user: Option<User>,
    #[serde(skip)]
    pub session: Option<Session>,
    pub profile: Option<Profile>,
    pub organization: Option<Organization>,
    pub roles: Vec<Role>,
    pub is_loading: bool,
}

impl AuthSnapshot {
    /// Snapshot at process start, before the startup session read finishes.
    pub fn initial() -> Self {
        Self {
            phase: AuthPhase::Uninitialized,
            user: None,
            session: None,
            profile: None,
            organization: None,
            roles: Vec::new(),
            is_loading: true,
        }
    }

    /// Terminal unauthenticated snapshot.
    pub fn signed_out() -> Self {
        Self {
            phase: AuthPhase::SignedOut,
            is_loading: false,
            ..Self::initial()
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.id.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Capability flags for the current role set. Recomputed on every call.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::from_roles(&self.roles)
    }

    pub fn is_admin(&self) -> bool {
        self.capabilities().is_admin
    }

    pub fn is_org_member(&self) -> bool {
        self.capabilities().is_org_member
    }

    pub fn organization_id(&self) -> Option<&str> {
        self.organization.as_ref().map(|org| org.id.as_str())
    }

    /// The organization tenant-scoped queries should run against.
    ///
    /// Fails with [`AuthError::ProfileNotProvisioned`] when no profile or
    /// organization is committed.
    pub fn require_tenant(&self) -> AuthResult<(&Profile, &Organization)> {
        match (&self.profile, &self.organization) {
            (Some(profile), Some(organization)) => Ok((profile, organization)),
            _ => Err(AuthError::ProfileNotProvisioned),
        }
    }
}

/// A resolution the core wants executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveTicket {
    pub user_id: String,
    pub epoch: u64,
}

/// Inputs consumed by [`AuthCore::apply`].
#[derive(Debug)]
pub enum AuthInput {
    /// Outcome of the startup session read, started at `epoch`.
    Startup {
        epoch: u64,
        outcome: AuthResult<Option<Session>>,
    },
    /// A session change relayed from the identity provider.
    ProviderEvent(AuthChange),
    /// A resolution finished.
    ResolverCompleted {
        ticket: ResolveTicket,
        outcome: Result<TenantContext, ResolveError>,
    },
    /// Local sign-out.
    SignOut,
    /// Re-resolve the tracked user.
    Reload,
}

struct Machine {
    fsm: AuthMachine,
    tracked_user_id: Option<String>,
    /// Bumped whenever the tracked user id changes or a reload starts.
    epoch: u64,
    alive: bool,
}

impl Machine {
    fn phase(&self) -> AuthPhase {
        AuthPhase::from(self.fsm.state())
    }

    fn transition(&mut self, input: AuthMachineInput) -> AuthPhase {
        let old_phase = self.phase();
        if self.fsm.consume(&input).is_err() {
            warn!(input = ?input, phase = ?old_phase, "Rejected auth phase transition");
        }
        let new_phase = self.phase();
        if old_phase != new_phase {
            debug!(old_phase = ?old_phase, new_phase = ?new_phase, "Auth phase transition");
        }
        new_phase
    }
}

/// Owner of the transition table and the only snapshot writer.
pub struct AuthCore {
    machine: Mutex<Machine>,
    snapshot_tx: watch::Sender<Arc<AuthSnapshot>>,
}

impl Default for AuthCore {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthCore {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(AuthSnapshot::initial()));
        Self {
            machine: Mutex::new(Machine {
                fsm: AuthMachine::new(),
                tracked_user_id: None,
                epoch: 0,
                alive: true,
            }),
            snapshot_tx,
        }
    }

    pub fn snapshot(&self) -> Arc<AuthSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<AuthSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn epoch(&self) -> u64 {
        self.machine.lock().epoch
    }

    pub fn tracked_user_id(&self) -> Option<String> {
        self.machine.lock().tracked_user_id.clone()
    }

    /// Stop accepting inputs. Later inputs, including late resolver
    /// completions, perform no writes.
    pub fn shutdown(&self) {
        self.machine.lock().alive = false;
    }

    pub fn is_alive(&self) -> bool {
        self.machine.lock().alive
    }

    /// Apply one input. Returns the resolution to run, if any.
    pub fn apply(&self, input: AuthInput) -> Option<ResolveTicket> {
        let mut machine = self.machine.lock();
        if !machine.alive {
            debug!(input = ?input, "Auth state machine is shut down, ignoring input");
            return None;
        }

        match input {
            AuthInput::Startup { epoch, outcome } => {
                if machine.epoch != epoch {
                    debug!("Startup session read superseded by a provider event");
                    return None;
                }
                match outcome {
                    Ok(Some(session)) => self.begin_resolution(&mut machine, session),
                    Ok(None) => {
                        info!("No session on startup");
                        self.end_session(&mut machine, AuthMachineInput::NoSession);
                        None
                    }
                    Err(error) => {
                        warn!(error = %error, "Startup session read failed, treating as signed out");
                        self.end_session(&mut machine, AuthMachineInput::NoSession);
                        None
                    }
                }
            }

            AuthInput::ProviderEvent(change) => match change.session {
                Some(session) => {
                    if machine.tracked_user_id.as_deref() == Some(session.subject()) {
                        debug!(
                            event = ?change.event,
                            user_id = %session.subject(),
                            "Session change for tracked user, nothing to resolve"
                        );
                        return None;
                    }
                    self.begin_resolution(&mut machine, session)
                }
                None => {
                    if machine.tracked_user_id.is_none() && machine.phase() == AuthPhase::SignedOut
                    {
                        return None;
                    }
                    info!(event = ?change.event, "Session ended");
                    self.end_session(&mut machine, AuthMachineInput::SessionEnded);
                    None
                }
            },

            AuthInput::ResolverCompleted { ticket, outcome } => {
                let current = machine.epoch == ticket.epoch
                    && machine.tracked_user_id.as_deref() == Some(ticket.user_id.as_str());
                if !current {
                    debug!(
                        user_id = %ticket.user_id,
                        ticket_epoch = ticket.epoch,
                        current_epoch = machine.epoch,
                        "Discarding superseded resolution"
                    );
                    return None;
                }

                let context = match outcome {
                    Ok(context) => context,
                    Err(error) => {
                        warn!(
                            user_id = %ticket.user_id,
                            error = %error,
                            "Tenant resolution failed, continuing without tenant data"
                        );
                        TenantContext::unprovisioned()
                    }
                };

                let phase = machine.transition(AuthMachineInput::ResolutionCommitted);
                let previous = self.snapshot();
                info!(
                    user_id = %ticket.user_id,
                    organization_id = context.organization.as_ref().map(|org| org.id.as_str()),
                    role_count = context.roles.len(),
                    "Tenant context committed"
                );
                self.publish(AuthSnapshot {
                    phase,
                    user: previous.user.clone(),
                    session: previous.session.clone(),
                    profile: context.profile,
                    organization: context.organization,
                    roles: context.roles,
                    is_loading: phase.is_loading(),
                });
                None
            }

            AuthInput::SignOut => {
                if machine.tracked_user_id.is_none() && machine.phase() == AuthPhase::SignedOut {
                    return None;
                }
                info!("Signing out locally");
                self.end_session(&mut machine, AuthMachineInput::SessionEnded);
                None
            }

            AuthInput::Reload => {
                let Some(user_id) = machine.tracked_user_id.clone() else {
                    debug!("Reload requested without a tracked user");
                    return None;
                };
                machine.epoch += 1;
                let phase = machine.transition(AuthMachineInput::ResolveSubject);
                let previous = self.snapshot();
                self.publish(AuthSnapshot {
                    phase,
                    is_loading: phase.is_loading(),
                    ..(*previous).clone()
                });
                Some(ResolveTicket {
                    user_id,
                    epoch: machine.epoch,
                })
            }
        }
    }

    /// Track a new subject. Previously committed tenant data stays visible
    /// until the new resolution commits.
    fn begin_resolution(&self, machine: &mut Machine, session: Session) -> Option<ResolveTicket> {
        let user_id = session.subject().to_string();
        machine.tracked_user_id = Some(user_id.clone());
        machine.epoch += 1;
        let phase = machine.transition(AuthMachineInput::ResolveSubject);

        debug!(user_id = %user_id, epoch = machine.epoch, "Tracking new subject");

        let previous = self.snapshot();
        self.publish(AuthSnapshot {
            phase,
            user: Some(session.user.clone()),
            session: Some(session),
            profile: previous.profile.clone(),
            organization: previous.organization.clone(),
            roles: previous.roles.clone(),
            is_loading: phase.is_loading(),
        });

        Some(ResolveTicket {
            user_id,
            epoch: machine.epoch,
        })
    }

    fn end_session(&self, machine: &mut Machine, input: AuthMachineInput) {
        machine.tracked_user_id = None;
        machine.epoch += 1;
        let phase = machine.transition(input);
        self.publish(AuthSnapshot {
            phase,
            ..AuthSnapshot::signed_out()
        });
    }

    fn publish(&self, snapshot: AuthSnapshot) {
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }
}

/// Orchestrates the session store and profile resolver around an [`AuthCore`].
///
/// Dropping the machine tears it down: the subscription is cancelled and
/// in-flight resolutions complete without writing.
pub struct AuthStateMachine {
    core: Arc<AuthCore>,
    store: SessionStore,
    resolver: ProfileResolver,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AuthStateMachine {
    /// Subscribe to the provider, then read the current session.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(store: SessionStore, resolver: ProfileResolver) -> Self {
        let core = Arc::new(AuthCore::new());

        // Subscribe before the startup read so no change is missed
        let mut subscription = store.subscribe();
        let startup_epoch = core.epoch();

        let listener = tokio::spawn({
            let core = core.clone();
            let resolver = resolver.clone();
            async move {
                while let Some(change) = subscription.next().await {
                    dispatch(&core, &resolver, AuthInput::ProviderEvent(change));
                }
                debug!("Session change listener stopped");
            }
        });

        let startup = tokio::spawn({
            let core = core.clone();
            let resolver = resolver.clone();
            let store = store.clone();
            async move {
                let outcome = store.current_session().await;
                dispatch(
                    &core,
                    &resolver,
                    AuthInput::Startup {
                        epoch: startup_epoch,
                        outcome,
                    },
                );
            }
        });

        Self {
            core,
            store,
            resolver,
            tasks: Mutex::new(vec![listener, startup]),
        }
    }

    pub fn snapshot(&self) -> Arc<AuthSnapshot> {
        self.core.snapshot()
    }

    /// Receiver that observes every published snapshot.
    pub fn watch(&self) -> watch::Receiver<Arc<AuthSnapshot>> {
        self.core.watch()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.snapshot().capabilities()
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    /// Wait until the published snapshot is no longer loading.
    pub async fn wait_until_settled(&self) -> Arc<AuthSnapshot> {
        let mut rx = self.watch();
        let settled = match rx.wait_for(|snapshot| !snapshot.is_loading).await {
            Ok(snapshot) => Arc::clone(&snapshot),
            Err(_) => self.snapshot(),
        };
        settled
    }

    /// Sign in with email and password.
    ///
    /// Resolution is triggered by the provider's resulting session change,
    /// never by this call.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<()> {
        self.store.sign_in(email, password).await?;
        info!("Sign-in accepted by provider");
        Ok(())
    }

    /// Register a new account. Same resolution rule as [`Self::sign_in`].
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> AuthResult<()> {
        self.store.sign_up(email, password, metadata).await?;
        info!("Sign-up accepted by provider");
        Ok(())
    }

    /// Clear local state immediately, then sign out at the provider.
    pub async fn sign_out(&self) {
        dispatch(&self.core, &self.resolver, AuthInput::SignOut);

        if let Err(error) = self.store.sign_out().await {
            warn!(error = %error, "Provider sign-out failed, local session already cleared");
        }
    }

    /// Re-resolve the tenant context of the current user.
    pub fn refresh_tenant(&self) {
        dispatch(&self.core, &self.resolver, AuthInput::Reload);
    }

    /// Cancel the subscription and stop writing snapshots.
    pub fn shutdown(&self) {
        self.core.shutdown();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for AuthStateMachine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch(core: &Arc<AuthCore>, resolver: &ProfileResolver, input: AuthInput) {
    if let Some(ticket) = core.apply(input) {
        spawn_resolution(core.clone(), resolver.clone(), ticket);
    }
}

fn spawn_resolution(core: Arc<AuthCore>, resolver: ProfileResolver, ticket: ResolveTicket) {
    tokio::spawn(async move {
        debug!(user_id = %ticket.user_id, epoch = ticket.epoch, "Resolving tenant context");
        let outcome = resolver.resolve(&ticket.user_id).await;
        dispatch(
            &core,
            &resolver,
            AuthInput::ResolverCompleted { ticket, outcome },
        );
    });
}
