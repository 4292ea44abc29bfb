use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use shared::{
    domain::{AuthIdentity, Credentials, Meetup, MeetupDraft, MeetupId, NewMeetup, User},
    error::BackendError,
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    catalog::{project_records, sorted_by_date, FEATURED_LIMIT},
    error::{ActionKind, StoreError},
    MeetupBackend, MissingBackend, MEETUP_COLLECTION,
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActionStatus {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed,
}

/// Status of one action kind. `in_flight` counts calls that have started but
/// not settled, so overlapping calls of the same kind stay `Pending` until the
/// last one resolves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionActivity {
    pub status: ActionStatus,
    pub in_flight: u32,
}

#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub loaded_meetups: Vec<Meetup>,
    pub user: Option<User>,
    pub activity: HashMap<ActionKind, ActionActivity>,
    pub error: Option<StoreError>,
}

impl StoreState {
    fn activity(&self, kind: ActionKind) -> ActionActivity {
        self.activity.get(&kind).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    CatalogReplaced { count: usize },
    MeetupAdded(Meetup),
    UserChanged(Option<User>),
    StatusChanged { kind: ActionKind, status: ActionStatus },
    ErrorChanged(Option<StoreError>),
}

#[derive(Debug, Clone, Copy)]
enum AuthFlow {
    SignUp,
    SignIn,
}

impl AuthFlow {
    fn kind(self) -> ActionKind {
        match self {
            Self::SignUp => ActionKind::SignUp,
            Self::SignIn => ActionKind::SignIn,
        }
    }
}

/// Session & catalog store. Actions talk to the backend and commit their
/// outcome through mutators; selectors read the committed state.
pub struct Store {
    backend: Arc<dyn MeetupBackend>,
    state: RwLock<StoreState>,
    events: broadcast::Sender<StoreEvent>,
}

impl Store {
    pub fn new(backend: Arc<dyn MeetupBackend>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            backend,
            state: RwLock::new(StoreState::default()),
            events,
        })
    }

    pub fn without_backend() -> Arc<Self> {
        Self::new(Arc::new(MissingBackend))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    // Mutators. Each event is sent under the write guard that made the change.

    pub(crate) fn set_loaded_meetups(&self, meetups: Vec<Meetup>) {
        let mut state = self.state.write();
        let count = meetups.len();
        state.loaded_meetups = meetups;
        let _ = self.events.send(StoreEvent::CatalogReplaced { count });
    }

    pub(crate) fn append_meetup(&self, meetup: Meetup) {
        let mut state = self.state.write();
        state.loaded_meetups.push(meetup.clone());
        let _ = self.events.send(StoreEvent::MeetupAdded(meetup));
    }

    pub(crate) fn set_user(&self, user: Option<User>) {
        let mut state = self.state.write();
        state.user = user.clone();
        let _ = self.events.send(StoreEvent::UserChanged(user));
    }

    pub(crate) fn set_loading(&self, kind: ActionKind, loading: bool) {
        let mut state = self.state.write();
        let activity = state.activity.entry(kind).or_default();
        if loading {
            activity.in_flight += 1;
            activity.status = ActionStatus::Pending;
        } else {
            activity.in_flight = activity.in_flight.saturating_sub(1);
        }
        let status = activity.status;
        let _ = self.events.send(StoreEvent::StatusChanged { kind, status });
    }

    /// Records a final status; ignored while other calls of `kind` are in flight.
    pub(crate) fn set_status(&self, kind: ActionKind, status: ActionStatus) {
        let mut state = self.state.write();
        let activity = state.activity.entry(kind).or_default();
        if activity.in_flight > 0 {
            return;
        }
        activity.status = status;
        let _ = self.events.send(StoreEvent::StatusChanged { kind, status });
    }

    pub(crate) fn set_error(&self, error: Option<StoreError>) {
        let mut state = self.state.write();
        state.error = error.clone();
        let _ = self.events.send(StoreEvent::ErrorChanged(error));
    }

    pub(crate) fn clear_error(&self) {
        self.set_error(None);
    }

    fn settle(&self, kind: ActionKind, status: ActionStatus) {
        self.set_loading(kind, false);
        self.set_status(kind, status);
    }

    /// Clears the error field only when it was raised by the same action kind.
    fn clear_error_from(&self, kind: ActionKind) {
        let mut state = self.state.write();
        if state.error.as_ref().is_some_and(|err| err.category() == kind) {
            state.error = None;
            let _ = self.events.send(StoreEvent::ErrorChanged(None));
        }
    }

    fn fail(&self, kind: ActionKind, err: StoreError) -> StoreError {
        self.settle(kind, ActionStatus::Failed);
        self.set_error(Some(err.clone()));
        err
    }

    // Actions

    pub async fn load_meetups(&self) -> Result<(), StoreError> {
        let kind = ActionKind::LoadMeetups;
        self.set_loading(kind, true);

        let outcome = match self.backend.read(MEETUP_COLLECTION).await {
            Ok(raw) => project_records(raw),
            Err(err) => Err(StoreError::backend(kind, err)),
        };

        match outcome {
            Ok(meetups) => {
                info!(count = meetups.len(), "catalog: loaded meetups");
                self.set_loaded_meetups(meetups);
                self.settle(kind, ActionStatus::Succeeded);
                self.clear_error_from(kind);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "catalog: failed to load meetups");
                Err(self.fail(kind, err))
            }
        }
    }

    pub async fn create_meetup(&self, new: NewMeetup) -> Result<Meetup, StoreError> {
        let kind = ActionKind::CreateMeetup;
        let Some(creator_id) = self.user().map(|user| user.id) else {
            warn!(title = %new.title, "catalog: create meetup rejected without a signed-in user");
            self.set_status(kind, ActionStatus::Failed);
            self.set_error(Some(StoreError::NotSignedIn));
            return Err(StoreError::NotSignedIn);
        };

        self.set_loading(kind, true);
        let draft = MeetupDraft::from_new(new, creator_id);
        let written = match serde_json::to_value(&draft) {
            Ok(record) => self.backend.write(MEETUP_COLLECTION, record).await,
            Err(err) => Err(BackendError::decode(format!(
                "failed to encode meetup: {err}"
            ))),
        };

        match written {
            Ok(key) => {
                let meetup = draft.with_id(MeetupId(key));
                info!(id = %meetup.id, title = %meetup.title, "catalog: created meetup");
                self.append_meetup(meetup.clone());
                self.settle(kind, ActionStatus::Succeeded);
                self.clear_error_from(kind);
                Ok(meetup)
            }
            Err(err) => {
                error!(error = %err, title = %draft.title, "catalog: failed to create meetup");
                Err(self.fail(kind, StoreError::backend(kind, err)))
            }
        }
    }

    pub async fn sign_user_up(&self, credentials: &Credentials) -> Result<User, StoreError> {
        self.authenticate(AuthFlow::SignUp, credentials).await
    }

    pub async fn sign_user_in(&self, credentials: &Credentials) -> Result<User, StoreError> {
        self.authenticate(AuthFlow::SignIn, credentials).await
    }

    async fn authenticate(
        &self,
        flow: AuthFlow,
        credentials: &Credentials,
    ) -> Result<User, StoreError> {
        let kind = flow.kind();
        self.set_loading(kind, true);
        self.clear_error();

        let result = match flow {
            AuthFlow::SignUp => self.backend.create_account(credentials).await,
            AuthFlow::SignIn => self.backend.sign_in(credentials).await,
        };

        match result {
            Ok(identity) => {
                let user = User::signed_in(identity.uid);
                info!(user_id = %user.id, action = %kind, "auth: session started");
                self.settle(kind, ActionStatus::Succeeded);
                self.clear_error();
                self.set_user(Some(user.clone()));
                Ok(user)
            }
            Err(err) => {
                warn!(error = %err, action = %kind, email = %credentials.email, "auth: request rejected");
                Err(self.fail(kind, StoreError::backend(kind, err)))
            }
        }
    }

    /// Restores a session from an identity obtained elsewhere, e.g. a
    /// persisted auth state. Never touches the backend.
    pub fn auto_sign_in(&self, identity: &AuthIdentity) -> User {
        let user = User::signed_in(identity.uid.clone());
        info!(user_id = %user.id, "auth: session restored");
        self.set_user(Some(user.clone()));
        user
    }

    /// Ends the backend session, then clears the local user whatever the
    /// backend answered.
    pub async fn logout(&self) -> Result<(), StoreError> {
        let kind = ActionKind::Logout;
        self.set_loading(kind, true);
        let result = self.backend.sign_out().await;
        self.set_user(None);

        match result {
            Ok(()) => {
                info!("auth: signed out");
                self.settle(kind, ActionStatus::Succeeded);
                self.clear_error_from(kind);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "auth: backend sign-out failed, local session cleared");
                Err(self.fail(kind, StoreError::backend(kind, err)))
            }
        }
    }

    // Selectors

    pub fn loaded_meetups(&self) -> Vec<Meetup> {
        sorted_by_date(&self.state.read().loaded_meetups)
    }

    pub fn loaded_meetup(&self, id: &MeetupId) -> Option<Meetup> {
        self.state
            .read()
            .loaded_meetups
            .iter()
            .find(|meetup| &meetup.id == id)
            .cloned()
    }

    pub fn featured_meetups(&self) -> Vec<Meetup> {
        let mut meetups = self.loaded_meetups();
        meetups.truncate(FEATURED_LIMIT);
        meetups
    }

    pub fn user(&self) -> Option<User> {
        self.state.read().user.clone()
    }

    pub fn loading(&self) -> bool {
        let state = self.state.read();
        ActionKind::ALL
            .into_iter()
            .filter(|kind| kind.shows_loading())
            .any(|kind| state.activity(kind).in_flight > 0)
    }

    pub fn status(&self, kind: ActionKind) -> ActionStatus {
        self.state.read().activity(kind).status
    }

    pub fn error(&self) -> Option<StoreError> {
        self.state.read().error.clone()
    }

    pub fn snapshot(&self) -> StoreState {
        self.state.read().clone()
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
