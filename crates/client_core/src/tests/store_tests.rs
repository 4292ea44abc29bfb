use super::*;
use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use shared::{domain::UserId, error::AuthErrorCode};
use tokio::sync::{oneshot, Mutex};

enum Reply<T> {
    Now(Result<T, BackendError>),
    Later(oneshot::Receiver<Result<T, BackendError>>),
}

impl<T> Reply<T> {
    async fn resolve(self) -> Result<T, BackendError> {
        match self {
            Self::Now(result) => result,
            Self::Later(rx) => rx
                .await
                .unwrap_or_else(|_| Err(BackendError::transport("reply dropped"))),
        }
    }
}

#[derive(Default)]
struct ScriptedBackend {
    reads: Mutex<VecDeque<Reply<Option<Value>>>>,
    writes: Mutex<VecDeque<Result<String, BackendError>>>,
    auth: Mutex<VecDeque<Result<AuthIdentity, BackendError>>>,
    sign_out_error: Mutex<Option<BackendError>>,
    calls: Mutex<Vec<&'static str>>,
    written: Mutex<Vec<(String, Value)>>,
}

impl ScriptedBackend {
    async fn push_read(&self, reply: Reply<Option<Value>>) {
        self.reads.lock().await.push_back(reply);
    }

    async fn push_write(&self, result: Result<String, BackendError>) {
        self.writes.lock().await.push_back(result);
    }

    async fn push_auth(&self, result: Result<AuthIdentity, BackendError>) {
        self.auth.lock().await.push_back(result);
    }

    async fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().await.clone()
    }

    async fn next_auth(&self) -> Result<AuthIdentity, BackendError> {
        self.auth
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::unavailable("no scripted auth reply")))
    }
}

#[async_trait]
impl MeetupBackend for ScriptedBackend {
    async fn read(&self, _collection: &str) -> Result<Option<Value>, BackendError> {
        self.calls.lock().await.push("read");
        let reply = self.reads.lock().await.pop_front();
        match reply {
            Some(reply) => reply.resolve().await,
            None => Ok(None),
        }
    }

    async fn write(&self, collection: &str, record: Value) -> Result<String, BackendError> {
        self.calls.lock().await.push("write");
        self.written
            .lock()
            .await
            .push((collection.to_string(), record));
        self.writes
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::unavailable("no scripted write reply")))
    }

    async fn create_account(
        &self,
        _credentials: &Credentials,
    ) -> Result<AuthIdentity, BackendError> {
        self.calls.lock().await.push("create_account");
        self.next_auth().await
    }

    async fn sign_in(&self, _credentials: &Credentials) -> Result<AuthIdentity, BackendError> {
        self.calls.lock().await.push("sign_in");
        self.next_auth().await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.calls.lock().await.push("sign_out");
        match self.sign_out_error.lock().await.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn store_with_backend() -> (Arc<Store>, Arc<ScriptedBackend>) {
    let backend = Arc::new(ScriptedBackend::default());
    (Store::new(backend.clone()), backend)
}

fn meetup(id: &str, date: &str) -> Meetup {
    Meetup {
        id: MeetupId::new(id),
        title: format!("title-{id}"),
        location: "Hall A".into(),
        image_url: String::new(),
        description: String::new(),
        date: date.into(),
        creator_id: UserId::new("u1"),
    }
}

fn ids(meetups: &[Meetup]) -> Vec<String> {
    meetups.iter().map(|m| m.id.to_string()).collect()
}

fn credentials() -> Credentials {
    Credentials::new("ada@example.com", "secret1")
}

fn new_meetup() -> NewMeetup {
    NewMeetup {
        title: "Rust night".into(),
        location: "Berlin".into(),
        image_url: "https://img.example/1.png".into(),
        description: "lightning talks".into(),
        date: Utc.with_ymd_and_hms(2020, 1, 2, 18, 30, 0).unwrap(),
    }
}

fn sample_catalog() -> Value {
    json!({
        "a": {"title": "T1", "location": "L1", "imageUrl": "", "description": "", "date": "2020-01-02", "creatorId": "u1"},
        "b": {"title": "T2", "location": "L2", "imageUrl": "", "description": "", "date": "2020-01-01", "creatorId": "u1"}
    })
}

#[test]
fn starts_empty() {
    let store = Store::without_backend();
    assert!(store.loaded_meetups().is_empty());
    assert_eq!(store.user(), None);
    assert!(!store.loading());
    assert_eq!(store.error(), None);
    for kind in ActionKind::ALL {
        assert_eq!(store.status(kind), ActionStatus::Idle);
    }
}

#[test]
fn set_loaded_meetups_replaces_catalog() {
    let store = Store::without_backend();
    let batches = vec![
        vec![meetup("a", "2020-01-01"), meetup("b", "2020-01-02")],
        vec![meetup("c", "2021-01-01")],
        Vec::new(),
    ];
    for batch in batches {
        store.set_loaded_meetups(batch.clone());
        assert_eq!(store.snapshot().loaded_meetups, batch);
    }
}

#[test]
fn append_meetup_adds_exactly_one() {
    let store = Store::without_backend();
    store.set_loaded_meetups(vec![meetup("a", "2020-01-01")]);
    let added = meetup("z", "2019-01-01");

    store.append_meetup(added.clone());

    let catalog = store.snapshot().loaded_meetups;
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.last(), Some(&added));
}

#[test]
fn loaded_meetup_finds_by_id() {
    let store = Store::without_backend();
    store.set_loaded_meetups(vec![meetup("a", "2020-01-01"), meetup("b", "2020-01-02")]);

    assert_eq!(
        store.loaded_meetup(&MeetupId::new("b")).map(|m| m.title),
        Some("title-b".to_string())
    );
    assert_eq!(store.loaded_meetup(&MeetupId::new("missing")), None);
}

#[test]
fn featured_meetups_is_a_prefix_of_five() {
    let store = Store::without_backend();
    let catalog: Vec<Meetup> = (1..=7)
        .rev()
        .map(|day| meetup(&format!("m{day}"), &format!("2020-01-0{day}")))
        .collect();
    store.set_loaded_meetups(catalog);

    let featured = store.featured_meetups();
    assert_eq!(featured.len(), 5);
    assert_eq!(featured, store.loaded_meetups()[..5].to_vec());
    assert_eq!(ids(&featured), vec!["m1", "m2", "m3", "m4", "m5"]);

    store.set_loaded_meetups(vec![meetup("x", "2020-02-02"), meetup("y", "2020-02-01")]);
    assert_eq!(ids(&store.featured_meetups()), vec!["y", "x"]);
}

#[test]
fn selectors_do_not_reorder_state() {
    let store = Store::without_backend();
    store.set_loaded_meetups(vec![meetup("late", "2020-05-01"), meetup("early", "2020-01-01")]);

    assert_eq!(ids(&store.loaded_meetups()), vec!["early", "late"]);
    assert_eq!(ids(&store.snapshot().loaded_meetups), vec!["late", "early"]);
}

#[tokio::test]
async fn load_projects_keyed_records_and_sorts_by_date() {
    let (store, backend) = store_with_backend();
    backend.push_read(Reply::Now(Ok(Some(sample_catalog())))).await;

    store.load_meetups().await.expect("load");

    assert_eq!(ids(&store.snapshot().loaded_meetups), vec!["a", "b"]);
    assert_eq!(ids(&store.loaded_meetups()), vec!["b", "a"]);
    assert!(!store.loading());
    assert_eq!(store.status(ActionKind::LoadMeetups), ActionStatus::Succeeded);
}

#[tokio::test]
async fn load_failure_keeps_catalog_and_records_tagged_error() {
    let (store, backend) = store_with_backend();
    store.set_loaded_meetups(vec![meetup("kept", "2020-01-01")]);
    let failure = BackendError::transport("connection reset");
    backend.push_read(Reply::Now(Err(failure.clone()))).await;

    let err = store.load_meetups().await.expect_err("load fails");

    assert_eq!(err, StoreError::backend(ActionKind::LoadMeetups, failure));
    assert_eq!(store.error(), Some(err));
    assert_eq!(ids(&store.loaded_meetups()), vec!["kept"]);
    assert!(!store.loading());
    assert_eq!(store.status(ActionKind::LoadMeetups), ActionStatus::Failed);
}

#[tokio::test]
async fn malformed_catalog_is_a_load_error() {
    let (store, backend) = store_with_backend();
    backend.push_read(Reply::Now(Ok(Some(json!("not a map"))))).await;

    let err = store.load_meetups().await.expect_err("malformed");
    assert!(matches!(err, StoreError::MalformedCatalog(_)));
    assert_eq!(err.category(), ActionKind::LoadMeetups);
    assert!(!store.loading());
}

#[tokio::test]
async fn one_odd_record_does_not_blank_the_catalog() {
    let (store, backend) = store_with_backend();
    store.set_loaded_meetups(vec![meetup("stale", "2019-01-01")]);
    backend
        .push_read(Reply::Now(Ok(Some(json!({
            "a": {"title": "T1", "location": "L1", "imageUrl": "", "description": "", "date": "2020-01-02", "creatorId": "u1"},
            "b": {"title": "T2", "location": "L2", "imageUrl": null, "description": "", "date": 1577836800000u64, "creatorId": "u1"}
        })))))
        .await;

    store.load_meetups().await.expect("load");

    assert_eq!(ids(&store.loaded_meetups()), vec!["b", "a"]);
    assert_eq!(store.error(), None);
    assert_eq!(store.status(ActionKind::LoadMeetups), ActionStatus::Succeeded);
}

#[tokio::test]
async fn successful_load_keeps_unrelated_auth_error() {
    let (store, backend) = store_with_backend();
    let rejection = BackendError::auth(AuthErrorCode::InvalidCredentials, "INVALID_LOGIN_CREDENTIALS");
    backend.push_auth(Err(rejection)).await;
    backend.push_read(Reply::Now(Ok(Some(sample_catalog())))).await;

    store.sign_user_in(&credentials()).await.expect_err("rejected");
    store.load_meetups().await.expect("load");

    assert_eq!(
        store.error().map(|err| err.category()),
        Some(ActionKind::SignIn)
    );
}

#[tokio::test]
async fn sign_up_success_sets_user() {
    let (store, backend) = store_with_backend();
    backend.push_auth(Ok(AuthIdentity::new("uid-1"))).await;

    let user = store.sign_user_up(&credentials()).await.expect("sign up");

    let expected = User {
        id: UserId::new("uid-1"),
        registered_meetups: Vec::new(),
    };
    assert_eq!(user, expected);
    assert_eq!(store.user(), Some(expected));
    assert!(!store.loading());
    assert_eq!(store.error(), None);
    assert_eq!(backend.calls().await, vec!["create_account"]);
}

#[tokio::test]
async fn sign_up_rejection_surfaces_error() {
    let (store, backend) = store_with_backend();
    let rejection = BackendError::auth(AuthErrorCode::EmailExists, "EMAIL_EXISTS");
    backend.push_auth(Err(rejection.clone())).await;

    store.sign_user_up(&credentials()).await.expect_err("rejected");

    assert_eq!(store.user(), None);
    assert_eq!(
        store.error(),
        Some(StoreError::backend(ActionKind::SignUp, rejection))
    );
    assert!(!store.loading());
    assert_eq!(store.status(ActionKind::SignUp), ActionStatus::Failed);
}

#[tokio::test]
async fn sign_in_clears_previous_error_before_calling_backend() {
    let (store, backend) = store_with_backend();
    backend
        .push_auth(Err(BackendError::auth(AuthErrorCode::InvalidPassword, "INVALID_PASSWORD")))
        .await;
    backend.push_auth(Ok(AuthIdentity::new("uid-7"))).await;

    store.sign_user_in(&credentials()).await.expect_err("first attempt");
    let mut events = store.subscribe();
    store.sign_user_in(&credentials()).await.expect("second attempt");

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen.get(1),
        Some(&StoreEvent::ErrorChanged(None)),
        "error cleared right after the action starts: {seen:?}"
    );
    assert_eq!(
        seen.last(),
        Some(&StoreEvent::UserChanged(Some(User::signed_in(UserId::new("uid-7")))))
    );
    assert_eq!(store.error(), None);
    assert_eq!(backend.calls().await, vec!["sign_in", "sign_in"]);
}

#[tokio::test]
async fn auto_sign_in_never_calls_backend() {
    let (store, backend) = store_with_backend();

    let user = store.auto_sign_in(&AuthIdentity::new("restored"));

    assert_eq!(user.id, UserId::new("restored"));
    assert!(user.registered_meetups.is_empty());
    assert_eq!(store.user(), Some(user));
    assert!(backend.calls().await.is_empty());
}

#[tokio::test]
async fn logout_clears_user() {
    let (store, backend) = store_with_backend();
    store.auto_sign_in(&AuthIdentity::new("uid-1"));

    store.logout().await.expect("logout");

    assert_eq!(store.user(), None);
    assert_eq!(store.error(), None);
    assert_eq!(backend.calls().await, vec!["sign_out"]);
}

#[tokio::test]
async fn logout_clears_user_even_when_backend_fails() {
    let (store, backend) = store_with_backend();
    store.auto_sign_in(&AuthIdentity::new("uid-1"));
    let failure = BackendError::transport("offline");
    *backend.sign_out_error.lock().await = Some(failure.clone());

    let err = store.logout().await.expect_err("sign-out fails");

    assert_eq!(store.user(), None);
    assert_eq!(err, StoreError::backend(ActionKind::Logout, failure));
    assert_eq!(store.error().map(|e| e.category()), Some(ActionKind::Logout));
}

#[tokio::test]
async fn create_requires_signed_in_user() {
    let (store, backend) = store_with_backend();

    let err = store.create_meetup(new_meetup()).await.expect_err("no user");

    assert_eq!(err, StoreError::NotSignedIn);
    assert_eq!(store.error(), Some(StoreError::NotSignedIn));
    assert_eq!(store.status(ActionKind::CreateMeetup), ActionStatus::Failed);
    assert!(backend.calls().await.is_empty());
    assert!(store.loaded_meetups().is_empty());
}

#[tokio::test]
async fn create_writes_draft_and_appends_with_generated_key() {
    let (store, backend) = store_with_backend();
    store.auto_sign_in(&AuthIdentity::new("creator-1"));
    store.set_loaded_meetups(vec![meetup("old", "2030-01-01")]);
    backend.push_write(Ok("-Nnew".into())).await;

    let created = store.create_meetup(new_meetup()).await.expect("create");

    assert_eq!(created.id, MeetupId::new("-Nnew"));
    assert_eq!(created.creator_id, UserId::new("creator-1"));
    assert_eq!(created.date, "2020-01-02T18:30:00.000Z");

    let written = backend.written.lock().await.clone();
    let (collection, record) = &written[0];
    assert_eq!(collection, MEETUP_COLLECTION);
    assert_eq!(record["creatorId"], "creator-1");
    assert_eq!(record["imageUrl"], "https://img.example/1.png");
    assert!(record.get("id").is_none());

    // Appended, not re-sorted in state; selectors still sort.
    assert_eq!(ids(&store.snapshot().loaded_meetups), vec!["old", "-Nnew"]);
    assert_eq!(ids(&store.loaded_meetups()), vec!["-Nnew", "old"]);
    assert!(!store.loading());
}

#[tokio::test]
async fn create_failure_leaves_catalog_unchanged() {
    let (store, backend) = store_with_backend();
    store.auto_sign_in(&AuthIdentity::new("creator-1"));
    let failure = BackendError::Status {
        status: 401,
        body: "Permission denied".into(),
    };
    backend.push_write(Err(failure.clone())).await;

    let err = store.create_meetup(new_meetup()).await.expect_err("denied");

    assert_eq!(err, StoreError::backend(ActionKind::CreateMeetup, failure));
    assert_eq!(store.error(), Some(err));
    assert!(store.snapshot().loaded_meetups.is_empty());
    assert_eq!(store.status(ActionKind::CreateMeetup), ActionStatus::Failed);
}

#[tokio::test]
async fn overlapping_loads_stay_loading_until_both_settle() {
    let (store, backend) = store_with_backend();
    let (first_tx, first_rx) = oneshot::channel();
    let (second_tx, second_rx) = oneshot::channel();
    backend.push_read(Reply::Later(first_rx)).await;
    backend.push_read(Reply::Later(second_rx)).await;

    let driver = async {
        assert!(store.loading());
        assert_eq!(
            store.snapshot().activity[&ActionKind::LoadMeetups].in_flight,
            2
        );

        first_tx
            .send(Ok(Some(sample_catalog())))
            .expect("first reply");
        tokio::task::yield_now().await;
        assert!(store.loading(), "second load is still outstanding");
        assert_eq!(store.status(ActionKind::LoadMeetups), ActionStatus::Pending);

        second_tx
            .send(Ok(Some(json!({
                "c": {"title": "T3", "date": "2022-01-01", "creatorId": "u2"}
            }))))
            .expect("second reply");
    };

    let (first, second, ()) = futures::join!(store.load_meetups(), store.load_meetups(), driver);
    first.expect("first load");
    second.expect("second load");

    assert!(!store.loading());
    assert_eq!(store.status(ActionKind::LoadMeetups), ActionStatus::Succeeded);
    assert_eq!(ids(&store.loaded_meetups()), vec!["c"]);
}

#[tokio::test]
async fn load_publishes_change_events() {
    let (store, backend) = store_with_backend();
    backend.push_read(Reply::Now(Ok(Some(sample_catalog())))).await;
    let mut events = store.subscribe();

    store.load_meetups().await.expect("load");

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen.first(),
        Some(&StoreEvent::StatusChanged {
            kind: ActionKind::LoadMeetups,
            status: ActionStatus::Pending,
        })
    );
    assert!(seen.contains(&StoreEvent::CatalogReplaced { count: 2 }));
    assert_eq!(
        seen.last(),
        Some(&StoreEvent::StatusChanged {
            kind: ActionKind::LoadMeetups,
            status: ActionStatus::Succeeded,
        })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mutators_publish_in_write_order() {
    let store = Store::without_backend();
    let mut events = store.subscribe();

    let writers: Vec<_> = (0..8)
        .map(|writer| {
            let store = store.clone();
            tokio::spawn(async move {
                for round in 0..25 {
                    let id = UserId::new(format!("u{writer}-{round}"));
                    store.set_user(Some(User::signed_in(id)));
                }
            })
        })
        .collect();
    for writer in writers {
        writer.await.expect("writer task");
    }

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        if let StoreEvent::UserChanged(user) = event {
            last = Some(user);
        }
    }
    assert_eq!(last, Some(store.user()));
}

#[tokio::test]
async fn missing_backend_fails_every_action() {
    let store = Store::without_backend();

    let err = store.load_meetups().await.expect_err("no backend");
    assert!(matches!(
        err.backend_error(),
        Some(BackendError::Unavailable { .. })
    ));
    store.sign_user_up(&credentials()).await.expect_err("no backend");
    assert_eq!(store.user(), None);
    assert!(!store.loading());
}
