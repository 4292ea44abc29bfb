use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(MeetupId);
id_newtype!(UserId);

/// A meetup as stored in the catalog, keyed by the id the backend issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meetup {
    pub id: MeetupId,
    pub title: String,
    pub location: String,
    pub image_url: String,
    pub description: String,
    /// ISO-8601 timestamp text, kept exactly as the backend returned it.
    pub date: String,
    pub creator_id: UserId,
}

/// The record written to the backend; it has no id until the write resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetupDraft {
    pub title: String,
    pub location: String,
    pub image_url: String,
    pub description: String,
    pub date: String,
    pub creator_id: UserId,
}

impl MeetupDraft {
    pub fn from_new(new: NewMeetup, creator_id: UserId) -> Self {
        Self {
            title: new.title,
            location: new.location,
            image_url: new.image_url,
            description: new.description,
            date: iso_timestamp(&new.date),
            creator_id,
        }
    }

    pub fn with_id(self, id: MeetupId) -> Meetup {
        Meetup {
            id,
            title: self.title,
            location: self.location,
            image_url: self.image_url,
            description: self.description,
            date: self.date,
            creator_id: self.creator_id,
        }
    }
}

/// Payload accepted by the create action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMeetup {
    pub title: String,
    pub location: String,
    pub image_url: String,
    pub description: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub registered_meetups: Vec<MeetupId>,
}

impl User {
    pub fn signed_in(id: UserId) -> Self {
        Self {
            id,
            registered_meetups: Vec::new(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Identity handed back by the auth service after sign-up or sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthIdentity {
    pub uid: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl AuthIdentity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: UserId::new(uid),
            email: None,
            id_token: None,
        }
    }
}

/// Millisecond-precision UTC text, e.g. `2020-01-02T00:00:00.000Z`.
pub fn iso_timestamp(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}
