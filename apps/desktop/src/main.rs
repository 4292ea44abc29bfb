use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use client_core::{FirebaseBackend, Store, StoreError};
use shared::{
    domain::{Credentials, Meetup, MeetupId, NewMeetup},
    error::BackendError,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
#[command(name = "meetups", about = "Browse and publish meetups")]
struct Cli {
    #[arg(long, default_value = "meetups.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Login {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

impl Login {
    fn credentials(&self) -> Credentials {
        Credentials::new(self.email.clone(), self.password.clone())
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// All meetups, earliest first.
    List,
    /// The first five upcoming meetups.
    Featured,
    Show {
        id: String,
    },
    SignUp(Login),
    SignIn(Login),
    Create {
        #[command(flatten)]
        login: Login,
        #[arg(long)]
        title: String,
        #[arg(long)]
        location: String,
        /// RFC 3339 timestamp, e.g. 2024-05-01T18:30:00Z.
        #[arg(long)]
        date: DateTime<Utc>,
        #[arg(long, default_value = "")]
        image_url: String,
        #[arg(long, default_value = "")]
        description: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let settings = config::load_settings(&cli.config);
    info!(database_url = %settings.database_url, "meetups: using backend");
    let backend = FirebaseBackend::new(settings.firebase_config()?)
        .context("failed to build backend client")?;
    let store = Store::new(Arc::new(backend));

    match cli.command {
        Command::List => {
            store.load_meetups().await.context("failed to load meetups")?;
            print_meetups(&store.loaded_meetups());
        }
        Command::Featured => {
            store.load_meetups().await.context("failed to load meetups")?;
            print_meetups(&store.featured_meetups());
        }
        Command::Show { id } => {
            store.load_meetups().await.context("failed to load meetups")?;
            match store.loaded_meetup(&MeetupId::new(id.clone())) {
                Some(meetup) => {
                    print_meetups(std::slice::from_ref(&meetup));
                    if !meetup.description.is_empty() {
                        println!("\n{}", meetup.description);
                    }
                }
                None => println!("no meetup with id {id}"),
            }
        }
        Command::SignUp(login) => {
            let user = store
                .sign_user_up(&login.credentials())
                .await
                .map_err(|err| auth_failure("sign-up", err))?;
            println!("signed up as user_id={}", user.id);
        }
        Command::SignIn(login) => {
            let user = store
                .sign_user_in(&login.credentials())
                .await
                .map_err(|err| auth_failure("sign-in", err))?;
            println!("signed in as user_id={}", user.id);
        }
        Command::Create {
            login,
            title,
            location,
            date,
            image_url,
            description,
        } => {
            store
                .sign_user_in(&login.credentials())
                .await
                .map_err(|err| auth_failure("sign-in", err))?;
            let created = store
                .create_meetup(NewMeetup {
                    title,
                    location,
                    image_url,
                    description,
                    date,
                })
                .await
                .context("failed to create meetup")?;
            println!("created meetup id={}", created.id);
            store.logout().await.context("sign-out failed")?;
        }
    }

    Ok(())
}

/// Auth rejections are reported with the service's reason in plain words.
fn auth_failure(action: &str, err: StoreError) -> anyhow::Error {
    match err.backend_error() {
        Some(BackendError::Auth { code, .. }) => anyhow!("{action} failed: {}", code.user_message()),
        _ => anyhow::Error::new(err).context(format!("{action} failed")),
    }
}

fn print_meetups(meetups: &[Meetup]) {
    if meetups.is_empty() {
        println!("no meetups yet");
        return;
    }
    for meetup in meetups {
        println!(
            "{}  {}  {} @ {}",
            meetup.id, meetup.date, meetup.title, meetup.location
        );
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
