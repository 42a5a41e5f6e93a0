//! Session verification with a single login-and-retry cycle.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use runalyze_client::{RunalyzeClient, RunalyzeError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthState {
    Unverified,
    Verified,
}

/// How the session was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    ExistingSession,
    LoggedIn,
}

pub struct Authenticator {
    client: Arc<dyn RunalyzeClient>,
    state: AuthState,
    probe_date: NaiveDate,
}

impl Authenticator {
    pub fn new(client: Arc<dyn RunalyzeClient>) -> Self {
        Self::with_probe_date(client, Local::now().date_naive())
    }

    /// Probe the week containing `probe_date` instead of today.
    pub fn with_probe_date(client: Arc<dyn RunalyzeClient>, probe_date: NaiveDate) -> Self {
        Self {
            client,
            state: AuthState::Unverified,
            probe_date,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Make sure the client holds a working session.
    ///
    /// A week fetch is used as the probe. Only a redirect to the login page
    /// triggers a login, followed by exactly one re-probe; every other failure
    /// is returned as is.
    pub async fn ensure_authenticated(&mut self) -> Result<AuthOutcome, RunalyzeError> {
        if self.state == AuthState::Verified {
            return Ok(AuthOutcome::ExistingSession);
        }

        tracing::debug!("attempting to verify login");
        let outcome = match self.client.fetch_week(self.probe_date).await {
            Ok(_) => AuthOutcome::ExistingSession,
            Err(RunalyzeError::RedirectedToLogin) => {
                tracing::info!("attempting login");
                self.client.login().await?;
                self.client.fetch_week(self.probe_date).await?;
                AuthOutcome::LoggedIn
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self.client.persist_session().await {
            tracing::warn!(error = %e, "failed to persist cookies");
        }
        self.state = AuthState::Verified;
        match outcome {
            AuthOutcome::ExistingSession => tracing::info!("using existing Runalyze session"),
            AuthOutcome::LoggedIn => tracing::info!("successfully logged in to Runalyze"),
        }
        Ok(outcome)
    }
}
