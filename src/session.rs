use crate::models::Session;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

// Anything that can answer "is somebody signed in right now"
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The current unexpired session, if any. Expiry is the provider's job.
    async fn current_session(&self) -> Result<Option<Session>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateStatus {
    Uninitialized,
    Unauthenticated,
    Ready,
}

/// Decides whether the live controller may run.
#[derive(Debug)]
pub struct SessionGate {
    status: GateStatus,
    session: Option<Session>,
}

impl Default for SessionGate {
    fn default() -> Self {
        Self {
            status: GateStatus::Uninitialized,
            session: None,
        }
    }
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> GateStatus {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == GateStatus::Ready
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Queries `provider` and moves to `Ready` or `Unauthenticated`.
    /// A provider error counts as unauthenticated.
    pub async fn evaluate(&mut self, provider: &dyn SessionProvider) -> GateStatus {
        match provider.current_session().await {
            Ok(Some(session)) => {
                log::info!("Session gate: signed in as {}", session.user.email);
                self.session = Some(session);
                self.status = GateStatus::Ready;
            }
            Ok(None) => {
                log::warn!("Session gate: no valid session, generation disabled");
                self.session = None;
                self.status = GateStatus::Unauthenticated;
            }
            Err(e) => {
                log::error!("Session gate: failed to query session: {:?}", e);
                self.session = None;
                self.status = GateStatus::Unauthenticated;
            }
        }
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionUser;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    struct Fixed(Option<Session>);

    #[async_trait]
    impl SessionProvider for Fixed {
        async fn current_session(&self) -> Result<Option<Session>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl SessionProvider for Broken {
        async fn current_session(&self) -> Result<Option<Session>> {
            Err(anyhow::anyhow!("database is locked"))
        }
    }

    fn session() -> Session {
        Session {
            user: SessionUser {
                id: Uuid::new_v4(),
                email: "ada@example.com".to_string(),
                name: "Ada".to_string(),
            },
            expires_at: Utc::now() + Duration::days(7),
        }
    }

    #[tokio::test]
    async fn transitions() {
        let mut gate = SessionGate::new();
        assert_eq!(gate.status(), GateStatus::Uninitialized);

        assert_eq!(gate.evaluate(&Fixed(Some(session()))).await, GateStatus::Ready);
        assert!(gate.session().is_some());

        // Re-evaluation after the session went away
        assert_eq!(gate.evaluate(&Fixed(None)).await, GateStatus::Unauthenticated);
        assert!(gate.session().is_none());
    }

    #[tokio::test]
    async fn provider_error_is_unauthenticated() {
        let mut gate = SessionGate::new();
        assert_eq!(gate.evaluate(&Broken).await, GateStatus::Unauthenticated);
    }
}
