use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{BridgeError, Result};

use super::client::TeamCityClient;
use super::types::{BuildRecord, BuildRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unset,
    Configured,
    Queued,
    Polling,
    Finished,
}

/// One requested build and the record TeamCity returned for it.
///
/// A session owns its record exclusively; kicking another build means
/// creating another session. The client is shared.
pub struct BuildSession {
    client: Arc<TeamCityClient>,
    request: Option<BuildRequest>,
    record: Option<BuildRecord>,
    state: SessionState,
}

impl BuildSession {
    pub fn new(client: Arc<TeamCityClient>) -> Self {
        Self {
            client,
            request: None,
            record: None,
            state: SessionState::Unset,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn request(&self) -> Option<&BuildRequest> {
        self.request.as_ref()
    }

    /// Sets what to build next and drops any previous record.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the request has an empty field or a build is still
    /// in flight. The session is left untouched in both cases.
    pub fn set_build_request(&mut self, request: BuildRequest) -> Result<()> {
        if matches!(self.state, SessionState::Queued | SessionState::Polling) {
            return Err(BridgeError::InvalidState(
                "a build is already in progress".to_string(),
            ));
        }
        if !request.is_complete() {
            return Err(BridgeError::InvalidState(
                "build configuration id and branch are required".to_string(),
            ));
        }

        self.request = Some(request);
        self.record = None;
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Queues the configured build.
    ///
    /// On failure the session stays `Configured` so the caller may retry.
    pub async fn build(&mut self, params: &BTreeMap<String, String>) -> Result<&BuildRecord> {
        let request = match (&self.state, &self.request) {
            (SessionState::Configured, Some(request)) => request,
            _ => {
                return Err(BridgeError::InvalidState(
                    "build info not set, unable to build".to_string(),
                ))
            }
        };

        let record = self
            .client
            .queue_build(&request.config_id, &request.branch, params)
            .await?;

        self.state = if record.is_finished() {
            SessionState::Finished
        } else {
            SessionState::Queued
        };
        Ok(&*self.record.insert(record))
    }

    /// Re-reads the build from TeamCity and updates the stored record.
    ///
    /// Once finished the stored record is returned as is, without another
    /// request. Errors leave both record and state unchanged.
    pub async fn refresh_status(&mut self) -> Result<&BuildRecord> {
        let Some(record) = self.record.as_mut() else {
            return Err(BridgeError::InvalidState(
                "no build has been queued".to_string(),
            ));
        };

        if self.state == SessionState::Finished {
            return Ok(&*record);
        }

        let latest = self.client.get_build_by_locator(&record.href).await?;
        record.update_from(latest);
        debug!(
            "Build {} ({}) is {} / {}",
            record.id, record.build_type_id, record.state, record.status
        );

        self.state = if record.is_finished() {
            info!(
                "Build {} ({}) finished with {}",
                record.id, record.build_type_id, record.status
            );
            SessionState::Finished
        } else {
            SessionState::Polling
        };
        Ok(&*record)
    }

    pub fn current_record(&self) -> Option<BuildRecord> {
        self.record.clone()
    }

    pub fn task_id(&self) -> Option<&str> {
        self.record.as_ref().and_then(BuildRecord::task_id)
    }
}
