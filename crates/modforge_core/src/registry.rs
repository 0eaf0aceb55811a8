use std::collections::BTreeMap;

use crate::{Job, JobPatch, JobStatus, LocalId, ModFile, OrchestratorError, PollTicket};

const GENERIC_FAILURE: &str = "Job failed";

/// In-memory set of tracked jobs, iterated in drop order.
///
/// Local ids come from a monotonic counter, so `BTreeMap` order equals
/// insertion order and an id is never handed out twice, even after removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRegistry {
    jobs: BTreeMap<LocalId, Job>,
    next_local_id: LocalId,
    next_ticket: PollTicket,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_local_id: 1,
            next_ticket: 1,
        }
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_job(&mut self, file: ModFile) -> LocalId {
        let local_id = self.next_local_id;
        self.next_local_id += 1;
        self.jobs.insert(local_id, Job::new(local_id, file));
        local_id
    }

    /// Merges `patch` into the job. The patch is validated as a whole before
    /// anything is written, so a rejected patch leaves the job untouched.
    pub fn update_job(
        &mut self,
        local_id: LocalId,
        patch: JobPatch,
    ) -> Result<(), OrchestratorError> {
        let job = self
            .jobs
            .get_mut(&local_id)
            .ok_or(OrchestratorError::NotFound(local_id))?;

        if job.status.is_terminal() && patch != JobPatch::default() {
            return Err(OrchestratorError::InvalidState(format!(
                "job {local_id} is already {}",
                job.status
            )));
        }

        let next = patch.status.unwrap_or(job.status);
        if !job.status.can_transition_to(next) {
            return Err(OrchestratorError::InvalidState(format!(
                "job {local_id} cannot move from {} to {next}",
                job.status
            )));
        }

        if let (Some(current), Some(incoming)) = (&job.server_job_id, &patch.server_job_id) {
            if current != incoming {
                return Err(OrchestratorError::InvalidState(format!(
                    "job {local_id} already has server id {current}"
                )));
            }
        }

        job.status = next;
        if job.server_job_id.is_none() {
            job.server_job_id = patch.server_job_id;
        }
        if patch.mod_type.is_some() {
            job.mod_type = patch.mod_type;
        }

        match next {
            JobStatus::Failed => {
                let message = patch
                    .error_message
                    .filter(|message| !message.trim().is_empty())
                    .or_else(|| job.error_message.take())
                    .unwrap_or_else(|| GENERIC_FAILURE.to_string());
                job.error_message = Some(message);
            }
            JobStatus::Completed => {
                if patch.download_ref.is_some() {
                    job.download_ref = patch.download_ref;
                }
                if patch.tokens_used.is_some() {
                    job.tokens_used = patch.tokens_used;
                }
                if patch.credits_used.is_some() {
                    job.credits_used = patch.credits_used;
                }
            }
            _ => {}
        }

        if next.is_terminal() {
            job.ticket = None;
        }
        Ok(())
    }

    pub fn get_job(&self, local_id: LocalId) -> Option<&Job> {
        self.jobs.get(&local_id)
    }

    pub fn list_jobs(&self) -> impl Iterator<Item = &Job> + '_ {
        self.jobs.values()
    }

    /// Removes the job and returns it. A returned job that still holds a
    /// ticket had a live poll handle the caller must cancel.
    pub fn remove_job(&mut self, local_id: LocalId) -> Result<Job, OrchestratorError> {
        self.jobs
            .remove(&local_id)
            .ok_or(OrchestratorError::NotFound(local_id))
    }

    /// Drops every completed or failed job, returning their ids.
    pub fn clear_finished(&mut self) -> Vec<LocalId> {
        let finished: Vec<LocalId> = self
            .jobs
            .values()
            .filter(|job| job.status.is_terminal())
            .map(|job| job.local_id)
            .collect();
        for local_id in &finished {
            self.jobs.remove(local_id);
        }
        finished
    }

    pub fn find_by_server_id(&self, server_job_id: &str) -> Option<LocalId> {
        self.jobs
            .values()
            .find(|job| job.server_job_id.as_deref() == Some(server_job_id))
            .map(|job| job.local_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn active_polls(&self) -> usize {
        self.jobs.values().filter(|job| job.ticket.is_some()).count()
    }

    pub(crate) fn issue_ticket(
        &mut self,
        local_id: LocalId,
    ) -> Result<PollTicket, OrchestratorError> {
        let job = self
            .jobs
            .get_mut(&local_id)
            .ok_or(OrchestratorError::NotFound(local_id))?;
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        job.ticket = Some(ticket);
        Ok(ticket)
    }

    pub(crate) fn holds_ticket(&self, local_id: LocalId, ticket: PollTicket) -> bool {
        self.jobs
            .get(&local_id)
            .is_some_and(|job| job.ticket == Some(ticket))
    }

    pub(crate) fn release_ticket(&mut self, local_id: LocalId) -> Option<PollTicket> {
        self.jobs.get_mut(&local_id).and_then(|job| job.ticket.take())
    }

    /// Releases every live ticket, returning the jobs that held one.
    pub(crate) fn release_all_tickets(&mut self) -> Vec<LocalId> {
        self.jobs
            .values_mut()
            .filter_map(|job| job.ticket.take().map(|_| job.local_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_job() -> (JobRegistry, LocalId) {
        let mut registry = JobRegistry::new();
        let id = registry.create_job(ModFile::new("mod.jar", 5 * 1024 * 1024));
        (registry, id)
    }

    #[test]
    fn rejected_patch_is_not_partially_applied() {
        let (mut registry, id) = registry_with_job();
        let patch = JobPatch::status(JobStatus::Completed).with_mod_type(Some("minecraft".into()));

        let err = registry.update_job(id, patch).unwrap_err();

        assert!(matches!(err, OrchestratorError::InvalidState(_)));
        let job = registry.get_job(id).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.mod_type, None);
    }

    #[test]
    fn failure_without_message_gets_generic_text() {
        let (mut registry, id) = registry_with_job();
        registry.update_job(id, JobPatch::status(JobStatus::Uploading)).unwrap();
        registry.update_job(id, JobPatch::failed("   ")).unwrap();

        assert_eq!(
            registry.get_job(id).unwrap().error_message.as_deref(),
            Some(GENERIC_FAILURE)
        );
    }

    #[test]
    fn completion_fields_are_ignored_outside_completed() {
        let (mut registry, id) = registry_with_job();
        registry
            .update_job(
                id,
                JobPatch::status(JobStatus::Uploading)
                    .with_download_ref(Some("https://cdn/x".into()))
                    .with_usage(Some(5), Some(1))
                    .with_error_message(Some("nope".into())),
            )
            .unwrap();

        let job = registry.get_job(id).unwrap();
        assert_eq!(job.download_ref, None);
        assert_eq!(job.tokens_used, None);
        assert_eq!(job.error_message, None);
    }

    #[test]
    fn tickets_are_released_on_terminal_status() {
        let (mut registry, id) = registry_with_job();
        for status in [JobStatus::Uploading, JobStatus::Uploaded] {
            registry.update_job(id, JobPatch::status(status)).unwrap();
        }
        let ticket = registry.issue_ticket(id).unwrap();
        registry.update_job(id, JobPatch::status(JobStatus::Processing)).unwrap();
        assert!(registry.holds_ticket(id, ticket));

        registry.update_job(id, JobPatch::status(JobStatus::Completed)).unwrap();

        assert!(!registry.holds_ticket(id, ticket));
        assert_eq!(registry.active_polls(), 0);
    }
}
