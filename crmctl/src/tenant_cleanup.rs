//! Best-effort removal of a deleted tenant's vendor resources.
//!
//! Runs after the organization rows are gone. Each resource is removed independently; a
//! failure is logged at `warn` and recorded in the [`CleanupReport`] but never stops the
//! remaining steps. Nothing retries failed steps later.

use serde::Serialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::integrations::{EmailDeliveryProvider, TelephonyProvider, VoiceProvider};
use crate::storage::DocumentStorage;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CleanupResource {
    VoiceAgent,
    VoiceAccount,
    TelephonySubaccount,
    EmailDomain,
    Document,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CleanupOutcome {
    Deleted,
    /// The integration is no longer configured, so the resource could not be reached
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CleanupStep {
    pub resource: CleanupResource,
    pub external_id: String,
    pub outcome: CleanupOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct CleanupReport {
    pub steps: Vec<CleanupStep>,
}

impl CleanupReport {
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.outcome == CleanupOutcome::Deleted)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CleanupStep> {
        self.steps.iter().filter(|s| s.outcome != CleanupOutcome::Deleted)
    }

    fn record<E: std::fmt::Display>(&mut self, resource: CleanupResource, external_id: &str, result: Option<Result<(), E>>) {
        let (outcome, error) = match result {
            Some(Ok(())) => (CleanupOutcome::Deleted, None),
            Some(Err(e)) => {
                warn!(?resource, external_id, "Failed to remove vendor resource: {}", e);
                (CleanupOutcome::Failed, Some(e.to_string()))
            }
            None => {
                warn!(?resource, external_id, "Integration not configured; leaving vendor resource in place");
                (CleanupOutcome::Skipped, None)
            }
        };
        self.steps.push(CleanupStep {
            resource,
            external_id: external_id.to_string(),
            outcome,
            error,
        });
    }
}

/// External ids captured before the tenant rows were deleted
#[derive(Debug, Clone, Default)]
pub struct TenantResources {
    pub voice_agent_ids: Vec<String>,
    pub voice_account_id: Option<String>,
    pub telephony_account_id: Option<String>,
    pub email_domain_id: Option<String>,
    pub document_keys: Vec<String>,
}

/// Vendor clients available for cleanup; `None` when the integration is not configured
pub struct CleanupClients<'a> {
    pub voice: Option<&'a dyn VoiceProvider>,
    pub telephony: Option<&'a dyn TelephonyProvider>,
    pub email_delivery: Option<&'a dyn EmailDeliveryProvider>,
    pub storage: &'a dyn DocumentStorage,
}

#[instrument(skip_all, fields(voice_agents = resources.voice_agent_ids.len(), documents = resources.document_keys.len()))]
pub async fn cleanup_tenant_resources(resources: &TenantResources, clients: &CleanupClients<'_>) -> CleanupReport {
    let mut report = CleanupReport::default();

    for id in &resources.voice_agent_ids {
        let result = match clients.voice {
            Some(voice) => Some(voice.delete_assistant(id).await),
            None => None,
        };
        report.record(CleanupResource::VoiceAgent, id, result);
    }

    // Assistants first; the voice organization holds them
    if let Some(id) = &resources.voice_account_id {
        let result = match clients.voice {
            Some(voice) => Some(voice.delete_organization(id).await),
            None => None,
        };
        report.record(CleanupResource::VoiceAccount, id, result);
    }

    if let Some(sid) = &resources.telephony_account_id {
        let result = match clients.telephony {
            Some(telephony) => Some(telephony.close_subaccount(sid).await),
            None => None,
        };
        report.record(CleanupResource::TelephonySubaccount, sid, result);
    }

    if let Some(domain_id) = &resources.email_domain_id {
        let result = match clients.email_delivery {
            Some(email) => Some(email.delete_domain(domain_id).await),
            None => None,
        };
        report.record(CleanupResource::EmailDomain, domain_id, result);
    }

    for key in &resources.document_keys {
        let result = clients.storage.delete(key).await;
        report.record(CleanupResource::Document, key, Some(result));
    }

    info!(
        steps = report.steps.len(),
        failed = report.failures().count(),
        "Tenant resource cleanup finished"
    );
    report
}
