//! OpenAPI documentation for the CRM API.
//!
//! [`ApiDoc`] collects every route under `/authentication`, `/api` and `/webhooks`.
//! The document is served at `/api-docs/openapi.json` and rendered with Scalar at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{api, billing, db, tenant_cleanup};

/// Registers the three ways a caller can authenticate.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "CookieAuth",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "crm_session",
                    "Session cookie (name set by `auth.native.session.cookie_name`) issued by `POST /authentication/login` or `POST /authentication/register`.",
                ))),
            );
            components.add_security_scheme(
                "ProxyHeader",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-crm-user-email",
                    "Email of the signed-in user, set by a trusted authenticating proxy.",
                ))),
            );
            components.add_security_scheme(
                "CronSecret",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Shared secret from `auto_recharge.cron_secret`:\n\n```\nAuthorization: Bearer CRON_SECRET\n```"))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    paths(
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::auth::logout,
        api::handlers::users::get_current_user,
        api::handlers::organization::get_organization,
        api::handlers::organization::update_organization,
        api::handlers::organization::delete_organization,
        api::handlers::organization::provision_integrations,
        api::handlers::organization::list_members,
        api::handlers::organization::update_member_role,
        api::handlers::organization::remove_member,
        api::handlers::invitations::list_invitations,
        api::handlers::invitations::create_invitation,
        api::handlers::invitations::revoke_invitation,
        api::handlers::invitations::accept_invitation,
        api::handlers::customers::list_customers,
        api::handlers::customers::create_customer,
        api::handlers::customers::get_customer,
        api::handlers::customers::update_customer,
        api::handlers::customers::delete_customer,
        api::handlers::credits::get_balance,
        api::handlers::credits::list_transactions,
        api::handlers::credits::list_packages,
        api::handlers::credits::purchase_credits,
        api::handlers::credits::get_auto_recharge,
        api::handlers::credits::update_auto_recharge,
        api::handlers::credits::trigger_auto_recharge,
        api::handlers::cron::run_auto_recharge,
        api::handlers::stripe::create_setup_intent,
        api::handlers::stripe::list_payment_methods,
        api::handlers::stripe::detach_payment_method,
        api::handlers::documents::upload_document,
        api::handlers::documents::list_documents,
        api::handlers::documents::get_document,
        api::handlers::documents::delete_document,
        api::handlers::voice::list_voice_agents,
        api::handlers::voice::create_voice_agent,
        api::handlers::voice::delete_voice_agent,
        api::handlers::communications::list_communications,
        api::handlers::communications::send_sms,
        api::handlers::communications::send_email,
        api::handlers::webhooks::payment_webhook,
        api::handlers::webhooks::voice_webhook,
        api::handlers::admin::list_organizations,
        api::handlers::admin::get_organization,
        api::handlers::admin::review_organization,
        api::handlers::admin::list_approvals,
        api::handlers::admin::adjust_credits,
        api::handlers::admin::reconcile_credits,
        api::handlers::admin::list_documents,
        api::handlers::admin::get_document_content,
        api::handlers::admin::review_document,
    ),
    components(
        schemas(
            api::models::auth::RegisterRequest,
            api::models::auth::LoginRequest,
            api::models::auth::AuthResponse,
            api::models::auth::AuthSuccessResponse,
            api::models::users::CurrentUser,
            api::models::users::UserResponse,
            api::models::users::CurrentUserResponse,
            api::models::organizations::OrganizationResponse,
            api::models::organizations::OrganizationIntegrations,
            api::models::organizations::OrganizationUpdate,
            api::models::organizations::OrganizationDeleteRequest,
            api::models::organizations::OrganizationDeleteResponse,
            api::models::organizations::IntegrationsProvisionRequest,
            api::models::organizations::MemberResponse,
            api::models::organizations::MemberRoleUpdate,
            api::models::invitations::InvitationCreate,
            api::models::invitations::InvitationResponse,
            api::models::invitations::InvitationCreatedResponse,
            api::models::invitations::AcceptInvitationRequest,
            api::models::invitations::AcceptInvitationResponse,
            api::models::customers::CustomerCreate,
            api::models::customers::CustomerUpdate,
            api::models::customers::CustomerResponse,
            api::models::credits::BalanceResponse,
            api::models::credits::CreditTransactionResponse,
            api::models::credits::CreditPackageResponse,
            api::models::credits::PurchaseRequest,
            api::models::credits::PurchaseStatus,
            api::models::credits::PurchaseResponse,
            api::models::credits::AutoRechargeSettingsResponse,
            api::models::credits::AutoRechargeSettingsUpdate,
            api::models::credits::RechargeAttemptResponse,
            api::models::credits::AdjustmentKind,
            api::models::credits::AdminCreditAdjustment,
            api::models::credits::ReconciliationResponse,
            api::models::payments::SetupIntentResponse,
            api::models::payments::PaymentMethodResponse,
            api::models::documents::DocumentResponse,
            api::models::documents::ReviewRequest,
            api::models::voice::VoiceAgentCreate,
            api::models::voice::VoiceAgentResponse,
            api::models::voice::VoiceWebhook,
            api::models::voice::VoiceWebhookMessage,
            api::models::voice::VoiceCall,
            api::models::voice::VoiceCallCustomer,
            api::models::communications::SendSmsRequest,
            api::models::communications::SendEmailRequest,
            api::models::communications::CommunicationResponse,
            api::models::admin::AdminOrganizationDetail,
            api::models::admin::ApprovalEventResponse,
            billing::auto_recharge::SkipReason,
            billing::auto_recharge::RechargeOutcome,
            billing::auto_recharge::RechargeSweep,
            db::models::organizations::ApprovalStatus,
            db::models::organizations::MemberRole,
            db::models::customers::CustomerStatus,
            db::models::credits::CreditTransactionType,
            db::models::auto_recharge::RechargeTrigger,
            db::models::auto_recharge::AttemptStatus,
            db::models::communications::Channel,
            db::models::communications::CommunicationStatus,
            db::models::approvals::ApprovalSubject,
            tenant_cleanup::CleanupReport,
            tenant_cleanup::CleanupStep,
            tenant_cleanup::CleanupOutcome,
            tenant_cleanup::CleanupResource,
        )
    ),
    tags(
        (name = "authentication", description = "Sign up, sign in and sign out. Registration creates the organization in `pending` review."),
        (name = "users", description = "The signed-in user and their membership."),
        (name = "organization", description = "The caller's organization, its members and linked vendor accounts."),
        (name = "invitations", description = "Invite teammates by email. Tokens are single-use and expire."),
        (name = "customers", description = "CRM records scoped to the caller's organization."),
        (name = "credits", description = "Prepaid balance, the append-only ledger, packages and auto-recharge.

Every change to the balance is a ledger entry. Balances never go below zero: a debit that would overdraw returns `402`."),
        (name = "payments", description = "Saved cards at the payment provider."),
        (name = "documents", description = "Verification documents reviewed by the platform before approval."),
        (name = "voice", description = "Voice-AI agents provisioned at the voice provider."),
        (name = "communications", description = "Outbound SMS and email, billed per message, and the log of calls and messages."),
        (name = "webhooks", description = "Signed callbacks from the payment and voice providers."),
        (name = "admin", description = "Super-admin only: approvals, credit adjustments and document review across organizations."),
    ),
    info(
        title = "CRM API",
        version = "1.0.0",
        description = "Multi-tenant CRM with customer records, communication channels and a prepaid credit ledger.

## Authentication

Browser clients use the session cookie set at login. Deployments behind an authenticating proxy can pass the user's email in a trusted header instead.

## Errors

Errors are JSON objects with a `message` field. Notable statuses:

- `402` the organization has too few credits
- `403` missing permission, or the organization is not yet approved
- `502` a vendor call failed
- `503` the vendor integration is not configured",
    ),
)]
pub struct ApiDoc;
