//! System email: invitations and approval decisions.
//!
//! Bodies are rendered from the templates below with `minijinja` and delivered over SMTP
//! or written to a directory by the file transport.

use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use minijinja::{Environment, context};
use std::path::Path;

use crate::{
    config::{EmailConfig, EmailTransportConfig},
    db::models::organizations::{ApprovalStatus, MemberRole},
    errors::Error,
};

const LAYOUT: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{{ title }}</title>
    <style>
        body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
        .container { max-width: 600px; margin: 0 auto; padding: 20px; }
        .footer { margin-top: 30px; font-size: 12px; color: #666; }
    </style>
</head>
<body>
    <div class="container">
        <h2>{{ title }}</h2>
        {% block content %}{% endblock %}
        <div class="footer">
            <p>This is an automated message, please do not reply to this email.</p>
        </div>
    </div>
</body>
</html>"#;

const INVITATION: &str = r#"{% extends "layout.html" %}
{% block content %}
<p>Hello,</p>
<p>{{ inviter }} has invited you to join <strong>{{ organization }}</strong> as {{ role }}.</p>
<p><a href="{{ link }}">Accept the invitation</a></p>
<p>Or copy and paste this link into your browser:</p>
<p>{{ link }}</p>
<p>This invitation expires on {{ expires }}.</p>
{% endblock %}"#;

const APPROVAL_DECISION: &str = r#"{% extends "layout.html" %}
{% block content %}
<p>Hello,</p>
{% if status == "approved" %}
<p>Good news: <strong>{{ organization }}</strong> has been approved. Messaging and calling are now enabled.</p>
{% elif status == "requires_info" %}
<p>We need more information before we can approve <strong>{{ organization }}</strong>.</p>
{% else %}
<p>We were unable to approve <strong>{{ organization }}</strong>.</p>
{% endif %}
{% if note %}<p>Reviewer note: {{ note }}</p>{% endif %}
<p><a href="{{ link }}">Open your dashboard</a></p>
{% endblock %}"#;

pub struct EmailService {
    transport: EmailTransport,
    from: Mailbox,
    reply_to: Option<Mailbox>,
    templates: Environment<'static>,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

fn parse_mailbox(value: &str) -> Result<Mailbox, Error> {
    value.parse::<Mailbox>().map_err(|e| Error::Internal {
        operation: format!("parse email address '{value}': {e}"),
    })
}

impl EmailService {
    pub fn new(config: &EmailConfig) -> Result<Self, Error> {
        let transport = match &config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                    operation: format!("create emails directory: {e}"),
                })?;
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        let mut templates = Environment::new();
        for (name, source) in [
            ("layout.html", LAYOUT),
            ("invitation.html", INVITATION),
            ("approval_decision.html", APPROVAL_DECISION),
        ] {
            templates.add_template(name, source).map_err(|e| Error::Internal {
                operation: format!("compile email template {name}: {e}"),
            })?;
        }

        Ok(Self {
            transport,
            from: parse_mailbox(&format!("{} <{}>", config.from_name, config.from_email))?,
            reply_to: config.reply_to.as_deref().map(parse_mailbox).transpose()?,
            templates,
        })
    }

    fn render(&self, template: &str, ctx: minijinja::Value) -> Result<String, Error> {
        self.templates
            .get_template(template)
            .and_then(|t| t.render(ctx))
            .map_err(|e| Error::Internal {
                operation: format!("render email template {template}: {e}"),
            })
    }

    pub fn invitation_body(&self, organization: &str, inviter: &str, role: MemberRole, link: &str, expires: &str) -> Result<String, Error> {
        let role = match role {
            MemberRole::Owner => "an owner",
            MemberRole::Admin => "an admin",
            MemberRole::Member => "a member",
        };
        self.render(
            "invitation.html",
            context! {
                title => format!("Join {organization}"),
                organization,
                inviter,
                role,
                link,
                expires,
            },
        )
    }

    pub fn approval_decision_body(&self, organization: &str, status: ApprovalStatus, note: Option<&str>, link: &str) -> Result<String, Error> {
        self.render(
            "approval_decision.html",
            context! {
                title => "Your application has been reviewed",
                organization,
                status => status.as_str(),
                note,
                link,
            },
        )
    }

    pub async fn send_invitation(
        &self,
        to_email: &str,
        organization: &str,
        inviter: &str,
        role: MemberRole,
        link: &str,
        expires: &str,
    ) -> Result<(), Error> {
        let body = self.invitation_body(organization, inviter, role, link, expires)?;
        self.send_email(to_email, &format!("You're invited to join {organization}"), body)
            .await
    }

    pub async fn send_approval_decision(
        &self,
        to_email: &str,
        organization: &str,
        status: ApprovalStatus,
        note: Option<&str>,
        link: &str,
    ) -> Result<(), Error> {
        let body = self.approval_decision_body(organization, status, note, link)?;
        self.send_email(to_email, &format!("Update on {organization}"), body).await
    }

    async fn send_email(&self, to_email: &str, subject: &str, body: String) -> Result<(), Error> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(to_email)?)
            .subject(subject)
            .header(ContentType::TEXT_HTML);
        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.clone());
        }
        let message = builder.body(body).map_err(|e| Error::Internal {
            operation: format!("build email message: {e}"),
        })?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
            }
        }

        Ok(())
    }
}
