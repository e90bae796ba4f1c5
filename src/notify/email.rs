//! SMTP delivery via lettre.

use async_trait::async_trait;
use lettre::message::MultiPart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{EmailMessage, SmtpConnection, SmtpSender};
use crate::database::SecurityMode;
use crate::errors::NotifyError;

/// Production SMTP sender. A transport is built per send; delivery volume is
/// a handful of messages per outage, not a mail queue.
#[derive(Debug, Clone, Default)]
pub struct LettreSmtpSender;

impl LettreSmtpSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SmtpSender for LettreSmtpSender {
    async fn send(
        &self,
        connection: &SmtpConnection,
        to: &str,
        message: &EmailMessage,
    ) -> Result<(), NotifyError> {
        let from = connection
            .from_address
            .parse()
            .map_err(|e| NotifyError::Smtp(format!("invalid from address: {e}")))?;
        let to = to
            .parse()
            .map_err(|e| NotifyError::Smtp(format!("invalid recipient: {e}")))?;

        let mime = Message::builder()
            .from(from)
            .to(to)
            .subject(&message.subject)
            .multipart(MultiPart::alternative_plain_html(
                message.text_body.clone(),
                message.html_body.clone(),
            ))
            .map_err(|e| NotifyError::Smtp(format!("message build failed: {e}")))?;

        // Security mode mapping: None -> plain connection, SslTls -> implicit
        // TLS on connect, StartTls -> STARTTLS upgrade.
        let mut builder = match connection.security {
            SecurityMode::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&connection.host)
            }
            SecurityMode::SslTls => AsyncSmtpTransport::<Tokio1Executor>::relay(&connection.host)
                .map_err(|e| NotifyError::Smtp(format!("tls setup failed: {e}")))?,
            SecurityMode::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&connection.host)
                    .map_err(|e| NotifyError::Smtp(format!("starttls setup failed: {e}")))?
            }
        };
        builder = builder.port(connection.port);

        if let Some(username) = &connection.username {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                connection.password.clone().unwrap_or_default(),
            ));
        }

        let transport = builder.build();
        transport
            .send(mime)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;
        Ok(())
    }
}
