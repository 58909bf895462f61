//! Email dispatch for scheduled reports. The rendered report travels as an
//! attachment; the body is a short plain-text summary.

use std::time::Duration;

use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, warn};

fn is_valid_email(target: &str) -> bool {
    let trimmed = target.trim();
    let Some((local, domain)) = trimmed.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
}

fn smtp_noop_enabled() -> bool {
    std::env::var("SITEPULSE_SMTP_NOOP")
        .ok()
        .map(|v| {
            let trimmed = v.trim();
            trimmed.eq_ignore_ascii_case("1")
                || trimmed.eq_ignore_ascii_case("true")
                || trimmed.eq_ignore_ascii_case("yes")
        })
        .unwrap_or(false)
}

/// Send `attachment` to each recipient as its own message. One recipient's
/// failure is logged and counted without blocking the rest; the call fails
/// only when not a single recipient could be reached. SMTP connection
/// parameters come from `SITEPULSE_SMTP_*` env vars; `SITEPULSE_SMTP_NOOP`
/// short-circuits dispatch for tests and local runs.
pub async fn deliver_email(
    recipients: &[String],
    subject: &str,
    body: &str,
    filename: &str,
    content_type: &str,
    attachment: &[u8],
) -> Result<(), String> {
    if recipients.is_empty() {
        return Err("no recipients".to_string());
    }

    let mut delivered = 0usize;
    let mut last_error = String::new();
    for recipient in recipients {
        match send_one(recipient, subject, body, filename, content_type, attachment).await {
            Ok(()) => delivered += 1,
            Err(err) => {
                warn!(recipient = %recipient, error = %err, "recipient delivery failed");
                last_error = err;
            }
        }
    }
    if delivered == 0 {
        return Err(format!(
            "all {} recipients failed, last error: {last_error}",
            recipients.len()
        ));
    }
    Ok(())
}

async fn send_one(
    recipient: &str,
    subject: &str,
    body: &str,
    filename: &str,
    content_type: &str,
    attachment: &[u8],
) -> Result<(), String> {
    if !is_valid_email(recipient) {
        return Err(format!("invalid email target: {recipient}"));
    }
    if smtp_noop_enabled() {
        info!(
            recipient = %recipient,
            filename,
            "SMTP noop transport enabled; marking delivery as sent without network dispatch"
        );
        return Ok(());
    }

    let host = std::env::var("SITEPULSE_SMTP_HOST")
        .map_err(|_| "smtp host is not configured".to_string())?;
    let port = std::env::var("SITEPULSE_SMTP_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(587);
    let from_value = std::env::var("SITEPULSE_SMTP_FROM")
        .unwrap_or_else(|_| "sitepulse@localhost".to_string());
    let from: Mailbox = from_value
        .parse()
        .map_err(|_| "invalid SITEPULSE_SMTP_FROM".to_string())?;
    let to: Mailbox = recipient
        .parse()
        .map_err(|_| format!("invalid email target: {recipient}"))?;

    let mime: ContentType = content_type
        .parse()
        .map_err(|_| format!("invalid attachment content type: {content_type}"))?;
    let email = Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(body.to_string()))
                .singlepart(Attachment::new(filename.to_string()).body(attachment.to_vec(), mime)),
        )
        .map_err(|e| format!("smtp message build failed: {e}"))?;

    let mut transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        .port(port)
        .timeout(Some(Duration::from_secs(5)));
    if let (Ok(user), Ok(pass)) = (
        std::env::var("SITEPULSE_SMTP_USERNAME"),
        std::env::var("SITEPULSE_SMTP_PASSWORD"),
    ) {
        transport = transport.credentials(Credentials::new(user, pass));
    }
    transport
        .build()
        .send(email)
        .await
        .map_err(|e| format!("smtp send failed: {e}"))?;
    Ok(())
}
