use crate::config::EmailConfig;
use crate::error::app_error::AppError;
use lettre::message::header::ContentType;
use lettre::message::{MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

#[derive(Debug, Clone)]
pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Send a password reset email with the reset token
    pub async fn send_password_reset_email(&self, to_email: &str, reset_token: &str, reset_url: &str, ttl_minutes: i64) -> Result<(), AppError> {
        if !self.config.enabled {
            tracing::warn!(to = %to_email, "Email service is disabled, skipping password reset email");
            return Ok(());
        }

        let reset_link = format!("{}?token={}", reset_url, reset_token);

        let subject = "Tilbakestill passordet ditt i DriftPro";
        let html_body = self.generate_reset_email_html(&reset_link, ttl_minutes);
        let text_body = self.generate_reset_email_text(&reset_link, ttl_minutes);

        self.send_email(to_email, subject, &html_body, &text_body).await
    }

    fn generate_reset_email_html(&self, reset_link: &str, ttl_minutes: i64) -> String {
        format!(
            r##"<!DOCTYPE html>
<html lang="no">
<head>
    <meta charset="UTF-8">
    <title>Tilbakestill passord</title>
</head>
<body style="font-family: -apple-system, 'Segoe UI', Roboto, Arial, sans-serif; background-color: #F2F2F7; padding: 24px;">
    <table role="presentation" width="100%" style="max-width: 560px; margin: 0 auto; background: #FFFFFF; border-radius: 12px;">
        <tr>
            <td style="padding: 24px; border-bottom: 4px solid #007AFF;">
                <h1 style="margin: 0; font-size: 20px;">DriftPro</h1>
            </td>
        </tr>
        <tr>
            <td style="padding: 24px;">
                <p>Vi har mottatt en forespørsel om å tilbakestille passordet ditt.</p>
                <p><a href="{}" style="display: inline-block; padding: 12px 20px; background: #007AFF; color: #FFFFFF; border-radius: 8px; text-decoration: none;">Tilbakestill passord</a></p>
                <p>Lenken utløper om {} minutter. Hvis knappen ikke virker, kopier denne adressen: {}</p>
                <p>Hvis du ikke ba om dette, kan du se bort fra e-posten.</p>
            </td>
        </tr>
    </table>
</body>
</html>
"##,
            reset_link, ttl_minutes, reset_link
        )
    }

    fn generate_reset_email_text(&self, reset_link: &str, ttl_minutes: i64) -> String {
        format!(
            r#"DriftPro | Tilbakestill passord

Vi har mottatt en forespørsel om å tilbakestille passordet ditt.

Bruk lenken under:
{}

Lenken utløper om {} minutter.

Hvis du ikke ba om dette, kan du se bort fra e-posten.
"#,
            reset_link, ttl_minutes
        )
    }

    async fn send_email(&self, to_email: &str, subject: &str, html_body: &str, text_body: &str) -> Result<(), AppError> {
        let email = Message::builder()
            .from(
                format!("{} <{}>", self.config.from_name, self.config.from_address)
                    .parse()
                    .map_err(|e| AppError::email(format!("Invalid from address: {}", e)))?,
            )
            .to(to_email.parse().map_err(|e| AppError::email(format!("Invalid to address: {}", e)))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(text_body.to_string()))
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_HTML).body(html_body.to_string())),
            )
            .map_err(|e| AppError::email(format!("Failed to build email: {}", e)))?;

        let creds = Credentials::new(self.config.smtp_username.clone(), self.config.smtp_password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)
            .map_err(|e| AppError::email(format!("Failed to create SMTP transport: {}", e)))?
            .credentials(creds)
            .port(self.config.smtp_port)
            .build();

        mailer
            .send(email)
            .await
            .map_err(|e| AppError::email(format!("Failed to send email: {}", e)))?;

        tracing::info!(to = %to_email, "Password reset email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> EmailService {
        EmailService::new(EmailConfig::default())
    }

    #[test]
    fn test_generate_reset_email_html() {
        let html = service().generate_reset_email_html("https://example.com/reset?token=abc123", 15);

        assert!(html.contains("https://example.com/reset?token=abc123"));
        assert!(html.contains("15 minutter"));
        assert!(html.contains("DriftPro"));
    }

    #[test]
    fn test_generate_reset_email_text() {
        let text = service().generate_reset_email_text("https://example.com/reset?token=xyz789", 30);

        assert!(text.contains("https://example.com/reset?token=xyz789"));
        assert!(text.contains("30 minutter"));
    }

    #[tokio::test]
    async fn disabled_service_skips_sending() {
        let result = service().send_password_reset_email("kari@acme.no", "token", "https://example.com/reset", 15).await;
        assert!(result.is_ok());
    }
}
