use crate::config::EmailConfig;
use crate::error::app_error::AppError;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Send the verification code to an address. When delivery is disabled
    /// (development), the code is logged instead so the flow stays testable
    /// without an SMTP relay.
    pub async fn send_verification_code(&self, to_email: &str, code: &str, valid_minutes: i64) -> Result<(), AppError> {
        if !self.config.enabled {
            tracing::info!(email = %to_email, code = %code, "email delivery disabled, logging verification code");
            return Ok(());
        }

        let subject = "Your BloodLink verification code";
        let html_body = self.generate_otp_email_html(code, valid_minutes);
        let text_body = self.generate_otp_email_text(code, valid_minutes);

        self.send_email(to_email, subject, &html_body, &text_body).await
    }

    /// Generate HTML version of the verification email
    fn generate_otp_email_html(&self, code: &str, valid_minutes: i64) -> String {
        format!(
            r##"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Your BloodLink verification code</title>
    <style>
        body {{
            font-family: Inter, -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif;
            margin: 0;
            padding: 0;
            background-color: #FAFBFC;
            color: #141517;
            line-height: 1.6;
        }}

        .wrapper {{
            width: 100%;
            padding: 28px 12px;
        }}

        .card {{
            max-width: 560px;
            margin: 0 auto;
            background-color: #FFFFFF;
            border: 1px solid rgba(0, 0, 0, 0.08);
            border-radius: 16px;
            padding: 28px 24px;
        }}

        .brand {{
            color: #E03131;
            font-size: 24px;
            font-weight: 700;
            margin: 0 0 18px;
        }}

        .code {{
            display: inline-block;
            background-color: #F1F3F5;
            border-radius: 12px;
            padding: 14px 22px;
            font-size: 32px;
            font-weight: 700;
            letter-spacing: 0.35em;
            margin: 18px 0;
        }}

        .meta {{
            color: #5C5F66;
            font-size: 13px;
            margin: 0 0 16px;
        }}

        .footer {{
            color: #5C5F66;
            font-size: 12px;
            margin-top: 20px;
        }}
    </style>
</head>
<body>
    <div class="wrapper">
      <div class="card">
        <p class="brand">BloodLink</p>
        <p>Use this code to verify your email address:</p>
        <p class="code">{}</p>
        <p class="meta">This code expires in {} minutes and can be used once.</p>
        <p class="footer">If you did not request this code, no action is required. BloodLink will never ask for this code over the phone.</p>
      </div>
    </div>
</body>
</html>
"##,
            code, valid_minutes
        )
    }

    /// Generate plain text version of the verification email
    fn generate_otp_email_text(&self, code: &str, valid_minutes: i64) -> String {
        format!(
            r#"BloodLink | Email Verification

Use this code to verify your email address:

    {}

This code expires in {} minutes and can be used once.

If you did not request this code, no action is required. BloodLink will never ask for this code over the phone.
"#,
            code, valid_minutes
        )
    }

    /// Send an email using SMTP
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
                lettre::message::MultiPart::alternative()
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )
            .map_err(|e| AppError::email(format!("Failed to build email: {}", e)))?;

        let creds = Credentials::new(self.config.smtp_username.clone(), self.config.smtp_password.clone());

        let mailer = SmtpTransport::relay(&self.config.smtp_host)
            .map_err(|e| AppError::email(format!("Failed to create SMTP transport: {}", e)))?
            .credentials(creds)
            .port(self.config.smtp_port)
            .build();

        // Blocking transport, so run the send on the blocking pool
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::email(format!("Failed to spawn email sending task: {}", e)))?;

        result.map_err(|e| AppError::email(format!("Failed to send email: {}", e)))?;

        tracing::info!("Verification email sent successfully to {}", to_email);
        Ok(())
    }
}
