//! 验证码投递：SMTP 发信，或者只写日志（本地开发）。

use application::{NotifierError, VerificationNotifier};
use async_trait::async_trait;
use domain::{UserEmail, VerificationCode};
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info};

/// 日志中的收件人只保留首字符与域名，完整地址只在 debug 级别输出。
fn masked_recipient(email: &UserEmail) -> String {
    match email.as_str().split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}

/// 验证邮件的标题与正文。
pub struct VerificationEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl VerificationEmail {
    pub fn new(code: &VerificationCode, ttl_minutes: i64) -> Self {
        Self {
            subject: "Your Messenger verification code".to_string(),
            text: format!(
                "Your verification code is: {code}\n\n\
                 The code expires in {ttl_minutes} minutes.\n\n\
                 If you did not sign up for Messenger, ignore this email."
            ),
            html: format!(
                r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: sans-serif; color: #333;">
    <h2>Confirm your email</h2>
    <p>Your verification code is:</p>
    <p style="font-size: 32px; font-weight: bold; letter-spacing: 6px;">{code}</p>
    <p style="color: #666;">The code expires in {ttl_minutes} minutes.</p>
    <p style="color: #888; font-size: 12px;">If you did not sign up for Messenger, ignore this email.</p>
</body>
</html>"#
            ),
        }
    }
}

/// SMTP 连接参数。
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
}

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    code_ttl_minutes: i64,
}

impl SmtpNotifier {
    pub fn new(
        settings: SmtpSettings,
        from_address: &str,
        from_name: Option<&str>,
        code_ttl_minutes: i64,
    ) -> Result<Self, NotifierError> {
        let SmtpSettings {
            host,
            port,
            username,
            password,
            use_tls,
        } = settings;

        let mut builder = if use_tls {
            let tls = TlsParameters::new(host.clone())
                .map_err(|e| NotifierError::Build(format!("TLS configuration error: {e}")))?;
            // 465 端口是隐式 TLS，其余端口走 STARTTLS
            if port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
                    .map_err(|e| NotifierError::Build(format!("SMTP relay error: {e}")))?
                    .port(port)
                    .tls(Tls::Wrapper(tls))
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
                    .map_err(|e| NotifierError::Build(format!("SMTP relay error: {e}")))?
                    .port(port)
                    .tls(Tls::Required(tls))
            }
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host).port(port)
        };

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        let from = match from_name {
            Some(name) => format!("{name} <{from_address}>"),
            None => from_address.to_string(),
        };
        let from = from
            .parse::<Mailbox>()
            .map_err(|e| NotifierError::Build(format!("invalid from address: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from,
            code_ttl_minutes,
        })
    }
}

#[async_trait]
impl VerificationNotifier for SmtpNotifier {
    async fn send_verification_code(
        &self,
        email: &UserEmail,
        code: &VerificationCode,
    ) -> Result<(), NotifierError> {
        let content = VerificationEmail::new(code, self.code_ttl_minutes);
        let to = email
            .as_str()
            .parse::<Mailbox>()
            .map_err(|e| NotifierError::Build(format!("invalid recipient: {e}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(content.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(content.text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(content.html),
                    ),
            )
            .map_err(|e| NotifierError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifierError::Delivery(e.to_string()))?;
        debug!(email = %email, "verification email delivered");
        info!(recipient = %masked_recipient(email), "verification email sent");
        Ok(())
    }
}

/// 不发信，只把验证码写进日志。
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl VerificationNotifier for LogNotifier {
    async fn send_verification_code(
        &self,
        email: &UserEmail,
        code: &VerificationCode,
    ) -> Result<(), NotifierError> {
        debug!(email = %email, "verification code recipient");
        info!(
            recipient = %masked_recipient(email),
            code = %code,
            "verification code (log provider)"
        );
        Ok(())
    }
}
