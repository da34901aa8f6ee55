use lettermill_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// A validated email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Creates a validated email address.
    ///
    /// Validation is deliberately shallow: one `@`, a non-empty local part
    /// and domain, no whitespace. Deliverability is the SMTP server's call.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim();

        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "email address must not be empty".to_owned(),
            ));
        }

        if trimmed.chars().any(char::is_whitespace) {
            return Err(AppError::Validation(format!(
                "email address '{trimmed}' must not contain whitespace"
            )));
        }

        let Some((local, domain)) = trimmed.split_once('@') else {
            return Err(AppError::Validation(format!(
                "email address '{trimmed}' is missing '@'"
            )));
        };

        if local.is_empty() || domain.is_empty() || !domain.contains('.') {
            return Err(AppError::Validation(format!(
                "email address '{trimmed}' has an invalid local part or domain"
            )));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the domain part of the address.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map_or("", |(_, domain)| domain)
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Sender identity (display name plus address) stamped onto outbound mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    /// Display name shown in the From header.
    pub name: NonEmptyString,
    /// Sender address.
    pub address: EmailAddress,
}

impl SenderIdentity {
    /// Creates a sender identity.
    pub fn new(name: impl Into<String>, address: EmailAddress) -> AppResult<Self> {
        Ok(Self {
            name: NonEmptyString::new(name)?,
            address,
        })
    }
}

/// One fully-rendered outbound email handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    /// Recipient address.
    pub recipient: EmailAddress,
    /// Sender identity.
    pub sender: SenderIdentity,
    /// Optional reply-to override.
    pub reply_to: Option<EmailAddress>,
    /// Subject line, UTF-8.
    pub subject: String,
    /// Fully-rendered HTML body.
    pub html_body: String,
}

impl OutboundEmail {
    /// Creates a validated outbound email.
    pub fn new(
        recipient: EmailAddress,
        sender: SenderIdentity,
        reply_to: Option<EmailAddress>,
        subject: impl Into<String>,
        html_body: impl Into<String>,
    ) -> AppResult<Self> {
        let subject = subject.into();
        if subject.trim().is_empty() {
            return Err(AppError::Validation(
                "email subject must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            recipient,
            sender,
            reply_to,
            subject,
            html_body: html_body.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{EmailAddress, OutboundEmail, SenderIdentity};

    #[test]
    fn address_accepts_plain_form() {
        let address = EmailAddress::new("lead@example.com");
        assert!(address.is_ok());
    }

    #[test]
    fn address_rejects_missing_at_and_whitespace() {
        assert!(EmailAddress::new("example.com").is_err());
        assert!(EmailAddress::new("a b@example.com").is_err());
        assert!(EmailAddress::new("a@nodot").is_err());
        assert!(EmailAddress::new("").is_err());
    }

    fn address(value: &str) -> EmailAddress {
        EmailAddress::new(value).unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn address_exposes_domain() {
        assert_eq!(address("lead@mail.example.com").domain(), "mail.example.com");
    }

    #[test]
    fn outbound_email_requires_subject() {
        let sender = SenderIdentity::new("Quiz Team", address("no-reply@example.com"));
        assert!(sender.is_ok());
        let sender = sender.unwrap_or_else(|_| unreachable!());

        let email = OutboundEmail::new(address("lead@example.com"), sender, None, "  ", "<p>hi</p>");
        assert!(email.is_err());
    }
}
