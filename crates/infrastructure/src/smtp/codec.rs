//! Pure SMTP protocol codec: reply parsing, command formatting, and
//! RFC 5322/2047 message assembly. No I/O lives here so the connection
//! layer and alternate transports stay independently testable.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use lettermill_core::{AppError, AppResult};
use lettermill_domain::OutboundEmail;
use uuid::Uuid;

/// Base64 body lines are hard-wrapped at this width per RFC 2045.
const BODY_WRAP_WIDTH: usize = 76;

/// One complete SMTP server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    /// Three-digit status code from the final reply line.
    pub code: u16,
    /// Every reply line, joined for diagnostics.
    pub text: String,
}

impl SmtpReply {
    /// Assembles a reply from accumulated lines, parsing the status code
    /// from the final line.
    pub fn from_lines(lines: &[String]) -> AppResult<Self> {
        let last = lines
            .last()
            .ok_or_else(|| AppError::Delivery("empty SMTP reply".to_owned()))?;

        Ok(Self {
            code: parse_code(last)?,
            text: lines.join(" ").trim().to_owned(),
        })
    }
}

/// Returns whether `line` terminates a reply.
///
/// Multi-line replies mark continuation with `-` as the 4th character
/// (`250-STARTTLS`); the final line uses a space or nothing (`250 OK`).
#[must_use]
pub fn is_final_line(line: &str) -> bool {
    line.as_bytes().get(3) != Some(&b'-')
}

/// Parses the leading three-digit status code.
pub fn parse_code(line: &str) -> AppResult<u16> {
    line.get(..3)
        .and_then(|digits| digits.parse::<u16>().ok())
        .ok_or_else(|| {
            AppError::Delivery(format!("malformed SMTP reply line '{}'", line.trim_end()))
        })
}

/// `EHLO` with the client hostname.
#[must_use]
pub fn ehlo(hostname: &str) -> String {
    format!("EHLO {hostname}")
}

/// `AUTH LOGIN` opener; username and password follow base64-encoded.
#[must_use]
pub fn auth_login() -> String {
    "AUTH LOGIN".to_owned()
}

/// Base64 credential line for the AUTH LOGIN exchange.
#[must_use]
pub fn auth_credential(value: &str) -> String {
    BASE64.encode(value.as_bytes())
}

/// `MAIL FROM` with the reverse-path.
#[must_use]
pub fn mail_from(address: &str) -> String {
    format!("MAIL FROM:<{address}>")
}

/// `RCPT TO` with one forward-path.
#[must_use]
pub fn rcpt_to(address: &str) -> String {
    format!("RCPT TO:<{address}>")
}

/// Returns whether `value` needs RFC 2047 encoding, detected by scanning
/// for any byte outside the ASCII range.
#[must_use]
pub fn needs_encoding(value: &str) -> bool {
    value.bytes().any(|byte| byte >= 0x80)
}

/// Wraps a header value as an RFC 2047 encoded-word when it carries
/// non-ASCII bytes; ASCII passes through unmodified.
#[must_use]
pub fn encode_header_word(value: &str) -> String {
    if needs_encoding(value) {
        format!("=?UTF-8?B?{}?=", BASE64.encode(value.as_bytes()))
    } else {
        value.to_owned()
    }
}

/// Formats a display-name mailbox for From/Reply-To headers.
#[must_use]
pub fn format_mailbox(name: &str, address: &str) -> String {
    format!("{} <{address}>", encode_header_word(name))
}

/// Base64-encodes `data` hard-wrapped at 76 characters per line.
#[must_use]
pub fn wrap_base64(data: &[u8]) -> String {
    let encoded = BASE64.encode(data);
    encoded
        .as_bytes()
        .chunks(BODY_WRAP_WIDTH)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// Assembles the full RFC 5322 message: headers, blank line, base64 body.
///
/// The terminating `.` line belongs to the connection layer. Returns the
/// message text and the generated Message-ID (without angle brackets),
/// which doubles as the provider message id for SMTP deliveries.
#[must_use]
pub fn build_message(email: &OutboundEmail) -> (String, String) {
    let message_id = format!("{}@{}", Uuid::new_v4(), email.sender.address.domain());

    let mut headers = vec![
        format!(
            "From: {}",
            format_mailbox(email.sender.name.as_str(), email.sender.address.as_str())
        ),
        format!("To: {}", email.recipient.as_str()),
        format!("Subject: {}", encode_header_word(email.subject.as_str())),
        format!("Date: {}", Utc::now().to_rfc2822()),
        format!("Message-ID: <{message_id}>"),
        "MIME-Version: 1.0".to_owned(),
        "Content-Type: text/html; charset=UTF-8".to_owned(),
        "Content-Transfer-Encoding: base64".to_owned(),
    ];

    if let Some(reply_to) = &email.reply_to {
        headers.insert(3, format!("Reply-To: {}", reply_to.as_str()));
    }

    let message = format!(
        "{}\r\n\r\n{}",
        headers.join("\r\n"),
        wrap_base64(email.html_body.as_bytes())
    );

    (message, message_id)
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use lettermill_domain::{EmailAddress, OutboundEmail, SenderIdentity};

    use super::{
        SmtpReply, auth_credential, build_message, encode_header_word, is_final_line, mail_from,
        needs_encoding, parse_code, rcpt_to, wrap_base64,
    };

    fn email(subject: &str, html: &str) -> OutboundEmail {
        let recipient = EmailAddress::new("lead@example.com").unwrap_or_else(|_| unreachable!());
        let sender_address =
            EmailAddress::new("no-reply@quiz.example.com").unwrap_or_else(|_| unreachable!());
        let sender =
            SenderIdentity::new("Quiz Team", sender_address).unwrap_or_else(|_| unreachable!());
        OutboundEmail::new(recipient, sender, None, subject, html)
            .unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn continuation_lines_do_not_terminate_a_reply() {
        assert!(!is_final_line("250-smtp.example.com"));
        assert!(!is_final_line("250-AUTH LOGIN PLAIN"));
        assert!(is_final_line("250 OK"));
        assert!(is_final_line("220 smtp.example.com ESMTP"));
        // A bare code with no text is still final.
        assert!(is_final_line("421"));
    }

    #[test]
    fn parse_code_reads_the_leading_digits() {
        let code = parse_code("354 End data with <CR><LF>.<CR><LF>");
        assert!(code.is_ok());
        assert_eq!(code.unwrap_or_default(), 354);

        assert!(parse_code("not a reply").is_err());
        assert!(parse_code("25").is_err());
    }

    #[test]
    fn reply_takes_code_from_the_final_line() {
        let reply = SmtpReply::from_lines(&[
            "250-smtp.example.com".to_owned(),
            "250-SIZE 35882577".to_owned(),
            "250 AUTH LOGIN PLAIN".to_owned(),
        ]);
        assert!(reply.is_ok());
        let reply = reply.unwrap_or_else(|_| unreachable!());
        assert_eq!(reply.code, 250);
        assert!(reply.text.contains("SIZE"));
    }

    #[test]
    fn envelope_commands_wrap_addresses_in_angle_brackets() {
        assert_eq!(
            mail_from("no-reply@quiz.example.com"),
            "MAIL FROM:<no-reply@quiz.example.com>"
        );
        assert_eq!(rcpt_to("lead@example.com"), "RCPT TO:<lead@example.com>");
    }

    #[test]
    fn auth_credentials_are_base64() {
        assert_eq!(auth_credential("mailer"), "bWFpbGVy");
    }

    #[test]
    fn ascii_subject_passes_through_unmodified() {
        assert!(!needs_encoding("Your quiz results"));
        assert_eq!(encode_header_word("Your quiz results"), "Your quiz results");
    }

    #[test]
    fn non_ascii_subject_round_trips_through_the_encoded_word() {
        let subject = "Dein Ergebnis: großartig ✓";
        assert!(needs_encoding(subject));

        let encoded = encode_header_word(subject);
        assert!(encoded.starts_with("=?UTF-8?B?"));
        assert!(encoded.ends_with("?="));

        let payload = &encoded["=?UTF-8?B?".len()..encoded.len() - 2];
        let decoded = BASE64.decode(payload);
        assert!(decoded.is_ok());
        assert_eq!(
            String::from_utf8_lossy(&decoded.unwrap_or_default()),
            subject
        );
    }

    #[test]
    fn body_lines_never_exceed_the_wrap_width() {
        let body = "x".repeat(500);
        let wrapped = wrap_base64(body.as_bytes());
        assert!(wrapped.lines().all(|line| line.len() <= 76));
        assert!(wrapped.lines().count() > 1);
    }

    #[test]
    fn wire_body_decodes_back_to_the_original_html() {
        let html = "<html><body><h1>Résultats</h1><p>Score: 42 — bravo!</p></body></html>";
        let (message, _) = build_message(&email("Results", html));

        let body = message
            .split_once("\r\n\r\n")
            .map(|(_, body)| body)
            .unwrap_or_default();
        let joined: String = body.lines().collect();
        let decoded = BASE64.decode(joined.trim());
        assert!(decoded.is_ok());
        assert_eq!(decoded.unwrap_or_default(), html.as_bytes());
    }

    #[test]
    fn message_carries_the_required_headers() {
        let (message, message_id) = build_message(&email("Results", "<p>hi</p>"));

        assert!(message.starts_with("From: Quiz Team <no-reply@quiz.example.com>\r\n"));
        assert!(message.contains("To: lead@example.com\r\n"));
        assert!(message.contains("Subject: Results\r\n"));
        assert!(message.contains("MIME-Version: 1.0\r\n"));
        assert!(message.contains("Content-Type: text/html; charset=UTF-8\r\n"));
        assert!(message.contains("Content-Transfer-Encoding: base64\r\n"));
        assert!(message.contains(&format!("Message-ID: <{message_id}>\r\n")));
        assert!(message_id.ends_with("@quiz.example.com"));
        assert!(!message.contains("Reply-To:"));
    }

    #[test]
    fn reply_to_header_appears_when_set() {
        let mut with_reply_to = email("Results", "<p>hi</p>");
        with_reply_to.reply_to =
            Some(EmailAddress::new("support@quiz.example.com").unwrap_or_else(|_| unreachable!()));

        let (message, _) = build_message(&with_reply_to);
        assert!(message.contains("Reply-To: support@quiz.example.com\r\n"));
    }
}
