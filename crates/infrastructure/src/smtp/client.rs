//! SMTP connection layer: socket setup, reply reading, command/response
//! exchange. Protocol text itself comes from the codec module.

use lettermill_core::{AppError, AppResult};
use lettermill_domain::EmailConfig;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_native_tls::native_tls;
use tracing::debug;

use super::codec::{self, SmtpReply};

type Reader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// One authenticated SMTP session.
pub(super) struct SmtpConnection {
    reader: Reader,
    writer: Writer,
}

impl SmtpConnection {
    /// Opens the socket (TLS when the config asks for it), consumes the
    /// greeting, and completes EHLO plus AUTH LOGIN.
    pub(super) async fn connect(config: &EmailConfig) -> AppResult<Self> {
        let host = config.smtp_host.as_str();
        let port = config.smtp_port;

        let tcp = TcpStream::connect((host, port)).await.map_err(|error| {
            AppError::Delivery(format!("failed to connect to {host}:{port}: {error}"))
        })?;

        let mut connection = if config.implicit_tls() {
            let connector = native_tls::TlsConnector::new().map_err(|error| {
                AppError::Delivery(format!("failed to build TLS connector: {error}"))
            })?;
            let connector = tokio_native_tls::TlsConnector::from(connector);
            let tls = connector.connect(host, tcp).await.map_err(|error| {
                AppError::Delivery(format!("TLS handshake with {host}:{port} failed: {error}"))
            })?;
            Self::from_stream(tls)
        } else {
            Self::from_stream(tcp)
        };

        connection.expect_reply(&[220]).await?;
        connection
            .send_command(codec::ehlo("lettermill").as_str(), &[250])
            .await?;
        connection.authenticate(config).await?;

        Ok(connection)
    }

    fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(Box::new(read_half)),
            writer: Box::new(write_half),
        }
    }

    async fn authenticate(&mut self, config: &EmailConfig) -> AppResult<()> {
        self.send_command(codec::auth_login().as_str(), &[334])
            .await?;
        self.send_credential(config.smtp_username.as_str(), &[334])
            .await?;
        self.send_credential(config.smtp_password.as_str(), &[235])
            .await?;
        Ok(())
    }

    /// Sends one base64 credential line without echoing it to the log.
    async fn send_credential(&mut self, value: &str, expected: &[u16]) -> AppResult<SmtpReply> {
        debug!(line = "<credential redacted>", "smtp >");
        self.write_line_raw(codec::auth_credential(value).as_str())
            .await?;
        self.expect_reply(expected).await
    }

    /// Sends the envelope and message payload for one email.
    pub(super) async fn send_message(
        &mut self,
        from: &str,
        recipients: &[&str],
        message: &str,
    ) -> AppResult<()> {
        self.send_command(codec::mail_from(from).as_str(), &[250])
            .await?;
        for recipient in recipients {
            self.send_command(codec::rcpt_to(recipient).as_str(), &[250])
                .await?;
        }
        self.send_command("DATA", &[354]).await?;

        debug!(bytes = message.len(), "smtp > message payload");
        self.write_line_raw(message).await?;
        self.write_line(".").await?;
        self.expect_reply(&[250]).await?;

        Ok(())
    }

    /// Best-effort QUIT; the connection is being torn down regardless, so
    /// errors are swallowed.
    pub(super) async fn close(mut self) {
        if self.write_line("QUIT").await.is_ok() {
            let _ = self.read_reply().await;
        }
        let _ = self.writer.shutdown().await;
    }

    async fn send_command(&mut self, command: &str, expected: &[u16]) -> AppResult<SmtpReply> {
        self.write_line(command).await?;
        self.expect_reply(expected).await
    }

    async fn expect_reply(&mut self, expected: &[u16]) -> AppResult<SmtpReply> {
        let reply = self.read_reply().await?;
        if !expected.contains(&reply.code) {
            return Err(AppError::Delivery(format!(
                "unexpected SMTP status {} (wanted one of {expected:?}): {}",
                reply.code, reply.text
            )));
        }
        Ok(reply)
    }

    async fn read_reply(&mut self) -> AppResult<SmtpReply> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line).await.map_err(|error| {
                AppError::Delivery(format!("failed to read SMTP reply: {error}"))
            })?;
            if read == 0 {
                return Err(AppError::Delivery(
                    "connection closed mid-reply".to_owned(),
                ));
            }

            debug!(line = line.trim_end(), "smtp <");
            let finished = codec::is_final_line(line.as_str());
            lines.push(line.trim_end().to_owned());
            if finished {
                break;
            }
        }

        SmtpReply::from_lines(&lines)
    }

    async fn write_line(&mut self, line: &str) -> AppResult<()> {
        debug!(line, "smtp >");
        self.write_line_raw(line).await
    }

    async fn write_line_raw(&mut self, line: &str) -> AppResult<()> {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .map_err(|error| AppError::Delivery(format!("failed to write SMTP command: {error}")))
    }
}
