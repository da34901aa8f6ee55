use super::*;
use lettermill_application::EnqueueEmailInput;
use lettermill_domain::LocalizedText;

/// Localized subject lines for the admin test email.
fn test_subjects() -> LocalizedText {
    [
        ("en", "Email delivery test"),
        ("de", "Test des E-Mail-Versands"),
        ("fr", "Test d'envoi d'e-mail"),
        ("es", "Prueba de envío de correo"),
    ]
    .into_iter()
    .map(|(language, text)| (language.to_owned(), text.to_owned()))
    .collect()
}

/// Localized bodies for the admin test email.
fn test_bodies() -> LocalizedText {
    [
        (
            "en",
            "<p>This is a test email from your quiz platform. Delivery settings are working.</p>",
        ),
        (
            "de",
            "<p>Dies ist eine Test-E-Mail Ihrer Quiz-Plattform. Die Versandeinstellungen funktionieren.</p>",
        ),
        (
            "fr",
            "<p>Ceci est un e-mail de test de votre plateforme de quiz. Les paramètres d'envoi fonctionnent.</p>",
        ),
        (
            "es",
            "<p>Este es un correo de prueba de su plataforma de cuestionarios. La configuración de envío funciona.</p>",
        ),
    ]
    .into_iter()
    .map(|(language, text)| (language.to_owned(), text.to_owned()))
    .collect()
}

/// Renders a localized test email and enqueues it like any other message,
/// so a test send exercises the full queue/transport path.
pub async fn test_send_handler(
    State(state): State<AppState>,
    Json(payload): Json<TestEmailRequest>,
) -> ApiResult<Json<EnqueuedEmailResponse>> {
    let language = payload.language.unwrap_or_else(|| "en".to_owned());

    let subjects = test_subjects();
    let subject = subjects
        .resolve(language.as_str(), "en")
        .unwrap_or("Email delivery test")
        .to_owned();
    let bodies = test_bodies();
    let html_body = bodies
        .resolve(language.as_str(), "en")
        .unwrap_or_default()
        .to_owned();

    let item = state
        .queue_service
        .enqueue(EnqueueEmailInput {
            recipient: payload.recipient,
            subject,
            html_body,
            email_type: "Test Email".to_owned(),
            language: Some(language),
            lead_id: None,
            quiz_id: None,
            reply_to: None,
            max_retries: None,
        })
        .await?;

    Ok(Json(item.into()))
}
