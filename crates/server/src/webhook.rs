//! HTTP transport: Slack posts slash commands to `/events-endpoint` and the reply is
//! returned synchronously as JSON.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use slashbot_slack::{
    commands::CommandContext,
    parse_slash_command_form,
    signature::{SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER},
    SlashCommandService,
};
use tracing::{debug, error, warn};

pub const EVENTS_PATH: &str = "/events-endpoint";

pub struct WebhookState {
    signing_secret: SecretString,
    service: Arc<dyn SlashCommandService>,
}

impl WebhookState {
    pub fn new(signing_secret: SecretString, service: Arc<dyn SlashCommandService>) -> Self {
        Self { signing_secret, service }
    }
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route(EVENTS_PATH, post(events_endpoint)).with_state(Arc::new(state))
}

async fn events_endpoint(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut verifier = match SignatureVerifier::new(
        state.signing_secret.expose_secret(),
        header_value(&headers, TIMESTAMP_HEADER),
        header_value(&headers, SIGNATURE_HEADER),
        Utc::now(),
    ) {
        Ok(verifier) => verifier,
        Err(error) => {
            warn!(
                event_name = "ingress.webhook.verifier_failed",
                error = %error,
                "failed to create secret verifier"
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let payload = match parse_slash_command_form(&body) {
        Ok(payload) => payload,
        Err(error) => {
            error!(
                event_name = "ingress.webhook.parse_failed",
                error = %error,
                "failed to parse slash command"
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    verifier.update(&body);
    if let Err(error) = verifier.ensure() {
        warn!(
            event_name = "ingress.webhook.signature_rejected",
            error = %error,
            "failed to verify signature"
        );
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let correlation_id = if payload.trigger_id.is_empty() {
        "webhook".to_owned()
    } else {
        payload.trigger_id.clone()
    };
    debug!(
        event_name = "ingress.webhook.command_received",
        correlation_id = %correlation_id,
        command = %payload.command,
        user_id = %payload.user_id,
        "slash command received"
    );

    let message = match state.service.handle(&payload, &CommandContext { correlation_id }).await {
        Ok(message) => message,
        Err(error) => {
            error!(
                event_name = "ingress.webhook.command_failed",
                error = %error,
                "failed to handle slash command"
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match serde_json::to_vec(&message) {
        Ok(body) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        Err(error) => {
            error!(
                event_name = "ingress.webhook.encode_failed",
                error = %error,
                "failed to marshal response"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use chrono::Utc;
    use secrecy::SecretString;
    use serde_json::Value;
    use slashbot_slack::{
        commands::{CommandContext, CommandError, SlashCommandPayload},
        signature::{sign, SIGNATURE_HEADER, TIMESTAMP_HEADER},
        GreetingCommandService, SlackMessage, SlashCommandService,
    };
    use tower::ServiceExt;

    use super::{router, WebhookState, EVENTS_PATH};

    const SECRET: &str = "e6b19c573432dcc6b075501d51b51bb8";
    const FORM: &[u8] = b"token=t&team_id=T1&user_id=U1&user_name=alice\
&command=%2Fhello&text=hello+world&trigger_id=123.456";

    #[derive(Default)]
    struct CountingService {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SlashCommandService for CountingService {
        async fn handle(
            &self,
            payload: &SlashCommandPayload,
            _ctx: &CommandContext,
        ) -> Result<SlackMessage, CommandError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CommandError::Service("downstream unavailable".to_owned()));
            }
            Ok(SlackMessage::in_channel(format!("ok {}", payload.command)))
        }
    }

    fn app(service: Arc<dyn SlashCommandService>) -> Router {
        router(WebhookState::new(SecretString::from(SECRET.to_owned()), service))
    }

    fn signed_request(body: &'static [u8]) -> Request<Body> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign(SECRET, &timestamp, body).expect("sign");
        Request::post(EVENTS_PATH)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(TIMESTAMP_HEADER, timestamp)
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body))
            .expect("request")
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.expect("body").to_vec()
    }

    #[tokio::test]
    async fn signed_command_gets_greeting_json() {
        let response = app(Arc::new(GreetingCommandService))
            .oneshot(signed_request(FORM))
            .await
            .expect("call");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok()),
            Some("application/json")
        );
        let payload: Value = serde_json::from_slice(&body_bytes(response).await).expect("json");
        assert_eq!(
            payload,
            serde_json::json!({
                "text": "Hello, alice cmd/hello hello world",
                "response_type": "in_channel"
            })
        );
    }

    #[tokio::test]
    async fn bad_signature_is_unauthorized_and_skips_handler() {
        let service = Arc::new(CountingService::default());
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign("some-other-secret", &timestamp, FORM).expect("sign");
        let request = Request::post(EVENTS_PATH)
            .header(TIMESTAMP_HEADER, timestamp)
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(FORM))
            .expect("request");

        let response = app(service.clone()).oneshot(request).await.expect("call");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_bytes(response).await.is_empty());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_signature_headers_are_server_errors() {
        let service = Arc::new(CountingService::default());
        let request = Request::post(EVENTS_PATH).body(Body::from(FORM)).expect("request");

        let response = app(service.clone()).oneshot(request).await.expect("call");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_bytes(response).await.is_empty());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected_before_parsing() {
        let timestamp = (Utc::now().timestamp() - 3_600).to_string();
        let signature = sign(SECRET, &timestamp, FORM).expect("sign");
        let request = Request::post(EVENTS_PATH)
            .header(TIMESTAMP_HEADER, timestamp)
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(FORM))
            .expect("request");

        let response =
            app(Arc::new(GreetingCommandService)).oneshot(request).await.expect("call");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn out_of_range_timestamp_is_a_server_error() {
        let service = Arc::new(CountingService::default());
        let request = Request::post(EVENTS_PATH)
            .header(TIMESTAMP_HEADER, i64::MIN.to_string())
            .header(SIGNATURE_HEADER, "v0=00")
            .body(Body::from(FORM))
            .expect("request");

        let response = app(service.clone()).oneshot(request).await.expect("call");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_bytes(response).await.is_empty());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparsable_form_is_a_server_error_even_when_signed() {
        let service = Arc::new(CountingService::default());

        let response =
            app(service.clone()).oneshot(signed_request(b"command=%zz")).await.expect("call");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_failure_is_a_server_error() {
        let service = Arc::new(CountingService { fail: true, ..CountingService::default() });

        let response = app(service.clone()).oneshot(signed_request(FORM)).await.expect("call");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_bytes(response).await.is_empty());
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn only_post_is_routed() {
        let response = app(Arc::new(GreetingCommandService))
            .oneshot(Request::get(EVENTS_PATH).body(Body::empty()).expect("request"))
            .await
            .expect("call");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
