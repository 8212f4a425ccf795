//! The API dispatcher.
//!
//! Every request under `/api` lands here. The pipeline is:
//!
//! 1. Parse the route (`{app}/{controller}[/...]`) and the `X-Language` header
//! 2. Refuse banned or throttled caller IPs
//! 3. Extract and authenticate the API key
//! 4. Resolve the application and controller, check the key may reach the app
//! 5. Run the controller and materialize its output
//! 6. Serialize (pretty JSON), localize, write the audit entry if flagged
//!
//! Any [`ApiError`] raised along the way becomes the `{errorCode,
//! errorMessage}` envelope with the error's HTTP status.

use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::{
    controllers::ApiRequest,
    error::{ApiError, ErrorEnvelope},
    models::api_log::ApiLogEntry,
    request::InboundRequest,
    response::ApiResponse,
    routing::Route,
    services::{
        auth::{authenticate, extract_credentials},
        localization::negotiate_language,
        throttle,
    },
    state::AppState,
};

/// Serialized response body.
#[derive(Serialize)]
#[serde(untagged)]
enum Payload {
    Data(Value),
    Error(ErrorEnvelope),
}

/// What the pipeline learned about the request, for the audit log.
#[derive(Debug, Default)]
struct Trail {
    presented_key: Option<String>,
    language: Option<String>,
    should_log: bool,
    is_bad_key: bool,
}

impl Trail {
    /// Failures that are always audited. Unresolvable keys also count
    /// towards the caller's throttle.
    fn note_failure(&mut self, err: &ApiError) {
        match err {
            ApiError::InvalidApiKey => {
                self.should_log = true;
                self.is_bad_key = true;
            }
            ApiError::IpAddressNotAllowed
            | ApiError::CannotUseKeyAsUrlParam
            | ApiError::NoPermission
            | ApiError::IpAddressBanned
            | ApiError::TooManyRequestsWithBadKey => self.should_log = true,
            _ => {}
        }
    }
}

/// Handler for `/api`, `/api/` and `/api/{*path}`.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let inbound = match InboundRequest::read(request, &state.config).await {
        Ok(inbound) => inbound,
        Err(err) => {
            tracing::warn!(error = %err, "unreadable API request");
            let body = encode(&Payload::Error(err.envelope(state.config.dev_mode)));
            return json_response(err.status(), body);
        }
    };

    let mut trail = Trail::default();
    let outcome = match run(&state, &inbound, &mut trail).await {
        Ok(response) => materialize(response).await,
        Err(err) => Err(err),
    };

    let (status, payload) = match outcome {
        Ok(done) => done,
        Err(err) => {
            trail.note_failure(&err);
            if err.is_internal() {
                tracing::error!(
                    error = %err,
                    endpoint = %inbound.endpoint,
                    "internal error while handling API request"
                );
            }
            (
                err.status(),
                Some(Payload::Error(err.envelope(state.config.dev_mode))),
            )
        }
    };

    let mut body = payload.as_ref().map(encode).unwrap_or_default();
    if !body.is_empty() {
        body = state.localizer.localize(body, trail.language.as_deref());
    }

    if trail.should_log || state.config.log_all_requests {
        audit(&state, &inbound, &trail, status, &body).await;
    }

    tracing::info!(
        method = %inbound.method,
        endpoint = %inbound.endpoint,
        ip = %inbound.ip,
        status = status.as_u16(),
        "API request handled"
    );

    json_response(status, body)
}

async fn run(
    state: &AppState,
    inbound: &InboundRequest,
    trail: &mut Trail,
) -> Result<ApiResponse, ApiError> {
    let route = Route::parse(&inbound.endpoint, inbound.method.clone())?;
    trail.language = negotiate_language(&inbound.headers, &state.config.supported_languages)?;

    throttle::check_caller(state.ledger.as_ref(), &state.bans, &inbound.ip).await?;

    let credentials = extract_credentials(&inbound.headers, &inbound.params, &inbound.query)
        .ok_or(ApiError::NoApiKey)?;
    trail.presented_key = Some(credentials.raw_key.clone());

    let key = authenticate(
        state.keys.as_ref(),
        &state.config,
        &credentials,
        &inbound.ip,
    )
    .await?;

    let controller = state.registry.resolve(&route.app, &route.controller)?;
    if !key.allows_app(&route.app) {
        return Err(ApiError::NoPermission);
    }

    let mut request = ApiRequest {
        key,
        verb: route.verb,
        segments: route.segments,
        params: inbound.params.clone(),
        language: trail.language.clone(),
        should_log: false,
    };

    let result = controller.handle(&mut request).await;
    trail.should_log |= request.should_log;

    result
}

async fn materialize(response: ApiResponse) -> Result<(StatusCode, Option<Payload>), ApiError> {
    let status = response.status();
    let output = response.into_output().await?;

    Ok((status, output.map(Payload::Data)))
}

fn encode(payload: &Payload) -> String {
    serde_json::to_string_pretty(payload).unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to encode API response");
        String::new()
    })
}

fn json_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// Write the audit entry. A failed write is logged and otherwise ignored.
async fn audit(
    state: &AppState,
    inbound: &InboundRequest,
    trail: &Trail,
    status: StatusCode,
    body: &str,
) {
    let entry = ApiLogEntry {
        endpoint: inbound.endpoint.clone(),
        method: inbound.method.to_string(),
        api_key: trail.presented_key.clone(),
        ip_address: inbound.ip.clone(),
        request_data: serde_json::to_string(&inbound.params).unwrap_or_default(),
        response_code: i32::from(status.as_u16()),
        response_output: body.to_string(),
        created_at: Utc::now(),
        is_bad_key: trail.is_bad_key,
    };

    if let Err(err) = state.ledger.record(&entry).await {
        tracing::error!(error = %err, endpoint = %entry.endpoint, "failed to write API audit entry");
    }
}
