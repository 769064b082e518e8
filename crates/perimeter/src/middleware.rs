//! axum integration: the gate layer and the token entry endpoint.
//!
//! # Usage
//!
//! ```rust,ignore
//! use perimeter::middleware::protect;
//!
//! let app = protect(
//!     Router::new().route("/", get(home)),
//!     gate.clone(),
//! )
//! // the host's session layer must run before the gate
//! .layer(axum::middleware::from_fn(attach_session));
//! ```

use std::net::SocketAddr;

use axum::{
    Form, Router,
    extract::{ConnectInfo, FromRequest, Request, State},
    http::{Uri, header::USER_AGENT},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::post,
};
use serde::Deserialize;
use tracing::error;

use crate::error::PerimeterError;
use crate::gate::{Gate, GateState, Redemption};
use crate::recorder::UseDetails;
use crate::session::SharedSession;

/// Request extension that lets an upstream layer wave a request through,
/// e.g. for authenticated staff.
#[derive(Clone, Copy, Debug, Default)]
pub struct BypassPerimeter;

/// Request extension added for unlocked visitors.
#[derive(Clone, Debug)]
pub struct AccessGranted {
    pub token: String,
}

/// Fields posted to the gateway endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct GatewayForm {
    #[serde(default)]
    pub token: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub next: Option<String>,
}

/// Gate middleware, for use with `axum::middleware::from_fn_with_state`.
///
/// Locked visitors are redirected to the gateway with the original path in
/// `next`. Store or session failures produce an error response, never a
/// pass.
pub async fn perimeter_layer(
    State(gate): State<Gate>,
    mut req: Request,
    next: Next,
) -> Result<Response, PerimeterError> {
    if !gate.is_enabled()
        || req.extensions().get::<BypassPerimeter>().is_some()
        || gate.is_bypassed(req.uri().path())
    {
        return Ok(next.run(req).await);
    }

    let session = session_from(&req)?;
    match gate.check(session.as_ref()).await? {
        GateState::Disabled => Ok(next.run(req).await),
        GateState::Unlocked(token) => {
            req.extensions_mut().insert(AccessGranted { token });
            Ok(next.run(req).await)
        }
        GateState::Locked => {
            let location = gateway_location(&gate.config().gateway_path, req.uri())?;
            Ok(Redirect::to(&location).into_response())
        }
    }
}

/// `POST <gateway_path>`: redeem a token and send the visitor on to `next`.
pub async fn gateway_submit(
    State(gate): State<Gate>,
    req: Request,
) -> Result<Response, PerimeterError> {
    let session = session_from(&req)?;
    let client_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let client_user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let Form(form) = Form::<GatewayForm>::from_request(req, &gate)
        .await
        .map_err(|e| PerimeterError::BadRequest(e.body_text()))?;
    let target = safe_next(form.next.as_deref()).to_string();

    let redemption = Redemption {
        token: form.token,
        details: UseDetails {
            user_email: form.email,
            user_name: form.name,
            client_ip,
            client_user_agent,
        },
    };

    match gate.redeem(session.as_ref(), redemption).await {
        Ok(_) => {}
        // The session is already unlocked; losing the audit row doesn't undo that.
        Err(PerimeterError::Recording(reason)) => {
            error!(%reason, "access token accepted but its use was not recorded");
        }
        Err(err) => return Err(err),
    }

    Ok(Redirect::to(&target).into_response())
}

/// Router with the gateway endpoint mounted at `gateway_path`.
pub fn gateway_router(gate: Gate) -> Router {
    let path = gate.config().gateway_path.clone();
    Router::new()
        .route(&path, post(gateway_submit))
        .with_state(gate)
}

/// Put `router` behind the gate and mount the gateway endpoint.
pub fn protect(router: Router, gate: Gate) -> Router {
    router
        .merge(gateway_router(gate.clone()))
        .layer(middleware::from_fn_with_state(gate, perimeter_layer))
}

fn session_from(req: &Request) -> Result<SharedSession, PerimeterError> {
    req.extensions()
        .get::<SharedSession>()
        .cloned()
        .ok_or_else(|| PerimeterError::Internal("Session not found in request".to_string()))
}

fn gateway_location(gateway_path: &str, uri: &Uri) -> Result<String, PerimeterError> {
    let original = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let query = serde_urlencoded::to_string([("next", original)])
        .map_err(|e| PerimeterError::Internal(format!("Failed to encode redirect: {}", e)))?;
    Ok(format!("{gateway_path}?{query}"))
}

/// Only local absolute paths are followed; anything else goes to `/`.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path)
            if path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\") =>
        {
            path
        }
        _ => "/",
    }
}
