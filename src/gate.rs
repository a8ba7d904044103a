use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{self, HeaderValue};
use actix_web::{Error, HttpResponse};
use futures_util::future::LocalBoxFuture;
use log::{debug, warn};
use tokio::time::timeout;

use crate::context::GateContext;
use crate::engine::{decide, Decision, DecisionInput};
use crate::identity::SessionState;
use crate::response::Response;

/// Middleware that evaluates the access rules for every inbound request
/// before it reaches a route handler. Wrap the whole application in it;
/// requests only reach their handlers on an allow decision.
pub struct AccessGate {
    ctx: Arc<GateContext>,
}

impl AccessGate {
    pub fn new(ctx: Arc<GateContext>) -> Self {
        Self { ctx }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AccessGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = GateService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(GateService {
            service: Rc::new(service),
            ctx: self.ctx.clone(),
        }))
    }
}

pub struct GateService<S> {
    service: Rc<S>,
    ctx: Arc<GateContext>,
}

impl<S, B> Service<ServiceRequest> for GateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let ctx = self.ctx.clone();

        Box::pin(async move {
            let evaluation = evaluate(&ctx, &req).await;

            match evaluation.decision {
                Decision::Allow => {
                    let mut res = service.call(req).await?.map_into_left_body();
                    if let Some(value) = evaluation.refreshed_cookie {
                        let cookie =
                            format!("{}={}; Path=/; HttpOnly", ctx.cookie_name, value);
                        if let Ok(value) = HeaderValue::from_str(&cookie) {
                            res.headers_mut().append(header::SET_COOKIE, value);
                        }
                    }
                    Ok(res)
                }
                Decision::Redirect { path, query } => {
                    let resp: HttpResponse = Response::redirect(&path, &query).into();
                    Ok(req.into_response(resp).map_into_right_body())
                }
                Decision::Reject { status, code } => {
                    let resp: HttpResponse = Response::reject(status, code).into();
                    Ok(req.into_response(resp).map_into_right_body())
                }
                Decision::ForceLogoutThenRedirect { path, query } => {
                    // Teardown happens before the redirect is sent, so a
                    // client following it can never reuse the old session.
                    force_logout(&ctx, evaluation.caller_id.as_deref()).await;

                    let mut resp: HttpResponse = Response::redirect(&path, &query).into();
                    let removal = format!("{}=; Max-Age=0; Path=/", ctx.cookie_name);
                    if let Ok(value) = HeaderValue::from_str(&removal) {
                        resp.headers_mut().append(header::SET_COOKIE, value);
                    }
                    Ok(req.into_response(resp).map_into_right_body())
                }
            }
        })
    }
}

struct Evaluation {
    decision: Decision,
    caller_id: Option<String>,
    refreshed_cookie: Option<String>,
}

/// Runs classification, session resolution and identity lookup, then the
/// decision table, once for the request. The two store calls are awaited
/// sequentially; each is bounded by the configured timeout.
async fn evaluate(ctx: &GateContext, req: &ServiceRequest) -> Evaluation {
    let facts = ctx.rules.classify(req.path());
    let session = ctx.session.resolve(req).await;

    let (caller_id, refreshed_cookie) = match &session {
        SessionState::Present(verified) => (
            Some(verified.caller_id.clone()),
            verified.refreshed_cookie.clone(),
        ),
        SessionState::Absent => (None, None),
    };

    let identity = match caller_id.as_deref() {
        Some(id) => ctx.fetch_identity(id).await,
        None => None,
    };

    let input = DecisionInput {
        facts,
        session,
        identity,
        login_path: ctx.rules.login_path.clone(),
        admin_home: ctx.rules.admin_section.clone(),
    };
    let decision = decide(&input);
    debug!("Gate decision for {}: {decision:?}", req.path());

    Evaluation {
        decision,
        caller_id,
        refreshed_cookie,
    }
}

/// Invalidates the caller's sessions at the backend. Failures (including a
/// session that is already gone) are logged and swallowed; the redirect
/// must go out either way.
async fn force_logout(ctx: &GateContext, caller_id: Option<&str>) {
    let Some(caller_id) = caller_id else {
        return;
    };
    match timeout(ctx.store_timeout, ctx.store.invalidate_session(caller_id)).await {
        Ok(Ok(())) => debug!("Tore down sessions for {caller_id}"),
        Ok(Err(err)) => warn!("Session teardown for {caller_id} failed: {err:#}"),
        Err(_) => warn!(
            "Session teardown for {caller_id} timed out after {:?}",
            ctx.store_timeout
        ),
    }
}
