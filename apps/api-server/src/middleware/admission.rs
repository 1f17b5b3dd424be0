//! Admission control middleware.

use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderMap, HeaderName, HeaderValue},
};
use std::future::{Future, Ready, ready};
use std::net::SocketAddr;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use dealflow_admission::{AdmissionPipeline, AdmissionRequest};
use dealflow_core::domain::{AdmissionDecision, QuotaSnapshot, Rejection};
use dealflow_core::ports::TokenService;
use dealflow_shared::ErrorResponse;

use crate::middleware::auth::caller_identity;
use crate::observability::RequestId;

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";
const RETRY_AFTER_HEADER: &str = "retry-after";

/// How the middleware reads requests.
#[derive(Debug, Clone, Default)]
pub struct AdmissionOptions {
    /// Header carrying an explicit rate-limit key, set by a trusted gateway.
    pub key_header: Option<String>,
    /// Take the client address from `Forwarded`/`X-Forwarded-For`.
    pub trust_forwarded: bool,
    /// Paths never subject to admission control.
    pub exempt_paths: Vec<String>,
}

/// Admission middleware factory.
pub struct AdmissionMiddleware {
    pipeline: Arc<AdmissionPipeline>,
    tokens: Arc<dyn TokenService>,
    options: Rc<AdmissionOptions>,
}

impl AdmissionMiddleware {
    pub fn new(
        pipeline: Arc<AdmissionPipeline>,
        tokens: Arc<dyn TokenService>,
        options: AdmissionOptions,
    ) -> Self {
        Self {
            pipeline,
            tokens,
            options: Rc::new(options),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdmissionMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AdmissionMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdmissionMiddlewareService {
            service: Rc::new(service),
            pipeline: self.pipeline.clone(),
            tokens: self.tokens.clone(),
            options: self.options.clone(),
        }))
    }
}

pub struct AdmissionMiddlewareService<S> {
    service: Rc<S>,
    pipeline: Arc<AdmissionPipeline>,
    tokens: Arc<dyn TokenService>,
    options: Rc<AdmissionOptions>,
}

impl<S> AdmissionMiddlewareService<S> {
    fn admission_request(&self, req: &ServiceRequest) -> AdmissionRequest {
        let address = if self.options.trust_forwarded {
            req.connection_info()
                .realip_remote_addr()
                .map(strip_port)
        } else {
            req.peer_addr().map(|addr| addr.ip().to_string())
        };

        let key_override = self.options.key_header.as_deref().and_then(|name| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        });

        AdmissionRequest {
            method: req.method().as_str().to_string(),
            path: req.path().to_string(),
            address,
            caller: caller_identity(req.headers(), self.tokens.as_ref()),
            key_override,
        }
    }
}

impl<S, B> Service<ServiceRequest> for AdmissionMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        if self.options.exempt_paths.iter().any(|p| p == req.path()) {
            return Box::pin(async move {
                let res = service.call(req).await?;
                Ok(res.map_into_left_body())
            });
        }

        let pipeline = self.pipeline.clone();
        let request = self.admission_request(&req);

        Box::pin(async move {
            match pipeline.check(&request).await {
                AdmissionDecision::Admit(admission) => {
                    let mut res = service.call(req).await?;

                    if let Some(quota) = admission.quota {
                        quota_headers(res.headers_mut(), &quota);
                    }
                    pipeline
                        .settle(&admission, res.status().as_u16())
                        .await;

                    Ok(res.map_into_left_body())
                }
                AdmissionDecision::Reject(rejection) => {
                    let request_id = req.extensions().get::<RequestId>().cloned();
                    let response = rejection_response(&rejection, request_id, req.path());

                    let (http_req, _payload) = req.into_parts();
                    let srv_response = ServiceResponse::new(http_req, response);
                    Ok(srv_response.map_into_right_body())
                }
            }
        })
    }
}

fn rejection_response(
    rejection: &Rejection,
    request_id: Option<RequestId>,
    path: &str,
) -> HttpResponse {
    let error = match rejection.http_status {
        403 => ErrorResponse::forbidden().with_detail(rejection.message.clone()),
        _ => ErrorResponse::too_many_requests(rejection.message.clone()),
    };
    let mut error = error
        .with_code(rejection.code)
        .with_retry_after(rejection.retry_after_secs)
        .with_instance(path);
    if let Some(id) = request_id {
        error = error.with_request_id(id.0);
    }

    let status = actix_web::http::StatusCode::from_u16(rejection.http_status)
        .unwrap_or(actix_web::http::StatusCode::TOO_MANY_REQUESTS);
    let mut response = HttpResponse::build(status).json(error);

    if let Some(quota) = &rejection.quota {
        quota_headers(response.headers_mut(), quota);
    }
    if let Some(retry_after) = rejection.retry_after_secs {
        insert_number(response.headers_mut(), RETRY_AFTER_HEADER, retry_after);
    }
    response
}

fn quota_headers(headers: &mut HeaderMap, quota: &QuotaSnapshot) {
    insert_number(headers, LIMIT_HEADER, quota.limit);
    insert_number(headers, REMAINING_HEADER, quota.remaining);
    let reset = quota.reset_after.as_secs() + u64::from(quota.reset_after.subsec_nanos() > 0);
    insert_number(headers, RESET_HEADER, reset);
}

fn insert_number(headers: &mut HeaderMap, name: &'static str, value: u64) {
    headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
}

fn strip_port(addr: &str) -> String {
    addr.parse::<SocketAddr>()
        .map(|socket| socket.ip().to_string())
        .unwrap_or_else(|_| addr.to_string())
}
