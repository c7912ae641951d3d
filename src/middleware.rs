use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION};
use actix_web::{
    body::MessageBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::time::Instant;
use tracing::{field, info, info_span, warn, Span};
use tracing_actix_web::RootSpanBuilder;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Id assigned to a request by [`RequestId`], stored in request extensions.
#[derive(Debug, Clone)]
pub struct RequestIdValue(pub String);

fn route_of(req: &ServiceRequest) -> String {
    req.match_pattern().unwrap_or_else(|| "unmatched".to_string())
}

/// Root span for `TracingLogger`.
///
/// Records the route pattern rather than the request target, so query
/// strings (search terms carry names) never reach the logs. The request id
/// is the one [`RequestId`] puts in the `x-request-id` header, which means
/// `RequestId` must wrap outside `TracingLogger`.
#[derive(Debug, Clone, Copy)]
pub struct RequestSpan;

impl RootSpanBuilder for RequestSpan {
    fn on_request_start(request: &ServiceRequest) -> Span {
        let request_id = request
            .extensions()
            .get::<RequestIdValue>()
            .map(|id| id.0.clone())
            .unwrap_or_default();

        info_span!(
            "HTTP request",
            http.method = %request.method(),
            http.route = %route_of(request),
            request_id = %request_id,
            http.status_code = field::Empty,
            exception.message = field::Empty,
        )
    }

    fn on_request_end<B: MessageBody>(span: Span, outcome: &Result<ServiceResponse<B>, Error>) {
        match outcome {
            Ok(response) => {
                let status = response.status();
                span.record("http.status_code", status.as_u16());
                // Redirects and 4xx are expected outcomes; only server errors are recorded.
                if status.is_server_error() {
                    if let Some(error) = response.response().error() {
                        span.record("exception.message", field::display(error));
                    }
                }
            }
            Err(error) => {
                let status = error.as_response_error().status_code();
                span.record("http.status_code", status.as_u16());
                span.record("exception.message", field::display(error));
            }
        }
    }
}

/// Structured access log plus HTTP request metrics.
pub struct AccessLog;

impl<S, B> Transform<S, ServiceRequest> for AccessLog
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AccessLogMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessLogMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct AccessLogMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AccessLogMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();

        Box::pin(async move {
            let method = req.method().to_string();
            let path = req.path().to_string();
            // Route pattern keeps ids out of metric labels.
            let endpoint = route_of(&req);
            let ip = req.peer_addr().map(|addr| addr.ip().to_string());
            let request_id = req.extensions().get::<RequestIdValue>().map(|id| id.0.clone());

            let start_time = Instant::now();
            let res = svc.call(req).await;
            let elapsed = start_time.elapsed();

            HTTP_REQUEST_DURATION
                .with_label_values(&[method.as_str(), endpoint.as_str()])
                .observe(elapsed.as_secs_f64());

            match &res {
                Ok(response) => {
                    let status = response.status().as_u16();
                    HTTP_REQUESTS_TOTAL
                        .with_label_values(&[method.as_str(), endpoint.as_str(), status.to_string().as_str()])
                        .inc();

                    info!(
                        method = %method,
                        path = %path,
                        status = status,
                        duration_ms = elapsed.as_millis() as u64,
                        ip = ?ip,
                        request_id = ?request_id,
                        "HTTP_REQUEST"
                    );
                }
                Err(err) => {
                    HTTP_REQUESTS_TOTAL
                        .with_label_values(&[method.as_str(), endpoint.as_str(), "error"])
                        .inc();

                    warn!(
                        method = %method,
                        path = %path,
                        error = %err,
                        ip = ?ip,
                        request_id = ?request_id,
                        "REQUEST_ERROR"
                    );
                }
            }

            res
        })
    }
}

/// Request ID middleware for tracing
pub struct RequestId;

impl<S, B> Transform<S, ServiceRequest> for RequestId
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestIdMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestIdMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestIdMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestIdMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let request_id = Uuid::new_v4().to_string();
        req.extensions_mut().insert(RequestIdValue(request_id.clone()));

        let svc = self.service.clone();

        Box::pin(async move {
            let mut res = svc.call(req).await?;
            // A v4 uuid is always a valid header value.
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                res.headers_mut()
                    .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
            }
            Ok(res)
        })
    }
}
