use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
};
use std::{
    future::{Ready, ready},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
    time::Instant,
};
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";
const RESPONSE_TIME_HEADER: &str = "x-response-time";

/// Tags every request with an id (reusing a client-supplied `x-request-id`),
/// runs the handler inside a span carrying it, and reports the elapsed time.
pub struct RequestTracing;

impl<S, B> Transform<S, ServiceRequest> for RequestTracing
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestTracingService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestTracingService {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestTracingService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestTracingService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let start = Instant::now();

        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %req.method(),
            path = %req.path()
        );
        let fut = span.in_scope(|| service.call(req));

        Box::pin(
            async move {
                let mut res = fut.await?;
                let duration_ms = start.elapsed().as_millis();

                let headers = res.headers_mut();
                if let Ok(value) = HeaderValue::from_str(&request_id) {
                    headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                }
                if let Ok(value) = HeaderValue::from_str(&format!("{}ms", duration_ms)) {
                    headers.insert(HeaderName::from_static(RESPONSE_TIME_HEADER), value);
                }

                info!(
                    status = res.status().as_u16(),
                    duration_ms = duration_ms,
                    "Request processed"
                );
                Ok(res)
            }
            .instrument(span),
        )
    }
}
