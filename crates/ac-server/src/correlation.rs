//! Per-request correlation id (spec §6 EXPANSION: "A `CorrelationId`
//! middleware ... attached to every response and echoed into the error
//! body's `correlationId` field").
//!
//! The teacher never hand-rolls an actix middleware — it only composes the
//! built-in `Logger`/`Cors` — so this `Service`/`Transform` pair is grounded
//! instead on the request-id idiom other services in the pack use (assign
//! or generate an id, stash it on the request, echo it on the response),
//! adapted to actix-web's `Service` trait since that's what the framework
//! requires in place of a single middleware function.
use actix_web::Error;
use actix_web::HttpMessage;
use actix_web::body::EitherBody;
use actix_web::dev::Service;
use actix_web::dev::ServiceRequest;
use actix_web::dev::ServiceResponse;
use actix_web::dev::Transform;
use actix_web::http::header::HeaderValue;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

pub const HEADER_NAME: &str = "x-correlation-id";

#[derive(Debug, Clone)]
pub struct RequestCorrelationId(pub String);

pub struct CorrelationId;

impl<S, B> Transform<S, ServiceRequest> for CorrelationId
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = CorrelationIdMiddleware<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(CorrelationIdMiddleware { service: Rc::new(service) }))
    }
}

pub struct CorrelationIdMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for CorrelationIdMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    actix_web::dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let id = req
            .headers()
            .get(HEADER_NAME)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_owned())
            .unwrap_or_else(ac_core::correlation_id);
        req.extensions_mut().insert(RequestCorrelationId(id.clone()));
        let service = Rc::clone(&self.service);
        Box::pin(async move {
            let mut res = service.call(req).await?.map_into_left_body();
            if let Ok(value) = HeaderValue::from_str(&id) {
                res.headers_mut().insert(actix_web::http::header::HeaderName::from_static(HEADER_NAME), value);
            }
            Ok(res)
        })
    }
}

/// Reads the id this request was tagged with, for handlers that want to
/// thread it into a log line rather than only the error body.
pub fn current(req: &actix_web::HttpRequest) -> String {
    req.extensions()
        .get::<RequestCorrelationId>()
        .map(|c| c.0.clone())
        .unwrap_or_else(ac_core::correlation_id)
}
