//! Exception boundary.
//!
//! The outermost layer of the stack. Every failure raised below it ends up
//! here exactly once and is rendered as an [`ApiResponse`] envelope:
//!
//! - a `LendError` returned by a handler (carried as [`PendingFailure`])
//! - an error returned by an inner service
//! - a panic while handling the request
//!
//! Successful responses pass through untouched.

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use futures::{future::BoxFuture, FutureExt};
use std::{
    any::Any,
    convert::Infallible,
    future::Future,
    panic::AssertUnwindSafe,
    task::{Context, Poll},
};
use tower::{Layer, Service, ServiceExt};

use crate::api::ApiResponse;
use crate::error::{LendError, PendingFailure};

/// Render a failure as the JSON envelope, logging it once.
pub fn translate(error: &LendError) -> Response {
    error.log();
    let body = ApiResponse::<()>::from_error(error);
    (error.http_status(), axum::Json(body)).into_response()
}

/// The exception translator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionBoundary;

impl ExceptionBoundary {
    /// Run `next` inside the boundary. Always produces a response.
    pub async fn handle<F, Fut, E>(request: Request, next: F) -> Response
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = Result<Response, E>>,
        E: Into<LendError>,
    {
        let outcome = AssertUnwindSafe(async move { next(request).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(response)) => Self::finish(response),
            Ok(Err(e)) => translate(&e.into()),
            Err(panic) => translate(&LendError::internal(panic_message(panic.as_ref()))),
        }
    }

    /// Render a pending failure, if the response carries one.
    ///
    /// Headers already set on the response, such as a renewed access token,
    /// are kept.
    pub fn finish(response: Response) -> Response {
        let (mut parts, body) = response.into_parts();
        let Some(PendingFailure(error)) = parts.extensions.remove::<PendingFailure>() else {
            return Response::from_parts(parts, body);
        };

        let rendered = translate(&error);
        let (rendered_parts, rendered_body) = rendered.into_parts();

        parts.status = rendered_parts.status;
        parts.headers.remove(header::CONTENT_LENGTH);
        parts.headers.insert(
            header::CONTENT_TYPE,
            rendered_parts
                .headers
                .get(header::CONTENT_TYPE)
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static("application/json")),
        );

        Response::from_parts(parts, rendered_body)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panic while handling request: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panic while handling request: {}", message)
    } else {
        "panic while handling request".to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer and Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Exception boundary layer for Tower. Mount it outermost.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionBoundaryLayer;

impl ExceptionBoundaryLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for ExceptionBoundaryLayer {
    type Service = ExceptionBoundaryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ExceptionBoundaryService { inner }
    }
}

/// Exception boundary service. Never fails.
#[derive(Debug, Clone)]
pub struct ExceptionBoundaryService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for ExceptionBoundaryService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<LendError> + Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness errors of the inner service are translated per call.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let inner = self.inner.clone();

        Box::pin(async move {
            let response = ExceptionBoundary::handle(request, move |request| async move {
                let mut inner = inner;
                inner.ready().await?.call(request).await
            })
            .await;
            Ok(response)
        })
    }
}
