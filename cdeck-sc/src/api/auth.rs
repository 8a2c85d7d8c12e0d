//! Authentication middleware
//!
//! Bearer-token check applied to every route except `/health`, which
//! stays open for liveness probes. An empty shared secret disables the
//! check entirely, for local development.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tower::{Layer, Service};
use tracing::debug;

#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    error: &'static str,
    message: &'static str,
}

/// Tower layer validating the `Authorization: Bearer <secret>` header
#[derive(Clone)]
pub struct AuthLayer {
    pub shared_secret: String,
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            shared_secret: self.shared_secret.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    shared_secret: String,
}

impl<S> Service<Request> for AuthMiddleware<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let shared_secret = self.shared_secret.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            // liveness probes must work without credentials
            if request.uri().path() == "/health" {
                return inner.call(request).await;
            }

            if shared_secret.is_empty() {
                debug!("API authentication disabled (empty shared secret)");
                return inner.call(request).await;
            }

            let authorized = request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|token| token == shared_secret)
                .unwrap_or(false);

            if !authorized {
                let response = (
                    StatusCode::UNAUTHORIZED,
                    Json(AuthErrorResponse {
                        error: "unauthorized",
                        message: "missing or invalid bearer token",
                    }),
                )
                    .into_response();
                return Ok(response);
            }

            inner.call(request).await
        })
    }
}
