use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::utils::jwt::JwtCodec;

#[derive(Clone)]
pub struct UserAuthLayer {
    codec: Arc<JwtCodec>,
}

impl UserAuthLayer {
    pub fn new(codec: Arc<JwtCodec>) -> Self {
        Self { codec }
    }
}

impl<S> tower::Layer<S> for UserAuthLayer {
    type Service = UserAuthMiddleware<S>;
    fn layer(&self, inner: S) -> Self::Service {
        UserAuthMiddleware {
            inner,
            codec: self.codec.clone(),
        }
    }
}

#[derive(Clone)]
pub struct UserAuthMiddleware<S> {
    inner: S,
    codec: Arc<JwtCodec>,
}

impl<S, ReqBody> tower::Service<Request<ReqBody>> for UserAuthMiddleware<S>
where
    S: tower::Service<Request<ReqBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let inner_clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner_clone);
        if let Ok(user_id) = user_auth(req.headers(), req.uri(), &self.codec) {
            req.extensions_mut().insert(user_id);
        }
        Box::pin(async move { inner.call(req).await })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserId(pub Uuid);

/// Query parameter consulted when no `Authorization` header is present. Browsers cannot
/// set headers on WebSocket upgrades.
pub const TOKEN_QUERY_PARAM: &str = "token";

impl UserId {
    pub fn read_from_parts(parts: &Parts) -> Option<Self> {
        parts.extensions.get::<Self>().copied()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MissingIdentity;

impl IntoResponse for MissingIdentity {
    fn into_response(self) -> Response {
        let body = axum::Json(serde_json::json!({
            "code": "UNAUTHENTICATED",
            "message": "Missing or invalid bearer token",
        }));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = MissingIdentity;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::read_from_parts(parts).ok_or(MissingIdentity)
    }
}

fn user_auth(headers: &HeaderMap, uri: &Uri, codec: &JwtCodec) -> Result<UserId, framework::Error> {
    let token = bearer_token(headers, uri).ok_or(framework::Error::Unauthenticated)?;
    let claims = codec.verify(token)?;
    Ok(UserId(claims.sub))
}

fn bearer_token<'a>(headers: &'a HeaderMap, uri: &'a Uri) -> Option<&'a str> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        return value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());
    }
    uri.query()?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == TOKEN_QUERY_PARAM)
        .map(|(_, value)| value)
        .filter(|t| !t.is_empty())
}
