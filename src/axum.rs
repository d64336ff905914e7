//! Axum integration utilities.

use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::authorizer::RepositoryAuthorizer;
use crate::context::AuthorizationContext;
use crate::error::AuthorizationError;
use crate::permission::PermissionMap;
use crate::request::OrgAccessInput;
use crate::types::{Action, DataClassification, DataResidency, OrgId, ResourceType, RoleKey, UserId};

use ::axum::body::Body;
use ::axum::extract::FromRequestParts;
use ::axum::response::{IntoResponse, Response};
use ::http::request::Parts;
use ::http::{HeaderName, Request, StatusCode};
use ::tower::{Layer, Service};

/// Header carrying a caller-supplied correlation id.
pub const CORRELATION_ID_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Authenticated caller, inserted into request extensions by upstream authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub org_id: OrgId,
    pub user_id: UserId,
}

impl Principal {
    pub fn new(org_id: OrgId, user_id: UserId) -> Self {
        Self { org_id, user_id }
    }
}

/// Per-route authorization requirements.
#[derive(Debug, Clone)]
pub struct RouteRequirement {
    action: Action,
    resource_type: ResourceType,
    required_roles: Option<Vec<RoleKey>>,
    required_permissions: Option<PermissionMap>,
    required_any_permissions: Option<Vec<PermissionMap>>,
    expected_residency: Option<DataResidency>,
    expected_classification: Option<DataClassification>,
    audit_source: Option<String>,
}

impl RouteRequirement {
    pub fn new(action: Action, resource_type: ResourceType) -> Self {
        Self {
            action,
            resource_type,
            required_roles: None,
            required_permissions: None,
            required_any_permissions: None,
            expected_residency: None,
            expected_classification: None,
            audit_source: None,
        }
    }

    pub fn require_roles(mut self, roles: impl IntoIterator<Item = RoleKey>) -> Self {
        self.required_roles = Some(roles.into_iter().collect());
        self
    }

    pub fn require_permissions(mut self, permissions: PermissionMap) -> Self {
        self.required_permissions = Some(permissions);
        self
    }

    pub fn require_any_permissions(mut self, profiles: impl IntoIterator<Item = PermissionMap>) -> Self {
        self.required_any_permissions = Some(profiles.into_iter().collect());
        self
    }

    pub fn expect_residency(mut self, residency: DataResidency) -> Self {
        self.expected_residency = Some(residency);
        self
    }

    pub fn expect_classification(mut self, classification: DataClassification) -> Self {
        self.expected_classification = Some(classification);
        self
    }

    pub fn audit_source(mut self, source: impl Into<String>) -> Self {
        self.audit_source = Some(source.into());
        self
    }

    fn to_input(&self, principal: Principal, correlation_id: Option<String>) -> OrgAccessInput {
        OrgAccessInput {
            org_id: principal.org_id,
            user_id: principal.user_id,
            action: self.action.clone(),
            resource_type: self.resource_type.clone(),
            required_roles: self.required_roles.clone(),
            required_permissions: self.required_permissions.clone(),
            required_any_permissions: self.required_any_permissions.clone(),
            expected_classification: self.expected_classification,
            expected_residency: self.expected_residency,
            audit_source: self.audit_source.clone(),
            correlation_id,
            resource_attributes: Default::default(),
        }
    }
}

impl IntoResponse for AuthorizationError {
    fn into_response(self) -> Response {
        match self {
            Self::AuthorizationFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "authorization error").into_response()
            }
            _ => (StatusCode::FORBIDDEN, "not authorized").into_response(),
        }
    }
}

/// Extractor for the context inserted by [`AuthorizeService`].
#[derive(Debug, Clone)]
pub struct Authorized(pub Arc<AuthorizationContext>);

impl<S> FromRequestParts<S> for Authorized
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<AuthorizationContext>>()
            .cloned()
            .map(Authorized)
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "authorization layer missing"))
    }
}

/// Middleware layer that authorizes a request using [`RepositoryAuthorizer`].
#[derive(Debug, Clone)]
pub struct AuthorizeLayer {
    authorizer: Arc<RepositoryAuthorizer>,
    requirement: Arc<RouteRequirement>,
}

impl AuthorizeLayer {
    /// Creates a new authorization layer.
    pub fn new(authorizer: Arc<RepositoryAuthorizer>, requirement: RouteRequirement) -> Self {
        Self {
            authorizer,
            requirement: Arc::new(requirement),
        }
    }
}

impl<Inner> Layer<Inner> for AuthorizeLayer {
    type Service = AuthorizeService<Inner>;

    fn layer(&self, inner: Inner) -> Self::Service {
        AuthorizeService {
            inner,
            authorizer: self.authorizer.clone(),
            requirement: self.requirement.clone(),
        }
    }
}

/// Middleware service that authorizes requests and attaches the [`AuthorizationContext`].
#[derive(Debug, Clone)]
pub struct AuthorizeService<Inner> {
    inner: Inner,
    authorizer: Arc<RepositoryAuthorizer>,
    requirement: Arc<RouteRequirement>,
}

impl<Inner> Service<Request<Body>> for AuthorizeService<Inner>
where
    Inner: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    Inner::Future: Send + 'static,
    Inner::Error: Send,
{
    type Response = Response;
    type Error = Inner::Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let authorizer = self.authorizer.clone();
        let requirement = self.requirement.clone();

        Box::pin(async move {
            let Some(principal) = req.extensions().get::<Principal>().cloned() else {
                return Ok((StatusCode::UNAUTHORIZED, "missing principal").into_response());
            };
            let correlation_id = req
                .headers()
                .get(CORRELATION_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let input = requirement.to_input(principal, correlation_id);

            let outcome = authorizer
                .authorize(input, move |context| async move {
                    req.extensions_mut().insert(Arc::new(context));
                    poll_fn(|cx| inner.poll_ready(cx)).await?;
                    inner.call(req).await
                })
                .await;

            match outcome {
                Ok(response) => response,
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}
