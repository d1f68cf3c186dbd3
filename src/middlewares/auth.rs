use crate::entities::UserRole;
use crate::error::{AppError, AppResult};
use crate::models::AuthContext;
use crate::utils::{Claims, JwtService};
use actix_web::http::Method;
use actix_web::{
    Error, HttpMessage, HttpRequest,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures_util::future::LocalBoxFuture;
use std::future::{Ready, ready};

// 公开路径配置
struct PublicPaths {
    exact_paths: Vec<&'static str>,
    prefix_paths: Vec<&'static str>,
}

impl PublicPaths {
    fn new() -> Self {
        Self {
            exact_paths: vec!["/swagger-ui", "/api-docs/openapi.json"],
            prefix_paths: vec![
                "/swagger-ui/",
                "/api-docs/",
                "/api/v1/auth/",
                "/api/v1/public/",
            ],
        }
    }

    fn is_public_path(&self, path: &str) -> bool {
        if self.exact_paths.contains(&path) {
            return true;
        }
        self.prefix_paths
            .iter()
            .any(|&prefix| path.starts_with(prefix))
    }
}

/// 由 access token 的声明构造请求上下文
fn context_from_claims(claims: &Claims) -> AppResult<AuthContext> {
    let user_id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))?;
    let role = UserRole::parse(&claims.role)
        .ok_or_else(|| AppError::AuthError("Invalid token role".to_string()))?;
    Ok(AuthContext {
        user_id,
        organization_id: claims.org,
        role,
    })
}

fn bearer_token(req: &ServiceRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub struct AuthMiddleware {
    jwt_service: JwtService,
}

impl AuthMiddleware {
    pub fn new(jwt_service: JwtService) -> Self {
        Self { jwt_service }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service,
            jwt_service: self.jwt_service.clone(),
            public_paths: PublicPaths::new(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
    jwt_service: JwtService,
    public_paths: PublicPaths,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // 放行所有 CORS 预检请求
        if req.method() == Method::OPTIONS || self.public_paths.is_public_path(req.path()) {
            return Box::pin(self.service.call(req));
        }

        let Some(token) = bearer_token(&req) else {
            let error = AppError::AuthError("Missing access token".to_string());
            return Box::pin(async move { Err(error.into()) });
        };

        let ctx = self
            .jwt_service
            .verify_access_token(token)
            .and_then(|claims| context_from_claims(&claims));
        match ctx {
            Ok(ctx) => {
                req.extensions_mut().insert(ctx);
                Box::pin(self.service.call(req))
            }
            Err(e) => {
                log::debug!("Rejected token on {}: {e}", req.path());
                let error = AppError::AuthError("Invalid access token".to_string());
                Box::pin(async move { Err(error.into()) })
            }
        }
    }
}

/// 处理函数读取当前请求上下文
pub fn auth_context(req: &HttpRequest) -> AppResult<AuthContext> {
    req.extensions()
        .get::<AuthContext>()
        .copied()
        .ok_or_else(|| AppError::AuthError("Missing access token".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths() {
        let p = PublicPaths::new();
        assert!(p.is_public_path("/api/v1/auth/login"));
        assert!(p.is_public_path("/api/v1/public/raffles/3/reserve"));
        assert!(p.is_public_path("/swagger-ui/index.html"));
        assert!(p.is_public_path("/api-docs/openapi.json"));
        assert!(!p.is_public_path("/api/v1/raffles"));
        assert!(!p.is_public_path("/api/v1/publicity"));
    }

    #[test]
    fn test_context_from_access_token() {
        let jwt = JwtService::new("test-secret", 3600, 7200);
        let token = jwt.generate_access_token(5, 9, "admin").unwrap();
        let claims = jwt.verify_access_token(&token).unwrap();
        let ctx = context_from_claims(&claims).unwrap();
        assert_eq!(
            ctx,
            AuthContext {
                user_id: 5,
                organization_id: 9,
                role: UserRole::Admin,
            }
        );
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let claims = Claims {
            sub: "1".into(),
            org: 1,
            role: "superuser".into(),
            exp: 0,
            iat: 0,
            token_type: "access".into(),
        };
        assert!(context_from_claims(&claims).is_err());
    }
}
