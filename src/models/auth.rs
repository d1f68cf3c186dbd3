use crate::entities::{UserRole, organization_entity, user_entity};
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::OrganizationResponse;

/// 请求上下文：由认证中间件写入 request extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: i64,
    pub organization_id: i64,
    pub role: UserRole,
}

impl AuthContext {
    /// owner / admin
    pub fn require_manager(&self) -> AppResult<()> {
        if self.role.can_manage() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    pub fn require_owner(&self) -> AppResult<()> {
        if self.role == UserRole::Owner {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    /// 资源必须属于当前组织；否则按不存在处理
    pub fn ensure_same_org(&self, organization_id: i64, what: &str) -> AppResult<()> {
        if self.organization_id == organization_id {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("{what} not found")))
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "Sorteos Don Pepe")]
    pub organization_name: String,
    #[schema(example = "pepe@example.com")]
    pub email: String,
    #[schema(example = "Password123")]
    pub password: String,
    #[schema(example = "José Pérez")]
    pub full_name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "pepe@example.com")]
    pub email: String,
    #[schema(example = "Password123")]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
}

impl From<user_entity::Model> for UserResponse {
    fn from(m: user_entity::Model) -> Self {
        Self {
            id: m.id,
            email: m.email,
            full_name: m.full_name,
            role: m.role,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// 访问令牌有效期（秒）
    pub expires_in: i64,
    pub user: UserResponse,
    pub organization: OrganizationResponse,
}

impl AuthResponse {
    pub fn new(
        access_token: String,
        refresh_token: String,
        expires_in: i64,
        user: user_entity::Model,
        organization: organization_entity::Model,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_in,
            user: user.into(),
            organization: organization.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_checks() {
        let ctx = AuthContext {
            user_id: 1,
            organization_id: 10,
            role: UserRole::Member,
        };
        assert!(ctx.require_manager().is_err());
        assert!(ctx.require_owner().is_err());
        assert!(ctx.ensure_same_org(10, "Raffle").is_ok());
        assert!(matches!(
            ctx.ensure_same_org(11, "Raffle"),
            Err(AppError::NotFound(_))
        ));

        let owner = AuthContext {
            role: UserRole::Owner,
            ..ctx
        };
        assert!(owner.require_manager().is_ok());
        assert!(owner.require_owner().is_ok());
    }
}
