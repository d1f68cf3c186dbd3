use crate::entities::{UserRole, organization_entity as organizations, user_entity as users};
use crate::error::{AppError, AppResult};
use crate::models::{AuthResponse, LoginRequest, RefreshTokenRequest, RegisterRequest, is_valid_email};
use crate::utils::{
    AccountIdentity, JwtService, check_password_strength, generate_slug, hash_password,
    verify_password,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, TransactionTrait,
};

#[derive(Clone)]
pub struct AuthService {
    pool: DatabaseConnection,
    jwt_service: JwtService,
}

impl AuthService {
    pub fn new(pool: DatabaseConnection, jwt_service: JwtService) -> Self {
        Self { pool, jwt_service }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt_service
    }

    fn issue_tokens(
        &self,
        user: users::Model,
        organization: organizations::Model,
    ) -> AppResult<AuthResponse> {
        let access_token = self.jwt_service.generate_access_token(
            user.id,
            organization.id,
            user.role.as_str(),
        )?;
        let refresh_token = self.jwt_service.generate_refresh_token(
            user.id,
            organization.id,
            user.role.as_str(),
        )?;
        Ok(AuthResponse::new(
            access_token,
            refresh_token,
            self.jwt_service.get_access_token_expires_in(),
            user,
            organization,
        ))
    }

    /// 注册：同一事务内创建组织与 owner 用户
    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthResponse> {
        let email = request.email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(AppError::ValidationError("Invalid email".to_string()));
        }
        let org_name = request.organization_name.trim();
        if org_name.is_empty() || org_name.chars().count() > 120 {
            return Err(AppError::ValidationError(
                "Organization name must be between 1 and 120 characters".to_string(),
            ));
        }
        check_password_strength(
            &request.password,
            AccountIdentity {
                email: &email,
                organization_name: org_name,
            },
        )?;
        let full_name = request.full_name.trim();
        if full_name.is_empty() {
            return Err(AppError::ValidationError("Full name is required".to_string()));
        }

        let exists = users::Entity::find()
            .filter(users::Column::Email.eq(email.as_str()))
            .count(&self.pool)
            .await?;
        if exists > 0 {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }

        let password_hash = hash_password(&request.password)?;

        let txn = self.pool.begin().await?;
        let organization = organizations::ActiveModel {
            name: Set(org_name.to_string()),
            slug: Set(generate_slug(org_name)),
            email: Set(email.clone()),
            subscription_tier: Set(None),
            telegram_chat_id: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let user = users::ActiveModel {
            organization_id: Set(organization.id),
            email: Set(email),
            password_hash: Set(password_hash),
            full_name: Set(full_name.to_string()),
            role: Set(UserRole::Owner),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        log::info!(
            "Organization {} registered with owner {}",
            organization.id,
            user.id
        );
        self.issue_tokens(user, organization)
    }

    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        let email = request.email.trim().to_lowercase();
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email.as_str()))
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::AuthError("Invalid email or password".to_string()))?;

        if !verify_password(&request.password, &user.password_hash) {
            return Err(AppError::AuthError(
                "Invalid email or password".to_string(),
            ));
        }

        let organization = organizations::Entity::find_by_id(user.organization_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::AuthError("Organization no longer exists".to_string()))?;

        self.issue_tokens(user, organization)
    }

    /// 刷新令牌：重新读取用户，角色变化立即生效
    pub async fn refresh_token(&self, request: RefreshTokenRequest) -> AppResult<AuthResponse> {
        let claims = self.jwt_service.verify_refresh_token(&request.refresh_token)?;
        let user_id: i64 = claims
            .sub
            .parse()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))?;

        let user = users::Entity::find_by_id(user_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::AuthError("User no longer exists".to_string()))?;
        if user.organization_id != claims.org {
            return Err(AppError::AuthError("Token organization mismatch".to_string()));
        }
        let organization = organizations::Entity::find_by_id(user.organization_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::AuthError("Organization no longer exists".to_string()))?;

        self.issue_tokens(user, organization)
    }
}
