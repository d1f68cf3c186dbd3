//! 组织者账号密码：注册时的强度检查与 bcrypt 哈希

use crate::error::{AppError, AppResult};
use bcrypt::{DEFAULT_COST, hash, verify};

pub const MIN_PASSWORD_CHARS: usize = 8;
/// bcrypt 只使用前 72 字节，更长的部分会被静默忽略
pub const MAX_PASSWORD_BYTES: usize = 72;
/// 少于该长度的邮箱用户名 / 组织名不参与包含检查
const MIN_IDENTITY_FRAGMENT: usize = 4;

/// 密码中不应出现的账号信息
#[derive(Debug, Clone, Copy)]
pub struct AccountIdentity<'a> {
    pub email: &'a str,
    pub organization_name: &'a str,
}

impl AccountIdentity<'_> {
    /// 邮箱用户名与组织名的小写片段（去掉空白）
    fn fragments(&self) -> Vec<String> {
        let local = self.email.split('@').next().unwrap_or_default();
        let org: String = self
            .organization_name
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        [local.to_lowercase(), org.to_lowercase()]
            .into_iter()
            .filter(|f| f.chars().count() >= MIN_IDENTITY_FRAGMENT)
            .collect()
    }
}

/// 字符类别：小写、大写、数字、符号，至少三类
fn character_classes(password: &str) -> usize {
    let lower = password.chars().any(char::is_lowercase);
    let upper = password.chars().any(char::is_uppercase);
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let symbol = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());
    [lower, upper, digit, symbol].into_iter().filter(|b| *b).count()
}

pub fn check_password_strength(password: &str, identity: AccountIdentity<'_>) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::ValidationError(format!(
            "Password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::ValidationError(format!(
            "Password must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    if password.trim() != password {
        return Err(AppError::ValidationError(
            "Password must not start or end with whitespace".to_string(),
        ));
    }
    if character_classes(password) < 3 {
        return Err(AppError::ValidationError(
            "Password must mix at least three of: lowercase, uppercase, digits, symbols"
                .to_string(),
        ));
    }
    let lowered = password.to_lowercase();
    if identity.fragments().iter().any(|f| lowered.contains(f.as_str())) {
        return Err(AppError::ValidationError(
            "Password must not contain your email name or organization name".to_string(),
        ));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> AppResult<String> {
    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::InternalError(format!("Password hashing failed: {e}")))
}

/// 存储的哈希损坏时视为不匹配，登录返回统一的认证错误
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match verify(password, password_hash) {
        Ok(ok) => ok,
        Err(e) => {
            log::warn!("Stored password hash could not be verified: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> AccountIdentity<'static> {
        AccountIdentity {
            email: "pepe.rifas@example.com",
            organization_name: "Sorteos Don Pepe",
        }
    }

    #[test]
    fn test_strength_rules() {
        assert!(check_password_strength("Password123", identity()).is_ok());
        assert!(check_password_strength("rifa-2026!x", identity()).is_ok());
        // 只有两类字符
        assert!(check_password_strength("password123", identity()).is_err());
        assert!(check_password_strength("Pass12!", identity()).is_err());
        assert!(check_password_strength(" Password123", identity()).is_err());
        // 多字节字符按字符计长，按字节计上限
        assert!(check_password_strength("Ñandú-2026", identity()).is_ok());
        assert!(check_password_strength(&format!("Aa1{}", "ñ".repeat(35)), identity()).is_err());
    }

    #[test]
    fn test_rejects_account_fragments() {
        assert!(check_password_strength("Pepe.Rifas2026", identity()).is_err());
        assert!(check_password_strength("xSORTEOSDONPEPE1", identity()).is_err());
        // 过短的片段不参与比较
        let short = AccountIdentity {
            email: "ab@example.com",
            organization_name: "Rif",
        };
        assert!(check_password_strength("Abcdef123", short).is_ok());
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hashed = hash_password("Password123").unwrap();
        assert!(verify_password("Password123", &hashed));
        assert!(!verify_password("WrongPassword1", &hashed));
        assert!(!verify_password("Password123", "not-a-bcrypt-hash"));
    }
}
