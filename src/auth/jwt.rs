//! JWT 令牌管理
//!
//! 管理端登录态的签发与校验

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{ProxyError, Result};

const ISSUER: &str = "token-router";
const AUDIENCE: &str = "token-router-users";

/// JWT 载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// 用户ID
    pub sub: String,
    /// 用户名
    pub username: String,
    /// 签发时间
    pub iat: i64,
    /// 过期时间
    pub exp: i64,
    /// 签发者
    pub iss: String,
    /// 受众
    pub aud: String,
    /// JWT ID
    pub jti: String,
}

impl JwtClaims {
    fn new(user_id: i32, username: String, expires_in_seconds: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            username,
            iat: now,
            exp: now + expires_in_seconds,
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// 获取用户ID
    pub fn user_id(&self) -> Result<i32> {
        self.sub
            .parse()
            .map_err(|e| ProxyError::auth_with_source("认证令牌中的用户ID无效", e))
    }
}

/// JWT 管理器
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expires_in: i64,
}

impl JwtManager {
    /// 按认证配置创建
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);
        validation.validate_exp = true;
        validation.leeway = 30;

        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            expires_in: config.jwt_expires_in,
        }
    }

    /// 签发访问令牌
    pub fn generate_access_token(&self, user_id: i32, username: impl Into<String>) -> Result<String> {
        let claims = JwtClaims::new(user_id, username.into(), self.expires_in);
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ProxyError::internal_with_source("生成认证令牌失败", e))
    }

    /// 校验并解析令牌
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        let data: TokenData<JwtClaims> =
            decode(token, &self.decoding_key, &self.validation).map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => ProxyError::auth("认证令牌已过期"),
                _ => ProxyError::auth_with_source("认证令牌无效", e),
            })?;
        Ok(data.claims)
    }
}

impl std::fmt::Debug for JwtManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtManager")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(secret: &str, expires_in: i64) -> JwtManager {
        JwtManager::new(&AuthConfig {
            jwt_secret: secret.to_string(),
            jwt_expires_in: expires_in,
        })
    }

    #[test]
    fn test_token_generation_and_validation() {
        let manager = manager("test-secret-key-for-jwt-testing", 3600);
        let token = manager.generate_access_token(7, "alice").unwrap();

        let claims = manager.validate_token(&token).unwrap();
        assert_eq!(claims.user_id().unwrap(), 7);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.iss, ISSUER);
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let token = manager("secret-a", 3600).generate_access_token(1, "bob").unwrap();
        let err = manager("secret-b", 3600).validate_token(&token).unwrap_err();
        assert!(matches!(err, ProxyError::Auth { .. }));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let manager = manager("secret", -120);
        let token = manager.generate_access_token(1, "bob").unwrap();
        let err = manager.validate_token(&token).unwrap_err();
        assert!(err.to_string().contains("认证令牌已过期"));
    }

    #[test]
    fn test_invalid_token() {
        let manager = manager("secret", 3600);
        assert!(manager.validate_token("invalid-token").is_err());
        assert!(manager.validate_token("").is_err());
    }
}
