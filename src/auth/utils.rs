//! 认证头解析工具

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

/// 令牌密钥的可选前缀
pub const TOKEN_KEY_PREFIX: &str = "sk-";

/// 认证工具集合
pub struct AuthUtils;

impl AuthUtils {
    /// 从 `Authorization` 头中提取 Bearer 令牌
    #[must_use]
    pub fn extract_bearer_token(auth_header: &str) -> Option<String> {
        auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(ToString::to_string)
    }

    /// 从请求头中提取令牌密钥，`sk-` 前缀可选
    #[must_use]
    pub fn extract_token_key(headers: &HeaderMap) -> Option<String> {
        let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let raw = Self::extract_bearer_token(header).unwrap_or_else(|| header.trim().to_string());
        let key = raw.strip_prefix(TOKEN_KEY_PREFIX).unwrap_or(&raw);
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }

    /// 日志用的脱敏密钥
    #[must_use]
    pub fn mask_key(key: &str) -> String {
        let chars: Vec<char> = key.chars().collect();
        if chars.len() <= 8 {
            return "***".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{TOKEN_KEY_PREFIX}{head}***{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(AuthUtils::extract_bearer_token("Bearer abc"), Some("abc".to_string()));
        assert_eq!(AuthUtils::extract_bearer_token("Bearer "), None);
        assert_eq!(AuthUtils::extract_bearer_token("Basic abc"), None);
    }

    #[test]
    fn test_extract_token_key_prefix_optional() {
        assert_eq!(AuthUtils::extract_token_key(&headers_with("Bearer sk-abc123")), Some("abc123".to_string()));
        assert_eq!(AuthUtils::extract_token_key(&headers_with("Bearer abc123")), Some("abc123".to_string()));
        assert_eq!(AuthUtils::extract_token_key(&headers_with("sk-abc123")), Some("abc123".to_string()));
        assert_eq!(AuthUtils::extract_token_key(&headers_with("Bearer sk-")), None);
        assert_eq!(AuthUtils::extract_token_key(&HeaderMap::new()), None);
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(AuthUtils::mask_key("abcdefghijkl"), "sk-abcd***ijkl");
        assert_eq!(AuthUtils::mask_key("short"), "***");
    }
}
