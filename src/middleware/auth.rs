use async_trait::async_trait;
use axum::http::HeaderMap;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

/// 已认证的调用方，放入请求扩展供后续处理函数读取
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// 身份提供方，按请求给出已认证用户或空
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Option<Identity>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 用户ID
    pub exp: i64,    // 过期时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// 校验认证平台签发的 Bearer 访问令牌
pub struct JwtIdentityProvider {
    decoding_key: Option<DecodingKey>,
    validation: Validation,
}

impl JwtIdentityProvider {
    /// `secret` 为空时所有令牌都视为无效
    pub fn new(secret: &str, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let decoding_key = if secret.is_empty() {
            tracing::warn!("AUTH_JWT_SECRET is empty, protected routes will reject every request");
            None
        } else {
            Some(DecodingKey::from_secret(secret.as_bytes()))
        };

        Self {
            decoding_key,
            validation,
        }
    }

    pub fn verify_token(&self, token: &str) -> Option<Claims> {
        let key = self.decoding_key.as_ref()?;
        match decode::<Claims>(token, key, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!(error = %e, "Rejected bearer token");
                None
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let bearer = headers.typed_get::<Authorization<Bearer>>()?;
        let claims = self.verify_token(bearer.token())?;

        Some(Identity {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, header};
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;

    fn token(secret: &str, sub: &str, exp_offset: i64, aud: Option<&str>) -> String {
        let mut claims = serde_json::json!({
            "sub": sub,
            "exp": chrono::Utc::now().timestamp() + exp_offset,
            "email": "abc@example.com",
            "role": "authenticated",
        });
        if let Some(aud) = aud {
            claims["aud"] = aud.into();
        }
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn valid_token_resolves_identity() {
        let provider = JwtIdentityProvider::new("secret", None);
        let identity = provider
            .resolve(&bearer(&token("secret", "abc", 3600, Some("authenticated"))))
            .await
            .unwrap();
        assert_eq!(identity.user_id, "abc");
        assert_eq!(identity.email.as_deref(), Some("abc@example.com"));
    }

    #[tokio::test]
    async fn rejects_bad_tokens() {
        let provider = JwtIdentityProvider::new("secret", Some("authenticated"));

        assert!(provider.resolve(&HeaderMap::new()).await.is_none());
        assert!(
            provider
                .resolve(&bearer(&token("other", "abc", 3600, Some("authenticated"))))
                .await
                .is_none()
        );
        assert!(
            provider
                .resolve(&bearer(&token("secret", "abc", -3600, Some("authenticated"))))
                .await
                .is_none()
        );
        assert!(
            provider
                .resolve(&bearer(&token("secret", "abc", 3600, Some("anon"))))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn empty_secret_rejects_everything() {
        let provider = JwtIdentityProvider::new("", None);
        assert!(
            provider
                .resolve(&bearer(&token("", "abc", 3600, None)))
                .await
                .is_none()
        );
    }
}
