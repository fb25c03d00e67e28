use compact_str::CompactString;

#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct JwtConfig {
    /// HS256 shared secret.
    pub secret: String,
    pub issuer: Option<CompactString>,
    pub audience: Option<CompactString>,
    /// Lifetime of tokens minted by [`crate::utils::jwt::JwtCodec::issue`].
    pub token_ttl: time::Duration,
    /// Clock skew tolerated when checking `exp`, in seconds.
    pub leeway_seconds: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: None,
            audience: None,
            token_ttl: time::Duration::days(1),
            leeway_seconds: 30,
        }
    }
}

impl core::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("token_ttl", &self.token_ttl)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}
