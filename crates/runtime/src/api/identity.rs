//! Resolution of platform accounts to internal user identities.

use async_trait::async_trait;
use progression_core::UserId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("platform name is empty")]
    EmptyPlatform,

    #[error("user id for platform {platform} is empty")]
    EmptyUserId { platform: String },

    #[error("identity lookup failed: {0}")]
    Lookup(String),
}

/// Maps a (platform, platform user id) pair to an internal [`UserId`].
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, platform: &str, platform_user_id: &str)
    -> Result<UserId, IdentityError>;
}

/// Resolver that namespaces the platform id: `"<platform>:<id>"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformIdentity;

#[async_trait]
impl IdentityResolver for PlatformIdentity {
    async fn resolve(
        &self,
        platform: &str,
        platform_user_id: &str,
    ) -> Result<UserId, IdentityError> {
        let platform = platform.trim();
        let platform_user_id = platform_user_id.trim();

        if platform.is_empty() {
            return Err(IdentityError::EmptyPlatform);
        }
        if platform_user_id.is_empty() {
            return Err(IdentityError::EmptyUserId {
                platform: platform.to_owned(),
            });
        }

        Ok(UserId::new(format!("{platform}:{platform_user_id}")))
    }
}
