//! Request context carried by every public operation.

use shared_types::IdentityId;
use tokio_util::sync::CancellationToken;

use super::errors::BoxError;

/// Acting identity and cancellation signal of one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub identity_id: IdentityId,
    pub cancel: CancellationToken,
}

impl RequestContext {
    #[must_use]
    pub fn new(identity_id: IdentityId) -> Self {
        Self {
            identity_id,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_token(identity_id: IdentityId, cancel: CancellationToken) -> Self {
        Self {
            identity_id,
            cancel,
        }
    }

    /// `Cancelled` once the token fired.
    pub fn check(&self) -> Result<(), BoxError> {
        if self.cancel.is_cancelled() {
            return Err(BoxError::Cancelled);
        }
        Ok(())
    }
}
