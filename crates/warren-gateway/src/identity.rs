//! The identity/session-store seam.
//!
//! Warren never validates credentials itself. The external identity
//! store hands every connection a verified `(user id, display name)`
//! pair; this trait is where that happens. Swap in a JWT validator in
//! production, a token parser in demos, a stub in tests — the gateway
//! doesn't care.

use warren_protocol::Identity;

use crate::GatewayError;

/// Validates an auth token and returns the verified identity behind it.
///
/// Called once per connection, for the mandatory first `auth` frame.
pub trait IdentityProvider: Send + Sync + 'static {
    /// # Errors
    /// [`GatewayError::Auth`] when the token is invalid or expired. The
    /// connection is refused; nothing was mutated.
    fn verify(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Identity, GatewayError>> + Send;
}
