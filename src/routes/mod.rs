/// Router Module Index
///
/// Splits the API by access level. Page-level access (public / protected / broker-only
/// namespaces) is decided separately by the session gate in `lib.rs`; every API path
/// sits under the public `/api` prefix, so these modules carry their own checks.

/// Routes open to anonymous callers: health and the session issuer endpoints.
pub mod public;

/// Routes wrapped in the `AuthUser` middleware. Requires a valid, current session.
pub mod authenticated;
