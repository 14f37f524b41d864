//! Session lifecycle: the request principal, expiry classification, and
//! renewal of access tokens.

pub mod inspector;
pub mod principal;
pub mod service;

pub use inspector::{SessionPolicy, TokenInspector, TokenState};
pub use principal::{ExpiryClaim, Principal, PrincipalBuilder};
pub use service::{
    IssuedToken, JwtSessionService, RefreshRecord, RefreshRequest, RefreshTokenStore,
    SessionError, SessionService,
};
