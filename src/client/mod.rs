//! Client side of the session protocol.
//!
//! `AuthClient` keeps the session tokens, attaches the access token to every
//! request, and transparently refreshes an expired session once per request.

mod error;
mod interceptor;
mod session;
mod transport;

pub use error::ClientError;
pub use interceptor::{AuthClient, LoginRequiredHook};
pub use session::SessionContext;
pub use transport::{ClientRequest, ClientResponse, ReqwestTransport, Transport};
