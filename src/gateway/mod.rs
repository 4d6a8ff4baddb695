//! Authentication gateway implementation

pub mod auth;
pub mod negotiate;
pub mod policy;
pub mod resolve;
mod router;
mod server;
pub mod session;
pub mod signer;

pub use auth::{AuthGateway, gateway_middleware};
pub use router::create_router;
pub use server::Gateway;
pub use session::SecurityContext;
