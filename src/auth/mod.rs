mod claims;
mod jwt;

pub use claims::{Claims, HUB_CREDENTIAL_TYPE};
pub use jwt::{HubTokenIssuer, JwtValidator};
