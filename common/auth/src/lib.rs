pub mod claims;
pub mod config;
pub mod cookies;
pub mod deferred;
pub mod error;
pub mod provider;
pub mod tokens;
pub mod transport;

pub use claims::{Claims, TokenPair};
pub use config::{parse_bool, parse_lifespan, CookieSameSite, CookieSettings, JwtConfig, TokenKeys};
pub use cookies::{
    base_domain, set_tokens_to_response, CookieDomainResolver, CookieOptions, CookieWriter,
    OriginDomainResolver,
};
pub use deferred::Deferred;
pub use error::{AuthError, AuthResult};
pub use provider::{LookupError, LookupResult, UserLookup, UserProvider};
pub use tokens::TokenService;
pub use transport::{cookie_value, header_token, RequestTokens, REFRESH_TOKEN_HEADER};
