pub mod authenticate;
pub mod guard;
pub mod pipeline;
pub mod privilege;
pub mod refresh;
pub mod state;
mod test_macros;

pub use authenticate::{authenticate, authenticate_request, verification_outcome};
pub use guard::{check_authenticated, require_authentication, RequireAuthentication};
pub use pipeline::{AuthPipeline, AuthState, CurrentUser};
pub use privilege::{
    require_privilege, PrivilegeCheck, PrivilegeConfig, PrivilegeGuard, PrivilegeRequirements,
    PrivilegeSet, Requirement, DEFAULT_PRIVILEGE_KEY,
};
pub use refresh::{refresh, refresh_request, should_refresh, RefreshOptions};
pub use state::RequestAuthState;
