pub mod context;
pub mod middleware;

pub use context::{AuthContext, Role};
pub use middleware::RequireAuth;
