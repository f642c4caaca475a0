pub mod gate;
pub mod response;
pub mod session;

pub use gate::{gate_middleware, FeatureGate, GateRejection, Outcome, RequestGate};
pub use response::{ApiResponse, ApiResult};
pub use session::{session_middleware, AuthUser, RequestContext};
