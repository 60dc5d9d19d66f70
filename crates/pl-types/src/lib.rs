pub mod errors;
pub mod session;
pub mod setup;
pub mod telemetry;

pub use errors::*;
pub use session::*;
pub use setup::*;
pub use telemetry::*;
