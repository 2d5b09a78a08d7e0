pub mod payment;
pub mod plan;
pub mod subscriber;

pub use payment::*;
pub use plan::*;
pub use subscriber::*;
