pub mod accounting;
pub mod catalog;
pub mod subscription;

pub use accounting::*;
pub use catalog::*;
pub use subscription::*;
