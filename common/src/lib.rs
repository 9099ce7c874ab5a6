#[cfg(feature = "context")]
pub mod context;
#[cfg(feature = "logging")]
pub mod logging;
#[cfg(feature = "macros")]
#[macro_use]
pub mod macros;
#[cfg(feature = "prelude")]
pub mod prelude;
#[cfg(feature = "s3")]
pub mod s3;
#[cfg(feature = "signal")]
pub mod signal;
