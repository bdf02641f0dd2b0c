/// Crate version as compiled into the binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
