pub mod error;
pub mod ident;
pub mod command;
pub mod tuple;
pub mod eval;
pub mod metadata;
pub mod storage;
pub mod processor;
pub mod context;
pub mod executor;
pub mod config;
pub mod session;
pub mod tempdata;

pub use context::CommandContext;
pub use error::{AppError, AppResult};
pub use session::SessionManager;
pub use tempdata::{ProcessorDataManager, TempTableDataManager};

// Test-only printing helper: expands to tprintln! during tests and is absent otherwise.
// Usage in tests: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In non-test builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
