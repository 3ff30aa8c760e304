pub use coursemail_core::prelude::*;
pub use coursemail_types::types::ApiResponse;

// vim: ts=4
