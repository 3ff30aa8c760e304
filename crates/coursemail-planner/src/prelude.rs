pub use coursemail_core::prelude::*;

// vim: ts=4
