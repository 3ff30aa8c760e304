pub use crate::app::App;
pub use coursemail_types::prelude::*;

// vim: ts=4
