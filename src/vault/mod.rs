//! The encrypted vault: store lifecycle, schema migrations, lockout
//! state, and filesystem discipline.

pub mod fsutil;
pub mod integrity;
pub mod lockout;
pub mod schema;
pub mod store;

pub use integrity::{IntegrityCheck, IntegrityReport};
pub use lockout::LockoutState;
pub use store::{Folder, VaultMeta, VaultStore};
