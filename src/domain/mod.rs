mod account;
mod entry;
mod journal;
mod ledger;
mod money;

pub use account::*;
pub use entry::*;
pub use journal::*;
pub use ledger::*;
pub use money::*;
