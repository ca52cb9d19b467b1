// Application layer: the accounting façade and the reporting engines.

pub mod error;
pub mod profit_loss;
pub mod service;
pub mod trial_balance;

pub use error::*;
pub use profit_loss::*;
pub use service::*;
pub use trial_balance::*;
