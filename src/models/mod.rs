pub mod account;

pub use account::{Account, AccountStatus, Principal, Role, normalize_identifier};
