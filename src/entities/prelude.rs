pub use super::accounts::Entity as Accounts;
