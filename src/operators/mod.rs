/// Primary operator records: CRUD, auto-save, duplication
pub mod store;

pub use store::{NewOperator, OperatorStore};
