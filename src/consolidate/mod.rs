pub mod internal;
pub mod supplier;

pub use internal::{consolidate_internal, InternalFileInput, SafetyReserve};
pub use supplier::{consolidate_supplier, SupplierFileInput};
