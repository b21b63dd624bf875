pub mod documents;
pub mod finance;
pub mod masters;
pub mod stock;
pub mod tenancy;
