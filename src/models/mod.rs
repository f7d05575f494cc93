pub mod account;
pub mod change;
pub mod device;
pub mod release;
pub mod voucher;
