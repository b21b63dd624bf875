pub mod cancel_service;
pub mod fifo;
pub mod gl_service;
pub mod naming;
pub mod report_service;
pub mod status;
pub mod stock_service;
pub mod vouchers;
