mod dedup;
mod gateway;
mod service;
pub mod sku;

pub use dedup::{Delivery, ProcessedSet, DEFAULT_CAPACITY};
pub use gateway::{
    Purchase, PurchaseFailure, PurchaseGateway, PurchaseRequest, StoreOffer, StoreProduct,
};
pub use service::PaymentService;
