//! mailrotor Core - Delivery-server selection and quota management
//!
//! This crate implements the outbound-delivery core: quota counting over
//! the usage log, weighted server picking with customer/group/system
//! scoping, provider transport adapters, canonical parameter assembly and
//! the delivery orchestration that ties them together.

pub mod cache;
pub mod delivery;
pub mod hooks;
pub mod params;
pub mod picker;
pub mod quota;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{Cache, LockRegistry, MemoryCache};
pub use delivery::{DeliveryService, SendReport, TransactionalWorker};
pub use hooks::HookBus;
pub use params::{
    parse_headers_format, parse_headers_into_key_value, Attachment, Header, ParamsAssembler,
    SendOverrides, SendParams,
};
pub use picker::{PickerConfig, ServerPicker};
pub use quota::{QuotaCounter, UNLIMITED};
pub use transport::{AdapterRegistry, ProviderAdapter, SendReceipt};
