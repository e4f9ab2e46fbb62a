//! Repository layer for data access

pub mod customers;
pub mod delivery_servers;
pub mod domains;
pub mod transactional;
pub mod usage_logs;

// Re-export concrete repository implementations with simple names
pub use customers::DbCustomerRepository as CustomerRepository;
pub use delivery_servers::DbDeliveryServerRepository as DeliveryServerRepository;
pub use domains::DbSendingDomainRepository as SendingDomainRepository;
pub use domains::DbTrackingDomainRepository as TrackingDomainRepository;
pub use transactional::DbTransactionalEmailRepository as TransactionalEmailRepository;
pub use usage_logs::DbUsageLogRepository as UsageLogRepository;

// Re-export repository traits
pub use customers::CustomerRepository as CustomerRepositoryTrait;
pub use delivery_servers::DeliveryServerRepository as DeliveryServerRepositoryTrait;
pub use domains::SendingDomainRepository as SendingDomainRepositoryTrait;
pub use domains::TrackingDomainRepository as TrackingDomainRepositoryTrait;
pub use transactional::TransactionalEmailRepository as TransactionalEmailRepositoryTrait;
pub use usage_logs::UsageLogRepository as UsageLogRepositoryTrait;
