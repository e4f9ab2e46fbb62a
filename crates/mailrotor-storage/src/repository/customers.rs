//! Customer repository

use crate::db::DatabasePool;
use crate::models::Customer;
use async_trait::async_trait;
use mailrotor_common::types::CustomerId;
use mailrotor_common::{Error, Result};

/// Customer repository trait
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn get(&self, id: CustomerId) -> Result<Option<Customer>>;
}

/// Database customer repository
#[derive(Clone)]
pub struct DbCustomerRepository {
    pool: DatabasePool,
}

impl DbCustomerRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerRepository for DbCustomerRepository {
    async fn get(&self, id: CustomerId) -> Result<Option<Customer>> {
        sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
