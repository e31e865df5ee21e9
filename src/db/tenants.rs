//! Customers and their environments.

use super::{Database, new_id, now_ms};
use crate::error::{Entity, ModelError};
use crate::types::{Customer, Environment};
use crate::validate::require_name;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

pub(crate) fn get_customer_internal(conn: &Connection, customer_id: &str) -> Result<Option<Customer>> {
    let customer = conn
        .query_row(
            "SELECT id, name, description, created_at FROM customers WHERE id = ?1",
            params![customer_id],
            |row| {
                Ok(Customer {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(customer)
}

pub(crate) fn get_environment_internal(
    conn: &Connection,
    environment_id: &str,
) -> Result<Option<Environment>> {
    let environment = conn
        .query_row(
            "SELECT id, customer_id, name, description, created_at FROM environments WHERE id = ?1",
            params![environment_id],
            |row| {
                Ok(Environment {
                    id: row.get(0)?,
                    customer_id: row.get(1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(environment)
}

pub(crate) fn insert_customer(conn: &Connection, customer: &Customer) -> Result<()> {
    conn.execute(
        "INSERT INTO customers (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![&customer.id, &customer.name, &customer.description, customer.created_at],
    )?;
    Ok(())
}

pub(crate) fn insert_environment(conn: &Connection, environment: &Environment) -> Result<()> {
    conn.execute(
        "INSERT INTO environments (id, customer_id, name, description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            &environment.id,
            &environment.customer_id,
            &environment.name,
            &environment.description,
            environment.created_at,
        ],
    )?;
    Ok(())
}

fn count_compilations(conn: &Connection, column: &str, id: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM compilations WHERE {} = ?1", column),
        params![id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

impl Database {
    pub fn create_customer(&self, name: &str, description: &str) -> Result<Customer> {
        let customer = Customer {
            id: new_id(),
            name: require_name("name", name)?,
            description: description.to_string(),
            created_at: now_ms(),
        };
        self.with_conn(|conn| {
            insert_customer(conn, &customer)?;
            info!(customer = %customer.id, name = %customer.name, "Created customer");
            Ok(customer)
        })
    }

    pub fn get_customer(&self, customer_id: &str) -> Result<Option<Customer>> {
        self.with_conn(|conn| get_customer_internal(conn, customer_id))
    }

    pub fn list_customers(&self) -> Result<Vec<Customer>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, created_at FROM customers ORDER BY name, id",
            )?;
            let customers = stmt
                .query_map([], |row| {
                    Ok(Customer {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(customers)
        })
    }

    /// Delete a customer and its environments. Refused while compilations
    /// reference the customer.
    pub fn delete_customer(&self, customer_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            get_customer_internal(&tx, customer_id)?
                .ok_or_else(|| ModelError::not_found(Entity::Customer, customer_id))?;

            let bound = count_compilations(&tx, "customer_id", customer_id)?;
            if bound > 0 {
                return Err(ModelError::InUse {
                    entity: Entity::Customer,
                    id: customer_id.to_string(),
                    count: bound,
                    holder: "compilations",
                }
                .into());
            }

            tx.execute(
                "DELETE FROM environments WHERE customer_id = ?1",
                params![customer_id],
            )?;
            tx.execute("DELETE FROM customers WHERE id = ?1", params![customer_id])?;
            tx.commit()?;

            info!(customer = %customer_id, "Deleted customer");
            Ok(())
        })
    }

    pub fn create_environment(
        &self,
        customer_id: &str,
        name: &str,
        description: &str,
    ) -> Result<Environment> {
        let environment = Environment {
            id: new_id(),
            customer_id: customer_id.to_string(),
            name: require_name("name", name)?,
            description: description.to_string(),
            created_at: now_ms(),
        };
        self.with_conn(|conn| {
            get_customer_internal(conn, customer_id)?
                .ok_or_else(|| ModelError::not_found(Entity::Customer, customer_id))?;
            insert_environment(conn, &environment)?;
            info!(
                customer = %customer_id,
                environment = %environment.id,
                name = %environment.name,
                "Created environment"
            );
            Ok(environment)
        })
    }

    pub fn get_environment(&self, environment_id: &str) -> Result<Option<Environment>> {
        self.with_conn(|conn| get_environment_internal(conn, environment_id))
    }

    /// Environments of one customer, or of every customer when `None`.
    pub fn list_environments(&self, customer_id: Option<&str>) -> Result<Vec<Environment>> {
        self.with_conn(|conn| {
            if let Some(customer_id) = customer_id {
                get_customer_internal(conn, customer_id)?
                    .ok_or_else(|| ModelError::not_found(Entity::Customer, customer_id))?;
            }
            let mut stmt = conn.prepare(
                "SELECT id, customer_id, name, description, created_at FROM environments
                 WHERE ?1 IS NULL OR customer_id = ?1
                 ORDER BY customer_id, name, id",
            )?;
            let environments = stmt
                .query_map(params![customer_id], |row| {
                    Ok(Environment {
                        id: row.get(0)?,
                        customer_id: row.get(1)?,
                        name: row.get(2)?,
                        description: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(environments)
        })
    }

    /// Delete an environment. Refused while compilations target it.
    pub fn delete_environment(&self, environment_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            get_environment_internal(conn, environment_id)?
                .ok_or_else(|| ModelError::not_found(Entity::Environment, environment_id))?;

            let bound = count_compilations(conn, "environment_id", environment_id)?;
            if bound > 0 {
                return Err(ModelError::InUse {
                    entity: Entity::Environment,
                    id: environment_id.to_string(),
                    count: bound,
                    holder: "compilations",
                }
                .into());
            }

            conn.execute(
                "DELETE FROM environments WHERE id = ?1",
                params![environment_id],
            )?;
            info!(environment = %environment_id, "Deleted environment");
            Ok(())
        })
    }
}
