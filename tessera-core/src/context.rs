//! Ambient tenant context
//!
//! Every data-plane operation of the virtualization layer runs on behalf of
//! exactly one tenant. The tenant is not a request parameter; it is ambient
//! state carried by a [`ContextProvider`] so that the same client value can
//! serve concurrent operations for different tenants without interference.
//!
//! Two implementations are provided:
//!
//! - [`TaskLocalContext`]: the default. The tenant lives in a tokio
//!   task-local cell, so concurrent tasks each see their own tenant and
//!   nothing leaks across task boundaries. Callers enter a scope with
//!   [`TaskLocalContext::scope`] and then `set` / `get` freely within it.
//! - [`FixedContext`]: a plain lock-guarded slot, for tests and
//!   single-tenant embeddings where task scoping is unnecessary.

use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::future::Future;

/// An opaque, non-empty tenant identifier
///
/// The prefix codec additionally requires that a tenant id not contain the
/// configured delimiter; that is enforced at encode time, where the
/// delimiter is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::invalid_value("tenant id must not be empty"));
        }
        Ok(TenantId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Provider of the ambient tenant for the current operation
pub trait ContextProvider: Send + Sync + fmt::Debug {
    /// The current tenant; fails with [`Error::TenantUnset`] when none is set
    fn get(&self) -> Result<TenantId>;

    /// Set or clear the current tenant
    ///
    /// Fails with [`Error::TenantUnset`] when the provider has no ambient
    /// slot in the current execution context (e.g. a task-local provider
    /// outside any scope).
    fn set(&self, tenant: Option<TenantId>) -> Result<()>;
}

tokio::task_local! {
    static CURRENT_TENANT: RefCell<Option<TenantId>>;
}

/// Task-local tenant context
///
/// The cell only exists inside a [`TaskLocalContext::scope`]; `get` and `set`
/// outside a scope fail rather than silently observing another task's tenant.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskLocalContext;

impl TaskLocalContext {
    pub fn new() -> Self {
        Self
    }

    /// Run `fut` with an (initially unset) ambient tenant cell
    pub async fn scope<F: Future>(fut: F) -> F::Output {
        CURRENT_TENANT.scope(RefCell::new(None), fut).await
    }

    /// Run `fut` with the ambient tenant preset
    pub async fn scope_as<F: Future>(tenant: TenantId, fut: F) -> F::Output {
        CURRENT_TENANT.scope(RefCell::new(Some(tenant)), fut).await
    }
}

impl ContextProvider for TaskLocalContext {
    fn get(&self) -> Result<TenantId> {
        CURRENT_TENANT
            .try_with(|cell| cell.borrow().clone())
            .map_err(|_| Error::TenantUnset)?
            .ok_or(Error::TenantUnset)
    }

    fn set(&self, tenant: Option<TenantId>) -> Result<()> {
        CURRENT_TENANT
            .try_with(|cell| *cell.borrow_mut() = tenant)
            .map_err(|_| Error::TenantUnset)
    }
}

/// Process-wide tenant slot behind a lock
///
/// Suitable for tests and single-tenant embeddings; concurrent multi-tenant
/// use belongs on [`TaskLocalContext`].
#[derive(Debug, Default)]
pub struct FixedContext {
    tenant: RwLock<Option<TenantId>>,
}

impl FixedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(tenant: TenantId) -> Self {
        Self {
            tenant: RwLock::new(Some(tenant)),
        }
    }
}

impl ContextProvider for FixedContext {
    fn get(&self) -> Result<TenantId> {
        self.tenant.read().clone().ok_or(Error::TenantUnset)
    }

    fn set(&self, tenant: Option<TenantId>) -> Result<()> {
        *self.tenant.write() = tenant;
        Ok(())
    }
}
