//! Typed JSON operations against the shared L2 cache service.
//!
//! The service speaks the Redis protocol. Values are stored as JSON
//! strings with a per-key TTL; key namespacing is the caller's concern
//! (the multi-level front passes keys through untouched).

use std::time::Duration;

use fred::prelude::*;
use fred::types::Expiration;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CacheError;

/// Connection handle to the Redis-compatible L2 service.
///
/// Wraps a [`fred::prelude::Client`]; cloning shares the connection.
#[derive(Clone)]
pub struct RemoteCache {
    client: Client,
}

impl RemoteCache {
    /// Connect to the L2 service at the given URL.
    ///
    /// The URL follows the Redis URL scheme: `redis://host:port/db`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if the URL cannot be parsed, or
    /// [`CacheError::Connectivity`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let config = Config::from_url(url)
            .map_err(|e| CacheError::Config(format!("Invalid cache URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client
            .init()
            .await
            .map_err(|e| CacheError::Connectivity(e.to_string()))?;

        tracing::info!("Connected to L2 cache");
        Ok(Self { client })
    }

    /// Serialize `value` as JSON and store it at `key` with `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] if serialization fails, or
    /// [`CacheError::Backend`] if the write fails.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)?;
        self.set_raw(key, &json, ttl).await
    }

    /// Store an already-serialized JSON string at `key` with `ttl`.
    ///
    /// Used by the write-back flusher, which carries the serialized form
    /// captured at `put` time.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the write fails.
    pub async fn set_raw(&self, key: &str, json: &str, ttl: Duration) -> Result<(), CacheError> {
        let expire = Expiration::EX(i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX));
        let _: () = self.client.set(key, json, Some(expire), None, false).await?;
        Ok(())
    }

    /// Read the value at `key` and deserialize from JSON.
    ///
    /// Returns `Ok(None)` when the key does not exist; a total cache
    /// miss is data, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] if deserialization fails,
    /// or [`CacheError::Backend`] if the read fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let value: Option<String> = self.client.get(key).await?;
        match value {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    /// Read the raw JSON string at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the read fails.
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let value: Option<String> = self.client.get(key).await?;
        Ok(value)
    }

    /// Delete a key from L2.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let _: u32 = self.client.del(key).await?;
        Ok(())
    }

    /// Flush every key from the L2 instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), CacheError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }

    /// Return a reference to the underlying [`Client`].
    pub const fn client(&self) -> &Client {
        &self.client
    }
}
