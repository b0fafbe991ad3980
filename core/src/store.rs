//! Optimistic-concurrency key/value capability ("brain") and typed helpers.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const HISTORY_PREFIX: &str = "bot:histories:";
pub const PARAM_PREFIX: &str = "bot:parameters:";

/// Raw result of a checkout.
#[derive(Debug, Clone, Default)]
pub struct Checkout {
    /// Present when checked out for update; must be handed back to `update`.
    pub token: Option<String>,
    pub value: Option<serde_json::Value>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn checkout(&self, key: &str, for_update: bool) -> anyhow::Result<Checkout>;

    /// Fails when `token` is stale, i.e. someone else updated the key in between.
    async fn update(&self, key: &str, token: &str, value: serde_json::Value) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct Datum<T> {
    pub token: Option<String>,
    pub exists: bool,
    pub value: T,
}

pub async fn checkout_datum<T>(
    store: &dyn Store,
    key: &str,
    for_update: bool,
) -> anyhow::Result<Datum<T>>
where
    T: DeserializeOwned + Default,
{
    let co = store.checkout(key, for_update).await?;
    let (exists, value) = match co.value {
        Some(v) => (true, serde_json::from_value::<T>(v)?),
        None => (false, T::default()),
    };
    Ok(Datum {
        token: co.token,
        exists,
        value,
    })
}

pub async fn update_datum<T: Serialize>(
    store: &dyn Store,
    key: &str,
    token: &str,
    value: &T,
) -> anyhow::Result<()> {
    store
        .update(key, token, serde_json::to_value(value)?)
        .await
}

/// Long-term parameters shared by every task in `namespace`.
pub async fn namespace_parameters(
    store: &dyn Store,
    namespace: &str,
) -> anyhow::Result<HashMap<String, String>> {
    let key = format!("{PARAM_PREFIX}{namespace}");
    Ok(checkout_datum::<HashMap<String, String>>(store, &key, false)
        .await?
        .value)
}

pub async fn store_parameter(
    store: &dyn Store,
    namespace: &str,
    name: &str,
    value: &str,
) -> anyhow::Result<()> {
    let key = format!("{PARAM_PREFIX}{namespace}");
    let mut datum = checkout_datum::<HashMap<String, String>>(store, &key, true).await?;
    datum.value.insert(name.to_string(), value.to_string());
    let token = datum.token.unwrap_or_default();
    update_datum(store, &key, &token, &datum.value).await
}
