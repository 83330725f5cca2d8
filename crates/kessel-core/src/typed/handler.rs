//! Handler trait - リクエストを処理する Handler の定義
//!
//! # 二層構造
//! - `Handler<T>`: payload を型 T として受け取る（利用者が実装する）
//! - `DynHandler`: `serde_json::Value` を受け取る object-safe 版（registry が保持する）
//!
//! `TypedHandler<T, H>` が両者をつなぐ type erasure の役割を持つ。

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::RequestResult;

/// Handler は payload を処理して RequestResult を返す
///
/// 失敗は戻り値で表す。一時的な失敗なら `RequestResult::transient`、
/// 再試行しても意味がないなら `RequestResult::fatal`。
///
/// # 使用例
/// ```ignore
/// struct Shout;
///
/// #[async_trait]
/// impl Handler<String> for Shout {
///     async fn handle(&self, payload: String) -> RequestResult {
///         println!("{}", payload.to_uppercase());
///         RequestResult::success()
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<T>: Send + Sync
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn handle(&self, payload: T) -> RequestResult;
}

/// Object-safe な Handler
///
/// `HashMap<String, Arc<dyn DynHandler>>` に格納するための形。
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, payload: Value) -> RequestResult;
}

pub struct TypedHandler<T, H> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T, H> TypedHandler<T, H>
where
    T: DeserializeOwned + Send + Sync + 'static,
    H: Handler<T>,
{
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, H> DynHandler for TypedHandler<T, H>
where
    T: DeserializeOwned + Send + Sync + 'static,
    H: Handler<T>,
{
    /// payload が T に decode できなければ、再試行しても同じなので fatal。
    async fn handle_dyn(&self, payload: Value) -> RequestResult {
        match serde_json::from_value::<T>(payload) {
            Ok(payload) => self.handler.handle(payload).await,
            Err(e) => RequestResult::fatal(format!("payload decode: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Order {
        quantity: u32,
    }

    struct OrderHandler;

    #[async_trait]
    impl Handler<Order> for OrderHandler {
        async fn handle(&self, order: Order) -> RequestResult {
            if order.quantity == 0 {
                RequestResult::fatal("empty order")
            } else {
                RequestResult::success()
            }
        }
    }

    #[tokio::test]
    async fn test_typed_handler() {
        let handler = TypedHandler::<Order, _>::new(OrderHandler);

        let result = handler.handle_dyn(json!({ "quantity": 3 })).await;
        assert!(result.is_success());

        let result = handler.handle_dyn(json!({ "quantity": 0 })).await;
        assert_eq!(result.error(), Some("empty order"));
    }

    #[tokio::test]
    async fn test_decode_error_is_fatal() {
        let handler = TypedHandler::<Order, _>::new(OrderHandler);

        let result = handler.handle_dyn(json!("not an order")).await;
        assert!(result.is_fatal());
        assert!(result.error().unwrap().starts_with("payload decode"));
    }
}
