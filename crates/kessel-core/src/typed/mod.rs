//! Typed - 型付き Handler API
//!
//! # 二層構造
//! - **表層（Typed）**: `Handler<T>` trait - payload を型で受け取る
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure
//!
//! worker は request_type で `HandlerRegistry` から `DynHandler` を引き、
//! message の `body.payload` をそのまま渡す。

pub mod handler;
pub mod registry;

pub use self::handler::{DynHandler, Handler, TypedHandler};
pub use self::registry::HandlerRegistry;
