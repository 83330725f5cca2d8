//! HandlerRegistry - request_type から Handler を引く
//!
//! - `register::<T, _>(request_type, handler)` で型付き Handler を登録
//! - 内部的には TypedHandler でラップして `Arc<dyn DynHandler>` として保持
//! - 同じ request_type の二重登録はエラー（後勝ちで黙って上書きしない）

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::handler::{DynHandler, Handler, TypedHandler};
use crate::domain::{KesselError, Result};

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn DynHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T, H>(&mut self, request_type: impl Into<String>, handler: H) -> Result<()>
    where
        T: DeserializeOwned + Send + Sync + 'static,
        H: Handler<T> + 'static,
    {
        self.register_dyn(request_type, Arc::new(TypedHandler::<T, H>::new(handler)))
    }

    /// Registers an already type-erased handler.
    pub fn register_dyn(
        &mut self,
        request_type: impl Into<String>,
        handler: Arc<dyn DynHandler>,
    ) -> Result<()> {
        let request_type = request_type.into();
        if self.handlers.contains_key(&request_type) {
            return Err(KesselError::DuplicateHandler(request_type));
        }
        self.handlers.insert(request_type, handler);
        Ok(())
    }

    pub fn get(&self, request_type: &str) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(request_type).cloned()
    }

    pub fn contains(&self, request_type: &str) -> bool {
        self.handlers.contains_key(request_type)
    }

    /// Registered request types, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
