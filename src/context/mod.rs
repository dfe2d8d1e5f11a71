//! Per-request context — the request, its matched path parameters, and a
//! type-keyed extension map that chain steps use to pass data forward.
//!
//! The render marker ([`RenderView`]) lives in a [`RenderSlot`] the context
//! shares with the normalizer: a `render(..)` step or the handler sets it, the
//! normalizer takes it out after the handler returns.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::{
    Request,
    view::{RenderSlot, RenderView},
};

/// Type-erased request extensions, one value per type.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, returning the previous value of the same type.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Takes the value of type `T` out of the map.
    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    pub fn contains<T>(&self) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.map.contains_key(&TypeId::of::<T>())
    }
}

/// Path parameters captured by the matched route pattern (`/users/:id`).
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Everything a chain step sees about one request.
///
/// Owned and moved down the chain: each step receives it by value and hands
/// it to [`Next::run`](crate::middleware::Next::run).
pub struct Context {
    request: Request,
    params: PathParams,
    extensions: Extensions,
    view: RenderSlot,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self {
            request,
            params,
            extensions: Extensions::new(),
            view: RenderSlot::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Shortcut for `ctx.request().header(name)`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Shortcut for `ctx.params().get(name)`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Renders the reply with `view` instead of sending it as JSON. Replaces
    /// any view chosen earlier in the chain.
    pub fn render(&self, view: impl Into<String>) {
        self.view.set(RenderView(view.into()));
    }

    /// The view chosen for this request so far.
    pub fn view(&self) -> Option<RenderView> {
        self.view.get()
    }

    pub fn render_slot(&self) -> &RenderSlot {
        &self.view
    }

    /// Deserializes the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}
