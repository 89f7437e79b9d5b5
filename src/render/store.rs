use std::collections::HashMap;

use crate::log::Error;

use serde::Serialize;
use serde_json::{to_value, Map, Value};

/// Provides storage for data that a [`Template`][`crate::Template`] can be
/// rendered with.
#[derive(Debug, Clone, Default)]
pub struct Store {
    data: HashMap<String, Value>,
}

impl Store {
    /// Create a new [`Store`].
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Store;
    ///
    /// let store = Store::new();
    /// ```
    #[inline]
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// Inserts a key-value pair into the [`Store`].
    ///
    /// # Errors
    ///
    /// Returns an error if the serialization fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Store;
    ///
    /// let mut store = Store::new();
    /// let result = store.insert("name", "taylor");
    ///
    /// assert!(result.is_ok());
    /// ```
    pub fn insert<S, T>(&mut self, key: S, value: T) -> Result<(), Error>
    where
        S: Into<String>,
        T: Serialize,
    {
        let key = key.into();
        let value = to_value(&value).map_err(|error| {
            Error::build(format!("value for `{key}` is unserializable"))
                .with_help(error.to_string())
        })?;
        self.data.insert(key, value);

        Ok(())
    }

    /// Inserts a key-value pair into the [`Store`].
    ///
    /// # Panics
    ///
    /// Panics if the serialization fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Store;
    ///
    /// let mut store = Store::new();
    /// store.insert_must("name", "taylor");
    /// ```
    #[inline]
    pub fn insert_must<S, T>(&mut self, key: S, value: T)
    where
        S: Into<String>,
        T: Serialize,
    {
        self.data.insert(key.into(), to_value(value).unwrap());
    }

    /// Inserts a key-value pair into the [`Store`].
    ///
    /// Returns the `Store`, so additional methods may be chained.
    ///
    /// # Errors
    ///
    /// Returns an error if the serialization fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Store;
    ///
    /// let store = Store::new().with("name", "taylor");
    ///
    /// assert!(store.is_ok());
    /// ```
    #[inline]
    pub fn with<S, T>(mut self, key: S, value: T) -> Result<Self, Error>
    where
        S: Into<String>,
        T: Serialize,
    {
        self.insert(key, value)?;

        Ok(self)
    }

    /// Inserts a key-value pair into the [`Store`].
    ///
    /// Returns the `Store`, so additional methods may be chained.
    ///
    /// # Panics
    ///
    /// Panics if the serialization fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Store;
    ///
    /// let store = Store::new().with_must("name", "taylor");
    /// ```
    #[inline]
    pub fn with_must<S, T>(mut self, key: S, value: T) -> Self
    where
        S: Into<String>,
        T: Serialize,
    {
        self.insert_must(key, value);

        self
    }

    /// Returns a reference to the [`Value`] corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Store;
    ///
    /// let store = Store::new().with_must("name", "taylor");
    /// let result = store.get("name");
    ///
    /// assert_eq!(result.unwrap(), "taylor")
    /// ```
    #[inline]
    pub fn get(&self, index: &str) -> Option<&Value> {
        self.data.get(index)
    }

    /// Return an iterator over the key-value pairs of the [`Store`].
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }
}

impl From<HashMap<String, Value>> for Store {
    fn from(data: HashMap<String, Value>) -> Self {
        Self { data }
    }
}

impl From<Map<String, Value>> for Store {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            data: map.into_iter().collect(),
        }
    }
}

/// Wrapper for [`Store`] that provides mutable storage for values assigned
/// during a render.
///
/// The first layer holds top-level assignments. Loops, blocks and macros push
/// additional layers.
#[derive(Debug)]
pub struct Shadow<'store> {
    pub store: &'store Store,
    layers: Layers,
}

/// The layers of a [`Shadow`], along with the index of the layer that `set`
/// assigns to.
#[derive(Debug, Clone, Default)]
pub struct Layers {
    data: Vec<HashMap<String, Value>>,
    base: usize,
}

impl<'store> Shadow<'store> {
    /// Create a new [`Shadow`] over the given [`Store`].
    #[inline]
    pub fn new(store: &'store Store) -> Self {
        Self {
            store,
            layers: Layers {
                data: vec![HashMap::new()],
                base: 0,
            },
        }
    }

    /// Push a new layer onto the [`Shadow`].
    #[inline]
    pub fn push(&mut self) {
        self.layers.data.push(HashMap::new());
    }

    /// Remove the top layer from the [`Shadow`].
    ///
    /// The base layer and the layers below it are never removed.
    #[inline]
    pub fn pop(&mut self) {
        if self.layers.data.len() > self.layers.base + 1 {
            self.layers.data.pop();
        }
    }

    /// Insert the value into the top layer of the [`Shadow`].
    ///
    /// Used for loop targets, `loop` and arguments, which disappear with the
    /// layer.
    #[inline]
    pub fn insert<S>(&mut self, key: S, value: Value)
    where
        S: Into<String>,
    {
        if let Some(layer) = self.layers.data.last_mut() {
            layer.insert(key.into(), value);
        }
    }

    /// Insert the value into the base layer of the [`Shadow`].
    ///
    /// Outside of a macro the base layer is the first layer, so the value stays
    /// visible for the rest of the render. Inside a macro it is the layer
    /// holding the arguments.
    #[inline]
    pub fn assign<S>(&mut self, key: S, value: Value)
    where
        S: Into<String>,
    {
        let key = key.into();
        for layer in self.layers.data.iter_mut().skip(self.layers.base + 1) {
            layer.remove(&key);
        }
        if let Some(layer) = self.layers.data.get_mut(self.layers.base) {
            layer.insert(key, value);
        }
    }

    /// Get the [`Value`] of the given key.
    ///
    /// If the key is not found within the [`Shadow`], the store will be
    /// searched.
    #[inline]
    pub fn get(&self, index: &str) -> Option<&Value> {
        for layer in self.layers.data.iter().rev() {
            if let Some(value) = layer.get(index) {
                return Some(value);
            }
        }
        self.store.get(index)
    }

    /// Replace the layers with the top-level layer followed by the given layer,
    /// which becomes the base layer, and return the previous layers.
    ///
    /// Used to render macros, which only see top-level assignments and their
    /// own arguments.
    pub fn isolate(&mut self, layer: HashMap<String, Value>) -> Layers {
        let top = self.layers.data.first().cloned().unwrap_or_default();

        std::mem::replace(
            &mut self.layers,
            Layers {
                data: vec![top, layer],
                base: 1,
            },
        )
    }

    /// Replace the layers with the given layers, and return the previous layers.
    pub fn restore(&mut self, layers: Layers) -> Layers {
        std::mem::replace(&mut self.layers, layers)
    }

    /// Return a copy of the layers.
    pub fn snapshot(&self) -> Layers {
        self.layers.clone()
    }

    /// Return a [`Store`] containing the data of the store and every layer,
    /// with inner layers taking precedence.
    pub fn flatten(&self) -> Store {
        let mut data = self.store.data.clone();
        for layer in &self.layers.data {
            data.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        Store::from(data)
    }
}
