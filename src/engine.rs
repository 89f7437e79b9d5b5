use crate::{
    compile::{compile, merge, parse, tokenize, Syntax, Template, Unit},
    filter::Filter,
    host::Host,
    log::{error_missing_template, Error, INVALID_FILTER, OUTSIDE_ROOT, RECURSION_LIMIT},
    region::Region,
    render::{Frame, Undefined},
    Store,
};
use once_cell::sync::Lazy;
use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
    fs, io,
    path::{Component, Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};
use tracing::{debug, trace};

/// Name given to templates compiled from a string.
const ANONYMOUS: &str = "?";

/// Upper bound on the number of nested includes in a single render.
const MAX_INCLUDE_DEPTH: usize = 32;

/// Upper bound on the number of nested imports, which also catches cycles.
const MAX_IMPORT_DEPTH: usize = 16;

/// Compiled templates shared by every [`Engine`] in the process.
static CACHE: Lazy<RwLock<HashMap<Key, Arc<Template>>>> = Lazy::new(Default::default);

/// Source of filter set identities, where zero means no custom filters.
static FILTER_SETS: AtomicU64 = AtomicU64::new(1);

/// Identity of a compiled template in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    name: String,
    source: String,
    root: PathBuf,
    syntax: Syntax,
    undefined: Undefined,
    filters: u64,
}

/// Facilitates compiling and rendering templates, and provides storage
/// for filters.
///
/// Compiled templates are kept in a cache shared by every `Engine` in the
/// process. Two engines only share a compiled template when the template name,
/// source, root, [`Syntax`], [`Undefined`] policy and filters are the same.
#[derive(Clone)]
pub struct Engine {
    /// Policy for undefined values, fixed into templates at compile time.
    pub(crate) undefined: Undefined,
    /// Directory that template names are resolved against.
    root: PathBuf,
    /// Markers recognized by the lexer.
    syntax: Syntax,
    /// Number of times a block may be invoked while it is already active.
    pub(crate) max_depth: usize,
    /// Runs the code of exec blocks.
    pub(crate) host: Option<Arc<dyn Host>>,
    /// Filters that this engine is aware of.
    filters: HashMap<String, Arc<dyn Filter>>,
    /// Identity of `filters`, part of the cache key.
    filter_id: u64,
}

impl Engine {
    /// Create a new [`Engine`] with the default [`Syntax`], the
    /// [`Undefined::Default`] policy and templates resolved against the current
    /// directory.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the [`Undefined`] policy used by templates compiled from now on.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::{Engine, Store, Undefined};
    ///
    /// let engine = Engine::new().with_undefined(Undefined::Strict);
    /// assert!(engine.render("{{ ghost }}", &Store::new()).is_err());
    /// ```
    #[inline]
    pub fn with_undefined(mut self, undefined: Undefined) -> Self {
        self.undefined = undefined;
        self
    }

    /// Set the directory that `extends`, `include` and `import` targets are
    /// resolved against.
    #[inline]
    pub fn with_root<T: Into<PathBuf>>(mut self, root: T) -> Self {
        self.root = root.into();
        self
    }

    /// Set the [`Syntax`] used to lex templates.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::{Builder, Engine, Store};
    ///
    /// let syntax = Builder::new().with_expression("((", "))").to_syntax();
    /// let engine = Engine::new().with_syntax(syntax);
    /// let result = engine.render("hello, (( name ))!", &Store::new().with_must("name", "taylor"));
    ///
    /// assert_eq!(result.unwrap(), "hello, taylor!");
    /// ```
    #[inline]
    pub fn with_syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Set how many times a block may be invoked while it is already active.
    ///
    /// The default is `1`, which allows a block to call itself once.
    #[inline]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the [`Host`] that runs the code of exec blocks.
    #[inline]
    pub fn with_host<T>(mut self, host: T) -> Self
    where
        T: Host + 'static,
    {
        self.host = Some(Arc::new(host));
        self
    }

    /// Return the [`Undefined`] policy of the [`Engine`].
    #[inline]
    pub fn get_undefined(&self) -> Undefined {
        self.undefined
    }

    /// Return the template root of the [`Engine`].
    #[inline]
    pub fn get_root(&self) -> &Path {
        &self.root
    }

    /// Compile a new [`Template`], or return the cached one.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when compilation fails, which most likely means the source
    /// contains invalid syntax.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Engine;
    ///
    /// let engine = Engine::new();
    /// let template = engine.compile("hello, {{ name }}!");
    /// assert!(template.is_ok());
    /// ```
    #[inline]
    pub fn compile(&self, source: &str) -> Result<Arc<Template>, Error> {
        self.compile_named(ANONYMOUS, source)
    }

    /// Compile a new [`Template`] with the given name, or return the cached one.
    ///
    /// The name appears in errors and is the name that `extends` and `import`
    /// targets are resolved from.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when compilation fails, or when a parent template or
    /// an imported template cannot be loaded.
    pub fn compile_named(&self, name: &str, source: &str) -> Result<Arc<Template>, Error> {
        let key = Key {
            name: name.to_string(),
            source: source.to_string(),
            root: self.root.clone(),
            syntax: self.syntax.clone(),
            undefined: self.undefined,
            filters: self.filter_id,
        };

        if let Some(template) = read(&CACHE).get(&key) {
            trace!(name, "template cache hit");
            return Ok(Arc::clone(template));
        }

        debug!(name, undefined = ?self.undefined, "template cache miss, compiling");
        let unit = self.resolve(name, source)?;
        let template = Arc::new(compile(&unit, &self.filters, self.undefined)?);

        let mut cache = write(&CACHE);
        Ok(Arc::clone(cache.entry(key).or_insert(template)))
    }

    /// Compile and render the source with the given [`Store`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if compiling or rendering fails, which may happen when a
    /// [`Filter`] returns an `Error` itself, or the template cannot be rendered for
    /// a reason that will be described by the `Error`.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::{Engine, Store};
    ///
    /// let engine = Engine::new();
    /// let result = engine.render("hello, {{ name }}!", &Store::new().with_must("name", "taylor"));
    ///
    /// assert_eq!(result.unwrap(), "hello, taylor!")
    /// ```
    #[inline]
    pub fn render(&self, source: &str, store: &Store) -> Result<String, Error> {
        let template = self.compile(source)?;
        self.render_template(&template, store)
    }

    /// Load, compile and render the template at the given path.
    ///
    /// A relative path is resolved against the template root, and is also the
    /// name of the template. Unlike the names used by `include`, `import` and
    /// `extends`, the path may be absolute.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the file does not exist or cannot be read, or if
    /// compiling or rendering fails.
    pub fn render_from_path<T: AsRef<Path>>(&self, path: T, store: &Store) -> Result<String, Error> {
        let path = path.as_ref();
        let name = path.to_string_lossy();
        let source = Self::read_source(&self.root.join(path), &name)?
            .ok_or_else(|| error_missing_template(&name))?;

        let template = self.compile_named(&name, &source)?;
        self.render_template(&template, store)
    }

    /// Render a compiled [`Template`] with the given [`Store`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if rendering fails.
    #[inline]
    pub fn render_template(&self, template: &Template, store: &Store) -> Result<String, Error> {
        Frame::new(self, template, store, 0).render()
    }

    /// Render the named template for an include, or return `None` if it does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if includes are nested too deeply, or if the
    /// template fails to compile or render.
    pub(crate) fn include(
        &self,
        name: &str,
        store: &Store,
        includes: usize,
    ) -> Result<Option<String>, Error> {
        if includes >= MAX_INCLUDE_DEPTH {
            return Err(Error::render(RECURSION_LIMIT).with_help(format!(
                "includes are nested more than `{MAX_INCLUDE_DEPTH}` levels deep \
                while including `{name}`"
            )));
        }

        let Some(source) = self.load(name)? else {
            debug!(name, "included template not found");
            return Ok(None);
        };

        let template = self.compile_named(name, &source)?;
        Frame::new(self, &template, store, includes + 1)
            .render()
            .map(Some)
    }

    /// Parse the source, load the imports it names and merge it into the
    /// template it extends, if any.
    fn resolve(&self, name: &str, source: &str) -> Result<Unit, Error> {
        let child = self.load_unit(name, source, 0)?;
        let Some(parent_name) = child.parent_name()? else {
            return Ok(child);
        };

        let parent_source = self.load(&parent_name)?.ok_or_else(|| {
            let error = error_missing_template(&parent_name).with_name(name);
            match &child.extends {
                Some(extends) => error.with_pointer(source, extends.region),
                None => error,
            }
        })?;
        let parent = self.load_unit(&parent_name, &parent_source, 1)?;

        debug!(name, parent = %parent_name, "resolved parent template");
        Ok(merge(parent, child))
    }

    /// Parse the source and make the macros of every template it imports
    /// available to it.
    fn load_unit(&self, name: &str, source: &str, depth: usize) -> Result<Unit, Error> {
        if depth > MAX_IMPORT_DEPTH {
            return Err(Error::compile(RECURSION_LIMIT)
                .with_name(name)
                .with_help("templates import each other too deeply, check for a cycle"));
        }

        let tokens = tokenize(source, &self.syntax).map_err(|error| error.with_name(name))?;
        let mut unit = parse(source, tokens, name)?;

        for import in unit.imports.clone() {
            let target = unit.literal_target(&import.target)?;
            let other = self.load_import(&unit, &target, import.region, depth)?;
            unit.import_namespace(&import.alias, &other);
        }
        for import in unit.from_imports.clone() {
            let target = unit.literal_target(&import.target)?;
            let other = self.load_import(&unit, &target, import.region, depth)?;
            unit.import_from(&target, &import, &other)?;
        }

        Ok(unit)
    }

    fn load_import(
        &self,
        unit: &Unit,
        target: &str,
        region: Region,
        depth: usize,
    ) -> Result<Unit, Error> {
        let source = self.load(target)?.ok_or_else(|| {
            error_missing_template(target)
                .with_pointer(&unit.origin.source, region)
                .with_name(unit.get_name())
        })?;

        trace!(name = unit.get_name(), target, "importing template");
        self.load_unit(target, &source, depth + 1)
    }

    /// Read the named template beneath the root, or return `None` if it does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the name is absolute or climbs out of the root
    /// with `..`, or the file cannot be read.
    fn load(&self, name: &str) -> Result<Option<String>, Error> {
        let escapes = Path::new(name).components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(Error::render(OUTSIDE_ROOT).with_help(format!(
                "template `{name}` must be a relative path without `..` segments"
            )));
        }

        Self::read_source(&self.root.join(name), name)
    }

    /// Read the template at the path, or return `None` if it does not exist.
    fn read_source(path: &Path, name: &str) -> Result<Option<String>, Error> {
        match fs::read_to_string(path) {
            Ok(source) => {
                trace!(path = %path.display(), "loaded template");
                Ok(Some(source))
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(Error::render(format!("failed to read template `{name}`"))
                .with_help(error.to_string())),
        }
    }

    /// Add a [`Filter`].
    ///
    /// A custom filter replaces a built-in filter with the same name.
    ///
    /// # Errors
    ///
    /// If a `Filter` with the given name already exists in the engine, an [`Error`] is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::{
    ///     filter::{
    ///         serde::{json, Value},
    ///         Error,
    ///     },
    ///     Engine, Store,
    /// };
    /// use std::collections::HashMap;
    ///
    /// fn to_lowercase(value: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
    ///     match value {
    ///         Value::String(string) => Ok(json!(string.to_owned().to_lowercase())),
    ///         _ => Err(Error::build("filter `to_lowercase` requires string input")
    ///            .with_help("use quotes to coerce data to string")
    ///         ),
    ///     }
    /// };
    ///
    /// let mut engine = Engine::new();
    /// let result = engine.add_filter("to_lowercase", to_lowercase);
    ///
    /// assert!(result.is_ok());
    /// ```
    pub fn add_filter<T>(&mut self, name: &str, filter: T) -> Result<(), Error>
    where
        T: Filter + 'static,
    {
        if self.filters.contains_key(name) {
            return Err(Error::build(INVALID_FILTER).with_help(format!(
                "filter with name `{name}` already exists in engine, \
                overwrite it with `.add_filter_must`"
            )));
        }

        self.add_filter_must(name, filter);
        Ok(())
    }

    /// Add a [`Filter`].
    ///
    /// If a `Filter` with the given name already exists in the [`Engine`], it is overwritten.
    #[inline]
    pub fn add_filter_must<T>(&mut self, name: &str, filter: T)
    where
        T: Filter + 'static,
    {
        self.filters.insert(name.to_string(), Arc::new(filter));
        self.filter_id = FILTER_SETS.fetch_add(1, Ordering::Relaxed);
        trace!(name, filters = self.filter_id, "added filter");
    }

    /// Add a [`Filter`].
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    ///
    /// # Errors
    ///
    /// If a `Filter` with the given name already exists in the engine, an [`Error`] is returned.
    #[inline]
    pub fn with_filter<T>(mut self, name: &str, filter: T) -> Result<Self, Error>
    where
        T: Filter + 'static,
    {
        self.add_filter(name, filter)?;
        Ok(self)
    }

    /// Add a [`Filter`].
    ///
    /// Returns the [`Engine`], so additional methods may be chained.
    ///
    /// If a `Filter` with the given name already exists in the engine, it is overwritten.
    #[inline]
    pub fn with_filter_must<T>(mut self, name: &str, filter: T) -> Self
    where
        T: Filter + 'static,
    {
        self.add_filter_must(name, filter);
        self
    }

    /// Return the custom filter with the given name, if it exists in Engine.
    #[inline]
    pub fn get_filter(&self, name: &str) -> Option<&Arc<dyn Filter>> {
        self.filters.get(name)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            undefined: Undefined::default(),
            root: PathBuf::from("."),
            syntax: Syntax::default(),
            max_depth: 1,
            host: None,
            filters: HashMap::new(),
            filter_id: 0,
        }
    }
}

impl Debug for Engine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut filters: Vec<&String> = self.filters.keys().collect();
        filters.sort();

        f.debug_struct("Engine")
            .field("undefined", &self.undefined)
            .field("root", &self.root)
            .field("syntax", &self.syntax)
            .field("max_depth", &self.max_depth)
            .field("host", &self.host.is_some())
            .field("filters", &filters)
            .finish()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use crate::{
        engine::Engine,
        log::{Error, OUTSIDE_ROOT},
        render::Undefined,
        Store,
    };
    use serde_json::Value;
    use std::{collections::HashMap, sync::Arc};

    #[test]
    fn test_add() {
        let mut engine = Engine::default();
        engine.add_filter_must("faux", faux_filter_a);

        assert!(engine.get_filter("faux").is_some());
        assert!(engine.get_filter("ghost").is_none())
    }

    #[test]
    fn test_add_fluent() {
        assert!(Engine::default()
            .with_filter("faux", faux_filter_a)
            .unwrap()
            .get_filter("faux")
            .is_some());
        assert!(Engine::default().get_filter("ghost").is_none());
    }

    #[test]
    fn test_add_duplicate() {
        assert!(Engine::default()
            .with_filter_must("faux", faux_filter_a)
            .with_filter("faux", faux_filter_a)
            .is_err())
    }

    #[test]
    fn test_add_overwrite() {
        let value = Value::Null;
        let arguments = HashMap::new();

        let mut engine = Engine::default().with_filter_must("faux", faux_filter_a);
        assert!(engine.get_filter("faux").is_some_and(|f| f
            .apply(&value, &arguments)
            .is_ok_and(|v| v == Value::String("a".into()))));

        engine.add_filter_must("faux", faux_filter_b);
        assert!(engine.get_filter("faux").is_some_and(|f| f
            .apply(&value, &arguments)
            .is_ok_and(|v| v == Value::String("b".into()))));
    }

    #[test]
    fn test_overwrite_recompiles() {
        let source = "{{ 'x' | faux }}";
        let mut engine = Engine::default().with_filter_must("faux", faux_filter_a);
        assert_eq!(engine.render(source, &Store::new()).unwrap(), "a");

        engine.add_filter_must("faux", faux_filter_b);
        assert_eq!(engine.render(source, &Store::new()).unwrap(), "b");
    }

    #[test]
    fn test_cache_hit() {
        let engine = Engine::new();
        let source = "cached {{ 1 + 1 }} in engine tests";
        let first = engine.compile(source).unwrap();
        let second = engine.compile(source).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_cache_separates_undefined() {
        let source = "{{ separated_by_policy }}";
        let default = Engine::new().compile(source).unwrap();
        let strict = Engine::new()
            .with_undefined(Undefined::Strict)
            .compile(source)
            .unwrap();

        assert!(!Arc::ptr_eq(&default, &strict));
        assert_eq!(strict.get_undefined(), Undefined::Strict);
    }

    #[test]
    fn test_missing_include() {
        let result = Engine::new()
            .with_root("/nonexistent/kiln/root")
            .render("{% include 'a.html' %}", &Store::new());

        assert!(result.is_err());
    }

    #[test]
    fn test_load_rejects_escaping_names() {
        let engine = Engine::new().with_root("templates");

        for name in ["../secret.html", "a/../../b.html", "/etc/passwd"] {
            let error = engine.load(name).unwrap_err();
            assert_eq!(error.get_reason(), OUTSIDE_ROOT);
        }
        assert!(engine.load("nested/./missing.html").unwrap().is_none());
    }

    #[test]
    fn test_compile_error_not_cached() {
        let engine = Engine::new();

        assert!(engine.compile("{{ x | not_a_filter }}").is_err());
        assert!(engine.compile("{{ x | not_a_filter }}").is_err());
    }

    /// A Filter used to test Engine.
    fn faux_filter_a(_: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
        Ok(Value::String("a".into()))
    }

    /// A Filter used to test Engine.
    fn faux_filter_b(_: &Value, _: &HashMap<String, Value>) -> Result<Value, Error> {
        Ok(Value::String("b".into()))
    }
}
