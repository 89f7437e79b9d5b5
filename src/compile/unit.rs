use crate::{
    compile::{
        tree::{Block, Expression, Extends, FromImport, Import, Macro, Origin},
        Scope,
    },
    log::{Error, INVALID_SYNTAX},
};
use serde_json::Value;
use std::collections::HashMap;

/// A parsed template, before compilation.
///
/// Produced by the parser, combined with a parent by
/// [`merge`][`crate::compile::merge`] and consumed by the compiler.
#[derive(Debug, Clone)]
pub struct Unit {
    /// Name and source of the template.
    pub origin: Origin,
    /// Ordered top-level statements.
    pub scope: Scope,
    /// Reference to the parent template, if any.
    pub extends: Option<Extends>,
    /// Every block in the template, including nested blocks.
    pub blocks: HashMap<String, Block>,
    /// Every macro defined or imported by the template.
    pub macros: HashMap<String, Macro>,
    /// Namespace imports.
    pub imports: Vec<Import>,
    /// Imports of specific macros.
    pub from_imports: Vec<FromImport>,
    /// The original bodies of parent blocks that were overridden, which are
    /// rendered by `super()`.
    pub parents: HashMap<String, Block>,
}

impl Unit {
    /// Create an empty [`Unit`] with the given [`Origin`].
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            scope: Scope::new(),
            extends: None,
            blocks: HashMap::new(),
            macros: HashMap::new(),
            imports: vec![],
            from_imports: vec![],
            parents: HashMap::new(),
        }
    }

    /// Return the name of the template.
    #[inline]
    pub fn get_name(&self) -> &str {
        &self.origin.name
    }

    /// Return the name of the parent template, if this template extends one.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the target of the extends tag is not a string
    /// literal.
    pub fn parent_name(&self) -> Result<Option<String>, Error> {
        match &self.extends {
            Some(extends) => self.literal_target(&extends.target).map(Some),
            None => Ok(None),
        }
    }

    /// Return the literal value of a template reference.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the expression is not a string literal.
    pub fn literal_target(&self, target: &Expression) -> Result<String, Error> {
        match target.as_literal() {
            Some(Value::String(name)) => Ok(name),
            _ => Err(Error::compile(INVALID_SYNTAX)
                .with_pointer(&self.origin.source, target.get_region())
                .with_name(self.get_name())
                .with_help("template references must be string literals")),
        }
    }

    /// Make every macro of `other` available as `alias.name`.
    pub fn import_namespace(&mut self, alias: &str, other: &Unit) {
        for (name, definition) in &other.macros {
            let mut definition = definition.clone();
            definition.namespace = Some(match &definition.namespace {
                Some(inner) => format!("{alias}.{inner}"),
                None => alias.to_string(),
            });
            self.macros
                .entry(format!("{alias}.{name}"))
                .or_insert(definition);
        }
    }

    /// Make the named macros of `other` available under their name, or alias.
    ///
    /// The remaining macros of `other` are kept under a hidden namespace so that
    /// imported macros can still call their siblings.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if `other` does not define one of the names.
    pub fn import_from(
        &mut self,
        target: &str,
        import: &FromImport,
        other: &Unit,
    ) -> Result<(), Error> {
        self.import_namespace(target, other);

        for (name, alias) in &import.names {
            let definition = self
                .macros
                .get(&format!("{target}.{name}"))
                .cloned()
                .ok_or_else(|| {
                    Error::compile(INVALID_SYNTAX)
                        .with_pointer(&self.origin.source, import.region)
                        .with_name(self.get_name())
                        .with_help(format!("template `{target}` does not define `{name}`"))
                })?;
            self.macros
                .insert(alias.clone().unwrap_or_else(|| name.clone()), definition);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::{parse, tokenize, Syntax, Unit};

    fn helper_unit(name: &str, source: &str) -> Unit {
        let tokens = tokenize(source, &Syntax::default()).unwrap();
        parse(source, tokens, name).unwrap()
    }

    #[test]
    fn test_parent_name() {
        let unit = helper_unit("child", "{% extends 'base.html' %}");

        assert_eq!(unit.parent_name().unwrap(), Some("base.html".to_string()));
    }

    #[test]
    fn test_parent_name_requires_literal() {
        let unit = helper_unit("child", "{% extends name %}");

        assert!(unit.parent_name().is_err());
    }

    #[test]
    fn test_import_namespace() {
        let mut unit = helper_unit("page", "{% import 'forms' as forms %}");
        let other = helper_unit("forms", "{% macro input(n) %}{{ n }}{% endmacro %}");
        unit.import_namespace("forms", &other);

        let imported = unit.macros.get("forms.input").unwrap();
        assert_eq!(imported.namespace.as_deref(), Some("forms"));
    }

    #[test]
    fn test_import_from_alias() {
        let mut unit = helper_unit("page", "{% from 'forms' import input as field %}");
        let other = helper_unit("forms", "{% macro input(n) %}{{ n }}{% endmacro %}");
        let import = unit.from_imports[0].clone();
        unit.import_from("forms", &import, &other).unwrap();

        assert!(unit.macros.contains_key("field"));
        assert!(!unit.macros.contains_key("input"));
    }

    #[test]
    fn test_import_from_missing_name() {
        let mut unit = helper_unit("page", "{% from 'forms' import select %}");
        let other = helper_unit("forms", "{% macro input(n) %}{{ n }}{% endmacro %}");
        let import = unit.from_imports[0].clone();

        assert!(unit.import_from("forms", &import, &other).is_err());
    }
}
