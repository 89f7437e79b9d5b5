use crate::compile::{
    tree::{Block, SetValue, Tree},
    Scope, Unit,
};
use std::collections::HashMap;
use tracing::debug;

/// Merge a child [`Unit`] into the parent it extends.
///
/// Child blocks replace parent blocks with the same name wherever they appear,
/// including blocks nested in other blocks or control flow. The original parent
/// bodies of replaced blocks are kept in `parents`, which is where `super()`
/// finds them. Top-level assignments, macros and imports of the child are
/// placed ahead of the parent body, and any other top-level content of the child
/// is discarded.
///
/// Only one level is resolved. If the parent extends another template, that
/// reference is dropped.
pub fn merge(parent: Unit, child: Unit) -> Unit {
    if let Some(extends) = &parent.extends {
        debug!(
            parent = parent.get_name(),
            child = child.get_name(),
            target = %extends.region.literal(&parent.origin.source),
            "ignoring extends of parent template",
        );
    }

    let mut parents = HashMap::new();
    for name in child.blocks.keys() {
        if let Some(original) = parent.blocks.get(name) {
            parents.insert(name.clone(), original.clone());
        }
    }

    let mut blocks = HashMap::with_capacity(parent.blocks.len() + child.blocks.len());
    for (name, block) in parent.blocks {
        if !child.blocks.contains_key(&name) {
            let body = replace(block.body, &child.blocks);
            blocks.insert(name, Block { body, ..block });
        }
    }
    for (name, block) in &child.blocks {
        blocks.insert(name.clone(), block.clone());
    }

    let mut data: Vec<Tree> = child
        .scope
        .data
        .into_iter()
        .filter(|tree| {
            matches!(
                tree,
                Tree::Set(_) | Tree::Macro(_) | Tree::Import(_) | Tree::FromImport(_)
            )
        })
        .collect();
    data.extend(replace(parent.scope, &child.blocks).data);

    let mut macros = parent.macros;
    macros.extend(child.macros);

    let mut imports = parent.imports;
    imports.extend(child.imports);
    let mut from_imports = parent.from_imports;
    from_imports.extend(child.from_imports);

    debug!(
        parent = %parent.origin.name,
        child = %child.origin.name,
        overridden = parents.len(),
        "merged child template into parent",
    );

    Unit {
        origin: parent.origin,
        scope: Scope::from_data(data),
        extends: None,
        blocks,
        macros,
        imports,
        from_imports,
        parents,
    }
}

/// Replace the bodies of blocks in the [`Scope`] with the bodies of the given
/// blocks, at any depth.
fn replace(scope: Scope, overrides: &HashMap<String, Block>) -> Scope {
    let data = scope
        .data
        .into_iter()
        .map(|tree| match tree {
            Tree::Block(block) => match overrides.get(&block.name) {
                Some(child) => Tree::Block(child.clone()),
                None => Tree::Block(Block {
                    body: replace(block.body, overrides),
                    ..block
                }),
            },
            Tree::If(mut tree) => {
                tree.branches = tree
                    .branches
                    .into_iter()
                    .map(|(condition, body)| (condition, replace(body, overrides)))
                    .collect();
                tree.else_branch = tree.else_branch.map(|body| replace(body, overrides));
                Tree::If(tree)
            }
            Tree::For(mut tree) => {
                tree.body = replace(tree.body, overrides);
                tree.else_branch = tree.else_branch.map(|body| replace(body, overrides));
                Tree::For(tree)
            }
            Tree::Set(mut tree) => {
                if let SetValue::Capture(body) = tree.value {
                    tree.value = SetValue::Capture(replace(body, overrides));
                }
                Tree::Set(tree)
            }
            Tree::Call(mut tree) => {
                tree.body = replace(tree.body, overrides);
                Tree::Call(tree)
            }
            Tree::Exec(mut tree) => {
                tree.else_branch = tree.else_branch.map(|body| replace(body, overrides));
                tree.catch_branch = tree.catch_branch.map(|body| replace(body, overrides));
                Tree::Exec(tree)
            }
            tree => tree,
        })
        .collect();

    Scope::from_data(data)
}

#[cfg(test)]
mod tests {
    use super::merge;
    use crate::compile::{parse, tokenize, tree::Tree, Syntax, Unit};

    fn helper_unit(name: &str, source: &str) -> Unit {
        let tokens = tokenize(source, &Syntax::default()).unwrap();
        parse(source, tokens, name).unwrap()
    }

    fn helper_block_text(tree: &Tree) -> String {
        match tree {
            Tree::Block(block) => match block.body.data.first() {
                Some(Tree::Text(text)) => text.clone(),
                _ => String::new(),
            },
            _ => String::new(),
        }
    }

    #[test]
    fn test_merge_replaces_block() {
        let parent = helper_unit("base", "<{% block title %}A{% endblock %}>");
        let child = helper_unit("child", "{% extends 'base' %}{% block title %}B{% endblock %}");
        let merged = merge(parent, child);

        assert_eq!(helper_block_text(&merged.scope.data[1]), "B");
        assert!(merged.extends.is_none());
        assert!(merged.parents.contains_key("title"));
    }

    #[test]
    fn test_merge_replaces_nested_block() {
        let parent = helper_unit(
            "base",
            "{% if true %}{% block outer %}{% block inner %}A{% endblock %}{% endblock %}{% endif %}",
        );
        let child = helper_unit("child", "{% extends 'base' %}{% block inner %}B{% endblock %}");
        let merged = merge(parent, child);

        let outer = merged.blocks.get("outer").unwrap();
        assert_eq!(helper_block_text(&outer.body.data[0]), "B");
        assert!(!merged.parents.contains_key("outer"));
    }

    #[test]
    fn test_merge_hoists_child_statements() {
        let parent = helper_unit("base", "body");
        let child = helper_unit(
            "child",
            "{% extends 'base' %}ignored{% set x = 1 %}{% macro m() %}{% endmacro %}",
        );
        let merged = merge(parent, child);

        assert!(matches!(merged.scope.data[0], Tree::Set(_)));
        assert!(matches!(merged.scope.data[1], Tree::Macro(_)));
        assert!(matches!(&merged.scope.data[2], Tree::Text(text) if text == "body"));
        assert_eq!(merged.scope.data.len(), 3);
        assert!(merged.macros.contains_key("m"));
    }

    #[test]
    fn test_merge_keeps_child_only_blocks() {
        let parent = helper_unit("base", "body");
        let child = helper_unit("child", "{% extends 'base' %}{% block extra %}x{% endblock %}");
        let merged = merge(parent, child);

        assert!(merged.blocks.contains_key("extra"));
        assert_eq!(merged.scope.data.len(), 1);
    }
}
