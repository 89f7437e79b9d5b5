use kiln::{Builder, Engine, Kind, Store, Undefined};
use std::{fs, path::Path, sync::Arc};
use tempfile::TempDir;

/// Create a template root holding the given files.
fn helper_root(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, source) in files {
        fs::write(dir.path().join(name), source).unwrap();
    }

    dir
}

fn helper_engine(root: &Path) -> Engine {
    Engine::new().with_root(root)
}

#[test]
fn test_text_unchanged() {
    let source = "plain <b>text</b> with } and { braces";

    assert_eq!(kiln::render(source, &Store::new()).unwrap(), source);
}

#[test]
fn test_trailing_newline_trimmed() {
    assert_eq!(kiln::render("hello\n", &Store::new()).unwrap(), "hello");
}

#[test]
fn test_ternary() {
    let store = Store::new().with_must("x", 2);

    assert_eq!(kiln::render("{{ 'yes' if true else 'no' }}", &store).unwrap(), "yes");
    assert_eq!(kiln::render("{{ 'yes' if false else 'no' }}", &store).unwrap(), "no");
    assert_eq!(
        kiln::render("{{ 'a' if x == 1 else 'b' if x == 2 else 'c' }}", &store).unwrap(),
        "b"
    );
}

#[test]
fn test_for_loop() {
    let result = kiln::render("{% for x in [1,2,3] %}{{ x }}{% endfor %}", &Store::new());

    assert_eq!(result.unwrap(), "123");
}

#[test]
fn test_for_loop_variables() {
    let result = kiln::render(
        "{% for x in ['a', 'b'] %}{{ loop.index }}{{ x }}{% if not loop.last %},{% endif %}{% endfor %}",
        &Store::new(),
    );

    assert_eq!(result.unwrap(), "1a,2b");
}

#[test]
fn test_filter_chain() {
    let result = kiln::render("{{ [3, 1, 2] | sort | join(',') }}", &Store::new());

    assert_eq!(result.unwrap(), "1,2,3");
}

#[test]
fn test_extends_super() {
    let root = helper_root(&[
        ("base.html", "<{% block title %}A{% endblock %}>"),
        (
            "child.html",
            "{% extends 'base.html' %}{% block title %}B{{ super() }}{% endblock %}",
        ),
    ]);
    let result = helper_engine(root.path()).render_from_path("child.html", &Store::new());

    assert_eq!(result.unwrap(), "<BA>");
}

#[test]
fn test_extends_missing_parent() {
    let root = helper_root(&[]);
    let error = helper_engine(root.path())
        .render("{% extends 'ghost.html' %}", &Store::new())
        .unwrap_err();

    assert_eq!(error.get_kind(), Kind::Render);
    assert_eq!(error.get_reason(), "missing template");
}

#[test]
fn test_self_call_renders_twice() {
    let result = kiln::render(
        "{% block title %}T{% endblock %}|{{ self.title() }}",
        &Store::new(),
    );

    assert_eq!(result.unwrap(), "T|T");
}

#[test]
fn test_self_call_recursion_limit() {
    let error = kiln::render(
        "{% block tree %}x{{ self.tree() }}{% endblock %}",
        &Store::new(),
    )
    .unwrap_err();

    assert_eq!(error.get_reason(), "recursion limit exceeded");
    assert!(error.get_help().unwrap().contains("tree"));
}

#[test]
fn test_max_depth() {
    let source = "{% block tree %}{% set n = (n or 0) + 1 %}{{ n }}{% if n < 3 %}{{ self.tree() }}{% endif %}{% endblock %}";

    assert!(Engine::new().render(source, &Store::new()).is_err());
    assert_eq!(
        Engine::new()
            .with_max_depth(2)
            .render(source, &Store::new())
            .unwrap(),
        "123"
    );
}

#[test]
fn test_undefined_modes() {
    let store = Store::new();
    let render = |undefined: Undefined, source: &str| {
        Engine::new()
            .with_undefined(undefined)
            .render(source, &store)
    };

    assert_eq!(render(Undefined::Default, "[{{ missing }}]").unwrap(), "[]");
    assert!(render(Undefined::Default, "{{ missing.name }}").is_err());
    assert!(render(Undefined::Strict, "{{ missing }}").is_err());
    assert_eq!(render(Undefined::Debug, "{{ missing }}").unwrap(), "{{ missing }}");
    assert_eq!(render(Undefined::Chainable, "[{{ a.b.c }}]").unwrap(), "[]");
}

#[test]
fn test_trim_markers() {
    let result = kiln::render("a  {%- if true -%}  b  {%- endif -%}  c", &Store::new());

    assert_eq!(result.unwrap(), "abc");
}

#[test]
fn test_raw() {
    let result = kiln::render("{% raw %}{{ x }}{% endraw %}", &Store::new());

    assert_eq!(result.unwrap(), "{{ x }}");
}

#[test]
fn test_cache_entry_per_mode() {
    let source = "{{ cache_entry_per_mode }}";
    let default = Engine::new().compile(source).unwrap();
    let debug = Engine::new()
        .with_undefined(Undefined::Debug)
        .compile(source)
        .unwrap();
    let again = Engine::new().compile(source).unwrap();

    assert!(!Arc::ptr_eq(&default, &debug));
    assert!(Arc::ptr_eq(&default, &again));
}

#[test]
fn test_modes_back_to_back() {
    let source = "[{{ modes_back_to_back }}]";
    let render = |undefined: Undefined| {
        Engine::new()
            .with_undefined(undefined)
            .render(source, &Store::new())
    };

    assert_eq!(render(Undefined::Default).unwrap(), "[]");
    assert!(render(Undefined::Strict).is_err());
    assert_eq!(render(Undefined::Default).unwrap(), "[]");
    assert_eq!(
        render(Undefined::Debug).unwrap(),
        "[{{ modes_back_to_back }}]"
    );
    assert!(render(Undefined::Strict).is_err());
}

#[test]
fn test_custom_syntax() {
    let syntax = Builder::new()
        .with_expression("((", "))")
        .with_block("(%", "%)")
        .to_syntax();
    let result = Engine::new().with_syntax(syntax).render(
        "(% for x in items %)(( x ));(% endfor %)",
        &Store::new().with_must("items", [1, 2]),
    );

    assert_eq!(result.unwrap(), "1;2;");
}

#[test]
fn test_include() {
    let root = helper_root(&[("header.html", "Hi {{ name }}\n")]);
    let engine = helper_engine(root.path());
    let store = Store::new().with_must("name", "taylor");

    assert_eq!(
        engine.render("{% include 'header.html' %}!", &store).unwrap(),
        "Hi taylor!"
    );
    assert_eq!(
        engine
            .render("{% include 'header.html' without context %}!", &store)
            .unwrap(),
        "Hi !"
    );
}

#[test]
fn test_include_missing() {
    let root = helper_root(&[("header.html", "Hi")]);
    let engine = helper_engine(root.path());

    assert_eq!(
        engine
            .render("{% include 'nope.html' ignore missing %}ok", &Store::new())
            .unwrap(),
        "ok"
    );
    assert_eq!(
        engine
            .render("{% include ['nope.html', 'header.html'] %}", &Store::new())
            .unwrap(),
        "Hi"
    );

    let error = engine
        .render("{% include 'nope.html' %}", &Store::new())
        .unwrap_err();
    assert_eq!(error.get_reason(), "missing template");
}

#[test]
fn test_include_outside_root() {
    let outer = helper_root(&[("secret.html", "secret")]);
    let inner = outer.path().join("templates");
    fs::create_dir(&inner).unwrap();
    let engine = helper_engine(&inner);

    for source in [
        "{% include '../secret.html' %}",
        "{% include '../secret.html' ignore missing %}",
        "{% extends '../secret.html' %}",
        "{% import '../secret.html' as secret %}",
    ] {
        let error = engine.render(source, &Store::new()).unwrap_err();
        assert_eq!(error.get_reason(), "template outside root");
    }

    let absolute = outer.path().join("secret.html");
    let error = engine
        .render(
            &format!("{{% include '{}' %}}", absolute.display()),
            &Store::new(),
        )
        .unwrap_err();
    assert_eq!(error.get_reason(), "template outside root");
}

#[test]
fn test_arithmetic_limits() {
    let store = Store::new();

    assert!(kiln::render("{{ 'ab' * 9000000000000000000 }}", &store).is_err());
    assert!(kiln::render("{{ [1, 2] * 9000000000000000000 }}", &store).is_err());
    assert!(kiln::render("{{ 'a' | center(9000000000000000000) }}", &store).is_err());
    assert_eq!(kiln::render("{{ 'ab' * 2 }}", &store).unwrap(), "abab");
    assert!(kiln::render("{{ (-9223372036854775807 - 1) // -1 }}", &store).is_ok());
    assert!(kiln::render("{{ (-9223372036854775807 - 1) % -1 }}", &store).is_ok());
}

#[test]
fn test_filter_applies_to_whole_expression() {
    let store = Store::new().with_must("x", "bob");

    assert_eq!(kiln::render("{{ 'a' ~ 'b' | upper }}", &store).unwrap(), "AB");
    assert_eq!(kiln::render("{{ x or 'guest' | upper }}", &store).unwrap(), "BOB");
    assert_eq!(kiln::render("{{ none or 'y' | upper }}", &store).unwrap(), "Y");
}

#[test]
fn test_set_visible_for_rest_of_render() {
    let root = helper_root(&[("footer.html", "({{ last }})")]);
    let result = helper_engine(root.path()).render(
        "{% for x in [1, 2] %}{% set last = x %}{% endfor %}[{{ last }}]{% include 'footer.html' %}",
        &Store::new(),
    );

    assert_eq!(result.unwrap(), "[2](2)");
}

#[test]
fn test_import_namespace() {
    let root = helper_root(&[(
        "forms.html",
        "{% macro input(name, type='text') %}<input name=\"{{ name }}\" type=\"{{ type }}\">{% endmacro %}",
    )]);
    let result = helper_engine(root.path()).render(
        "{% import 'forms.html' as forms %}{{ forms.input('user') }}",
        &Store::new(),
    );

    assert_eq!(result.unwrap(), "<input name=\"user\" type=\"text\">");
}

#[test]
fn test_from_import_sibling() {
    let root = helper_root(&[(
        "forms.html",
        "{% macro input(n) %}<{{ n }}>{% endmacro %}{% macro field(n) %}[{{ input(n) }}]{% endmacro %}",
    )]);
    let result = helper_engine(root.path()).render(
        "{% from 'forms.html' import field as f %}{{ f('a') }}",
        &Store::new(),
    );

    assert_eq!(result.unwrap(), "[<a>]");
}

#[test]
fn test_import_missing() {
    let root = helper_root(&[]);
    let result = helper_engine(root.path())
        .render("{% import 'ghost.html' as ghost %}", &Store::new());

    assert!(result.is_err());
}

#[test]
fn test_render_from_path_missing() {
    let root = helper_root(&[]);
    let error = helper_engine(root.path())
        .render_from_path("ghost.html", &Store::new())
        .unwrap_err();

    assert_eq!(error.get_reason(), "missing template");
}

#[test]
fn test_call_block() {
    let result = kiln::render(
        "{% macro wrap() %}<{{ caller() }}>{% endmacro %}{% call wrap() %} hi\n  there {% endcall %}",
        &Store::new(),
    );

    assert_eq!(result.unwrap(), "<hi there>");
}

#[test]
fn test_concurrent_renders() {
    let engine = Engine::new();
    let template = engine.compile("{{ n * 2 }}").unwrap();

    std::thread::scope(|scope| {
        for n in 0..4 {
            let (engine, template) = (&engine, &template);
            scope.spawn(move || {
                let result = engine.render_template(template, &Store::new().with_must("n", n));
                assert_eq!(result.unwrap(), (n * 2).to_string());
            });
        }
    });
}
