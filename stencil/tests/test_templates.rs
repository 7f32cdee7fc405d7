use std::collections::BTreeMap;

use serde::Serialize;
use similar_asserts::assert_eq;

use stencil::value::Value;
use stencil::{context, Environment};

#[test]
fn test_basic() {
    let mut env = Environment::new();
    env.add_template("test", "Hello {{ name }}!");
    let rv = env.render_with("test", context! { name => "World" }).unwrap();
    assert_eq!(rv, "Hello World!");
}

#[test]
fn test_serializable_context() {
    #[derive(Serialize)]
    struct User {
        name: String,
        active: bool,
        roles: Vec<&'static str>,
    }

    #[derive(Serialize)]
    struct Ctx {
        user: User,
        missing: Option<u32>,
    }

    let env = Environment::new();
    let rv = env
        .render_str(
            "{{if user.active}}{{ user.name }} ({{ user.roles|join:', ' }}){{endif}}\
             [{{ missing|default:'-' }}]",
            Ctx {
                user: User {
                    name: "Ada".into(),
                    active: true,
                    roles: vec!["admin", "dev"],
                },
                missing: None,
            },
        )
        .unwrap();
    assert_eq!(rv, "Ada (admin, dev)[-]");
}

#[test]
fn test_paths() {
    let env = Environment::new();
    let ctx = context! {
        user => context! {
            name => "Ada",
            tags => vec!["math", "engines"],
        },
    };
    assert_eq!(
        env.render_str("{{ user.name }} {{ user.tags.1 }}", &ctx).unwrap(),
        "Ada engines"
    );
    // missing segments and steps into scalars render as nothing
    assert_eq!(
        env.render_str(
            "[{{ missing }}][{{ user.email }}][{{ user.name.first }}][{{ user.tags.7 }}]",
            &ctx
        )
        .unwrap(),
        "[][][][]"
    );
}

#[test]
fn test_value_output() {
    let env = Environment::new();
    let ctx = context! {
        int => 42,
        float => 2.0,
        yes => true,
        nothing => (),
    };
    assert_eq!(
        env.render_str("{{ int }}|{{ float }}|{{ yes }}|{{ nothing }}", ctx)
            .unwrap(),
        "42|2.0|true|"
    );
}

#[test]
fn test_literal_text_is_untouched() {
    let env = Environment::new();
    let source = "<p>\n  { not a tag } and } stray braces\n</p>";
    assert_eq!(env.render_str(source, ()).unwrap(), source);
}

#[test]
fn test_stray_braces_stay_text() {
    let env = Environment::new();
    assert_eq!(env.render_str("Use {{ to open", ()).unwrap(), "Use {{ to open");
    let rv = env
        .render_str(
            "<script>if (a) {{ b(); </script>{{ name }}",
            context! { name => "x" },
        )
        .unwrap();
    assert_eq!(rv, "<script>if (a) {{ b(); </script>x");
}

#[test]
fn test_single_trailing_newline_is_dropped() {
    let env = Environment::new();
    assert_eq!(env.render_str("a\n", ()).unwrap(), "a");
    assert_eq!(env.render_str("a\n\n", ()).unwrap(), "a\n");
    assert_eq!(env.render_str("a\r\n", ()).unwrap(), "a");
    assert_eq!(env.render_str("a\r", ()).unwrap(), "a\r");
}

#[test]
fn test_conditional() {
    let mut env = Environment::new();
    env.add_template("t", "{{if user.active}}Y{{else}}N{{endif}}");
    let active = env
        .render_with("t", context! { user => context! { active => true } })
        .unwrap();
    let inactive = env
        .render_with("t", context! { user => context! { active => false } })
        .unwrap();
    let missing = env.render("t").unwrap();
    assert_eq!(active, "Y");
    assert_eq!(inactive, "N");
    assert_eq!(missing, "N");
}

#[test]
fn test_elseif_chain() {
    let mut env = Environment::new();
    env.add_template(
        "t",
        "{{if n > 10}}big{{elseif n > 5}}medium{{elseif n}}small{{else}}none{{endif}}",
    );
    let render = |n: i64| env.render_with("t", context! { n }).unwrap();
    assert_eq!(render(20), "big");
    assert_eq!(render(7), "medium");
    assert_eq!(render(1), "small");
    assert_eq!(render(0), "none");
}

#[test]
fn test_nested_conditionals() {
    let env = Environment::new();
    let tmpl = "{{if a}}A{{if b}}B{{else}}-{{endif}}{{endif}}.";
    assert_eq!(env.render_str(tmpl, context! { a => 1, b => 1 }).unwrap(), "AB.");
    assert_eq!(env.render_str(tmpl, context! { a => 1 }).unwrap(), "A-.");
    assert_eq!(env.render_str(tmpl, context! { b => 1 }).unwrap(), ".");
}

#[test]
fn test_truthiness() {
    let env = Environment::new();
    let tmpl = "{{if v}}T{{else}}F{{endif}}";
    let check = |v: Value| env.render_str(tmpl, context! { v }).unwrap();
    assert_eq!(check(Value::from(0)), "F");
    assert_eq!(check(Value::from(0.0)), "F");
    assert_eq!(check(Value::from("")), "F");
    assert_eq!(check(Value::from(Vec::<Value>::new())), "F");
    assert_eq!(check(Value::from(())), "F");
    assert_eq!(check(Value::from("0")), "T");
    assert_eq!(check(Value::from(vec![0])), "T");
    assert_eq!(check(Value::from(-1)), "T");
}

#[test]
fn test_boolean_operators() {
    let env = Environment::new();
    let ctx = context! { a => true, b => false };
    assert_eq!(
        env.render_str(
            "{{if a and b}}1{{endif}}{{if a or b}}2{{endif}}{{if not b}}3{{endif}}\
             {{if !(a && b) || b}}4{{endif}}",
            ctx
        )
        .unwrap(),
        "234"
    );
}

#[test]
fn test_comparisons() {
    let env = Environment::new();
    let ctx = context! {
        count => 3,
        price => 2.5,
        name => "bob",
    };
    let rv = env
        .render_str(
            "{{if count == 3}}a{{endif}}\
             {{if count != 3}}b{{endif}}\
             {{if count > price}}c{{endif}}\
             {{if price <= 2.5}}d{{endif}}\
             {{if name == 'bob'}}e{{endif}}\
             {{if name < 'carl'}}f{{endif}}\
             {{if count >= 4}}g{{endif}}",
            ctx,
        )
        .unwrap();
    assert_eq!(rv, "acdef");
}

#[test]
fn test_comparisons_with_absent_values() {
    let env = Environment::new();
    let rv = env
        .render_str(
            "{{if missing < 1}}a{{endif}}{{if missing >= 1}}b{{endif}}\
             {{if missing == none}}c{{endif}}{{if missing != 1}}d{{endif}}",
            (),
        )
        .unwrap();
    assert_eq!(rv, "cd");
}

#[test]
fn test_each() {
    let mut env = Environment::new();
    env.add_template("row", "{{ item.x }}");
    env.add_template("list", "{{each item in items using 'row'}}");
    let rv = env
        .render_with(
            "list",
            context! {
                items => vec![context! { x => 1 }, context! { x => 2 }],
            },
        )
        .unwrap();
    assert_eq!(rv, "12");
}

#[test]
fn test_each_sees_outer_context() {
    let mut env = Environment::new();
    env.add_template("row", "<{{ prefix }}{{ item }}>");
    let rv = env
        .render_str(
            "{{each item in items using 'row'}}{{ item }}",
            context! { prefix => "#", items => vec![1, 2], item => "outer" },
        )
        .unwrap();
    assert_eq!(rv, "<#1><#2>outer");
}

#[test]
fn test_each_over_absent_and_empty() {
    let mut env = Environment::new();
    env.add_template("row", "x");
    assert_eq!(
        env.render_str("[{{each i in nothing using 'row'}}]", ())
            .unwrap(),
        "[]"
    );
    assert_eq!(
        env.render_str(
            "[{{each i in items using 'row'}}]",
            context! { items => Vec::<i32>::new() }
        )
        .unwrap(),
        "[]"
    );
}

#[test]
fn test_each_over_map_values() {
    let mut env = Environment::new();
    env.add_template("row", "{{ v }};");
    let mut map = BTreeMap::new();
    map.insert("a", 1);
    map.insert("b", 2);
    assert_eq!(
        env.render_str("{{each v in map using 'row'}}", context! { map })
            .unwrap(),
        "1;2;"
    );
}

#[test]
fn test_include_uses_current_context() {
    let mut env = Environment::new();
    env.add_template("footer", "(c) {{ site }}");
    env.add_template("page", "<p>{{ body }}</p>{{include 'footer'}}");
    let rv = env
        .render_with("page", context! { site => "Example", body => "Hi" })
        .unwrap();
    assert_eq!(rv, "<p>Hi</p>(c) Example");
}

#[test]
fn test_embed_bindings() {
    let mut env = Environment::new();
    env.add_template("card", "<h1>{{ title }}</h1><i>{{ user }}</i>");
    env.add_template(
        "page",
        "{{embed 'card' with ['title' => page.title, 'extra' => page.missing]}}",
    );
    let rv = env
        .render_with(
            "page",
            context! {
                page => context! { title => "Welcome" },
                user => "ada",
                title => "outer",
            },
        )
        .unwrap();
    assert_eq!(rv, "<h1>Welcome</h1><i>ada</i>");
}

#[test]
fn test_embed_without_bindings() {
    let mut env = Environment::new();
    env.add_template("card", "[{{ title }}]");
    assert_eq!(
        env.render_str("{{embed 'card'}}", context! { title => "t" })
            .unwrap(),
        "[t]"
    );
}

#[test]
fn test_nested_partials() {
    let mut env = Environment::new();
    env.add_template("cell", "({{ item }})");
    env.add_template("row", "[{{each item in item using 'cell'}}]");
    env.add_template("table", "{{each item in rows using 'row'}}");
    let rv = env
        .render_with("table", context! { rows => vec![vec![1, 2], vec![3]] })
        .unwrap();
    assert_eq!(rv, "[(1)(2)][(3)]");
}

#[test]
fn test_partials_start_from_the_root_context() {
    let mut env = Environment::new();
    env.add_global("site", "S");
    env.add_template("cell", "[{{ site }}|{{ row.name }}|{{ label }}|{{ c }}]");
    env.add_template("row", "{{each c in row.cells using 'cell'}}");
    env.add_template("card", "<{{ title }}|{{ row.name }}>{{embed 'cell' with ['c' => title]}}");
    env.add_template(
        "page",
        "{{each row in rows using 'row'}}/{{embed 'card' with ['title' => label, 'label' => label]}}",
    );
    let rv = env
        .render_with(
            "page",
            context! {
                rows => vec![context! { name => "r1", cells => vec![1, 2] }],
                label => "L",
            },
        )
        .unwrap();
    assert_eq!(rv, "[S||L|1][S||L|2]/<L|>[S||L|L]");
}

#[test]
fn test_include_keeps_the_partial_context() {
    let mut env = Environment::new();
    env.add_template("name", "{{ row.name }}");
    env.add_template("row", "({{include 'name'}})");
    let rv = env
        .render_str(
            "{{each row in rows using 'row'}}",
            context! { rows => vec![context! { name => "a" }, context! { name => "b" }] },
        )
        .unwrap();
    assert_eq!(rv, "(a)(b)");
}

#[test]
fn test_globals() {
    let mut env = Environment::new();
    env.add_global("site", "Example");
    env.add_template("partial", "{{ site }}");
    env.add_template("page", "{{ site }}/{{include 'partial'}}");
    assert_eq!(env.render("page").unwrap(), "Example/Example");
    assert_eq!(
        env.render_with("page", context! { site => "Local" }).unwrap(),
        "Local/Local"
    );
}

#[test]
fn test_render_str_can_use_partials() {
    let mut env = Environment::new();
    env.add_template("row", "{{ item }},");
    assert_eq!(
        env.render_str("{{each item in items using 'row'}}", context! { items => vec![1, 2] })
            .unwrap(),
        "1,2,"
    );
}

#[test]
fn test_render_to_write() {
    let mut env = Environment::new();
    env.add_template("t", "Hello {{ name }}!");
    let mut buf = Vec::new();
    env.render_to_write("t", context! { name => "Peter" }, &mut buf)
        .unwrap();
    assert_eq!(String::from_utf8(buf).unwrap(), "Hello Peter!");
}

#[test]
fn test_renders_are_isolated() {
    let mut env = Environment::new();
    env.add_template("layout", "<{{fill 's'}}>");
    env.add_template("a", "{{extends 'layout'}}{{section 's'}}A{{endsection}}");
    env.add_template("b", "{{extends 'layout'}}");
    assert_eq!(env.render("a").unwrap(), "<A>");
    assert_eq!(env.render("b").unwrap(), "<>");
    assert_eq!(env.render("layout").unwrap(), "<>");
}

#[test]
fn test_concurrent_renders() {
    let mut env = Environment::new();
    env.add_template("layout", "<{{fill 'body'}}>");
    env.add_template(
        "page",
        "{{extends 'layout'}}{{section 'body'}}{{ n }}{{endsection}}",
    );
    let env = &env;
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|n| scope.spawn(move || env.render_with("page", context! { n }).unwrap()))
            .collect();
        for (n, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), format!("<{n}>"));
        }
    });
}

#[test]
fn test_clone() {
    let mut env = Environment::new();
    env.add_template("test", "a");
    let mut env2 = env.clone();
    assert_eq!(env2.render("test").unwrap(), "a");
    env2.add_template("test", "b");
    assert_eq!(env2.render("test").unwrap(), "b");
    assert_eq!(env.render("test").unwrap(), "a");
}

#[test]
fn test_template_removal() {
    let mut env = Environment::new();
    env.add_template("test", "{{ a }}");
    env.remove_template("test");
    assert!(env.render("test").is_err());
    assert!(!env.has_template("test"));
}
