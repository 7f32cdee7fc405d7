use similar_asserts::assert_eq;

use stencil::value::Value;
use stencil::{context, Environment};

fn render(source: &str, ctx: Value) -> String {
    Environment::new().render_str(source, ctx).unwrap()
}

#[test]
fn test_default() {
    let tmpl = "{{ x|default:'X' }}";
    assert_eq!(render(tmpl, context! {}), "X");
    assert_eq!(render(tmpl, context! { x => () }), "X");
    assert_eq!(render(tmpl, context! { x => 0 }), "0");
    assert_eq!(render(tmpl, context! { x => "" }), "");
    assert_eq!(render(tmpl, context! { x => false }), "false");
    assert_eq!(render(tmpl, context! { x => "set" }), "set");
}

#[test]
fn test_default_on_paths() {
    assert_eq!(
        render(
            "{{ user.name|default:'anonymous' }}",
            context! { user => context! {} }
        ),
        "anonymous"
    );
    assert_eq!(render("{{ a.b.c|default:42 }}", context! {}), "42");
}

#[test]
fn test_chaining() {
    assert_eq!(
        render("{{ name|upper|truncate:'3' }}", context! { name => "hello" }),
        "HEL"
    );
    assert_eq!(
        render("{{ name|truncate:3|upper }}", context! { name => "hello" }),
        "HEL"
    );
    assert_eq!(
        render("{{ name|default:'guest'|capitalize }}", context! {}),
        "Guest"
    );
}

#[test]
fn test_unknown_filter_passes_through() {
    assert_eq!(
        render("{{ name|nonexistent|upper }}", context! { name => "hi" }),
        "HI"
    );
    assert_eq!(render("[{{ missing|nonexistent }}]", context! {}), "[]");
}

#[test]
fn test_case_filters() {
    let ctx = context! { s => "hello big world" };
    assert_eq!(render("{{ s|upper }}", ctx.clone()), "HELLO BIG WORLD");
    assert_eq!(render("{{ s|capitalize }}", ctx.clone()), "Hello big world");
    assert_eq!(render("{{ s|title }}", ctx.clone()), "Hello Big World");
    assert_eq!(render("{{ s|camel }}", ctx.clone()), "helloBigWorld");
    assert_eq!(render("{{ s|pascal }}", ctx.clone()), "HelloBigWorld");
    assert_eq!(render("{{ s|snake }}", ctx.clone()), "hello_big_world");
    assert_eq!(render("{{ s|kebab }}", ctx), "hello-big-world");
    assert_eq!(
        render("{{ s|lower }}|{{ s|lcfirst }}", context! { s => "ABC" }),
        "abc|aBC"
    );
}

#[test]
fn test_slugify() {
    assert_eq!(
        render("{{ t|slugify }}", context! { t => "Hello, World!" }),
        "hello-world"
    );
}

#[test]
fn test_text_filters() {
    assert_eq!(
        render("[{{ s|trim }}]", context! { s => "  padded  " }),
        "[padded]"
    );
    assert_eq!(
        render("[{{ s|squish }}]", context! { s => "  a \n\t b  c " }),
        "[a b c]"
    );
    assert_eq!(
        render("{{ s|limit_words:2 }}", context! { s => "one two three" }),
        "one two"
    );
    assert_eq!(
        render("{{ s|nl2br }}", context! { s => "a\nb" }),
        "a<br>\nb"
    );
    assert_eq!(
        render("{{ s|striptags }}", context! { s => "<b>bold</b> text" }),
        "bold text"
    );
    assert_eq!(render("{{ s|rot13 }}", context! { s => "Hello" }), "Uryyb");
    assert_eq!(render("{{ s|reverse }}", context! { s => "abc" }), "cba");
}

#[test]
fn test_escape() {
    let ctx = context! { s => "<a href=\"x\">Tom & 'Jerry'</a>" };
    let expected = "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;";
    assert_eq!(render("{{ s|escape }}", ctx.clone()), expected);
    assert_eq!(render("{{ s|e }}", ctx), expected);
}

#[test]
fn test_sequence_filters() {
    let ctx = context! { items => vec!["a", "b", "c"] };
    assert_eq!(render("{{ items|join:', ' }}", ctx.clone()), "a, b, c");
    assert_eq!(render("{{ items|join }}", ctx.clone()), "abc");
    assert_eq!(render("{{ items|length }}", ctx.clone()), "3");
    assert_eq!(render("{{ items|count }}", ctx.clone()), "3");
    assert_eq!(
        render("{{ items|first }}{{ items|last }}", ctx.clone()),
        "ac"
    );
    assert_eq!(render("{{ items|reverse|join }}", ctx), "cba");
    assert_eq!(render("{{ missing|length }}", context! {}), "0");
}

#[test]
fn test_filters_skip_unusable_input() {
    assert_eq!(render("{{ n|upper }}", context! { n => 42 }), "42");
    assert_eq!(
        render("{{ s|truncate:'many' }}", context! { s => "hello" }),
        "hello"
    );
    assert_eq!(render("{{ s|truncate }}", context! { s => "hello" }), "hello");
    assert_eq!(
        render("{{ items|upper|join:'-' }}", context! { items => vec![1, 2] }),
        "1-2"
    );
}

#[test]
fn test_filters_in_conditions() {
    assert_eq!(
        render(
            "{{if items|length > 2}}many{{else}}few{{endif}}",
            context! { items => vec![1, 2, 3] }
        ),
        "many"
    );
    assert_eq!(
        render(
            "{{if name|lower == 'ada'}}yes{{endif}}",
            context! { name => "ADA" }
        ),
        "yes"
    );
}

#[cfg(feature = "json")]
#[test]
fn test_json() {
    assert_eq!(
        render(
            "{{ data|json }}",
            context! { data => context! { a => 1, b => vec![true] } }
        ),
        r#"{"a":1,"b":[true]}"#
    );
}

#[cfg(feature = "urlencode")]
#[test]
fn test_urlencode() {
    assert_eq!(
        render("{{ q|urlencode }}", context! { q => "a b/c&d.e" }),
        "a%20b/c%26d.e"
    );
}

#[test]
fn test_custom_filters() {
    fn shout(value: String) -> String {
        format!("{}!", value.to_uppercase())
    }

    fn repeat(value: String, times: usize) -> String {
        value.repeat(times)
    }

    let mut env = Environment::new();
    env.add_filter("shout", shout);
    env.add_filter("repeat", repeat);
    env.register("wrap", |value: String, with: Option<String>| {
        let with = with.unwrap_or_else(|| "*".into());
        format!("{with}{value}{with}")
    });
    let ctx = context! { word => "hey" };
    assert_eq!(
        env.render_str(
            "{{ word|shout }} {{ word|repeat:2 }} {{ word|wrap }} {{ word|wrap:'_' }}",
            ctx
        )
        .unwrap(),
        "HEY! heyhey *hey* _hey_"
    );
}

#[test]
fn test_custom_filters_shadow_builtins() {
    let mut env = Environment::new();
    env.add_filter("upper", |value: String| format!("<{value}>"));
    assert_eq!(
        env.render_str("{{ s|upper }}", context! { s => "x" }).unwrap(),
        "<x>"
    );
    env.remove_filter("upper");
    assert_eq!(
        env.render_str("{{ s|upper }}", context! { s => "x" }).unwrap(),
        "X"
    );
}

#[test]
fn test_custom_filter_on_values() {
    let mut env = Environment::new();
    env.add_filter("kind", |value: Value| value.kind().to_string());
    assert_eq!(
        env.render_str(
            "{{ a|kind }} {{ b|kind }} {{ c|kind }} {{ d|kind }}",
            context! { a => 1, b => "s", c => vec![1] }
        )
        .unwrap(),
        "number string sequence undefined"
    );
}

#[test]
fn test_default_is_reserved() {
    let mut env = Environment::new();
    env.add_filter("default", |_: Value| "overridden");
    assert_eq!(
        env.render_str("{{ x|default:'fallback' }}", context! {})
            .unwrap(),
        "fallback"
    );
}
