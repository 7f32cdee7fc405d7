use std::path::PathBuf;

use clap::{arg, command, value_parser, ArgAction, Command};

const BEHAVIOR: &str = "Template Behavior";
const ADVANCED: &str = "Advanced";

/// Supported data formats and their file extensions.
pub static SUPPORTED_FORMATS: &[(&str, &str, &[&str])] = &[
    ("json", "JSON", &["json"]),
    ("toml", "TOML", &["toml"]),
    #[cfg(feature = "yaml")]
    ("yaml", "YAML", &["yaml", "yml"]),
];

fn format_formats(s: &str) -> String {
    use std::fmt::Write;
    let mut formats = String::new();

    for (fmt, title, exts) in SUPPORTED_FORMATS.iter() {
        write!(formats, "- {} ({}): ", fmt, title).ok();
        for (idx, ext) in exts.iter().enumerate() {
            if idx > 0 {
                formats.push_str(", ");
            }
            formats.push_str("*.");
            formats.push_str(ext);
        }
        formats.push('\n');
    }

    s.replace("###FORMATS###", &formats)
}

pub(super) fn make_command() -> Command {
    command!()
        .max_term_width(120)
        .args([
            arg!(--config <PATH> "Path to the config file")
                .long_help("\
                    Sets the path to the config file.  By default stencil.toml is loaded from \
                    the current directory if it exists.  Command line flags override the values \
                    of the config file.")
                .value_parser(value_parser!(PathBuf)),
            arg!(-t --templates <DIR> "The directory templates are loaded from")
                .long_help("\
                    The directory templates are loaded from.  Template names (including the ones \
                    used by extends, include, embed and each) are resolved relative to it.  \
                    Defaults to the current directory.")
                .value_parser(value_parser!(PathBuf)),
            arg!(-e --extension <EXT> "Extension appended to template names without one")
                .long_help("\
                    Sets an extension that is appended to template names that do not have one.  \
                    With --extension=tpl the name 'pages/home' loads pages/home.tpl."),
            arg!(-f --format <FORMAT> "The format of the input data")
                .long_help(format_formats("\
                    Sets the format of the input data.\n\n\
                    \
                    The following formats are supported (and the default detected file extensions):\n\n\
                    - auto\n\
                    ###FORMATS###\n\
                    Auto detection (auto) is unavailable when stdin is used as input."))
                .value_parser([
                    "auto",
                    "json",
                    "toml",
                    #[cfg(feature = "yaml")]
                    "yaml",
                ]),
            arg!(-D --define <EXPR> "Defines an input variable (key=value / key:=json_value)")
                .long_help("\
                    This defines an input variable for the template.  This is used in addition \
                    to the input data file and wins over it.  It supports three forms: key defines \
                    a single bool, key=value defines a string value, key:=json_value defines a JSON \
                    value.  It can be supplied multiple times.\n\n\
                    \
                    Examples:\n\
                    -D name=Peter       defines a basic string\n\
                    -D user_id:=42      defines an integer\n\
                    -D is_active        shortform to define true boolean")
                .action(ArgAction::Append),
            arg!(-n --"no-newline" "Do not output a trailing newline")
                .help_heading(BEHAVIOR),
            arg!(--dump <KIND> "Dump internals of a template")
                .long_help("\
                    Dump internals of a template to stdout.\n\n\
                    \
                    'tokens' prints a line per token after lexing, 'ast' prints the parsed syntax \
                    tree and 'instructions' the compiled instructions.  Layouts are not followed \
                    and fill directives compile against an empty session.")
                .value_parser(["instructions", "ast", "tokens"])
                .help_heading(ADVANCED),
            arg!(-v --verbose... "Increase the log verbosity")
                .long_help("\
                    Increases the log verbosity.  Once shows warnings (for instance failed \
                    includes), twice debug output and three times everything.  The STENCIL_LOG \
                    environment variable accepts a full filter directive instead.")
                .action(ArgAction::Count)
                .help_heading(ADVANCED),
            arg!(-o --output <FILENAME> "Path to the output file")
                .long_help("\
                    Path to the output file instead of stdout.  Files are written atomically, if \
                    rendering fails the original file remains.")
                .default_value("-")
                .value_parser(value_parser!(PathBuf)),
            arg!(template: <TEMPLATE> "Name of the template to render"),
            arg!(data: [DATA] "Path to the data file").value_parser(value_parser!(PathBuf)),
        ])
        .about("stencil-cli renders stencil templates from a directory.")
        .after_help("Pass a template name and optionally a file with template variables to render it to stdout.")
}
