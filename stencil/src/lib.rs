//! Stencil is a small template engine built around directives, layouts and
//! partials.
//!
//! Templates are plain text with `{{ ... }}` tags.  A tag either outputs an
//! expression or is one of a handful of directives:
//!
//! ```text
//! {{extends 'layout'}}
//! {{section 'body'}}
//!   {{if user.active}}Welcome back, {{ user.name|capitalize }}!{{else}}Hello stranger{{endif}}
//!   <ul>{{each item in items using 'partials/row'}}</ul>
//!   {{include 'partials/footer'}}
//!   {{embed 'partials/card' with ['title' => page.title]}}
//! {{endsection}}
//! ```
//!
//! # Template Usage
//!
//! To render templates create an [`Environment`], add templates (or point
//! it to a [`TemplateStore`]) and render by name.  Any `serde` serializable
//! value can be used as context and the [`context!`] macro builds one
//! quickly:
//!
//! ```
//! use stencil::{context, Environment};
//!
//! let mut env = Environment::new();
//! env.add_template("hello", "Hello {{ name|default:'World' }}!");
//! assert_eq!(env.render("hello").unwrap(), "Hello World!");
//! assert_eq!(
//!     env.render_with("hello", context! { name => "John" }).unwrap(),
//!     "Hello John!"
//! );
//! ```
//!
//! # Layouts and Sections
//!
//! A template that `extends` a layout is rendered in two phases.  First the
//! template itself runs and its `section` blocks are captured while its
//! other output is thrown away.  Then the layout runs and every `fill`
//! inserts the captured section of that name, or nothing if there is none.
//! Layouts can extend other layouts.  The first capture of a section name
//! wins, so sections of a content template override the defaults of the
//! layouts above it.
//!
//! ```
//! # use stencil::Environment;
//! let mut env = Environment::new();
//! env.add_template("layout", "<title>{{fill 'title'}}</title>");
//! env.add_template("page", "{{extends 'layout'}}{{section 'title'}}Home{{endsection}}");
//! assert_eq!(env.render("page").unwrap(), "<title>Home</title>");
//! ```
//!
//! Layout and section bookkeeping lives in a [`RenderSession`] that exists
//! for a single render call, so concurrent renders never see each other's
//! sections.
//!
//! # Missing Values and Errors
//!
//! Looking up something that does not exist never fails; it produces an
//! undefined value which renders as empty text and is false in conditions.
//! Unknown filters leave the value unchanged.  A failing `include` or
//! `embed` is replaced by a short marker in the output and the rest of the
//! template renders normally.  Everything else (missing templates, syntax
//! errors, failures inside `each` partials) fails the render with an
//! [`Error`].
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::needless_borrowed_reference)]
#![warn(missing_docs)]

#[macro_use]
mod macros;

mod compiler;
mod defaults;
mod environment;
mod error;
mod output;
mod session;
mod store;
mod template;
mod utils;
mod vm;

pub mod filters;
pub mod value;

pub use self::environment::Environment;
pub use self::error::{Error, ErrorKind};
pub use self::session::{CapturedSection, RenderSession};
pub use self::store::{safe_join, FileSystemStore, MemoryStore, TemplateStore};
pub use self::template::CompiledTemplate;

/// Re-export for convenience.
pub use self::value::Value;

#[doc(hidden)]
pub use self::macros::__context;

/// This module gives access to the low level machinery.
///
/// This module is only provided by the `unstable_machinery` feature and does
/// not have a stable interface.  It mostly exists for debugging tools such
/// as the `--dump` option of the command line interface.
#[cfg(feature = "unstable_machinery")]
pub mod machinery {
    #![allow(missing_docs)]
    pub use crate::compiler::ast;
    pub use crate::compiler::instructions::{Instruction, Instructions};
    pub use crate::compiler::lexer::{tokenize, Tokenizer};
    pub use crate::compiler::parser::parse;
    pub use crate::compiler::tokens::{Span, Token};
}
