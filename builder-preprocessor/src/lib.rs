//! The Builder preprocessor driver.
//!
//! This crate owns the state machine that consumes input lines, dispatches
//! directives, runs conditionals, expands macros, splices inline expressions,
//! recurses into includes, and emits output - optionally annotated with
//! `#line` markers so downstream compilers can report errors against the
//! original sources.
//!
//! Concrete source readers (filesystem, HTTP, Git) live in
//! `builder-readers`; this crate only defines the [`reader::Reader`]
//! contract it requires and routes include references through a
//! [`reader::ReaderRegistry`].

pub mod dependencies;
pub mod driver;
pub mod include;
pub mod macros;
pub mod output;
pub mod reader;

pub use dependencies::DependencyMap;
pub use driver::{Options, Preprocessor};
pub use reader::{Credentials, PathMeta, ReadContext, ReadResult, Reader, ReaderRegistry};
