//! Concrete source readers for the Builder preprocessor.
//!
//! Three readers cover the include reference grammar: [`LocalReader`] for
//! filesystem paths, [`HttpReader`] for `http(s)://` URLs, and [`GitReader`]
//! for Git repositories - the generic `<repo-url>.git/<path>[@ref]` form and
//! the provider shorthands (`github:`, `git-azure-repos:`, `git-local:`,
//! `bitbucket-server:`).
//!
//! Register them in the order Git, HTTP, Local: the registry picks the first
//! reader whose `supports` matches, and the local reader accepts everything
//! that names no other scheme.

pub mod git;
pub mod http;
pub mod local;

pub use git::GitReader;
pub use http::HttpReader;
pub use local::LocalReader;
