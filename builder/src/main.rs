use std::fs;

use anyhow::{anyhow, Context};
use builder_expr::{
    ast::Expr,
    env::Environment,
    eval::{evaluate, EvalContext},
    parser,
    value::Value,
};
use builder_foundation::diagnostics::Diagnostic;
use builder_preprocessor::{Credentials, DependencyMap, Options, Preprocessor, ReaderRegistry};
use builder_readers::{GitReader, HttpReader, LocalReader};
use camino::Utf8PathBuf;
use clap::Parser;
use tracing::{error, metadata::LevelFilter, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Source-code preprocessor: expands `@`-directives, inline expression
/// splices, macros, and includes drawn from disk, HTTP, or Git.
#[derive(Debug, Parser)]
#[clap(name = "builder", version)]
pub struct Args {
    /// Input source file.
    input: Utf8PathBuf,

    /// Write the result here instead of standard output.
    #[clap(short, long)]
    output: Option<Utf8PathBuf>,

    /// Emit `#line <N> "<file>"` markers so downstream compilers report
    /// errors against the original sources.
    #[clap(short = 'l', long)]
    line_control: bool,

    /// Read each resolved include only once per run.
    #[clap(long)]
    cache: bool,

    /// Drop cached commit lookups before processing.
    #[clap(long)]
    clear_cache: bool,

    /// Resolve relative includes found in remote sources against the remote
    /// prefix instead of the local input directory.
    #[clap(long)]
    remote_relative_includes: bool,

    /// Record the commit every remote include resolves to into FILE.
    #[clap(long, value_name = "FILE")]
    save_dependencies: Option<Utf8PathBuf>,

    /// Pin remote includes to the commits recorded in FILE.
    #[clap(long, value_name = "FILE")]
    use_dependencies: Option<Utf8PathBuf>,

    /// Predefine a global variable, e.g. `-D PLATFORM='"esp32"'`. The value
    /// is parsed as an expression; values that do not parse are taken as
    /// literal strings.
    #[clap(short = 'D', long = "define", value_name = "NAME=VALUE")]
    define: Vec<String>,

    /// Directory for cached Git clones. Defaults to `builder-git-cache`
    /// under the system temporary directory.
    #[clap(long, value_name = "DIR")]
    cache_dir: Option<Utf8PathBuf>,

    /// GitHub username for private repositories.
    #[clap(long, value_name = "USER")]
    github_user: Option<String>,

    /// GitHub token or password for private repositories.
    #[clap(long, value_name = "TOKEN")]
    github_token: Option<String>,

    /// Azure Repos username for private repositories.
    #[clap(long, value_name = "USER")]
    azure_user: Option<String>,

    /// Azure Repos token for private repositories.
    #[clap(long, value_name = "TOKEN")]
    azure_token: Option<String>,

    /// Bitbucket Server address, e.g. `https://stash.example.com`.
    #[clap(long, value_name = "ADDR")]
    bitbucket_server_addr: Option<String>,

    /// Bitbucket Server username.
    #[clap(long, value_name = "USER")]
    bitbucket_server_user: Option<String>,

    /// Bitbucket Server token or password.
    #[clap(long, value_name = "TOKEN")]
    bitbucket_server_token: Option<String>,
}

pub fn fallible_main(args: Args) -> anyhow::Result<()> {
    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("cannot read input file {}", args.input))?;
    let base_path = match args.input.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.as_str(),
        _ => ".",
    };

    let cache_dir = match &args.cache_dir {
        Some(dir) => dir.as_std_path().to_path_buf(),
        None => std::env::temp_dir().join("builder-git-cache"),
    };
    let mut registry = ReaderRegistry::new();
    registry.register(GitReader::new(cache_dir));
    registry.register(HttpReader::new());
    registry.register(LocalReader::new());

    let mut dependencies = DependencyMap::new();
    if let Some(path) = &args.use_dependencies {
        dependencies = DependencyMap::load(path.as_std_path())
            .with_context(|| format!("cannot load dependency file {path}"))?
            .ok_or_else(|| anyhow!("dependency file {path} does not exist"))?;
    } else if let Some(path) = &args.save_dependencies {
        // Saving is a union with the file's prior contents.
        if let Some(existing) = DependencyMap::load(path.as_std_path())
            .with_context(|| format!("cannot load dependency file {path}"))?
        {
            dependencies = existing;
        }
    }

    let options = Options {
        generate_line_control: args.line_control,
        remote_relative_includes: args.remote_relative_includes,
        cache_includes: args.cache,
        clear_cache: args.clear_cache,
        save_dependencies: args.save_dependencies.is_some(),
    };
    let credentials = Credentials {
        github_user: args.github_user.clone(),
        github_token: args.github_token.clone(),
        azure_user: args.azure_user.clone(),
        azure_token: args.azure_token.clone(),
        bitbucket_server_addr: args.bitbucket_server_addr.clone(),
        bitbucket_server_user: args.bitbucket_server_user.clone(),
        bitbucket_server_token: args.bitbucket_server_token.clone(),
    };

    let mut preprocessor = Preprocessor::new(registry)
        .with_options(options)
        .with_credentials(credentials)
        .with_dependencies(dependencies);
    for definition in &args.define {
        let (name, value) = parse_define(definition)?;
        preprocessor.define(name, value);
    }

    let mut diagnostics: Vec<Diagnostic> = vec![];
    let result = preprocessor.execute(&source, args.input.as_str(), base_path, &mut diagnostics);
    for diagnostic in &diagnostics {
        warn!("{diagnostic}");
    }
    let output = result?;

    if let Some(path) = &args.save_dependencies {
        preprocessor
            .dependencies()
            .save(path.as_std_path())
            .with_context(|| format!("cannot save dependency file {path}"))?;
    }

    match &args.output {
        Some(path) => fs::write(path, output)
            .with_context(|| format!("cannot write output file {path}"))?,
        None => print!("{output}"),
    }
    Ok(())
}

/// `NAME=VALUE` for `-D`. The value is evaluated as an expression in an
/// empty environment; anything that fails to parse or evaluate is kept as a
/// plain string, so `-D PLATFORM=esp32` works without inner quotes.
fn parse_define(definition: &str) -> anyhow::Result<(String, Value)> {
    let (name, raw) = definition
        .split_once('=')
        .ok_or_else(|| anyhow!("`-D` expects NAME=VALUE, got `{definition}`"))?;
    let name = name.trim();
    if name.is_empty()
        || !name
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
    {
        return Err(anyhow!("`{name}` is not a valid variable name"));
    }

    let env = Environment::new();
    let ctx = EvalContext {
        env: &env,
        file: "<define>",
        path: ".",
        line: 0,
    };
    let value = match parser::parse(raw) {
        // A bare word would read as an unbound variable; take it literally.
        Ok(Expr::Ident(_)) | Err(_) => Value::String(raw.to_owned()),
        Ok(expr) => evaluate(&expr, &ctx)
            .ok()
            .unwrap_or_else(|| Value::String(raw.to_owned())),
    };
    Ok((name.to_owned(), value))
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .without_time()
            .with_writer(std::io::stderr)
            .with_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::WARN.into())
                    .from_env_lossy(),
            ),
    );
    tracing::subscriber::set_global_default(subscriber)
        .expect("cannot set default tracing subscriber");

    match fallible_main(args) {
        Ok(()) => (),
        Err(error) => {
            error!("{error:#}");
            std::process::exit(1);
        }
    }
}
