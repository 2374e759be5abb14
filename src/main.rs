//! Purpose: `stubjar` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs commands, prints results on stdout.
//! Invariants: Diagnostics go to stderr; non-interactive errors are emitted as JSON.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All pipeline work goes through `api::minify` and the api types.

use std::fs;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use stubjar::api::{
    minify, to_exit_code, ClasspathIndex, Error, ErrorKind, MinifyRequest, RootSig,
    parse_root, parse_roots_file,
};

#[cfg(windows)]
const PATH_SEP: char = ';';
#[cfg(not(windows))]
const PATH_SEP: char = ':';

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `stubjar --help`."));
            }
        },
    };

    init_tracing(cli.quiet);
    match cli.command {
        Command::Minify(args) => run_minify(args),
        Command::List(args) => run_list(args),
        Command::CheckRoots(args) => run_check_roots(args),
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "stubjar", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
    }
}

#[derive(Parser)]
#[command(
    name = "stubjar",
    version,
    about = "Minimal compile-only stub jars from JVM classpaths",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Give it a classpath and a set of root signatures; it walks every
declaration the roots reach and writes a jar of stub classes whose
method bodies are trivial. The result compiles against, but does not run.
"#,
    after_help = r#"EXAMPLES
  $ stubjar minify --cp lib/gson.jar --root 'com/google/gson/Gson' -o gson-stub.jar
  $ stubjar minify --cp 'a.jar:b.jar' --roots roots.txt -o stub.jar --report report.json
  $ stubjar list --cp lib/gson.jar
  $ stubjar check-roots --cp lib/gson.jar --roots roots.txt

LEARN MORE
  $ stubjar <command> --help"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(long, global = true, help = "Only log errors")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ClasspathArgs {
    #[arg(
        long = "cp",
        required = true,
        help = "Classpath entry (jar or class directory); repeatable, accepts path-separator lists",
        value_hint = ValueHint::AnyPath
    )]
    cp: Vec<String>,
}

#[derive(Args)]
struct RootArgs {
    #[arg(long, help = "File of root signatures, one per line", value_hint = ValueHint::FilePath)]
    roots: Option<PathBuf>,
    #[arg(
        long = "root",
        help = "Inline root signature: `pkg/Class`, `pkg/Class#field`, or `pkg/Class#method(desc)ret`"
    )]
    root: Vec<String>,
}

#[derive(Args)]
struct MinifyArgs {
    #[command(flatten)]
    classpath: ClasspathArgs,
    #[command(flatten)]
    roots: RootArgs,
    #[arg(short, long, help = "Output jar path", value_hint = ValueHint::FilePath)]
    output: PathBuf,
    #[arg(long, help = "Write a JSON report next to the jar", value_hint = ValueHint::FilePath)]
    report: Option<PathBuf>,
    #[arg(long, help = "Keep Kotlin @Metadata even when members were dropped")]
    keep_kotlin_metadata: bool,
}

#[derive(Args)]
struct ListArgs {
    #[command(flatten)]
    classpath: ClasspathArgs,
    #[arg(long, help = "Print per-entry summaries as JSON instead of class names")]
    json: bool,
}

#[derive(Args)]
struct CheckRootsArgs {
    #[command(flatten)]
    classpath: ClasspathArgs,
    #[command(flatten)]
    roots: RootArgs,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Write a stub jar for everything the roots reach",
        after_help = r#"EXAMPLES
  $ stubjar minify --cp lib/gson.jar --root 'com/google/gson/Gson' -o gson-stub.jar

NOTES
  - Roots reference classes by internal name (slashes, not dots)
  - Classes the closure reaches but the classpath lacks (JDK types) are
    reported as missing and left for the consumer's platform"#
    )]
    Minify(MinifyArgs),
    #[command(about = "List the classes a classpath provides")]
    List(ListArgs),
    #[command(
        about = "Verify every root resolves on the classpath",
        after_help = "Exits 3 when any root is unresolved."
    )]
    CheckRoots(CheckRootsArgs),
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn run_minify(args: MinifyArgs) -> Result<RunOutcome, Error> {
    let request = MinifyRequest {
        classpath: split_classpath(&args.classpath.cp),
        roots: gather_roots(&args.roots)?,
        output: args.output,
        keep_kotlin_metadata: args.keep_kotlin_metadata,
    };
    let report = minify(&request)?;

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode report")
                .with_source(err)
        })?;
        fs::write(path, json).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write report")
                .with_path(path)
                .with_source(err)
        })?;
    }

    println!(
        "Wrote {} ({} classes, {} missing, {} bytes)",
        report.output.display(),
        report.emit.classes_emitted,
        report.emit.missing.len(),
        report.emit.output_bytes
    );
    Ok(RunOutcome::ok())
}

fn run_list(args: ListArgs) -> Result<RunOutcome, Error> {
    let index = ClasspathIndex::open(&split_classpath(&args.classpath.cp))?;
    if args.json {
        let names: Vec<&str> = index.class_names().collect();
        let json = serde_json::to_string_pretty(&names).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode class names")
                .with_source(err)
        })?;
        println!("{json}");
    } else {
        for name in index.class_names() {
            println!("{name}");
        }
    }
    Ok(RunOutcome::ok())
}

fn run_check_roots(args: CheckRootsArgs) -> Result<RunOutcome, Error> {
    let roots = gather_roots(&args.roots)?;
    let index = ClasspathIndex::open(&split_classpath(&args.classpath.cp))?;

    let mut unresolved = Vec::new();
    for root in &roots {
        if let Some(problem) = resolve_problem(&index, root)? {
            unresolved.push(problem);
        }
    }
    if unresolved.is_empty() {
        println!("All {} root(s) resolved", roots.len());
        return Ok(RunOutcome::ok());
    }
    for problem in &unresolved {
        println!("unresolved: {problem}");
    }
    Err(Error::new(ErrorKind::NotFound)
        .with_message(format!("{} of {} root(s) unresolved", unresolved.len(), roots.len()))
        .with_hint("Roots use internal names, e.g. `com/google/gson/Gson`."))
}

/// `Ok(Some(..))` describes why the root does not resolve.
fn resolve_problem(index: &ClasspathIndex, root: &RootSig) -> Result<Option<String>, Error> {
    let owner = root.owner();
    let Some(class) = index.read_class(owner)? else {
        return Ok(Some(owner.to_string()));
    };
    let problem = match root {
        RootSig::Class { .. } => None,
        RootSig::Field { name, .. } => class
            .find_field(name)
            .is_none()
            .then(|| format!("{owner}#{name}")),
        RootSig::Method { name, desc, .. } => class
            .find_method(name, desc)
            .is_none()
            .then(|| format!("{owner}#{name}{desc}")),
    };
    Ok(problem)
}

fn gather_roots(args: &RootArgs) -> Result<Vec<RootSig>, Error> {
    let mut roots = Vec::new();
    if let Some(path) = &args.roots {
        roots.extend(parse_roots_file(path)?);
    }
    for line in &args.root {
        if let Some(root) = parse_root(line)? {
            roots.push(root);
        }
    }
    if roots.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("no root signatures given")
            .with_hint("Pass --roots FILE or --root SIG (repeatable)."));
    }
    Ok(roots)
}

/// Each --cp value may itself be a platform path-separator list, javac-style.
fn split_classpath(values: &[String]) -> Vec<PathBuf> {
    values
        .iter()
        .flat_map(|value| value.split(PATH_SEP))
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "error" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("error: {err}");
        if let Some(hint) = err.hint() {
            eprintln!("hint: {hint}");
        }
        return;
    }
    let value = json!({
        "error": {
            "kind": format!("{:?}", err.kind()),
            "message": err.to_string(),
            "hint": err.hint(),
        }
    });
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::split_classpath;
    use std::path::PathBuf;

    #[test]
    fn classpath_values_split_on_the_platform_separator() {
        let joined = format!("a.jar{}b{}", super::PATH_SEP, super::PATH_SEP);
        let paths = split_classpath(&[joined, "c".to_string()]);
        assert_eq!(
            paths,
            [PathBuf::from("a.jar"), PathBuf::from("b"), PathBuf::from("c")]
        );
    }
}
