//! Soli Ajax CLI: inspect a module configuration.

use std::env;
use std::path::Path;
use std::process;
use std::rc::Rc;

use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use soli_ajax::controller::registry::{absolute_name, CallerScope};
use soli_ajax::{AppConfig, ClassName, ClassTable, Module, NoHooks};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Run the setup pipeline and list the namespaces
    Check { config: String },
    /// Print the absolute name a caller resolves a class name to
    Resolve {
        config: String,
        caller: String,
        name: String,
    },
}

fn print_usage() {
    eprintln!("Soli Ajax {}", VERSION);
    eprintln!();
    eprintln!("Usage: soli-ajax check <config>");
    eprintln!("       soli-ajax resolve <config> <caller> <name>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  check <config>       Load a configuration and list its namespaces");
    eprintln!("  resolve <config> <caller> <name>");
    eprintln!("                       Show the class looked up when <caller> asks for <name>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --help, -h      Show this help message");
    eprintln!("  --version, -V   Show the version");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  soli-ajax check config/ajax.yml");
    eprintln!("  soli-ajax resolve config/ajax.yml App.Ajax.Users .Roles");
    eprintln!();
    eprintln!("Set RUST_LOG=debug to trace the setup pipeline.");
}

fn usage_error(message: &str) -> ! {
    eprintln!("{}", message);
    print_usage();
    process::exit(64);
}

fn parse_args() -> Command {
    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("--help") | Some("-h") => {
            print_usage();
            process::exit(0);
        }
        Some("--version") | Some("-V") => {
            println!("soli-ajax {}", VERSION);
            process::exit(0);
        }
        Some("check") => match &args[1..] {
            [config] => Command::Check {
                config: config.clone(),
            },
            _ => usage_error("check command requires a configuration file"),
        },
        Some("resolve") => match &args[1..] {
            [config, caller, name] => Command::Resolve {
                config: config.clone(),
                caller: caller.clone(),
                name: name.clone(),
            },
            _ => usage_error("resolve command requires <config> <caller> <name>"),
        },
        Some(arg) if arg.starts_with('-') => usage_error(&format!("Unknown option: {}", arg)),
        Some(arg) => usage_error(&format!("Unknown command: {}", arg)),
        None => {
            print_usage();
            process::exit(64);
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn main() {
    init_logging();

    match parse_args() {
        Command::Check { config } => run_check(&config),
        Command::Resolve {
            config,
            caller,
            name,
        } => run_resolve(&config, &caller, &name),
    }
}

fn load_module(path: &str) -> Module<NoHooks> {
    let config = AppConfig::load(Path::new(path)).unwrap_or_else(|e| {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    });

    let mut module = Module::new(Rc::new(ClassTable::new()), config, NoHooks);
    if let Err(e) = module.setup() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }
    module
}

fn run_check(path: &str) {
    let module = load_module(path);
    let registry = module.context().namespaces();

    println!("{}", "Class namespaces".bold());
    if registry.class_count() == 0 {
        println!("  {}", "(none)".dimmed());
    }
    for ns in registry.class_namespaces() {
        println!(
            "  {} -> {} (separator '{}')",
            ns.namespace.green(),
            ns.directory.display(),
            ns.separator.as_char()
        );
        let protected: Vec<&str> = ns.protected.iter().map(String::as_str).collect();
        println!("    protected: {}", protected.join(", ").dimmed());
    }

    println!();
    println!("{}", "View namespaces".bold());
    for ns in registry.view_namespaces() {
        let extension = if ns.extension.is_empty() {
            "-".to_string()
        } else {
            ns.extension.clone()
        };
        println!(
            "  {} -> {} [{}] renderer {}",
            ns.namespace.green(),
            ns.directory.display(),
            extension,
            ns.renderer.cyan()
        );
    }

    println!();
    match registry.default_view_namespace() {
        Some(default) => println!("Default view namespace: {}", default.green()),
        None => println!("Default view namespace: {}", "(none)".yellow()),
    }
}

fn run_resolve(path: &str, caller: &str, name: &str) {
    let module = load_module(path);
    let registry = module.context().namespaces();

    let caller = ClassName::new(caller);
    let namespace = registry.namespace_of(&caller);
    let scope = CallerScope {
        class: &caller,
        namespace: namespace.map(|ns| ns.namespace.as_str()),
    };
    let absolute = absolute_name(name, Some(scope));

    match namespace {
        Some(ns) => println!("caller {} in namespace {}", caller, ns.namespace.green()),
        None => println!("caller {} {}", caller, "(no namespace)".yellow()),
    }
    println!("{} -> {}", name, absolute.as_str().bold());

    match registry.namespace_of(&absolute) {
        Some(ns) => println!(
            "  in namespace {} ({})",
            ns.namespace.green(),
            ns.directory.display()
        ),
        None => println!("  {}", "outside every configured namespace".yellow()),
    }
}
