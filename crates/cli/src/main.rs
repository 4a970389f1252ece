//! pyscope CLI: code structure graphs for Python projects.
//!
//! Calls `pyscope-core` directly; every invocation runs one fresh analysis.

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use pyscope_core::{
    analyze, layout::project_key, layout_store, load_config, Analysis, AnalysisConfig, DiffSource,
    DiffStatus, Error, LayoutStore, Positions,
};

/// pyscope: build and query code structure graphs for Python projects.
#[derive(Parser)]
#[command(name = "pyscope", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Log pipeline stages to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Args, Clone)]
struct ProjectArgs {
    /// Project root (default: current directory)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Overlay the working-tree diff against this git revision
    #[arg(long, conflicts_with = "diff_file")]
    diff: Option<String>,

    /// Overlay a pre-computed unified diff instead of asking git
    #[arg(long)]
    diff_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the code graph as JSON
    Graph {
        #[command(flatten)]
        project: ProjectArgs,

        /// Restrict to one module and its direct neighbours
        #[arg(long)]
        module: Option<String>,

        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Find nodes by label or qualified name (case-insensitive substring)
    Search {
        /// Search query
        query: String,

        /// Project root (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Maximum number of results
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Print the source of one node
    Source {
        /// Node id, e.g. `function:pkg.mod.run`
        id: String,

        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Show analysis summary: files, nodes, edges, parse errors, diff state
    Status {
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Manage saved node layouts
    Layout {
        #[command(subcommand)]
        action: LayoutAction,

        /// Project root (default: current directory)
        #[arg(long, global = true)]
        root: Option<PathBuf>,

        /// Directory holding layout files (default: cache directory)
        #[arg(long, global = true)]
        layout_dir: Option<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum LayoutAction {
    /// Print the saved layout, if any
    Show,
    /// Save positions from a JSON file (`{"<node id>": {"x": 0.0, "y": 0.0}}`)
    Save {
        file: PathBuf,
    },
    /// Delete the saved layout
    Clear,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fail(err: Error) -> ! {
    eprintln!("Error: {err}");
    let code = if matches!(err, Error::InvariantViolation(_)) { 2 } else { 1 };
    std::process::exit(code);
}

fn resolve_root(root: Option<PathBuf>) -> PathBuf {
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir().unwrap_or_else(|e| fail(Error::Io(e))),
    };
    root.canonicalize().unwrap_or_else(|_| fail(Error::RootNotFound(root)))
}

fn config_for(project: &ProjectArgs) -> AnalysisConfig {
    let root = resolve_root(project.root.clone());
    let mut config = load_config(&root);
    if let Some(rev) = &project.diff {
        config.diff = Some(DiffSource::Baseline(rev.clone()));
    }
    if let Some(path) = &project.diff_file {
        config.diff = Some(DiffSource::File(path.clone()));
    }
    tracing::debug!(root = %config.root.display(), diff = ?config.diff, "Resolved configuration");
    config
}

fn run(config: &AnalysisConfig) -> Analysis {
    analyze(config).unwrap_or_else(|e| fail(e))
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) {
    let out = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match out {
        Ok(s) => println!("{s}"),
        Err(e) => fail(Error::Json(e)),
    }
}

fn describe_diff(status: &DiffStatus) -> String {
    match status {
        DiffStatus::Disabled => "disabled".to_string(),
        DiffStatus::Applied { files } => format!("applied ({files} changed files)"),
        DiffStatus::Unavailable(reason) => format!("unavailable: {reason}"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();

    let directive = if cli.verbose { "pyscope=debug" } else { "pyscope=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().unwrap()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Graph { project, module, pretty } => {
            let mut config = config_for(&project);
            config.module_focus = module;
            let analysis = run(&config);
            print_json(analysis.get_graph(), pretty);
        }
        Commands::Search { query, root, limit } => {
            let root = resolve_root(root);
            let analysis = run(&load_config(&root));
            let results = analysis.search(&query, Some(limit));

            if cli.json {
                print_json(&results, true);
            } else {
                if results.is_empty() {
                    eprintln!("No results for '{query}'");
                    std::process::exit(1);
                }
                for r in &results {
                    println!(
                        "{:<9} {:<60} {}:{}",
                        r.kind.label(),
                        r.qualified_name,
                        r.path,
                        r.line_start
                    );
                }
                eprintln!("\n{} results", results.len());
            }
        }
        Commands::Source { id, project } => {
            let analysis = run(&config_for(&project));
            let view = analysis.get_source(&id).unwrap_or_else(|e| fail(e));

            if cli.json {
                print_json(&view, true);
            } else {
                println!("# {}:{}-{}", view.path, view.line_start, view.line_end);
                for (i, line) in view.text.lines().enumerate() {
                    println!("{:>5} | {}", view.line_start + i, line);
                }
                if let Some(excerpt) = &view.diff_excerpt {
                    println!("\n# diff");
                    print!("{excerpt}");
                }
            }
        }
        Commands::Status { project } => {
            let analysis = run(&config_for(&project));
            let status = analysis.status();

            if cli.json {
                print_json(&status, true);
            } else {
                println!("Root:          {}", status.root);
                println!("Files:         {} scanned, {} analysed", status.files_scanned, status.files_analyzed);
                let nodes: Vec<String> =
                    status.nodes.iter().map(|(k, n)| format!("{} {}", n, k.label())).collect();
                println!("Nodes:         {}", nodes.join(", "));
                let edges: Vec<String> =
                    status.edges.iter().map(|(k, n)| format!("{} {}", n, k.label())).collect();
                println!("Edges:         {}", edges.join(", "));
                println!("Diff overlay:  {}", describe_diff(&status.diff));
                if !status.parse_errors.is_empty() {
                    println!("\n{} files failed to parse:", status.parse_errors.len());
                    for err in &status.parse_errors {
                        match err.line {
                            Some(line) => println!("  {}:{}: {}", err.path, line, err.message),
                            None => println!("  {}: {}", err.path, err.message),
                        }
                    }
                }
            }
        }
        Commands::Layout { action, root, layout_dir } => {
            let root = resolve_root(root);
            let mut config = load_config(&root);
            if layout_dir.is_some() {
                config.layout_dir = layout_dir;
            }
            let store = layout_store(&config).unwrap_or_else(|e| fail(e));
            let key = project_key(&root);

            match action {
                LayoutAction::Show => match store.load_layout(&key).unwrap_or_else(|e| fail(e)) {
                    Some(positions) => print_json(&positions, true),
                    None => {
                        eprintln!("No saved layout for {}", root.display());
                        std::process::exit(1);
                    }
                },
                LayoutAction::Save { file } => {
                    let content = std::fs::read_to_string(&file).unwrap_or_else(|e| fail(Error::Io(e)));
                    let positions: Positions =
                        serde_json::from_str(&content).unwrap_or_else(|e| fail(Error::Json(e)));
                    store.save_layout(&key, &positions).unwrap_or_else(|e| fail(e));
                    if cli.json {
                        print_json(&serde_json::json!({ "project_key": key, "nodes": positions.len() }), true);
                    } else {
                        println!("Saved {} positions for {}", positions.len(), root.display());
                    }
                }
                LayoutAction::Clear => {
                    let existed = store.clear_layout(&key).unwrap_or_else(|e| fail(e));
                    if cli.json {
                        print_json(&serde_json::json!({ "project_key": key, "cleared": existed }), true);
                    } else if existed {
                        println!("Cleared saved layout for {}", root.display());
                    } else {
                        println!("No saved layout for {}", root.display());
                    }
                }
            }
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "pyscope", &mut std::io::stdout());
        }
    }
}
