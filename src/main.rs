use clap::Parser;
use comfy_table::{presets::UTF8_FULL, Cell, Table as ComfyTable};
use flatsql::config::EngineConfig;
use flatsql::storage::FileFormat;
use flatsql::{Database, QueryResult};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// flatsql shell
#[derive(Parser, Debug)]
#[command(name = "flatsql")]
#[command(about = "Run SQL against a flat-file storage root", long_about = None)]
struct Args {
    /// Statement to execute; may be repeated. Without it an interactive shell starts.
    #[arg(short = 'e', long = "execute")]
    execute: Vec<String>,

    /// Storage root (overrides the configuration)
    #[arg(short = 'd', long)]
    data_dir: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Physical file format
    #[arg(short = 'f', long, value_parser = ["json", "binary"])]
    format: Option<String>,
}

fn format_result(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return format!("Query OK, {} rows affected\n", result.affected_rows);
    }
    if result.rows.is_empty() {
        return "Empty set\n".to_string();
    }

    let mut table = ComfyTable::new();
    table.load_preset(UTF8_FULL);
    table.set_header(result.columns.iter().map(Cell::new));
    for row in &result.rows {
        table.add_row(result.columns.iter().map(|column| {
            Cell::new(row.get(column).map_or_else(|| "NULL".to_string(), ToString::to_string))
        }));
    }
    format!("{table}\n({} rows)\n", result.rows.len())
}

fn run(db: &mut Database, sql: &str) {
    match db.execute(sql) {
        Ok(result) => print!("{}", format_result(&result)),
        Err(e) => eprintln!("ERROR ({:?}): {e}", e.kind()),
    }
}

fn shell(db: &mut Database) -> Result<(), Box<dyn std::error::Error>> {
    let mut rl = DefaultEditor::new()?;
    let history_file = dirs::home_dir().map(|mut p| {
        p.push(".flatsql_history");
        p
    });
    if let Some(path) = &history_file {
        let _ = rl.load_history(path);
    }

    println!("flatsql {} - statements end with ';', 'quit' to exit.", env!("CARGO_PKG_VERSION"));
    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { "flatsql> " } else { "      -> " };
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if buffer.is_empty() && matches!(line.to_ascii_lowercase().as_str(), "quit" | "exit" | "\\q") {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                if !buffer.is_empty() {
                    buffer.push(' ');
                }
                buffer.push_str(line);
                if buffer.ends_with(';') {
                    let _ = rl.add_history_entry(buffer.as_str());
                    run(db, &buffer);
                    buffer.clear();
                }
            }
            Err(ReadlineError::Interrupted) => buffer.clear(),
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }

    if let Some(path) = &history_file {
        let _ = rl.save_history(path);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = EngineConfig::load(args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(format) = args.format.as_deref() {
        config.format = if format == "binary" { FileFormat::Binary } else { FileFormat::Json };
    }

    let mut db = Database::open(config)?;
    if args.execute.is_empty() {
        shell(&mut db)?;
    } else {
        for sql in &args.execute {
            run(&mut db, sql);
        }
    }
    db.flush()?;
    Ok(())
}
