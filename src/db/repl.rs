//! Interactive shell over a [`Database`].

use std::io::{self, BufRead, Write};

use super::api::{Database, DatabaseResult};
use crate::executor::{QueryResult, ResultSet};
use crate::staging::TableDelta;

#[derive(Debug, Clone)]
pub struct ReplConfig {
    pub prompt: String,
    /// print elapsed time after each statement
    pub timing: bool,
    /// rows shown before output is truncated
    pub max_rows: usize,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            prompt: "verdb> ".into(),
            timing: false,
            max_rows: 100,
        }
    }
}

pub struct Repl {
    db: Database,
    config: ReplConfig,
}

impl Repl {
    pub fn new(db: Database) -> Self {
        Self::with_config(db, ReplConfig::default())
    }

    pub fn with_config(db: Database, config: ReplConfig) -> Self {
        Self { db, config }
    }

    /// Read statements until EOF or `.quit`. SQL runs once a line ends
    /// with `;`, dot commands run immediately.
    pub fn run(&mut self) -> DatabaseResult<()> {
        println!("verdb shell on '{}'. Type .help for commands.", self.db.name());

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut input = String::new();

        loop {
            let prompt = if input.is_empty() { self.config.prompt.as_str() } else { "    -> " };
            print!("{}", prompt);
            stdout.flush().ok();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Error: {}", e);
                    break;
                }
            }
            let line = line.trim_end();

            if input.is_empty() && is_command(line) {
                match self.handle_command(line) {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => eprintln!("Error: {}", e),
                }
                continue;
            }
            if line.is_empty() && input.is_empty() {
                continue;
            }

            if !input.is_empty() {
                input.push(' ');
            }
            input.push_str(line);
            if !input.ends_with(';') {
                continue;
            }

            let sql = std::mem::take(&mut input);
            let start = std::time::Instant::now();
            match self.db.execute_batch(&sql) {
                Ok(results) => {
                    for result in &results {
                        self.print_result(result);
                    }
                    if self.config.timing {
                        println!("Time: {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);
                    }
                }
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Ok(())
    }

    /// Returns true when the shell should exit.
    fn handle_command(&mut self, cmd: &str) -> DatabaseResult<bool> {
        let cmd = cmd.trim_start_matches(['.', '\\']);
        let parts: Vec<&str> = cmd.split_whitespace().collect();
        let command = parts.first().map(|s| s.to_lowercase());

        match command.as_deref() {
            Some("help") | Some("h") | Some("?") => print_help(),
            Some("quit") | Some("exit") | Some("q") => return Ok(true),
            Some("tables") | Some("dt") => {
                let tables = self.db.tables()?;
                if tables.is_empty() {
                    println!("No tables found.");
                }
                for table in tables {
                    println!("  {}", table);
                }
            }
            Some("schema") | Some("d") => match parts.get(1) {
                Some(table) => match self.db.table_schema(table)? {
                    Some(schema) => {
                        println!("Table: {}", table);
                        for column in &schema.columns {
                            let marker = if *column == schema.primary_key { " (primary key)" } else { "" };
                            println!("  {}{}", column, marker);
                        }
                    }
                    None => println!("Table '{}' not found.", table),
                },
                None => eprintln!("Usage: .schema <table_name>"),
            },
            Some("status") => {
                let status = self.db.status()?;
                if status.is_clean() {
                    println!("nothing to commit, working root clean");
                }
                print_deltas("Changes to be committed:", &status.staged);
                print_deltas("Changes not staged for commit:", &status.unstaged);
            }
            Some("log") => {
                for commit in self.db.log(Some(10))? {
                    println!("{} {}", commit.id.short(), commit.summary());
                }
            }
            Some("timing") => {
                self.config.timing = !self.config.timing;
                println!("Timing: {}", if self.config.timing { "on" } else { "off" });
            }
            Some(other) => {
                eprintln!("Unknown command: .{}", other);
                eprintln!("Type .help for available commands");
            }
            None => {}
        }

        Ok(false)
    }

    fn print_result(&self, result: &QueryResult) {
        match result {
            QueryResult::Select(rs) => print_result_set(rs, self.config.max_rows),
            other => print!("{}", other),
        }
    }
}

fn is_command(input: &str) -> bool {
    input.starts_with('.') || input.starts_with('\\')
}

fn print_help() {
    println!("Commands:");
    println!("  .help                   Show this help message");
    println!("  .quit                   Exit the shell");
    println!("  .tables                 List tables of the working root");
    println!("  .schema <table>         Show a table's columns");
    println!("  .status                 Show staged and unstaged tables");
    println!("  .log                    Show recent commits");
    println!("  .timing                 Toggle timing display");
    println!();
    println!("Statements end with ';'.");
}

fn print_deltas(title: &str, deltas: &[TableDelta]) {
    if deltas.is_empty() {
        return;
    }
    println!("{}", title);
    for delta in deltas {
        println!("  {}\t{}", delta.kind.label(), delta.name);
    }
}

/// Render rows as an aligned table.
fn format_result_set(rs: &ResultSet, max_rows: usize) -> String {
    let shown = rs.len().min(max_rows);
    let cells: Vec<Vec<String>> = rs
        .rows
        .iter()
        .take(shown)
        .map(|row| {
            rs.columns
                .iter()
                .map(|c| row.get(c).map(format_value).unwrap_or_else(|| "NULL".to_string()))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = rs.columns.iter().map(|c| c.len()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |values: Vec<&str>| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:w$}", v, w = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(rs.columns.iter().map(String::as_str).collect()));
    out.push('\n');
    out.push_str(&widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));
    out.push('\n');
    for row in &cells {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    if rs.len() > shown {
        out.push_str(&format!("... ({} more rows)\n", rs.len() - shown));
    }
    out.push_str(&format!("({} rows)\n", rs.len()));
    out
}

fn print_result_set(rs: &ResultSet, max_rows: usize) {
    print!("{}", format_result_set(rs, max_rows));
}

fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
