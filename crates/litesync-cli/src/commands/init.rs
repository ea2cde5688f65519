use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;
use litesync_config::{CONFIG_FILE_NAME, CONFIG_TEMPLATE};

const ENV_EXAMPLE: &str = r#"# litesync environment variables
# Copy this file to .env and fill in your values

# Upstream Postgres (wal_level = logical, role with REPLICATION)
DATABASE_URL=

# Optional: log filter
# RUST_LOG=litesync=debug
"#;

pub fn cmd_init() -> Result<()> {
    println!("Initializing litesync in current directory...\n");

    let created = init_in(Path::new("."))?;
    for path in &created {
        println!("Created {}", path.display());
    }
    if created.is_empty() {
        println!("Nothing to do, files already exist");
    }

    println!("\n{}", "litesync initialized!".green().bold());
    println!("\nNext steps:");
    println!("  1. Copy .env.example to .env and set DATABASE_URL");
    println!("  2. Edit {} (app_id, publications, replica path)", CONFIG_FILE_NAME);
    println!("  3. Run: litesync sync\n");

    Ok(())
}

/// Write the config template, `.env.example` and a `.gitignore` entry for
/// `.env` into `dir`, leaving existing files alone. Returns what was written.
pub fn init_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();

    for (name, content) in [(CONFIG_FILE_NAME, CONFIG_TEMPLATE), (".env.example", ENV_EXAMPLE)] {
        let path = dir.join(name);
        if !path.exists() {
            fs::write(&path, content)?;
            created.push(path);
        }
    }

    let gitignore = dir.join(".gitignore");
    if gitignore.exists() {
        let content = fs::read_to_string(&gitignore)?;
        if !content.lines().any(|line| line.trim() == ".env") {
            let mut file = fs::OpenOptions::new().append(true).open(&gitignore)?;
            writeln!(file, "\n# litesync secrets\n.env")?;
        }
    } else {
        fs::write(&gitignore, "# litesync secrets\n.env\n")?;
        created.push(gitignore);
    }

    Ok(created)
}
