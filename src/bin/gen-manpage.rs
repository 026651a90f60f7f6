//! Man page generator for mpdev
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
#[allow(dead_code)]
mod cli;

/// Render `mpdev.1` into `dir`
fn render_page(dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let mut page = Vec::new();
    clap_mangen::Man::new(cli::Cli::command()).render(&mut page)?;

    let path = dir.join("mpdev.1");
    fs::write(&path, page)?;
    Ok(path)
}

fn main() -> io::Result<()> {
    let dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));

    let path = render_page(&dir)?;
    println!("Man page generated at: {}", path.display());
    println!("  view:    man -l {}", path.display());
    println!("  install: sudo cp {} /usr/local/share/man/man1/ && sudo mandb", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_lists_subcommands() {
        let dir = tempfile::tempdir().unwrap();
        let path = render_page(dir.path()).unwrap();
        let page = fs::read_to_string(path).unwrap();
        assert!(page.contains("mpdev"));
        assert!(page.contains("sync"));
    }
}
