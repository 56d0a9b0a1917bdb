/// Basic example demonstrating cartridge creation and lookup
///
/// Run with: cargo run --example basic
use cartridge_rs::{Cartridge, Packer};
use std::error::Error;
use std::path::Path;

fn main() -> Result<(), Box<dyn Error>> {
    println!("=== cartridge-rs Basic Example ===\n");

    let scratch = tempfile::tempdir()?;

    println!("1. Packing cartridge...");
    let output = scratch.path().join("example_basic.crpk");
    create_cartridge(scratch.path(), &output)?;

    println!("\n2. Reading from cartridge...");
    read_cartridge(&output)?;

    println!("\n✓ Example complete!");
    Ok(())
}

fn create_cartridge(dir: &Path, output: &Path) -> Result<(), Box<dyn Error>> {
    let files: [(&str, &[u8]); 3] = [
        ("readme.txt", b"This is a readme file for the basic example."),
        ("data.json", br#"{"name": "Basic Example", "version": "1.0.0"}"#),
        ("notes.md", b"# Notes\n\nThis is a markdown file."),
    ];

    let mut packer = Packer::new();
    for (name, data) in files {
        let input = dir.join(name);
        std::fs::write(&input, data)?;
        // Key the block by its short name rather than the scratch path
        packer.add_named_file(name, &input);
    }

    let summary = packer.pack(output)?;
    println!(
        "   ✓ Cartridge created: {} blocks, {} bytes",
        summary.block_count, summary.archive_size
    );
    Ok(())
}

fn read_cartridge(path: &Path) -> Result<(), Box<dyn Error>> {
    let cartridge = Cartridge::open(path)?;
    cartridge.verify()?;

    println!("   Blocks in cartridge:");
    for record in cartridge.entries() {
        println!(
            "     - id {:016x} at {} ({} bytes)",
            record.id, record.start_offset, record.length
        );
    }

    println!("\n   Reading readme.txt:");
    println!("     {}", String::from_utf8_lossy(cartridge.get("readme.txt")));

    println!("\n   Reading data.json:");
    let json: serde_json::Value = serde_json::from_slice(cartridge.get("data.json"))?;
    println!("     Name: {}", json["name"]);
    println!("     Version: {}", json["version"]);

    println!("\n   Looking up a missing name:");
    println!("     {} bytes", cartridge.get("missing.txt").len());

    Ok(())
}
