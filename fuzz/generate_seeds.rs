//! Generate seed corpus for fuzzing

use cartridge_rs::Packer;
use std::fs;
use tempfile::TempDir;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let corpus_dir = "fuzz/corpus/fuzz_archive_parse";
    fs::create_dir_all(corpus_dir)?;
    let scratch = TempDir::new()?;

    println!("Generating seed corpus...");

    let binary: Vec<u8> = (0..=255).collect();
    let seeds: Vec<(&str, Vec<(&str, &[u8])>)> = vec![
        ("seed_single_small", vec![("test.txt", &b"Hello, World!"[..])]),
        (
            "seed_multi",
            vec![
                ("file1.txt", &b"First file"[..]),
                ("file2.txt", &b"Second file"[..]),
                ("dir/file3.txt", &b"Third file in directory"[..]),
            ],
        ),
        ("seed_binary", vec![("binary.bin", &binary[..])]),
        ("seed_zero_length", vec![("empty.txt", &b""[..])]),
        (
            "seed_collisions",
            vec![
                ("a", &b"1"[..]),
                ("b", &b"22"[..]),
                ("c", &b"333"[..]),
                ("d", &b"4444"[..]),
            ],
        ),
    ];
    let count = seeds.len();

    for (seed, files) in seeds {
        let mut packer = Packer::new();
        for (name, data) in files {
            let input = scratch.path().join(format!("{}-{}", seed, name.replace('/', "_")));
            fs::write(&input, data)?;
            packer.add_named_file(name, &input);
        }

        let path = format!("{}/{}.crpk", corpus_dir, seed);
        packer.pack(&path)?;
        println!("✓ Generated: {}", path);
    }

    println!("\nGenerated {} seed files in {}", count, corpus_dir);
    Ok(())
}
