//! getar CLI - Tool for inspecting and manipulating trajectory archives.

use std::env;
use std::io::{self, Write};
use std::path::Path;
use std::process;

use getar::prelude::*;
use getar::repair::scan_corrupt_entries;

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "warn";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            _ => filtered_args.push(arg),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(io::stderr)
        .init();

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let result = match filtered_args[0] {
        // List command - show record types and frames
        "ls" | "l" => {
            if filtered_args.len() < 2 {
                usage("getar ls <archive>");
            }
            cmd_ls(filtered_args[1])
        }

        // Cat command - dump one record payload to stdout
        "cat" | "read" => {
            if filtered_args.len() < 3 {
                usage("getar cat <archive> <record-path>");
            }
            cmd_cat(filtered_args[1], filtered_args[2])
        }

        // Copy command - merge archives, later inputs win
        "copy" | "c" => {
            if filtered_args.len() < 3 {
                usage("getar copy <input>... <output>");
            }
            let dest = filtered_args[filtered_args.len() - 1];
            let inputs = &filtered_args[1..filtered_args.len() - 1];
            cmd_copy(inputs, dest)
        }

        // Check command - corruption scan
        "check" => {
            if filtered_args.len() < 2 {
                usage("getar check <archive.zip>");
            }
            cmd_check(filtered_args[1])
        }

        "help" | "h" | "-h" | "--help" => {
            print_help();
            return;
        }

        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_help();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn usage(line: &str) -> ! {
    eprintln!("Error: missing arguments");
    eprintln!("Usage: {line}");
    process::exit(1);
}

fn print_help() {
    println!("getar - trajectory archive toolkit");
    println!();
    println!("USAGE:");
    println!("    getar [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    l, ls    <archive>              List record types and their frames");
    println!("    cat      <archive> <path>       Write one record payload to stdout");
    println!("    c, copy  <input>... <output>    Merge archives (later inputs win)");
    println!("    check    <archive.zip>          Scan a zip archive for damaged entries");
    println!("    h, help                         Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Errors only");
    println!();
    println!("EXAMPLES:");
    println!("    getar ls dump.zip                       # What is in here?");
    println!("    getar cat dump.zip frames/0/position.f32.ind > pos.bin");
    println!("    getar copy run1.zip run2.zip all.zip    # Merge two runs");
    println!("    getar copy dump.tar dump.sqlite         # Convert between containers");
    println!("    getar check dump.zip                    # Pre-repair corruption scan");
    println!();
    println!("NOTES:");
    println!("    - The container format comes from the path suffix:");
    println!("      .zip/.gtar, .tar, .sqlite, or a trailing / for a directory");
    println!("    - copy writes to a temporary sibling and renames on success");
}

fn cmd_ls(path: &str) -> Result<()> {
    let archive = Archive::open(path, OpenMode::Read)?;

    for record in archive.get_record_types() {
        let frames = archive.query_frames(&record);
        match record.behavior() {
            Behavior::Constant => println!("{record}"),
            _ => println!("{record} ({} frames)", frames.len()),
        }
        for frame in frames {
            if !frame.is_empty() {
                println!("    {frame}");
            }
        }
    }

    Ok(())
}

fn cmd_cat(path: &str, record_path: &str) -> Result<()> {
    let mut archive = Archive::open(path, OpenMode::Read)?;
    let payload = archive.read_bytes(record_path)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    out.write_all(&payload)?;
    out.flush()?;

    Ok(())
}

fn cmd_copy(inputs: &[&str], dest: &str) -> Result<()> {
    let dest_path = Path::new(dest);
    let is_directory = dest.ends_with('/')
        || dest.ends_with(std::path::MAIN_SEPARATOR)
        || dest_path.is_dir();

    if is_directory {
        // directory containers are a file tree; there is no single file to
        // rename over, so entries are written in place
        merge_into(inputs, dest_path)?;
    } else {
        atomic_publish(dest_path, |temp| merge_into(inputs, temp))?;
    }

    println!("Merged {} archive(s) -> {dest}", inputs.len());
    Ok(())
}

fn merge_into(inputs: &[&str], dest: &Path) -> Result<()> {
    let mut out = Archive::open(dest, OpenMode::Write)?;

    out.bulk_writes(|out| {
        for input in inputs {
            let mut src = Archive::open(input, OpenMode::Read)?;

            for record in src.get_record_types() {
                for frame in src.query_frames(&record) {
                    let full = record.with_index(&frame);
                    if let Some(payload) = src.get_record(&record, &frame)? {
                        out.write_record(&full, &payload, CompressMode::Fast)?;
                    }
                }
            }
        }
        Ok(())
    })?;

    out.close()
}

fn cmd_check(path: &str) -> Result<()> {
    let path = Path::new(path);
    let damaged = scan_corrupt_entries(path)?;

    if is_zip64(path)? {
        println!("Format: zip64");
    } else {
        println!("Format: classic zip (convert before appending)");
    }

    if damaged.is_empty() {
        println!("No damaged entries");
    } else {
        println!("Damaged entries ({}):", damaged.len());
        for entry in &damaged {
            println!("    {entry}");
        }
        process::exit(1);
    }

    Ok(())
}
