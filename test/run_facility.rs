use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use tempfile::Builder;

/// Markers that must show up in this order for a clean close.
const ORDER: [&str; 4] = [
    "=== seating summary ===",
    "=== kitchen summary ===",
    "generator done",
    "facility closed",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Starting a short facility run...");

    let temp_dir = Builder::new().prefix("kaiten_run").tempdir()?;
    let config_file_path: PathBuf = temp_dir.path().join("kaiten.toml");
    let config_content = "log_level = \"info\"\n\
        run_seconds = 4\n\
        queue_capacity = 5\n\
        max_active_workers = 8\n\
        spawn_interval_min_ms = 50\n\
        spawn_interval_max_ms = 150\n\
        belt_tick_ms = 50\n\
        kitchen_cook_ms = 20\n\
        party_dwell_ms = 1500\n\
        supervisor_interval_ms = 300\n";
    let mut file = File::create(&config_file_path)?;
    file.write_all(config_content.as_bytes())?;
    println!("Temporary config created at: {}", config_file_path.display());

    let cargo_executable = std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    let output = Command::new(&cargo_executable)
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .arg("run")
        .arg("--manifest-path")
        .arg("../Cargo.toml")
        .arg("--package")
        .arg("kaiten-facility")
        .arg("--")
        .arg("--config")
        .arg(&config_file_path)
        .output()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    println!("kaiten-facility stdout:\n{}", stdout);
    println!("kaiten-facility stderr:\n{}", String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        eprintln!("kaiten-facility failed with status: {}", output.status);
        return Err(Box::new(std::io::Error::new(std::io::ErrorKind::Other, "facility failed")));
    }

    let mut from = 0;
    for marker in ORDER {
        match stdout[from..].find(marker) {
            Some(at) => from += at + marker.len(),
            None => {
                eprintln!("'{}' missing or out of order", marker);
                return Err(Box::new(std::io::Error::new(std::io::ErrorKind::Other, "bad closing order")));
            }
        }
    }
    println!("\nFacility closed in order.");
    Ok(())
}
