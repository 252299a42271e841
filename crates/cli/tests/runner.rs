use std::process::Command;

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_revsim"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("RevSim Multi-Core RISC-V Simulator"));
    assert!(stdout.contains("--max-cycles"));
}

#[test]
fn test_cli_load_missing_file() {
    let output = Command::new(env!("CARGO_BIN_EXE_revsim"))
        .arg("-p")
        .arg("non_existent_program.elf")
        .args(["--mem-size", "1MiB"])
        .output()
        .expect("Failed to execute command");

    // It should fail because file is missing
    assert!(!output.status.success());
}

#[test]
fn test_cli_rejects_bad_config() {
    let path = std::env::temp_dir().join("revsim-bad-config.yaml");
    std::fs::write(&path, "num_cores: 2\nmachine: [\"5:G\"]\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_revsim"))
        .arg("--config")
        .arg(&path)
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    let _ = std::fs::remove_file(path);
}
