use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

const EXIT: u32 = 0x05D0_0893; // addi a7, zero, 93
const ECALL: u32 = 0x0000_0073;

fn li_a0(value: u32) -> u32 {
    (value << 20) | (10 << 7) | 0x13
}

fn temp_dir(prefix: &str) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir()
        .join("revsim-tests")
        .join(format!("{}-{}", prefix, nonce));
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir
}

fn write_program(dir: &Path, words: &[u32]) -> PathBuf {
    let path = dir.join("program.bin");
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    std::fs::write(&path, bytes).expect("Failed to write program");
    path
}

fn run_revsim(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_revsim"))
        .args(args)
        .args(["--mem-size", "1MiB"])
        .output()
        .expect("Failed to execute revsim")
}

fn read_result(path: &Path) -> serde_json::Value {
    let content = std::fs::read_to_string(path).expect("Result file missing");
    serde_json::from_str(&content).unwrap()
}

#[test]
fn test_flat_program_runs_to_exit() {
    let dir = temp_dir("exit");
    let program = write_program(&dir, &[li_a0(0), EXIT, ECALL]);
    let result_path = dir.join("result.json");

    let output = run_revsim(&[
        "--program",
        program.to_str().unwrap(),
        "--output",
        result_path.to_str().unwrap(),
    ]);
    assert!(output.status.success());

    let result = read_result(&result_path);
    assert_eq!(result["status"], "pass");
    assert_eq!(result["stop_reason"], "all_cores_finished");
    assert_eq!(result["cycles"], 3);
    assert_eq!(result["stop_cycle"], 3);
    assert_eq!(result["cores"][0]["exit_code"], 0);
    assert_eq!(result["program_hash"].as_str().unwrap().len(), 64);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_nonzero_exit_code_propagates() {
    let dir = temp_dir("code");
    let program = write_program(&dir, &[li_a0(7), EXIT, ECALL]);

    let output = run_revsim(&["--program", program.to_str().unwrap(), "--cores", "2"]);
    assert_eq!(output.status.code(), Some(7));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_fault_fails_run() {
    let dir = temp_dir("fault");
    // lw a0, 0(zero)
    let program = write_program(&dir, &[0x0000_2503, EXIT, ECALL]);
    let result_path = dir.join("result.json");

    let output = run_revsim(&[
        "--program",
        program.to_str().unwrap(),
        "--output",
        result_path.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1));

    let result = read_result(&result_path);
    assert_eq!(result["status"], "fail");
    assert!(result["cores"][0]["fault"].as_str().is_some());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cycle_limit_stops_run() {
    let dir = temp_dir("limit");
    // jal zero, 0
    let program = write_program(&dir, &[0x0000_006F]);
    let result_path = dir.join("result.json");

    let output = run_revsim(&[
        "--program",
        program.to_str().unwrap(),
        "--max-cycles",
        "50",
        "--output",
        result_path.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1));

    let result = read_result(&result_path);
    assert_eq!(result["stop_reason"], "cycle_limit");
    assert_eq!(result["cycles"], 50);
    assert!(result["stop_cycle"].is_null());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_config_file_with_endpoints() {
    let dir = temp_dir("config");
    write_program(&dir, &[li_a0(0), EXIT, ECALL]);
    std::fs::write(dir.join("costs.yaml"), "addi: 4\n").unwrap();

    let config_path = dir.join("sim.yaml");
    std::fs::write(
        &config_path,
        r#"
program: "program.bin"
args: "--fast 3"
num_cores: 2
mem_size: "1MiB"
machine: ["CORES:IM"]
table: ["1:costs.yaml"]
mem_cost: ["CORES:1:1"]
enable_nic: true
enable_pan: true
splash: true
init_phases: 2
"#,
    )
    .unwrap();
    let result_path = dir.join("result.json");

    let output = Command::new(env!("CARGO_BIN_EXE_revsim"))
        .arg("--config")
        .arg(&config_path)
        .arg("--output")
        .arg(&result_path)
        .output()
        .expect("Failed to execute revsim");
    assert!(output.status.success());

    let result = read_result(&result_path);
    assert_eq!(result["cores"].as_array().unwrap().len(), 2);
    assert_eq!(result["program"], "program.bin");
    // core 1 pays 4 cycles for each addi
    assert_eq!(result["stop_cycle"], 9);

    let _ = std::fs::remove_dir_all(&dir);
}
