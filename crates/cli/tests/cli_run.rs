use std::path::PathBuf;
use std::process::Command;

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap()
}

fn write_firmware(name: &str, words: &[u16]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("avrsim-{}-{}.bin", name, std::process::id()));
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    std::fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn test_breakpoint_run_writes_snapshot() {
    let root = workspace_root();
    let chip = root.join("configs/chips/atmega16.yaml");
    // LDI R16, 0x2A; NOP; NOP
    let firmware = write_firmware("bp", &[0xE20A, 0x0000, 0x0000]);
    let snapshot = std::env::temp_dir().join(format!("avrsim-snap-{}.json", std::process::id()));

    let output = Command::new(env!("CARGO_BIN_EXE_avrsim"))
        .args(["--chip", chip.to_str().unwrap()])
        .args(["--firmware", firmware.to_str().unwrap()])
        .args(["--breakpoint", "0x2"])
        .args(["--snapshot", snapshot.to_str().unwrap()])
        .output()
        .expect("Failed to execute avrsim");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&snapshot).unwrap()).unwrap();
    assert_eq!(json["stop_reason"]["Breakpoint"], 2);
    assert_eq!(json["device"]["cpu"]["pc"], 2);
    assert_eq!(json["device"]["registers"][16], 0x2A);
    assert_eq!(json["device"]["ports"][1]["name"], "B");

    std::fs::remove_file(firmware).ok();
    std::fs::remove_file(snapshot).ok();
}

#[test]
fn test_max_steps_and_manifest() {
    let root = workspace_root();
    let manifest = root.join("configs/runs/adc_demo.yaml");
    let snapshot = std::env::temp_dir().join(format!("avrsim-man-{}.json", std::process::id()));

    let status = Command::new(env!("CARGO_BIN_EXE_avrsim"))
        .args(["--manifest", manifest.to_str().unwrap()])
        .args(["--max-steps", "10"])
        .args(["--snapshot", snapshot.to_str().unwrap()])
        .status()
        .expect("Failed to execute avrsim");
    assert!(status.success());

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&snapshot).unwrap()).unwrap();
    assert_eq!(json["stop_reason"], "MaxStepsReached");
    assert_eq!(json["total_cycles"], 10);
    std::fs::remove_file(snapshot).ok();
}

#[test]
fn test_missing_chip_is_config_error() {
    let status = Command::new(env!("CARGO_BIN_EXE_avrsim"))
        .args(["--chip", "/nonexistent/chip.yaml"])
        .status()
        .expect("Failed to execute avrsim");
    assert_eq!(status.code(), Some(2));
}

#[test]
fn test_illegal_opcode_is_runtime_error() {
    let root = workspace_root();
    let chip = root.join("configs/chips/atmega16.yaml");
    let firmware = write_firmware("illegal", &[0x0000, 0x9C00]);

    let status = Command::new(env!("CARGO_BIN_EXE_avrsim"))
        .args(["--chip", chip.to_str().unwrap()])
        .args(["--firmware", firmware.to_str().unwrap()])
        .status()
        .expect("Failed to execute avrsim");
    assert_eq!(status.code(), Some(3));
    std::fs::remove_file(firmware).ok();
}
