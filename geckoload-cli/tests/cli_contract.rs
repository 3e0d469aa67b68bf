//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("geckoload");
    // Keep the host environment out of the way
    cmd.env_remove("USBGECKODEVICE")
        .env_remove("GECKOLOAD_BACKEND")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("geckoload"))
        .stdout(predicate::str::contains("--arm"))
        .stdout(predicate::str::contains("--ppc"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    cli_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("geckoload"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn help_includes_usage_examples() {
    cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("geckoload -p ppcboot.elf"));
}

#[test]
fn exit_code_two_without_a_command() {
    cli_cmd()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--arm").or(predicate::str::contains("-a")));
}

#[test]
fn exit_code_two_for_both_commands() {
    cli_cmd()
        .args(["-a", "armboot.bin", "-p", "ppcboot.elf"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn exit_code_two_for_missing_file_argument() {
    cli_cmd().arg("-p").assert().code(2);
}

#[test]
fn exit_code_two_for_unknown_flag() {
    cli_cmd()
        .args(["-x", "payload.bin"])
        .assert()
        .code(2);
}

#[test]
fn exit_code_two_for_unknown_backend() {
    cli_cmd()
        .args(["--backend", "bluetooth", "-a", "armboot.bin"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown backend"));
}

#[test]
fn empty_file_is_rejected_before_opening_the_device() {
    let dir = tempdir().expect("tempdir should be created");
    let device = dir.path().join("gecko");
    fs::write(&device, b"").expect("write fake device");
    let payload = dir.path().join("empty.bin");
    fs::write(&payload, b"").expect("write empty payload");

    cli_cmd()
        .env("USBGECKODEVICE", &device)
        .arg("-p")
        .arg(&payload)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid payload size"));

    // Nothing was sent to the "device"
    assert!(fs::read(&device).expect("read fake device").is_empty());
}

#[test]
fn missing_file_exits_one() {
    let dir = tempdir().expect("tempdir should be created");
    let device = dir.path().join("gecko");
    fs::write(&device, b"").expect("write fake device");

    cli_cmd()
        .env("USBGECKODEVICE", &device)
        .arg("-a")
        .arg(dir.path().join("does_not_exist.bin"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does_not_exist.bin"));
}

#[test]
fn non_tty_device_fails_to_open() {
    let dir = tempdir().expect("tempdir should be created");
    let device = dir.path().join("gecko");
    fs::write(&device, b"").expect("write fake device");
    let payload = dir.path().join("ppcboot.elf");
    fs::write(&payload, b"\x7fELF").expect("write payload");

    cli_cmd()
        .arg("--device")
        .arg(&device)
        .arg("-p")
        .arg(&payload)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error opening the device"));
}

#[test]
fn quiet_mode_suppresses_banner() {
    cli_cmd()
        .args(["-q", "-a", "armboot.bin", "--backend", "serial", "--device"])
        .arg("/nonexistent/gecko")
        .assert()
        .failure()
        .stderr(predicate::str::contains("geckoload v").not());
}

#[test]
fn errors_go_to_stderr_only() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd()
        .arg("-a")
        .arg(dir.path().join("missing.bin"))
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

#[test]
fn missing_explicit_device_is_not_replaced_by_a_fallback() {
    let dir = tempdir().expect("tempdir should be created");
    let fallback = dir.path().join("gecko");
    fs::write(&fallback, b"").expect("write fake device");
    let payload = dir.path().join("armboot.bin");
    fs::write(&payload, b"\x01").expect("write payload");

    cli_cmd()
        .env("USBGECKODEVICE", &fallback)
        .args(["--backend", "serial", "--device", "/nonexistent/gecko", "-a"])
        .arg(&payload)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("/nonexistent/gecko does not exist"));

    assert!(fs::read(&fallback).expect("read fake device").is_empty());
}
