//! Helpers shared by the integration tests.
use assert_cmd::cargo_bin_cmd;

/// Run the program with the given arguments and check that it succeeds
#[allow(dead_code)]
pub fn assert_powerdispatch_runs(args: &[&str]) {
    cargo_bin_cmd!("powerdispatch")
        .env("POWERDISPATCH_USE_DEFAULT_SETTINGS", "1")
        .args(args)
        .assert()
        .success();
}

/// Run the program with the given arguments and check that it fails
#[allow(dead_code)]
pub fn assert_powerdispatch_fails(args: &[&str]) {
    cargo_bin_cmd!("powerdispatch")
        .env("POWERDISPATCH_USE_DEFAULT_SETTINGS", "1")
        .args(args)
        .assert()
        .failure();
}

/// Run the program with the given arguments and return what it printed to stdout
#[allow(dead_code)]
pub fn get_powerdispatch_stdout(args: &[&str]) -> String {
    let output = cargo_bin_cmd!("powerdispatch")
        .env("POWERDISPATCH_USE_DEFAULT_SETTINGS", "1")
        .args(args)
        .output()
        .unwrap();
    assert!(output.status.success());

    String::from_utf8(output.stdout).unwrap()
}
