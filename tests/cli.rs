use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn chunktar() -> Command {
    Command::cargo_bin("chunktar").unwrap()
}

#[test]
fn test_cli_pack_list_unpack_cycle() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    fs::write(work.path().join("a.txt"), "hi\n")?;
    fs::write(work.path().join("b.txt"), "")?;
    fs::create_dir(work.path().join("nested"))?;
    fs::write(work.path().join("nested/c.dat"), [0xFFu8, 0x00, 0xFF])?;

    chunktar()
        .current_dir(work.path())
        .args(["pack", "-o", "out.bin", "a.txt", "b.txt", "nested/c.dat"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created:").and(predicate::str::contains("nested/c.dat")));

    chunktar()
        .current_dir(work.path())
        .args(["list", "out.bin"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("a.txt")
                .and(predicate::str::contains("b.txt"))
                .and(predicate::str::contains("nested/c.dat")),
        );

    let dest = tempdir()?;
    chunktar()
        .arg("unpack")
        .arg(work.path().join("out.bin"))
        .arg("-C")
        .arg(dest.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Unpacked 3 file(s)"));

    assert_eq!(fs::read(dest.path().join("a.txt"))?, b"hi\n");
    assert_eq!(fs::read(dest.path().join("b.txt"))?, b"");
    assert_eq!(fs::read(dest.path().join("nested/c.dat"))?, [0xFFu8, 0x00, 0xFF]);
    Ok(())
}

#[test]
fn test_cli_list_json() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    fs::write(work.path().join("a.txt"), "abc")?;
    chunktar().current_dir(work.path()).args(["pack", "-o", "out.bin", "a.txt"]).assert().success();

    let output = chunktar()
        .current_dir(work.path())
        .args(["list", "out.bin", "--json"])
        .output()?;
    assert!(output.status.success());
    let listing: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(listing["entries"][0]["name"], "a.txt");
    assert_eq!(listing["entries"][0]["size"], 3);
    Ok(())
}

#[test]
fn test_cli_partial_pack_exit_code() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    fs::write(work.path().join("a.txt"), "kept")?;

    chunktar()
        .current_dir(work.path())
        .args(["pack", "-o", "out.bin", "a.txt", "missing.txt"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("Skipped 1 of 2"))
        .stderr(predicate::str::contains("missing.txt"));

    assert!(work.path().join("out.bin").exists());
    Ok(())
}

#[test]
fn test_cli_pack_without_existing_inputs_is_usage_error() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;

    chunktar()
        .current_dir(work.path())
        .args(["pack", "-o", "out.bin", "nope.txt"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("nope.txt"));

    assert!(!work.path().join("out.bin").exists());
    Ok(())
}

#[test]
fn test_cli_pack_requires_inputs() {
    chunktar().args(["pack", "-o", "out.bin"]).assert().code(2);
}

#[test]
fn test_cli_unpack_missing_container_fails() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    chunktar()
        .current_dir(work.path())
        .args(["unpack", "absent.bin"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("absent.bin not found"));
    Ok(())
}

#[test]
fn test_cli_verify_reports_damage() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    fs::write(work.path().join("one.txt"), "first")?;
    fs::write(work.path().join("two.txt"), "second")?;
    chunktar()
        .current_dir(work.path())
        .args(["pack", "-o", "out.bin", "one.txt", "two.txt"])
        .assert()
        .success();

    chunktar()
        .current_dir(work.path())
        .args(["verify", "out.bin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Intact"));

    let path = work.path().join("out.bin");
    let bytes = fs::read(&path)?;
    fs::write(&path, &bytes[..bytes.len() - 2])?;

    chunktar()
        .current_dir(work.path())
        .args(["verify", "out.bin"])
        .assert()
        .code(1)
        .stdout(
            predicate::str::contains("Damaged")
                .and(predicate::str::contains("suspect  two.txt")),
        );

    chunktar()
        .current_dir(work.path())
        .args(["unpack", "out.bin", "-C", "restored"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("incorrect format"));
    Ok(())
}
