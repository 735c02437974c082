use crate::compiler::{Cli, Compiler, compile_source};
use crate::error::CompilerError;

use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Test configuration constants
pub mod config {
    /// C compiler used to assemble and link generated code
    pub const C_COMPILER: &str = "cc";
    /// Executable extension for test binaries
    pub const EXE_EXTENSION: &str = ".out";
}

/// Whether the host can assemble and execute the generated code.
/// Execution tests return early on other targets instead of failing.
pub fn have_toolchain() -> bool {
    if !cfg!(all(target_arch = "x86_64", target_os = "linux")) {
        return false;
    }
    Command::new(config::C_COMPILER)
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

/// Compiles a program to assembly text without touching the filesystem.
pub fn compile_to_assembly(input: &str) -> Result<String, CompilerError> {
    compile_source(input, false).map(|(assembly, _)| assembly)
}

/// Compiles and runs a C program, returning its exit code.
pub fn compile_and_run(input: &str, test_name: &str) -> Result<i32, CompilerError> {
    let temp_dir = tempdir().unwrap();

    // Create a temporary file for the input within the temporary directory
    let input_path = temp_dir.path().join(format!("{test_name}.c"));
    fs::write(&input_path, input).unwrap();
    let exe_path = temp_dir
        .path()
        .join(format!("{test_name}{}", config::EXE_EXTENSION));

    let compiler = Compiler::new(Cli {
        input: input_path.to_str().unwrap().to_string(),
        output: Some(exe_path.to_str().unwrap().to_string()),
        ..Default::default()
    });
    compiler.run()?;

    // Run executable and get exit code
    let child_output = Command::new(&exe_path).output().unwrap();
    let exit_code = child_output.status.code().unwrap_or(-1);

    // The temporary directory and its contents are deleted when `temp_dir`
    // goes out of scope.
    Ok(exit_code)
}

/// Compiles and runs a C program, capturing its stdout.
pub fn compile_and_run_with_output(input: &str, test_name: &str) -> Result<String, CompilerError> {
    let temp_dir = tempdir().unwrap();

    let input_path = temp_dir.path().join(format!("{test_name}.c"));
    fs::write(&input_path, input).unwrap();
    let exe_path = temp_dir
        .path()
        .join(format!("{test_name}{}", config::EXE_EXTENSION));

    let compiler = Compiler::new(Cli {
        input: input_path.to_str().unwrap().to_string(),
        output: Some(exe_path.to_str().unwrap().to_string()),
        ..Default::default()
    });
    compiler.run()?;

    let child_output = Command::new(&exe_path).output().unwrap();
    Ok(String::from_utf8_lossy(&child_output.stdout).to_string())
}

/// Compiles a program that must be rejected and returns the error.
pub fn compile_and_expect_error(input: &str) -> CompilerError {
    match compile_source(input, false) {
        Ok(_) => panic!("compilation unexpectedly succeeded"),
        Err(err) => err,
    }
}
