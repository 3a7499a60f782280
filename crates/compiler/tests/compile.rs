use std::fs;

use ferro_compiler::{compile_file, compile_source, CompilerError, CompilerOptions};

#[test]
fn test_compile_file_round_trips_modules_through_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let module_path = dir.path().join("units.fer");
    fs::write(
        &module_path,
        "module units\ninteger, parameter :: meter = 1\nend module\n",
    )
    .unwrap();

    let options = CompilerOptions {
        module_directory: Some(dir.path().to_path_buf()),
        ..CompilerOptions::default()
    };
    compile_file(&module_path, options.clone()).unwrap();
    assert!(dir.path().join("units.fmod").exists());

    // A later compilation picks the module up from the directory
    let program = "program p\n\
                   use units\n\
                   integer :: x\n\
                   x = meter\n\
                   end program\n";
    compile_source(program, options).unwrap();
}

#[test]
fn test_compile_file_reports_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let Err(error) = compile_file(&dir.path().join("nope.fer"), CompilerOptions::default()) else {
        panic!("expected an I/O error");
    };
    assert!(matches!(error, CompilerError::Io(..)));
    assert!(error.diagnostics().is_empty());
}
