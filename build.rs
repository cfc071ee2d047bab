use std::{env, path::PathBuf};

/// Builds `tests/fixtures/seg_stub.c` into a shared library exporting the six
/// `seg_*` entry points, so tests can drive `NativeLibrary` end to end.
fn main() {
    println!("cargo::rustc-check-cfg=cfg(seg_stub)");
    println!("cargo:rerun-if-changed=tests/fixtures/seg_stub.c");

    if env::var_os("CARGO_CFG_UNIX").is_none() {
        println!("cargo:warning=Skipping the seg_* test module (not a unix target)");
        return;
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let stub = out_dir.join("libseg_stub.so");

    let compiler = match cc::Build::new().cargo_metadata(false).try_get_compiler() {
        Ok(compiler) => compiler,
        Err(err) => {
            println!("cargo:warning=Skipping the seg_* test module: {err}");
            return;
        }
    };

    let status = compiler
        .to_command()
        .args(["-shared", "-fPIC", "-o"])
        .arg(&stub)
        .arg("tests/fixtures/seg_stub.c")
        .status();

    match status {
        Ok(status) if status.success() => {
            println!("cargo:rustc-cfg=seg_stub");
            println!("cargo:rustc-env=SEG_STUB_LIB={}", stub.display());
        }
        _ => println!("cargo:warning=Skipping the seg_* test module: compiling the stub failed"),
    }
}
