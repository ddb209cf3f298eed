//! Build script for daqmx-sys.
//!
//! With the `daqmx-sdk` feature the crate links against the NI-DAQmx runtime.
//! The library directory can be overridden with `NIDAQMX_LIB_DIR`; otherwise
//! the standard install locations are searched.

use std::env;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-env-changed=NIDAQMX_LIB_DIR");

    if env::var_os("CARGO_FEATURE_DAQMX_SDK").is_none() {
        return;
    }

    if let Ok(dir) = env::var("NIDAQMX_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir);
    } else {
        let lib_paths = [
            "C:\\Program Files (x86)\\National Instruments\\Shared\\ExternalCompilerSupport\\C\\lib64\\msvc",
            "/usr/lib/x86_64-linux-gnu",
            "/usr/local/natinst/nidaqmx/lib64",
            "/usr/lib64",
        ];
        for path in lib_paths {
            let dir = Path::new(path);
            if dir.join("NIDAQmx.lib").exists() || dir.join("libnidaqmx.so").exists() {
                println!("cargo:rustc-link-search=native={}", path);
                break;
            }
        }
    }

    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("windows") {
        println!("cargo:rustc-link-lib=dylib=NIDAQmx");
    } else {
        println!("cargo:rustc-link-lib=dylib=nidaqmx");
    }
}
